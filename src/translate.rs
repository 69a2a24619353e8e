//! Expansion of controller-issued packet-outs and flow-mods into the
//! per-switch messages that realize them on the physical fabric.

use flowvisor::buffer_bridge::{BufferBridge, BufferedPacket};
use flowvisor::message::{
    Action, BadAction, BadRequest, ErrorType, FlowMod, FlowModCmd, Message, PacketOut, Payload,
    PseudoPort, QueueOpFailed,
};
use flowvisor::openflow::OfpPort;
use flowvisor::port_map::PortMap;
use flowvisor::topology::{DatapathId, Hop, Topology};

/// Why a controller request could not be mapped onto the fabric. Every
/// variant corresponds to one OpenFlow error sent back to the session.
#[derive(Debug, Fail, PartialEq)]
pub enum TranslationError {
    #[fail(display = "port {} is not part of the virtual switch", _0)]
    BadOutPort(u16),
    #[fail(display = "buffer id {} is unknown", _0)]
    BufferUnknown(u32),
    #[fail(display = "target {:?} cannot be realized on the fabric", _0)]
    UnsupportedTarget(PseudoPort),
    #[fail(display = "unsupported in_port/out_port combination in flow delete")]
    BadDeleteScope,
    #[fail(display = "stats request kind {} is not supported", _0)]
    UnsupportedStat(u16),
    #[fail(display = "queue operations are not supported")]
    UnsupportedQueueOp,
}

impl TranslationError {
    pub fn error_type(&self) -> ErrorType {
        match *self {
            TranslationError::BadOutPort(_) => ErrorType::BadAction(BadAction::BadOutPort),
            TranslationError::BufferUnknown(_) => {
                ErrorType::BadRequest(BadRequest::BufferUnknown)
            }
            TranslationError::UnsupportedTarget(_)
            | TranslationError::BadDeleteScope
            | TranslationError::UnsupportedStat(_) => ErrorType::BadRequest(BadRequest::BadStat),
            TranslationError::UnsupportedQueueOp => {
                ErrorType::QueueOpFailed(QueueOpFailed::BadPort)
            }
        }
    }
}

/// Messages addressed to physical switches, in emission order.
pub type Fanout = Vec<(DatapathId, Message)>;

/// Expand a virtual packet-out. Validation happens before any state is
/// touched, so an error leaves the buffer map untouched and nothing has
/// been emitted.
pub fn translate_packet_out(
    ports: &PortMap,
    buffers: &mut BufferBridge,
    switches: &[DatapathId],
    po: PacketOut,
) -> Result<Fanout, TranslationError> {
    let virtual_buffer = po.output_payload.buffer_id();
    if let Some(vbid) = virtual_buffer {
        if !buffers.contains(vbid) {
            return Err(TranslationError::BufferUnknown(vbid));
        }
    }

    // the switch the packet entered at, with its physical ingress port
    let origin: Option<(DatapathId, Option<u16>)> = match po.port_id {
        Some(v) => {
            let (dpid, phys) = ports.phys_of_virt_strict(v)?;
            Some((dpid, Some(phys)))
        }
        None => virtual_buffer
            .and_then(|vbid| buffers.peek_dpid(vbid))
            .map(|dpid| (dpid, None)),
    };

    let mut acc: Vec<Action> = vec![];
    let mut plans: Vec<(DatapathId, Option<u16>, Vec<Action>)> = vec![];
    for act in po.apply_actions {
        match act {
            Action::Output(PseudoPort::PhysicalPort(v)) => {
                let (dpid, phys) = ports.phys_of_virt_strict(v)?;
                let in_port = match origin {
                    Some((od, op)) if od == dpid => op,
                    _ => None,
                };
                let mut actions = acc.clone();
                actions.push(Action::Output(PseudoPort::PhysicalPort(phys)));
                plans.push((dpid, in_port, actions));
            }
            Action::Output(PseudoPort::Flood) | Action::Output(PseudoPort::AllPorts) => {
                // ALL collapses to FLOOD on every switch, as on the
                // flow-mod path
                let mut flood = acc.clone();
                flood.push(Action::Output(PseudoPort::Flood));
                match origin {
                    Some((od, op)) => {
                        plans.push((od, op, flood.clone()));
                        for &dpid in switches.iter().filter(|&&d| d != od) {
                            plans.push((dpid, None, flood.clone()));
                        }
                    }
                    None => {
                        for &dpid in switches {
                            plans.push((dpid, None, flood.clone()));
                        }
                    }
                }
            }
            Action::Output(PseudoPort::InPort) => {
                let (od, op) = match origin {
                    Some((od, Some(op))) => (od, op),
                    _ => return Err(TranslationError::UnsupportedTarget(PseudoPort::InPort)),
                };
                let mut actions = acc.clone();
                actions.push(Action::Output(PseudoPort::InPort));
                plans.push((od, Some(op), actions));
            }
            Action::Output(pp) => return Err(TranslationError::UnsupportedTarget(pp)),
            other => acc.push(other),
        }
    }

    // consume the buffer, at most once, only now that translation cannot fail
    let cached: Option<BufferedPacket> = match virtual_buffer {
        Some(vbid) => Some(
            buffers
                .take(vbid)
                .ok_or(TranslationError::BufferUnknown(vbid))?,
        ),
        None => None,
    };
    let inline_data = match cached {
        Some(ref b) => b.data.clone(),
        None => po.output_payload.bytes().to_vec(),
    };

    let mut switch_buffer_spent = false;
    let fanout = plans
        .into_iter()
        .map(|(dpid, in_port, actions)| {
            let payload = match cached {
                Some(ref b)
                    if !switch_buffer_spent && dpid == b.dpid && b.switch_buffer_id.is_some() =>
                {
                    switch_buffer_spent = true;
                    Payload::Buffered(b.switch_buffer_id.unwrap(), vec![])
                }
                _ => Payload::NotBuffered(inline_data.clone()),
            };
            (
                dpid,
                Message::PacketOut(PacketOut {
                    output_payload: payload,
                    port_id: in_port,
                    apply_actions: actions,
                }),
            )
        })
        .collect();
    Ok(fanout)
}

/// Expand a virtual flow-mod along the paths that realize its outputs.
pub fn translate_flow_mod(
    ports: &PortMap,
    buffers: &mut BufferBridge,
    topo: &Topology,
    switches: &[DatapathId],
    fm: FlowMod,
) -> Result<Fanout, TranslationError> {
    match fm.command {
        FlowModCmd::AddFlow | FlowModCmd::ModFlow | FlowModCmd::ModStrictFlow => {
            translate_flow_add(ports, buffers, topo, fm)
        }
        FlowModCmd::DeleteFlow | FlowModCmd::DeleteStrictFlow => {
            translate_flow_delete(ports, topo, switches, fm)
        }
    }
}

fn hop_flow_mod(template: &FlowMod, hop: &Hop, actions: Vec<Action>) -> FlowMod {
    let mut pattern = template.pattern.clone();
    pattern.in_port = Some(hop.in_port);
    FlowMod {
        command: template.command,
        pattern,
        priority: template.priority,
        actions,
        cookie: template.cookie,
        idle_timeout: template.idle_timeout,
        hard_timeout: template.hard_timeout,
        notify_when_removed: template.notify_when_removed,
        apply_to_packet: None,
        out_port: None,
        check_overlap: template.check_overlap,
    }
}

fn translate_flow_add(
    ports: &PortMap,
    buffers: &mut BufferBridge,
    topo: &Topology,
    fm: FlowMod,
) -> Result<Fanout, TranslationError> {
    let in_virt = fm
        .pattern
        .in_port
        .ok_or(TranslationError::BadOutPort(OfpPort::OFPPNone as u16))?;
    let (in_dpid, in_phys) = ports.phys_of_virt_strict(in_virt)?;

    if let Some(vbid) = fm.apply_to_packet {
        if !buffers.contains(vbid) {
            return Err(TranslationError::BufferUnknown(vbid));
        }
    }

    let mut acc: Vec<Action> = vec![];
    let mut paths: Vec<Vec<Hop>> = vec![];
    for act in &fm.actions {
        match *act {
            Action::Output(PseudoPort::PhysicalPort(v)) => {
                let (out_dpid, out_phys) = ports.phys_of_virt_strict(v)?;
                let path = if in_dpid == out_dpid {
                    vec![Hop::new(in_dpid, in_phys, out_phys)]
                } else {
                    topo.find_path(in_dpid, in_phys, out_dpid, out_phys)
                };
                if path.is_empty() {
                    return Err(TranslationError::BadOutPort(v));
                }
                paths.push(path);
            }
            Action::Output(PseudoPort::Flood) | Action::Output(PseudoPort::AllPorts) => {
                let hops = topo.broadcast_hops(in_dpid, in_phys);
                if hops.is_empty() {
                    // no spanning tree known; best-effort flood at the origin
                    paths.push(vec![Hop {
                        dpid: in_dpid,
                        in_port: in_phys,
                        out: PseudoPort::Flood,
                    }]);
                } else {
                    paths.push(hops);
                }
            }
            Action::Output(PseudoPort::InPort) => {
                paths.push(vec![Hop {
                    dpid: in_dpid,
                    in_port: in_phys,
                    out: PseudoPort::InPort,
                }]);
            }
            Action::Output(PseudoPort::Controller(n)) => {
                paths.push(vec![Hop {
                    dpid: in_dpid,
                    in_port: in_phys,
                    out: PseudoPort::Controller(n),
                }]);
            }
            Action::Output(pp) => return Err(TranslationError::UnsupportedTarget(pp)),
            ref other => acc.push(*other),
        }
    }

    let mut fanout: Fanout = vec![];
    let mut tail: Option<(DatapathId, u16, Vec<Action>)> = None;
    for path in &paths {
        let last = path.len() - 1;
        for (i, hop) in path.iter().enumerate() {
            let actions = if i == last {
                let mut actions = acc.clone();
                actions.push(Action::Output(hop.out));
                actions
            } else {
                vec![Action::Output(hop.out)]
            };
            if i == last {
                tail = Some((hop.dpid, hop.in_port, actions.clone()));
            }
            fanout.push((hop.dpid, Message::FlowMod(hop_flow_mod(&fm, hop, actions))));
        }
    }

    // the buffered packet the flow-mod was meant to release: send it along
    // the freshly installed final hop
    if let Some(vbid) = fm.apply_to_packet {
        let cached = buffers
            .take(vbid)
            .ok_or(TranslationError::BufferUnknown(vbid))?;
        if let Some((dpid, in_port, actions)) = tail {
            fanout.push((
                dpid,
                Message::PacketOut(PacketOut {
                    output_payload: Payload::NotBuffered(cached.data),
                    port_id: Some(in_port),
                    apply_actions: actions,
                }),
            ));
        }
    }
    Ok(fanout)
}

fn translate_flow_delete(
    ports: &PortMap,
    topo: &Topology,
    switches: &[DatapathId],
    fm: FlowMod,
) -> Result<Fanout, TranslationError> {
    let broadcast = |pattern_in: Option<u16>| -> Fanout {
        let mut template = fm.clone();
        template.pattern.in_port = pattern_in;
        template.apply_to_packet = None;
        template.out_port = None;
        switches
            .iter()
            .map(|&dpid| (dpid, Message::FlowMod(template.clone())))
            .collect()
    };

    match (fm.pattern.in_port, fm.out_port) {
        // unscoped delete reaches the whole fabric
        (None, None) => Ok(broadcast(None)),
        (Some(p), None) if p == OfpPort::OFPPLocal as u16 => Ok(broadcast(None)),
        (Some(v), None) => {
            if v >= OfpPort::OFPPMax as u16 {
                return Err(TranslationError::BadDeleteScope);
            }
            let (dpid, phys) = ports.phys_of_virt_strict(v)?;
            let mut out = fm.clone();
            out.pattern.in_port = Some(phys);
            out.apply_to_packet = None;
            out.out_port = None;
            Ok(vec![(dpid, Message::FlowMod(out))])
        }
        (Some(vi), Some(PseudoPort::PhysicalPort(vo))) => {
            if vi >= OfpPort::OFPPMax as u16 {
                return Err(TranslationError::BadDeleteScope);
            }
            let (in_dpid, in_phys) = ports.phys_of_virt_strict(vi)?;
            let (out_dpid, out_phys) = ports.phys_of_virt_strict(vo)?;
            let path = if in_dpid == out_dpid {
                vec![Hop::new(in_dpid, in_phys, out_phys)]
            } else {
                topo.find_path(in_dpid, in_phys, out_dpid, out_phys)
            };
            if path.is_empty() {
                return Err(TranslationError::BadOutPort(vo));
            }
            Ok(path
                .iter()
                .map(|hop| {
                    let mut out = fm.clone();
                    out.pattern.in_port = Some(hop.in_port);
                    out.apply_to_packet = None;
                    out.out_port = Some(hop.out);
                    (hop.dpid, Message::FlowMod(out))
                })
                .collect())
        }
        _ => Err(TranslationError::BadDeleteScope),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowvisor::message::{Pattern, PortDesc, Timeout};
    use flowvisor::port_map::PortMap;
    use flowvisor::topology::FabricTopology;

    fn desc(port_no: u16) -> PortDesc {
        use flowvisor::message::{PortConfig, PortFeatures, PortState, StpState};
        let feats = PortFeatures {
            f_10mbhd: false,
            f_10mbfd: false,
            f_100mbhd: false,
            f_100mbfd: false,
            f_1gbhd: false,
            f_1gbfd: true,
            f_10gbfd: false,
            copper: true,
            fiber: false,
            autoneg: true,
            pause: false,
            pause_asym: false,
        };
        PortDesc {
            port_no,
            hw_addr: u64::from(port_no),
            name: format!("eth{}", port_no),
            config: PortConfig {
                down: false,
                no_stp: false,
                no_recv: false,
                no_recv_stp: false,
                no_flood: false,
                no_fwd: false,
                no_packet_in: false,
            },
            state: PortState {
                down: false,
                stp_state: StpState::Forward,
            },
            curr: feats,
            advertised: feats,
            supported: feats,
            peer: feats,
        }
    }

    /// dpid 1 ports {1,2} -> virtual {10,11}; dpid 2 port 2 -> virtual 12;
    /// transit link 1:3 <-> 2:3
    fn fabric() -> (PortMap, FabricTopology, Vec<DatapathId>) {
        let mut ports = PortMap::new();
        ports.add_port(1, 1, desc(1));
        ports.add_port(1, 2, desc(2));
        ports.add_port(2, 2, desc(2));
        let mut topo = FabricTopology::new();
        topo.add_channel(1);
        topo.add_channel(2);
        topo.add_link(1, 3, 2, 3);
        (ports, topo, vec![1, 2])
    }

    fn flow_mod(in_port: u16, actions: Vec<Action>) -> FlowMod {
        let mut pattern = Pattern::match_all();
        pattern.in_port = Some(in_port);
        FlowMod {
            command: FlowModCmd::AddFlow,
            pattern,
            priority: 10,
            actions,
            cookie: 7,
            idle_timeout: Timeout::ExpiresAfter(60),
            hard_timeout: Timeout::Permanent,
            notify_when_removed: false,
            apply_to_packet: None,
            out_port: None,
            check_overlap: false,
        }
    }

    fn as_flow_mod(msg: &Message) -> &FlowMod {
        match *msg {
            Message::FlowMod(ref fm) => fm,
            ref other => panic!("expected FlowMod, got {:?}", other),
        }
    }

    fn as_packet_out(msg: &Message) -> &PacketOut {
        match *msg {
            Message::PacketOut(ref po) => po,
            ref other => panic!("expected PacketOut, got {:?}", other),
        }
    }

    #[test]
    fn single_switch_flow_add() {
        let (ports, topo, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let fm = flow_mod(10, vec![Action::Output(PseudoPort::PhysicalPort(11))]);
        let out = translate_flow_mod(&ports, &mut buffers, &topo, &switches, fm).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, 1);
        let fm = as_flow_mod(&out[0].1);
        assert_eq!(fm.pattern.in_port, Some(1));
        assert_eq!(
            fm.actions,
            vec![Action::Output(PseudoPort::PhysicalPort(2))]
        );
        assert_eq!(fm.apply_to_packet, None);
        assert_eq!(fm.out_port, None);
    }

    #[test]
    fn cross_switch_flow_add_places_rewrites_on_the_last_hop() {
        let (ports, topo, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let fm = flow_mod(
            10,
            vec![
                Action::SetDlDst(0xAABB),
                Action::Output(PseudoPort::PhysicalPort(12)),
            ],
        );
        let out = translate_flow_mod(&ports, &mut buffers, &topo, &switches, fm).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, 1);
        let first = as_flow_mod(&out[0].1);
        assert_eq!(first.pattern.in_port, Some(1));
        assert_eq!(
            first.actions,
            vec![Action::Output(PseudoPort::PhysicalPort(3))]
        );

        assert_eq!(out[1].0, 2);
        let second = as_flow_mod(&out[1].1);
        assert_eq!(second.pattern.in_port, Some(3));
        assert_eq!(
            second.actions,
            vec![
                Action::SetDlDst(0xAABB),
                Action::Output(PseudoPort::PhysicalPort(2)),
            ]
        );
    }

    #[test]
    fn flow_add_with_buffer_releases_the_packet_at_the_last_hop() {
        let (ports, topo, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let vbid = buffers.store(1, Some(42), vec![0xDE, 0xAD]);
        let mut fm = flow_mod(10, vec![Action::Output(PseudoPort::PhysicalPort(12))]);
        fm.apply_to_packet = Some(vbid);
        let out = translate_flow_mod(&ports, &mut buffers, &topo, &switches, fm).unwrap();

        assert_eq!(out.len(), 3);
        let po = as_packet_out(&out[2].1);
        assert_eq!(out[2].0, 2);
        assert_eq!(po.output_payload, Payload::NotBuffered(vec![0xDE, 0xAD]));
        assert_eq!(po.port_id, Some(3));
        assert_eq!(
            po.apply_actions,
            vec![Action::Output(PseudoPort::PhysicalPort(2))]
        );
        assert!(buffers.is_empty());
    }

    #[test]
    fn flow_add_to_unknown_port_is_rejected() {
        let (ports, topo, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let fm = flow_mod(10, vec![Action::Output(PseudoPort::PhysicalPort(99))]);
        assert_eq!(
            translate_flow_mod(&ports, &mut buffers, &topo, &switches, fm),
            Err(TranslationError::BadOutPort(99))
        );
    }

    #[test]
    fn flow_add_to_table_is_rejected() {
        let (ports, topo, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let fm = flow_mod(10, vec![Action::Output(PseudoPort::Table)]);
        assert_eq!(
            translate_flow_mod(&ports, &mut buffers, &topo, &switches, fm),
            Err(TranslationError::UnsupportedTarget(PseudoPort::Table))
        );
    }

    #[test]
    fn flow_add_without_in_port_is_rejected() {
        let (ports, topo, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let mut fm = flow_mod(10, vec![Action::Output(PseudoPort::PhysicalPort(11))]);
        fm.pattern.in_port = None;
        assert!(translate_flow_mod(&ports, &mut buffers, &topo, &switches, fm).is_err());
    }

    #[test]
    fn unscoped_delete_broadcasts() {
        let (ports, topo, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let mut fm = flow_mod(10, vec![]);
        fm.command = FlowModCmd::DeleteFlow;
        fm.pattern.in_port = None;
        let out = translate_flow_mod(&ports, &mut buffers, &topo, &switches, fm).unwrap();
        let dpids: Vec<DatapathId> = out.iter().map(|e| e.0).collect();
        assert_eq!(dpids, vec![1, 2]);
        for (_, msg) in &out {
            assert_eq!(as_flow_mod(msg).pattern.in_port, None);
        }
    }

    #[test]
    fn scoped_delete_goes_to_the_owning_switch() {
        let (ports, topo, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let mut fm = flow_mod(11, vec![]);
        fm.command = FlowModCmd::DeleteStrictFlow;
        let out = translate_flow_mod(&ports, &mut buffers, &topo, &switches, fm).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, 1);
        assert_eq!(as_flow_mod(&out[0].1).pattern.in_port, Some(2));
    }

    #[test]
    fn port_scoped_delete_follows_the_path() {
        let (ports, topo, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let mut fm = flow_mod(10, vec![]);
        fm.command = FlowModCmd::DeleteFlow;
        fm.out_port = Some(PseudoPort::PhysicalPort(12));
        let out = translate_flow_mod(&ports, &mut buffers, &topo, &switches, fm).unwrap();
        assert_eq!(out.len(), 2);
        let first = as_flow_mod(&out[0].1);
        assert_eq!(out[0].0, 1);
        assert_eq!(first.pattern.in_port, Some(1));
        assert_eq!(first.out_port, Some(PseudoPort::PhysicalPort(3)));
        let second = as_flow_mod(&out[1].1);
        assert_eq!(out[1].0, 2);
        assert_eq!(second.out_port, Some(PseudoPort::PhysicalPort(2)));
    }

    #[test]
    fn delete_with_flood_out_port_is_rejected() {
        let (ports, topo, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let mut fm = flow_mod(10, vec![]);
        fm.command = FlowModCmd::DeleteFlow;
        fm.out_port = Some(PseudoPort::Flood);
        assert_eq!(
            translate_flow_mod(&ports, &mut buffers, &topo, &switches, fm),
            Err(TranslationError::BadDeleteScope)
        );
    }

    fn packet_out(port_id: Option<u16>, actions: Vec<Action>) -> PacketOut {
        PacketOut {
            output_payload: Payload::NotBuffered(vec![1, 2, 3]),
            port_id,
            apply_actions: actions,
        }
    }

    #[test]
    fn packet_out_to_port_translates_both_ports() {
        let (ports, _, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let po = packet_out(Some(10), vec![Action::Output(PseudoPort::PhysicalPort(11))]);
        let out = translate_packet_out(&ports, &mut buffers, &switches, po).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, 1);
        let po = as_packet_out(&out[0].1);
        assert_eq!(po.port_id, Some(1));
        assert_eq!(
            po.apply_actions,
            vec![Action::Output(PseudoPort::PhysicalPort(2))]
        );
    }

    #[test]
    fn packet_out_flood_reaches_every_switch() {
        let (ports, _, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let po = packet_out(Some(10), vec![Action::Output(PseudoPort::Flood)]);
        let out = translate_packet_out(&ports, &mut buffers, &switches, po).unwrap();
        assert_eq!(out.len(), 2);
        // origin keeps its ingress port, the other switch gets none
        assert_eq!(out[0].0, 1);
        assert_eq!(as_packet_out(&out[0].1).port_id, Some(1));
        assert_eq!(out[1].0, 2);
        assert_eq!(as_packet_out(&out[1].1).port_id, None);
        for (_, msg) in &out {
            assert_eq!(
                as_packet_out(msg).apply_actions,
                vec![Action::Output(PseudoPort::Flood)]
            );
        }
    }

    #[test]
    fn packet_out_all_collapses_to_flood() {
        let (ports, _, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let po = packet_out(Some(10), vec![Action::Output(PseudoPort::AllPorts)]);
        let out = translate_packet_out(&ports, &mut buffers, &switches, po).unwrap();
        assert_eq!(out.len(), 2);
        for (_, msg) in &out {
            assert_eq!(
                as_packet_out(msg).apply_actions,
                vec![Action::Output(PseudoPort::Flood)]
            );
        }
    }

    #[test]
    fn buffered_packet_out_across_switches_carries_data_inline() {
        let (ports, _, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let vbid = buffers.store(1, Some(42), vec![9, 9, 9]);
        let po = PacketOut {
            output_payload: Payload::Buffered(vbid, vec![]),
            port_id: Some(10),
            apply_actions: vec![Action::Output(PseudoPort::PhysicalPort(12))],
        };
        let out = translate_packet_out(&ports, &mut buffers, &switches, po).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, 2);
        let po = as_packet_out(&out[0].1);
        assert_eq!(po.output_payload, Payload::NotBuffered(vec![9, 9, 9]));
        assert!(buffers.is_empty());
    }

    #[test]
    fn buffered_packet_out_to_origin_reuses_the_switch_buffer() {
        let (ports, _, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let vbid = buffers.store(1, Some(42), vec![9, 9, 9]);
        let po = PacketOut {
            output_payload: Payload::Buffered(vbid, vec![]),
            port_id: Some(10),
            apply_actions: vec![Action::Output(PseudoPort::PhysicalPort(11))],
        };
        let out = translate_packet_out(&ports, &mut buffers, &switches, po).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, 1);
        assert_eq!(
            as_packet_out(&out[0].1).output_payload,
            Payload::Buffered(42, vec![])
        );
    }

    #[test]
    fn unknown_buffer_emits_nothing() {
        let (ports, _, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let po = PacketOut {
            output_payload: Payload::Buffered(99999, vec![]),
            port_id: Some(10),
            apply_actions: vec![Action::Output(PseudoPort::PhysicalPort(11))],
        };
        assert_eq!(
            translate_packet_out(&ports, &mut buffers, &switches, po),
            Err(TranslationError::BufferUnknown(99999))
        );
    }

    #[test]
    fn packet_out_to_controller_is_rejected() {
        let (ports, _, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let po = packet_out(Some(10), vec![Action::Output(PseudoPort::Controller(0))]);
        assert_eq!(
            translate_packet_out(&ports, &mut buffers, &switches, po),
            Err(TranslationError::UnsupportedTarget(PseudoPort::Controller(0)))
        );
    }

    #[test]
    fn set_actions_prefix_carries_into_each_emission() {
        let (ports, _, switches) = fabric();
        let mut buffers = BufferBridge::new();
        let po = packet_out(
            Some(10),
            vec![
                Action::SetNwTos(7),
                Action::Output(PseudoPort::PhysicalPort(11)),
                Action::Output(PseudoPort::PhysicalPort(12)),
            ],
        );
        let out = translate_packet_out(&ports, &mut buffers, &switches, po).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(
            as_packet_out(&out[0].1).apply_actions,
            vec![
                Action::SetNwTos(7),
                Action::Output(PseudoPort::PhysicalPort(2)),
            ]
        );
        assert_eq!(
            as_packet_out(&out[1].1).apply_actions,
            vec![
                Action::SetNwTos(7),
                Action::Output(PseudoPort::PhysicalPort(2)),
            ]
        );
    }
}
