//! The virtualization engine: every OpenFlow message entering the proxy
//! passes through here, in both directions. Entry points are synchronous
//! and return the messages to send, in order; the session layer owns the
//! sockets and performs the sends.

use std::collections::HashMap;
use std::time::Instant;

use flowvisor::buffer_bridge::BufferBridge;
use flowvisor::message::{
    BadRequest, Capabilities, Error, ErrorType, FlowRemoved, Message, PacketIn, Pattern, Payload,
    PortDesc, PortReason, PortStatus, StatsReq, StatsResp, StatsRespBody, SupportedActions,
    SwitchConfig, SwitchFeatures, STATS_REPLY_MORE,
};
use flowvisor::ofp_header::Xid;
use flowvisor::openflow::OfpPort;
use flowvisor::packet::{Packet, ETHERTYPE_LLDP};
use flowvisor::port_map::PortMap;
use flowvisor::slice::{SliceId, SliceRegistry};
use flowvisor::stats::{self, StatsPlan};
use flowvisor::topology::{DatapathId, Topology};
use flowvisor::translate::{self, TranslationError};
use flowvisor::xid::{Accumulator, CompletedXid, ReplyStatus, XidTracker};

/// Pushed to every physical switch right after its handshake.
pub const SWITCH_MISS_SEND_LEN: u16 = 0x1fff;

/// Reported to controllers asking for the virtual switch config.
pub const CONTROLLER_MISS_SEND_LEN: u16 = 3000;

/// One message to send, addressed to a switch or to a slice's controller.
#[derive(Debug, Clone)]
pub enum Emission {
    Switch(DatapathId, Xid, Message),
    Controller(SliceId, Xid, Message),
}

pub struct Engine {
    ports: PortMap,
    buffers: BufferBridge,
    xids: XidTracker,
    slices: SliceRegistry,
    switches: HashMap<DatapathId, SwitchFeatures>,
    topology: Box<Topology + Send>,
}

impl Engine {
    pub fn new(topology: Box<Topology + Send>) -> Engine {
        Engine {
            ports: PortMap::new(),
            buffers: BufferBridge::new(),
            xids: XidTracker::new(),
            slices: SliceRegistry::new(),
            switches: HashMap::new(),
            topology,
        }
    }

    pub fn ports(&self) -> &PortMap {
        &self.ports
    }

    pub fn buffers(&self) -> &BufferBridge {
        &self.buffers
    }

    pub fn xids(&self) -> &XidTracker {
        &self.xids
    }

    pub fn slices(&self) -> &SliceRegistry {
        &self.slices
    }

    fn switch_list(&self) -> Vec<DatapathId> {
        let mut dpids: Vec<DatapathId> = self.switches.keys().cloned().collect();
        dpids.sort();
        dpids
    }

    // ---- management surface ------------------------------------------------

    pub fn add_slice(&mut self, filter: Pattern, dpid: DatapathId) -> SliceId {
        let id = self.slices.add(filter, dpid);
        info!("registered {} as virtual datapath {:#x}", id, dpid);
        id
    }

    /// A controller session went away: reclaim its slice entry and every
    /// fan-out that would have delivered to it.
    pub fn controller_leave(&mut self, slice: SliceId) {
        let dropped = self.xids.drop_slice(slice);
        if dropped > 0 {
            debug!("dropped {} pending aggregations of {}", dropped, slice);
        }
        self.slices.remove(slice);
    }

    // ---- switch-side events (C9) -------------------------------------------

    /// DATAPATH_JOIN: a physical switch completed its handshake.
    pub fn switch_joined(&mut self, dpid: DatapathId, features: SwitchFeatures) -> Vec<Emission> {
        info!(
            "datapath {:#x} joined with {} ports",
            dpid,
            features.ports.len()
        );
        self.topology.add_channel(dpid);
        let mut out = vec![Emission::Switch(
            dpid,
            self.xids.fresh(),
            Message::SetConfig(SwitchConfig {
                flags: 0,
                miss_send_len: SWITCH_MISS_SEND_LEN,
            }),
        )];
        let ports: Vec<PortDesc> = features.ports.clone();
        self.switches.insert(dpid, features);
        for desc in ports {
            out.extend(self.map_port(dpid, desc));
        }
        out
    }

    /// DATAPATH_LEAVE: tear down everything the switch owned.
    pub fn switch_left(&mut self, dpid: DatapathId) -> Vec<Emission> {
        info!("datapath {:#x} left", dpid);
        self.switches.remove(&dpid);
        self.topology.remove_dpid(dpid);
        self.buffers.purge_switch(dpid);
        let mut out = vec![];
        for (virt, desc) in self.ports.remove_switch(dpid) {
            out.extend(self.port_status_to_slices(PortReason::PortDelete, virt, desc));
        }
        let completed = self.xids.drop_switch(dpid);
        for done in completed {
            out.extend(self.deliver_completed(done));
        }
        out
    }

    /// Any message arriving from an established switch channel.
    pub fn switch_message(&mut self, dpid: DatapathId, xid: Xid, msg: Message) -> Vec<Emission> {
        match msg {
            Message::EchoRequest(bytes) => {
                vec![Emission::Switch(dpid, xid, Message::EchoReply(bytes))]
            }
            Message::EchoReply(_) => vec![],
            Message::PacketIn(pi) => self.packet_in(dpid, pi),
            Message::FlowRemoved(fr) => self.flow_removed(dpid, fr),
            Message::StatsReply(resp) => self.stats_reply(dpid, xid, resp),
            Message::PortStatus(ps) => self.port_status(dpid, ps),
            Message::Error(Error::Error(code, _)) => {
                warn!("datapath {:#x} reported error {:?}", dpid, code);
                vec![]
            }
            Message::BarrierReply | Message::GetConfigReply(_) | Message::Hello => vec![],
            other => {
                debug!("ignoring {:?} from datapath {:#x}", other, dpid);
                vec![]
            }
        }
    }

    fn map_port(&mut self, dpid: DatapathId, desc: PortDesc) -> Vec<Emission> {
        // reserved numbers (the switch-local port among them) stay unmapped
        if desc.port_no > OfpPort::OFPPMax as u16 {
            return vec![];
        }
        self.topology.add_port(dpid, desc.port_no);
        let virt = self.ports.add_port(dpid, desc.port_no, desc);
        let desc = match self.ports.desc_of_virt(virt) {
            Some(desc) => desc,
            None => return vec![],
        };
        self.port_status_to_slices(PortReason::PortAdd, virt, desc)
    }

    fn port_status_to_slices(
        &self,
        reason: PortReason,
        virt: u16,
        mut desc: PortDesc,
    ) -> Vec<Emission> {
        desc.port_no = virt;
        self.slices
            .ids()
            .into_iter()
            .map(|slice| {
                Emission::Controller(
                    slice,
                    0,
                    Message::PortStatus(PortStatus {
                        reason,
                        desc: desc.clone(),
                    }),
                )
            })
            .collect()
    }

    fn port_status(&mut self, dpid: DatapathId, ps: PortStatus) -> Vec<Emission> {
        match ps.reason {
            PortReason::PortAdd => self.map_port(dpid, ps.desc),
            PortReason::PortDelete => {
                self.topology.remove_port(dpid, ps.desc.port_no);
                match self.ports.remove_port(dpid, ps.desc.port_no) {
                    Some((virt, desc)) => {
                        self.port_status_to_slices(PortReason::PortDelete, virt, desc)
                    }
                    None => vec![],
                }
            }
            PortReason::PortModify => {
                let port_no = ps.desc.port_no;
                match self.ports.virt_of_phys(dpid, port_no) {
                    Some(virt) => {
                        self.ports.add_port(dpid, port_no, ps.desc.clone());
                        self.port_status_to_slices(PortReason::PortModify, virt, ps.desc)
                    }
                    None => self.map_port(dpid, ps.desc),
                }
            }
        }
    }

    /// C7: classify an incoming packet and hand it to the slices that own
    /// its flow-space.
    fn packet_in(&mut self, dpid: DatapathId, pi: PacketIn) -> Vec<Emission> {
        let data = pi.input_payload.bytes().to_vec();
        let pk = match Packet::parse(&data) {
            Some(pk) => pk,
            None => {
                debug!("unparseable packet-in from datapath {:#x}", dpid);
                return vec![];
            }
        };
        if pk.dl_typ == ETHERTYPE_LLDP && self.topology.process_lldp(dpid, pi.port, &data) {
            return vec![];
        }
        if self.topology.is_transit_port(dpid, pi.port) {
            return vec![];
        }
        let virt = match self.ports.virt_of_phys(dpid, pi.port) {
            Some(virt) => virt,
            None => {
                warn!(
                    "packet-in on unmapped port {} of datapath {:#x}",
                    pi.port, dpid
                );
                return vec![];
            }
        };
        let slices = self.slices.matching_packet(&pk, virt);
        if slices.is_empty() {
            return vec![];
        }
        let vbid = self
            .buffers
            .store(dpid, pi.input_payload.buffer_id(), data.clone());
        let translated = PacketIn {
            input_payload: Payload::Buffered(vbid, data),
            total_len: pi.total_len,
            port: virt,
            reason: pi.reason,
        };
        slices
            .into_iter()
            .map(|slice| Emission::Controller(slice, 0, Message::PacketIn(translated.clone())))
            .collect()
    }

    fn flow_removed(&mut self, dpid: DatapathId, mut fr: FlowRemoved) -> Vec<Emission> {
        fr.pattern.in_port = fr
            .pattern
            .in_port
            .and_then(|phys| self.ports.virt_of_phys(dpid, phys));
        self.slices
            .covering_flow(&fr.pattern)
            .into_iter()
            .map(|slice| Emission::Controller(slice, 0, Message::FlowRemoved(fr.clone())))
            .collect()
    }

    /// C6 fan-in: merge one switch reply into its xid record.
    fn stats_reply(&mut self, dpid: DatapathId, xid: Xid, resp: StatsResp) -> Vec<Emission> {
        let more = resp.flags & STATS_REPLY_MORE != 0;
        let chunk = match resp.body {
            StatsRespBody::FlowStatsBody { flow_stats } => {
                Accumulator::Flows(stats::virtualize_flow_stats(&self.ports, dpid, flow_stats))
            }
            StatsRespBody::AggregateStatsBody {
                packet_count,
                byte_count,
                flow_count,
            } => Accumulator::Aggregate {
                packet_count,
                byte_count,
                flow_count,
            },
            StatsRespBody::TableBody { table_stats } => Accumulator::Tables(table_stats),
            StatsRespBody::PortBody { port_stats } => {
                Accumulator::Ports(stats::virtualize_port_stats(&self.ports, dpid, port_stats))
            }
            StatsRespBody::DescBody { .. } => {
                debug!("unsolicited desc stats from datapath {:#x}", dpid);
                return vec![];
            }
        };
        match self.xids.record_reply(xid, dpid, chunk, more) {
            ReplyStatus::Complete(done) => self.deliver_completed(done),
            ReplyStatus::Partial => vec![],
            ReplyStatus::Unknown => {
                debug!("stats reply for unknown xid {} from {:#x}", xid, dpid);
                vec![]
            }
        }
    }

    fn deliver_completed(&self, done: CompletedXid) -> Vec<Emission> {
        if self.slices.get(done.src_slice).is_none() {
            // session already gone; nothing to deliver to
            return vec![];
        }
        let src_slice = done.src_slice;
        let src_xid = done.src_xid;
        stats::frames_of_accumulator(done.accumulator)
            .into_iter()
            .map(|frame| Emission::Controller(src_slice, src_xid, Message::StatsReply(frame)))
            .collect()
    }

    /// Flush stats aggregations stuck past the timeout.
    pub fn sweep_xids(&mut self, now: Instant) -> Vec<Emission> {
        let flushed = self.xids.sweep(now);
        let mut out = vec![];
        for done in flushed {
            debug!(
                "flushing aggregation for {} xid {} on timeout",
                done.src_slice, done.src_xid
            );
            out.extend(self.deliver_completed(done));
        }
        out
    }

    // ---- controller-side messages (C8) -------------------------------------

    /// A frame whose type code is not part of OpenFlow 1.0, or a modeled
    /// message a switch must never receive.
    pub fn controller_bad_type(&self, slice: SliceId, xid: Xid, raw: &[u8]) -> Vec<Emission> {
        vec![Emission::Controller(
            slice,
            xid,
            Message::Error(Error::Error(
                ErrorType::BadRequest(BadRequest::BadType),
                raw.to_vec(),
            )),
        )]
    }

    /// Any message arriving from a slice's controller session.
    pub fn controller_message(
        &mut self,
        slice: SliceId,
        xid: Xid,
        msg: Message,
        raw: &[u8],
    ) -> Vec<Emission> {
        match msg {
            Message::Hello | Message::SetConfig(_) | Message::EchoReply(_) => vec![],
            Message::EchoRequest(bytes) => {
                vec![Emission::Controller(slice, xid, Message::EchoReply(bytes))]
            }
            Message::FeaturesReq => {
                vec![Emission::Controller(
                    slice,
                    xid,
                    Message::FeaturesReply(self.virtual_features(slice)),
                )]
            }
            Message::GetConfigReq => {
                vec![Emission::Controller(
                    slice,
                    xid,
                    Message::GetConfigReply(SwitchConfig {
                        flags: 0,
                        miss_send_len: CONTROLLER_MISS_SEND_LEN,
                    }),
                )]
            }
            // replied locally; the fabric is not barriered
            Message::BarrierRequest => {
                vec![Emission::Controller(slice, xid, Message::BarrierReply)]
            }
            Message::StatsRequest(req) => self.stats_request(slice, xid, req, raw),
            Message::PacketOut(po) => {
                let switches = self.switch_list();
                let result =
                    translate::translate_packet_out(&self.ports, &mut self.buffers, &switches, po);
                self.fan_out(slice, xid, result, raw)
            }
            Message::FlowMod(fm) => {
                let switches = self.switch_list();
                let result = translate::translate_flow_mod(
                    &self.ports,
                    &mut self.buffers,
                    &*self.topology,
                    &switches,
                    fm,
                );
                self.fan_out(slice, xid, result, raw)
            }
            Message::Error(Error::Error(code, _)) => {
                // answering an error with an error invites a loop
                warn!("{} sent error {:?}", slice, code);
                vec![]
            }
            _ => self.controller_bad_type(slice, xid, raw),
        }
    }

    fn virtual_features(&self, slice: SliceId) -> SwitchFeatures {
        let datapath_id = self.slices.get(slice).map(|s| s.dpid).unwrap_or(0);
        SwitchFeatures {
            datapath_id,
            num_buffers: 0,
            num_tables: 1,
            supported_capabilities: Capabilities {
                flow_stats: true,
                table_stats: true,
                port_stats: true,
                stp: false,
                ip_reasm: false,
                queue_stats: false,
                arp_match_ip: true,
            },
            supported_actions: SupportedActions {
                output: true,
                set_vlan_id: true,
                set_vlan_pcp: true,
                strip_vlan: true,
                set_dl_src: true,
                set_dl_dst: true,
                set_nw_src: true,
                set_nw_dst: true,
                set_nw_tos: true,
                set_tp_src: true,
                set_tp_dst: true,
                enqueue: false,
                vendor: false,
            },
            ports: self.ports.controller_ports(),
        }
    }

    fn stats_request(
        &mut self,
        slice: SliceId,
        xid: Xid,
        req: StatsReq,
        raw: &[u8],
    ) -> Vec<Emission> {
        let plan = match stats::plan_stats_request(&self.ports, &self.switch_list(), req) {
            Ok(plan) => plan,
            Err(err) => return self.translation_error(slice, xid, err, raw),
        };
        match plan {
            StatsPlan::Local(resp) => {
                vec![Emission::Controller(slice, xid, Message::StatsReply(resp))]
            }
            StatsPlan::Fanout { targets, seed } => {
                let pending = StatsPlan::pending(&targets);
                let out_xid = self
                    .xids
                    .allocate(slice, xid, pending, seed, Instant::now());
                targets
                    .into_iter()
                    .map(|(dpid, req)| {
                        Emission::Switch(dpid, out_xid, Message::StatsRequest(req))
                    })
                    .collect()
            }
        }
    }

    fn fan_out(
        &mut self,
        slice: SliceId,
        xid: Xid,
        result: Result<translate::Fanout, TranslationError>,
        raw: &[u8],
    ) -> Vec<Emission> {
        match result {
            Ok(fanout) => fanout
                .into_iter()
                .map(|(dpid, msg)| {
                    let fresh = self.xids.fresh();
                    Emission::Switch(dpid, fresh, msg)
                })
                .collect(),
            Err(err) => self.translation_error(slice, xid, err, raw),
        }
    }

    /// A translation failure becomes one OpenFlow error to the session,
    /// carrying the offending message bytes; the session stays up.
    fn translation_error(
        &self,
        slice: SliceId,
        xid: Xid,
        err: TranslationError,
        raw: &[u8],
    ) -> Vec<Emission> {
        debug!("translation failed for {}: {}", slice, err);
        vec![Emission::Controller(
            slice,
            xid,
            Message::Error(Error::Error(err.error_type(), raw.to_vec())),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowvisor::message::{
        Action, BadAction, FlowMod, FlowModCmd, PacketInReason, PacketOut, PortConfig,
        PortFeatures, PortState, PseudoPort, StatsReqBody, StatsReqType, StpState, Timeout,
    };
    use flowvisor::openflow0x01::ALL_TABLES;
    use flowvisor::topology::FabricTopology;
    use flowvisor::xid::XID_TIMEOUT;
    use std::time::Duration;

    fn phys_desc(port_no: u16) -> PortDesc {
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
            hw_addr: 0x00_00_5e_00_53_00 + u64::from(port_no),
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

    fn features(dpid: DatapathId, ports: &[u16]) -> SwitchFeatures {
        SwitchFeatures {
            datapath_id: dpid,
            num_buffers: 256,
            num_tables: 2,
            supported_capabilities: Capabilities {
                flow_stats: true,
                table_stats: true,
                port_stats: true,
                stp: false,
                ip_reasm: false,
                queue_stats: false,
                arp_match_ip: true,
            },
            supported_actions: SupportedActions {
                output: true,
                set_vlan_id: true,
                set_vlan_pcp: true,
                strip_vlan: true,
                set_dl_src: true,
                set_dl_dst: true,
                set_nw_src: true,
                set_nw_dst: true,
                set_nw_tos: true,
                set_tp_src: true,
                set_tp_dst: true,
                enqueue: false,
                vendor: false,
            },
            ports: ports.iter().map(|&p| phys_desc(p)).collect(),
        }
    }

    /// One switch, dpid 1, ports {1,2} -> virtual {10,11}; one match-all
    /// slice.
    fn single_switch_engine() -> (Engine, SliceId) {
        let mut engine = Engine::new(Box::new(FabricTopology::new()));
        let slice = engine.add_slice(Pattern::match_all(), 0xc0ffee);
        engine.switch_joined(1, features(1, &[1, 2]));
        (engine, slice)
    }

    /// Two switches joined by transit link 1:3 <-> 2:3. Virtual ports:
    /// 10 -> (1,1), 11 -> (1,2), 12 -> (2,2).
    fn two_switch_engine() -> (Engine, SliceId) {
        let mut topo = FabricTopology::new();
        topo.add_link(1, 3, 2, 3);
        let mut engine = Engine::new(Box::new(topo));
        let slice = engine.add_slice(Pattern::match_all(), 0xc0ffee);
        engine.switch_joined(1, features(1, &[1, 2]));
        engine.switch_joined(2, features(2, &[2]));
        (engine, slice)
    }

    fn ipv4_frame() -> Vec<u8> {
        let mut f = vec![
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x08, 0x00,
            0x45, 0x00, 0x00, 0x28, 0x00, 0x00, 0x40, 0x00, 0x40, 0x06, 0x00, 0x00, 0x0a, 0x00,
            0x00, 0x01, 0x0a, 0x00, 0x00, 0x02, 0x0b, 0xb8, 0x00, 0x50,
        ];
        f.extend_from_slice(&[0; 10]);
        f
    }

    fn ipv6_frame() -> Vec<u8> {
        let mut f = vec![
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x86, 0xDD,
        ];
        f.extend_from_slice(&[0; 40]);
        f
    }

    fn arp_frame() -> Vec<u8> {
        let mut f = vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x08, 0x06,
        ];
        f.extend_from_slice(&[0; 28]);
        f
    }

    fn packet_in(port: u16, buffer: Option<u32>, data: Vec<u8>) -> PacketIn {
        let total_len = data.len() as u16;
        PacketIn {
            input_payload: match buffer {
                Some(b) => Payload::Buffered(b, data),
                None => Payload::NotBuffered(data),
            },
            total_len,
            port,
            reason: PacketInReason::NoMatch,
        }
    }

    fn flow_mod(in_port: u16, actions: Vec<Action>) -> FlowMod {
        let mut pattern = Pattern::match_all();
        pattern.in_port = Some(in_port);
        FlowMod {
            command: FlowModCmd::AddFlow,
            pattern,
            priority: 100,
            actions,
            cookie: 0,
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::Permanent,
            notify_when_removed: false,
            apply_to_packet: None,
            out_port: None,
            check_overlap: false,
        }
    }

    fn switch_emissions(out: &[Emission]) -> Vec<(DatapathId, &Message)> {
        out.iter()
            .filter_map(|e| match *e {
                Emission::Switch(dpid, _, ref msg) => Some((dpid, msg)),
                _ => None,
            })
            .collect()
    }

    fn controller_emissions(out: &[Emission]) -> Vec<(SliceId, Xid, &Message)> {
        out.iter()
            .filter_map(|e| match *e {
                Emission::Controller(slice, xid, ref msg) => Some((slice, xid, msg)),
                _ => None,
            })
            .collect()
    }

    // scenario 1
    #[test]
    fn port_translation_round_trip() {
        let (mut engine, slice) = single_switch_engine();
        let fm = flow_mod(10, vec![Action::Output(PseudoPort::PhysicalPort(11))]);
        let out = engine.controller_message(slice, 7, Message::FlowMod(fm), &[]);
        let switch = switch_emissions(&out);
        assert_eq!(switch.len(), 1);
        assert_eq!(switch[0].0, 1);
        match *switch[0].1 {
            Message::FlowMod(ref fm) => {
                assert_eq!(fm.pattern.in_port, Some(1));
                assert_eq!(fm.actions, vec![Action::Output(PseudoPort::PhysicalPort(2))]);
            }
            ref other => panic!("expected FlowMod, got {:?}", other),
        }
    }

    // scenario 2
    #[test]
    fn cross_switch_path() {
        let (mut engine, slice) = two_switch_engine();
        let fm = flow_mod(
            10,
            vec![
                Action::SetDlDst(0xAABB),
                Action::Output(PseudoPort::PhysicalPort(12)),
            ],
        );
        let out = engine.controller_message(slice, 7, Message::FlowMod(fm), &[]);
        let switch = switch_emissions(&out);
        assert_eq!(switch.len(), 2);
        match (switch[0], switch[1]) {
            ((1, &Message::FlowMod(ref first)), (2, &Message::FlowMod(ref second))) => {
                assert_eq!(first.pattern.in_port, Some(1));
                assert_eq!(
                    first.actions,
                    vec![Action::Output(PseudoPort::PhysicalPort(3))]
                );
                assert_eq!(second.pattern.in_port, Some(3));
                assert_eq!(
                    second.actions,
                    vec![
                        Action::SetDlDst(0xAABB),
                        Action::Output(PseudoPort::PhysicalPort(2)),
                    ]
                );
            }
            other => panic!("unexpected emissions {:?}", other),
        }
    }

    // scenario 3
    #[test]
    fn buffer_id_bridging() {
        let (mut engine, slice) = two_switch_engine();
        let data = ipv4_frame();
        let out = engine.switch_message(1, 0, Message::PacketIn(packet_in(1, Some(42), data.clone())));
        let delivered = controller_emissions(&out);
        assert_eq!(delivered.len(), 1);
        let vbid = match *delivered[0].2 {
            Message::PacketIn(ref pi) => {
                assert_eq!(pi.port, 10);
                assert_eq!(pi.input_payload.bytes(), &data[..]);
                pi.input_payload.buffer_id().unwrap()
            }
            ref other => panic!("expected PacketIn, got {:?}", other),
        };

        let po = PacketOut {
            output_payload: Payload::Buffered(vbid, vec![]),
            port_id: Some(10),
            apply_actions: vec![Action::Output(PseudoPort::PhysicalPort(12))],
        };
        let out = engine.controller_message(slice, 9, Message::PacketOut(po), &[]);
        let switch = switch_emissions(&out);
        assert_eq!(switch.len(), 1);
        assert_eq!(switch[0].0, 2);
        match *switch[0].1 {
            Message::PacketOut(ref po) => {
                assert_eq!(po.output_payload, Payload::NotBuffered(data.clone()));
                assert_eq!(
                    po.apply_actions,
                    vec![Action::Output(PseudoPort::PhysicalPort(2))]
                );
            }
            ref other => panic!("expected PacketOut, got {:?}", other),
        }
        assert!(engine.buffers().is_empty());
    }

    // scenario 4
    #[test]
    fn aggregate_fan_in() {
        let mut topo = FabricTopology::new();
        topo.add_link(1, 3, 2, 3);
        let mut engine = Engine::new(Box::new(topo));
        let slice = engine.add_slice(Pattern::match_all(), 0xc0ffee);
        engine.switch_joined(1, features(1, &[1]));
        engine.switch_joined(2, features(2, &[1]));
        engine.switch_joined(3, features(3, &[1]));

        let req = StatsReq {
            req_type: StatsReqType::Aggregate,
            flags: 0,
            body: StatsReqBody::FlowStatsBody {
                pattern: Pattern::match_all(),
                table_id: ALL_TABLES,
                out_port: OfpPort::OFPPNone as u16,
            },
        };
        let out = engine.controller_message(slice, 0xBEEF, Message::StatsRequest(req), &[]);
        let fanned = switch_emissions(&out);
        assert_eq!(fanned.len(), 3);
        let fan_xid = match out[0] {
            Emission::Switch(_, xid, _) => xid,
            ref other => panic!("expected switch emission, got {:?}", other),
        };

        let reply = |p, b, f| {
            Message::StatsReply(StatsResp {
                req_type: StatsReqType::Aggregate,
                flags: 0,
                body: StatsRespBody::AggregateStatsBody {
                    packet_count: p,
                    byte_count: b,
                    flow_count: f,
                },
            })
        };
        // replies arrive out of order
        assert!(engine.switch_message(2, fan_xid, reply(1, 100, 1)).is_empty());
        assert!(engine.switch_message(3, fan_xid, reply(0, 0, 0)).is_empty());
        let out = engine.switch_message(1, fan_xid, reply(5, 500, 2));
        let delivered = controller_emissions(&out);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, slice);
        assert_eq!(delivered[0].1, 0xBEEF);
        match *delivered[0].2 {
            Message::StatsReply(ref resp) => {
                assert_eq!(resp.flags, 0);
                match resp.body {
                    StatsRespBody::AggregateStatsBody {
                        packet_count,
                        byte_count,
                        flow_count,
                    } => {
                        assert_eq!((packet_count, byte_count, flow_count), (6, 600, 3));
                    }
                    ref other => panic!("expected aggregate body, got {:?}", other),
                }
            }
            ref other => panic!("expected StatsReply, got {:?}", other),
        }
        assert!(engine.xids().is_empty());
    }

    // scenario 5
    #[test]
    fn unknown_buffer_id() {
        let (mut engine, slice) = single_switch_engine();
        let po = PacketOut {
            output_payload: Payload::Buffered(99999, vec![]),
            port_id: Some(10),
            apply_actions: vec![Action::Output(PseudoPort::PhysicalPort(11))],
        };
        let raw = vec![0xAA; 16];
        let out = engine.controller_message(slice, 3, Message::PacketOut(po), &raw);
        assert!(switch_emissions(&out).is_empty());
        let delivered = controller_emissions(&out);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].1, 3);
        match *delivered[0].2 {
            Message::Error(Error::Error(ErrorType::BadRequest(BadRequest::BufferUnknown), ref bytes)) => {
                assert_eq!(bytes, &raw);
            }
            ref other => panic!("expected buffer-unknown error, got {:?}", other),
        }
    }

    // scenario 6
    #[test]
    fn slice_filtering() {
        let mut engine = Engine::new(Box::new(FabricTopology::new()));
        let mut ipv4 = Pattern::match_all();
        ipv4.dl_typ = Some(0x0800);
        let mut ipv6 = Pattern::match_all();
        ipv6.dl_typ = Some(0x86DD);
        let slice_a = engine.add_slice(ipv4, 0xa);
        let slice_b = engine.add_slice(ipv6, 0xb);
        engine.switch_joined(1, features(1, &[1]));

        let deliver = |engine: &mut Engine, frame: Vec<u8>| -> Vec<SliceId> {
            let out = engine.switch_message(1, 0, Message::PacketIn(packet_in(1, None, frame)));
            controller_emissions(&out).iter().map(|d| d.0).collect()
        };
        assert_eq!(deliver(&mut engine, ipv4_frame()), vec![slice_a]);
        assert_eq!(deliver(&mut engine, ipv6_frame()), vec![slice_b]);
        assert!(deliver(&mut engine, arp_frame()).is_empty());
    }

    #[test]
    fn port_scoped_slice_only_sees_its_port() {
        let mut engine = Engine::new(Box::new(FabricTopology::new()));
        let mut filter = Pattern::match_all();
        filter.in_port = Some(10);
        let scoped = engine.add_slice(filter, 0xa);
        engine.switch_joined(1, features(1, &[1, 2]));

        let out = engine.switch_message(1, 0, Message::PacketIn(packet_in(1, None, ipv4_frame())));
        let delivered: Vec<SliceId> = controller_emissions(&out).iter().map(|d| d.0).collect();
        assert_eq!(delivered, vec![scoped]);

        // same traffic on the other port stays outside the slice
        let out = engine.switch_message(1, 0, Message::PacketIn(packet_in(2, None, ipv4_frame())));
        assert!(out.is_empty());
    }

    #[test]
    fn features_reply_exposes_only_virtual_ports() {
        let (mut engine, slice) = two_switch_engine();
        let out = engine.controller_message(slice, 4, Message::FeaturesReq, &[]);
        let delivered = controller_emissions(&out);
        assert_eq!(delivered.len(), 1);
        match *delivered[0].2 {
            Message::FeaturesReply(ref feats) => {
                assert_eq!(feats.datapath_id, 0xc0ffee);
                assert_eq!(feats.num_tables, 1);
                assert_eq!(feats.num_buffers, 0);
                let numbers: Vec<u16> = feats.ports.iter().map(|p| p.port_no).collect();
                assert_eq!(numbers, vec![10, 11, 12]);
            }
            ref other => panic!("expected FeaturesReply, got {:?}", other),
        }
    }

    #[test]
    fn echo_barrier_and_config_are_answered_locally() {
        let (mut engine, slice) = single_switch_engine();
        let out = engine.controller_message(slice, 1, Message::EchoRequest(vec![1, 2]), &[]);
        match *controller_emissions(&out)[0].2 {
            Message::EchoReply(ref b) => assert_eq!(b, &vec![1, 2]),
            ref other => panic!("expected EchoReply, got {:?}", other),
        }
        let out = engine.controller_message(slice, 2, Message::BarrierRequest, &[]);
        match *controller_emissions(&out)[0].2 {
            Message::BarrierReply => {}
            ref other => panic!("expected BarrierReply, got {:?}", other),
        }
        assert_eq!(controller_emissions(&out)[0].1, 2);
        let out = engine.controller_message(slice, 3, Message::GetConfigReq, &[]);
        match *controller_emissions(&out)[0].2 {
            Message::GetConfigReply(ref c) => {
                assert_eq!(c.miss_send_len, CONTROLLER_MISS_SEND_LEN)
            }
            ref other => panic!("expected GetConfigReply, got {:?}", other),
        }
    }

    #[test]
    fn switch_only_messages_get_bad_type() {
        let (mut engine, slice) = single_switch_engine();
        let raw = vec![1, 10, 0, 8, 0, 0, 0, 5];
        let pi = packet_in(1, None, ipv4_frame());
        let out = engine.controller_message(slice, 5, Message::PacketIn(pi), &raw);
        match *controller_emissions(&out)[0].2 {
            Message::Error(Error::Error(ErrorType::BadRequest(BadRequest::BadType), ref bytes)) => {
                assert_eq!(bytes, &raw)
            }
            ref other => panic!("expected bad-type error, got {:?}", other),
        }
    }

    #[test]
    fn join_pushes_set_config_and_port_adds() {
        let mut engine = Engine::new(Box::new(FabricTopology::new()));
        let slice = engine.add_slice(Pattern::match_all(), 0xa);
        let out = engine.switch_joined(1, features(1, &[1, 2]));
        match out[0] {
            Emission::Switch(1, _, Message::SetConfig(ref c)) => {
                assert_eq!(c.miss_send_len, SWITCH_MISS_SEND_LEN)
            }
            ref other => panic!("expected SetConfig first, got {:?}", other),
        }
        let adds: Vec<u16> = controller_emissions(&out)
            .iter()
            .filter_map(|&(s, _, msg)| {
                assert_eq!(s, slice);
                match *msg {
                    Message::PortStatus(ref ps) => {
                        assert_eq!(ps.reason, PortReason::PortAdd);
                        Some(ps.desc.port_no)
                    }
                    _ => None,
                }
            })
            .collect();
        assert_eq!(adds, vec![10, 11]);
    }

    #[test]
    fn leave_tears_down_ports_and_buffers() {
        let (mut engine, _) = two_switch_engine();
        engine.switch_message(1, 0, Message::PacketIn(packet_in(1, Some(7), ipv4_frame())));
        assert_eq!(engine.buffers().len(), 1);

        let out = engine.switch_left(1);
        assert!(engine.buffers().is_empty());
        let deletes: Vec<u16> = controller_emissions(&out)
            .iter()
            .filter_map(|&(_, _, msg)| match *msg {
                Message::PortStatus(ref ps) if ps.reason == PortReason::PortDelete => {
                    Some(ps.desc.port_no)
                }
                _ => None,
            })
            .collect();
        assert_eq!(deletes, vec![10, 11]);
        assert_eq!(engine.ports().len(), 1);
    }

    #[test]
    fn switch_loss_completes_pending_aggregations() {
        let (mut engine, slice) = two_switch_engine();
        let req = StatsReq {
            req_type: StatsReqType::Aggregate,
            flags: 0,
            body: StatsReqBody::FlowStatsBody {
                pattern: Pattern::match_all(),
                table_id: ALL_TABLES,
                out_port: OfpPort::OFPPNone as u16,
            },
        };
        let out = engine.controller_message(slice, 0x55, Message::StatsRequest(req), &[]);
        let fan_xid = match out[0] {
            Emission::Switch(_, xid, _) => xid,
            ref other => panic!("expected switch emission, got {:?}", other),
        };
        let reply = Message::StatsReply(StatsResp {
            req_type: StatsReqType::Aggregate,
            flags: 0,
            body: StatsRespBody::AggregateStatsBody {
                packet_count: 2,
                byte_count: 200,
                flow_count: 1,
            },
        });
        assert!(engine.switch_message(1, fan_xid, reply).is_empty());

        let out = engine.switch_left(2);
        let replies: Vec<&Message> = controller_emissions(&out)
            .iter()
            .filter(|d| match *d.2 {
                Message::StatsReply(_) => true,
                _ => false,
            })
            .map(|d| d.2)
            .collect();
        assert_eq!(replies.len(), 1);
        assert!(engine.xids().is_empty());
    }

    #[test]
    fn sweep_flushes_stuck_aggregations_with_the_original_xid() {
        let (mut engine, slice) = single_switch_engine();
        let req = StatsReq {
            req_type: StatsReqType::Flow,
            flags: 0,
            body: StatsReqBody::FlowStatsBody {
                pattern: Pattern::match_all(),
                table_id: ALL_TABLES,
                out_port: OfpPort::OFPPNone as u16,
            },
        };
        engine.controller_message(slice, 0x77, Message::StatsRequest(req), &[]);
        assert_eq!(engine.xids().len(), 1);

        let out = engine.sweep_xids(Instant::now() + XID_TIMEOUT + Duration::from_secs(1));
        let delivered = controller_emissions(&out);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].1, 0x77);
        assert!(engine.xids().is_empty());
    }

    #[test]
    fn controller_leave_reclaims_slice_and_xids() {
        let (mut engine, slice) = single_switch_engine();
        let req = StatsReq {
            req_type: StatsReqType::Port,
            flags: 0,
            body: StatsReqBody::PortBody {
                port_no: OfpPort::OFPPNone as u16,
            },
        };
        engine.controller_message(slice, 1, Message::StatsRequest(req), &[]);
        assert_eq!(engine.xids().len(), 1);
        engine.controller_leave(slice);
        assert!(engine.xids().is_empty());
        assert!(engine.slices().is_empty());
    }

    #[test]
    fn transit_port_packet_ins_are_dropped() {
        let (mut engine, _) = two_switch_engine();
        // port 3 of dpid 1 carries the inter-switch link
        let out = engine.switch_message(1, 0, Message::PacketIn(packet_in(3, None, ipv4_frame())));
        assert!(out.is_empty());
        assert!(engine.buffers().is_empty());
    }

    #[test]
    fn flow_removed_is_translated_and_filtered() {
        let (mut engine, _) = single_switch_engine();
        let mut narrow = Pattern::match_all();
        narrow.dl_typ = Some(0x0800);
        let ip_slice = engine.add_slice(narrow, 0xd);

        let mut pattern = Pattern::match_all();
        pattern.in_port = Some(1);
        pattern.dl_typ = Some(0x0800);
        let fr = FlowRemoved {
            pattern,
            cookie: 1,
            priority: 5,
            reason: ::flowvisor::message::FlowRemovedReason::IdleTimeout,
            duration_sec: 1,
            duration_nsec: 0,
            idle_timeout: Timeout::ExpiresAfter(60),
            packet_count: 10,
            byte_count: 1000,
        };
        let out = engine.switch_message(1, 0, Message::FlowRemoved(fr));
        let delivered = controller_emissions(&out);
        // the match-all slice and the ipv4 slice both cover the flow
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[1].0, ip_slice);
        for d in &delivered {
            match *d.2 {
                Message::FlowRemoved(ref fr) => assert_eq!(fr.pattern.in_port, Some(10)),
                ref other => panic!("expected FlowRemoved, got {:?}", other),
            }
        }
    }

    #[test]
    fn bad_out_port_error_keeps_the_controller_xid() {
        let (mut engine, slice) = single_switch_engine();
        let raw = vec![0x11; 12];
        let fm = flow_mod(10, vec![Action::Output(PseudoPort::PhysicalPort(42))]);
        let out = engine.controller_message(slice, 0xF00D, Message::FlowMod(fm), &raw);
        let delivered = controller_emissions(&out);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].1, 0xF00D);
        match *delivered[0].2 {
            Message::Error(Error::Error(ErrorType::BadAction(BadAction::BadOutPort), _)) => {}
            ref other => panic!("expected bad-out-port error, got {:?}", other),
        }
    }

    #[test]
    fn port_status_delete_unmaps_the_port() {
        let (mut engine, slice) = single_switch_engine();
        let ps = PortStatus {
            reason: PortReason::PortDelete,
            desc: phys_desc(2),
        };
        let out = engine.switch_message(1, 0, Message::PortStatus(ps));
        let delivered = controller_emissions(&out);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, slice);
        match *delivered[0].2 {
            Message::PortStatus(ref ps) => {
                assert_eq!(ps.reason, PortReason::PortDelete);
                assert_eq!(ps.desc.port_no, 11);
            }
            ref other => panic!("expected PortStatus, got {:?}", other),
        }
        assert_eq!(engine.ports().virt_of_phys(1, 2), None);
    }
}
