//! Stats fan-out planning and fan-in merging for the virtual switch.
//!
//! Desc, table shape and switch config are answered locally; flow,
//! aggregate and port queries are fanned out to the fabric and their
//! replies merged under one xid record.

use std::collections::HashSet;

use flowvisor::message::{
    Action, FlowStats, Pattern, PortStats, PseudoPort, StatsReq, StatsReqBody, StatsReqType,
    StatsResp, StatsRespBody, TableStats, Wildcards, STATS_REPLY_MORE,
};
use flowvisor::ofp_header::OfpHeader;
use flowvisor::openflow::OfpPort;
use flowvisor::openflow0x01::{flow_stats_size, ALL_TABLES};
use flowvisor::port_map::PortMap;
use flowvisor::topology::DatapathId;
use flowvisor::translate::TranslationError;
use flowvisor::xid::Accumulator;

/// Identity the virtual switch reports in desc stats.
pub const MANUFACTURER_DESC: &str = "Mirage";
pub const HARDWARE_DESC: &str = "Mirage";
pub const SOFTWARE_DESC: &str = "Mirage_flowvisor";
pub const SERIAL_NUMBER: &str = "0";
pub const DATAPATH_DESC: &str = "virtual flow-sliced switch";

/// Name of the single table the virtual switch exposes.
pub const VIRTUAL_TABLE_NAME: &str = "flowvisor";

/// Upper bound of one stats reply frame on the wire, header included.
pub const MAX_STATS_FRAME: usize = 65_535;

/// What a controller stats request turns into.
#[derive(Debug, PartialEq)]
pub enum StatsPlan {
    /// Answered from local state; no switch involved.
    Local(StatsResp),
    /// Fanned out to the fabric; replies merge into `seed`.
    Fanout {
        targets: Vec<(DatapathId, StatsReq)>,
        seed: Accumulator,
    },
}

impl StatsPlan {
    pub fn pending(targets: &[(DatapathId, StatsReq)]) -> HashSet<DatapathId> {
        targets.iter().map(|t| t.0).collect()
    }
}

pub fn desc_stats() -> StatsResp {
    StatsResp {
        req_type: StatsReqType::Desc,
        flags: 0,
        body: StatsRespBody::DescBody {
            manufacturer_desc: MANUFACTURER_DESC.to_string(),
            hardware_desc: HARDWARE_DESC.to_string(),
            software_desc: SOFTWARE_DESC.to_string(),
            serial_number: SERIAL_NUMBER.to_string(),
            datapath_desc: DATAPATH_DESC.to_string(),
        },
    }
}

/// The synthetic entry describing the one virtual table.
pub fn virtual_table_stats() -> TableStats {
    TableStats {
        table_id: 0,
        name: VIRTUAL_TABLE_NAME.to_string(),
        wildcards: Wildcards {
            in_port: true,
            dl_vlan: true,
            dl_src: true,
            dl_dst: true,
            dl_type: true,
            nw_proto: true,
            tp_src: true,
            tp_dst: true,
            nw_src: 32,
            nw_dst: 32,
            dl_vlan_pcp: true,
            nw_tos: true,
        },
        max_entries: 0x10000,
        active_count: 0,
        lookup_count: 0,
        matched_count: 0,
    }
}

/// Decide how to serve one controller stats request.
pub fn plan_stats_request(
    ports: &PortMap,
    switches: &[DatapathId],
    req: StatsReq,
) -> Result<StatsPlan, TranslationError> {
    match req.body {
        StatsReqBody::DescBody => Ok(StatsPlan::Local(desc_stats())),
        StatsReqBody::TableBody => {
            if switches.is_empty() {
                return Ok(StatsPlan::Local(StatsResp {
                    req_type: StatsReqType::Table,
                    flags: 0,
                    body: StatsRespBody::TableBody {
                        table_stats: vec![virtual_table_stats()],
                    },
                }));
            }
            let targets = switches
                .iter()
                .map(|&dpid| {
                    (
                        dpid,
                        StatsReq {
                            req_type: StatsReqType::Table,
                            flags: 0,
                            body: StatsReqBody::TableBody,
                        },
                    )
                })
                .collect();
            Ok(StatsPlan::Fanout {
                targets,
                seed: Accumulator::Tables(vec![virtual_table_stats()]),
            })
        }
        StatsReqBody::FlowStatsBody {
            pattern,
            table_id: _,
            out_port: _,
        } => {
            let aggregate = req.req_type == StatsReqType::Aggregate;
            let seed = if aggregate {
                Accumulator::Aggregate {
                    packet_count: 0,
                    byte_count: 0,
                    flow_count: 0,
                }
            } else {
                Accumulator::Flows(vec![])
            };
            let targets = scope_flow_query(ports, switches, req.req_type, pattern)?;
            if targets.is_empty() {
                let body = match seed {
                    Accumulator::Aggregate { .. } => StatsRespBody::AggregateStatsBody {
                        packet_count: 0,
                        byte_count: 0,
                        flow_count: 0,
                    },
                    _ => StatsRespBody::FlowStatsBody { flow_stats: vec![] },
                };
                return Ok(StatsPlan::Local(StatsResp {
                    req_type: req.req_type,
                    flags: 0,
                    body,
                }));
            }
            Ok(StatsPlan::Fanout { targets, seed })
        }
        StatsReqBody::PortBody { port_no } => {
            let targets = scope_port_query(ports, switches, port_no)?;
            if targets.is_empty() {
                return Ok(StatsPlan::Local(StatsResp {
                    req_type: StatsReqType::Port,
                    flags: 0,
                    body: StatsRespBody::PortBody { port_stats: vec![] },
                }));
            }
            Ok(StatsPlan::Fanout {
                targets,
                seed: Accumulator::Ports(vec![]),
            })
        }
        StatsReqBody::QueueBody { .. } => Err(TranslationError::UnsupportedQueueOp),
        StatsReqBody::VendorBody => {
            Err(TranslationError::UnsupportedStat(req.req_type as u16))
        }
    }
}

/// A flow or aggregate query scoped to a concrete virtual in_port is
/// narrowed to the single owning switch, with the match rewritten to the
/// physical port. Everything else reaches the whole fabric.
fn scope_flow_query(
    ports: &PortMap,
    switches: &[DatapathId],
    req_type: StatsReqType,
    pattern: Pattern,
) -> Result<Vec<(DatapathId, StatsReq)>, TranslationError> {
    let request = |pattern: Pattern| StatsReq {
        req_type,
        flags: 0,
        body: StatsReqBody::FlowStatsBody {
            pattern,
            table_id: ALL_TABLES,
            out_port: OfpPort::OFPPNone as u16,
        },
    };
    match pattern.in_port {
        Some(virt) => {
            let (dpid, phys) = ports.phys_of_virt_strict(virt)?;
            let mut narrowed = pattern.clone();
            narrowed.in_port = Some(phys);
            Ok(vec![(dpid, request(narrowed))])
        }
        None => Ok(switches
            .iter()
            .map(|&dpid| (dpid, request(pattern.clone())))
            .collect()),
    }
}

fn scope_port_query(
    ports: &PortMap,
    switches: &[DatapathId],
    port_no: u16,
) -> Result<Vec<(DatapathId, StatsReq)>, TranslationError> {
    let request = |port_no: u16| StatsReq {
        req_type: StatsReqType::Port,
        flags: 0,
        body: StatsReqBody::PortBody { port_no },
    };
    if port_no == OfpPort::OFPPNone as u16 || port_no == OfpPort::OFPPAll as u16 {
        Ok(switches
            .iter()
            .map(|&dpid| (dpid, request(OfpPort::OFPPNone as u16)))
            .collect())
    } else {
        let (dpid, phys) = ports.phys_of_virt_strict(port_no)?;
        Ok(vec![(dpid, request(phys))])
    }
}

/// Rewrite the physical identifiers in a switch's flow-stats entries back
/// into the virtual namespace. Entries on unmapped ports (transit links)
/// keep their pattern wildcarded rather than leak a physical number.
pub fn virtualize_flow_stats(
    ports: &PortMap,
    dpid: DatapathId,
    flow_stats: Vec<FlowStats>,
) -> Vec<FlowStats> {
    flow_stats
        .into_iter()
        .map(|mut flow| {
            flow.pattern.in_port = flow
                .pattern
                .in_port
                .and_then(|phys| ports.virt_of_phys(dpid, phys));
            flow.actions = flow
                .actions
                .into_iter()
                .filter_map(|act| match act {
                    Action::Output(PseudoPort::PhysicalPort(phys)) => ports
                        .virt_of_phys(dpid, phys)
                        .map(|v| Action::Output(PseudoPort::PhysicalPort(v))),
                    other => Some(other),
                })
                .collect();
            flow
        })
        .collect()
}

/// Rewrite physical port numbers in port stats; counters of unmapped
/// (transit) ports are dropped.
pub fn virtualize_port_stats(
    ports: &PortMap,
    dpid: DatapathId,
    port_stats: Vec<PortStats>,
) -> Vec<PortStats> {
    port_stats
        .into_iter()
        .filter_map(|mut stats| {
            ports.virt_of_phys(dpid, stats.port_no).map(|virt| {
                stats.port_no = virt;
                stats
            })
        })
        .collect()
}

/// Render a finished accumulator as controller-facing reply frames. Flow
/// lists split so every frame stays within the wire-size limit, with the
/// reply-more flag on all but the last frame.
pub fn frames_of_accumulator(acc: Accumulator) -> Vec<StatsResp> {
    match acc {
        Accumulator::Flows(flows) => chunk_flow_stats(flows),
        Accumulator::Aggregate {
            packet_count,
            byte_count,
            flow_count,
        } => vec![StatsResp {
            req_type: StatsReqType::Aggregate,
            flags: 0,
            body: StatsRespBody::AggregateStatsBody {
                packet_count,
                byte_count,
                flow_count,
            },
        }],
        Accumulator::Tables(table_stats) => vec![StatsResp {
            req_type: StatsReqType::Table,
            flags: 0,
            body: StatsRespBody::TableBody { table_stats },
        }],
        Accumulator::Ports(port_stats) => vec![StatsResp {
            req_type: StatsReqType::Port,
            flags: 0,
            body: StatsRespBody::PortBody { port_stats },
        }],
    }
}

fn chunk_flow_stats(flows: Vec<FlowStats>) -> Vec<StatsResp> {
    // OpenFlow header plus the 4-byte stats reply header
    let budget = MAX_STATS_FRAME - OfpHeader::size() - 4;
    let mut chunks: Vec<Vec<FlowStats>> = vec![vec![]];
    let mut used = 0;
    for flow in flows {
        let len = flow_stats_size(&flow);
        let current = chunks.last_mut().unwrap();
        if !current.is_empty() && used + len > budget {
            chunks.push(vec![flow]);
            used = len;
        } else {
            current.push(flow);
            used += len;
        }
    }
    let frames = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, flow_stats)| StatsResp {
            req_type: StatsReqType::Flow,
            flags: if i + 1 < frames { STATS_REPLY_MORE } else { 0 },
            body: StatsRespBody::FlowStatsBody { flow_stats },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowvisor::message::{PortConfig, PortDesc, PortFeatures, PortState, StpState,
                             TransmissionCounter};
    use flowvisor::ofp_message::OfpMessage;
    use flowvisor::message::Message;

    fn desc(port_no: u16) -> PortDesc {
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

    fn port_map() -> PortMap {
        let mut ports = PortMap::new();
        ports.add_port(1, 1, desc(1)); // virtual 10
        ports.add_port(2, 7, desc(7)); // virtual 11
        ports
    }

    fn flow_req(req_type: StatsReqType, in_port: Option<u16>) -> StatsReq {
        let mut pattern = Pattern::match_all();
        pattern.in_port = in_port;
        StatsReq {
            req_type,
            flags: 0,
            body: StatsReqBody::FlowStatsBody {
                pattern,
                table_id: ALL_TABLES,
                out_port: OfpPort::OFPPNone as u16,
            },
        }
    }

    #[test]
    fn desc_is_synthesized_locally() {
        let plan = plan_stats_request(
            &port_map(),
            &[1, 2],
            StatsReq {
                req_type: StatsReqType::Desc,
                flags: 0,
                body: StatsReqBody::DescBody,
            },
        )
        .unwrap();
        match plan {
            StatsPlan::Local(resp) => match resp.body {
                StatsRespBody::DescBody { software_desc, .. } => {
                    assert_eq!(software_desc, "Mirage_flowvisor")
                }
                other => panic!("expected DescBody, got {:?}", other),
            },
            other => panic!("expected Local, got {:?}", other),
        }
    }

    #[test]
    fn wildcard_flow_query_fans_out_to_all_switches() {
        let plan =
            plan_stats_request(&port_map(), &[1, 2], flow_req(StatsReqType::Aggregate, None))
                .unwrap();
        match plan {
            StatsPlan::Fanout { targets, seed } => {
                assert_eq!(targets.len(), 2);
                assert_eq!(StatsPlan::pending(&targets).len(), 2);
                assert_eq!(
                    seed,
                    Accumulator::Aggregate {
                        packet_count: 0,
                        byte_count: 0,
                        flow_count: 0,
                    }
                );
            }
            other => panic!("expected Fanout, got {:?}", other),
        }
    }

    #[test]
    fn scoped_flow_query_narrows_to_the_owning_switch() {
        let plan =
            plan_stats_request(&port_map(), &[1, 2], flow_req(StatsReqType::Flow, Some(11)))
                .unwrap();
        match plan {
            StatsPlan::Fanout { targets, .. } => {
                assert_eq!(targets.len(), 1);
                assert_eq!(targets[0].0, 2);
                match targets[0].1.body {
                    StatsReqBody::FlowStatsBody { ref pattern, .. } => {
                        assert_eq!(pattern.in_port, Some(7))
                    }
                    ref other => panic!("expected flow body, got {:?}", other),
                }
            }
            other => panic!("expected Fanout, got {:?}", other),
        }
    }

    #[test]
    fn queue_stats_are_refused() {
        let err = plan_stats_request(
            &port_map(),
            &[1],
            StatsReq {
                req_type: StatsReqType::Queue,
                flags: 0,
                body: StatsReqBody::QueueBody {
                    port_no: 0xffff,
                    queue_id: 0xffffffff,
                },
            },
        )
        .unwrap_err();
        assert_eq!(err, TranslationError::UnsupportedQueueOp);
    }

    #[test]
    fn empty_fabric_answers_flow_queries_locally() {
        let plan =
            plan_stats_request(&PortMap::new(), &[], flow_req(StatsReqType::Flow, None)).unwrap();
        match plan {
            StatsPlan::Local(resp) => match resp.body {
                StatsRespBody::FlowStatsBody { flow_stats } => assert!(flow_stats.is_empty()),
                other => panic!("expected flow body, got {:?}", other),
            },
            other => panic!("expected Local, got {:?}", other),
        }
    }

    fn flow_entry(cookie: u64) -> FlowStats {
        FlowStats {
            table_id: 0,
            pattern: Pattern::match_all(),
            duration_sec: 1,
            duration_nsec: 0,
            priority: 1,
            idle_timeout: 0,
            hard_timeout: 0,
            cookie,
            packet_count: 1,
            byte_count: 64,
            actions: vec![Action::Output(PseudoPort::PhysicalPort(10))],
        }
    }

    #[test]
    fn flow_frames_respect_the_wire_size_limit() {
        // 96 bytes per entry; ~1500 entries do not fit one frame
        let flows: Vec<FlowStats> = (0..1500).map(|i| flow_entry(i as u64)).collect();
        let frames = frames_of_accumulator(Accumulator::Flows(flows));
        assert!(frames.len() > 1);
        let mut total = 0;
        for (i, frame) in frames.iter().enumerate() {
            let last = i + 1 == frames.len();
            assert_eq!(frame.flags == 0, last, "more flag wrong on frame {}", i);
            let wire = <Message as OfpMessage>::size_of(&Message::StatsReply(frame.clone()));
            assert!(wire <= MAX_STATS_FRAME, "frame {} is {} bytes", i, wire);
            match frame.body {
                StatsRespBody::FlowStatsBody { ref flow_stats } => total += flow_stats.len(),
                ref other => panic!("expected flow body, got {:?}", other),
            }
        }
        assert_eq!(total, 1500);
    }

    #[test]
    fn short_flow_lists_fit_one_final_frame() {
        let frames = frames_of_accumulator(Accumulator::Flows(vec![flow_entry(1)]));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].flags, 0);
    }

    #[test]
    fn flow_stats_are_virtualized_per_switch() {
        let ports = port_map();
        let mut flow = flow_entry(1);
        flow.pattern.in_port = Some(1);
        flow.actions = vec![
            Action::Output(PseudoPort::PhysicalPort(1)),
            Action::Output(PseudoPort::Flood),
        ];
        let out = virtualize_flow_stats(&ports, 1, vec![flow]);
        assert_eq!(out[0].pattern.in_port, Some(10));
        assert_eq!(
            out[0].actions,
            vec![
                Action::Output(PseudoPort::PhysicalPort(10)),
                Action::Output(PseudoPort::Flood),
            ]
        );
    }

    #[test]
    fn transit_port_counters_are_not_leaked() {
        let ports = port_map();
        let stats = vec![
            PortStats {
                port_no: 1,
                packets: TransmissionCounter { rx: 1, tx: 2 },
                bytes: TransmissionCounter { rx: 0, tx: 0 },
                dropped: TransmissionCounter { rx: 0, tx: 0 },
                errors: TransmissionCounter { rx: 0, tx: 0 },
                rx_frame_errors: 0,
                rx_over_errors: 0,
                rx_crc_errors: 0,
                collisions: 0,
            },
            PortStats {
                port_no: 3, // unmapped transit port
                packets: TransmissionCounter { rx: 9, tx: 9 },
                bytes: TransmissionCounter { rx: 0, tx: 0 },
                dropped: TransmissionCounter { rx: 0, tx: 0 },
                errors: TransmissionCounter { rx: 0, tx: 0 },
                rx_frame_errors: 0,
                rx_over_errors: 0,
                rx_crc_errors: 0,
                collisions: 0,
            },
        ];
        let out = virtualize_port_stats(&ports, 1, stats);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].port_no, 10);
    }
}
