//! OpenFlow 1.0 wire codec.
//!
//! Unlike a plain controller library this codec runs in both directions:
//! the proxy parses what controllers send and what switches send, and
//! marshals replies toward both sides as well.

use std::io::{BufRead, Cursor, Read, Write};
use std::mem::size_of;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Buf;

use bits::*;
use flowvisor::message::*;
use flowvisor::ofp_header::{OfpHeader, OPENFLOW_0_01_VERSION};
use flowvisor::ofp_message::{OfpMessage, OfpSerializationError};
use flowvisor::openflow::{MsgCode, OfpPort};
use flowvisor::packet::{bytes_of_mac, mac_of_bytes};

const OFP_MAX_TABLE_NAME_LENGTH: usize = 32;
const DESC_STR_LENGTH: usize = 256;
const SERIAL_NUM_LENGTH: usize = 32;

pub const ALL_TABLES: u8 = 0xff;

fn write_padding_bytes(bytes: &mut Vec<u8>, count: usize) {
    for _ in 0..count {
        bytes.write_u8(0).unwrap();
    }
}

fn read_fixed_size_string(
    bytes: &mut Cursor<Vec<u8>>,
    max_capacity: usize,
) -> Result<String, OfpSerializationError> {
    if bytes.remaining() < max_capacity {
        return Err(OfpSerializationError::Truncated {
            field: "string",
            message: "fixed-size string",
        });
    }
    let mut arr = Vec::with_capacity(max_capacity);
    let mut read_count: usize = 0;
    for _ in 0..max_capacity {
        read_count += 1;
        let next_char = bytes.read_u8()?;
        if next_char == 0 {
            break;
        }
        arr.push(next_char);
    }
    bytes.consume(max_capacity - read_count);
    String::from_utf8(arr).map_err(|_| {
        OfpSerializationError::unexpected("non-utf8".to_string(), "string", "fixed-size string")
    })
}

fn write_fixed_size_string(bytes: &mut Vec<u8>, s: &str, capacity: usize) {
    let data = s.as_bytes();
    let n = data.len().min(capacity - 1);
    bytes.write_all(&data[..n]).unwrap();
    write_padding_bytes(bytes, capacity - n);
}

struct WildcardsCodec;

impl WildcardsCodec {
    fn set_nw_mask(f: u32, offset: usize, v: u32) -> u32 {
        let value = (0x3f & v) << offset;
        f | value
    }

    fn get_nw_mask(f: u32, offset: usize) -> u32 {
        (f >> offset) & 0x3f
    }

    fn marshal(w: Wildcards, bytes: &mut Vec<u8>) {
        let ret = 0u32;
        let ret = bit(0, ret as u64, w.in_port) as u32;
        let ret = bit(1, ret as u64, w.dl_vlan) as u32;
        let ret = bit(2, ret as u64, w.dl_src) as u32;
        let ret = bit(3, ret as u64, w.dl_dst) as u32;
        let ret = bit(4, ret as u64, w.dl_type) as u32;
        let ret = bit(5, ret as u64, w.nw_proto) as u32;
        let ret = bit(6, ret as u64, w.tp_src) as u32;
        let ret = bit(7, ret as u64, w.tp_dst) as u32;
        let ret = WildcardsCodec::set_nw_mask(ret, 8, w.nw_src);
        let ret = WildcardsCodec::set_nw_mask(ret, 14, w.nw_dst);
        let ret = bit(20, ret as u64, w.dl_vlan_pcp) as u32;
        let ret = bit(21, ret as u64, w.nw_tos) as u32;
        bytes.write_u32::<BigEndian>(ret).unwrap()
    }

    fn parse(bits: u32) -> Wildcards {
        Wildcards {
            in_port: test_bit(0, bits as u64),
            dl_vlan: test_bit(1, bits as u64),
            dl_src: test_bit(2, bits as u64),
            dl_dst: test_bit(3, bits as u64),
            dl_type: test_bit(4, bits as u64),
            nw_proto: test_bit(5, bits as u64),
            tp_src: test_bit(6, bits as u64),
            tp_dst: test_bit(7, bits as u64),
            nw_src: WildcardsCodec::get_nw_mask(bits, 8),
            nw_dst: WildcardsCodec::get_nw_mask(bits, 14),
            dl_vlan_pcp: test_bit(20, bits as u64),
            nw_tos: test_bit(21, bits as u64),
        }
    }
}

#[repr(packed)]
struct OfpMatch(u32, u16, [u8; 6], [u8; 6], u16, u8, u8, u16, u8, u8, u16, u32, u32, u16, u16);

struct PatternCodec;

impl PatternCodec {
    fn size_of(_: &Pattern) -> usize {
        size_of::<OfpMatch>()
    }

    fn parse(bytes: &mut Cursor<Vec<u8>>) -> Result<Pattern, OfpSerializationError> {
        let w = WildcardsCodec::parse(bytes.read_u32::<BigEndian>()?);
        let in_port = if w.in_port {
            bytes.consume(2);
            None
        } else {
            Some(bytes.read_u16::<BigEndian>()?)
        };
        let dl_src = if w.dl_src {
            bytes.consume(6);
            None
        } else {
            let mut arr: [u8; 6] = [0; 6];
            bytes.read_exact(&mut arr)?;
            Some(mac_of_bytes(arr))
        };
        let dl_dst = if w.dl_dst {
            bytes.consume(6);
            None
        } else {
            let mut arr: [u8; 6] = [0; 6];
            bytes.read_exact(&mut arr)?;
            Some(mac_of_bytes(arr))
        };
        let dl_vlan = if w.dl_vlan {
            bytes.consume(2);
            None
        } else {
            let vlan = bytes.read_u16::<BigEndian>()?;
            if vlan == 0xffff {
                Some(None)
            } else {
                Some(Some(vlan))
            }
        };
        let dl_vlan_pcp = if w.dl_vlan_pcp {
            bytes.consume(1);
            None
        } else {
            Some(bytes.read_u8()?)
        };
        bytes.consume(1);
        let dl_typ = if w.dl_type {
            bytes.consume(2);
            None
        } else {
            Some(bytes.read_u16::<BigEndian>()?)
        };
        let nw_tos = if w.nw_tos {
            bytes.consume(1);
            None
        } else {
            Some(bytes.read_u8()?)
        };
        let nw_proto = if w.nw_proto {
            bytes.consume(1);
            None
        } else {
            Some(bytes.read_u8()?)
        };
        bytes.consume(2);
        let nw_src = PatternCodec::parse_nw_field(bytes, w.nw_src)?;
        let nw_dst = PatternCodec::parse_nw_field(bytes, w.nw_dst)?;
        let tp_src = if w.tp_src {
            bytes.consume(2);
            None
        } else {
            Some(bytes.read_u16::<BigEndian>()?)
        };
        let tp_dst = if w.tp_dst {
            bytes.consume(2);
            None
        } else {
            Some(bytes.read_u16::<BigEndian>()?)
        };
        Ok(Pattern {
            dl_src,
            dl_dst,
            dl_typ,
            dl_vlan,
            dl_vlan_pcp,
            nw_src,
            nw_dst,
            nw_proto,
            nw_tos,
            tp_src,
            tp_dst,
            in_port,
        })
    }

    fn parse_nw_field(
        bytes: &mut Cursor<Vec<u8>>,
        wc: u32,
    ) -> Result<Option<Mask<u32>>, OfpSerializationError> {
        if wc >= 32 {
            bytes.consume(4);
            Ok(None)
        } else if wc == 0 {
            Ok(Some(Mask {
                value: bytes.read_u32::<BigEndian>()?,
                mask: None,
            }))
        } else {
            Ok(Some(Mask {
                value: bytes.read_u32::<BigEndian>()?,
                mask: Some(wc),
            }))
        }
    }

    fn marshal(p: Pattern, bytes: &mut Vec<u8>) {
        let w = Pattern::wildcards_of_pattern(&p);
        WildcardsCodec::marshal(w, bytes);
        bytes.write_u16::<BigEndian>(p.in_port.unwrap_or(0)).unwrap();
        bytes
            .write_all(&bytes_of_mac(p.dl_src.unwrap_or(0)))
            .unwrap();
        bytes
            .write_all(&bytes_of_mac(p.dl_dst.unwrap_or(0)))
            .unwrap();
        let vlan = match p.dl_vlan {
            Some(Some(v)) => v,
            Some(None) | None => 0xffff,
        };
        bytes.write_u16::<BigEndian>(vlan).unwrap();
        bytes.write_u8(p.dl_vlan_pcp.unwrap_or(0)).unwrap();
        bytes.write_u8(0).unwrap();
        bytes.write_u16::<BigEndian>(p.dl_typ.unwrap_or(0)).unwrap();
        bytes.write_u8(p.nw_tos.unwrap_or(0)).unwrap();
        bytes.write_u8(p.nw_proto.unwrap_or(0)).unwrap();
        bytes.write_u16::<BigEndian>(0).unwrap();
        bytes
            .write_u32::<BigEndian>(p.nw_src.map(|m| m.value).unwrap_or(0))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(p.nw_dst.map(|m| m.value).unwrap_or(0))
            .unwrap();
        bytes.write_u16::<BigEndian>(p.tp_src.unwrap_or(0)).unwrap();
        bytes.write_u16::<BigEndian>(p.tp_dst.unwrap_or(0)).unwrap();
    }
}

#[repr(packed)]
struct OfpActionHeader(u16, u16);

#[repr(packed)]
struct OfpActionOutput(u16, u16);
#[repr(packed)]
struct OfpActionVlanVId(u16, u16);
#[repr(packed)]
struct OfpActionVlanPcp(u8, [u8; 3]);
#[repr(packed)]
struct OfpActionStripVlan(u32);
#[repr(packed)]
struct OfpActionDlAddr([u8; 6], [u8; 6]);
#[repr(packed)]
struct OfpActionNwAddr(u32);
#[repr(packed)]
struct OfpActionTpPort(u16, u16);
#[repr(packed)]
struct OfpActionNwTos(u8, [u8; 3]);
#[repr(packed)]
struct OfpActionEnqueue(u16, [u8; 6], u32);

#[repr(u16)]
enum OfpActionType {
    OFPATOutput,
    OFPATSetVlanVId,
    OFPATSetVlanPCP,
    OFPATStripVlan,
    OFPATSetDlSrc,
    OFPATSetDlDst,
    OFPATSetNwSrc,
    OFPATSetNwDst,
    OFPATSetNwTos,
    OFPATSetTpSrc,
    OFPATSetTpDst,
    OFPATEnqueue,
}

pub struct ActionCodec;

impl ActionCodec {
    fn type_code(a: &Action) -> OfpActionType {
        match *a {
            Action::Output(_) => OfpActionType::OFPATOutput,
            Action::SetDlVlan(None) => OfpActionType::OFPATStripVlan,
            Action::SetDlVlan(Some(_)) => OfpActionType::OFPATSetVlanVId,
            Action::SetDlVlanPcp(_) => OfpActionType::OFPATSetVlanPCP,
            Action::SetDlSrc(_) => OfpActionType::OFPATSetDlSrc,
            Action::SetDlDst(_) => OfpActionType::OFPATSetDlDst,
            Action::SetNwSrc(_) => OfpActionType::OFPATSetNwSrc,
            Action::SetNwDst(_) => OfpActionType::OFPATSetNwDst,
            Action::SetNwTos(_) => OfpActionType::OFPATSetNwTos,
            Action::SetTpSrc(_) => OfpActionType::OFPATSetTpSrc,
            Action::SetTpDst(_) => OfpActionType::OFPATSetTpDst,
            Action::Enqueue(_, _) => OfpActionType::OFPATEnqueue,
        }
    }

    pub fn size_of(a: &Action) -> usize {
        let h = size_of::<OfpActionHeader>();
        let body = match *a {
            Action::Output(_) => size_of::<OfpActionOutput>(),
            Action::SetDlVlan(None) => size_of::<OfpActionStripVlan>(),
            Action::SetDlVlan(Some(_)) => size_of::<OfpActionVlanVId>(),
            Action::SetDlVlanPcp(_) => size_of::<OfpActionVlanPcp>(),
            Action::SetDlSrc(_) | Action::SetDlDst(_) => size_of::<OfpActionDlAddr>(),
            Action::SetNwSrc(_) | Action::SetNwDst(_) => size_of::<OfpActionNwAddr>(),
            Action::SetNwTos(_) => size_of::<OfpActionNwTos>(),
            Action::SetTpSrc(_) | Action::SetTpDst(_) => size_of::<OfpActionTpPort>(),
            Action::Enqueue(_, _) => size_of::<OfpActionEnqueue>(),
        };
        h + body
    }

    pub fn size_of_sequence(actions: &[Action]) -> usize {
        actions.iter().fold(0, |acc, x| ActionCodec::size_of(x) + acc)
    }

    fn parse_one(bytes: &mut Cursor<Vec<u8>>) -> Result<Action, OfpSerializationError> {
        let action_code = bytes.read_u16::<BigEndian>()?;
        let _ = bytes.read_u16::<BigEndian>()?;
        let action = match action_code {
            t if t == (OfpActionType::OFPATOutput as u16) => {
                let port_code = bytes.read_u16::<BigEndian>()?;
                let len = bytes.read_u16::<BigEndian>()?;
                Action::Output(PseudoPort::make(port_code, len as u64)?)
            }
            t if t == (OfpActionType::OFPATSetVlanVId as u16) => {
                let vid = bytes.read_u16::<BigEndian>()?;
                bytes.consume(2);
                if vid == 0xffff {
                    Action::SetDlVlan(None)
                } else {
                    Action::SetDlVlan(Some(vid))
                }
            }
            t if t == (OfpActionType::OFPATSetVlanPCP as u16) => {
                let pcp = bytes.read_u8()?;
                bytes.consume(3);
                Action::SetDlVlanPcp(pcp)
            }
            t if t == (OfpActionType::OFPATStripVlan as u16) => {
                bytes.consume(4);
                Action::SetDlVlan(None)
            }
            t if t == (OfpActionType::OFPATSetDlSrc as u16) => {
                let mut dl_addr: [u8; 6] = [0; 6];
                bytes.read_exact(&mut dl_addr)?;
                bytes.consume(6);
                Action::SetDlSrc(mac_of_bytes(dl_addr))
            }
            t if t == (OfpActionType::OFPATSetDlDst as u16) => {
                let mut dl_addr: [u8; 6] = [0; 6];
                bytes.read_exact(&mut dl_addr)?;
                bytes.consume(6);
                Action::SetDlDst(mac_of_bytes(dl_addr))
            }
            t if t == (OfpActionType::OFPATSetNwSrc as u16) => {
                Action::SetNwSrc(bytes.read_u32::<BigEndian>()?)
            }
            t if t == (OfpActionType::OFPATSetNwDst as u16) => {
                Action::SetNwDst(bytes.read_u32::<BigEndian>()?)
            }
            t if t == (OfpActionType::OFPATSetNwTos as u16) => {
                let nw_tos = bytes.read_u8()?;
                bytes.consume(3);
                Action::SetNwTos(nw_tos)
            }
            t if t == (OfpActionType::OFPATSetTpSrc as u16) => {
                let pt = bytes.read_u16::<BigEndian>()?;
                bytes.consume(2);
                Action::SetTpSrc(pt)
            }
            t if t == (OfpActionType::OFPATSetTpDst as u16) => {
                let pt = bytes.read_u16::<BigEndian>()?;
                bytes.consume(2);
                Action::SetTpDst(pt)
            }
            t if t == (OfpActionType::OFPATEnqueue as u16) => {
                let pt = bytes.read_u16::<BigEndian>()?;
                bytes.consume(6);
                let qid = bytes.read_u32::<BigEndian>()?;
                Action::Enqueue(PseudoPort::make(pt, 0)?, qid)
            }
            t => {
                return Err(OfpSerializationError::unexpected(
                    format!("0x{:x}", t),
                    "type",
                    "action",
                ));
            }
        };
        Ok(action)
    }

    fn parse_sequence(bytes: &mut Cursor<Vec<u8>>) -> Result<Vec<Action>, OfpSerializationError> {
        let mut v = vec![];
        while bytes.remaining() >= size_of::<OfpActionHeader>() {
            v.push(ActionCodec::parse_one(bytes)?);
        }
        Ok(v)
    }

    fn move_controller_last(acts: Vec<Action>) -> Vec<Action> {
        let (mut to_ctrl, mut not_to_ctrl): (Vec<Action>, Vec<Action>) =
            acts.into_iter().partition(|act| match *act {
                Action::Output(PseudoPort::Controller(_)) => true,
                _ => false,
            });
        not_to_ctrl.append(&mut to_ctrl);
        not_to_ctrl
    }

    fn marshal(act: Action, bytes: &mut Vec<u8>) {
        bytes
            .write_u16::<BigEndian>(ActionCodec::type_code(&act) as u16)
            .unwrap();
        bytes
            .write_u16::<BigEndian>(ActionCodec::size_of(&act) as u16)
            .unwrap();
        match act {
            Action::Output(pp) => {
                bytes.write_u16::<BigEndian>(pp.to_int()).unwrap();
                bytes
                    .write_u16::<BigEndian>(match pp {
                        PseudoPort::Controller(w) => w as u16,
                        _ => 0,
                    })
                    .unwrap()
            }
            Action::SetDlVlan(None) => bytes.write_u32::<BigEndian>(0xffff).unwrap(),
            Action::SetDlVlan(Some(vid)) => {
                bytes.write_u16::<BigEndian>(vid).unwrap();
                bytes.write_u16::<BigEndian>(0).unwrap();
            }
            Action::SetDlVlanPcp(n) => {
                bytes.write_u8(n).unwrap();
                write_padding_bytes(bytes, 3);
            }
            Action::SetDlSrc(mac) | Action::SetDlDst(mac) => {
                bytes.write_all(&bytes_of_mac(mac)).unwrap();
                write_padding_bytes(bytes, 6);
            }
            Action::SetNwSrc(addr) | Action::SetNwDst(addr) => {
                bytes.write_u32::<BigEndian>(addr).unwrap()
            }
            Action::SetNwTos(n) => {
                bytes.write_u8(n).unwrap();
                write_padding_bytes(bytes, 3);
            }
            Action::SetTpSrc(pt) | Action::SetTpDst(pt) => {
                bytes.write_u16::<BigEndian>(pt).unwrap();
                bytes.write_u16::<BigEndian>(0).unwrap();
            }
            Action::Enqueue(pp, qid) => {
                bytes.write_u16::<BigEndian>(pp.to_int()).unwrap();
                write_padding_bytes(bytes, 6);
                bytes.write_u32::<BigEndian>(qid).unwrap();
            }
        }
    }
}

/// Per-message body codec.
pub trait MessageType {
    /// Return the byte-size of a message body.
    fn size_of(msg: &Self) -> usize;
    /// Parse a buffer into a message body.
    fn parse(buf: &[u8]) -> Result<Self, OfpSerializationError>
    where
        Self: Sized;
    /// Marshal a message body into a `u8` buffer.
    fn marshal(msg: Self, bytes: &mut Vec<u8>);
}

#[repr(packed)]
struct OfpSwitchFeatures(u64, u32, u8, [u8; 3], u32, u32);

fn capabilities_to_int(c: &Capabilities) -> u32 {
    let ret = 0u64;
    let ret = bit(0, ret, c.flow_stats);
    let ret = bit(1, ret, c.table_stats);
    let ret = bit(2, ret, c.port_stats);
    let ret = bit(3, ret, c.stp);
    let ret = bit(5, ret, c.ip_reasm);
    let ret = bit(6, ret, c.queue_stats);
    let ret = bit(7, ret, c.arp_match_ip);
    ret as u32
}

fn capabilities_of_int(d: u32) -> Capabilities {
    Capabilities {
        flow_stats: test_bit(0, d as u64),
        table_stats: test_bit(1, d as u64),
        port_stats: test_bit(2, d as u64),
        stp: test_bit(3, d as u64),
        ip_reasm: test_bit(5, d as u64),
        queue_stats: test_bit(6, d as u64),
        arp_match_ip: test_bit(7, d as u64),
    }
}

fn actions_to_int(a: &SupportedActions) -> u32 {
    let ret = 0u64;
    let ret = bit(0, ret, a.output);
    let ret = bit(1, ret, a.set_vlan_id);
    let ret = bit(2, ret, a.set_vlan_pcp);
    let ret = bit(3, ret, a.strip_vlan);
    let ret = bit(4, ret, a.set_dl_src);
    let ret = bit(5, ret, a.set_dl_dst);
    let ret = bit(6, ret, a.set_nw_src);
    let ret = bit(7, ret, a.set_nw_dst);
    let ret = bit(8, ret, a.set_nw_tos);
    let ret = bit(9, ret, a.set_tp_src);
    let ret = bit(10, ret, a.set_tp_dst);
    let ret = bit(11, ret, a.enqueue);
    let ret = bit(12, ret, a.vendor);
    ret as u32
}

fn actions_of_int(d: u32) -> SupportedActions {
    SupportedActions {
        output: test_bit(0, d as u64),
        set_vlan_id: test_bit(1, d as u64),
        set_vlan_pcp: test_bit(2, d as u64),
        strip_vlan: test_bit(3, d as u64),
        set_dl_src: test_bit(4, d as u64),
        set_dl_dst: test_bit(5, d as u64),
        set_nw_src: test_bit(6, d as u64),
        set_nw_dst: test_bit(7, d as u64),
        set_nw_tos: test_bit(8, d as u64),
        set_tp_src: test_bit(9, d as u64),
        set_tp_dst: test_bit(10, d as u64),
        enqueue: test_bit(11, d as u64),
        vendor: test_bit(12, d as u64),
    }
}

impl MessageType for SwitchFeatures {
    fn size_of(sf: &SwitchFeatures) -> usize {
        size_of::<OfpSwitchFeatures>() + sf.ports.len() * size_of::<OfpPhyPort>()
    }

    fn parse(buf: &[u8]) -> Result<SwitchFeatures, OfpSerializationError> {
        let mut bytes = Cursor::new(buf.to_vec());
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        bytes.consume(3);
        let supported_capabilities = capabilities_of_int(bytes.read_u32::<BigEndian>()?);
        let supported_actions = actions_of_int(bytes.read_u32::<BigEndian>()?);
        let ports = {
            let mut v = vec![];
            while bytes.remaining() >= size_of::<OfpPhyPort>() {
                v.push(PortDescCodec::parse(&mut bytes)?)
            }
            v
        };
        Ok(SwitchFeatures {
            datapath_id,
            num_buffers,
            num_tables,
            supported_capabilities,
            supported_actions,
            ports,
        })
    }

    fn marshal(sf: SwitchFeatures, bytes: &mut Vec<u8>) {
        bytes.write_u64::<BigEndian>(sf.datapath_id).unwrap();
        bytes.write_u32::<BigEndian>(sf.num_buffers).unwrap();
        bytes.write_u8(sf.num_tables).unwrap();
        write_padding_bytes(bytes, 3);
        bytes
            .write_u32::<BigEndian>(capabilities_to_int(&sf.supported_capabilities))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(actions_to_int(&sf.supported_actions))
            .unwrap();
        for p in sf.ports {
            PortDescCodec::marshal(p, bytes);
        }
    }
}

impl MessageType for SwitchConfig {
    fn size_of(_: &SwitchConfig) -> usize {
        4
    }

    fn parse(buf: &[u8]) -> Result<SwitchConfig, OfpSerializationError> {
        let mut bytes = Cursor::new(buf.to_vec());
        let flags = bytes.read_u16::<BigEndian>()?;
        let miss_send_len = bytes.read_u16::<BigEndian>()?;
        Ok(SwitchConfig {
            flags,
            miss_send_len,
        })
    }

    fn marshal(c: SwitchConfig, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(c.flags).unwrap();
        bytes.write_u16::<BigEndian>(c.miss_send_len).unwrap();
    }
}

#[repr(packed)]
struct OfpFlowMod(u64, u16, u16, u16, u16, u32, u16, u16);

fn flow_mod_flags_to_int(check_overlap: bool, notify_when_removed: bool) -> u16 {
    (if check_overlap { 1 << 1 } else { 0 }) | (if notify_when_removed { 1 << 0 } else { 0 })
}

impl MessageType for FlowMod {
    fn size_of(msg: &FlowMod) -> usize {
        PatternCodec::size_of(&msg.pattern) + size_of::<OfpFlowMod>()
            + ActionCodec::size_of_sequence(&msg.actions)
    }

    fn parse(buf: &[u8]) -> Result<FlowMod, OfpSerializationError> {
        let mut bytes = Cursor::new(buf.to_vec());
        let pattern = PatternCodec::parse(&mut bytes)?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let command_code = bytes.read_u16::<BigEndian>()?;
        let command = FlowModCmd::from_u16(command_code).ok_or_else(|| {
            OfpSerializationError::unexpected(format!("{}", command_code), "command", "flow mod")
        })?;
        let idle = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let hard = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let prio = bytes.read_u16::<BigEndian>()?;
        let buffer_id = bytes.read_i32::<BigEndian>()?;
        let out_port = PseudoPort::of_int(bytes.read_u16::<BigEndian>()?)?;
        let flags = bytes.read_u16::<BigEndian>()?;
        let actions = ActionCodec::parse_sequence(&mut bytes)?;
        Ok(FlowMod {
            command,
            pattern,
            priority: prio,
            actions,
            cookie,
            idle_timeout: idle,
            hard_timeout: hard,
            notify_when_removed: 1 & flags != 0,
            apply_to_packet: match buffer_id {
                -1 => None,
                n => Some(n as u32),
            },
            out_port,
            check_overlap: 2 & flags != 0,
        })
    }

    fn marshal(fm: FlowMod, bytes: &mut Vec<u8>) {
        PatternCodec::marshal(fm.pattern, bytes);
        bytes.write_u64::<BigEndian>(fm.cookie).unwrap();
        bytes.write_u16::<BigEndian>(fm.command as u16).unwrap();
        bytes
            .write_u16::<BigEndian>(Timeout::to_int(fm.idle_timeout))
            .unwrap();
        bytes
            .write_u16::<BigEndian>(Timeout::to_int(fm.hard_timeout))
            .unwrap();
        bytes.write_u16::<BigEndian>(fm.priority).unwrap();
        bytes
            .write_i32::<BigEndian>(match fm.apply_to_packet {
                None => -1,
                Some(buf_id) => buf_id as i32,
            })
            .unwrap();
        match fm.out_port {
            None => bytes
                .write_u16::<BigEndian>(OfpPort::OFPPNone as u16)
                .unwrap(),
            Some(x) => bytes.write_u16::<BigEndian>(x.to_int()).unwrap(),
        }
        bytes
            .write_u16::<BigEndian>(flow_mod_flags_to_int(fm.check_overlap, fm.notify_when_removed))
            .unwrap();
        for act in ActionCodec::move_controller_last(fm.actions) {
            ActionCodec::marshal(act, bytes)
        }
    }
}

struct PayloadCodec;

impl PayloadCodec {
    fn marshal(payload: Payload, bytes: &mut Vec<u8>) {
        match payload {
            Payload::Buffered(_, buf) | Payload::NotBuffered(buf) => {
                bytes.write_all(&buf).unwrap()
            }
        }
    }
}

#[repr(packed)]
struct OfpPacketIn(i32, u16, u16, u8, u8);

impl MessageType for PacketIn {
    fn size_of(pi: &PacketIn) -> usize {
        size_of::<OfpPacketIn>() + Payload::size_of(&pi.input_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketIn, OfpSerializationError> {
        let mut bytes = Cursor::new(buf.to_vec());
        let buf_id = match bytes.read_i32::<BigEndian>()? {
            -1 => None,
            n => Some(n),
        };
        let total_len = bytes.read_u16::<BigEndian>()?;
        let port = bytes.read_u16::<BigEndian>()?;
        let reason = match bytes.read_u8()? {
            0 => PacketInReason::NoMatch,
            1 => PacketInReason::ExplicitSend,
            r => {
                return Err(OfpSerializationError::unexpected(
                    format!("{}", r),
                    "reason",
                    "packet in",
                ));
            }
        };
        bytes.consume(1);
        let pk = bytes.fill_buf()?.to_vec();
        let payload = match buf_id {
            None => Payload::NotBuffered(pk),
            Some(n) => Payload::Buffered(n as u32, pk),
        };
        Ok(PacketIn {
            input_payload: payload,
            total_len,
            port,
            reason,
        })
    }

    fn marshal(pi: PacketIn, bytes: &mut Vec<u8>) {
        let buf_id = match pi.input_payload {
            Payload::NotBuffered(_) => -1,
            Payload::Buffered(n, _) => n as i32,
        };
        bytes.write_i32::<BigEndian>(buf_id).unwrap();
        bytes.write_u16::<BigEndian>(pi.total_len).unwrap();
        bytes.write_u16::<BigEndian>(pi.port).unwrap();
        bytes.write_u8(pi.reason as u8).unwrap();
        bytes.write_u8(0).unwrap();
        PayloadCodec::marshal(pi.input_payload, bytes)
    }
}

#[repr(packed)]
struct OfpPacketOut(u32, u16, u16);

impl MessageType for PacketOut {
    fn size_of(po: &PacketOut) -> usize {
        size_of::<OfpPacketOut>() + ActionCodec::size_of_sequence(&po.apply_actions)
            + Payload::size_of(&po.output_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketOut, OfpSerializationError> {
        let mut bytes = Cursor::new(buf.to_vec());
        let buf_id = match bytes.read_i32::<BigEndian>()? {
            -1 => None,
            n => Some(n),
        };
        let in_port = bytes.read_u16::<BigEndian>()?;
        let actions_len = bytes.read_u16::<BigEndian>()?;
        let mut actions_buf = vec![0; actions_len as usize];
        bytes.read_exact(&mut actions_buf)?;
        let mut actions_bytes = Cursor::new(actions_buf);
        let actions = ActionCodec::parse_sequence(&mut actions_bytes)?;
        Ok(PacketOut {
            output_payload: match buf_id {
                None => Payload::NotBuffered(bytes.fill_buf()?.to_vec()),
                Some(n) => Payload::Buffered(n as u32, bytes.fill_buf()?.to_vec()),
            },
            port_id: {
                if in_port == OfpPort::OFPPNone as u16 {
                    None
                } else {
                    Some(in_port)
                }
            },
            apply_actions: actions,
        })
    }

    fn marshal(po: PacketOut, bytes: &mut Vec<u8>) {
        bytes
            .write_i32::<BigEndian>(match po.output_payload {
                Payload::Buffered(n, _) => n as i32,
                Payload::NotBuffered(_) => -1,
            })
            .unwrap();
        match po.port_id {
            Some(id) => bytes.write_u16::<BigEndian>(id).unwrap(),
            None => bytes
                .write_u16::<BigEndian>(OfpPort::OFPPNone as u16)
                .unwrap(),
        }
        bytes
            .write_u16::<BigEndian>(ActionCodec::size_of_sequence(&po.apply_actions) as u16)
            .unwrap();
        for act in ActionCodec::move_controller_last(po.apply_actions) {
            ActionCodec::marshal(act, bytes);
        }
        PayloadCodec::marshal(po.output_payload, bytes)
    }
}

#[repr(packed)]
struct OfpFlowRemoved(u64, u16, u8, u8, u32, u32, u16, u16, u64, u64);

impl MessageType for FlowRemoved {
    fn size_of(f: &FlowRemoved) -> usize {
        PatternCodec::size_of(&f.pattern) + size_of::<OfpFlowRemoved>()
    }

    fn parse(buf: &[u8]) -> Result<FlowRemoved, OfpSerializationError> {
        let mut bytes = Cursor::new(buf.to_vec());
        let pattern = PatternCodec::parse(&mut bytes)?;
        let cookie = bytes.read_i64::<BigEndian>()?;
        let priority = bytes.read_u16::<BigEndian>()?;
        let reason = match bytes.read_u8()? {
            0 => FlowRemovedReason::IdleTimeout,
            1 => FlowRemovedReason::HardTimeout,
            2 => FlowRemovedReason::Delete,
            r => {
                return Err(OfpSerializationError::unexpected(
                    format!("{}", r),
                    "reason",
                    "flow removed",
                ));
            }
        };
        bytes.consume(1);
        let duration_sec = bytes.read_u32::<BigEndian>()?;
        let duration_nsec = bytes.read_u32::<BigEndian>()?;
        let idle = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        bytes.consume(2);
        let packet_count = bytes.read_u64::<BigEndian>()?;
        let byte_count = bytes.read_u64::<BigEndian>()?;
        Ok(FlowRemoved {
            pattern,
            cookie,
            priority,
            reason,
            duration_sec,
            duration_nsec,
            idle_timeout: idle,
            packet_count,
            byte_count,
        })
    }

    fn marshal(f: FlowRemoved, bytes: &mut Vec<u8>) {
        PatternCodec::marshal(f.pattern, bytes);
        bytes.write_i64::<BigEndian>(f.cookie).unwrap();
        bytes.write_u16::<BigEndian>(f.priority).unwrap();
        bytes.write_u8(f.reason as u8).unwrap();
        bytes.write_u8(0).unwrap();
        bytes.write_u32::<BigEndian>(f.duration_sec).unwrap();
        bytes.write_u32::<BigEndian>(f.duration_nsec).unwrap();
        bytes
            .write_u16::<BigEndian>(Timeout::to_int(f.idle_timeout))
            .unwrap();
        write_padding_bytes(bytes, 2);
        bytes.write_u64::<BigEndian>(f.packet_count).unwrap();
        bytes.write_u64::<BigEndian>(f.byte_count).unwrap();
    }
}

fn port_features_of_int(d: u32) -> PortFeatures {
    PortFeatures {
        f_10mbhd: test_bit(0, d as u64),
        f_10mbfd: test_bit(1, d as u64),
        f_100mbhd: test_bit(2, d as u64),
        f_100mbfd: test_bit(3, d as u64),
        f_1gbhd: test_bit(4, d as u64),
        f_1gbfd: test_bit(5, d as u64),
        f_10gbfd: test_bit(6, d as u64),
        copper: test_bit(7, d as u64),
        fiber: test_bit(8, d as u64),
        autoneg: test_bit(9, d as u64),
        pause: test_bit(10, d as u64),
        pause_asym: test_bit(11, d as u64),
    }
}

fn port_features_to_int(f: &PortFeatures) -> u32 {
    let ret = 0u64;
    let ret = bit(0, ret, f.f_10mbhd);
    let ret = bit(1, ret, f.f_10mbfd);
    let ret = bit(2, ret, f.f_100mbhd);
    let ret = bit(3, ret, f.f_100mbfd);
    let ret = bit(4, ret, f.f_1gbhd);
    let ret = bit(5, ret, f.f_1gbfd);
    let ret = bit(6, ret, f.f_10gbfd);
    let ret = bit(7, ret, f.copper);
    let ret = bit(8, ret, f.fiber);
    let ret = bit(9, ret, f.autoneg);
    let ret = bit(10, ret, f.pause);
    let ret = bit(11, ret, f.pause_asym);
    ret as u32
}

#[repr(packed)]
struct OfpPhyPort(u16, [u8; 6], [u8; 16], u32, u32, u32, u32, u32, u32);

pub struct PortDescCodec;

impl PortDescCodec {
    pub fn size_of(_: &PortDesc) -> usize {
        size_of::<OfpPhyPort>()
    }

    fn parse(bytes: &mut Cursor<Vec<u8>>) -> Result<PortDesc, OfpSerializationError> {
        let port_no = bytes.read_u16::<BigEndian>()?;
        let hw_addr = {
            let mut arr: [u8; 6] = [0; 6];
            bytes.read_exact(&mut arr)?;
            mac_of_bytes(arr)
        };
        let name = read_fixed_size_string(bytes, 16)?;
        let config = {
            let d = bytes.read_u32::<BigEndian>()?;
            PortConfig {
                down: test_bit(0, d as u64),
                no_stp: test_bit(1, d as u64),
                no_recv: test_bit(2, d as u64),
                no_recv_stp: test_bit(3, d as u64),
                no_flood: test_bit(4, d as u64),
                no_fwd: test_bit(5, d as u64),
                no_packet_in: test_bit(6, d as u64),
            }
        };
        let state = {
            let d = bytes.read_u32::<BigEndian>()?;
            PortState {
                down: test_bit(0, d as u64),
                stp_state: {
                    match (d >> 8) & 3 {
                        0 => StpState::Listen,
                        1 => StpState::Learn,
                        2 => StpState::Forward,
                        _ => StpState::Block,
                    }
                },
            }
        };
        let curr = port_features_of_int(bytes.read_u32::<BigEndian>()?);
        let advertised = port_features_of_int(bytes.read_u32::<BigEndian>()?);
        let supported = port_features_of_int(bytes.read_u32::<BigEndian>()?);
        let peer = port_features_of_int(bytes.read_u32::<BigEndian>()?);
        Ok(PortDesc {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
        })
    }

    fn marshal(p: PortDesc, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(p.port_no).unwrap();
        bytes.write_all(&bytes_of_mac(p.hw_addr)).unwrap();
        write_fixed_size_string(bytes, &p.name, 16);
        let config = {
            let ret = 0u64;
            let ret = bit(0, ret, p.config.down);
            let ret = bit(1, ret, p.config.no_stp);
            let ret = bit(2, ret, p.config.no_recv);
            let ret = bit(3, ret, p.config.no_recv_stp);
            let ret = bit(4, ret, p.config.no_flood);
            let ret = bit(5, ret, p.config.no_fwd);
            bit(6, ret, p.config.no_packet_in) as u32
        };
        bytes.write_u32::<BigEndian>(config).unwrap();
        let state = {
            let stp = (p.state.stp_state as u32) << 8;
            let down = if p.state.down { 1 } else { 0 };
            stp | down
        };
        bytes.write_u32::<BigEndian>(state).unwrap();
        bytes
            .write_u32::<BigEndian>(port_features_to_int(&p.curr))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(port_features_to_int(&p.advertised))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(port_features_to_int(&p.supported))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(port_features_to_int(&p.peer))
            .unwrap();
    }
}

impl MessageType for PortStatus {
    fn size_of(_: &PortStatus) -> usize {
        8 + size_of::<OfpPhyPort>()
    }

    fn parse(buf: &[u8]) -> Result<PortStatus, OfpSerializationError> {
        let mut bytes = Cursor::new(buf.to_vec());
        let reason = match bytes.read_u8()? {
            0 => PortReason::PortAdd,
            1 => PortReason::PortDelete,
            2 => PortReason::PortModify,
            r => {
                return Err(OfpSerializationError::unexpected(
                    format!("{}", r),
                    "reason",
                    "port status",
                ));
            }
        };
        bytes.consume(7);
        let desc = PortDescCodec::parse(&mut bytes)?;
        Ok(PortStatus { reason, desc })
    }

    fn marshal(ps: PortStatus, bytes: &mut Vec<u8>) {
        bytes.write_u8(ps.reason as u8).unwrap();
        write_padding_bytes(bytes, 7);
        PortDescCodec::marshal(ps.desc, bytes);
    }
}

#[repr(packed)]
struct OfpErrorMsg(u16, u16);

fn hello_failed_of_u16(c: u16) -> Option<HelloFailed> {
    match c {
        0 => Some(HelloFailed::Incompatible),
        1 => Some(HelloFailed::EPerm),
        _ => None,
    }
}

fn bad_request_of_u16(c: u16) -> Option<BadRequest> {
    let v = match c {
        0 => BadRequest::BadVersion,
        1 => BadRequest::BadType,
        2 => BadRequest::BadStat,
        3 => BadRequest::BadVendor,
        4 => BadRequest::BadSubType,
        5 => BadRequest::EPerm,
        6 => BadRequest::BadLen,
        7 => BadRequest::BufferEmpty,
        8 => BadRequest::BufferUnknown,
        _ => return None,
    };
    Some(v)
}

fn bad_action_of_u16(c: u16) -> Option<BadAction> {
    let v = match c {
        0 => BadAction::BadType,
        1 => BadAction::BadLen,
        2 => BadAction::BadVendor,
        3 => BadAction::BadVendorType,
        4 => BadAction::BadOutPort,
        5 => BadAction::BadArgument,
        6 => BadAction::EPerm,
        7 => BadAction::TooMany,
        8 => BadAction::BadQueue,
        _ => return None,
    };
    Some(v)
}

fn flow_mod_failed_of_u16(c: u16) -> Option<FlowModFailed> {
    let v = match c {
        0 => FlowModFailed::AllTablesFull,
        1 => FlowModFailed::Overlap,
        2 => FlowModFailed::EPerm,
        3 => FlowModFailed::BadEmergTimeout,
        4 => FlowModFailed::BadCommand,
        5 => FlowModFailed::Unsupported,
        _ => return None,
    };
    Some(v)
}

fn port_mod_failed_of_u16(c: u16) -> Option<PortModFailed> {
    match c {
        0 => Some(PortModFailed::BadPort),
        1 => Some(PortModFailed::BadHwAddr),
        _ => None,
    }
}

fn queue_op_failed_of_u16(c: u16) -> Option<QueueOpFailed> {
    match c {
        0 => Some(QueueOpFailed::BadPort),
        1 => Some(QueueOpFailed::BadQueue),
        2 => Some(QueueOpFailed::EPerm),
        _ => None,
    }
}

impl MessageType for Error {
    fn size_of(err: &Error) -> usize {
        match *err {
            Error::Error(_, ref body) => size_of::<OfpErrorMsg>() + body.len(),
        }
    }

    fn parse(buf: &[u8]) -> Result<Error, OfpSerializationError> {
        let mut bytes = Cursor::new(buf.to_vec());
        let error_type = bytes.read_u16::<BigEndian>()?;
        let error_code = bytes.read_u16::<BigEndian>()?;
        let bad_code = || {
            OfpSerializationError::unexpected(format!("{:x}", error_code), "error code", "error")
        };
        let code = match error_type {
            0 => ErrorType::HelloFailed(hello_failed_of_u16(error_code).ok_or_else(bad_code)?),
            1 => ErrorType::BadRequest(bad_request_of_u16(error_code).ok_or_else(bad_code)?),
            2 => ErrorType::BadAction(bad_action_of_u16(error_code).ok_or_else(bad_code)?),
            3 => ErrorType::FlowModFailed(flow_mod_failed_of_u16(error_code).ok_or_else(bad_code)?),
            4 => ErrorType::PortModFailed(port_mod_failed_of_u16(error_code).ok_or_else(bad_code)?),
            5 => ErrorType::QueueOpFailed(queue_op_failed_of_u16(error_code).ok_or_else(bad_code)?),
            _ => {
                return Err(OfpSerializationError::unexpected(
                    format!("{:x}", error_type),
                    "error type",
                    "error",
                ));
            }
        };
        Ok(Error::Error(code, bytes.fill_buf()?.to_vec()))
    }

    fn marshal(err: Error, bytes: &mut Vec<u8>) {
        let Error::Error(code, data) = err;
        let (typ, code) = code.to_ints();
        bytes.write_u16::<BigEndian>(typ).unwrap();
        bytes.write_u16::<BigEndian>(code).unwrap();
        bytes.write_all(&data).unwrap();
    }
}

#[repr(packed)]
struct OfpStatsReq(u16, u16);
#[repr(packed)]
struct OfpStatsReqFlowBody(u8, u8, u16);
#[repr(packed)]
struct OfpStatsReqPortBody(u16, [u8; 6]);
#[repr(packed)]
struct OfpStatsReqQueueBody(u16, [u8; 2], u32);

impl MessageType for StatsReq {
    fn size_of(msg: &StatsReq) -> usize {
        size_of::<OfpStatsReq>()
            + match &msg.body {
                StatsReqBody::DescBody => 0,
                StatsReqBody::FlowStatsBody { pattern, .. } => {
                    PatternCodec::size_of(pattern) + size_of::<OfpStatsReqFlowBody>()
                }
                StatsReqBody::TableBody => 0,
                StatsReqBody::PortBody { .. } => size_of::<OfpStatsReqPortBody>(),
                StatsReqBody::QueueBody { .. } => size_of::<OfpStatsReqQueueBody>(),
                StatsReqBody::VendorBody => 0,
            }
    }

    fn parse(buf: &[u8]) -> Result<StatsReq, OfpSerializationError> {
        let mut bytes = Cursor::new(buf.to_vec());
        let req_type = StatsReqType::from_u16(bytes.read_u16::<BigEndian>()?);
        let flags = bytes.read_u16::<BigEndian>()?;
        let body = match req_type {
            StatsReqType::Desc => StatsReqBody::DescBody,
            StatsReqType::Flow | StatsReqType::Aggregate => {
                let pattern = PatternCodec::parse(&mut bytes)?;
                let table_id = bytes.read_u8()?;
                bytes.consume(1);
                let out_port = bytes.read_u16::<BigEndian>()?;
                StatsReqBody::FlowStatsBody {
                    pattern,
                    table_id,
                    out_port,
                }
            }
            StatsReqType::Table => StatsReqBody::TableBody,
            StatsReqType::Port => {
                let port_no = bytes.read_u16::<BigEndian>()?;
                bytes.consume(6);
                StatsReqBody::PortBody { port_no }
            }
            StatsReqType::Queue => {
                let port_no = bytes.read_u16::<BigEndian>()?;
                bytes.consume(2);
                let queue_id = bytes.read_u32::<BigEndian>()?;
                StatsReqBody::QueueBody { port_no, queue_id }
            }
            StatsReqType::Vendor => StatsReqBody::VendorBody,
        };
        Ok(StatsReq {
            req_type,
            flags,
            body,
        })
    }

    fn marshal(sr: StatsReq, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(sr.req_type as u16).unwrap();
        bytes.write_u16::<BigEndian>(sr.flags).unwrap();
        match sr.body {
            StatsReqBody::DescBody => {}
            StatsReqBody::FlowStatsBody {
                pattern,
                table_id,
                out_port,
            } => {
                PatternCodec::marshal(pattern, bytes);
                bytes.write_u8(table_id).unwrap();
                write_padding_bytes(bytes, 1);
                bytes.write_u16::<BigEndian>(out_port).unwrap();
            }
            StatsReqBody::TableBody => {}
            StatsReqBody::PortBody { port_no } => {
                bytes.write_u16::<BigEndian>(port_no).unwrap();
                write_padding_bytes(bytes, 6);
            }
            StatsReqBody::QueueBody { port_no, queue_id } => {
                bytes.write_u16::<BigEndian>(port_no).unwrap();
                write_padding_bytes(bytes, 2);
                bytes.write_u32::<BigEndian>(queue_id).unwrap();
            }
            StatsReqBody::VendorBody => {}
        }
    }
}

#[repr(packed)]
struct OfpStatsResp(u16, u16);
#[repr(packed)]
struct OfpStatsRespFlowStats(u16, u8, u8, u32, u32, u16, u16, u16, [u8; 6], u64, u64, u64);
#[repr(packed)]
struct OfpStatsRespAggregateBody(u64, u64, u32, [u8; 4]);
#[repr(packed)]
struct OfpStatsRespTableStats(u8, [u8; 3], [u8; OFP_MAX_TABLE_NAME_LENGTH], u32, u32, u32, u64, u64);
#[repr(packed)]
struct OfpStatsRespPortStats(u16, [u8; 6], [u64; 2], [u64; 2], [u64; 2], [u64; 2], u64, u64, u64, u64);

/// On-wire size of one flow-stats entry, match and actions included.
pub fn flow_stats_size(stats: &FlowStats) -> usize {
    PatternCodec::size_of(&stats.pattern) + size_of::<OfpStatsRespFlowStats>()
        + ActionCodec::size_of_sequence(&stats.actions)
}

fn read_counter(bytes: &mut Cursor<Vec<u8>>) -> Result<TransmissionCounter, OfpSerializationError> {
    let rx = bytes.read_u64::<BigEndian>()?;
    let tx = bytes.read_u64::<BigEndian>()?;
    Ok(TransmissionCounter { rx, tx })
}

fn write_counter(c: &TransmissionCounter, bytes: &mut Vec<u8>) {
    bytes.write_u64::<BigEndian>(c.rx).unwrap();
    bytes.write_u64::<BigEndian>(c.tx).unwrap();
}

impl MessageType for StatsResp {
    fn size_of(msg: &StatsResp) -> usize {
        size_of::<OfpStatsResp>()
            + match msg.body {
                StatsRespBody::DescBody { .. } => DESC_STR_LENGTH * 4 + SERIAL_NUM_LENGTH,
                StatsRespBody::FlowStatsBody { ref flow_stats } => {
                    flow_stats.iter().map(flow_stats_size).sum()
                }
                StatsRespBody::AggregateStatsBody { .. } => {
                    size_of::<OfpStatsRespAggregateBody>()
                }
                StatsRespBody::TableBody { ref table_stats } => {
                    table_stats.len() * size_of::<OfpStatsRespTableStats>()
                }
                StatsRespBody::PortBody { ref port_stats } => {
                    port_stats.len() * size_of::<OfpStatsRespPortStats>()
                }
            }
    }

    fn parse(buf: &[u8]) -> Result<StatsResp, OfpSerializationError> {
        let mut bytes = Cursor::new(buf.to_vec());
        let req_type = StatsReqType::from_u16(bytes.read_u16::<BigEndian>()?);
        let flags = bytes.read_u16::<BigEndian>()?;
        let body = match req_type {
            StatsReqType::Desc => {
                let manufacturer_desc = read_fixed_size_string(&mut bytes, DESC_STR_LENGTH)?;
                let hardware_desc = read_fixed_size_string(&mut bytes, DESC_STR_LENGTH)?;
                let software_desc = read_fixed_size_string(&mut bytes, DESC_STR_LENGTH)?;
                let serial_number = read_fixed_size_string(&mut bytes, SERIAL_NUM_LENGTH)?;
                let datapath_desc = read_fixed_size_string(&mut bytes, DESC_STR_LENGTH)?;
                StatsRespBody::DescBody {
                    manufacturer_desc,
                    hardware_desc,
                    software_desc,
                    serial_number,
                    datapath_desc,
                }
            }
            StatsReqType::Flow => {
                let mut flow_stats = Vec::<FlowStats>::new();
                while bytes.remaining() > 2 {
                    let entry_length = bytes.read_u16::<BigEndian>()? as usize;
                    if entry_length < 2 || bytes.remaining() + 2 < entry_length {
                        warn!(
                            "flow stats entry truncated: {} bytes left, entry of {}",
                            bytes.remaining() + 2,
                            entry_length
                        );
                        break;
                    }
                    let mut flow_data = vec![0; entry_length - 2];
                    bytes.read_exact(&mut flow_data)?;
                    let mut flow = Cursor::new(flow_data);

                    let table_id = flow.read_u8()?;
                    flow.consume(1);
                    let pattern = PatternCodec::parse(&mut flow)?;
                    let duration_sec = flow.read_u32::<BigEndian>()?;
                    let duration_nsec = flow.read_u32::<BigEndian>()?;
                    let priority = flow.read_u16::<BigEndian>()?;
                    let idle_timeout = flow.read_u16::<BigEndian>()?;
                    let hard_timeout = flow.read_u16::<BigEndian>()?;
                    flow.consume(6);
                    let cookie = flow.read_u64::<BigEndian>()?;
                    let packet_count = flow.read_u64::<BigEndian>()?;
                    let byte_count = flow.read_u64::<BigEndian>()?;
                    let actions = ActionCodec::parse_sequence(&mut flow)?;

                    flow_stats.push(FlowStats {
                        table_id,
                        pattern,
                        duration_sec,
                        duration_nsec,
                        priority,
                        idle_timeout,
                        hard_timeout,
                        cookie,
                        packet_count,
                        byte_count,
                        actions,
                    });
                }
                StatsRespBody::FlowStatsBody { flow_stats }
            }
            StatsReqType::Aggregate => {
                let packet_count = bytes.read_u64::<BigEndian>()?;
                let byte_count = bytes.read_u64::<BigEndian>()?;
                let flow_count = bytes.read_u32::<BigEndian>()?;
                bytes.consume(4);
                StatsRespBody::AggregateStatsBody {
                    packet_count,
                    byte_count,
                    flow_count,
                }
            }
            StatsReqType::Table => {
                let mut table_stats = Vec::<TableStats>::new();
                while bytes.remaining() >= size_of::<OfpStatsRespTableStats>() {
                    let table_id = bytes.read_u8()?;
                    bytes.consume(3);
                    let name = read_fixed_size_string(&mut bytes, OFP_MAX_TABLE_NAME_LENGTH)?;
                    let wildcards = WildcardsCodec::parse(bytes.read_u32::<BigEndian>()?);
                    let max_entries = bytes.read_u32::<BigEndian>()?;
                    let active_count = bytes.read_u32::<BigEndian>()?;
                    let lookup_count = bytes.read_u64::<BigEndian>()?;
                    let matched_count = bytes.read_u64::<BigEndian>()?;
                    table_stats.push(TableStats {
                        table_id,
                        name,
                        wildcards,
                        max_entries,
                        active_count,
                        lookup_count,
                        matched_count,
                    });
                }
                StatsRespBody::TableBody { table_stats }
            }
            StatsReqType::Port => {
                let mut port_stats = Vec::<PortStats>::new();
                while bytes.remaining() >= size_of::<OfpStatsRespPortStats>() {
                    let port_no = bytes.read_u16::<BigEndian>()?;
                    bytes.consume(6);
                    let packets = read_counter(&mut bytes)?;
                    let bytes_counter = read_counter(&mut bytes)?;
                    let dropped = read_counter(&mut bytes)?;
                    let errors = read_counter(&mut bytes)?;
                    let rx_frame_errors = bytes.read_u64::<BigEndian>()?;
                    let rx_over_errors = bytes.read_u64::<BigEndian>()?;
                    let rx_crc_errors = bytes.read_u64::<BigEndian>()?;
                    let collisions = bytes.read_u64::<BigEndian>()?;
                    port_stats.push(PortStats {
                        port_no,
                        packets,
                        bytes: bytes_counter,
                        dropped,
                        errors,
                        rx_frame_errors,
                        rx_over_errors,
                        rx_crc_errors,
                        collisions,
                    });
                }
                StatsRespBody::PortBody { port_stats }
            }
            StatsReqType::Queue | StatsReqType::Vendor => {
                return Err(OfpSerializationError::unexpected(
                    format!("{:?}", req_type),
                    "stats type",
                    "stats reply",
                ));
            }
        };
        Ok(StatsResp {
            req_type,
            flags,
            body,
        })
    }

    fn marshal(sr: StatsResp, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(sr.req_type as u16).unwrap();
        bytes.write_u16::<BigEndian>(sr.flags).unwrap();
        match sr.body {
            StatsRespBody::DescBody {
                manufacturer_desc,
                hardware_desc,
                software_desc,
                serial_number,
                datapath_desc,
            } => {
                write_fixed_size_string(bytes, &manufacturer_desc, DESC_STR_LENGTH);
                write_fixed_size_string(bytes, &hardware_desc, DESC_STR_LENGTH);
                write_fixed_size_string(bytes, &software_desc, DESC_STR_LENGTH);
                write_fixed_size_string(bytes, &serial_number, SERIAL_NUM_LENGTH);
                write_fixed_size_string(bytes, &datapath_desc, DESC_STR_LENGTH);
            }
            StatsRespBody::FlowStatsBody { flow_stats } => {
                for flow in flow_stats {
                    bytes
                        .write_u16::<BigEndian>(flow_stats_size(&flow) as u16)
                        .unwrap();
                    bytes.write_u8(flow.table_id).unwrap();
                    write_padding_bytes(bytes, 1);
                    PatternCodec::marshal(flow.pattern, bytes);
                    bytes.write_u32::<BigEndian>(flow.duration_sec).unwrap();
                    bytes.write_u32::<BigEndian>(flow.duration_nsec).unwrap();
                    bytes.write_u16::<BigEndian>(flow.priority).unwrap();
                    bytes.write_u16::<BigEndian>(flow.idle_timeout).unwrap();
                    bytes.write_u16::<BigEndian>(flow.hard_timeout).unwrap();
                    write_padding_bytes(bytes, 6);
                    bytes.write_u64::<BigEndian>(flow.cookie).unwrap();
                    bytes.write_u64::<BigEndian>(flow.packet_count).unwrap();
                    bytes.write_u64::<BigEndian>(flow.byte_count).unwrap();
                    for act in flow.actions {
                        ActionCodec::marshal(act, bytes);
                    }
                }
            }
            StatsRespBody::AggregateStatsBody {
                packet_count,
                byte_count,
                flow_count,
            } => {
                bytes.write_u64::<BigEndian>(packet_count).unwrap();
                bytes.write_u64::<BigEndian>(byte_count).unwrap();
                bytes.write_u32::<BigEndian>(flow_count).unwrap();
                write_padding_bytes(bytes, 4);
            }
            StatsRespBody::TableBody { table_stats } => {
                for table in table_stats {
                    bytes.write_u8(table.table_id).unwrap();
                    write_padding_bytes(bytes, 3);
                    write_fixed_size_string(bytes, &table.name, OFP_MAX_TABLE_NAME_LENGTH);
                    WildcardsCodec::marshal(table.wildcards, bytes);
                    bytes.write_u32::<BigEndian>(table.max_entries).unwrap();
                    bytes.write_u32::<BigEndian>(table.active_count).unwrap();
                    bytes.write_u64::<BigEndian>(table.lookup_count).unwrap();
                    bytes.write_u64::<BigEndian>(table.matched_count).unwrap();
                }
            }
            StatsRespBody::PortBody { port_stats } => {
                for port in port_stats {
                    bytes.write_u16::<BigEndian>(port.port_no).unwrap();
                    write_padding_bytes(bytes, 6);
                    write_counter(&port.packets, bytes);
                    write_counter(&port.bytes, bytes);
                    write_counter(&port.dropped, bytes);
                    write_counter(&port.errors, bytes);
                    bytes.write_u64::<BigEndian>(port.rx_frame_errors).unwrap();
                    bytes.write_u64::<BigEndian>(port.rx_over_errors).unwrap();
                    bytes.write_u64::<BigEndian>(port.rx_crc_errors).unwrap();
                    bytes.write_u64::<BigEndian>(port.collisions).unwrap();
                }
            }
        }
    }
}

/// Map a `Message` to its OpenFlow message type code.
fn msg_code_of_message(msg: &Message) -> MsgCode {
    match *msg {
        Message::Hello => MsgCode::Hello,
        Message::Error(_) => MsgCode::Error,
        Message::EchoRequest(_) => MsgCode::EchoReq,
        Message::EchoReply(_) => MsgCode::EchoResp,
        Message::FeaturesReq => MsgCode::FeaturesReq,
        Message::FeaturesReply(_) => MsgCode::FeaturesResp,
        Message::GetConfigReq => MsgCode::GetConfigReq,
        Message::GetConfigReply(_) => MsgCode::GetConfigResp,
        Message::SetConfig(_) => MsgCode::SetConfig,
        Message::FlowMod(_) => MsgCode::FlowMod,
        Message::PacketIn(_) => MsgCode::PacketIn,
        Message::FlowRemoved(_) => MsgCode::FlowRemoved,
        Message::PortStatus(_) => MsgCode::PortStatus,
        Message::PacketOut(_) => MsgCode::PacketOut,
        Message::BarrierRequest => MsgCode::BarrierReq,
        Message::BarrierReply => MsgCode::BarrierResp,
        Message::StatsRequest(_) => MsgCode::StatsReq,
        Message::StatsReply(_) => MsgCode::StatsResp,
    }
}

fn marshal_body(msg: Message, bytes: &mut Vec<u8>) {
    match msg {
        Message::Hello | Message::FeaturesReq | Message::GetConfigReq => (),
        Message::Error(err) => Error::marshal(err, bytes),
        Message::EchoReply(buf) | Message::EchoRequest(buf) => bytes.write_all(&buf).unwrap(),
        Message::FeaturesReply(feats) => SwitchFeatures::marshal(feats, bytes),
        Message::GetConfigReply(conf) | Message::SetConfig(conf) => {
            SwitchConfig::marshal(conf, bytes)
        }
        Message::FlowMod(flow_mod) => FlowMod::marshal(flow_mod, bytes),
        Message::PacketIn(packet_in) => PacketIn::marshal(packet_in, bytes),
        Message::FlowRemoved(flow) => FlowRemoved::marshal(flow, bytes),
        Message::PortStatus(sts) => PortStatus::marshal(sts, bytes),
        Message::PacketOut(po) => PacketOut::marshal(po, bytes),
        Message::BarrierRequest | Message::BarrierReply => (),
        Message::StatsRequest(stats_req) => StatsReq::marshal(stats_req, bytes),
        Message::StatsReply(stats_resp) => StatsResp::marshal(stats_resp, bytes),
    }
}

impl OfpMessage for Message {
    fn size_of(msg: &Message) -> usize {
        OfpHeader::size()
            + match *msg {
                Message::Hello
                | Message::FeaturesReq
                | Message::GetConfigReq
                | Message::BarrierRequest
                | Message::BarrierReply => 0,
                Message::Error(ref err) => Error::size_of(err),
                Message::EchoRequest(ref buf) | Message::EchoReply(ref buf) => buf.len(),
                Message::FeaturesReply(ref feats) => SwitchFeatures::size_of(feats),
                Message::GetConfigReply(ref c) | Message::SetConfig(ref c) => {
                    SwitchConfig::size_of(c)
                }
                Message::FlowMod(ref flow_mod) => FlowMod::size_of(flow_mod),
                Message::PacketIn(ref packet_in) => PacketIn::size_of(packet_in),
                Message::FlowRemoved(ref flow) => FlowRemoved::size_of(flow),
                Message::PortStatus(ref ps) => PortStatus::size_of(ps),
                Message::PacketOut(ref po) => PacketOut::size_of(po),
                Message::StatsRequest(ref sr) => StatsReq::size_of(sr),
                Message::StatsReply(ref sr) => StatsResp::size_of(sr),
            }
    }

    fn header_of(xid: u32, msg: &Message) -> Result<OfpHeader, OfpSerializationError> {
        let sizeof_buf = <Message as OfpMessage>::size_of(msg);
        Ok(OfpHeader::new(
            OPENFLOW_0_01_VERSION,
            msg_code_of_message(msg) as u8,
            sizeof_buf as u16,
            xid,
        ))
    }

    fn marshal(xid: u32, msg: Message) -> Result<Vec<u8>, OfpSerializationError> {
        let hdr = <Message as OfpMessage>::header_of(xid, &msg)?;
        let mut bytes = vec![];
        OfpHeader::marshal(&mut bytes, hdr);
        marshal_body(msg, &mut bytes);
        Ok(bytes)
    }

    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Message), OfpSerializationError> {
        let typ = header
            .type_code()
            .ok_or(OfpSerializationError::UnsupportedMessageCode {
                code: header.type_byte(),
            })?;
        let msg = match typ {
            MsgCode::Hello => Message::Hello,
            MsgCode::Error => Message::Error(Error::parse(buf)?),
            MsgCode::EchoReq => Message::EchoRequest(buf.to_vec()),
            MsgCode::EchoResp => Message::EchoReply(buf.to_vec()),
            MsgCode::FeaturesReq => Message::FeaturesReq,
            MsgCode::FeaturesResp => Message::FeaturesReply(SwitchFeatures::parse(buf)?),
            MsgCode::GetConfigReq => Message::GetConfigReq,
            MsgCode::GetConfigResp => Message::GetConfigReply(SwitchConfig::parse(buf)?),
            MsgCode::SetConfig => Message::SetConfig(SwitchConfig::parse(buf)?),
            MsgCode::FlowMod => Message::FlowMod(FlowMod::parse(buf)?),
            MsgCode::PacketIn => Message::PacketIn(PacketIn::parse(buf)?),
            MsgCode::FlowRemoved => Message::FlowRemoved(FlowRemoved::parse(buf)?),
            MsgCode::PortStatus => Message::PortStatus(PortStatus::parse(buf)?),
            MsgCode::PacketOut => Message::PacketOut(PacketOut::parse(buf)?),
            MsgCode::BarrierReq => Message::BarrierRequest,
            MsgCode::BarrierResp => Message::BarrierReply,
            MsgCode::StatsReq => Message::StatsRequest(StatsReq::parse(buf)?),
            MsgCode::StatsResp => Message::StatsReply(StatsResp::parse(buf)?),
            code => {
                return Err(OfpSerializationError::UnsupportedMessageCode { code: code as u8 });
            }
        };
        Ok((header.xid(), msg))
    }
}
