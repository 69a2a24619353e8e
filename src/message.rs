use flowvisor::ofp_message::OfpSerializationError;
use flowvisor::openflow::OfpPort;
use flowvisor::packet::Packet;

#[derive(Debug, PartialEq, Clone)]
pub struct Wildcards {
    pub in_port: bool,
    pub dl_vlan: bool,
    pub dl_src: bool,
    pub dl_dst: bool,
    pub dl_type: bool,
    pub nw_proto: bool,
    pub tp_src: bool,
    pub tp_dst: bool,
    pub nw_src: u32,
    pub nw_dst: u32,
    pub dl_vlan_pcp: bool,
    pub nw_tos: bool,
}

impl Wildcards {
    fn mask_bits(x: &Option<Mask<u32>>) -> u32 {
        match *x {
            None => 32,
            Some(ref x) => x.mask.unwrap_or(0),
        }
    }
}

/// How long before a flow entry expires.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Timeout {
    Permanent,
    ExpiresAfter(u16),
}

impl Timeout {
    pub fn of_int(tm: u16) -> Timeout {
        match tm {
            0 => Timeout::Permanent,
            d => Timeout::ExpiresAfter(d),
        }
    }

    pub fn to_int(tm: Timeout) -> u16 {
        match tm {
            Timeout::Permanent => 0,
            Timeout::ExpiresAfter(d) => d,
        }
    }
}

/// A value with an optional count of wildcarded low bits, as used by the
/// OpenFlow 1.0 IP match fields. `mask: Some(8)` compares the upper 24 bits.
#[derive(Debug, PartialEq, Clone)]
pub struct Mask<T> {
    pub value: T,
    pub mask: Option<T>,
}

/// Capabilities supported by a datapath.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Capabilities {
    pub flow_stats: bool,
    pub table_stats: bool,
    pub port_stats: bool,
    pub stp: bool,
    pub ip_reasm: bool,
    pub queue_stats: bool,
    pub arp_match_ip: bool,
}

/// Actions supported by a datapath.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SupportedActions {
    pub output: bool,
    pub set_vlan_id: bool,
    pub set_vlan_pcp: bool,
    pub strip_vlan: bool,
    pub set_dl_src: bool,
    pub set_dl_dst: bool,
    pub set_nw_src: bool,
    pub set_nw_dst: bool,
    pub set_nw_tos: bool,
    pub set_tp_src: bool,
    pub set_tp_dst: bool,
    pub enqueue: bool,
    pub vendor: bool,
}

/// Switch features, real or synthesized.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub supported_capabilities: Capabilities,
    pub supported_actions: SupportedActions,
    pub ports: Vec<PortDesc>,
}

/// Switch configuration as carried by get-config replies and set-config.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

/// Fields to match against flows. `None` wildcards a field.
#[derive(Debug, PartialEq, Clone)]
pub struct Pattern {
    pub dl_src: Option<u64>,
    pub dl_dst: Option<u64>,
    pub dl_typ: Option<u16>,
    pub dl_vlan: Option<Option<u16>>,
    pub dl_vlan_pcp: Option<u8>,
    pub nw_src: Option<Mask<u32>>,
    pub nw_dst: Option<Mask<u32>>,
    pub nw_proto: Option<u8>,
    pub nw_tos: Option<u8>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
    pub in_port: Option<u16>,
}

impl Pattern {
    pub fn match_all() -> Pattern {
        Pattern {
            dl_src: None,
            dl_dst: None,
            dl_typ: None,
            dl_vlan: None,
            dl_vlan_pcp: None,
            nw_src: None,
            nw_dst: None,
            nw_proto: None,
            nw_tos: None,
            tp_src: None,
            tp_dst: None,
            in_port: None,
        }
    }

    pub fn wildcards_of_pattern(m: &Pattern) -> Wildcards {
        Wildcards {
            in_port: m.in_port.is_none(),
            dl_vlan: m.dl_vlan.is_none(),
            dl_src: m.dl_src.is_none(),
            dl_dst: m.dl_dst.is_none(),
            dl_type: m.dl_typ.is_none(),
            nw_proto: m.nw_proto.is_none(),
            tp_src: m.tp_src.is_none(),
            tp_dst: m.tp_dst.is_none(),
            nw_src: Wildcards::mask_bits(&m.nw_src),
            nw_dst: Wildcards::mask_bits(&m.nw_dst),
            dl_vlan_pcp: m.dl_vlan_pcp.is_none(),
            nw_tos: m.nw_tos.is_none(),
        }
    }

    fn mask_matches(field: &Option<Mask<u32>>, addr: Option<u32>) -> bool {
        let mask = match *field {
            None => return true,
            Some(ref m) => m,
        };
        let addr = match addr {
            None => return false,
            Some(a) => a,
        };
        let wc = mask.mask.unwrap_or(0).min(32);
        if wc >= 32 {
            true
        } else {
            (addr >> wc) == (mask.value >> wc)
        }
    }

    /// Match a parsed packet against this pattern under the pattern's own
    /// wildcards. The in_port field is matched by the caller when it has
    /// one to offer; this only compares header fields.
    pub fn matches_packet(&self, pk: &Packet) -> bool {
        fn field<T: PartialEq>(want: &Option<T>, got: Option<T>) -> bool {
            match *want {
                None => true,
                Some(ref w) => got.as_ref() == Some(w),
            }
        }
        field(&self.dl_src, Some(pk.dl_src))
            && field(&self.dl_dst, Some(pk.dl_dst))
            && field(&self.dl_typ, Some(pk.dl_typ))
            && match self.dl_vlan {
                None => true,
                Some(want) => want == pk.dl_vlan,
            }
            && field(&self.dl_vlan_pcp, pk.dl_vlan_pcp)
            && Pattern::mask_matches(&self.nw_src, pk.nw_src)
            && Pattern::mask_matches(&self.nw_dst, pk.nw_dst)
            && field(&self.nw_proto, pk.nw_proto)
            && field(&self.nw_tos, pk.nw_tos)
            && field(&self.tp_src, pk.tp_src)
            && field(&self.tp_dst, pk.tp_dst)
    }

    /// True when every flow matched by `flow` is also matched by `self`,
    /// i.e. the flow lies inside this pattern's flow-space. Used to decide
    /// which slices see a flow-removed notification.
    pub fn covers(&self, flow: &Pattern) -> bool {
        fn field<T: PartialEq>(want: &Option<T>, flow: &Option<T>) -> bool {
            match *want {
                None => true,
                Some(ref w) => flow.as_ref() == Some(w),
            }
        }
        fn mask_covers(want: &Option<Mask<u32>>, flow: &Option<Mask<u32>>) -> bool {
            let want = match *want {
                None => return true,
                Some(ref m) => m,
            };
            let flow = match *flow {
                None => return false,
                Some(ref m) => m,
            };
            let wc = want.mask.unwrap_or(0).min(32);
            if flow.mask.unwrap_or(0).min(32) > wc {
                return false;
            }
            wc >= 32 || (flow.value >> wc) == (want.value >> wc)
        }
        field(&self.dl_src, &flow.dl_src)
            && field(&self.dl_dst, &flow.dl_dst)
            && field(&self.dl_typ, &flow.dl_typ)
            && field(&self.dl_vlan, &flow.dl_vlan)
            && field(&self.dl_vlan_pcp, &flow.dl_vlan_pcp)
            && mask_covers(&self.nw_src, &flow.nw_src)
            && mask_covers(&self.nw_dst, &flow.nw_dst)
            && field(&self.nw_proto, &flow.nw_proto)
            && field(&self.nw_tos, &flow.nw_tos)
            && field(&self.tp_src, &flow.tp_src)
            && field(&self.tp_dst, &flow.tp_dst)
    }
}

/// Port behavior.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PseudoPort {
    PhysicalPort(u16),
    InPort,
    Table,
    Normal,
    Flood,
    AllPorts,
    Controller(u64),
    Local,
}

impl PseudoPort {
    /// Decode a wire port number; `OFPP_NONE` decodes to `None`.
    pub fn of_int(p: u16) -> Result<Option<PseudoPort>, OfpSerializationError> {
        if (OfpPort::OFPPNone as u16) == p {
            Ok(None)
        } else {
            Ok(Some(PseudoPort::make(p, 0)?))
        }
    }

    /// Decode a wire port number that must name a port.
    pub fn make(p: u16, len: u64) -> Result<PseudoPort, OfpSerializationError> {
        let res = match p {
            p if p == (OfpPort::OFPPInPort as u16) => PseudoPort::InPort,
            p if p == (OfpPort::OFPPTable as u16) => PseudoPort::Table,
            p if p == (OfpPort::OFPPNormal as u16) => PseudoPort::Normal,
            p if p == (OfpPort::OFPPFlood as u16) => PseudoPort::Flood,
            p if p == (OfpPort::OFPPAll as u16) => PseudoPort::AllPorts,
            p if p == (OfpPort::OFPPController as u16) => PseudoPort::Controller(len),
            p if p == (OfpPort::OFPPLocal as u16) => PseudoPort::Local,
            _ => {
                if p <= (OfpPort::OFPPMax as u16) {
                    PseudoPort::PhysicalPort(p)
                } else {
                    return Err(OfpSerializationError::unexpected(
                        format!("{:x}", p),
                        "port number",
                        "port",
                    ));
                }
            }
        };
        Ok(res)
    }

    /// The wire number of this port.
    pub fn to_int(&self) -> u16 {
        match *self {
            PseudoPort::PhysicalPort(p) => p,
            PseudoPort::InPort => OfpPort::OFPPInPort as u16,
            PseudoPort::Table => OfpPort::OFPPTable as u16,
            PseudoPort::Normal => OfpPort::OFPPNormal as u16,
            PseudoPort::Flood => OfpPort::OFPPFlood as u16,
            PseudoPort::AllPorts => OfpPort::OFPPAll as u16,
            PseudoPort::Controller(_) => OfpPort::OFPPController as u16,
            PseudoPort::Local => OfpPort::OFPPLocal as u16,
        }
    }
}

/// Type of modification to perform on a flow table.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FlowModCmd {
    AddFlow,
    ModFlow,
    ModStrictFlow,
    DeleteFlow,
    DeleteStrictFlow,
}

impl FlowModCmd {
    pub fn from_u16(v: u16) -> Option<FlowModCmd> {
        let cmd = match v {
            0 => FlowModCmd::AddFlow,
            1 => FlowModCmd::ModFlow,
            2 => FlowModCmd::ModStrictFlow,
            3 => FlowModCmd::DeleteFlow,
            4 => FlowModCmd::DeleteStrictFlow,
            _ => return None,
        };
        Some(cmd)
    }
}

/// Represents modifications to a flow table from the controller.
#[derive(Debug, PartialEq, Clone)]
pub struct FlowMod {
    pub command: FlowModCmd,
    pub pattern: Pattern,
    pub priority: u16,
    pub actions: Vec<Action>,
    pub cookie: u64,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub notify_when_removed: bool,
    pub apply_to_packet: Option<u32>,
    pub out_port: Option<PseudoPort>,
    pub check_overlap: bool,
}

/// Actions associated with flows and packets.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Action {
    Output(PseudoPort),
    SetDlVlan(Option<u16>),
    SetDlVlanPcp(u8),
    SetDlSrc(u64),
    SetDlDst(u64),
    SetNwSrc(u32),
    SetNwDst(u32),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    Enqueue(PseudoPort, u32),
}

/// The data associated with a packet received by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Buffered(u32, Vec<u8>),
    NotBuffered(Vec<u8>),
}

impl Payload {
    pub fn size_of(payload: &Payload) -> usize {
        match *payload {
            Payload::Buffered(_, ref buf) | Payload::NotBuffered(ref buf) => buf.len(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match *self {
            Payload::Buffered(_, ref buf) | Payload::NotBuffered(ref buf) => buf,
        }
    }

    pub fn buffer_id(&self) -> Option<u32> {
        match *self {
            Payload::Buffered(n, _) => Some(n),
            Payload::NotBuffered(_) => None,
        }
    }
}

/// The reason a packet arrives at the controller.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PacketInReason {
    NoMatch,
    ExplicitSend,
}

/// Represents packets received by the datapath and sent to the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketIn {
    pub input_payload: Payload,
    pub total_len: u16,
    pub port: u16,
    pub reason: PacketInReason,
}

/// Represents packets sent from the controller.
#[derive(Debug, PartialEq, Clone)]
pub struct PacketOut {
    pub output_payload: Payload,
    pub port_id: Option<u16>,
    pub apply_actions: Vec<Action>,
}

/// Reason a flow was removed from a switch.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FlowRemovedReason {
    IdleTimeout,
    HardTimeout,
    Delete,
}

/// Flow removed (datapath -> controller).
#[derive(Debug, PartialEq, Clone)]
pub struct FlowRemoved {
    pub pattern: Pattern,
    pub cookie: i64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: Timeout,
    pub packet_count: u64,
    pub byte_count: u64,
}

/// STP state of a port.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StpState {
    Listen,
    Learn,
    Forward,
    Block,
}

/// Current state of a physical port. Not configurable by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PortState {
    pub down: bool,
    pub stp_state: StpState,
}

/// Features of physical ports available in a datapath.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PortFeatures {
    pub f_10mbhd: bool,
    pub f_10mbfd: bool,
    pub f_100mbhd: bool,
    pub f_100mbfd: bool,
    pub f_1gbhd: bool,
    pub f_1gbfd: bool,
    pub f_10gbfd: bool,
    pub copper: bool,
    pub fiber: bool,
    pub autoneg: bool,
    pub pause: bool,
    pub pause_asym: bool,
}

/// Flags describing or configuring the behavior of a physical port.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PortConfig {
    pub down: bool,
    pub no_stp: bool,
    pub no_recv: bool,
    pub no_recv_stp: bool,
    pub no_flood: bool,
    pub no_fwd: bool,
    pub no_packet_in: bool,
}

/// Description of a physical port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortDesc {
    pub port_no: u16,
    pub hw_addr: u64,
    pub name: String,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
}

/// Type of stats request.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StatsReqType {
    Desc,
    Flow,
    Aggregate,
    Table,
    Port,
    Queue,
    Vendor = 0xFFFF,
}

impl StatsReqType {
    pub fn from_u16(value: u16) -> StatsReqType {
        match value {
            0 => StatsReqType::Desc,
            1 => StatsReqType::Flow,
            2 => StatsReqType::Aggregate,
            3 => StatsReqType::Table,
            4 => StatsReqType::Port,
            5 => StatsReqType::Queue,
            _ => StatsReqType::Vendor,
        }
    }
}

/// Body of a stats request.
#[derive(Debug, PartialEq, Clone)]
pub enum StatsReqBody {
    DescBody,
    FlowStatsBody {
        // also used for aggregate stats
        pattern: Pattern,
        table_id: u8,
        out_port: u16,
    },
    TableBody,
    PortBody {
        port_no: u16,
    },
    QueueBody {
        port_no: u16,
        queue_id: u32,
    },
    VendorBody,
}

/// Stats request from the controller.
#[derive(Debug, PartialEq, Clone)]
pub struct StatsReq {
    pub req_type: StatsReqType,
    pub flags: u16,
    pub body: StatsReqBody,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FlowStats {
    pub table_id: u8,
    pub pattern: Pattern,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub actions: Vec<Action>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TransmissionCounter {
    pub rx: u64,
    pub tx: u64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct PortStats {
    pub port_no: u16,
    pub packets: TransmissionCounter,
    pub bytes: TransmissionCounter,
    pub dropped: TransmissionCounter,
    pub errors: TransmissionCounter,
    pub rx_frame_errors: u64,
    pub rx_over_errors: u64,
    pub rx_crc_errors: u64,
    pub collisions: u64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TableStats {
    pub table_id: u8,
    pub name: String,
    pub wildcards: Wildcards,
    pub max_entries: u32,
    pub active_count: u32,
    pub lookup_count: u64,
    pub matched_count: u64,
}

/// Body of a stats response. The reply-more flag lives in `StatsResp::flags`.
#[derive(Debug, PartialEq, Clone)]
pub enum StatsRespBody {
    DescBody {
        manufacturer_desc: String,
        hardware_desc: String,
        software_desc: String,
        serial_number: String,
        datapath_desc: String,
    },
    FlowStatsBody {
        flow_stats: Vec<FlowStats>,
    },
    AggregateStatsBody {
        packet_count: u64,
        byte_count: u64,
        flow_count: u32,
    },
    TableBody {
        table_stats: Vec<TableStats>,
    },
    PortBody {
        port_stats: Vec<PortStats>,
    },
}

/// Flag bit in `StatsResp::flags` announcing that more reply frames follow.
pub const STATS_REPLY_MORE: u16 = 0x0001;

#[derive(Debug, PartialEq, Clone)]
pub struct StatsResp {
    pub req_type: StatsReqType,
    pub flags: u16,
    pub body: StatsRespBody,
}

/// What changed about a physical port.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PortReason {
    PortAdd,
    PortDelete,
    PortModify,
}

/// A physical port has changed in the datapath.
#[derive(Debug, PartialEq, Clone)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

/// Reason Hello failed.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum HelloFailed {
    Incompatible,
    EPerm,
}

/// Reason the peer made a bad request.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BadRequest {
    BadVersion,
    BadType,
    BadStat,
    BadVendor,
    BadSubType,
    EPerm,
    BadLen,
    BufferEmpty,
    BufferUnknown,
}

/// Reason an action in a request failed.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BadAction {
    BadType,
    BadLen,
    BadVendor,
    BadVendorType,
    BadOutPort,
    BadArgument,
    EPerm,
    TooMany,
    BadQueue,
}

/// Reason a FlowMod failed.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FlowModFailed {
    AllTablesFull,
    Overlap,
    EPerm,
    BadEmergTimeout,
    BadCommand,
    Unsupported,
}

/// Reason a PortMod failed.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PortModFailed {
    BadPort,
    BadHwAddr,
}

/// Reason a queue operation failed.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum QueueOpFailed {
    BadPort,
    BadQueue,
    EPerm,
}

/// High-level type of OpenFlow error.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ErrorType {
    HelloFailed(HelloFailed),
    BadRequest(BadRequest),
    BadAction(BadAction),
    FlowModFailed(FlowModFailed),
    PortModFailed(PortModFailed),
    QueueOpFailed(QueueOpFailed),
}

impl ErrorType {
    /// Wire (type, code) pair of this error.
    pub fn to_ints(&self) -> (u16, u16) {
        match *self {
            ErrorType::HelloFailed(c) => (0, c as u16),
            ErrorType::BadRequest(c) => (1, c as u16),
            ErrorType::BadAction(c) => (2, c as u16),
            ErrorType::FlowModFailed(c) => (3, c as u16),
            ErrorType::PortModFailed(c) => (4, c as u16),
            ErrorType::QueueOpFailed(c) => (5, c as u16),
        }
    }
}

/// Error message, carrying the offending message bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Error(ErrorType, Vec<u8>),
}

/// Abstractions of OpenFlow 1.0 messages mapping to message codes.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello,
    Error(Error),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    FeaturesReq,
    FeaturesReply(SwitchFeatures),
    GetConfigReq,
    GetConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    FlowMod(FlowMod),
    PacketIn(PacketIn),
    FlowRemoved(FlowRemoved),
    PortStatus(PortStatus),
    PacketOut(PacketOut),
    BarrierRequest,
    BarrierReply,
    StatsRequest(StatsReq),
    StatsReply(StatsResp),
}
