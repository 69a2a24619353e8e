use std::fmt::{Display, Error, Formatter};

/// Default TCP port for OpenFlow connections.
pub const OFP_TCP_PORT: u16 = 6633;

/// OpenFlow message type codes, used by headers to identify meaning of the rest of a message.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MsgCode {
    Hello,
    Error,
    EchoReq,
    EchoResp,
    Vendor,
    FeaturesReq,
    FeaturesResp,
    GetConfigReq,
    GetConfigResp,
    SetConfig,
    PacketIn,
    FlowRemoved,
    PortStatus,
    PacketOut,
    FlowMod,
    PortMod,
    StatsReq,
    StatsResp,
    BarrierReq,
    BarrierResp,
    QueueGetConfigReq,
    QueueGetConfigResp,
}

impl MsgCode {
    /// Map a header type byte back to a message code. Returns `None` for
    /// codes outside the OpenFlow 1.0 range so that callers can answer
    /// them with a bad-type error instead of dropping the session.
    pub fn from_u8(code: u8) -> Option<MsgCode> {
        let c = match code {
            0 => MsgCode::Hello,
            1 => MsgCode::Error,
            2 => MsgCode::EchoReq,
            3 => MsgCode::EchoResp,
            4 => MsgCode::Vendor,
            5 => MsgCode::FeaturesReq,
            6 => MsgCode::FeaturesResp,
            7 => MsgCode::GetConfigReq,
            8 => MsgCode::GetConfigResp,
            9 => MsgCode::SetConfig,
            10 => MsgCode::PacketIn,
            11 => MsgCode::FlowRemoved,
            12 => MsgCode::PortStatus,
            13 => MsgCode::PacketOut,
            14 => MsgCode::FlowMod,
            15 => MsgCode::PortMod,
            16 => MsgCode::StatsReq,
            17 => MsgCode::StatsResp,
            18 => MsgCode::BarrierReq,
            19 => MsgCode::BarrierResp,
            20 => MsgCode::QueueGetConfigReq,
            21 => MsgCode::QueueGetConfigResp,
            _ => return None,
        };
        Some(c)
    }
}

impl Display for MsgCode {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        let text = match self {
            MsgCode::Hello => "Hello",
            MsgCode::Error => "Error",
            MsgCode::EchoReq => "EchoReq",
            MsgCode::EchoResp => "EchoResp",
            MsgCode::Vendor => "Vendor",
            MsgCode::FeaturesReq => "FeaturesReq",
            MsgCode::FeaturesResp => "FeaturesResp",
            MsgCode::GetConfigReq => "GetConfigReq",
            MsgCode::GetConfigResp => "GetConfigResp",
            MsgCode::SetConfig => "SetConfig",
            MsgCode::PacketIn => "PacketIn",
            MsgCode::FlowRemoved => "FlowRemoved",
            MsgCode::PortStatus => "PortStatus",
            MsgCode::PacketOut => "PacketOut",
            MsgCode::FlowMod => "FlowMod",
            MsgCode::PortMod => "PortMod",
            MsgCode::StatsReq => "StatsReq",
            MsgCode::StatsResp => "StatsResp",
            MsgCode::BarrierReq => "BarrierReq",
            MsgCode::BarrierResp => "BarrierResp",
            MsgCode::QueueGetConfigReq => "QueueGetConfigReq",
            MsgCode::QueueGetConfigResp => "QueueGetConfigResp",
        };
        f.write_str(text)
    }
}

/// Reserved port numbers of OpenFlow 1.0. Ports above `OFPPMax` are
/// pseudo-ports; everything at or below it names a physical port.
#[repr(u16)]
pub enum OfpPort {
    OFPPMax = 0xff00,
    OFPPInPort = 0xfff8,
    OFPPTable = 0xfff9,
    OFPPNormal = 0xfffa,
    OFPPFlood = 0xfffb,
    OFPPAll = 0xfffc,
    OFPPController = 0xfffd,
    OFPPLocal = 0xfffe,
    OFPPNone = 0xffff,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(MsgCode::from_u8(14), Some(MsgCode::FlowMod));
        assert_eq!(MsgCode::from_u8(22), None);
        assert_eq!(MsgCode::from_u8(0xff), None);
    }
}
