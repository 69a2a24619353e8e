use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

/// EtherType of link-layer discovery frames.
pub const ETHERTYPE_LLDP: u16 = 0x88CC;

const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_IP: u16 = 0x0800;
const ETHERTYPE_ARP: u16 = 0x0806;

const IPPROTO_ICMP: u8 = 1;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

pub fn mac_of_bytes(bytes: [u8; 6]) -> u64 {
    let mut mac: u64 = 0;
    for b in &bytes {
        mac = (mac << 8) | u64::from(*b);
    }
    mac
}

pub fn bytes_of_mac(mac: u64) -> [u8; 6] {
    let mut bytes = [0; 6];
    for i in 0..6 {
        bytes[i] = ((mac >> (8 * (5 - i))) & 0xff) as u8;
    }
    bytes
}

/// The header fields of a packet, as far as they could be parsed. Fields
/// of layers the packet does not carry are `None`; a truncated packet
/// parses to whatever prefix was readable.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub dl_src: u64,
    pub dl_dst: u64,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_pcp: Option<u8>,
    pub dl_typ: u16,
    pub nw_src: Option<u32>,
    pub nw_dst: Option<u32>,
    pub nw_proto: Option<u8>,
    pub nw_tos: Option<u8>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
}

impl Packet {
    /// Parse the link-layer header and, where present, the IPv4/ARP and
    /// transport headers of a frame. Never fails: unreadable layers leave
    /// their fields empty.
    pub fn parse(buf: &[u8]) -> Option<Packet> {
        let mut bytes = Cursor::new(buf);
        let dl_dst = Packet::read_mac(&mut bytes)?;
        let dl_src = Packet::read_mac(&mut bytes)?;
        let mut dl_typ = bytes.read_u16::<BigEndian>().ok()?;

        let (dl_vlan, dl_vlan_pcp) = if dl_typ == ETHERTYPE_VLAN {
            let tci = bytes.read_u16::<BigEndian>().ok()?;
            dl_typ = bytes.read_u16::<BigEndian>().ok()?;
            (Some(tci & 0x0fff), Some((tci >> 13) as u8))
        } else {
            (None, None)
        };

        let mut pk = Packet {
            dl_src,
            dl_dst,
            dl_vlan,
            dl_vlan_pcp,
            dl_typ,
            nw_src: None,
            nw_dst: None,
            nw_proto: None,
            nw_tos: None,
            tp_src: None,
            tp_dst: None,
        };

        match dl_typ {
            ETHERTYPE_IP => pk.parse_ipv4(&mut bytes),
            ETHERTYPE_ARP => pk.parse_arp(&mut bytes),
            _ => {}
        }
        Some(pk)
    }

    fn read_mac(bytes: &mut Cursor<&[u8]>) -> Option<u64> {
        let mut arr = [0; 6];
        for b in arr.iter_mut() {
            *b = bytes.read_u8().ok()?;
        }
        Some(mac_of_bytes(arr))
    }

    fn parse_ipv4(&mut self, bytes: &mut Cursor<&[u8]>) {
        let start = bytes.position();
        let vihl = match bytes.read_u8() {
            Ok(b) => b,
            Err(_) => return,
        };
        if vihl >> 4 != 4 {
            return;
        }
        let header_len = u64::from(vihl & 0x0f) * 4;
        let tos = match bytes.read_u8() {
            Ok(b) => b,
            Err(_) => return,
        };
        // total length, identification, flags/fragment, ttl
        if bytes.read_u16::<BigEndian>().is_err()
            || bytes.read_u16::<BigEndian>().is_err()
            || bytes.read_u16::<BigEndian>().is_err()
            || bytes.read_u8().is_err()
        {
            return;
        }
        let proto = match bytes.read_u8() {
            Ok(b) => b,
            Err(_) => return,
        };
        if bytes.read_u16::<BigEndian>().is_err() {
            return;
        }
        let src = match bytes.read_u32::<BigEndian>() {
            Ok(v) => v,
            Err(_) => return,
        };
        let dst = match bytes.read_u32::<BigEndian>() {
            Ok(v) => v,
            Err(_) => return,
        };
        self.nw_tos = Some(tos);
        self.nw_proto = Some(proto);
        self.nw_src = Some(src);
        self.nw_dst = Some(dst);

        bytes.set_position(start + header_len);
        match proto {
            IPPROTO_TCP | IPPROTO_UDP => {
                if let (Ok(sp), Ok(dp)) = (
                    bytes.read_u16::<BigEndian>(),
                    bytes.read_u16::<BigEndian>(),
                ) {
                    self.tp_src = Some(sp);
                    self.tp_dst = Some(dp);
                }
            }
            IPPROTO_ICMP => {
                // OpenFlow 1.0 matches ICMP type and code in the tp fields.
                if let (Ok(typ), Ok(code)) = (bytes.read_u8(), bytes.read_u8()) {
                    self.tp_src = Some(u16::from(typ));
                    self.tp_dst = Some(u16::from(code));
                }
            }
            _ => {}
        }
    }

    fn parse_arp(&mut self, bytes: &mut Cursor<&[u8]>) {
        // hardware type, protocol type, lengths
        if bytes.read_u16::<BigEndian>().is_err()
            || bytes.read_u16::<BigEndian>().is_err()
            || bytes.read_u8().is_err()
            || bytes.read_u8().is_err()
        {
            return;
        }
        let oper = match bytes.read_u16::<BigEndian>() {
            Ok(v) => v,
            Err(_) => return,
        };
        if Packet::read_mac(bytes).is_none() {
            return;
        }
        let spa = match bytes.read_u32::<BigEndian>() {
            Ok(v) => v,
            Err(_) => return,
        };
        if Packet::read_mac(bytes).is_none() {
            return;
        }
        let tpa = match bytes.read_u32::<BigEndian>() {
            Ok(v) => v,
            Err(_) => return,
        };
        // ARP opcode and addresses occupy the nw match fields in 1.0.
        self.nw_proto = Some((oper & 0xff) as u8);
        self.nw_src = Some(spa);
        self.nw_dst = Some(tpa);
    }
}
