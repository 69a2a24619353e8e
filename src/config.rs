//! INI configuration.
//!
//! ```ini
//! [General]
//! listen=127.0.0.1:6633
//! slices=research,production
//!
//! [Links]
//! core=1:3-2:3
//!
//! [Slice.research]
//! controller=tcp:192.0.2.10:6653
//! dpid=0x2a
//! dl_type=0x0800
//! nw_src=10.0.0.0/8
//! ```
//!
//! A slice section takes `controller` and `dpid` plus any subset of the
//! OpenFlow 1.0 match fields: `in_port`, `dl_src`, `dl_dst`, `dl_vlan`,
//! `dl_type`, `nw_proto`, `nw_tos`, `nw_src`, `nw_dst` (CIDR), `tp_src`,
//! `tp_dst`. Absent keys stay wildcarded.

use std::collections::HashMap;
use std::error;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::num::ParseIntError;
use std::str::FromStr;

use ini::Ini;

use flowvisor::message::{Mask, Pattern};
use flowvisor::openflow::OFP_TCP_PORT;
use flowvisor::packet::mac_of_bytes;
use flowvisor::topology::DatapathId;

const GENERAL_SECTION: &str = "General";
const LISTEN_KEY: &str = "listen";
const SLICES_KEY: &str = "slices";

const LINKS_SECTION: &str = "Links";

const SLICE_SECTION_PREFIX: &str = "Slice.";
const CONTROLLER_KEY: &str = "controller";
const DPID_KEY: &str = "dpid";

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Ini(String),
    MissingSection(String),
    MissingEntry(String, &'static str),
    InvalidNumber(String, ParseIntError),
    InvalidAddr(String),
    InvalidLink(String),
    InvalidMac(String),
    InvalidCidr(String),
    InvalidUri(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::Ini(ref e) => write!(f, "{}", e),
            Error::MissingSection(ref s) => {
                write!(f, "The INI file does not have a [{}] section", s)
            }
            Error::MissingEntry(ref s, k) => {
                write!(f, "The INI [{}] section does not have a '{}' key", s, k)
            }
            Error::InvalidNumber(ref v, ref e) => {
                write!(f, "Error parsing '{}' as a number: {}", v, e)
            }
            Error::InvalidAddr(ref v) => write!(f, "'{}' is not a socket address", v),
            Error::InvalidLink(ref v) => {
                write!(f, "'{}' is not a link (expected dpid:port-dpid:port)", v)
            }
            Error::InvalidMac(ref v) => write!(f, "'{}' is not a MAC address", v),
            Error::InvalidCidr(ref v) => write!(f, "'{}' is not an IPv4 CIDR", v),
            Error::InvalidUri(ref v) => {
                write!(f, "'{}' is not a controller URI (expected tcp:host:port)", v)
            }
        }
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "INI configuration parser error"
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(ioe) => ioe,
            _ => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// One declared inter-switch link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConfig {
    pub a_dpid: DatapathId,
    pub a_port: u16,
    pub b_dpid: DatapathId,
    pub b_port: u16,
}

#[derive(Debug, Clone)]
pub struct SliceConfig {
    pub name: String,
    pub controller: SocketAddr,
    pub dpid: DatapathId,
    pub filter: Pattern,
}

#[derive(Debug)]
pub struct Config {
    pub listen: SocketAddr,
    pub links: Vec<LinkConfig>,
    pub slices: Vec<SliceConfig>,
}

/// Accepts decimal or 0x-prefixed hexadecimal.
fn parse_number<T>(s: &str) -> Result<T, Error>
where
    T: NumFromStrRadix,
{
    let s = s.trim();
    let result = if s.starts_with("0x") || s.starts_with("0X") {
        T::from_str_radix(&s[2..], 16)
    } else {
        T::from_str_radix(s, 10)
    };
    result.map_err(|e| Error::InvalidNumber(s.to_string(), e))
}

pub trait NumFromStrRadix: Sized {
    fn from_str_radix(src: &str, radix: u32) -> Result<Self, ParseIntError>;
}

macro_rules! impl_num_from_str_radix {
    ($($t:ty),*) => {
        $(impl NumFromStrRadix for $t {
            fn from_str_radix(src: &str, radix: u32) -> Result<Self, ParseIntError> {
                <$t>::from_str_radix(src, radix)
            }
        })*
    }
}

impl_num_from_str_radix!(u8, u16, u32, u64);

fn parse_mac(s: &str) -> Result<u64, Error> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return Err(Error::InvalidMac(s.to_string()));
    }
    let mut bytes = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        bytes[i] =
            u8::from_str_radix(part, 16).map_err(|_| Error::InvalidMac(s.to_string()))?;
    }
    Ok(mac_of_bytes(bytes))
}

/// `a.b.c.d/len` or a bare address; the mask counts wildcarded low bits
/// the way the OpenFlow match encodes it.
fn parse_cidr(s: &str) -> Result<Mask<u32>, Error> {
    let (addr, prefix) = match s.find('/') {
        Some(idx) => {
            let prefix: u32 = s[idx + 1..]
                .parse()
                .map_err(|_| Error::InvalidCidr(s.to_string()))?;
            if prefix > 32 {
                return Err(Error::InvalidCidr(s.to_string()));
            }
            (&s[..idx], prefix)
        }
        None => (s, 32),
    };
    let addr =
        Ipv4Addr::from_str(addr).map_err(|_| Error::InvalidCidr(s.to_string()))?;
    Ok(Mask {
        value: u32::from(addr),
        mask: if prefix == 32 { None } else { Some(32 - prefix) },
    })
}

/// `tcp:host:port` or `host:port`; a missing port falls back to the
/// OpenFlow default.
fn parse_controller_uri(s: &str) -> Result<SocketAddr, Error> {
    let rest = if s.starts_with("tcp:") { &s[4..] } else { s };
    if let Ok(addr) = SocketAddr::from_str(rest) {
        return Ok(addr);
    }
    let with_default = format!("{}:{}", rest, OFP_TCP_PORT);
    SocketAddr::from_str(&with_default).map_err(|_| Error::InvalidUri(s.to_string()))
}

/// `dpid:port-dpid:port`
fn parse_link(s: &str) -> Result<LinkConfig, Error> {
    let invalid = || Error::InvalidLink(s.to_string());
    let mut ends = s.splitn(2, '-');
    let a = ends.next().ok_or_else(invalid)?;
    let b = ends.next().ok_or_else(invalid)?;
    let parse_end = |end: &str| -> Result<(DatapathId, u16), Error> {
        let idx = end.rfind(':').ok_or_else(invalid)?;
        let dpid = parse_number::<u64>(&end[..idx])?;
        let port = parse_number::<u16>(&end[idx + 1..])?;
        Ok((dpid, port))
    };
    let (a_dpid, a_port) = parse_end(a.trim())?;
    let (b_dpid, b_port) = parse_end(b.trim())?;
    Ok(LinkConfig {
        a_dpid,
        a_port,
        b_dpid,
        b_port,
    })
}

fn filter_of_section(section: &HashMap<String, String>) -> Result<Pattern, Error> {
    let mut filter = Pattern::match_all();
    if let Some(v) = section.get("in_port") {
        filter.in_port = Some(parse_number(v)?);
    }
    if let Some(v) = section.get("dl_src") {
        filter.dl_src = Some(parse_mac(v)?);
    }
    if let Some(v) = section.get("dl_dst") {
        filter.dl_dst = Some(parse_mac(v)?);
    }
    if let Some(v) = section.get("dl_vlan") {
        filter.dl_vlan = Some(Some(parse_number(v)?));
    }
    if let Some(v) = section.get("dl_type") {
        filter.dl_typ = Some(parse_number(v)?);
    }
    if let Some(v) = section.get("nw_proto") {
        filter.nw_proto = Some(parse_number(v)?);
    }
    if let Some(v) = section.get("nw_tos") {
        filter.nw_tos = Some(parse_number(v)?);
    }
    if let Some(v) = section.get("nw_src") {
        filter.nw_src = Some(parse_cidr(v)?);
    }
    if let Some(v) = section.get("nw_dst") {
        filter.nw_dst = Some(parse_cidr(v)?);
    }
    if let Some(v) = section.get("tp_src") {
        filter.tp_src = Some(parse_number(v)?);
    }
    if let Some(v) = section.get("tp_dst") {
        filter.tp_dst = Some(parse_number(v)?);
    }
    Ok(filter)
}

fn slice_of_section(name: &str, section: &HashMap<String, String>) -> Result<SliceConfig, Error> {
    let section_name = format!("{}{}", SLICE_SECTION_PREFIX, name);
    let controller = section
        .get(CONTROLLER_KEY)
        .ok_or_else(|| Error::MissingEntry(section_name.clone(), CONTROLLER_KEY))?;
    let dpid = section
        .get(DPID_KEY)
        .ok_or_else(|| Error::MissingEntry(section_name.clone(), DPID_KEY))?;
    Ok(SliceConfig {
        name: name.to_string(),
        controller: parse_controller_uri(controller)?,
        dpid: parse_number(dpid)?,
        filter: filter_of_section(section)?,
    })
}

pub fn parse_file(path: &str) -> Result<Config, Error> {
    info!("Reading INI file {}", path);
    let conf = Ini::load_from_file(path).map_err(|e| Error::Ini(e.to_string()))?;

    let general = conf
        .section(Some(GENERAL_SECTION.to_owned()))
        .ok_or_else(|| Error::MissingSection(GENERAL_SECTION.to_string()))?;
    let listen = general
        .get(LISTEN_KEY)
        .ok_or_else(|| Error::MissingEntry(GENERAL_SECTION.to_string(), LISTEN_KEY))?;
    let listen =
        SocketAddr::from_str(listen).map_err(|_| Error::InvalidAddr(listen.to_string()))?;

    let mut links = vec![];
    if let Some(link_section) = conf.section(Some(LINKS_SECTION.to_owned())) {
        let mut entries: Vec<(&String, &String)> = link_section.iter().collect();
        entries.sort();
        for (_, value) in entries {
            links.push(parse_link(value)?);
        }
    }

    let mut slices = vec![];
    let names = general
        .get(SLICES_KEY)
        .ok_or_else(|| Error::MissingEntry(GENERAL_SECTION.to_string(), SLICES_KEY))?;
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let section_name = format!("{}{}", SLICE_SECTION_PREFIX, name);
        let section = conf
            .section(Some(section_name.clone()))
            .ok_or_else(|| Error::MissingSection(section_name.clone()))?;
        slices.push(slice_of_section(name, section)?);
    }

    debug!("Got {:?} links, {:?} slices", links.len(), slices.len());
    Ok(Config {
        listen,
        links,
        slices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_in_both_bases() {
        assert_eq!(parse_number::<u16>("10").unwrap(), 10);
        assert_eq!(parse_number::<u16>("0x0800").unwrap(), 0x0800);
        assert!(parse_number::<u16>("zebra").is_err());
    }

    #[test]
    fn parses_macs() {
        assert_eq!(parse_mac("00:00:5e:00:53:01").unwrap(), 0x00005e005301);
        assert!(parse_mac("00:00:5e:00:53").is_err());
    }

    #[test]
    fn parses_cidrs_into_low_bit_masks() {
        let m = parse_cidr("10.0.0.0/8").unwrap();
        assert_eq!(m.value, 0x0a000000);
        assert_eq!(m.mask, Some(24));
        let exact = parse_cidr("192.0.2.1").unwrap();
        assert_eq!(exact.mask, None);
        assert!(parse_cidr("10.0.0.0/40").is_err());
    }

    #[test]
    fn parses_links() {
        assert_eq!(
            parse_link("1:3-2:3").unwrap(),
            LinkConfig {
                a_dpid: 1,
                a_port: 3,
                b_dpid: 2,
                b_port: 3,
            }
        );
        assert_eq!(
            parse_link("0x10:1 - 0x20:2").unwrap(),
            LinkConfig {
                a_dpid: 0x10,
                a_port: 1,
                b_dpid: 0x20,
                b_port: 2,
            }
        );
        assert!(parse_link("1:3").is_err());
    }

    #[test]
    fn parses_controller_uris() {
        assert_eq!(
            parse_controller_uri("tcp:127.0.0.1:7733").unwrap(),
            SocketAddr::from_str("127.0.0.1:7733").unwrap()
        );
        assert_eq!(
            parse_controller_uri("127.0.0.1").unwrap(),
            SocketAddr::from_str("127.0.0.1:6633").unwrap()
        );
        assert!(parse_controller_uri("tcp:nowhere").is_err());
    }

    #[test]
    fn builds_filters_from_section_keys() {
        let mut section = HashMap::new();
        section.insert("dl_type".to_string(), "0x0800".to_string());
        section.insert("nw_src".to_string(), "10.0.0.0/8".to_string());
        let filter = filter_of_section(&section).unwrap();
        assert_eq!(filter.dl_typ, Some(0x0800));
        assert_eq!(
            filter.nw_src,
            Some(Mask {
                value: 0x0a000000,
                mask: Some(24),
            })
        );
        assert_eq!(filter.in_port, None);
    }
}
