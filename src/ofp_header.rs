use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::mem::size_of;

use flowvisor::openflow::MsgCode;

pub type Xid = u32;

pub const OPENFLOW_0_01_VERSION: u8 = 1; // 1.0

/// OpenFlow Header
///
/// The first fields of every OpenFlow message. Parsed to determine type and
/// length of the remaining message so that the body can be framed and
/// dispatched.
#[repr(packed)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub fn size() -> usize {
        size_of::<OfpHeader>()
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(bytes: &mut Vec<u8>, header: OfpHeader) {
        bytes.write_u8(header.version()).unwrap();
        bytes.write_u8(header.typ).unwrap();
        bytes
            .write_u16::<BigEndian>(header.length() as u16)
            .unwrap();
        bytes.write_u32::<BigEndian>(header.xid()).unwrap();
    }

    /// Takes a message buffer (sized for an `OfpHeader`) and returns an `OfpHeader`.
    pub fn parse(buf: &[u8]) -> Self {
        let mut bytes = Cursor::new(buf);
        OfpHeader {
            version: bytes.read_u8().unwrap(),
            typ: bytes.read_u8().unwrap(),
            length: bytes.read_u16::<BigEndian>().unwrap(),
            xid: bytes.read_u32::<BigEndian>().unwrap(),
        }
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the OpenFlow message type code of a header, or `None` when
    /// the type byte falls outside the 1.0 message set.
    pub fn type_code(&self) -> Option<MsgCode> {
        MsgCode::from_u8(self.typ)
    }

    /// Return the raw type byte of a header.
    pub fn type_byte(&self) -> u8 {
        self.typ
    }

    /// Return the `length` field of a header. Includes the length of the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Return the `xid` field of a header, the transaction id associated with this
    /// message. Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}
