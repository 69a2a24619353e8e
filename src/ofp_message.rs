use flowvisor::ofp_header::{OfpHeader, Xid};
use flowvisor::openflow::MsgCode;

/// Errors raised while marshalling or parsing OpenFlow 1.0 frames.
#[derive(Debug, Fail)]
pub enum OfpSerializationError {
    #[fail(display = "IO error while decoding: {}", error)]
    IoError { error: ::std::io::Error },
    #[fail(display = "Unexpected value '{}' at field '{}' of '{}'", value, field, message)]
    UnexpectedValueError {
        value: String,
        field: String,
        message: String,
    },
    #[fail(display = "Unsupported OpenFlow version {}", version)]
    UnsupportedVersion { version: u8 },
    #[fail(display = "Message code {} is not part of OpenFlow 1.0", code)]
    UnsupportedMessageCode { code: u8 },
    #[fail(display = "Message truncated while reading '{}' of '{}'", field, message)]
    Truncated {
        field: &'static str,
        message: &'static str,
    },
}

/// OpenFlow Message
///
/// API for handling OpenFlow messages at the byte-buffer level.
pub trait OfpMessage {
    /// Return the byte-size of an `OfpMessage`, header included.
    fn size_of(msg: &Self) -> usize;
    /// Create an `OfpHeader` for the given transaction id and message.
    fn header_of(xid: Xid, msg: &Self) -> Result<OfpHeader, OfpSerializationError>;
    /// Return a marshaled buffer containing an OpenFlow header and the message `msg`.
    fn marshal(xid: Xid, msg: Self) -> Result<Vec<u8>, OfpSerializationError>;
    /// Parse a header and a body buffer into a transaction id and a message.
    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(Xid, Self), OfpSerializationError>
    where
        Self: Sized;
}

impl OfpSerializationError {
    pub fn unexpected(value: String, field: &str, message: &str) -> OfpSerializationError {
        OfpSerializationError::UnexpectedValueError {
            value,
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    /// True when the error names a frame whose type code is simply not part
    /// of the protocol version. Sessions answer these with a bad-type error
    /// and keep running; other decode errors are treated as corruption.
    pub fn is_unknown_type(&self) -> bool {
        match *self {
            OfpSerializationError::UnsupportedMessageCode { .. } => true,
            _ => false,
        }
    }
}

impl From<::std::io::Error> for OfpSerializationError {
    fn from(error: ::std::io::Error) -> OfpSerializationError {
        OfpSerializationError::IoError { error }
    }
}

/// Convenience for codec sites that encounter a type byte they cannot model.
pub fn unsupported_code(code: MsgCode) -> OfpSerializationError {
    OfpSerializationError::UnsupportedMessageCode { code: code as u8 }
}
