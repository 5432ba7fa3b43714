use std::error::Error as ErrorTrait;
use std::fmt::{self, Display, Formatter};

/// Errors raised by the bindings themselves.
/// Lower level errors (io, sled, serde) travel as `failure::Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Cannot reach or authenticate to the backend, or the adapter was
    /// already cleaned up.
    Connection(String),
    /// Contains the record, table or field that is absent.
    NotFound(String),
    /// Contains the record that already exists or changed concurrently.
    Conflict(String),
    /// The backend cannot provide this capability.
    Unsupported(String),
    /// Error reply or malformed reply from the backend.
    Protocol(String),
    /// A name that cannot be mapped onto the backend's addressing scheme.
    InvalidName(String),
    /// A property that cannot be deserialized.
    Config(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> std::result::Result<(), fmt::Error> {
        match self {
            Error::Connection(s) => write!(f, "connection error: {}", s),
            Error::NotFound(s) => write!(f, "not found: {}", s),
            Error::Conflict(s) => write!(f, "conflict: {}", s),
            Error::Unsupported(s) => write!(f, "unsupported operation: {}", s),
            Error::Protocol(s) => write!(f, "protocol error: {}", s),
            Error::InvalidName(s) => write!(f, "invalid name: {:?}", s),
            Error::Config(s) => write!(f, "bad configuration: {}", s),
        }
    }
}

impl ErrorTrait for Error {
    fn source(&self) -> Option<&(dyn ErrorTrait + 'static)> {
        None
    }
}
