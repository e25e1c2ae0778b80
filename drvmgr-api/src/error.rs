use std::fmt;

/// Enumerates every error the driver manager or one of its drivers can
/// report. New variants should stay generic enough to be useful across
/// protocols -- don't add one specific to a single driver class.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// A host-visible handle doesn't resolve to a variable.
    UnknownHandle(String),

    /// A driver class name wasn't found in the registered set.
    UnknownDriverClass(String),

    /// The peer of a communication channel has closed its end.
    MissingPeer(String),

    /// A worker sent a message tag the manager doesn't recognize.
    UnknownWorkerMessage(String),

    /// A value couldn't be converted to the requested type.
    TypeError,

    /// A configuration file was malformed or failed validation.
    BadConfig(String),

    /// An I/O operation (status file, subprocess spawn) failed.
    Io(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownHandle(h) => write!(f, "handle '{h}' is not registered"),
            Error::UnknownDriverClass(c) => {
                write!(f, "driver class '{c}' is not registered")
            }
            Error::MissingPeer(detail) => write!(f, "{detail} is missing peer"),
            Error::UnknownWorkerMessage(tag) => {
                write!(f, "worker sent unrecognized message '{tag}'")
            }
            Error::TypeError => write!(f, "incorrect value type"),
            Error::BadConfig(detail) => write!(f, "bad configuration: {detail}"),
            Error::Io(detail) => write!(f, "i/o error: {detail}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
