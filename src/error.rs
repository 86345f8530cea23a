use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Transport level failures (opening, reading, writing the byte channel).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to open {target}: {source}")]
    OpenFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read from transport failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("write to transport failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("baud rate {0} not supported by transport")]
    BaudrateUnsupported(u32),

    #[error("transport operation cancelled")]
    Cancelled,
}

/// Wire protocol failures (framing, acknowledge pairing, timeouts).
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("corrupt message: {0}")]
    MessageCorrupt(&'static str),

    #[error("unsupported function code: {0}")]
    UnsupportedFunction(u16),

    #[error("timeout waiting for response")]
    ResponseTimeout,

    #[error("device rejected request for function {0}")]
    NegativeAck(u16),
}

/// Session lifecycle failures.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("sensor not initialized")]
    NotInitialized,

    #[error("sensor already closed")]
    AlreadyClosed,

    #[error("firmware protocol version {0} not supported")]
    VersionUnsupported(u32),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("no sensor matching {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("unknown property")]
    UnknownProperty,

    #[error("wrong data type for property")]
    WrongDataType,

    #[error("buffer too small")]
    BufferTooSmall,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl Error {
    /// Whether the error signals an intentional teardown rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Cancelled))
    }
}
