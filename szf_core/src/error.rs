use std::io;

/// Errors produced by the seekable compression core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The codec engine rejected its input or a parameter.
    #[error("engine: {0}")]
    Engine(String),

    /// Seek-table bytes violate the binary layout.
    #[error("format: {0}")]
    Format(String),

    /// API misuse or a broken internal invariant.
    #[error("protocol: {0}")]
    Protocol(String),

    /// Input ended before the end-of-stream marker was reached.
    #[error("compressed stream is truncated")]
    Truncated,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}
