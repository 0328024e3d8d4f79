//! Error of ringkv.

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in ringkv.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("ring state lock poisoned")]
    StateLock,

    #[error("peer {0} unreachable")]
    Unreachable(String),

    #[error("remote call timed out")]
    RpcTimeout,

    #[error("remote raised: {0}")]
    Remote(String),

    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),

    #[error("join via seed failed: {0}")]
    JoinFailed(String),

    #[error("malformed peer address {0:?}")]
    BadPeerAddress(String),

    #[error("rpc frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    #[error("IOError")]
    Io(#[from] std::io::Error),

    #[error("binary codec failure")]
    Codec(#[source] bincode::Error),

    #[error("failed to open config file: {0}")]
    OpenConfig(String),

    #[error("failed to write config file: {0}")]
    WriteConfig(String),

    #[error("malformed config: {0}")]
    ParseConfig(String),
}
