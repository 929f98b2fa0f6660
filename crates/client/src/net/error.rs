use std::io;
use std::time::Duration;

use rift::DisconnectReason;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("cannot resolve {0}")]
    Resolve(String),
    #[error("no answer from server within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("server refused connection: {}", .0.as_str())]
    Rejected(DisconnectReason),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
