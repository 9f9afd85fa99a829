//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::packet::PacketError;

/// A configuration value that failed validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must lie in [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
    #[error("window size must be at least 1")]
    ZeroWindow,
    #[error("max payload must be in 1..={max}, got {got}")]
    MaxPayload { got: usize, max: usize },
    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),
}

/// Errors that end a transfer session.
///
/// Per-packet anomalies (loss, corruption, reordering) never surface here;
/// the engines recover from them internally.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("transport failure: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid packet: {0}")]
    Packet(#[from] PacketError),
    #[error("source needs {0} packets, more than a sequence number can count")]
    SourceTooLarge(usize),
    #[error("file name {0:?} is not a plain relative path")]
    InvalidFileName(String),
    #[error("cannot open {path}: {source}")]
    File { path: PathBuf, source: io::Error },
    #[error("peer unresponsive after {0} retries")]
    PeerUnresponsive(u32),
}

/// `true` for receive errors a datagram socket can report after the peer
/// vanished (ICMP unreachable and friends); these count as loss.
pub fn is_transient_io_error(e: &io::Error) -> bool {
    use io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}
