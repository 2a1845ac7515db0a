//! Byte link to the command peer.
//!
//! The bridge talks to exactly one peer over exactly one link. The link is
//! owned by the [`BridgeAgent`](crate::agent::BridgeAgent) and lent out by
//! `&mut` to the line reader and the reactive loop; it is never duplicated.

mod mock;
mod serial;

pub use mock::MockLink;
pub use serial::SerialLink;

use serde::{Deserialize, Serialize};

/// How [`Link::read_byte`] waits for data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    /// Wait up to the configured character timeout for every byte.
    Blocking,
    /// Return almost immediately when nothing is buffered. Used while the
    /// reactive loop owns the cycle.
    Polling,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("link closed by peer")]
    Closed,
}

pub trait Link {
    /// Read a single byte.
    ///
    /// `Err(nb::Error::WouldBlock)` means no byte arrived within the budget
    /// of the current [`ReadMode`]. Any other error is a link failure.
    fn read_byte(&mut self) -> nb::Result<u8, LinkError>;

    /// Number of bytes that can be read right now without waiting.
    fn bytes_available(&mut self) -> Result<usize, LinkError>;

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError>;

    /// Drop every byte received but not yet read.
    fn discard_input(&mut self) -> Result<(), LinkError>;

    fn set_read_mode(&mut self, mode: ReadMode) -> Result<(), LinkError>;

    fn read_mode(&self) -> ReadMode;
}
