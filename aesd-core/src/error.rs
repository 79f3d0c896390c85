//! Typed errors for the command ring and sink.

use std::io;

/// Errors raised while mutating or addressing the [`crate::ring::CommandRing`].
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    #[error("command index {index} is out of range (occupancy {occupancy})")]
    IndexOutOfRange { index: u32, occupancy: usize },

    #[error("command offset {offset} is out of range (command length {length})")]
    OffsetOutOfRange { offset: u32, length: usize },

    #[error("refusing to insert an empty command")]
    EmptyCommand,
}

/// Errors raised by a [`crate::sink::Sink`] operation.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Ring(#[from] RingError),

    #[error("backing file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("out of memory while staging a new command")]
    OutOfMemory,
}
