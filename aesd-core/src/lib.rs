//! Core, hosted-testable logic of the aesd socket server: the bounded
//! command ring, the backend-agnostic sink built on top of it, and the
//! stream-to-packet assembler. None of this module touches a socket --
//! networking, threading and signals live in `aesd-server`, the same way
//! the teacher project splits a host-testable logic crate from the
//! bare-metal image that drives it.

pub mod assembler;
pub mod error;
pub mod ring;
pub mod sink;

pub use assembler::Assembler;
pub use error::{RingError, SinkError};
pub use ring::{CommandRing, WriteCommand};
pub use sink::{FileSink, RingSink, Sink, SinkKind};

/// Ring capacity, N in the spec: at most this many commands are retained
/// before the oldest is evicted.
pub const RING_CAPACITY: usize = 10;

/// Initial/growth increment for the per-connection assembler buffer.
pub const BLOCK_SIZE: usize = 64;

/// Default TCP listen port.
pub const DEFAULT_PORT: u16 = 9000;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: i32 = 100;

/// Default periodic timestamp interval, in seconds.
pub const TIMESTAMP_INTERVAL_SECS: u64 = 10;

/// Default backing file path for the file-backed sink.
pub const DEFAULT_FILE_PATH: &str = "/var/tmp/aesdsocketdata";

/// Exact byte prefix identifying a seek-to control packet.
pub const SEEKTO_PREFIX: &[u8] = b"AESDCHAR_IOCSEEKTO:";
