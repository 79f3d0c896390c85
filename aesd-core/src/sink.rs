//! Backend-agnostic append/read/seek surface shared by every connection
//! worker and the periodic timestamp task.
//!
//! Two backends implement [`Sink`]: [`RingSink`], an in-memory
//! [`CommandRing`] guarded by a mutex, and [`FileSink`], an append-only
//! file reopened around each operation. Both serialize every mutation and
//! every length-sensitive read behind a single lock, per the "sink lock"
//! glossary entry.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{error, info};

use crate::error::SinkError;
use crate::ring::{CommandRing, WriteCommand};

/// Distinguishes the two backends so a caller (the connection worker) can
/// decide whether `AESDCHAR_IOCSEEKTO:` should be recognized as a control
/// packet at all. The file backend's original source never inspects the
/// packet prefix; it simply appends whatever text it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Ring,
    File,
}

/// Operations common to both backends.
pub trait Sink: Send + Sync {
    fn kind(&self) -> SinkKind;

    /// Appends one complete, newline-terminated packet. Evicts the oldest
    /// command first when the backend is a full ring; the evicted payload
    /// is logged and released only after the new command is committed.
    fn append(&self, packet: &[u8]) -> Result<(), SinkError>;

    fn length(&self) -> Result<u64, SinkError>;

    /// Returns up to `cap` bytes starting at linear offset `p`. For the
    /// ring backend this never crosses a command boundary in one call;
    /// the file backend has no command structure and simply reads a block.
    /// An empty vector means end of log.
    fn read_at(&self, p: u64, cap: usize) -> Result<Vec<u8>, SinkError>;

    /// Translates (command_index, command_offset) into a linear offset.
    /// Only the ring backend can answer this meaningfully.
    fn seek_to(&self, cmd_index: u32, cmd_offset: u32) -> Result<u64, SinkError>;
}

/// In-memory ring-backed sink: capacity `N`, FIFO eviction.
pub struct RingSink<const N: usize> {
    inner: Mutex<CommandRing<N>>,
}

impl<const N: usize> RingSink<N> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CommandRing::new()),
        }
    }
}

impl<const N: usize> Default for RingSink<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Sink for RingSink<N> {
    fn kind(&self) -> SinkKind {
        SinkKind::Ring
    }

    fn append(&self, packet: &[u8]) -> Result<(), SinkError> {
        // Copy into an owned buffer before taking the lock, so a failure
        // while staging the command (an allocation failure surfaced as a
        // Rust panic/abort, or -- for a hypothetical fallible allocator --
        // as an error) can never leave the ring in a partially-mutated
        // state: by construction we either have a complete `WriteCommand`
        // or we never touch the lock.
        let command = WriteCommand::new(packet.to_vec())?;

        let evicted = {
            let mut ring = self.inner.lock().expect("command ring mutex poisoned");
            ring.insert(command)
        };

        // The evicted payload is released only now, after the new entry
        // has already been committed to the ring.
        if let Some(old) = evicted {
            info!(
                "evicted oldest command ({} bytes) to make room for a new write",
                old.len()
            );
        }

        Ok(())
    }

    fn length(&self) -> Result<u64, SinkError> {
        Ok(self.inner.lock().expect("command ring mutex poisoned").total_bytes())
    }

    fn read_at(&self, p: u64, cap: usize) -> Result<Vec<u8>, SinkError> {
        let ring = self.inner.lock().expect("command ring mutex poisoned");
        let Some(located) = ring.find_by_linear_offset(p) else {
            return Ok(Vec::new());
        };
        let bytes = located.command.as_bytes();
        let available = bytes.len() - located.offset_in_command;
        let take = cap.min(available);
        Ok(bytes[located.offset_in_command..located.offset_in_command + take].to_vec())
    }

    fn seek_to(&self, cmd_index: u32, cmd_offset: u32) -> Result<u64, SinkError> {
        let ring = self.inner.lock().expect("command ring mutex poisoned");
        Ok(ring.translate(cmd_index, cmd_offset)?)
    }
}

/// Append-only-file-backed sink. Reopens the file around each operation
/// rather than holding a long-lived descriptor, matching the original
/// source's open/write-or-read/close-per-call discipline.
pub struct FileSink {
    path: PathBuf,
    // Guards read-modify-write ordering between append and the readback
    // that follows it; the file itself carries no in-process state.
    lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the backing file. Called once, by the acceptor, on clean
    /// shutdown; errors are logged, not propagated, since there is nothing
    /// further to do once a shutdown is already underway.
    pub fn unlink(&self) {
        let _guard = self.lock.lock().expect("file sink mutex poisoned");
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!("failed to remove backing file {}: {e}", self.path.display());
            }
        }
    }
}

impl Sink for FileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    fn append(&self, packet: &[u8]) -> Result<(), SinkError> {
        if packet.is_empty() {
            return Err(SinkError::Ring(crate::error::RingError::EmptyCommand));
        }
        let _guard = self.lock.lock().expect("file sink mutex poisoned");
        let mut f = OpenOptions::new()
            .append(true)
            .create(true)
            .read(true)
            .mode(0o644)
            .open(&self.path)?;
        f.write_all(packet)?;
        Ok(())
    }

    fn length(&self) -> Result<u64, SinkError> {
        let _guard = self.lock.lock().expect("file sink mutex poisoned");
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn read_at(&self, p: u64, cap: usize) -> Result<Vec<u8>, SinkError> {
        let _guard = self.lock.lock().expect("file sink mutex poisoned");
        let mut f = match OpenOptions::new().read(true).open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        f.seek(SeekFrom::Start(p))?;
        let mut buf = vec![0u8; cap];
        let n = read_up_to(&mut f, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn seek_to(&self, _cmd_index: u32, _cmd_offset: u32) -> Result<u64, SinkError> {
        // The file backend carries no command structure; its original
        // source never wires the ioctl-style seek at all in this mode.
        Err(SinkError::Ring(crate::error::RingError::IndexOutOfRange {
            index: _cmd_index,
            occupancy: 0,
        }))
    }
}

/// Reads until `buf` is full or EOF, retrying on interrupt -- `Read::read`
/// is permitted to return short reads for reasons other than EOF.
fn read_up_to(f: &mut std::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match f.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
