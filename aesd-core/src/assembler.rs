//! Stream-to-packet splitter.
//!
//! A restartable state machine: feed it arbitrary byte chunks as they
//! arrive off a socket, and it yields exactly one packet every time a
//! newline completes one, carrying any trailing bytes over to the next
//! chunk. Deliberately has no knowledge of sockets so it can be driven and
//! tested without I/O.

const BLOCK_SIZE: usize = 64;

/// Per-connection accumulation buffer.
pub struct Assembler {
    buf: Vec<u8>,
    block_size: usize,
}

impl Assembler {
    pub fn new() -> Self {
        Self::with_block_size(BLOCK_SIZE)
    }

    pub fn with_block_size(block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            buf: Vec::with_capacity(block_size),
            block_size,
        }
    }

    /// Appends `chunk` to the buffer and, if a newline is now present,
    /// removes and returns the packet up to and including it. Bytes past
    /// the newline stay buffered for the next call.
    ///
    /// Returns `None` when more data is needed; the caller should grow its
    /// read request if `self.buf` has no free trailing capacity left
    /// (see [`Self::should_grow`]), though `feed` itself never refuses to
    /// grow the underlying `Vec`.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let newline_at = self.buf.iter().position(|&b| b == b'\n')?;
        let packet = self.buf.drain(..=newline_at).collect();
        Some(packet)
    }

    /// Whether the buffer currently has no free trailing capacity and
    /// should be grown by another block before the next receive.
    pub fn should_grow(&self) -> bool {
        self.buf.len() >= self.buf.capacity()
    }

    pub fn grow(&mut self) {
        self.buf.reserve(self.block_size);
    }

    /// True if bytes remain buffered with no terminating newline -- the
    /// mid-packet EOF case the worker must discard and log.
    pub fn has_partial_packet(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_with_newline_yields_one_packet() {
        let mut a = Assembler::new();
        let packet = a.feed(b"hello\n").unwrap();
        assert_eq!(packet, b"hello\n");
        assert!(!a.has_partial_packet());
    }

    #[test]
    fn split_across_chunks_accumulates() {
        let mut a = Assembler::new();
        assert!(a.feed(b"hel").is_none());
        assert!(a.feed(b"lo").is_none());
        let packet = a.feed(b"\n").unwrap();
        assert_eq!(packet, b"hello\n");
    }

    #[test]
    fn trailing_bytes_after_newline_are_preserved() {
        let mut a = Assembler::new();
        let first = a.feed(b"one\ntwo").unwrap();
        assert_eq!(first, b"one\n");
        assert!(a.has_partial_packet());
        let second = a.feed(b"\n").unwrap();
        assert_eq!(second, b"two\n");
        assert!(!a.has_partial_packet());
    }

    #[test]
    fn grow_policy_triggers_when_buffer_is_full_and_no_newline() {
        let mut a = Assembler::with_block_size(4);
        assert!(a.feed(b"abcd").is_none());
        assert!(a.should_grow());
        a.grow();
        assert!(!a.should_grow());
    }
}
