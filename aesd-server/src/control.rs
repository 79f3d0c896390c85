//! Recognition and parsing of the `AESDCHAR_IOCSEEKTO:` control packet.
//!
//! Kept separate from the connection worker's I/O loop so the prefix match
//! and the `"%u,%u"` parse can be tested without a socket.

use aesd_core::SEEKTO_PREFIX;

/// A parsed seek-to request: (command_index, command_offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekTo {
    pub cmd_index: u32,
    pub cmd_offset: u32,
}

/// Whether `packet` begins with the exact, fully-present control prefix.
/// A packet shorter than the prefix can never match.
pub fn is_control_packet(packet: &[u8]) -> bool {
    packet.len() >= SEEKTO_PREFIX.len() && &packet[..SEEKTO_PREFIX.len()] == SEEKTO_PREFIX
}

/// Parses the `"<u32>,<u32>\n"` remainder of a recognized control packet.
/// Returns `None` on any format deviation (missing comma, non-digits,
/// missing trailing newline, extra trailing garbage).
pub fn parse_seekto(packet: &[u8]) -> Option<SeekTo> {
    if !is_control_packet(packet) {
        return None;
    }
    let rest = &packet[SEEKTO_PREFIX.len()..];
    let rest = std::str::from_utf8(rest).ok()?;
    let rest = rest.strip_suffix('\n')?;
    let (idx_str, off_str) = rest.split_once(',')?;
    let cmd_index: u32 = idx_str.parse().ok()?;
    let cmd_offset: u32 = off_str.parse().ok()?;
    Some(SeekTo { cmd_index, cmd_offset })
}
