//! Per-connection protocol: receive a packet, recognize-or-append it,
//! stream the sink's full contents back, close.
//!
//! Mirrors `processConnection` in the original source, including its
//! cleanup-on-any-exit discipline -- there, a pair of `goto` labels; here,
//! a `scopeguard` that always shuts the socket down and closes it, however
//! the function returns.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, Shutdown, TcpStream};
use std::sync::Arc;

use log::{debug, error, info, warn};

use aesd_core::{Assembler, Sink, SinkKind};

use crate::control;

/// Drives one client's connection to completion. Never panics on I/O
/// error or malformed input; every failure path logs and returns.
pub fn handle_connection(mut stream: TcpStream, remote_addr: Ipv4Addr, sink: Arc<dyn Sink>, block_size: usize) {
    // Ensures the socket is half-closed and dropped on every exit path,
    // the hosted equivalent of the original's `cleanupFail`/`cleanupFailInLock`
    // labels.
    let _close_guard = scopeguard::guard((), |_| {
        if let Err(e) = stream.shutdown(Shutdown::Write) {
            // Already closed/reset connections are expected here.
            debug!("shutdown(Write) on connection from {remote_addr}: {e}");
        }
    });

    let Some(packet) = receive_one_packet(&mut stream, remote_addr, block_size) else {
        return;
    };

    let read_pos: Option<u64> = if sink.kind() == SinkKind::Ring && control::is_control_packet(&packet) {
        match control::parse_seekto(&packet) {
            Some(seek) => match sink.seek_to(seek.cmd_index, seek.cmd_offset) {
                Ok(linear) => Some(linear),
                Err(e) => {
                    error!("seek-to {}:{} out of range: {e}", seek.cmd_index, seek.cmd_offset);
                    None
                }
            },
            None => {
                error!(
                    "seek-to command format invalid: {:?}",
                    String::from_utf8_lossy(&packet)
                );
                return;
            }
        }
    } else {
        if let Err(e) = sink.append(&packet) {
            error!("append failed for connection from {remote_addr}: {e}");
            return;
        }
        Some(0)
    };

    let Some(read_pos) = read_pos else {
        // Out-of-range seek-to: log only, send nothing, fall through to
        // the guard-driven shutdown/close.
        return;
    };

    stream_log_back(&mut stream, &sink, read_pos, remote_addr, block_size);

    info!("closed connection from {remote_addr}");
}

/// Receives chunks into an [`Assembler`] until exactly one packet is
/// yielded. Returns `None` (already logged) on a connection error or a
/// mid-packet EOF.
fn receive_one_packet(stream: &mut TcpStream, remote_addr: Ipv4Addr, block_size: usize) -> Option<Vec<u8>> {
    let mut assembler = Assembler::with_block_size(block_size);
    let mut chunk = vec![0u8; block_size];

    loop {
        if assembler.should_grow() {
            assembler.grow();
        }

        let n = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::Interrupted => {
                continue
            }
            Err(e) => {
                error!("recv from {remote_addr} failed: {e}");
                return None;
            }
        };

        if n == 0 {
            if assembler.has_partial_packet() {
                error!("connection from {remote_addr} closed mid-packet, dropping partial data");
            }
            return None;
        }

        if let Some(packet) = assembler.feed(&chunk[..n]) {
            return Some(packet);
        }
    }
}

/// Streams the sink's contents from `read_pos` to end of log, one
/// `read_at` call (one command, for the ring backend) at a time, retrying
/// partial sends until each chunk is fully delivered.
fn stream_log_back(
    stream: &mut TcpStream,
    sink: &Arc<dyn Sink>,
    mut read_pos: u64,
    remote_addr: Ipv4Addr,
    block_size: usize,
) {
    loop {
        let chunk = match sink.read_at(read_pos, block_size) {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("read_at failed while responding to {remote_addr}: {e}");
                return;
            }
        };
        if chunk.is_empty() {
            return;
        }
        if let Err(e) = send_all(stream, &chunk) {
            error!("send to {remote_addr} failed: {e}");
            return;
        }
        read_pos += chunk.len() as u64;
    }
}

/// Sends `buf` in full, retrying on short writes and on
/// `WouldBlock`/`Interrupted`.
fn send_all(stream: &mut TcpStream, buf: &[u8]) -> std::io::Result<()> {
    let mut sent = 0;
    while sent < buf.len() {
        match stream.write(&buf[sent..]) {
            Ok(0) => {
                warn!("send returned 0 bytes with data remaining");
                return Err(std::io::Error::new(std::io::ErrorKind::WriteZero, "short write"));
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::Interrupted => {
                continue
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
