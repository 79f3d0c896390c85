//! Periodic timestamp writer (file-backed mode only).
//!
//! Fires once immediately (to stamp the start of the file) and then every
//! `interval` seconds, appending `timestamp:YYYY-MM-DD HH:MM:SS\n` under
//! the sink lock. Runs on its own thread rather than the original's
//! `timer_create`/`SIGEV_THREAD` pairing, since a hosted binary has no
//! use for a POSIX interval timer when a plain sleeping thread does the
//! same job.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Local;
use log::error;

use aesd_core::Sink;

use crate::shutdown::ShutdownFlag;

/// Handle to the background timestamp task; joining it is the acceptor's
/// responsibility as part of teardown.
pub struct TimestampTask {
    handle: JoinHandle<()>,
}

impl TimestampTask {
    pub fn spawn(sink: Arc<dyn Sink>, interval: Duration, shutdown: ShutdownFlag) -> Self {
        let handle = thread::spawn(move || run(sink, interval, shutdown));
        Self { handle }
    }

    pub fn join(self) {
        let _ = self.handle.join();
    }
}

fn run(sink: Arc<dyn Sink>, interval: Duration, shutdown: ShutdownFlag) {
    // First fire happens immediately, to stamp start-of-file; subsequent
    // fires wait a full interval, checked in short slices so shutdown is
    // noticed promptly rather than only at the next interval boundary.
    loop {
        if shutdown.requested() {
            return;
        }
        if let Err(e) = fire(&sink) {
            error!("periodic timestamp write failed: {e}");
        }
        if sleep_unless_shutdown(interval, &shutdown) {
            return;
        }
    }
}

/// Sleeps for `interval` in short slices, returning early (`true`) the
/// moment a shutdown is observed.
fn sleep_unless_shutdown(interval: Duration, shutdown: &ShutdownFlag) -> bool {
    const POLL: Duration = Duration::from_millis(100);
    let mut remaining = interval;
    while remaining > Duration::ZERO {
        if shutdown.requested() {
            return true;
        }
        let slice = remaining.min(POLL);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    shutdown.requested()
}

fn fire(sink: &Arc<dyn Sink>) -> Result<(), aesd_core::SinkError> {
    let formatted = render_timestamp();
    sink.append(formatted.as_bytes())
}

/// Renders `timestamp:YYYY-MM-DD HH:MM:SS\n` in the process's local
/// timezone, 24-hour clock, zero-padded fields.
fn render_timestamp() -> String {
    Local::now().format("timestamp:%Y-%m-%d %H:%M:%S\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_has_expected_shape() {
        let rendered = render_timestamp();
        assert!(rendered.starts_with("timestamp:"));
        assert!(rendered.ends_with('\n'));
        assert_eq!(rendered.len(), "timestamp:YYYY-MM-DD HH:MM:SS\n".len());
    }
}
