//! Resolved, process-wide configuration.
//!
//! Everything the rest of the crate needs is read off a single `Config`
//! built once at startup, instead of the scattered `#define`s and a couple
//! of process-wide globals the original source used. Argument parsing
//! stays intentionally thin here (a single `-d` flag) -- full CLI parsing
//! is external-collaborator territory per the spec.

use std::path::PathBuf;

use aesd_core::{
    BLOCK_SIZE, DEFAULT_BACKLOG, DEFAULT_FILE_PATH, DEFAULT_PORT, RING_CAPACITY, TIMESTAMP_INTERVAL_SECS,
};

/// Which backend the sink is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-memory bounded ring, `ring_capacity` commands.
    Ring,
    /// Append-only file at `file_path`.
    File,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backlog: i32,
    pub backend: Backend,
    pub ring_capacity: usize,
    /// Per-connection assembler initial size / growth increment.
    pub block_size: usize,
    pub file_path: PathBuf,
    pub timestamp_interval_secs: u64,
    /// `-d` was passed on the command line. This core never daemonizes;
    /// the flag is recorded for logging only.
    pub daemon_requested: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            backend: Backend::File,
            ring_capacity: RING_CAPACITY,
            block_size: BLOCK_SIZE,
            file_path: PathBuf::from(DEFAULT_FILE_PATH),
            timestamp_interval_secs: TIMESTAMP_INTERVAL_SECS,
            daemon_requested: false,
        }
    }
}

impl Config {
    /// Resolves a `Config` from process arguments. Recognizes only `-d`;
    /// anything else is ignored, matching the original source's
    /// `argc == 2 && !strcmp("-d", argv[1])` check.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut cfg = Self::default();
        for arg in args.into_iter().skip(1) {
            if arg == "-d" {
                cfg.daemon_requested = true;
            }
        }
        cfg
    }
}
