//! Converts SIGINT/SIGTERM into a single monotonic "stop" flag.
//!
//! The flag is only ever written `true`, from signal context, and only
//! ever read elsewhere -- there is no reset. `signal_hook::flag::register`
//! does exactly this store-and-nothing-else, so the handler itself never
//! runs non-reentrant code, matching the original `onSignal` which only
//! assigns a `bool`.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};

/// Shared, process-wide shutdown flag.
#[derive(Clone)]
pub struct ShutdownFlag {
    stop: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Registers SIGINT and SIGTERM handlers that set the flag. Fatal if
    /// either registration fails (process-fatal per the error taxonomy).
    pub fn install() -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;
        Ok(Self { stop })
    }

    pub fn requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[cfg(test)]
    pub fn trigger(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear_and_latches_once_triggered() {
        let flag = ShutdownFlag::for_test();
        assert!(!flag.requested());
        flag.trigger();
        assert!(flag.requested());
    }
}
