//! `aesdsocket`: concurrent TCP front end for the bounded command-log sink.
//!
//! Brings subsystems up in dependency order -- logging, sink, shutdown
//! flag, periodic timestamp task (file mode only), listener, acceptor --
//! the hosted analogue of the teacher's staged `main_0` bring-up.

mod acceptor;
mod config;
mod control;
mod registry;
mod shutdown;
mod timestamp;
mod worker;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use aesd_core::{FileSink, RingSink, Sink};

use config::{Backend, Config};
use shutdown::ShutdownFlag;
use timestamp::TimestampTask;

fn main() -> ExitCode {
    env_logger::init();

    let cfg = Config::from_args(std::env::args());
    info!(
        "starting aesdsocket on port {} (backend: {:?}, daemon requested: {})",
        cfg.port, cfg.backend, cfg.daemon_requested
    );

    let shutdown = match ShutdownFlag::install() {
        Ok(flag) => flag,
        Err(e) => {
            error!("failed to install signal handlers: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Kept alongside the trait-object handle so clean shutdown can unlink
    // the backing file without downcasting `Arc<dyn Sink>`.
    let file_sink: Option<Arc<FileSink>> = match cfg.backend {
        Backend::Ring => None,
        Backend::File => Some(Arc::new(FileSink::new(&cfg.file_path))),
    };
    let sink: Arc<dyn Sink> = match &file_sink {
        Some(fs) => Arc::clone(fs) as Arc<dyn Sink>,
        None => Arc::new(RingSink::<10>::new()),
    };

    let listener = match acceptor::bind_listener(&cfg) {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind listener on port {}: {e}", cfg.port);
            return ExitCode::FAILURE;
        }
    };

    let timestamp_task = match cfg.backend {
        Backend::File => Some(TimestampTask::spawn(
            Arc::clone(&sink),
            Duration::from_secs(cfg.timestamp_interval_secs),
            shutdown.clone(),
        )),
        Backend::Ring => None,
    };

    acceptor::run(&listener, Arc::clone(&sink), shutdown, cfg.block_size);
    drop(listener);

    if let Some(task) = timestamp_task {
        task.join();
    }

    if let Some(fs) = file_sink {
        fs.unlink();
    }

    info!("aesdsocket shut down cleanly");
    ExitCode::SUCCESS
}
