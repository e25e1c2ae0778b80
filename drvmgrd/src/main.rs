//! Driver Manager entry point. Normal startup loads configuration,
//! initializes logging, and runs the Command Dispatcher against an
//! in-process host channel exposed over stdio framing; the same binary
//! re-execs itself as a worker subprocess when `WorkerStrategy::Process`
//! is selected (spec §6.4, SPEC_FULL §4 implementation notes).

mod config;
mod driver_db;
mod host;
mod manager;
mod reconciler;
mod registry;
mod resolver;
mod snapshot;

use drvmgr_api::channel::stdio::{read_parameters, StdioDriverChannel};
use drvmgr_api::worker::Worker;
use manager::{Manager, ManagerConfig};
use tracing::{error, info, info_span};
use tracing_futures::Instrument;

const WORKER_SUBPROCESS_FLAG: &str = "--worker-subprocess";

#[tokio::main]
async fn main() {
    let mut args = std::env::args();
    let exe = args.next();

    if let Some(class_name) = args
        .next()
        .filter(|a| a == WORKER_SUBPROCESS_FLAG)
        .and_then(|_| args.next())
    {
        run_worker_subprocess(&class_name).await;
        return;
    }

    let cfg = match config::get().await {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(cfg.get_log_level())
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("unable to install global tracing subscriber");

    let strategy = if cfg.use_processes {
        drvmgr_api::channel::WorkerStrategy::Process
    } else {
        drvmgr_api::channel::WorkerStrategy::Task
    };

    let manager_config = ManagerConfig {
        strategy,
        status_file_path: cfg.status_file_path.clone(),
        status_interval: std::time::Duration::from_millis(cfg.status_interval_ms),
        worker_exe: exe
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| std::path::PathBuf::from("drvmgrd")),
        max_pipe_loops: reconciler::DEFAULT_MAX_PIPE_LOOPS,
    };

    // The host transport is external to the core (spec §1); a real
    // deployment would wire `host_chan` to whatever carries frames to
    // and from the host application. The in-process channel here is
    // the embeddable default used when the manager is driven as a
    // library from within a larger process.
    let (host_chan, _host_handle) = host::inprocess::channel();

    let mut manager = Manager::new(Box::new(host_chan), manager_config);

    info!("driver manager starting");
    manager
        .run()
        .instrument(info_span!("driver_manager"))
        .await;
    info!("driver manager exited");
}

/// The `--worker-subprocess <class>` re-exec path (spec §6.4
/// `use_processes = true`, `drvmgr_api::channel::process`). Reads the
/// JSON parameters header off stdin, then runs the worker's `run` loop
/// over a newline-delimited-JSON stdio channel.
async fn run_worker_subprocess(class_name: &str) {
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let parameters = match read_parameters(&mut stdin).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("worker subprocess: failed to read parameters: {e}");
            std::process::exit(1);
        }
    };

    let channel: Box<dyn drvmgr_api::worker::DriverChannel> =
        Box::new(StdioDriverChannel::new(stdin, tokio::io::stdout()));

    match class_name {
        drvmgr_drv_udp::UdpDriver::CLASS_NAME => match drvmgr_drv_udp::UdpDriver::new(parameters) {
            Ok(worker) => worker.run(channel).await,
            Err(e) => {
                error!("worker subprocess: failed to construct udp_driver: {e}");
                std::process::exit(1);
            }
        },
        drvmgr_drv_memory::MemoryDriver::CLASS_NAME => {
            match drvmgr_drv_memory::MemoryDriver::new(parameters) {
                Ok(worker) => worker.run(channel).await,
                Err(e) => {
                    error!("worker subprocess: failed to construct memory driver: {e}");
                    std::process::exit(1);
                }
            }
        }
        other => {
            eprintln!("worker subprocess: unknown driver class '{other}'");
            std::process::exit(1);
        }
    }
}
