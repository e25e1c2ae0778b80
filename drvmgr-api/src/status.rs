use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of a driver, driven solely by the worker's own
/// `STATUS` messages (see `drvmgr_api::worker::WorkerEvent::Status`).
/// The manager never assigns a status to a driver on its own, except
/// implicitly by leaving a new driver at `Setup` until its worker
/// checks in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverStatus {
    /// From record creation until the worker emits its first `Status`.
    Setup,
    /// Normal operation; host writes are accepted.
    Running,
    /// Worker signaled failure; host writes are dropped. The worker is
    /// expected to self-recover and transition back to `Running`.
    Error,
    /// The worker has stopped. Terminal; the driver stays in the
    /// registry until `CLEAN` removes it.
    Exited,
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            DriverStatus::Setup => "SETUP",
            DriverStatus::Running => "RUNNING",
            DriverStatus::Error => "ERROR",
            DriverStatus::Exited => "EXITED",
        };
        write!(f, "{s}")
    }
}

/// The once-per-second aggregate statistics emitted as a `STATS` frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub driver_count: usize,
    pub variable_count: usize,
}
