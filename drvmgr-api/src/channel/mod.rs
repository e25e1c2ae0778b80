//! Channel backends implementing `worker::ManagerChannel` /
//! `worker::DriverChannel`. The manager depends only on the trait
//! objects; which backend a driver runs on is a construction-time
//! choice (spec §6.4 `use_processes`), not something the core cares
//! about at runtime.

pub mod process;
pub mod stdio;
pub mod task;

/// The construction-time isolation choice for a newly started driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerStrategy {
    /// Cooperatively scheduled `tokio` task in the manager's own
    /// address space.
    Task,
    /// Isolated OS process, communicating over stdio.
    Process,
}
