//! The manager <-> worker wire protocol (spec §6.2) and the abstract
//! channel/worker contract a protocol implementation plugs into.

use crate::{DriverStatus, Result, VarId, Value, VarSetup};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Manager -> worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorkerCommand {
    AddVariables(BTreeMap<VarId, VarSetup>),
    Update(BTreeMap<VarId, Value>),
    Exit,
}

/// Worker -> manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorkerEvent {
    Status(DriverStatus),
    /// Free-form info line. By convention, a line containing the
    /// substring "Latency" is treated as latency-only and never
    /// reaches the host.
    Info(String),
    VarInfo(String, VarId),
    Update(BTreeMap<VarId, Value>),
}

/// The manager's endpoint of the channel to one driver's worker. Reads
/// are always non-blocking: `try_recv` returns `Ok(None)` rather than
/// waiting when nothing is queued, so the dispatcher's drain loop never
/// stalls on a quiet driver.
#[async_trait]
pub trait ManagerChannel: Send {
    fn send(&mut self, cmd: WorkerCommand) -> Result<()>;

    fn try_recv(&mut self) -> Result<Option<WorkerEvent>>;

    /// Waits for the worker task/process to finish. Used only during
    /// `CLEAN`, where blocking is acceptable.
    async fn join(self: Box<Self>) -> Result<()>;
}

/// The worker's endpoint of the same channel, used by a driver
/// implementation's `run` loop.
#[async_trait]
pub trait DriverChannel: Send {
    async fn recv(&mut self) -> Option<WorkerCommand>;

    async fn send(&mut self, event: WorkerEvent) -> Result<()>;
}

/// Implemented once per protocol (S7, Modbus, a UDP peer, ...). The
/// manager only ever calls `run`; everything else about the protocol
/// is private to the implementation.
#[async_trait]
pub trait Worker: Send + 'static {
    /// The class name a `SETUP_DRIVERS` request uses to select this
    /// worker (spec §4.2 / §3 `class_name`).
    const CLASS_NAME: &'static str;

    /// Builds a fresh instance from the setup parameters. Parameters
    /// are opaque to the core; it's up to the implementation to
    /// validate them.
    fn new(parameters: BTreeMap<String, Value>) -> Result<Self>
    where
        Self: Sized;

    /// Runs the worker until `WorkerCommand::Exit` is received or the
    /// channel's peer (the manager) goes away. Implementations should
    /// emit a `Status(Running)` once connected and set up, and
    /// `Status(Error)` / recovery transitions as their device
    /// connection allows.
    async fn run(self, channel: Box<dyn DriverChannel>);
}
