//! In-process channel backend: the worker runs as a cooperatively
//! scheduled `tokio` task in the manager's own address space. This is
//! the `WorkerStrategy::Task` half of the construction-time isolation
//! choice (spec §6.4 `use_processes = false`).

use crate::worker::{DriverChannel, ManagerChannel, Worker, WorkerCommand, WorkerEvent};
use crate::{Error, Result, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct TaskManagerChannel {
    tx: mpsc::UnboundedSender<WorkerCommand>,
    rx: mpsc::UnboundedReceiver<WorkerEvent>,
    handle: Option<JoinHandle<()>>,
}

#[async_trait]
impl ManagerChannel for TaskManagerChannel {
    fn send(&mut self, cmd: WorkerCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .map_err(|_| Error::MissingPeer("worker task".into()))
    }

    fn try_recv(&mut self) -> Result<Option<WorkerEvent>> {
        match self.rx.try_recv() {
            Ok(ev) => Ok(Some(ev)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(Error::MissingPeer("worker task".into()))
            }
        }
    }

    async fn join(mut self: Box<Self>) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

struct TaskDriverChannel {
    tx: mpsc::UnboundedSender<WorkerEvent>,
    rx: mpsc::UnboundedReceiver<WorkerCommand>,
}

#[async_trait]
impl DriverChannel for TaskDriverChannel {
    async fn recv(&mut self) -> Option<WorkerCommand> {
        self.rx.recv().await
    }

    async fn send(&mut self, event: WorkerEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| Error::MissingPeer("driver manager".into()))
    }
}

/// Spawns `W` as a `tokio` task and returns the manager's end of the
/// channel to it.
pub fn spawn<W: Worker>(
    parameters: BTreeMap<String, Value>,
) -> Result<Box<dyn ManagerChannel>> {
    let worker = W::new(parameters)?;

    let (tx_cmd, rx_cmd) = mpsc::unbounded_channel();
    let (tx_event, rx_event) = mpsc::unbounded_channel();

    let driver_side = TaskDriverChannel {
        tx: tx_event,
        rx: rx_cmd,
    };

    let handle = tokio::spawn(async move {
        worker.run(Box::new(driver_side)).await;
    });

    Ok(Box::new(TaskManagerChannel {
        tx: tx_cmd,
        rx: rx_event,
        handle: Some(handle),
    }))
}
