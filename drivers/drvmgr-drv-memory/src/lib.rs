//! An area in memory to set values -- no real hardware behind it.
//! There's no device to connect to, so it reports `Running` the
//! instant it starts, and every commanded write is echoed straight
//! back as an observed update. Handy for exercising the manager
//! without a real protocol peer.

use async_trait::async_trait;
use drvmgr_api::worker::{DriverChannel, Worker, WorkerCommand, WorkerEvent};
use drvmgr_api::{DriverStatus, Result, Value};
use std::collections::BTreeMap;

pub struct MemoryDriver;

#[async_trait]
impl Worker for MemoryDriver {
    const CLASS_NAME: &'static str = "memory";

    fn new(_parameters: BTreeMap<String, Value>) -> Result<Self> {
        Ok(MemoryDriver)
    }

    async fn run(self, mut channel: Box<dyn DriverChannel>) {
        if channel.send(WorkerEvent::Status(DriverStatus::Running)).await.is_err() {
            return;
        }

        while let Some(cmd) = channel.recv().await {
            match cmd {
                WorkerCommand::AddVariables(_) => {}
                WorkerCommand::Update(values) => {
                    if channel.send(WorkerEvent::Update(values)).await.is_err() {
                        break;
                    }
                }
                WorkerCommand::Exit => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drvmgr_api::channel::task;
    use drvmgr_api::worker::ManagerChannel;
    use drvmgr_api::VarId;

    #[tokio::test]
    async fn echoes_commanded_writes_back_as_updates() {
        let mut chan = task::spawn::<MemoryDriver>(BTreeMap::new()).unwrap();

        loop {
            if let Some(WorkerEvent::Status(DriverStatus::Running)) =
                chan.try_recv().unwrap()
            {
                break;
            }
            tokio::task::yield_now().await;
        }

        let mut values = BTreeMap::new();
        values.insert(VarId::from("x"), Value::Int(7));
        chan.send(WorkerCommand::Update(values.clone())).unwrap();

        let event = loop {
            if let Some(ev) = chan.try_recv().unwrap() {
                break ev;
            }
            tokio::task::yield_now().await;
        };

        assert_eq!(event, WorkerEvent::Update(values));

        chan.send(WorkerCommand::Exit).unwrap();
        chan.join().await.unwrap();
    }
}
