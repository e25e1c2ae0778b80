//! Maps a `class_name` string to the worker implementation that backs
//! it, and launches that worker under the configured `WorkerStrategy`
//! (spec §4.2 step 3, §6.4).

use drvmgr_api::channel::{process, task, WorkerStrategy};
use drvmgr_api::worker::{ManagerChannel, Worker};
use drvmgr_api::{Error, Result, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The set of driver classes this manager knows how to start, and how
/// to start them under each `WorkerStrategy`.
pub struct DriverDb {
    /// Path to the manager's own executable, used to re-exec as a
    /// worker subprocess when `WorkerStrategy::Process` is selected.
    worker_exe: PathBuf,
}

impl DriverDb {
    pub fn new(worker_exe: PathBuf) -> Self {
        DriverDb { worker_exe }
    }

    /// Starts a driver of `class_name` under `strategy`, returning the
    /// manager's end of its channel. Unregistered classes are a
    /// provisioning failure, not a panic (spec §4.2 step 3, §7 "Worker
    /// launch failure").
    pub async fn launch(
        &self,
        class_name: &str,
        strategy: WorkerStrategy,
        parameters: BTreeMap<String, Value>,
    ) -> Result<Box<dyn ManagerChannel>> {
        match strategy {
            WorkerStrategy::Task => self.launch_task(class_name, parameters),
            WorkerStrategy::Process => {
                process::spawn(&self.worker_exe, class_name, parameters).await
            }
        }
    }

    fn launch_task(
        &self,
        class_name: &str,
        parameters: BTreeMap<String, Value>,
    ) -> Result<Box<dyn ManagerChannel>> {
        match class_name {
            drvmgr_drv_udp::UdpDriver::CLASS_NAME => task::spawn::<drvmgr_drv_udp::UdpDriver>(parameters),
            drvmgr_drv_memory::MemoryDriver::CLASS_NAME => {
                task::spawn::<drvmgr_drv_memory::MemoryDriver>(parameters)
            }
            other => Err(Error::UnknownDriverClass(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_class_fails_without_panicking() {
        let db = DriverDb::new(PathBuf::from("drvmgrd"));

        let result = db
            .launch("not_a_real_class", WorkerStrategy::Task, BTreeMap::new())
            .await;

        assert!(matches!(result, Err(Error::UnknownDriverClass(_))));
    }

    #[tokio::test]
    async fn known_task_classes_launch() {
        let db = DriverDb::new(PathBuf::from("drvmgrd"));

        let result = db
            .launch("memory", WorkerStrategy::Task, BTreeMap::new())
            .await;

        assert!(result.is_ok());
    }
}
