//! Command Dispatcher (spec §4.1): the manager's outer loop. Owns all
//! core state on a single task; ties together the registries, the
//! Compatibility Resolver, the Update Reconciler, and the Status
//! Snapshotter.

use crate::driver_db::DriverDb;
use crate::host::HostChannel;
use crate::reconciler::{self, OutboundUpdates, DEFAULT_MAX_PIPE_LOOPS};
use crate::registry::{DriverRecord, DriverRegistry, HandleIndex, VariableRecord};
use crate::resolver;
use crate::snapshot::{LogRing, Snapshotter};
use drvmgr_api::channel::WorkerStrategy;
use drvmgr_api::message::{
    DriverSetup, DriverSetupBody, HostCommand, HostEvent, HostReply, SetupOutcome,
};
use drvmgr_api::worker::{ManagerChannel, WorkerCommand};
use drvmgr_api::{DriverName, Handle, VarId, VarSetup};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Bound on host frames drained per dispatcher cycle (spec §4.1 step 1).
pub const MAX_HOST_FRAMES_PER_CYCLE: usize = 10;

pub struct ManagerConfig {
    pub strategy: WorkerStrategy,
    pub status_file_path: Option<PathBuf>,
    pub status_interval: Duration,
    pub worker_exe: PathBuf,
    pub max_pipe_loops: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            strategy: WorkerStrategy::Task,
            status_file_path: None,
            status_interval: Duration::from_millis(1000),
            worker_exe: std::env::current_exe().unwrap_or_else(|_| PathBuf::from("drvmgrd")),
            max_pipe_loops: DEFAULT_MAX_PIPE_LOOPS,
        }
    }
}

pub struct Manager {
    host: Box<dyn HostChannel>,
    registry: DriverRegistry,
    handle_index: HandleIndex,
    driver_db: DriverDb,
    strategy: WorkerStrategy,
    max_pipe_loops: usize,
    snapshotter: Snapshotter,
    logs: LogRing,
    running: bool,
}

impl Manager {
    pub fn new(host: Box<dyn HostChannel>, config: ManagerConfig) -> Self {
        Manager {
            host,
            registry: DriverRegistry::new(),
            handle_index: HandleIndex::new(),
            driver_db: DriverDb::new(config.worker_exe),
            strategy: config.strategy,
            max_pipe_loops: config.max_pipe_loops,
            snapshotter: Snapshotter::new(config.status_file_path, config.status_interval),
            logs: LogRing::new(),
            running: true,
        }
    }

    /// Runs the dispatcher loop until `CLEAN` completes (spec §4.1).
    pub async fn run(&mut self) {
        while self.running {
            let mut did_work = false;

            did_work |= self.drain_host_frames().await;

            let mut outbound = OutboundUpdates::default();
            reconciler::reconcile(&mut self.registry, self.max_pipe_loops, &mut outbound);
            if !outbound.is_empty() {
                did_work = true;
                self.emit_outbound(outbound);
            }

            if let Some(stats) = self
                .snapshotter
                .tick(&self.registry, &self.handle_index, &mut self.logs)
            {
                did_work = true;
                if let Err(e) = self.host.emit(HostEvent::Stats(stats)) {
                    self.logs.error(format!("failed to emit STATS frame: {e}"));
                }
            }

            if !did_work {
                tokio::time::sleep(Duration::from_millis(1)).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
    }

    async fn drain_host_frames(&mut self) -> bool {
        let mut did_work = false;

        for _ in 0..MAX_HOST_FRAMES_PER_CYCLE {
            let command = match self.host.try_recv() {
                Ok(Some(cmd)) => cmd,
                Ok(None) => break,
                Err(e) => {
                    self.logs.error(format!("host channel read failed: {e}"));
                    break;
                }
            };

            did_work = true;
            self.dispatch(command).await;
        }

        did_work
    }

    async fn dispatch(&mut self, command: HostCommand) {
        match command {
            HostCommand::SetupDrivers(requests) => {
                let mut outcomes = IndexMap::new();
                let mut status_updates = OutboundUpdates::default();

                for (handle, setup) in requests {
                    let outcome = self.provision(handle.clone(), setup, &mut status_updates).await;
                    outcomes.insert(handle, outcome);
                }

                if !status_updates.is_empty() {
                    self.emit_outbound(status_updates);
                }

                if let Err(e) = self.host.reply(HostReply::SetupDrivers(outcomes)) {
                    self.logs.error(format!("failed to reply to SETUP_DRIVERS: {e}"));
                }
            }

            HostCommand::Updates(writes) => {
                self.apply_host_writes(writes);
            }

            HostCommand::Clean => {
                self.shutdown().await;
                if let Err(e) = self.host.reply(HostReply::Clean) {
                    self.logs.error(format!("failed to reply to CLEAN: {e}"));
                }
            }
        }
    }

    /// Driver Provisioning (spec §4.2).
    async fn provision(
        &mut self,
        handle: Handle,
        setup: DriverSetup,
        status_updates: &mut OutboundUpdates,
    ) -> SetupOutcome {
        let driver_name = if let Some(existing) =
            resolver::find_compatible(&mut self.registry, &setup.class_name, &setup.setup)
        {
            existing.add_handle(handle.clone());
            status_updates
                .status
                .insert(handle.clone(), existing.status);
            existing.name.clone()
        } else {
            match self.start_driver(&setup.class_name, &setup.setup, handle.clone()).await {
                Ok(name) => name,
                Err(e) => {
                    self.logs
                        .error(format!("failed to start driver '{}': {e}", setup.class_name));
                    return SetupOutcome::Failed;
                }
            }
        };

        self.register_variables(&driver_name, setup.setup.variables);

        SetupOutcome::Success
    }

    async fn start_driver(
        &mut self,
        class_name: &str,
        setup: &DriverSetupBody,
        handle: Handle,
    ) -> drvmgr_api::Result<DriverName> {
        let channel = self
            .driver_db
            .launch(class_name, self.strategy, setup.parameters.clone())
            .await?;

        let name = self.registry.next_name();
        let record = DriverRecord::new(
            name.clone(),
            class_name.to_owned(),
            setup.parameters.clone(),
            handle,
            channel,
        );
        self.registry.insert(record);

        Ok(name)
    }

    /// Variable Registration (spec §4.4).
    fn register_variables(
        &mut self,
        driver_name: &DriverName,
        variables: BTreeMap<VarId, VarSetup>,
    ) {
        let mut new_variables = BTreeMap::new();

        let Some(driver) = self.registry.get_mut(driver_name) else {
            return;
        };

        for (var_id, var_data) in variables {
            let Some(var_handle) = var_data.handle.clone() else {
                continue;
            };

            if let Some(existing) = driver.variables.get_mut(&var_id) {
                existing.add_handle(var_handle.clone());
            } else {
                driver
                    .variables
                    .insert(var_id.clone(), VariableRecord::new(var_handle.clone(), var_data.clone()));
                new_variables.insert(var_id.clone(), var_data.clone());
            }

            self.handle_index
                .insert(var_handle, (var_id, driver_name.clone()));
        }

        if !new_variables.is_empty() {
            if let Some(driver) = self.registry.get_mut(driver_name) {
                if let Err(e) = driver.channel.send(WorkerCommand::AddVariables(new_variables)) {
                    self.logs.error(format!(
                        "failed to notify driver '{driver_name}' of new variables: {e}"
                    ));
                }
            }
        }
    }

    /// Host Writes (spec §4.5).
    fn apply_host_writes(&mut self, writes: BTreeMap<Handle, drvmgr_api::Value>) {
        for (handle, value) in writes {
            let Some((var_id, driver_name)) = self.handle_index.get(&handle).cloned() else {
                self.logs
                    .error(format!("UPDATES referenced unknown handle '{handle}'"));
                continue;
            };

            let Some(driver) = self.registry.get_mut(&driver_name) else {
                continue;
            };

            if driver.status != drvmgr_api::DriverStatus::Running {
                continue;
            }

            let Some(variable) = driver.variables.get_mut(&var_id) else {
                continue;
            };

            if variable.value.as_ref() != Some(&value) {
                variable.value = Some(value.clone());
                variable.write_count += 1;
                driver.pending_updates.insert(var_id, value);
            }
        }

        for driver in self.registry.values_mut() {
            if driver.pending_updates.is_empty() {
                continue;
            }
            let batch = std::mem::take(&mut driver.pending_updates);
            if let Err(e) = driver.channel.send(WorkerCommand::Update(batch)) {
                self.logs
                    .error(format!("failed to send UPDATE to driver '{}': {e}", driver.name));
            }
        }
    }

    /// Shutdown (spec §4.7 "Shutdown (CLEAN)").
    async fn shutdown(&mut self) {
        let mut channels = Vec::new();

        let logs = &mut self.logs;
        self.registry.drain_in_order(|mut record| {
            if let Err(e) = record.channel.send(WorkerCommand::Exit) {
                logs.error(format!("failed to send EXIT to driver '{}': {e}", record.name));
            }
            channels.push(record.channel);
        });

        for channel in channels {
            if let Err(e) = channel.join().await {
                self.logs.error(format!("worker join failed during CLEAN: {e}"));
            }
        }

        self.handle_index = HandleIndex::new();
        self.running = false;
        self.logs.info("driver manager stopped after CLEAN");
    }

    fn emit_outbound(&mut self, updates: OutboundUpdates) {
        if !updates.status.is_empty() {
            for (handle, status) in &updates.status {
                self.logs.info(format!("{handle}: status -> {status}"));
            }
            if let Err(e) = self.host.emit(HostEvent::Status(updates.status)) {
                self.logs.error(format!("failed to emit STATUS frame: {e}"));
            }
        }
        if !updates.info.is_empty() {
            if let Err(e) = self.host.emit(HostEvent::Info(updates.info)) {
                self.logs.error(format!("failed to emit INFO frame: {e}"));
            }
        }
        if !updates.var_info.is_empty() {
            if let Err(e) = self.host.emit(HostEvent::VarInfo(updates.var_info)) {
                self.logs.error(format!("failed to emit VAR_INFO frame: {e}"));
            }
        }
        if !updates.value.is_empty() {
            if let Err(e) = self.host.emit(HostEvent::Updates(updates.value)) {
                self.logs.error(format!("failed to emit UPDATES frame: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::inprocess::{self, Outbound};
    use drvmgr_api::message::{DriverSetup, DriverSetupBody, VarSetup};
    use drvmgr_api::Value;

    fn udp_setup(ip: &str) -> DriverSetupBody {
        let mut parameters = BTreeMap::new();
        parameters.insert("ip".to_string(), Value::Str(ip.to_owned()));

        let mut variables = BTreeMap::new();
        variables.insert(
            VarId::from("x"),
            VarSetup {
                handle: Some(Handle::from("vh1")),
                parameters: BTreeMap::new(),
            },
        );

        DriverSetupBody { parameters, variables }
    }

    async fn drain_outbound(rx_out: &mut tokio::sync::mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(frame) = rx_out.try_recv() {
            out.push(frame);
        }
        out
    }

    /// Awaits frames until one matches `pred`, returning everything seen
    /// so far (the matching frame included).
    async fn recv_until(
        rx_out: &mut tokio::sync::mpsc::UnboundedReceiver<Outbound>,
        pred: impl Fn(&Outbound) -> bool,
    ) -> Vec<Outbound> {
        let mut seen = Vec::new();
        loop {
            let frame = rx_out.recv().await.expect("host channel closed early");
            let matched = pred(&frame);
            seen.push(frame);
            if matched {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn setup_drivers_round_trip_s1() {
        let (host_chan, mut handle) = inprocess::channel();
        let config = ManagerConfig {
            strategy: WorkerStrategy::Task,
            status_file_path: None,
            status_interval: Duration::from_millis(1000),
            worker_exe: PathBuf::from("drvmgrd"),
            max_pipe_loops: DEFAULT_MAX_PIPE_LOOPS,
        };
        let mut manager = Manager::new(Box::new(host_chan), config);

        let mut requests = IndexMap::new();
        requests.insert(
            Handle::from("h1"),
            DriverSetup {
                class_name: "udp_driver".to_owned(),
                setup: udp_setup("127.0.0.1"),
            },
        );

        handle
            .tx_cmd
            .send(HostCommand::SetupDrivers(requests))
            .unwrap();
        handle.tx_cmd.send(HostCommand::Clean).unwrap();

        manager.run().await;

        let frames = drain_outbound(&mut handle.rx_out).await;

        let setup_reply = frames.iter().find_map(|f| match f {
            Outbound::Reply(HostReply::SetupDrivers(outcomes)) => Some(outcomes.clone()),
            _ => None,
        });
        assert_eq!(
            setup_reply.unwrap().get(&Handle::from("h1")),
            Some(&SetupOutcome::Success)
        );

        assert!(frames
            .iter()
            .any(|f| matches!(f, Outbound::Reply(HostReply::Clean))));
    }

    #[tokio::test]
    async fn compatibility_dedup_s2() {
        let (host_chan, mut handle) = inprocess::channel();
        let config = ManagerConfig {
            strategy: WorkerStrategy::Task,
            status_file_path: None,
            status_interval: Duration::from_millis(1000),
            worker_exe: PathBuf::from("drvmgrd"),
            max_pipe_loops: DEFAULT_MAX_PIPE_LOOPS,
        };
        let mut manager = Manager::new(Box::new(host_chan), config);

        let setup = udp_setup("127.0.0.1");

        let mut first = IndexMap::new();
        first.insert(
            Handle::from("h1"),
            DriverSetup {
                class_name: "udp_driver".to_owned(),
                setup: setup.clone(),
            },
        );
        handle.tx_cmd.send(HostCommand::SetupDrivers(first)).unwrap();

        let mut second = IndexMap::new();
        second.insert(
            Handle::from("h2"),
            DriverSetup {
                class_name: "udp_driver".to_owned(),
                setup,
            },
        );
        handle.tx_cmd.send(HostCommand::SetupDrivers(second)).unwrap();
        handle.tx_cmd.send(HostCommand::Clean).unwrap();

        manager.run().await;

        // Both setups resolved successfully onto one driver.
        let frames = drain_outbound(&mut handle.rx_out).await;
        let replies: Vec<_> = frames
            .into_iter()
            .filter_map(|f| match f {
                Outbound::Reply(HostReply::SetupDrivers(outcomes)) => Some(outcomes),
                _ => None,
            })
            .collect();

        assert_eq!(replies.len(), 2);
        for outcomes in &replies {
            assert!(outcomes.values().all(|o| *o == SetupOutcome::Success));
        }
    }

    /// Worker value propagation with coalescing (S3), plus host write
    /// routing with change suppression (S4): an unchanged write never
    /// reaches the driver, so it never re-emits an UPDATES frame.
    #[tokio::test]
    async fn worker_updates_propagate_and_duplicates_are_suppressed_s3_s4() {
        let (host_chan, mut handle) = inprocess::channel();
        let config = ManagerConfig {
            strategy: WorkerStrategy::Task,
            status_file_path: None,
            status_interval: Duration::from_millis(1000),
            worker_exe: PathBuf::from("drvmgrd"),
            max_pipe_loops: DEFAULT_MAX_PIPE_LOOPS,
        };
        let mut manager = Manager::new(Box::new(host_chan), config);
        let runner = tokio::spawn(async move {
            manager.run().await;
        });

        let mut variables = BTreeMap::new();
        variables.insert(
            VarId::from("x"),
            VarSetup {
                handle: Some(Handle::from("vh1")),
                parameters: BTreeMap::new(),
            },
        );
        let mut requests = IndexMap::new();
        requests.insert(
            Handle::from("h1"),
            DriverSetup {
                class_name: "memory".to_owned(),
                setup: DriverSetupBody {
                    parameters: BTreeMap::new(),
                    variables,
                },
            },
        );
        handle
            .tx_cmd
            .send(HostCommand::SetupDrivers(requests))
            .unwrap();

        recv_until(&mut handle.rx_out, |f| {
            matches!(f, Outbound::Reply(HostReply::SetupDrivers(_)))
        })
        .await;

        // The memory driver reports RUNNING the instant it starts; wait
        // for the reconciler to pick that up and emit it.
        recv_until(&mut handle.rx_out, |f| {
            matches!(f, Outbound::Event(HostEvent::Status(s))
                if s.get(&Handle::from("vh1")) == Some(&drvmgr_api::DriverStatus::Running))
        })
        .await;

        let mut writes = BTreeMap::new();
        writes.insert(Handle::from("vh1"), Value::Int(7));
        handle
            .tx_cmd
            .send(HostCommand::Updates(writes.clone()))
            .unwrap();

        recv_until(&mut handle.rx_out, |f| {
            matches!(f, Outbound::Event(HostEvent::Updates(u))
                if u.get(&Handle::from("vh1")) == Some(&Value::Int(7)))
        })
        .await;

        // Same value again: suppressed in `apply_host_writes` before it
        // ever reaches the driver, so no second UPDATES frame follows.
        handle.tx_cmd.send(HostCommand::Updates(writes)).unwrap();
        handle.tx_cmd.send(HostCommand::Clean).unwrap();

        let frames = recv_until(&mut handle.rx_out, |f| {
            matches!(f, Outbound::Reply(HostReply::Clean))
        })
        .await;
        assert!(!frames
            .iter()
            .any(|f| matches!(f, Outbound::Event(HostEvent::Updates(_)))));

        runner.await.unwrap();
    }

    #[tokio::test]
    async fn clean_shutdown_leaves_registries_empty_s6() {
        let (host_chan, mut handle) = inprocess::channel();
        let config = ManagerConfig {
            strategy: WorkerStrategy::Task,
            status_file_path: None,
            status_interval: Duration::from_millis(1000),
            worker_exe: PathBuf::from("drvmgrd"),
            max_pipe_loops: DEFAULT_MAX_PIPE_LOOPS,
        };
        let mut manager = Manager::new(Box::new(host_chan), config);

        let mut requests = IndexMap::new();
        requests.insert(
            Handle::from("h1"),
            DriverSetup {
                class_name: "memory".to_owned(),
                setup: DriverSetupBody {
                    parameters: BTreeMap::new(),
                    variables: BTreeMap::new(),
                },
            },
        );
        handle.tx_cmd.send(HostCommand::SetupDrivers(requests)).unwrap();
        handle.tx_cmd.send(HostCommand::Clean).unwrap();

        manager.run().await;

        assert!(manager.registry.is_empty());
        assert!(manager.handle_index.is_empty());
        assert_eq!(manager.registry.len(), 0);
    }
}
