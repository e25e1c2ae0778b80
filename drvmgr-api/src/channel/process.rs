//! Subprocess channel backend: the worker runs in an isolated OS
//! process, re-executing the manager's own binary with a hidden
//! subcommand (there's no `fork()` in Rust, so re-exec is the
//! idiomatic stand-in for the source's `multiprocessing.Process`).
//! This is the `WorkerStrategy::Process` half of spec §6.4's
//! `use_processes = true`.
//!
//! Messages are framed as newline-delimited JSON over the child's
//! stdio. A background task owns the actual async I/O and exposes it
//! through the same non-blocking-recv shape as the in-process backend.

use crate::worker::{ManagerChannel, WorkerCommand, WorkerEvent};
use crate::{Error, Result, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

pub struct ProcessManagerChannel {
    tx: mpsc::UnboundedSender<WorkerCommand>,
    rx: mpsc::UnboundedReceiver<WorkerEvent>,
    pump: Option<JoinHandle<()>>,
}

#[async_trait]
impl ManagerChannel for ProcessManagerChannel {
    fn send(&mut self, cmd: WorkerCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .map_err(|_| Error::MissingPeer("worker process".into()))
    }

    fn try_recv(&mut self) -> Result<Option<WorkerEvent>> {
        match self.rx.try_recv() {
            Ok(ev) => Ok(Some(ev)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(Error::MissingPeer("worker process".into()))
            }
        }
    }

    async fn join(mut self: Box<Self>) -> Result<()> {
        drop(self.tx);
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
        Ok(())
    }
}

async fn pump(
    mut child: Child,
    mut rx_cmd: mpsc::UnboundedReceiver<WorkerCommand>,
    tx_event: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut stdin = child.stdin.take().expect("piped stdin");
    let stdout = child.stdout.take().expect("piped stdout");
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            cmd = rx_cmd.recv() => match cmd {
                Some(cmd) => {
                    if let Ok(mut line) = serde_json::to_string(&cmd) {
                        line.push('\n');
                        if stdin.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                }
                None => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => match serde_json::from_str::<WorkerEvent>(&line) {
                    Ok(event) => {
                        if tx_event.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("{}: {e}", Error::UnknownWorkerMessage(line));
                    }
                },
                Ok(None) => break,
                Err(_) => break,
            },
        }
    }

    let _ = child.wait().await;
}

/// Spawns `worker_exe --worker-subprocess <class_name>` and returns the
/// manager's end of the channel to it. `parameters` is sent as the
/// first line on the child's stdin, JSON-encoded.
pub async fn spawn(
    worker_exe: &Path,
    class_name: &str,
    parameters: BTreeMap<String, Value>,
) -> Result<Box<dyn ManagerChannel>> {
    let mut child = Command::new(worker_exe)
        .arg("--worker-subprocess")
        .arg(class_name)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut header =
        serde_json::to_string(&parameters).map_err(|e| Error::Io(e.to_string()))?;
    header.push('\n');

    child
        .stdin
        .as_mut()
        .expect("piped stdin")
        .write_all(header.as_bytes())
        .await?;

    let (tx_cmd, rx_cmd) = mpsc::unbounded_channel();
    let (tx_event, rx_event) = mpsc::unbounded_channel();

    let handle = tokio::spawn(pump(child, rx_cmd, tx_event));

    Ok(Box::new(ProcessManagerChannel {
        tx: tx_cmd,
        rx: rx_event,
        pump: Some(handle),
    }))
}
