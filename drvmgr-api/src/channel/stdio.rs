//! The worker-side half of the subprocess channel backend (see
//! `channel::process`). A binary that re-execs itself as a worker
//! subprocess calls [`read_parameters`] once, then hands a
//! [`StdioDriverChannel`] to the chosen `Worker::run`.

use crate::worker::{DriverChannel, WorkerCommand, WorkerEvent};
use crate::{Error, Result, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tracing::error;

/// Reads the JSON-encoded parameters header the manager writes right
/// after spawning the subprocess.
pub async fn read_parameters(
    stdin: &mut BufReader<Stdin>,
) -> Result<BTreeMap<String, Value>> {
    let mut line = String::new();

    if stdin.read_line(&mut line).await? == 0 {
        return Err(Error::Io("worker subprocess stdin closed".into()));
    }
    serde_json::from_str(&line).map_err(|e| Error::Io(e.to_string()))
}

pub struct StdioDriverChannel {
    stdin: BufReader<Stdin>,
    stdout: Stdout,
}

impl StdioDriverChannel {
    pub fn new(stdin: BufReader<Stdin>, stdout: Stdout) -> Self {
        StdioDriverChannel { stdin, stdout }
    }
}

#[async_trait]
impl DriverChannel for StdioDriverChannel {
    async fn recv(&mut self) -> Option<WorkerCommand> {
        let mut line = String::new();

        match self.stdin.read_line(&mut line).await {
            Ok(0) => None,
            Ok(_) => match serde_json::from_str(&line) {
                Ok(cmd) => Some(cmd),
                Err(e) => {
                    error!("{}: {e}", Error::UnknownWorkerMessage(line));
                    None
                }
            },
            Err(_) => None,
        }
    }

    async fn send(&mut self, event: WorkerEvent) -> Result<()> {
        let mut line =
            serde_json::to_string(&event).map_err(|e| Error::Io(e.to_string()))?;
        line.push('\n');

        self.stdout.write_all(line.as_bytes()).await?;
        Ok(())
    }
}
