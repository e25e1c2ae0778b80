//! Status Snapshotter (spec §4.8, §6.3): once-per-wall-second stats and
//! an optional human-readable status file.

use crate::registry::{DriverRegistry, HandleIndex};
use drvmgr_api::Stats;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::Level;

/// Bound on the in-memory log ring kept for the status file's `Logs:`
/// section (spec §5 "Shared resources", §6.3).
pub const LOG_RING_CAPACITY: usize = 50;

pub struct LogEntry {
    pub timestamp: String,
    pub level: Level,
    pub message: String,
}

/// Rolling buffer of recent log lines, oldest first. Trimmed to
/// `LOG_RING_CAPACITY` after every snapshot write (spec §6.3).
#[derive(Default)]
pub struct LogRing(VecDeque<LogEntry>);

impl LogRing {
    pub fn new() -> Self {
        LogRing::default()
    }

    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        self.0.push_back(LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.into(),
        });
    }

    /// Emits at `error` level and records the same text in the ring, so
    /// dispatcher failures show up in both the log stream and the
    /// status file's `Logs:` section (spec §6.3).
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.push(Level::ERROR, message);
    }

    /// Same as [`LogRing::error`], at `info` level.
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.push(Level::INFO, message);
    }

    fn trim(&mut self) {
        while self.0.len() > LOG_RING_CAPACITY {
            self.0.pop_front();
        }
    }

    /// Most-recent-first, for the status file's LIFO log section.
    fn lifo(&self) -> impl Iterator<Item = &LogEntry> {
        self.0.iter().rev()
    }
}

/// Drives the snapshot cadence (spec §6.4 `status_interval_ms`, default
/// 1000ms per spec §4.8/§9) and (optionally) the status file. Uptime is
/// always measured against a monotonic instant captured at
/// construction, never wall time.
pub struct Snapshotter {
    start: Instant,
    interval: Duration,
    last_emitted_at: Option<Instant>,
    status_file_path: Option<PathBuf>,
    last_write_ms: u128,
}

impl Snapshotter {
    pub fn new(status_file_path: Option<PathBuf>, interval: Duration) -> Self {
        Snapshotter {
            start: Instant::now(),
            interval,
            last_emitted_at: None,
            status_file_path,
            last_write_ms: 0,
        }
    }

    /// Called once per dispatcher cycle. Returns `Some(stats)` at most
    /// once per elapsed `interval`; writes the status file as a side
    /// effect when one is configured.
    pub fn tick(
        &mut self,
        registry: &DriverRegistry,
        handle_index: &HandleIndex,
        logs: &mut LogRing,
    ) -> Option<Stats> {
        let now = Instant::now();
        let due = match self.last_emitted_at {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        };
        if !due {
            return None;
        }
        self.last_emitted_at = Some(now);

        let uptime = self.start.elapsed().as_secs();
        let stats = Stats {
            driver_count: registry.len(),
            variable_count: handle_index.len(),
        };

        if let Some(path) = &self.status_file_path {
            let text = render_status(uptime, self.last_write_ms, registry, logs);
            let write_started = Instant::now();
            let result = std::fs::write(path, &text);
            self.last_write_ms = write_started.elapsed().as_millis();
            if let Err(e) = result {
                error!("status file write to {} failed: {e}", path.display());
            }
        }

        logs.trim();
        Some(stats)
    }
}

const RULER: &str = "--------------------------------------------------------------------";

fn render_status(uptime: u64, last_write_ms: u128, registry: &DriverRegistry, logs: &LogRing) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Driver Manager status: (clock = {uptime}s, {last_write_ms}ms to write)\n"
    ));
    out.push_str(RULER);
    out.push('\n');

    for (name, driver) in registry.iter() {
        out.push_str(&format!("{name}\n"));
        out.push_str(&format!("  Type: {}\n", driver.class_name));
        out.push_str(&format!("  Status: {}\n", driver.status));
        out.push_str(&format!("  Latency: {}\n", driver.latency));

        out.push_str("  Info:\n");
        for line in &driver.info_log {
            out.push_str(&format!("    {line}\n"));
        }

        out.push_str("  Parameters:\n");
        for (key, value) in &driver.parameters {
            out.push_str(&format!("    {key} = {value}\n"));
        }

        out.push_str(&format!(
            "  Handlers ({}): {}\n",
            driver.handlers.len(),
            driver
                .handlers
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ));

        out.push_str(&format!("  Variables: {}\n", driver.variables.len()));
        for (var_id, var) in &driver.variables {
            let handlers = var
                .handlers
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let value = var
                .value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unset".to_owned());
            out.push_str(&format!(
                "    {var_id} {handlers} = {value}  (R:{} W:{}) - {}\n",
                var.read_count, var.write_count, var.info
            ));
        }

        out.push_str(RULER);
        out.push('\n');
    }

    out.push_str("Logs:\n");
    for entry in logs.lifo() {
        out.push_str(&format!(
            "{} - {}: {}\n",
            entry.timestamp, entry.level, entry.message
        ));
    }

    out
}
