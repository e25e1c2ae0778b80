//! Update Reconciler (spec §4.6): drains worker messages into the
//! registries and classifies them into the four outbound change
//! streams, coalescing by handle until the dispatcher emits and clears
//! them.

use crate::registry::DriverRegistry;
use drvmgr_api::worker::WorkerEvent;
use drvmgr_api::{DriverStatus, Handle, Value};
use indexmap::IndexMap;

/// Default fairness cap on worker messages drained per driver per
/// cycle (spec §4.6 `max_pipe_loops`).
pub const DEFAULT_MAX_PIPE_LOOPS: usize = 10;

/// The four coalescing outbound maps. Each is last-writer-wins by
/// handle and insertion-ordered, so emission to the host is
/// deterministic (spec §4.6, §9).
#[derive(Default)]
pub struct OutboundUpdates {
    pub status: IndexMap<Handle, DriverStatus>,
    pub info: IndexMap<Handle, String>,
    pub var_info: IndexMap<Handle, String>,
    pub value: IndexMap<Handle, Value>,
}

impl OutboundUpdates {
    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
            && self.info.is_empty()
            && self.var_info.is_empty()
            && self.value.is_empty()
    }

    pub fn clear(&mut self) {
        self.status.clear();
        self.info.clear();
        self.var_info.clear();
        self.value.clear();
    }
}

/// Drains up to `max_pipe_loops` messages from each driver's worker
/// channel, in insertion order, applying them to the registry and
/// accumulating outbound updates. Returns after one pass over every
/// driver -- callers loop the whole dispatcher cycle, not this
/// function.
pub fn reconcile(
    registry: &mut DriverRegistry,
    max_pipe_loops: usize,
    out: &mut OutboundUpdates,
) {
    for (_, driver) in registry.iter_mut() {
        for _ in 0..max_pipe_loops {
            let event = match driver.channel.try_recv() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(_) => break,
            };

            match event {
                WorkerEvent::Status(new_status) => {
                    if driver.status != new_status {
                        driver.status = new_status;
                        for h in &driver.handlers {
                            out.status.insert(h.clone(), new_status);
                        }
                    }
                }

                WorkerEvent::Info(text) => {
                    if text.contains("Latency") {
                        driver.latency = text;
                    } else {
                        driver.push_info(text.clone());
                        for h in &driver.handlers {
                            out.info.insert(h.clone(), text.clone());
                        }
                    }
                }

                WorkerEvent::VarInfo(msg, var_id) => {
                    if let Some(var) = driver.variables.get_mut(&var_id) {
                        if var.info != msg {
                            var.info = msg.clone();
                            for h in &var.handlers {
                                out.var_info.insert(h.clone(), msg.clone());
                            }
                        }
                    }
                }

                WorkerEvent::Update(values) => {
                    for (var_id, value) in values {
                        if let Some(var) = driver.variables.get_mut(&var_id) {
                            if var.value.as_ref() != Some(&value) {
                                var.value = Some(value.clone());
                                var.read_count += 1;
                                for h in &var.handlers {
                                    out.value.insert(h.clone(), value.clone());
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
