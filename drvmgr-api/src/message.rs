//! The host <-> manager wire protocol (spec §4.1, §6.1). Frames are
//! tagged pairs; here each tag is a variant of a closed enum instead of
//! an open `(str, dict)` pair, so the dispatcher's match can be
//! exhaustive.

use crate::{DriverName, Handle, Value, VarId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of a `SETUP_DRIVERS` request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverSetup {
    #[serde(rename = "DRIVER")]
    pub class_name: String,
    #[serde(rename = "SETUP")]
    pub setup: DriverSetupBody,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverSetupBody {
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub variables: BTreeMap<VarId, VarSetup>,
}

/// A variable's declared metadata, opaque to the core: datatype, size,
/// operation mode, etc. are never interpreted here, only forwarded to
/// the worker. The one field the core does look at is `handle`, which
/// it pulls out to build the Handle Index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarSetup {
    pub handle: Option<Handle>,
    #[serde(flatten)]
    pub parameters: BTreeMap<String, Value>,
}

/// Per-handle outcome of a `SETUP_DRIVERS` entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupOutcome {
    Success,
    Failed,
}

impl std::fmt::Display for SetupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SetupOutcome::Success => write!(f, "SUCCESS"),
            SetupOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// A command frame sent from the host to the manager.
///
/// `SetupDrivers` entries use `IndexMap` rather than `BTreeMap` so
/// provisioning processes them in host-supplied order (spec §5), not
/// lexicographic handle order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostCommand {
    SetupDrivers(IndexMap<Handle, DriverSetup>),
    Updates(BTreeMap<Handle, Value>),
    Clean,
}

/// A reply frame, sent back tagged with the same command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostReply {
    SetupDrivers(IndexMap<Handle, SetupOutcome>),
    Clean,
}

/// An asynchronous frame the manager emits without being asked --
/// never a reply to a specific command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostEvent {
    Status(BTreeMap<Handle, crate::DriverStatus>),
    Info(BTreeMap<Handle, String>),
    VarInfo(BTreeMap<Handle, String>),
    Updates(BTreeMap<Handle, Value>),
    Stats(crate::Stats),
}

/// A frame exchanged on the host channel: either a command/reply pair
/// or an asynchronous event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostFrame {
    Command(HostCommand),
    Reply(HostReply),
    Event(HostEvent),
}

/// Reference lookup used by provisioning and host writes: driver name
/// unknown to the caller, so it pairs a var-id with the driver that
/// owns it.
pub type HandleTarget = (VarId, DriverName);
