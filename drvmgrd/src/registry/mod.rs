pub mod driver;
pub mod handle_index;
pub mod variable;

pub use driver::DriverRecord;
pub use handle_index::HandleIndex;
pub use variable::VariableRecord;

use drvmgr_api::DriverName;
use indexmap::IndexMap;

/// Live drivers, keyed by the manager-assigned `DRIVER_<n>` name.
/// Backed by an `IndexMap` so iteration follows insertion order, which
/// the status file and the reconciler's fairness pass both depend on
/// (spec §3 invariant 3, §4.6, §6.3).
#[derive(Default)]
pub struct DriverRegistry {
    drivers: IndexMap<DriverName, DriverRecord>,
    counter: u64,
}

impl DriverRegistry {
    pub fn new() -> Self {
        DriverRegistry::default()
    }

    /// Allocates the next `DRIVER_<n>` name. Names are never reused
    /// within a manager's lifetime (spec §3 invariant 3).
    pub fn next_name(&mut self) -> DriverName {
        self.counter += 1;
        DriverName::from(format!("DRIVER_{}", self.counter))
    }

    pub fn insert(&mut self, record: DriverRecord) {
        self.drivers.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &DriverName) -> Option<&DriverRecord> {
        self.drivers.get(name)
    }

    pub fn get_mut(&mut self, name: &DriverName) -> Option<&mut DriverRecord> {
        self.drivers.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DriverName, &DriverRecord)> {
        self.drivers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&DriverName, &mut DriverRecord)> {
        self.drivers.iter_mut()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut DriverRecord> {
        self.drivers.values_mut()
    }

    /// Searches for an existing driver compatible with `class_name` /
    /// `parameters`. Linear scan, first match wins, visiting drivers in
    /// insertion order (spec §4.3).
    pub fn find_compatible(
        &mut self,
        class_name: &str,
        parameters: &std::collections::BTreeMap<String, drvmgr_api::Value>,
    ) -> Option<&mut DriverRecord> {
        self.drivers
            .values_mut()
            .find(|d| d.is_compatible(class_name, parameters))
    }

    /// Removes every driver in the same order the source's
    /// `dict.popitem()` would (most-recently-inserted first), calling
    /// `f` with each record before it's dropped. Used by `CLEAN`
    /// (spec §4.7).
    pub fn drain_in_order<F: FnMut(DriverRecord)>(&mut self, mut f: F) {
        while let Some((_, record)) = self.drivers.pop() {
            f(record);
        }
    }
}
