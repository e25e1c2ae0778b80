use drvmgr_api::{DriverName, Handle, VarId};
use std::collections::HashMap;

/// Global mapping from a host-visible handle to the variable/driver it
/// aliases (spec §3 invariant 1).
#[derive(Default)]
pub struct HandleIndex(HashMap<Handle, (VarId, DriverName)>);

impl HandleIndex {
    pub fn new() -> Self {
        HandleIndex::default()
    }

    pub fn get(&self, handle: &Handle) -> Option<&(VarId, DriverName)> {
        self.0.get(handle)
    }

    pub fn insert(&mut self, handle: Handle, target: (VarId, DriverName)) {
        self.0.insert(handle, target);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops every handle routed through `driver`, used when a driver
    /// is removed on `CLEAN`.
    pub fn remove_driver(&mut self, driver: &DriverName) {
        self.0.retain(|_, (_, d)| d != driver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let mut idx = HandleIndex::new();

        idx.insert(
            Handle::from("vh1"),
            (VarId::from("x"), DriverName::from("DRIVER_1")),
        );

        assert_eq!(
            idx.get(&Handle::from("vh1")),
            Some(&(VarId::from("x"), DriverName::from("DRIVER_1")))
        );
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn remove_driver_drops_only_its_handles() {
        let mut idx = HandleIndex::new();

        idx.insert(
            Handle::from("vh1"),
            (VarId::from("x"), DriverName::from("DRIVER_1")),
        );
        idx.insert(
            Handle::from("vh2"),
            (VarId::from("y"), DriverName::from("DRIVER_2")),
        );

        idx.remove_driver(&DriverName::from("DRIVER_1"));

        assert_eq!(idx.len(), 1);
        assert!(idx.get(&Handle::from("vh2")).is_some());
    }
}
