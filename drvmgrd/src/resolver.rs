//! Compatibility Resolver (spec §4.3): decides whether an incoming
//! `SETUP_DRIVERS` entry can reuse an existing driver instead of
//! starting a new one.

use crate::registry::{DriverRecord, DriverRegistry};
use drvmgr_api::message::DriverSetupBody;
use drvmgr_api::DriverName;

/// Finds a live driver whose class and parameters are compatible with
/// `class_name`/`setup`. Linear search over live drivers in insertion
/// order, first match wins (spec §4.3).
pub fn find_compatible<'a>(
    registry: &'a mut DriverRegistry,
    class_name: &str,
    setup: &DriverSetupBody,
) -> Option<&'a mut DriverRecord> {
    registry.find_compatible(class_name, &setup.parameters)
}

/// Convenience used by tests and the dispatcher to look a driver up by
/// name after provisioning.
pub fn get<'a>(registry: &'a DriverRegistry, name: &DriverName) -> Option<&'a DriverRecord> {
    registry.get(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drvmgr_api::channel::task;
    use drvmgr_api::{DriverStatus, Handle, Value};
    use drvmgr_drv_memory::MemoryDriver;
    use std::collections::BTreeMap;

    fn insert_driver(
        registry: &mut DriverRegistry,
        class_name: &str,
        parameters: BTreeMap<String, Value>,
    ) -> DriverName {
        let name = registry.next_name();
        let channel = task::spawn::<MemoryDriver>(BTreeMap::new()).unwrap();
        let record = DriverRecord::new(
            name.clone(),
            class_name.to_owned(),
            parameters,
            Handle::from("h0"),
            channel,
        );

        registry.insert(record);
        name
    }

    #[test]
    fn repeated_compatible_setup_resolves_to_same_driver() {
        let mut registry = DriverRegistry::new();
        let mut params = BTreeMap::new();
        params.insert("ip".to_string(), Value::Str("127.0.0.1".into()));

        let name = insert_driver(&mut registry, "udp_driver", params.clone());

        let setup = DriverSetupBody {
            parameters: params,
            variables: BTreeMap::new(),
        };

        let found = find_compatible(&mut registry, "udp_driver", &setup).unwrap();

        assert_eq!(found.name, name);
        assert_eq!(found.status, DriverStatus::Setup);
    }

    #[test]
    fn different_class_never_matches() {
        let mut registry = DriverRegistry::new();
        insert_driver(&mut registry, "udp_driver", BTreeMap::new());

        let setup = DriverSetupBody {
            parameters: BTreeMap::new(),
            variables: BTreeMap::new(),
        };

        assert!(find_compatible(&mut registry, "s7protocol", &setup).is_none());
    }
}
