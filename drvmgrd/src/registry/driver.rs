use super::variable::VariableRecord;
use drvmgr_api::worker::ManagerChannel;
use drvmgr_api::{DriverName, DriverStatus, Handle, Value, VarId};
use indexmap::IndexMap;
use std::collections::{BTreeMap, VecDeque};

/// Bound on the driver's rolling info log (spec §3 invariant 6).
pub const INFO_LOG_CAPACITY: usize = 5;

/// One live driver (spec §3 "Driver record").
pub struct DriverRecord {
    pub name: DriverName,
    pub class_name: String,
    pub parameters: BTreeMap<String, Value>,
    pub handlers: Vec<Handle>,
    pub variables: IndexMap<VarId, VariableRecord>,
    pub status: DriverStatus,
    pub latency: String,
    pub info: String,
    pub info_log: VecDeque<String>,
    pub channel: Box<dyn ManagerChannel>,
    pub pending_updates: BTreeMap<VarId, Value>,
}

impl DriverRecord {
    pub fn new(
        name: DriverName,
        class_name: String,
        parameters: BTreeMap<String, Value>,
        handle: Handle,
        channel: Box<dyn ManagerChannel>,
    ) -> Self {
        DriverRecord {
            name,
            class_name,
            parameters,
            handlers: vec![handle],
            variables: IndexMap::new(),
            status: DriverStatus::Setup,
            latency: String::new(),
            info: String::new(),
            info_log: VecDeque::new(),
            channel,
            pending_updates: BTreeMap::new(),
        }
    }

    pub fn add_handle(&mut self, handle: Handle) {
        if !self.handlers.contains(&handle) {
            self.handlers.push(handle);
        }
    }

    /// Compatibility check used by the resolver (spec §4.3): same
    /// class, and every overlapping parameter key has an equal value.
    /// Keys present on only one side are "don't care".
    pub fn is_compatible(&self, class_name: &str, parameters: &BTreeMap<String, Value>) -> bool {
        if self.class_name != class_name {
            return false;
        }
        for (key, value) in parameters {
            if let Some(existing) = self.parameters.get(key) {
                if existing != value {
                    return false;
                }
            }
        }
        true
    }

    /// Appends a non-latency info line, truncating the ring to the
    /// last `INFO_LOG_CAPACITY` entries (spec §3 invariant 6 / §4.6).
    pub fn push_info(&mut self, text: String) {
        self.info_log.push_back(text.clone());
        while self.info_log.len() > INFO_LOG_CAPACITY {
            self.info_log.pop_front();
        }
        self.info = text;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drvmgr_api::channel::task;
    use drvmgr_drv_memory::MemoryDriver;

    fn make_record(class_name: &str, parameters: BTreeMap<String, Value>) -> DriverRecord {
        let channel = task::spawn::<MemoryDriver>(BTreeMap::new()).unwrap();

        DriverRecord::new(
            DriverName::from("DRIVER_1"),
            class_name.to_owned(),
            parameters,
            Handle::from("h1"),
            channel,
        )
    }

    #[test]
    fn compatible_requires_matching_class() {
        let r = make_record("udp_driver", BTreeMap::new());

        assert!(!r.is_compatible("other_driver", &BTreeMap::new()));
    }

    #[test]
    fn compatible_ignores_keys_absent_on_either_side() {
        let mut existing = BTreeMap::new();
        existing.insert("ip".to_string(), Value::Str("127.0.0.1".into()));

        let r = make_record("udp_driver", existing);

        let mut incoming = BTreeMap::new();
        incoming.insert("port".to_string(), Value::Int(8400));

        assert!(r.is_compatible("udp_driver", &incoming));
    }

    #[test]
    fn incompatible_when_overlapping_key_differs() {
        let mut existing = BTreeMap::new();
        existing.insert("ip".to_string(), Value::Str("127.0.0.1".into()));

        let r = make_record("udp_driver", existing);

        let mut incoming = BTreeMap::new();
        incoming.insert("ip".to_string(), Value::Str("10.0.0.1".into()));

        assert!(!r.is_compatible("udp_driver", &incoming));
    }

    #[test]
    fn info_log_is_capped_at_five() {
        let mut r = make_record("udp_driver", BTreeMap::new());

        for i in 0..7 {
            r.push_info(format!("line {i}"));
        }

        assert_eq!(r.info_log.len(), INFO_LOG_CAPACITY);
        assert_eq!(r.info_log.front().unwrap(), "line 2");
        assert_eq!(r.info_log.back().unwrap(), "line 6");
    }
}
