use drvmgr_api::{Handle, Value, VarSetup};

/// One variable within a driver (spec §3 "Variable record").
pub struct VariableRecord {
    pub handlers: Vec<Handle>,
    pub parameters: VarSetup,
    pub value: Option<Value>,
    pub info: String,
    pub read_count: u64,
    pub write_count: u64,
}

impl VariableRecord {
    pub fn new(handle: Handle, parameters: VarSetup) -> Self {
        VariableRecord {
            handlers: vec![handle],
            parameters,
            value: None,
            info: String::new(),
            read_count: 0,
            write_count: 0,
        }
    }

    /// Appends `handle` unless it's already present (spec invariant 2:
    /// a variable's handlers are unique).
    pub fn add_handle(&mut self, handle: Handle) {
        if !self.handlers.contains(&handle) {
            self.handlers.push(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_one_handle_and_no_value() {
        let v = VariableRecord::new(
            Handle::from("h1"),
            VarSetup {
                handle: Some(Handle::from("h1")),
                parameters: Default::default(),
            },
        );

        assert_eq!(v.handlers, vec![Handle::from("h1")]);
        assert_eq!(v.value, None);
    }

    #[test]
    fn add_handle_does_not_duplicate() {
        let mut v = VariableRecord::new(
            Handle::from("h1"),
            VarSetup {
                handle: Some(Handle::from("h1")),
                parameters: Default::default(),
            },
        );

        v.add_handle(Handle::from("h1"));
        v.add_handle(Handle::from("h2"));

        assert_eq!(v.handlers, vec![Handle::from("h1"), Handle::from("h2")]);
    }
}
