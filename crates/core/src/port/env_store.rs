// Environment Store Port
// A named process-wide string slot (the handoff slot lives here)

pub trait EnvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory environment, isolated per test
    #[derive(Default)]
    pub struct MemoryEnvStore {
        vars: Mutex<HashMap<String, String>>,
    }

    impl MemoryEnvStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_var(self, key: &str, value: &str) -> Self {
            self.set(key, value);
            self
        }
    }

    impl EnvStore for MemoryEnvStore {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.lock().unwrap().get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) {
            self.vars
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }

        fn remove(&self, key: &str) {
            self.vars.lock().unwrap().remove(key);
        }
    }
}
