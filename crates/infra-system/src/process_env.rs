// Process environment adapter for the handoff slot
use finsight_core::port::EnvStore;

/// The real process environment.
///
/// Every writer must hold the orchestrator guard; the environment itself
/// offers no synchronization.
pub struct ProcessEnv;

impl EnvStore for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn set(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    fn remove(&self, key: &str) {
        std::env::remove_var(key);
    }
}
