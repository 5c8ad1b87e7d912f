// Port Layer - Interfaces for external dependencies

pub mod env_store;
pub mod id_provider; // For deterministic testing
pub mod result_exchange;
pub mod unit_runner;

// Re-exports
pub use env_store::EnvStore;
pub use id_provider::{IdProvider, UuidProvider};
pub use result_exchange::{ClearOutcome, ResultError, ResultExchange};
pub use unit_runner::{ExecutionError, Invocation, UnitOutcome, UnitRunner};
