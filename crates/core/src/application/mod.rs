// Application Layer - Use Cases

pub mod orchestrator;

// Re-exports
pub use orchestrator::{HandoffChannel, HandoffScope, Orchestrator, OrchestratorConfig};
