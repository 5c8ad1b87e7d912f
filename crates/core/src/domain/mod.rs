// Domain Layer - Pure business logic and entities

pub mod dashboard;
pub mod error;
pub mod prediction;
pub mod result;
pub mod run_state;

// Re-exports
pub use dashboard::DashboardSnapshot;
pub use error::DomainError;
pub use prediction::{Feature, PredictionRequest};
pub use result::ResultRecord;
pub use run_state::{RunLifecycle, RunState};
