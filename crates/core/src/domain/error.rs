// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid run state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Missing predictor features: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    #[error("Invalid request body: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
