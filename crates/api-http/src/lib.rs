//! HTTP API Layer
//!
//! Dashboard pages, the sample dashboard payload and the prediction endpoint.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::AppState;
pub use server::{build_router, HttpServer, HttpServerConfig};
