pub mod config;
pub mod service;
pub mod state;

pub use config::ServiceConfig;
pub use service::{run_service, ServiceError};
pub use state::{AppState, StateError};
