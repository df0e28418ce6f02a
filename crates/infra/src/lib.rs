//! Infrastructure layer: stores, orchestration services, dispatch, config.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod orchestration;
pub mod postgres;
pub mod requests;
pub mod workers;


pub use config::{ConfigError, OrchestratorConfig};
pub use error::{DispatchWarning, OrchestratorError, StoreError};
pub use notify::{SharedNotifier, StatusNotifier};
pub use orchestration::{CreativeServices, ServiceDeps};
