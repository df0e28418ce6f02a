//! Creative requests: one prompt asked for in several formats.

pub mod store;
pub mod types;

pub use store::{InMemoryRequestStore, RequestStore};
pub use types::{Request, RequestView};
