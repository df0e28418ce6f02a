//! `creatives-core`: domain building blocks for multi-format creative requests.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, output format tags, job/request statuses and the aggregation
//! rule that derives a request status from its children.

pub mod error;
pub mod format;
pub mod id;
pub mod status;

pub use error::{DomainError, DomainResult};
pub use format::{FormatTag, RequestedFormats};
pub use id::{JobId, OwnerId, RequestId};
pub use status::{JobStatus, RequestStatus, StatusHistogram};
