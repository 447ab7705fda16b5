//! Data models for the Taskforge backend.
//!
//! Wire types use snake_case field names; timestamps are RFC 3339 UTC.

mod metrics;
mod project;
mod task;
mod todo;
mod user;

pub use metrics::*;
pub use project::*;
pub use task::*;
pub use todo::*;
pub use user::*;
