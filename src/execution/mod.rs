//! Workflow execution state and the cache that serializes access to it.

pub mod cache;
pub mod context;
pub mod mutable_state;

pub use cache::{CacheError, DualFetch, ExecutionCache, ExecutionGuard};
pub use context::{ContextError, ExecutionContext, LockedExecution};
pub use mutable_state::MutableState;
