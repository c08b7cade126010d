//! Shared helpers for binaries and persistence calls.

pub mod bootstrap;
pub mod retry;
