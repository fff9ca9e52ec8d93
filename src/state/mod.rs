//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `HostState`: per-host politeness bookkeeping (last fetch, delay, in-flight count)
//! - `EntryState`: lifecycle of a frontier entry
//! - `DropReason`: why an entry left the frontier without being fetched

mod entry_state;
mod host_state;

pub use entry_state::{DropReason, EntryState};
pub use host_state::HostState;
