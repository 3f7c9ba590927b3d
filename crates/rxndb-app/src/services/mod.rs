//! Orchestration layer for store rebuilds, offline builds and swaps.
//!
//! Modules exposed here coordinate files and database connections; pure
//! transforms live in `crate::store::canonical` and `crate::ingestion` so
//! lock handling and retries stay localized here.

pub mod builder;
pub mod events;
pub mod rebuild;
pub mod retry;
pub mod swap;

pub use builder::{BuildError, OfflineBuilder};
pub use events::{EventTag, ProgressSink, RebuildEvent, TaskStage, TracingSink, log_event};
pub use rebuild::{RebuildError, RebuildOptions, RebuildSummary, Rebuilder};
pub use retry::{RetryError, RetryPolicy, retry};
pub use swap::{SwapError, SwapOptions, SwapReport, swap_into_place};
