//! # anitodo sync core
//!
//! Update aggregation and optimistic state synchronization:
//! - `sources`: one fetch against one upstream source
//! - `fanout`: concurrent fetch of every source with per-source failure isolation
//! - `merge`: per-weekday merge with title-similarity deduplication
//! - `store`: typed store interface and its SQLite implementation
//! - `sync`: watched/favorite sets with optimistic toggles and rollback
//! - `pipeline` / `scheduler`: fetch → merge → save → reload, on demand or on a timer

pub mod error;
pub mod fanout;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod sync;

pub use error::{Error, MutationKind, Result, SourceFailure};
pub use fanout::{FanOutFetcher, FetchPolicy};
pub use models::{
    AggregateInput, AggregateResult, Entry, HistoryItem, HistoryPage, WatchRecord, WeekdayBucket,
};
pub use pipeline::RefreshPipeline;
pub use scheduler::RefreshScheduler;
pub use sources::{HttpSourceClient, SourceClient};
pub use store::{SqliteStore, Store};
pub use sync::StateSynchronizer;
