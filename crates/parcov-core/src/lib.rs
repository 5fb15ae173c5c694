//! parcov - parallel coverage aggregation
//!
//! When one logical browser configuration (e.g. "Chrome") runs across
//! several parallel executors, reporters still expect a single browser.
//! This crate:
//! - Tracks the executors of each logical browser per run
//! - Emits one `onBrowserStart` on the first executor start and one
//!   `onBrowserComplete` once every expected executor has finished
//! - Merges per-file coverage across executors for that completion
//! - Relays everything to reporters under a configured alias

pub mod alias;
pub mod config;
pub mod coordinator;
pub mod coverage;
pub mod error;
pub mod events;
pub mod registry;
pub mod relay;
pub mod reporters;
pub mod state;
pub mod telemetry;

pub use alias::{resolve_alias, BrowserAlias};
pub use config::ParallelOptions;
pub use coordinator::CoverageAggregator;
pub use coverage::{combine, merge_coverage_maps, CoverageMap, FileCoverage};
pub use error::{AggregationError, ConfigError, Result};
pub use events::{
    BrowserCompleteResult, ExecutorResult, PhysicalBrowser, RawEvent, RunResults, SpecResult,
};
pub use registry::ReporterRegistry;
pub use relay::{CoverageReporter, ExitHandle, LifecycleHook, LogicalEvent, ReporterRelay};
pub use reporters::{JsonLinesReporter, RecordedEvent, RecordedEvents, RecordingReporter};
pub use state::{AggregationStore, BrowserPhase, ExecutorSlot, LogicalBrowser, StartMark};
pub use telemetry::init_tracing;

/// parcov version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
