//! Upstream lifecycle payloads and the raw event stream.
//!
//! Raw events describe physical executors. The coordinator turns them into
//! logical events keyed by [`BrowserAlias`](crate::alias::BrowserAlias).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coverage::CoverageMap;

/// One physical executor running a logical browser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalBrowser {
    /// Logical browser name shared by every executor of the same configuration.
    pub name: String,

    /// Executor id, unique within the logical browser for a run.
    pub id: String,
}

impl PhysicalBrowser {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// Result of a single spec, forwarded to reporters as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecResult {
    #[serde(default)]
    pub description: String,

    /// Enclosing suite names, outermost first.
    #[serde(default)]
    pub suite: Vec<String>,

    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub skipped: bool,

    /// Duration in milliseconds.
    #[serde(default)]
    pub time: u64,

    /// Failure messages.
    #[serde(default)]
    pub log: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Completion payload reported once by each executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorResult {
    #[serde(default)]
    pub coverage: CoverageMap,

    /// Fields the aggregator neither merges nor forwards.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ExecutorResult {
    pub fn with_coverage(coverage: CoverageMap) -> Self {
        Self {
            coverage,
            extra: serde_json::Map::new(),
        }
    }
}

/// Payload relayed with the logical `onBrowserComplete` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserCompleteResult {
    /// Coverage merged across every executor of the logical browser.
    pub coverage: CoverageMap,
}

/// Run totals produced by the test orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResults {
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub disconnected: bool,
    #[serde(default)]
    pub exit_code: i32,
}

/// A physical lifecycle event as delivered by the test orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RawEvent {
    RunStart,

    BrowserStart {
        browser: PhysicalBrowser,
    },

    SpecComplete {
        browser: PhysicalBrowser,
        result: SpecResult,
    },

    BrowserComplete {
        browser: PhysicalBrowser,
        result: ExecutorResult,
    },

    RunComplete {
        browsers: Vec<PhysicalBrowser>,
        #[serde(default)]
        results: RunResults,
    },

    Exit,
}

impl RawEvent {
    /// Upstream hook name, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            RawEvent::RunStart => "onRunStart",
            RawEvent::BrowserStart { .. } => "onBrowserStart",
            RawEvent::SpecComplete { .. } => "onSpecComplete",
            RawEvent::BrowserComplete { .. } => "onBrowserComplete",
            RawEvent::RunComplete { .. } => "onRunComplete",
            RawEvent::Exit => "onExit",
        }
    }
}
