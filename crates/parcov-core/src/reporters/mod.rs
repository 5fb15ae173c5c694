//! Reporters shipped with the crate.

mod json_lines;
mod recording;

pub use json_lines::JsonLinesReporter;
pub use recording::{RecordedEvents, RecordingReporter};

use serde::{Deserialize, Serialize};

use crate::alias::BrowserAlias;
use crate::events::{BrowserCompleteResult, RunResults, SpecResult};
use crate::relay::LogicalEvent;

/// Owned copy of a relayed logical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecordedEvent {
    RunStart,
    BrowserStart {
        browser: BrowserAlias,
    },
    SpecComplete {
        browser: BrowserAlias,
        result: SpecResult,
    },
    BrowserComplete {
        browser: BrowserAlias,
        result: BrowserCompleteResult,
    },
    RunComplete {
        browsers: Vec<BrowserAlias>,
        results: RunResults,
    },
    Exit,
}

impl From<LogicalEvent<'_>> for RecordedEvent {
    fn from(event: LogicalEvent<'_>) -> Self {
        match event {
            LogicalEvent::RunStart => RecordedEvent::RunStart,
            LogicalEvent::BrowserStart(browser) => RecordedEvent::BrowserStart {
                browser: browser.clone(),
            },
            LogicalEvent::SpecComplete(browser, result) => RecordedEvent::SpecComplete {
                browser: browser.clone(),
                result: result.clone(),
            },
            LogicalEvent::BrowserComplete(browser, result) => RecordedEvent::BrowserComplete {
                browser: browser.clone(),
                result: result.clone(),
            },
            LogicalEvent::RunComplete(browsers, results) => RecordedEvent::RunComplete {
                browsers: browsers.to_vec(),
                results: results.clone(),
            },
        }
    }
}
