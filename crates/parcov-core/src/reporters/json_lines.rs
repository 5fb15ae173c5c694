//! Reporter that writes the logical event stream as JSON lines.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::RecordedEvent;
use crate::alias::BrowserAlias;
use crate::events::{BrowserCompleteResult, RunResults, SpecResult};
use crate::relay::{CoverageReporter, ExitHandle, LifecycleHook, LogicalEvent};

#[derive(Serialize)]
struct EmittedLine<'a> {
    emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a RecordedEvent,
}

/// Writes each logical event as one JSON object per line.
///
/// Write failures are logged and remembered; the first one is reported
/// through the exit handle so the run does not end silently truncated.
pub struct JsonLinesReporter<W: Write + Send> {
    name: String,
    writer: W,
    first_error: Option<String>,
}

impl<W: Write + Send> JsonLinesReporter<W> {
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
            first_error: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn emit(&mut self, event: RecordedEvent) {
        let line = EmittedLine {
            emitted_at: Utc::now(),
            event: &event,
        };
        let written = serde_json::to_writer(&mut self.writer, &line)
            .map_err(|e| e.to_string())
            .and_then(|_| self.writer.write_all(b"\n").map_err(|e| e.to_string()));

        if let Err(e) = written {
            warn!(reporter = %self.name, error = %e, "failed to write event line");
            self.first_error.get_or_insert(e);
        }
    }
}

impl<W: Write + Send> CoverageReporter for JsonLinesReporter<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> &[LifecycleHook] {
        &LifecycleHook::ALL
    }

    fn on_run_start(&mut self) {
        self.emit(LogicalEvent::RunStart.into());
    }

    fn on_browser_start(&mut self, browser: &BrowserAlias) {
        self.emit(LogicalEvent::BrowserStart(browser).into());
    }

    fn on_spec_complete(&mut self, browser: &BrowserAlias, result: &SpecResult) {
        self.emit(LogicalEvent::SpecComplete(browser, result).into());
    }

    fn on_browser_complete(&mut self, browser: &BrowserAlias, result: &BrowserCompleteResult) {
        self.emit(LogicalEvent::BrowserComplete(browser, result).into());
    }

    fn on_run_complete(&mut self, browsers: &[BrowserAlias], results: &RunResults) {
        self.emit(LogicalEvent::RunComplete(browsers, results).into());
    }

    fn on_exit(&mut self, done: ExitHandle) {
        self.emit(RecordedEvent::Exit);
        if let Err(e) = self.writer.flush() {
            self.first_error.get_or_insert(e.to_string());
        }
        match self.first_error.take() {
            Some(message) => {
                warn!(
                    reporter = done.reporter(),
                    error = %message,
                    "exiting after write failure"
                );
                done.fail(message)
            }
            None => done.complete(),
        }
    }
}
