//! In-memory reporter that captures every relayed event.

use std::sync::{Arc, Mutex};

use super::RecordedEvent;
use crate::alias::BrowserAlias;
use crate::events::{BrowserCompleteResult, RunResults, SpecResult};
use crate::relay::{CoverageReporter, ExitHandle, LifecycleHook, LogicalEvent};

/// Shared view of the events captured by a [`RecordingReporter`].
#[derive(Debug, Clone, Default)]
pub struct RecordedEvents(Arc<Mutex<Vec<RecordedEvent>>>);

impl RecordedEvents {
    pub fn snapshot(&self) -> Vec<RecordedEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Count of captured events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&RecordedEvent) -> bool) -> usize {
        self.lock().iter().filter(|e| predicate(e)).count()
    }

    fn push(&self, event: RecordedEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedEvent>> {
        // A poisoned log only means a test panicked mid-push; keep reading.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory reporter that captures every relayed event.
///
/// Keep the [`RecordedEvents`] from [`events`](RecordingReporter::events)
/// before boxing the reporter into a relay.
#[derive(Debug)]
pub struct RecordingReporter {
    name: String,
    hooks: Vec<LifecycleHook>,
    events: RecordedEvents,
}

impl RecordingReporter {
    /// Recorder handling every hook.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: LifecycleHook::ALL.to_vec(),
            events: RecordedEvents::default(),
        }
    }

    /// Restrict the hooks this recorder declares.
    pub fn with_hooks(mut self, hooks: &[LifecycleHook]) -> Self {
        self.hooks = hooks.to_vec();
        self
    }

    pub fn events(&self) -> RecordedEvents {
        self.events.clone()
    }
}

impl CoverageReporter for RecordingReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> &[LifecycleHook] {
        &self.hooks
    }

    fn on_run_start(&mut self) {
        self.events.push(LogicalEvent::RunStart.into());
    }

    fn on_browser_start(&mut self, browser: &BrowserAlias) {
        self.events.push(LogicalEvent::BrowserStart(browser).into());
    }

    fn on_spec_complete(&mut self, browser: &BrowserAlias, result: &SpecResult) {
        self.events
            .push(LogicalEvent::SpecComplete(browser, result).into());
    }

    fn on_browser_complete(&mut self, browser: &BrowserAlias, result: &BrowserCompleteResult) {
        self.events
            .push(LogicalEvent::BrowserComplete(browser, result).into());
    }

    fn on_run_complete(&mut self, browsers: &[BrowserAlias], results: &RunResults) {
        self.events
            .push(LogicalEvent::RunComplete(browsers, results).into());
    }

    fn on_exit(&mut self, done: ExitHandle) {
        self.events.push(RecordedEvent::Exit);
        done.complete();
    }
}
