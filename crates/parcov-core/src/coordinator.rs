//! Collapses per-executor lifecycle events into one logical event stream.
//!
//! For each logical browser the first executor start emits `onBrowserStart`
//! and the completion that brings the finished count to `executors` emits
//! `onBrowserComplete` with coverage merged across all executors. Spec
//! results are forwarded unchanged, run start/complete and exit once each.

use tracing::{debug, error, info, instrument, warn};

use crate::config::ParallelOptions;
use crate::error::{AggregationError, Result};
use crate::events::{
    BrowserCompleteResult, ExecutorResult, PhysicalBrowser, RawEvent, RunResults, SpecResult,
};
use crate::registry::ReporterRegistry;
use crate::relay::{CoverageReporter, LogicalEvent, ReporterRelay};
use crate::state::AggregationStore;

/// Aggregates executor events and relays logical events to reporters.
#[derive(Debug)]
pub struct CoverageAggregator {
    options: ParallelOptions,
    store: AggregationStore,
    relay: ReporterRelay,
    aborted: Option<String>,
}

impl CoverageAggregator {
    /// Create an aggregator relaying to `reporters` in the given order.
    pub fn new(
        options: ParallelOptions,
        reporters: Vec<Box<dyn CoverageReporter>>,
    ) -> Result<Self> {
        options.validate()?;
        let store = AggregationStore::new(options.browser_id_alias.clone());
        Ok(Self {
            options,
            store,
            relay: ReporterRelay::new(reporters),
            aborted: None,
        })
    }

    /// Create an aggregator whose reporters are built from
    /// `options.coverage_reporters` through `registry`.
    pub fn from_registry(options: ParallelOptions, registry: &ReporterRegistry) -> Result<Self> {
        options.validate()?;
        let reporters = registry.instantiate(&options)?;
        Self::new(options, reporters)
    }

    /// Append a reporter after those already registered.
    pub fn add_reporter(&mut self, reporter: Box<dyn CoverageReporter>) {
        self.relay.register(reporter);
    }

    pub fn options(&self) -> &ParallelOptions {
        &self.options
    }

    pub fn store(&self) -> &AggregationStore {
        &self.store
    }

    pub fn reporter_names(&self) -> Vec<&str> {
        self.relay.reporter_names()
    }

    /// Reason the current run was aborted, if it was.
    pub fn aborted(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    /// Route a raw event to its handler.
    pub async fn dispatch(&mut self, event: RawEvent) -> Result<()> {
        debug!(event = event.kind(), "dispatching raw event");
        match event {
            RawEvent::RunStart => self.on_run_start(),
            RawEvent::BrowserStart { browser } => self.on_browser_start(&browser)?,
            RawEvent::SpecComplete { browser, result } => self.on_spec_complete(&browser, &result)?,
            RawEvent::BrowserComplete { browser, result } => {
                self.on_browser_complete(&browser, result)?
            }
            RawEvent::RunComplete { browsers, results } => {
                self.on_run_complete(&browsers, &results)
            }
            RawEvent::Exit => self.on_exit().await?,
        }
        Ok(())
    }

    /// Start a new run, discarding any in-flight aggregation state.
    pub fn on_run_start(&mut self) {
        self.store.reset();
        self.aborted = None;
        info!(
            run_id = %self.store.run_id(),
            executors = self.options.executors,
            "coverage run started"
        );
        self.relay.relay(LogicalEvent::RunStart);
    }

    /// Record an executor start; relays `onBrowserStart` for the first
    /// executor of a logical browser only.
    pub fn on_browser_start(&mut self, browser: &PhysicalBrowser) -> Result<()> {
        self.ensure_running()?;

        let mark = self.store.mark_started(&browser.name, &browser.id);
        if !mark.inserted {
            debug!(
                browser = %browser.name,
                executor = %browser.id,
                "duplicate executor start ignored"
            );
            return Ok(());
        }
        if !mark.is_first() {
            debug!(
                browser = %browser.name,
                executor = %browser.id,
                started = mark.marked,
                "additional executor started"
            );
            return Ok(());
        }

        if let Some(logical) = self.store.get(&browser.name) {
            info!(browser = %logical.alias(), executor = %browser.id, "logical browser started");
            self.relay.relay(LogicalEvent::BrowserStart(logical.alias()));
        }
        Ok(())
    }

    /// Forward a spec result under the logical alias. Results for browsers
    /// with no record in this run are dropped.
    pub fn on_spec_complete(
        &mut self,
        browser: &PhysicalBrowser,
        result: &SpecResult,
    ) -> Result<()> {
        self.ensure_running()?;

        match self.store.get(&browser.name) {
            Some(logical) => {
                self.relay
                    .relay(LogicalEvent::SpecComplete(logical.alias(), result));
            }
            None => {
                warn!(
                    browser = %browser.name,
                    executor = %browser.id,
                    "spec result for unknown browser ignored"
                );
            }
        }
        Ok(())
    }

    /// Record an executor's result; relays `onBrowserComplete` with merged
    /// coverage once `executors` results have arrived.
    #[instrument(skip_all, fields(browser = %browser.name, executor = %browser.id))]
    pub fn on_browser_complete(
        &mut self,
        browser: &PhysicalBrowser,
        result: ExecutorResult,
    ) -> Result<()> {
        self.ensure_running()?;

        let finished = match self.store.mark_finished(&browser.name, &browser.id, result) {
            Ok(Some(finished)) => finished,
            Ok(None) => {
                warn!("completion for unknown browser ignored");
                return Ok(());
            }
            Err(e) => return Err(self.abort(e)),
        };

        let expected = self.options.executors;
        if finished < expected {
            debug!(finished, expected, "waiting for remaining executors");
            return Ok(());
        }
        if finished > expected {
            warn!(finished, expected, "late executor completion after logical browser completed");
            return Ok(());
        }

        let coverage = self
            .store
            .merged_coverage(&browser.name)
            .map_err(|e| self.abort(e))?;
        self.store.mark_complete(&browser.name);

        if let Some(logical) = self.store.get(&browser.name) {
            info!(alias = %logical.alias(), files = coverage.len(), "logical browser complete");
            let payload = BrowserCompleteResult { coverage };
            self.relay
                .relay(LogicalEvent::BrowserComplete(logical.alias(), &payload));
        }
        Ok(())
    }

    /// Relay `onRunComplete` with the distinct aliases of the browsers that
    /// started, in first-occurrence order of `browsers`.
    pub fn on_run_complete<'a, I>(&mut self, browsers: I, results: &RunResults)
    where
        I: IntoIterator<Item = &'a PhysicalBrowser>,
    {
        let browsers: Vec<&PhysicalBrowser> = browsers.into_iter().collect();
        let aliases = self
            .store
            .all_logical_aliases(browsers.iter().map(|b| b.name.as_str()));

        info!(
            run_id = %self.store.run_id(),
            browsers = aliases.len(),
            success = results.success,
            failed = results.failed,
            aborted = self.aborted.is_some(),
            "coverage run complete"
        );
        self.relay
            .relay(LogicalEvent::RunComplete(&aliases, results));
    }

    /// Relay `onExit` and wait until every participating reporter signals.
    pub async fn on_exit(&mut self) -> Result<()> {
        self.relay.relay_exit().await?;
        debug!("all reporters signalled exit");
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        match &self.aborted {
            Some(reason) => Err(AggregationError::RunAborted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn abort(&mut self, err: AggregationError) -> AggregationError {
        if err.is_fatal_to_run() {
            error!(
                run_id = %self.store.run_id(),
                error = %err,
                "aborting coverage aggregation for run"
            );
            self.aborted = Some(err.to_string());
        }
        err
    }
}
