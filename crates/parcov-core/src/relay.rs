//! Fan-out of logical lifecycle events to the configured reporters.
//!
//! Reporters declare which hooks they handle through
//! [`CoverageReporter::hooks`]; the relay skips a reporter for any hook it
//! did not declare. Reporters are invoked synchronously in registration
//! order.

use std::fmt;

use futures::future::try_join_all;
use tokio::sync::oneshot;
use tracing::debug;

use crate::alias::BrowserAlias;
use crate::error::{AggregationError, Result};
use crate::events::{BrowserCompleteResult, RunResults, SpecResult};

/// Lifecycle hooks a reporter may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    RunStart,
    BrowserStart,
    SpecComplete,
    BrowserComplete,
    RunComplete,
    Exit,
}

impl LifecycleHook {
    pub const ALL: [LifecycleHook; 6] = [
        LifecycleHook::RunStart,
        LifecycleHook::BrowserStart,
        LifecycleHook::SpecComplete,
        LifecycleHook::BrowserComplete,
        LifecycleHook::RunComplete,
        LifecycleHook::Exit,
    ];

    pub fn method_name(&self) -> &'static str {
        match self {
            LifecycleHook::RunStart => "onRunStart",
            LifecycleHook::BrowserStart => "onBrowserStart",
            LifecycleHook::SpecComplete => "onSpecComplete",
            LifecycleHook::BrowserComplete => "onBrowserComplete",
            LifecycleHook::RunComplete => "onRunComplete",
            LifecycleHook::Exit => "onExit",
        }
    }
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

/// A logical event, as seen by reporters.
#[derive(Debug, Clone, Copy)]
pub enum LogicalEvent<'a> {
    RunStart,
    BrowserStart(&'a BrowserAlias),
    SpecComplete(&'a BrowserAlias, &'a SpecResult),
    BrowserComplete(&'a BrowserAlias, &'a BrowserCompleteResult),
    RunComplete(&'a [BrowserAlias], &'a RunResults),
}

impl LogicalEvent<'_> {
    pub fn hook(&self) -> LifecycleHook {
        match self {
            LogicalEvent::RunStart => LifecycleHook::RunStart,
            LogicalEvent::BrowserStart(_) => LifecycleHook::BrowserStart,
            LogicalEvent::SpecComplete(..) => LifecycleHook::SpecComplete,
            LogicalEvent::BrowserComplete(..) => LifecycleHook::BrowserComplete,
            LogicalEvent::RunComplete(..) => LifecycleHook::RunComplete,
        }
    }
}

/// Completion signal handed to a reporter's `on_exit`.
///
/// The reporter must call [`complete`](ExitHandle::complete) or
/// [`fail`](ExitHandle::fail) exactly once, possibly from another task.
/// Dropping the handle unsignalled is reported as `ExitAbandoned`.
#[derive(Debug)]
pub struct ExitHandle {
    reporter: String,
    tx: oneshot::Sender<std::result::Result<(), String>>,
}

impl ExitHandle {
    fn new(reporter: &str) -> (Self, oneshot::Receiver<std::result::Result<(), String>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                reporter: reporter.to_string(),
                tx,
            },
            rx,
        )
    }

    pub fn reporter(&self) -> &str {
        &self.reporter
    }

    pub fn complete(self) {
        // Receiver gone means the exit wait was already abandoned.
        let _ = self.tx.send(Ok(()));
    }

    pub fn fail(self, message: impl Into<String>) {
        let _ = self.tx.send(Err(message.into()));
    }
}

/// A downstream consumer of the logical event stream.
///
/// Every hook has a no-op default; only hooks listed by [`hooks`] are
/// invoked.
///
/// [`hooks`]: CoverageReporter::hooks
pub trait CoverageReporter: Send {
    /// Name used in logs and in `coverageReporters`.
    fn name(&self) -> &str;

    /// Hooks this reporter handles.
    fn hooks(&self) -> &[LifecycleHook];

    fn on_run_start(&mut self) {}

    fn on_browser_start(&mut self, _browser: &BrowserAlias) {}

    fn on_spec_complete(&mut self, _browser: &BrowserAlias, _result: &SpecResult) {}

    fn on_browser_complete(&mut self, _browser: &BrowserAlias, _result: &BrowserCompleteResult) {}

    fn on_run_complete(&mut self, _browsers: &[BrowserAlias], _results: &RunResults) {}

    fn on_exit(&mut self, done: ExitHandle) {
        done.complete();
    }

    fn handles(&self, hook: LifecycleHook) -> bool {
        self.hooks().contains(&hook)
    }
}

/// Ordered set of reporters receiving relayed events.
#[derive(Default)]
pub struct ReporterRelay {
    reporters: Vec<Box<dyn CoverageReporter>>,
}

impl ReporterRelay {
    pub fn new(reporters: Vec<Box<dyn CoverageReporter>>) -> Self {
        Self { reporters }
    }

    pub fn register(&mut self, reporter: Box<dyn CoverageReporter>) {
        self.reporters.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    pub fn reporter_names(&self) -> Vec<&str> {
        self.reporters.iter().map(|r| r.name()).collect()
    }

    /// Deliver `event` to every reporter that handles its hook. Returns the
    /// number of reporters invoked.
    pub fn relay(&mut self, event: LogicalEvent<'_>) -> usize {
        let hook = event.hook();
        let mut invoked = 0;
        for reporter in self.reporters.iter_mut() {
            if !reporter.handles(hook) {
                continue;
            }
            debug!("relaying {}() on reporter:{}", hook, reporter.name());
            match event {
                LogicalEvent::RunStart => reporter.on_run_start(),
                LogicalEvent::BrowserStart(browser) => reporter.on_browser_start(browser),
                LogicalEvent::SpecComplete(browser, result) => {
                    reporter.on_spec_complete(browser, result)
                }
                LogicalEvent::BrowserComplete(browser, result) => {
                    reporter.on_browser_complete(browser, result)
                }
                LogicalEvent::RunComplete(browsers, results) => {
                    reporter.on_run_complete(browsers, results)
                }
            }
            invoked += 1;
        }
        invoked
    }

    /// Hand an exit handle to every reporter that handles `onExit` and wait
    /// for all of them to signal. The first failure is returned.
    pub async fn relay_exit(&mut self) -> Result<()> {
        let mut pending = Vec::new();
        for reporter in self.reporters.iter_mut() {
            if !reporter.handles(LifecycleHook::Exit) {
                continue;
            }
            debug!("relaying {}() on reporter:{}", LifecycleHook::Exit, reporter.name());
            let name = reporter.name().to_string();
            let (handle, rx) = ExitHandle::new(&name);
            reporter.on_exit(handle);
            pending.push(async move {
                match rx.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(message)) => Err(AggregationError::ReporterExit {
                        reporter: name,
                        message,
                    }),
                    Err(_) => Err(AggregationError::ExitAbandoned { reporter: name }),
                }
            });
        }

        try_join_all(pending).await?;
        Ok(())
    }
}

impl fmt::Debug for ReporterRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterRelay")
            .field("reporters", &self.reporter_names())
            .finish()
    }
}
