//! Named reporter factories.
//!
//! `coverageReporters` in the configuration lists reporter names; the
//! registry turns each name into a live reporter, in listed order.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use tracing::debug;

use crate::config::ParallelOptions;
use crate::error::{AggregationError, Result};
use crate::relay::CoverageReporter;
use crate::reporters::JsonLinesReporter;

/// Name of the built-in reporter that writes JSON lines to stdout.
pub const JSON_LINES_REPORTER: &str = "json-lines";

type ReporterFactory = Box<dyn Fn(&ParallelOptions) -> Box<dyn CoverageReporter> + Send + Sync>;

/// Maps reporter names to factories.
#[derive(Default)]
pub struct ReporterRegistry {
    factories: BTreeMap<String, ReporterFactory>,
}

impl ReporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the reporters shipped in this crate:
    /// - `json-lines`: logical events as JSON lines on stdout
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(JSON_LINES_REPORTER, |_| {
            Box::new(JsonLinesReporter::new(JSON_LINES_REPORTER, io::stdout()))
        });
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ParallelOptions) -> Box<dyn CoverageReporter> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build one reporter per entry of `options.coverage_reporters`.
    pub fn instantiate(&self, options: &ParallelOptions) -> Result<Vec<Box<dyn CoverageReporter>>> {
        options
            .coverage_reporters
            .iter()
            .map(|name| {
                let factory = self
                    .factories
                    .get(name)
                    .ok_or_else(|| AggregationError::UnknownReporter(name.clone()))?;
                debug!("instantiating reporter:{}", name);
                Ok(factory(options))
            })
            .collect()
    }
}

impl fmt::Debug for ReporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterRegistry")
            .field("names", &self.names())
            .finish()
    }
}
