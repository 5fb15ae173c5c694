//! Per-run aggregation state: which executors of each logical browser have
//! started and which have reported their results.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use crate::alias::{resolve_alias, BrowserAlias};
use crate::coverage::{merge_coverage_maps, CoverageMap};
use crate::error::{AggregationError, Result};
use crate::events::ExecutorResult;

/// What is known about one executor of a logical browser.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorSlot {
    Unstarted,
    Finished(ExecutorResult),
}

impl ExecutorSlot {
    pub fn is_finished(&self) -> bool {
        matches!(self, ExecutorSlot::Finished(_))
    }
}

/// Lifecycle of a logical browser within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserPhase {
    /// No executor has started yet.
    Unseen,
    /// At least one executor started; not all have finished.
    Starting,
    /// The logical completion has been emitted.
    Complete,
}

/// Aggregate record for one logical browser.
#[derive(Debug, Clone)]
pub struct LogicalBrowser {
    alias: BrowserAlias,
    real: BTreeMap<String, ExecutorSlot>,
    completed: bool,
}

impl LogicalBrowser {
    fn new(alias: BrowserAlias) -> Self {
        Self {
            alias,
            real: BTreeMap::new(),
            completed: false,
        }
    }

    pub fn alias(&self) -> &BrowserAlias {
        &self.alias
    }

    /// Executor slots keyed by executor id.
    pub fn executors(&self) -> &BTreeMap<String, ExecutorSlot> {
        &self.real
    }

    /// Executors that have started or finished.
    pub fn marked_count(&self) -> usize {
        self.real.len()
    }

    pub fn finished_count(&self) -> usize {
        self.real.values().filter(|slot| slot.is_finished()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.marked_count() - self.finished_count()
    }

    pub fn phase(&self) -> BrowserPhase {
        if self.completed {
            BrowserPhase::Complete
        } else {
            BrowserPhase::Starting
        }
    }
}

/// Outcome of [`AggregationStore::mark_started`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartMark {
    /// False when the executor was already known.
    pub inserted: bool,
    /// Executors marked (started or finished) after this call.
    pub marked: usize,
}

impl StartMark {
    /// True only for the first executor of a logical browser.
    pub fn is_first(&self) -> bool {
        self.inserted && self.marked == 1
    }
}

/// Owns all logical browser records for the current run.
#[derive(Debug)]
pub struct AggregationStore {
    alias_table: BTreeMap<String, String>,
    browsers: HashMap<String, LogicalBrowser>,
    run_id: Uuid,
}

impl AggregationStore {
    /// Create an empty store resolving aliases through `alias_table`.
    pub fn new(alias_table: BTreeMap<String, String>) -> Self {
        Self {
            alias_table,
            browsers: HashMap::new(),
            run_id: Uuid::new_v4(),
        }
    }

    /// Identifier of the current run, regenerated on every reset.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Drop all state from the previous run.
    pub fn reset(&mut self) {
        let discarded = self.browsers.len();
        self.browsers.clear();
        self.run_id = Uuid::new_v4();
        debug!(run_id = %self.run_id, discarded, "aggregation state reset");
    }

    pub fn get(&self, name: &str) -> Option<&LogicalBrowser> {
        self.browsers.get(name)
    }

    pub fn phase(&self, name: &str) -> BrowserPhase {
        self.browsers
            .get(name)
            .map(LogicalBrowser::phase)
            .unwrap_or(BrowserPhase::Unseen)
    }

    /// Return the record for `name`, creating it with a resolved alias on
    /// first use.
    pub fn ensure_logical_browser(&mut self, name: &str) -> &mut LogicalBrowser {
        let table = &self.alias_table;
        self.browsers
            .entry(name.to_string())
            .or_insert_with(|| LogicalBrowser::new(resolve_alias(table, name)))
    }

    /// Mark an executor as started. A repeated start for the same executor
    /// leaves its slot untouched.
    pub fn mark_started(&mut self, name: &str, executor_id: &str) -> StartMark {
        let browser = self.ensure_logical_browser(name);
        let inserted = !browser.real.contains_key(executor_id);
        if inserted {
            browser
                .real
                .insert(executor_id.to_string(), ExecutorSlot::Unstarted);
        }
        StartMark {
            inserted,
            marked: browser.marked_count(),
        }
    }

    /// Record an executor's result and return how many executors of the
    /// logical browser have finished.
    ///
    /// Fails with `DuplicateCompletion` if the executor already finished.
    /// Returns `None` when the logical browser has no record in this run.
    pub fn mark_finished(
        &mut self,
        name: &str,
        executor_id: &str,
        result: ExecutorResult,
    ) -> Result<Option<usize>> {
        let Some(browser) = self.browsers.get_mut(name) else {
            return Ok(None);
        };

        if let Some(ExecutorSlot::Finished(_)) = browser.real.get(executor_id) {
            return Err(AggregationError::DuplicateCompletion {
                browser: name.to_string(),
                executor: executor_id.to_string(),
            });
        }

        browser
            .real
            .insert(executor_id.to_string(), ExecutorSlot::Finished(result));
        Ok(Some(browser.finished_count()))
    }

    /// Flag the logical browser's completion as emitted.
    pub fn mark_complete(&mut self, name: &str) {
        if let Some(browser) = self.browsers.get_mut(name) {
            browser.completed = true;
        }
    }

    /// Merge the coverage of every executor of `name`.
    ///
    /// Fails with `IncompleteAggregate` while any executor is unfinished.
    pub fn merged_coverage(&self, name: &str) -> Result<CoverageMap> {
        let Some(browser) = self.browsers.get(name) else {
            return Ok(CoverageMap::new());
        };

        let pending = browser.pending_count();
        if pending > 0 {
            return Err(AggregationError::IncompleteAggregate {
                browser: name.to_string(),
                pending,
            });
        }

        merge_coverage_maps(browser.real.values().filter_map(|slot| match slot {
            ExecutorSlot::Finished(result) => Some(&result.coverage),
            ExecutorSlot::Unstarted => None,
        }))
    }

    /// Aliases for `names`, deduplicated in first-occurrence order, skipping
    /// names that never started in this run.
    pub fn all_logical_aliases<'a, I>(&self, names: I) -> Vec<BrowserAlias>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        names
            .into_iter()
            .filter(|name| seen.insert(*name))
            .filter_map(|name| self.browsers.get(name))
            .map(|browser| browser.alias.clone())
            .collect()
    }
}
