//! Per-file coverage records and the combiner that merges them.
//!
//! Records follow the istanbul file-coverage layout (`statementMap`, `fnMap`,
//! `branchMap` plus the `s`/`f`/`b`/`l` hit counters). Only the counters are
//! interpreted; location maps for functions and branches are carried as
//! opaque JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AggregationError, Result};

/// Coverage for a set of files, keyed by file path.
pub type CoverageMap = BTreeMap<String, FileCoverage>;

/// A source position (1-based line, 0-based column).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// Location of an instrumented statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatementLocation {
    pub start: Position,
    pub end: Position,
    /// Statement excluded from coverage via an ignore hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<bool>,
}

/// Coverage record for a single source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub statement_map: BTreeMap<String, StatementLocation>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fn_map: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub branch_map: BTreeMap<String, Value>,

    /// Statement hit counts.
    #[serde(default)]
    pub s: BTreeMap<String, u64>,

    /// Function hit counts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub f: BTreeMap<String, u64>,

    /// Branch hit counts, one entry per branch arm.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub b: BTreeMap<String, Vec<u64>>,

    /// Line hit counts, keyed by line number.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub l: BTreeMap<String, u64>,

    /// Any other fields the instrumenter emitted (hashes, source maps).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl FileCoverage {
    /// Fold `other` into `self`, summing every hit counter.
    ///
    /// Location maps are unioned; where both sides describe the same id the
    /// existing entry is kept. Line counts are re-derived from the statement
    /// map when one is present, otherwise the two `l` maps are summed by key.
    pub fn merge(&mut self, other: &FileCoverage) {
        if self.path.is_none() {
            self.path = other.path.clone();
        }

        union_missing(&mut self.statement_map, &other.statement_map);
        union_missing(&mut self.fn_map, &other.fn_map);
        union_missing(&mut self.branch_map, &other.branch_map);

        add_counts(&mut self.s, &other.s);
        add_counts(&mut self.f, &other.f);

        for (id, arms) in &other.b {
            let ours = self.b.entry(id.clone()).or_default();
            if ours.len() < arms.len() {
                ours.resize(arms.len(), 0);
            }
            for (slot, hits) in ours.iter_mut().zip(arms) {
                *slot = slot.saturating_add(*hits);
            }
        }

        if self.statement_map.is_empty() {
            add_counts(&mut self.l, &other.l);
        } else {
            self.l = self.derive_line_counts();
        }

        for (key, value) in &other.extra {
            self.extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Compute per-line hit counts from the statement map: the highest count
    /// of any statement starting on a line wins. Skipped statements that were
    /// never hit count as covered.
    pub fn derive_line_counts(&self) -> BTreeMap<String, u64> {
        let mut lines = BTreeMap::new();
        for (id, location) in &self.statement_map {
            let mut count = self.s.get(id).copied().unwrap_or(0);
            if count == 0 && location.skip == Some(true) {
                count = 1;
            }
            let entry = lines.entry(location.start.line.to_string()).or_insert(count);
            if *entry < count {
                *entry = count;
            }
        }
        lines
    }

    /// Number of statements with at least one hit.
    pub fn covered_statements(&self) -> usize {
        self.s.values().filter(|hits| **hits > 0).count()
    }
}

fn add_counts(into: &mut BTreeMap<String, u64>, from: &BTreeMap<String, u64>) {
    for (id, hits) in from {
        let slot = into.entry(id.clone()).or_insert(0);
        *slot = slot.saturating_add(*hits);
    }
}

fn union_missing<V: Clone>(into: &mut BTreeMap<String, V>, from: &BTreeMap<String, V>) {
    for (key, value) in from {
        into.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

/// Combine two optional coverage records for the file at `path`.
///
/// One side present: returned unchanged. Both absent: the caller has a
/// bookkeeping bug and `InvariantViolation` is returned.
pub fn combine(
    path: &str,
    a: Option<FileCoverage>,
    b: Option<FileCoverage>,
) -> Result<FileCoverage> {
    match (a, b) {
        (Some(mut a), Some(b)) => {
            a.merge(&b);
            Ok(a)
        }
        (Some(only), None) | (None, Some(only)) => Ok(only),
        (None, None) => Err(AggregationError::InvariantViolation {
            path: path.to_string(),
        }),
    }
}

/// Merge several coverage maps file-by-file.
pub fn merge_coverage_maps<'a, I>(maps: I) -> Result<CoverageMap>
where
    I: IntoIterator<Item = &'a CoverageMap>,
{
    let mut merged = CoverageMap::new();
    for map in maps {
        for (path, file) in map {
            let existing = merged.remove(path);
            let combined = combine(path, existing, Some(file.clone()))?;
            merged.insert(path.clone(), combined);
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn statements(counts: &[(&str, u64)]) -> FileCoverage {
        FileCoverage {
            s: counts
                .iter()
                .map(|(id, hits)| (id.to_string(), *hits))
                .collect(),
            ..Default::default()
        }
    }

    fn located(line: u32) -> StatementLocation {
        StatementLocation {
            start: Position { line, column: 0 },
            end: Position { line, column: 10 },
            skip: None,
        }
    }

    #[test]
    fn test_combine_sums_statement_hits() {
        let merged = combine("a.js", Some(statements(&[("0", 1)])), Some(statements(&[("0", 2)])))
            .expect("combine failed");
        assert_eq!(merged.s.get("0"), Some(&3));
    }

    #[test]
    fn test_combine_single_side_passthrough() {
        let only = statements(&[("0", 4), ("1", 0)]);
        assert_eq!(combine("a.js", Some(only.clone()), None).unwrap(), only);
        assert_eq!(combine("a.js", None, Some(only.clone())).unwrap(), only);
    }

    #[test]
    fn test_combine_both_absent_is_invariant_violation() {
        let err = combine("lib/a.js", None, None).unwrap_err();
        match err {
            AggregationError::InvariantViolation { path } => assert_eq!(path, "lib/a.js"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_branch_arms_summed_and_extended() {
        let mut a = FileCoverage::default();
        a.b.insert("0".to_string(), vec![1, 0]);
        let mut b = FileCoverage::default();
        b.b.insert("0".to_string(), vec![2, 3, 1]);
        b.b.insert("1".to_string(), vec![0, 1]);

        a.merge(&b);
        assert_eq!(a.b["0"], vec![3, 3, 1]);
        assert_eq!(a.b["1"], vec![0, 1]);
    }

    #[test]
    fn test_line_counts_derived_from_statement_map() {
        let mut a = statements(&[("0", 1), ("1", 0)]);
        a.statement_map.insert("0".to_string(), located(1));
        a.statement_map.insert("1".to_string(), located(2));
        let mut b = statements(&[("0", 0), ("1", 5)]);
        b.statement_map = a.statement_map.clone();

        a.merge(&b);
        assert_eq!(a.l.get("1"), Some(&1));
        assert_eq!(a.l.get("2"), Some(&5));
    }

    #[test]
    fn test_skipped_statement_counts_as_covered_line() {
        let mut file = statements(&[("0", 0)]);
        let mut location = located(7);
        location.skip = Some(true);
        file.statement_map.insert("0".to_string(), location);

        assert_eq!(file.derive_line_counts().get("7"), Some(&1));
    }

    #[test]
    fn test_line_maps_unioned_without_statement_map() {
        let mut a = FileCoverage::default();
        a.l.insert("1".to_string(), 2);
        let mut b = FileCoverage::default();
        b.l.insert("1".to_string(), 1);
        b.l.insert("4".to_string(), 1);

        a.merge(&b);
        assert_eq!(a.l.get("1"), Some(&3));
        assert_eq!(a.l.get("4"), Some(&1));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let x: CoverageMap = [("a.js".to_string(), statements(&[("0", 1), ("1", 0)]))].into();
        let y: CoverageMap = [
            ("a.js".to_string(), statements(&[("0", 2)])),
            ("b.js".to_string(), statements(&[("0", 1)])),
        ]
        .into();
        let z: CoverageMap = [("b.js".to_string(), statements(&[("0", 7)]))].into();

        let forward = merge_coverage_maps([&x, &y, &z]).unwrap();
        let backward = merge_coverage_maps([&z, &y, &x]).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward["a.js"].s["0"], 3);
        assert_eq!(forward["b.js"].s["0"], 8);
    }

    #[test]
    fn test_deserialize_istanbul_record() {
        let raw = json!({
            "path": "/src/a.js",
            "hash": "abc",
            "statementMap": {
                "0": { "start": { "line": 1, "column": 0 }, "end": { "line": 1, "column": 12 } }
            },
            "fnMap": { "0": { "name": "main", "line": 1 } },
            "branchMap": {},
            "s": { "0": 1 },
            "f": { "0": 1 },
            "b": {}
        });
        let file: FileCoverage = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(file.path.as_deref(), Some("/src/a.js"));
        assert_eq!(file.statement_map["0"].start.line, 1);
        assert_eq!(file.extra.get("hash"), Some(&json!("abc")));
        assert_eq!(file.covered_statements(), 1);
    }
}
