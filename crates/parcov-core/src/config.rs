//! Parallel execution options.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Options shared by every run of the aggregator.
///
/// Keys are camelCase so the same block can be lifted from an existing
/// `parallelOptions` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelOptions {
    /// Executors expected to report for each logical browser.
    pub executors: usize,

    /// Logical browser name -> externally visible id.
    #[serde(default)]
    pub browser_id_alias: BTreeMap<String, String>,

    /// Reporter names to instantiate, in relay order.
    #[serde(default)]
    pub coverage_reporters: Vec<String>,
}

impl ParallelOptions {
    pub fn new(executors: usize) -> Self {
        Self {
            executors,
            browser_id_alias: BTreeMap::new(),
            coverage_reporters: Vec::new(),
        }
    }

    pub fn with_alias(mut self, browser: impl Into<String>, id: impl Into<String>) -> Self {
        self.browser_id_alias.insert(browser.into(), id.into());
        self
    }

    pub fn with_reporter(mut self, name: impl Into<String>) -> Self {
        self.coverage_reporters.push(name.into());
        self
    }

    /// Load options from a `.toml` file, or JSON for any other extension,
    /// and validate them.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let options: ParallelOptions = if is_toml {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        debug!(path = %path.display(), executors = options.executors, "loaded parallel options");

        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executors == 0 {
            return Err(ConfigError::InvalidExecutors(self.executors));
        }

        let mut seen = HashSet::new();
        for name in &self.coverage_reporters {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyReporterName);
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateReporter(name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builder() {
        let options = ParallelOptions::new(2)
            .with_alias("Chrome", "C1")
            .with_reporter("html");
        assert_eq!(options.browser_id_alias["Chrome"], "C1");
        assert_eq!(options.coverage_reporters, vec!["html".to_string()]);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_executors_rejected() {
        let err = ParallelOptions::new(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidExecutors(0)));
    }

    #[test]
    fn test_duplicate_reporter_rejected() {
        let err = ParallelOptions::new(1)
            .with_reporter("lcov")
            .with_reporter("lcov")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateReporter(name) if name == "lcov"));
    }

    #[test]
    fn test_blank_reporter_rejected() {
        let err = ParallelOptions::new(1).with_reporter(" ").validate().unwrap_err();
        assert!(matches!(err, ConfigError::EmptyReporterName));
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
executors = 3
coverageReporters = ["json-lines"]

[browserIdAlias]
Chrome = "C1"
"#
        )
        .unwrap();

        let options = ParallelOptions::from_path(file.path()).expect("load toml");
        assert_eq!(options.executors, 3);
        assert_eq!(options.browser_id_alias["Chrome"], "C1");
        assert_eq!(options.coverage_reporters, vec!["json-lines".to_string()]);
    }

    #[test]
    fn test_load_json_defaults() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "executors": 2 }}"#).unwrap();

        let options = ParallelOptions::from_path(file.path()).expect("load json");
        assert_eq!(options, ParallelOptions::new(2));
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "executors": 0 }}"#).unwrap();

        let err = ParallelOptions::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidExecutors(0)));
    }
}
