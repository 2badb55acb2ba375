//! # Reasoner Configuration

use crate::ReasonerError;
use serde::{Deserialize, Serialize};

/// Reasoner options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerOptions {
    /// Trace every rule application and node check
    pub trace: bool,

    /// Attach the map of merged nodes to each result
    pub merge_tracking: bool,

    /// Log progress every few processed branches
    pub progress_logging: bool,

    /// Ceiling on rule invocations per query
    pub step_limit: Option<usize>,
}

impl Default for ReasonerOptions {
    fn default() -> Self {
        Self {
            trace: false,
            merge_tracking: false,
            progress_logging: false,
            step_limit: None,
        }
    }
}

impl ReasonerOptions {
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_merge_tracking(mut self, merge_tracking: bool) -> Self {
        self.merge_tracking = merge_tracking;
        self
    }

    pub fn with_progress_logging(mut self, progress_logging: bool) -> Self {
        self.progress_logging = progress_logging;
        self
    }

    pub fn with_step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = Some(step_limit);
        self
    }

    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ReasonerError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ReasonerOptions::default();
        assert!(!options.trace);
        assert!(!options.merge_tracking);
        assert_eq!(options.step_limit, None);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let options = ReasonerOptions::from_json(r#"{"merge_tracking": true, "step_limit": 500}"#)
            .unwrap();
        assert!(options.merge_tracking);
        assert!(!options.trace);
        assert_eq!(options.step_limit, Some(500));
        assert!(ReasonerOptions::from_json("{not json").is_err());
    }

    #[test]
    fn test_builders() {
        let options = ReasonerOptions::default()
            .with_trace(true)
            .with_progress_logging(true)
            .with_step_limit(10);
        assert!(options.trace && options.progress_logging);
        assert_eq!(options.step_limit, Some(10));
    }
}
