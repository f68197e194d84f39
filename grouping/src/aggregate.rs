//! Per-branch error aggregation for fan-out operations.
//!
//! Failures collected across many targets are grouped by equality (kind and
//! message) and surfaced as one combined failure at a well-defined join
//! point, instead of throwing away all but the first branch error.

use crate::errors::GroupingError;
use indexmap::IndexMap;

/// One group of equal errors with the targets they affected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureGroup {
    pub targets: Vec<String>,
    pub kind: &'static str,
    pub message: String,
}

/// The combined failure raised when a fan-out had failing branches. The
/// individual classification stays introspectable through [`Self::groups`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatedFailure {
    groups: Vec<FailureGroup>,
}

impl AggregatedFailure {
    pub fn groups(&self) -> &[FailureGroup] {
        &self.groups
    }
}

impl std::fmt::Display for AggregatedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for group in &self.groups {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{:?} - {}", group.targets, group.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedFailure {}

/// Accumulates `(error, target)` pairs, grouping equal errors.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    errors: IndexMap<(&'static str, String), Vec<String>>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: &GroupingError, target: impl Into<String>) {
        self.errors
            .entry((error.kind(), error.to_string()))
            .or_default()
            .push(target.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Closes the aggregation: no errors is a no-op, anything else surfaces
    /// one combined failure listing the affected targets per distinct error.
    pub fn check(self) -> Result<(), GroupingError> {
        if self.errors.is_empty() {
            return Ok(());
        }

        let groups = self
            .errors
            .into_iter()
            .map(|((kind, message), targets)| FailureGroup {
                targets,
                kind,
                message,
            })
            .collect();

        Err(GroupingError::Aggregated(AggregatedFailure { groups }))
    }
}
