//! Core types for declarative reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested state of a resource
///
/// `Enabled` and `Disabled` are `Present` plus a toggle on resources that
/// have one (flag environments, webhooks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredStatus {
    #[default]
    Present,
    Absent,
    Enabled,
    Disabled,
}

impl DesiredStatus {
    /// Check if the resource should exist
    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    /// Check if the resource should be removed
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Resolved toggle value, None when the toggle is left alone
    pub fn toggle(&self) -> Option<bool> {
        match self {
            Self::Enabled => Some(true),
            Self::Disabled => Some(false),
            Self::Present | Self::Absent => None,
        }
    }
}

impl fmt::Display for DesiredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Direction of tail removals when the variation list shrinks
///
/// `Ascending` issues `remove /variations/n` through
/// `remove /variations/old-1` in index order. `Descending` issues them highest
/// index first, which is what a server applying RFC 6902 sequentially needs.
/// Rules, clauses and statements always trim highest index first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalOrder {
    #[default]
    Ascending,
    Descending,
}

/// Options that shape emitted patches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconcileOptions {
    #[serde(default)]
    pub removal_order: RemovalOrder,
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Removed)
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Stop at the first failed resource
    pub fail_fast: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_status_toggle() {
        assert_eq!(DesiredStatus::Enabled.toggle(), Some(true));
        assert_eq!(DesiredStatus::Disabled.toggle(), Some(false));
        assert_eq!(DesiredStatus::Present.toggle(), None);
        assert!(DesiredStatus::Disabled.is_present());
        assert!(DesiredStatus::Absent.is_absent());
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::NoChange);
        summary.add_result(&ApplyResult::Failed { error: "boom".into() });
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.total_changes(), 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_removal_order_default() {
        assert_eq!(ReconcileOptions::default().removal_order, RemovalOrder::Ascending);
    }
}
