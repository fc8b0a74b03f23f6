use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::purchase_request::{ApprovalWorkflow, QuoteId};

/// Result of comparing the two approvers' quote selections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictResolution {
    /// At least one approver has not selected a quote yet.
    AwaitingSelection,
    /// Both approvers selected, and the selections differ.
    Conflict {
        first: QuoteId,
        second: QuoteId,
        started_at: DateTime<Utc>,
        newly_detected: bool,
    },
    /// Both approvers agree on the same quote.
    Agreed { quote_id: QuoteId, was_in_conflict: bool },
}

/// Reconciles dual-approver quote selections on an approval workflow.
///
/// There is no forced resolution: a conflict clears only when one approver
/// re-selects to match the other.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuoteConflictResolver;

impl QuoteConflictResolver {
    pub fn resolve(&self, workflow: &mut ApprovalWorkflow, at: DateTime<Utc>) -> ConflictResolution {
        let (first, second) = match (
            workflow.first_approver_selected_quote_id.clone(),
            workflow.second_approver_selected_quote_id.clone(),
        ) {
            (Some(first), Some(second)) => (first, second),
            _ => {
                workflow.quote_conflict = false;
                return ConflictResolution::AwaitingSelection;
            }
        };

        if first != second {
            let newly_detected = !workflow.quote_conflict;
            if newly_detected {
                workflow.last_updated = Some(at);
            }
            workflow.quote_conflict = true;
            workflow.first_approval_complete = false;
            workflow.second_approval_complete = false;
            return ConflictResolution::Conflict {
                first,
                second,
                started_at: workflow.last_updated.unwrap_or(at),
                newly_detected,
            };
        }

        let was_in_conflict = workflow.quote_conflict;
        workflow.quote_conflict = false;
        workflow.first_approval_complete = true;
        workflow.second_approval_complete = true;
        workflow.last_updated = Some(at);
        ConflictResolution::Agreed { quote_id: first, was_in_conflict }
    }

    /// Whole days a workflow has been in conflict, measured from the conflict start stamp.
    pub fn days_in_conflict(&self, workflow: &ApprovalWorkflow, now: DateTime<Utc>) -> i64 {
        if !workflow.quote_conflict {
            return 0;
        }
        workflow.last_updated.map(|started| (now - started).num_days().max(0)).unwrap_or(0)
    }
}
