use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::approvals::ConflictResolution;
use crate::domain::organization::OrganizationId;
use crate::domain::purchase_request::{ApproverSlot, PrStatus, PurchaseRequest, QuoteId};
use crate::domain::user::{PermissionLevel, User, UserId};
use crate::rules::Decision;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Submit,
    Enqueue,
    RouteToApproval,
    Approve,
    Reject,
    RequestRevision,
    MarkOrdered,
    MarkCompleted,
    Cancel,
    RecordOverride,
}

impl std::fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Submit => "submit",
            Self::Enqueue => "enqueue",
            Self::RouteToApproval => "route to approval",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestRevision => "request revision for",
            Self::MarkOrdered => "mark ordered",
            Self::MarkCompleted => "mark completed",
            Self::Cancel => "cancel",
            Self::RecordOverride => "override status of",
        };
        f.write_str(label)
    }
}

/// The authenticated caller of a workflow command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub level: PermissionLevel,
    pub organization_id: OrganizationId,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.level == PermissionLevel::Admin
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            level: user.permission_level,
            organization_id: user.organization_id.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkflowCommand {
    Submit,
    Enqueue,
    RouteToApproval { decision: Decision },
    Approve { slot: ApproverSlot, quote_id: QuoteId },
    Reject { reason: String },
    RequestRevision { notes: String },
    MarkOrdered { estimated_delivery_date: Option<DateTime<Utc>> },
    MarkCompleted { final_amount: Option<Decimal> },
    Cancel { reason: Option<String> },
    RecordOverride { status: PrStatus, notes: String },
}

impl WorkflowCommand {
    pub fn action(&self) -> WorkflowAction {
        match self {
            Self::Submit => WorkflowAction::Submit,
            Self::Enqueue => WorkflowAction::Enqueue,
            Self::RouteToApproval { .. } => WorkflowAction::RouteToApproval,
            Self::Approve { .. } => WorkflowAction::Approve,
            Self::Reject { .. } => WorkflowAction::Reject,
            Self::RequestRevision { .. } => WorkflowAction::RequestRevision,
            Self::MarkOrdered { .. } => WorkflowAction::MarkOrdered,
            Self::MarkCompleted { .. } => WorkflowAction::MarkCompleted,
            Self::Cancel { .. } => WorkflowAction::Cancel,
            Self::RecordOverride { .. } => WorkflowAction::RecordOverride,
        }
    }
}

/// Follow-up work a transition asks the service layer to perform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEffect {
    NotifyProcurement,
    NotifyApprovers,
    NotifyRequestor,
    AwaitingOtherApprover { slot: ApproverSlot },
    QuoteConflictDetected,
    QuoteConflictResolved,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PrStatus,
    pub to: PrStatus,
    pub action: WorkflowAction,
    pub effects: Vec<WorkflowEffect>,
    pub conflict: Option<ConflictResolution>,
}

/// An applied transition: the updated document plus what happened.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub request: PurchaseRequest,
    pub outcome: TransitionOutcome,
}
