use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::organization::OrganizationId;
use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::rules::Decision;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseRequestId(pub String);

impl std::fmt::Display for PurchaseRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrStatus {
    Draft,
    Submitted,
    InQueue,
    PendingApproval,
    Approved,
    Ordered,
    Completed,
    RevisionRequired,
    Rejected,
    Canceled,
}

impl PrStatus {
    pub const ALL: [PrStatus; 10] = [
        PrStatus::Draft,
        PrStatus::Submitted,
        PrStatus::InQueue,
        PrStatus::PendingApproval,
        PrStatus::Approved,
        PrStatus::Ordered,
        PrStatus::Completed,
        PrStatus::RevisionRequired,
        PrStatus::Rejected,
        PrStatus::Canceled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitted => "SUBMITTED",
            Self::InQueue => "IN_QUEUE",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Ordered => "ORDERED",
            Self::Completed => "COMPLETED",
            Self::RevisionRequired => "REVISION_REQUIRED",
            Self::Rejected => "REJECTED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for PrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        PrStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| DomainError::Validation(format!("unknown purchase request status `{value}`")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverSlot {
    First,
    Second,
}

impl std::fmt::Display for ApproverSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Second => f.write_str("second"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VendorQuote {
    pub id: QuoteId,
    pub vendor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatusHistoryEntry {
    pub status: PrStatus,
    pub timestamp: DateTime<Utc>,
    pub user: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub out_of_sequence: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    QuoteSelected,
    Approved,
    Rejected,
    RevisionRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApprovalHistoryEntry {
    pub approver: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<ApproverSlot>,
    pub action: ApprovalAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<QuoteId>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApprovalWorkflow {
    #[serde(default)]
    pub current_approver: Option<UserId>,
    #[serde(default)]
    pub second_approver: Option<UserId>,
    #[serde(default)]
    pub requires_dual_approval: bool,
    #[serde(default)]
    pub first_approval_complete: bool,
    #[serde(default)]
    pub second_approval_complete: bool,
    #[serde(default)]
    pub quote_conflict: bool,
    #[serde(default)]
    pub first_approver_selected_quote_id: Option<QuoteId>,
    #[serde(default)]
    pub second_approver_selected_quote_id: Option<QuoteId>,
    #[serde(default)]
    pub approval_history: Vec<ApprovalHistoryEntry>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Routing decision for the current approval cycle. Cleared on resubmission.
    #[serde(default)]
    pub decision: Option<Decision>,
}

impl ApprovalWorkflow {
    pub fn selection(&self, slot: ApproverSlot) -> Option<&QuoteId> {
        match slot {
            ApproverSlot::First => self.first_approver_selected_quote_id.as_ref(),
            ApproverSlot::Second => self.second_approver_selected_quote_id.as_ref(),
        }
    }

    pub fn assignee(&self, slot: ApproverSlot) -> Option<&UserId> {
        match slot {
            ApproverSlot::First => self.current_approver.as_ref(),
            ApproverSlot::Second => self.second_approver.as_ref(),
        }
    }

    /// Approvers that still owe an action on this request.
    pub fn outstanding_approvers(&self) -> Vec<&UserId> {
        let mut outstanding = Vec::new();
        if let Some(first) = &self.current_approver {
            if !self.first_approval_complete {
                outstanding.push(first);
            }
        }
        if self.requires_dual_approval {
            if let Some(second) = &self.second_approver {
                if !self.second_approval_complete && !outstanding.contains(&second) {
                    outstanding.push(second);
                }
            }
        }
        outstanding
    }

    fn conflict_invariant_holds(&self) -> bool {
        let expected = match (
            &self.first_approver_selected_quote_id,
            &self.second_approver_selected_quote_id,
        ) {
            (Some(first), Some(second)) => first != second,
            _ => false,
        };
        self.quote_conflict == expected
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PurchaseRequest {
    pub id: PurchaseRequestId,
    pub pr_number: String,
    pub organization_id: OrganizationId,
    pub requestor: UserId,
    pub status: PrStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub estimated_amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub quotes: Vec<VendorQuote>,
    #[serde(default)]
    pub approver: Option<UserId>,
    #[serde(default)]
    pub approver2: Option<UserId>,
    #[serde(default)]
    pub approval_workflow: ApprovalWorkflow,
    pub status_history: Vec<StatusHistoryEntry>,
    #[serde(default)]
    pub estimated_delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub final_amount: Option<Decimal>,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRequest {
    /// Creates a draft with its opening history entry.
    pub fn draft(
        id: PurchaseRequestId,
        pr_number: impl Into<String>,
        organization_id: OrganizationId,
        requestor: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            pr_number: pr_number.into(),
            organization_id,
            requestor: requestor.clone(),
            status: PrStatus::Draft,
            description: None,
            estimated_amount: None,
            currency: None,
            quotes: Vec::new(),
            approver: None,
            approver2: None,
            approval_workflow: ApprovalWorkflow::default(),
            status_history: vec![StatusHistoryEntry {
                status: PrStatus::Draft,
                timestamp: created_at,
                user: requestor,
                notes: Some("created".to_string()),
                out_of_sequence: false,
            }],
            estimated_delivery_date: None,
            final_amount: None,
            version: 0,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn quote(&self, quote_id: &QuoteId) -> Option<&VendorQuote> {
        self.quotes.iter().find(|quote| &quote.id == quote_id)
    }

    pub fn missing_required_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        match self.estimated_amount {
            Some(amount) if amount > Decimal::ZERO => {}
            _ => missing.push("estimatedAmount".to_string()),
        }
        if self.currency.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            missing.push("currency".to_string());
        }
        if self.description.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            missing.push("description".to_string());
        }
        if self.organization_id.0.trim().is_empty() {
            missing.push("organizationId".to_string());
        }
        missing
    }

    pub fn push_history(
        &mut self,
        status: PrStatus,
        user: &UserId,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.status_history.push(StatusHistoryEntry {
            status,
            timestamp: at,
            user: user.clone(),
            notes,
            out_of_sequence: false,
        });
        self.updated_at = at;
    }

    /// Checks the persisted-document invariants; used when decoding from a store.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        let Some(last) = self.status_history.last() else {
            return Err(DomainError::InvariantViolation(format!(
                "purchase request `{}` has an empty status history",
                self.id.0
            )));
        };
        if last.status != self.status {
            return Err(DomainError::InvariantViolation(format!(
                "purchase request `{}` status {} disagrees with last history entry {}",
                self.id.0, self.status, last.status
            )));
        }
        if !self.approval_workflow.conflict_invariant_holds() {
            return Err(DomainError::InvariantViolation(format!(
                "purchase request `{}` quoteConflict flag disagrees with quote selections",
                self.id.0
            )));
        }
        Ok(())
    }
}
