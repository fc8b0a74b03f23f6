use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::organization::OrganizationId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(pub String);

impl std::fmt::Display for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalReason {
    #[serde(rename = "auto_3quote")]
    AutoThreeQuote,
    AutoCompleted,
    Manual,
}

impl ApprovalReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoThreeQuote => "auto_3quote",
            Self::AutoCompleted => "auto_completed",
            Self::Manual => "manual",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorApprovalEventKind {
    Approved,
    Deapproved,
    Expired,
    HighValueExpired,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VendorApprovalEvent {
    pub kind: VendorApprovalEventKind,
    #[serde(default)]
    pub reason: Option<ApprovalReason>,
    pub actor: UserId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub justification: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Vendor {
    pub id: VendorId,
    pub organization_id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub approval_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approval_expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approval_reason: Option<ApprovalReason>,
    #[serde(default)]
    pub is_high_value: bool,
    #[serde(default)]
    pub cumulative_order_value: Decimal,
    #[serde(default, rename = "last3QuoteProcessDate")]
    pub last_3quote_process_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_completed_order_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approval_history: Vec<VendorApprovalEvent>,
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Vendor {
    pub fn new(
        id: VendorId,
        organization_id: OrganizationId,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            organization_id,
            name: name.into(),
            contact_email: None,
            is_approved: false,
            approval_date: None,
            approval_expiry_date: None,
            approval_reason: None,
            is_high_value: false,
            cumulative_order_value: Decimal::ZERO,
            last_3quote_process_date: None,
            last_completed_order_date: None,
            approval_history: Vec::new(),
            version: 0,
            updated_at: created_at,
        }
    }

    pub fn has_track_record(&self) -> bool {
        self.last_completed_order_date.is_some() || self.last_3quote_process_date.is_some()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ApprovalReason, Vendor, VendorId};
    use crate::domain::organization::OrganizationId;

    #[test]
    fn approval_reason_uses_legacy_wire_names() {
        let json = serde_json::to_string(&ApprovalReason::AutoThreeQuote).expect("serialize");
        assert_eq!(json, "\"auto_3quote\"");
        let parsed: ApprovalReason = serde_json::from_str("\"auto_completed\"").expect("parse");
        assert_eq!(parsed, ApprovalReason::AutoCompleted);
    }

    #[test]
    fn vendor_document_keeps_three_quote_field_name() {
        let mut vendor = Vendor::new(
            VendorId("v-1".to_string()),
            OrganizationId("org-1".to_string()),
            "Acme Supplies",
            Utc::now(),
        );
        vendor.last_3quote_process_date = Some(Utc::now());
        let value = serde_json::to_value(&vendor).expect("serialize");
        assert!(value.get("last3QuoteProcessDate").is_some());
        assert!(vendor.has_track_record());
    }
}
