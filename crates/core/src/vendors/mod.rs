//! Vendor approval lifecycle: approval with reason-specific expiry, manual
//! de-approval, order/three-quote events and expiry classification.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calendar::{add_months, BusinessCalendar};
use crate::domain::organization::{Organization, OrganizationRules, RuleNumber};
use crate::domain::user::UserId;
use crate::domain::vendor::{ApprovalReason, Vendor, VendorApprovalEvent, VendorApprovalEventKind};
use crate::errors::DomainError;

pub mod service;

pub use service::VendorService;

/// Why an approved vendor must be deactivated, if at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryVerdict {
    Current,
    Expired,
    HighValueExpired,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VendorApprovalLifecycle {
    calendar: BusinessCalendar,
}

impl VendorApprovalLifecycle {
    pub fn new(calendar: BusinessCalendar) -> Self {
        Self { calendar }
    }

    pub fn approval_duration_months(reason: ApprovalReason, organization: &Organization) -> u32 {
        match reason {
            ApprovalReason::AutoThreeQuote => organization.vendor_approval_3quote_duration,
            ApprovalReason::AutoCompleted => organization.vendor_approval_completed_duration,
            ApprovalReason::Manual => organization.vendor_approval_manual_duration,
        }
    }

    pub fn approve(
        &self,
        vendor: &Vendor,
        reason: ApprovalReason,
        organization: &Organization,
        actor: &UserId,
        justification: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Vendor, DomainError> {
        let justification = justification.map(str::trim).filter(|text| !text.is_empty());
        if reason == ApprovalReason::Manual && justification.is_none() && !vendor.has_track_record() {
            return Err(DomainError::Validation(format!(
                "manual approval of vendor `{}` without order or three-quote history requires a justification",
                vendor.id
            )));
        }

        let mut updated = vendor.clone();
        let months = Self::approval_duration_months(reason, organization);
        updated.is_approved = true;
        updated.approval_date = Some(at);
        updated.approval_expiry_date = Some(add_months(at, months));
        updated.approval_reason = Some(reason);
        updated.approval_history.push(VendorApprovalEvent {
            kind: VendorApprovalEventKind::Approved,
            reason: Some(reason),
            actor: actor.clone(),
            timestamp: at,
            justification: justification.map(str::to_string),
        });
        updated.updated_at = at;
        Ok(updated)
    }

    pub fn deapprove(
        &self,
        vendor: &Vendor,
        actor: &UserId,
        justification: &str,
        at: DateTime<Utc>,
    ) -> Result<Vendor, DomainError> {
        let justification = justification.trim();
        if justification.is_empty() {
            return Err(DomainError::Validation(format!(
                "de-approving vendor `{}` requires a justification",
                vendor.id
            )));
        }
        if !vendor.is_approved {
            return Err(DomainError::Validation(format!("vendor `{}` is not approved", vendor.id)));
        }
        let mut updated = vendor.clone();
        revoke(&mut updated, VendorApprovalEventKind::Deapproved, actor, Some(justification.to_string()), at);
        Ok(updated)
    }

    /// Accumulates a completed order and re-approves the vendor on its order record.
    pub fn record_completed_order(
        &self,
        vendor: &Vendor,
        order_value: Decimal,
        organization: &Organization,
        rules: &OrganizationRules,
        at: DateTime<Utc>,
    ) -> Result<Vendor, DomainError> {
        if order_value < Decimal::ZERO {
            return Err(DomainError::Validation("order value cannot be negative".to_string()));
        }
        let finance_ceiling = rules.get(RuleNumber::Rule1).ok_or_else(|| {
            DomainError::RulesNotInitialized {
                organization_id: organization.id.clone(),
                missing: vec![RuleNumber::Rule1],
            }
        })?;

        let mut updated = vendor.clone();
        updated.cumulative_order_value += order_value;
        updated.last_completed_order_date = Some(at);
        updated.is_high_value = updated.cumulative_order_value
            >= finance_ceiling.threshold * organization.high_value_vendor_multiplier;
        self.approve(&updated, ApprovalReason::AutoCompleted, organization, &UserId::system(), None, at)
    }

    pub fn record_three_quote_process(
        &self,
        vendor: &Vendor,
        organization: &Organization,
        at: DateTime<Utc>,
    ) -> Result<Vendor, DomainError> {
        let mut updated = vendor.clone();
        updated.last_3quote_process_date = Some(at);
        self.approve(&updated, ApprovalReason::AutoThreeQuote, organization, &UserId::system(), None, at)
    }

    /// Classifies an approved vendor. The high-value rule wins over the stated expiry date.
    pub fn evaluate_expiry(
        &self,
        vendor: &Vendor,
        organization: &Organization,
        now: DateTime<Utc>,
    ) -> ExpiryVerdict {
        if !vendor.is_approved {
            return ExpiryVerdict::Current;
        }
        if vendor.is_high_value && self.high_value_overdue(vendor, organization, now) {
            return ExpiryVerdict::HighValueExpired;
        }
        match vendor.approval_expiry_date {
            Some(expiry) if expiry <= now => ExpiryVerdict::Expired,
            _ => ExpiryVerdict::Current,
        }
    }

    pub fn deactivate(&self, vendor: &Vendor, verdict: ExpiryVerdict, at: DateTime<Utc>) -> Vendor {
        let kind = match verdict {
            ExpiryVerdict::HighValueExpired => VendorApprovalEventKind::HighValueExpired,
            ExpiryVerdict::Expired | ExpiryVerdict::Current => VendorApprovalEventKind::Expired,
        };
        let mut updated = vendor.clone();
        revoke(&mut updated, kind, &UserId::system(), None, at);
        updated
    }

    fn high_value_overdue(&self, vendor: &Vendor, organization: &Organization, now: DateTime<Utc>) -> bool {
        let three_quote_stale = match vendor.last_3quote_process_date {
            Some(last) => {
                self.calendar.months_between(last, now) > organization.vendor_approval_3quote_duration
            }
            None => true,
        };
        let held_too_long = vendor.approval_date.is_some_and(|approved| {
            self.calendar.months_between(approved, now) >= organization.high_value_vendor_max_duration
        });
        three_quote_stale && held_too_long
    }
}

fn revoke(
    vendor: &mut Vendor,
    kind: VendorApprovalEventKind,
    actor: &UserId,
    justification: Option<String>,
    at: DateTime<Utc>,
) {
    vendor.is_approved = false;
    vendor.approval_history.push(VendorApprovalEvent {
        kind,
        reason: vendor.approval_reason,
        actor: actor.clone(),
        timestamp: at,
        justification,
    });
    vendor.updated_at = at;
}
