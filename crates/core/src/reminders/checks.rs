use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::warn;

use super::{organization, ItemOutcome, OrganizationDirectory, ReminderScheduler, SweepItemError, SweepReport, SweepStats};
use crate::domain::notification::{NotificationSubject, NotificationType};
use crate::domain::purchase_request::{PrStatus, PurchaseRequest};
use crate::domain::vendor::Vendor;
use crate::notifications::{DeliveryDelayMessage, Message, QuoteConflictMessage, VendorExpiryMessage};
use crate::scheduler::JobName;
use crate::vendors::ExpiryVerdict;

/// Ordered requests alert once they are more than this many business days past the promised date.
pub const DELIVERY_GRACE_BUSINESS_DAYS: i64 = 3;

impl ReminderScheduler {
    /// Alerts requestor and procurement about overdue deliveries, once per request ever.
    pub async fn delivery_delay_check(&self, now: DateTime<Utc>) -> SweepReport {
        let job = JobName::DeliveryDelayCheck;
        let mut listing = match self.ports.purchase_requests.list_by_status(&[PrStatus::Ordered]).await {
            Ok(listing) => listing,
            Err(cause) => return SweepReport::aborted(job, now, cause),
        };
        let mut stats = SweepStats::scanning(job, &mut listing);
        let requests = listing.documents;
        let organizations = self.organizations(requests.iter().map(|pr| &pr.organization_id)).await;

        let results =
            join_all(requests.iter().map(|request| self.delivery_item(request, &organizations, now))).await;
        for result in results {
            stats.record(job, result);
        }
        self.finish(job, now, stats)
    }

    async fn delivery_item(
        &self,
        request: &PurchaseRequest,
        organizations: &OrganizationDirectory,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, SweepItemError> {
        let item_id = request.id.0.as_str();
        let Some(promised) = request.estimated_delivery_date else {
            return Ok(ItemOutcome::Skipped);
        };
        let overdue = self.calendar.business_days_between(promised, now);
        if overdue <= DELIVERY_GRACE_BUSINESS_DAYS {
            return Ok(ItemOutcome::Skipped);
        }

        let subject = NotificationSubject::PurchaseRequest(request.id.clone());
        let already_sent = self
            .ports
            .notification_logs
            .has_sent(NotificationType::DeliveryDelay, &subject)
            .await
            .map_err(|cause| SweepItemError::new(item_id, cause))?;
        if already_sent {
            return Ok(ItemOutcome::Skipped);
        }

        let organization = organization(organizations, &request.organization_id, item_id)?;
        let procurement: Vec<String> = organization.procurement_email.iter().cloned().collect();
        let requestor = self
            .email_of(&request.requestor)
            .await
            .map_err(|cause| SweepItemError::new(item_id, cause))?;
        let (to, cc) = match requestor {
            Some(email) => (vec![email], procurement),
            None => (procurement, Vec::new()),
        };
        if to.is_empty() {
            return Ok(ItemOutcome::Skipped);
        }

        let message = Message::DeliveryDelay(DeliveryDelayMessage {
            pr_number: request.pr_number.clone(),
            description: request.description.clone().unwrap_or_default(),
            estimated_delivery: self.calendar.local_date(promised).to_string(),
            business_days_overdue: overdue,
        });
        self.notifier
            .notify(subject, to, cc, &message, now)
            .await
            .map(|_| ItemOutcome::Notified)
            .map_err(|cause| SweepItemError::new(item_id, cause))
    }

    /// Deactivates expired vendors, then tells procurement.
    ///
    /// The deactivation is written first: a vendor whose write failed stays
    /// approved and is retried next run without having been announced, and a
    /// deactivated vendor drops out of the next run's query.
    pub async fn vendor_expiry_check(&self, now: DateTime<Utc>) -> SweepReport {
        let job = JobName::VendorExpiryCheck;
        let mut listing = match self.ports.vendors.list_approved().await {
            Ok(listing) => listing,
            Err(cause) => return SweepReport::aborted(job, now, cause),
        };
        let mut stats = SweepStats::scanning(job, &mut listing);
        let vendors = listing.documents;
        let organizations = self.organizations(vendors.iter().map(|vendor| &vendor.organization_id)).await;

        let results =
            join_all(vendors.iter().map(|vendor| self.expiry_item(vendor, &organizations, now))).await;
        for result in results {
            stats.record(job, result);
        }
        self.finish(job, now, stats)
    }

    async fn expiry_item(
        &self,
        vendor: &Vendor,
        organizations: &OrganizationDirectory,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, SweepItemError> {
        let item_id = vendor.id.0.as_str();
        let organization = organization(organizations, &vendor.organization_id, item_id)?;
        let verdict = self.lifecycle.evaluate_expiry(vendor, organization, now);
        if verdict == ExpiryVerdict::Current {
            return Ok(ItemOutcome::Skipped);
        }

        let deactivated = self.lifecycle.deactivate(vendor, verdict, now);
        self.ports
            .vendors
            .update(deactivated)
            .await
            .map_err(|cause| SweepItemError::new(item_id, cause))?;

        let Some(procurement) = organization.procurement_email.clone() else {
            warn!(
                event_name = "sweep.vendor_expiry_unannounced",
                vendor_id = %vendor.id,
                "vendor deactivated but organization has no procurement address"
            );
            return Ok(ItemOutcome::Deactivated { notified: false });
        };

        let message = Message::VendorExpiry(VendorExpiryMessage {
            vendor_name: vendor.name.clone(),
            organization: organization.name.clone(),
            high_value: verdict == ExpiryVerdict::HighValueExpired,
            approval_reason: vendor
                .approval_reason
                .map(|reason| reason.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            expired_on: self.calendar.local_date(vendor.approval_expiry_date.unwrap_or(now)).to_string(),
            months_approved: vendor
                .approval_date
                .map(|approved| self.calendar.months_between(approved, now))
                .unwrap_or_default(),
            three_quote_window: organization.vendor_approval_3quote_duration,
        });
        self.notifier
            .notify(NotificationSubject::Vendor(vendor.id.clone()), vec![procurement], Vec::new(), &message, now)
            .await
            .map(|_| ItemOutcome::Deactivated { notified: true })
            .map_err(|cause| SweepItemError::new(item_id, cause))
    }

    /// Reminds both approvers of every unresolved quote conflict, on every run.
    pub async fn quote_conflict_reminder(&self, now: DateTime<Utc>) -> SweepReport {
        let job = JobName::QuoteConflictReminder;
        let mut listing = match self.ports.purchase_requests.list_quote_conflicts().await {
            Ok(listing) => listing,
            Err(cause) => return SweepReport::aborted(job, now, cause),
        };
        let mut stats = SweepStats::scanning(job, &mut listing);
        let requests = listing.documents;
        let organizations = self.organizations(requests.iter().map(|pr| &pr.organization_id)).await;

        let results =
            join_all(requests.iter().map(|request| self.conflict_item(request, &organizations, now))).await;
        for result in results {
            stats.record(job, result);
        }
        self.finish(job, now, stats)
    }

    async fn conflict_item(
        &self,
        request: &PurchaseRequest,
        organizations: &OrganizationDirectory,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, SweepItemError> {
        let item_id = request.id.0.as_str();
        let workflow = &request.approval_workflow;
        if request.status != PrStatus::PendingApproval || !workflow.quote_conflict {
            return Ok(ItemOutcome::Skipped);
        }
        let organization = organization(organizations, &request.organization_id, item_id)?;

        let mut to = Vec::new();
        for approver in workflow.current_approver.iter().chain(workflow.second_approver.iter()) {
            if let Some(email) =
                self.email_of(approver).await.map_err(|cause| SweepItemError::new(item_id, cause))?
            {
                to.push(email);
            }
        }
        let mut cc: Vec<String> = organization.procurement_email.iter().cloned().collect();
        if let Some(email) =
            self.email_of(&request.requestor).await.map_err(|cause| SweepItemError::new(item_id, cause))?
        {
            cc.push(email);
        }
        if to.is_empty() {
            return Err(SweepItemError::new(item_id, "no active approver address on file"));
        }

        let days = self.resolver.days_in_conflict(workflow, now);
        let message = Message::QuoteConflict(QuoteConflictMessage::for_request(request, days));
        self.notifier
            .notify(NotificationSubject::PurchaseRequest(request.id.clone()), to, cc, &message, now)
            .await
            .map(|_| ItemOutcome::Notified)
            .map_err(|cause| SweepItemError::new(item_id, cause))
    }
}
