//! Time-based sweeps: reminder digests, delivery-delay alerts, vendor expiry
//! and quote-conflict escalation.
//!
//! A sweep loads its working set once, fans the per-item work out
//! concurrently and waits for all of it. An item failure is recorded in the
//! report and never stops its siblings. Only a failed initial query aborts
//! the sweep.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::approvals::QuoteConflictResolver;
use crate::calendar::BusinessCalendar;
use crate::domain::organization::{Organization, OrganizationId};
use crate::domain::user::UserId;
use crate::notifications::Notifier;
use crate::ports::{Listing, Ports, StoreError};
use crate::scheduler::JobName;
use crate::vendors::VendorApprovalLifecycle;

mod checks;
mod digests;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepItemError {
    pub item_id: String,
    pub message: String,
}

impl SweepItemError {
    pub fn new(item_id: impl Into<String>, message: impl ToString) -> Self {
        Self { item_id: item_id.into(), message: message.to_string() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepStats {
    pub scanned: usize,
    pub notified: usize,
    pub skipped: usize,
    pub deactivated: usize,
    pub errors: Vec<SweepItemError>,
}

impl SweepStats {
    /// Starts the tally for a scan. Rows that could not be decoded count as
    /// scanned and are recorded as item failures.
    fn scanning<T>(job: JobName, listing: &mut Listing<T>) -> Self {
        let mut stats = Self { scanned: listing.len(), ..Self::default() };
        for cause in listing.malformed.drain(..) {
            let item_id = cause.document_id().unwrap_or("unknown").to_string();
            stats.record(job, Err(SweepItemError::new(item_id, cause)));
        }
        stats
    }

    fn record(&mut self, job: JobName, result: Result<ItemOutcome, SweepItemError>) {
        match result {
            Ok(ItemOutcome::Notified) => self.notified += 1,
            Ok(ItemOutcome::Skipped) => self.skipped += 1,
            Ok(ItemOutcome::Deactivated { notified }) => {
                self.deactivated += 1;
                if notified {
                    self.notified += 1;
                }
            }
            Err(item_error) => {
                warn!(
                    event_name = "sweep.item_failed",
                    job = %job,
                    item_id = %item_error.item_id,
                    error = %item_error.message,
                    "sweep item failed"
                );
                self.errors.push(item_error);
            }
        }
    }
}

/// What a sweep run did. `success` is false only when the sweep could not start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub job: JobName,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub stats: SweepStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SweepReport {
    fn aborted(job: JobName, started_at: DateTime<Utc>, cause: StoreError) -> Self {
        error!(
            event_name = "sweep.start_failed",
            job = %job,
            error = %cause,
            "sweep could not load its working set"
        );
        Self { job, success: false, started_at, stats: SweepStats::default(), error: Some(cause.to_string()) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ItemOutcome {
    Notified,
    Skipped,
    Deactivated { notified: bool },
}

type OrganizationDirectory = BTreeMap<OrganizationId, Result<Organization, String>>;

/// Runs the scheduled sweeps against injected ports.
#[derive(Clone)]
pub struct ReminderScheduler {
    ports: Ports,
    notifier: Notifier,
    calendar: BusinessCalendar,
    lifecycle: VendorApprovalLifecycle,
    resolver: QuoteConflictResolver,
}

impl ReminderScheduler {
    pub fn new(ports: Ports, notifier: Notifier, calendar: BusinessCalendar) -> Self {
        Self {
            ports,
            notifier,
            calendar,
            lifecycle: VendorApprovalLifecycle::new(calendar),
            resolver: QuoteConflictResolver,
        }
    }

    pub fn calendar(&self) -> BusinessCalendar {
        self.calendar
    }

    pub async fn run_job(&self, job: JobName, now: DateTime<Utc>) -> SweepReport {
        info!(event_name = "sweep.started", job = %job, "running sweep");
        match job {
            JobName::DailyReminders => self.daily_reminders(now).await,
            JobName::UrgentReminders => self.urgent_reminders(now).await,
            JobName::DeliveryDelayCheck => self.delivery_delay_check(now).await,
            JobName::VendorExpiryCheck => self.vendor_expiry_check(now).await,
            JobName::QuoteConflictReminder => self.quote_conflict_reminder(now).await,
        }
    }

    fn finish(
        &self,
        job: JobName,
        started_at: DateTime<Utc>,
        stats: SweepStats,
    ) -> SweepReport {
        info!(
            event_name = "sweep.completed",
            job = %job,
            scanned = stats.scanned,
            notified = stats.notified,
            skipped = stats.skipped,
            deactivated = stats.deactivated,
            errors = stats.errors.len(),
            "sweep finished"
        );
        SweepReport { job, success: true, started_at, stats, error: None }
    }

    async fn organizations<'a, I>(&self, ids: I) -> OrganizationDirectory
    where
        I: IntoIterator<Item = &'a OrganizationId> + Send,
    {
        let unique: BTreeSet<OrganizationId> = ids.into_iter().cloned().collect();
        let mut directory = BTreeMap::new();
        for id in unique {
            let entry = match self.ports.organizations.get(&id).await {
                Ok(Some(organization)) => Ok(organization),
                Ok(None) => Err(format!("organization `{id}` not found")),
                Err(cause) => Err(cause.to_string()),
            };
            directory.insert(id, entry);
        }
        directory
    }

    async fn email_of(&self, id: &UserId) -> Result<Option<String>, StoreError> {
        Ok(self.ports.users.get_user(id).await?.filter(|user| user.active).map(|user| user.email))
    }
}

fn organization<'a>(
    directory: &'a OrganizationDirectory,
    id: &OrganizationId,
    item_id: &str,
) -> Result<&'a Organization, SweepItemError> {
    match directory.get(id) {
        Some(Ok(organization)) => Ok(organization),
        Some(Err(message)) => Err(SweepItemError::new(item_id, message)),
        None => Err(SweepItemError::new(item_id, format!("organization `{id}` not loaded"))),
    }
}
