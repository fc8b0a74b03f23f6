use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use futures::future::join_all;

use super::{organization, ItemOutcome, OrganizationDirectory, ReminderScheduler, SweepItemError, SweepReport, SweepStats};
use crate::domain::notification::NotificationSubject;
use crate::domain::organization::OrganizationId;
use crate::domain::purchase_request::{PrStatus, PurchaseRequest};
use crate::domain::user::UserId;
use crate::notifications::{DigestItem, DigestMessage, Message};
use crate::scheduler::JobName;

/// Urgent digests only list requests open longer than this many business days.
pub const URGENT_AFTER_BUSINESS_DAYS: i64 = 2;

/// Who is expected to move a request forward from its current status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Audience {
    Procurement,
    Approver,
    Requestor,
    Finance,
    AssetManagement,
}

impl Audience {
    const STATUSES: [PrStatus; 6] = [
        PrStatus::Submitted,
        PrStatus::InQueue,
        PrStatus::PendingApproval,
        PrStatus::RevisionRequired,
        PrStatus::Approved,
        PrStatus::Ordered,
    ];

    fn for_status(status: PrStatus) -> Option<Self> {
        match status {
            PrStatus::Submitted | PrStatus::InQueue => Some(Self::Procurement),
            PrStatus::PendingApproval => Some(Self::Approver),
            PrStatus::RevisionRequired => Some(Self::Requestor),
            PrStatus::Approved => Some(Self::Finance),
            PrStatus::Ordered => Some(Self::AssetManagement),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Procurement => "procurement review",
            Self::Approver => "approval",
            Self::Requestor => "revision",
            Self::Finance => "finance processing",
            Self::AssetManagement => "delivery receipt",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct DigestKey {
    organization_id: OrganizationId,
    recipient: String,
}

#[derive(Default)]
struct Digest {
    audiences: BTreeSet<Audience>,
    items: Vec<DigestItem>,
}

struct Routed {
    audience: Audience,
    recipients: Vec<String>,
    item: DigestItem,
}

impl ReminderScheduler {
    pub async fn daily_reminders(&self, now: DateTime<Utc>) -> SweepReport {
        self.digest_sweep(JobName::DailyReminders, false, now).await
    }

    pub async fn urgent_reminders(&self, now: DateTime<Utc>) -> SweepReport {
        self.digest_sweep(JobName::UrgentReminders, true, now).await
    }

    async fn digest_sweep(&self, job: JobName, urgent: bool, now: DateTime<Utc>) -> SweepReport {
        let mut listing = match self.ports.purchase_requests.list_by_status(&Audience::STATUSES).await {
            Ok(listing) => listing,
            Err(cause) => return SweepReport::aborted(job, now, cause),
        };
        let mut stats = SweepStats::scanning(job, &mut listing);
        let requests = listing.documents;
        let organizations = self.organizations(requests.iter().map(|pr| &pr.organization_id)).await;

        let routed =
            join_all(requests.iter().map(|request| self.route(request, &organizations, urgent, now))).await;

        let mut digests: BTreeMap<DigestKey, Digest> = BTreeMap::new();
        for (request, result) in requests.iter().zip(routed) {
            match result {
                Ok(Some(routed)) if !routed.recipients.is_empty() => {
                    for recipient in routed.recipients {
                        let key = DigestKey {
                            organization_id: request.organization_id.clone(),
                            recipient,
                        };
                        let digest = digests.entry(key).or_default();
                        digest.audiences.insert(routed.audience);
                        digest.items.push(routed.item.clone());
                    }
                }
                Ok(_) => stats.skipped += 1,
                Err(item_error) => stats.record(job, Err(item_error)),
            }
        }

        let sent = join_all(
            digests
                .into_iter()
                .map(|(key, digest)| self.send_digest(key, digest, &organizations, urgent, now)),
        )
        .await;
        for result in sent {
            stats.record(job, result);
        }
        self.finish(job, now, stats)
    }

    async fn route(
        &self,
        request: &PurchaseRequest,
        organizations: &OrganizationDirectory,
        urgent: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Routed>, SweepItemError> {
        let Some(audience) = Audience::for_status(request.status) else {
            return Ok(None);
        };
        let business_days_open = self.calendar.business_days_between(request.created_at, now);
        if urgent && business_days_open <= URGENT_AFTER_BUSINESS_DAYS {
            return Ok(None);
        }
        let organization = organization(organizations, &request.organization_id, &request.id.0)?;

        let recipients = match audience {
            Audience::Procurement => organization.procurement_email.iter().cloned().collect(),
            Audience::Finance => organization.finance_email.iter().cloned().collect(),
            Audience::AssetManagement => organization.asset_management_email.iter().cloned().collect(),
            Audience::Requestor => self.emails(std::slice::from_ref(&request.requestor), &request.id.0).await?,
            Audience::Approver => {
                let outstanding: Vec<UserId> =
                    request.approval_workflow.outstanding_approvers().into_iter().cloned().collect();
                self.emails(&outstanding, &request.id.0).await?
            }
        };

        Ok(Some(Routed {
            audience,
            recipients,
            item: DigestItem::for_request(request, business_days_open),
        }))
    }

    async fn emails(&self, users: &[UserId], item_id: &str) -> Result<Vec<String>, SweepItemError> {
        let mut emails = Vec::with_capacity(users.len());
        for user in users {
            if let Some(email) =
                self.email_of(user).await.map_err(|cause| SweepItemError::new(item_id, cause))?
            {
                emails.push(email);
            }
        }
        Ok(emails)
    }

    async fn send_digest(
        &self,
        key: DigestKey,
        digest: Digest,
        organizations: &OrganizationDirectory,
        urgent: bool,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, SweepItemError> {
        let item_id = format!("{}:{}", key.organization_id, key.recipient);
        let organization = organization(organizations, &key.organization_id, &item_id)?;
        let audience = digest.audiences.iter().map(|audience| audience.label()).collect::<Vec<_>>().join(" and ");
        let message = Message::Digest(DigestMessage {
            audience,
            organization: organization.name.clone(),
            urgent,
            items: digest.items,
        });

        self.notifier
            .notify(
                NotificationSubject::Digest(key.organization_id.clone()),
                vec![key.recipient],
                Vec::new(),
                &message,
                now,
            )
            .await
            .map(|_| ItemOutcome::Notified)
            .map_err(|cause| SweepItemError::new(item_id, cause))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::notification::NotificationType;
    use crate::domain::purchase_request::PrStatus;
    use crate::domain::user::UserId;
    use crate::ports::PurchaseRequestStore;
    use crate::reminders::fixtures::{day, request_in, seeded};

    #[tokio::test]
    async fn daily_digest_groups_items_per_recipient() {
        let (memory, scheduler) = seeded().await;
        request_in(&memory, "pr-1", "requestor", PrStatus::Submitted, day(2, 8)).await;
        request_in(&memory, "pr-2", "requestor", PrStatus::InQueue, day(3, 8)).await;
        request_in(&memory, "pr-3", "requestor", PrStatus::RevisionRequired, day(3, 8)).await;
        request_in(&memory, "pr-4", "requestor", PrStatus::Completed, day(3, 8)).await;

        let report = scheduler.daily_reminders(day(6, 6)).await;
        assert!(report.success);
        assert_eq!(report.stats.scanned, 3);
        assert_eq!(report.stats.notified, 2);
        assert!(report.stats.errors.is_empty());

        let sent = memory.dispatcher.sent().await;
        let procurement = sent
            .iter()
            .find(|email| email.to == vec!["procurement@org.test".to_string()])
            .expect("procurement digest");
        assert!(procurement.text.contains("PR-pr-1") && procurement.text.contains("PR-pr-2"));
        assert!(!procurement.text.contains("PR-pr-3"));
        assert!(sent.iter().any(|email| email.to == vec!["requestor@org.test".to_string()]));

        let logs = memory.notification_logs.all().await;
        assert!(logs.iter().all(|log| log.notification_type == NotificationType::DailyReminder));
    }

    #[tokio::test]
    async fn urgent_digest_counts_weekdays_only() {
        let (memory, scheduler) = seeded().await;
        // Monday to Friday: five business days.
        request_in(&memory, "old", "requestor", PrStatus::Submitted, day(2, 8)).await;
        // Thursday to Friday: two business days.
        request_in(&memory, "recent", "requestor", PrStatus::Submitted, day(5, 8)).await;

        let report = scheduler.urgent_reminders(day(6, 13)).await;
        assert_eq!(report.stats.notified, 1);
        assert_eq!(report.stats.skipped, 1);

        let sent = memory.dispatcher.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.starts_with("URGENT: 1 purchase request(s)"));
        assert!(sent[0].text.contains("PR-old") && !sent[0].text.contains("PR-recent"));
        assert!(sent[0].text.contains("open 5 business day(s)"));

        // Friday to Monday crosses a weekend: two business days, still not urgent.
        let (memory, scheduler) = seeded().await;
        request_in(&memory, "weekend", "requestor", PrStatus::Submitted, day(6, 8)).await;
        let report = scheduler.urgent_reminders(day(9, 13)).await;
        assert_eq!(report.stats.notified, 0);
        assert_eq!(report.stats.skipped, 1);
    }

    #[tokio::test]
    async fn approvers_only_hear_about_their_outstanding_slots() {
        let (memory, scheduler) = seeded().await;
        let mut pr = request_in(&memory, "pr-9", "requestor", PrStatus::PendingApproval, day(2, 8)).await;
        pr.approval_workflow.current_approver = Some(UserId("approver-a".to_string()));
        pr.approval_workflow.second_approver = Some(UserId("approver-b".to_string()));
        pr.approval_workflow.requires_dual_approval = true;
        pr.approval_workflow.first_approval_complete = true;
        memory.purchase_requests.update(pr).await.expect("update");

        let report = scheduler.daily_reminders(day(4, 6)).await;
        assert_eq!(report.stats.notified, 1);
        let sent = memory.dispatcher.sent().await;
        assert_eq!(sent[0].to, vec!["approver-b@org.test".to_string()]);
    }

    #[tokio::test]
    async fn failed_digest_is_reported_without_blocking_others() {
        let (memory, scheduler) = seeded().await;
        memory.dispatcher.fail_for_recipient("procurement@org.test").await;
        request_in(&memory, "pr-1", "requestor", PrStatus::Submitted, day(2, 8)).await;
        request_in(&memory, "pr-2", "requestor", PrStatus::RevisionRequired, day(2, 8)).await;

        let report = scheduler.daily_reminders(day(4, 6)).await;
        assert!(report.success);
        assert_eq!(report.stats.notified, 1);
        assert_eq!(report.stats.errors.len(), 1);
        assert_eq!(report.stats.errors[0].item_id, "org-1:procurement@org.test");
    }
}
