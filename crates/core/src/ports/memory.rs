//! In-memory adapters for tests, demos and the `memory` database mode.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::notification::{
    DeliveryStatus, DispatchReceipt, NotificationLog, NotificationSubject, NotificationType,
    OutboundEmail,
};
use crate::domain::organization::{
    Organization, OrganizationId, OrganizationRules, RuleNumber, RuleThreshold,
};
use crate::domain::purchase_request::{PrStatus, PurchaseRequest, PurchaseRequestId};
use crate::domain::user::{User, UserId};
use crate::domain::vendor::{Vendor, VendorId};

use super::{
    DispatchError, Listing, NotificationDispatcher, NotificationLogStore, OrganizationStore, Ports,
    PurchaseRequestStore, RuleStore, StoreError, UserDirectory, VendorStore,
};

#[derive(Default)]
pub struct InMemoryPurchaseRequestStore {
    requests: RwLock<BTreeMap<String, PurchaseRequest>>,
    failing_updates: RwLock<HashSet<String>>,
}

impl InMemoryPurchaseRequestStore {
    /// Makes every later update of `id` fail as if the store were unreachable.
    pub async fn fail_updates_for(&self, id: &PurchaseRequestId) {
        self.failing_updates.write().await.insert(id.0.clone());
    }
}

#[async_trait::async_trait]
impl PurchaseRequestStore for InMemoryPurchaseRequestStore {
    async fn get(&self, id: &PurchaseRequestId) -> Result<Option<PurchaseRequest>, StoreError> {
        Ok(self.requests.read().await.get(&id.0).cloned())
    }

    async fn list_by_status(&self, statuses: &[PrStatus]) -> Result<Listing<PurchaseRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(Listing::complete(
            requests.values().filter(|pr| statuses.contains(&pr.status)).cloned().collect(),
        ))
    }

    async fn list_quote_conflicts(&self) -> Result<Listing<PurchaseRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(Listing::complete(
            requests
                .values()
                .filter(|pr| {
                    pr.status == PrStatus::PendingApproval && pr.approval_workflow.quote_conflict
                })
                .cloned()
                .collect(),
        ))
    }

    async fn insert(&self, request: PurchaseRequest) -> Result<PurchaseRequest, StoreError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(StoreError::Duplicate { collection: "purchaseRequests", id: request.id.0 });
        }
        requests.insert(request.id.0.clone(), request.clone());
        Ok(request)
    }

    async fn update(&self, mut request: PurchaseRequest) -> Result<PurchaseRequest, StoreError> {
        if self.failing_updates.read().await.contains(&request.id.0) {
            return Err(StoreError::Unavailable(format!(
                "injected write failure for purchase request `{}`",
                request.id.0
            )));
        }
        let mut requests = self.requests.write().await;
        match requests.get(&request.id.0) {
            Some(stored) if stored.version == request.version => {}
            _ => {
                return Err(StoreError::StaleWrite {
                    collection: "purchaseRequests",
                    id: request.id.0,
                    expected_version: request.version,
                })
            }
        }
        request.version += 1;
        requests.insert(request.id.0.clone(), request.clone());
        Ok(request)
    }
}

#[derive(Default)]
pub struct InMemoryVendorStore {
    vendors: RwLock<BTreeMap<String, Vendor>>,
    failing_updates: RwLock<HashSet<String>>,
}

impl InMemoryVendorStore {
    pub async fn fail_updates_for(&self, id: &VendorId) {
        self.failing_updates.write().await.insert(id.0.clone());
    }
}

#[async_trait::async_trait]
impl VendorStore for InMemoryVendorStore {
    async fn get(&self, id: &VendorId) -> Result<Option<Vendor>, StoreError> {
        Ok(self.vendors.read().await.get(&id.0).cloned())
    }

    async fn list_approved(&self) -> Result<Listing<Vendor>, StoreError> {
        let vendors = self.vendors.read().await;
        Ok(Listing::complete(vendors.values().filter(|vendor| vendor.is_approved).cloned().collect()))
    }

    async fn insert(&self, vendor: Vendor) -> Result<Vendor, StoreError> {
        let mut vendors = self.vendors.write().await;
        if vendors.contains_key(&vendor.id.0) {
            return Err(StoreError::Duplicate { collection: "vendors", id: vendor.id.0 });
        }
        vendors.insert(vendor.id.0.clone(), vendor.clone());
        Ok(vendor)
    }

    async fn update(&self, mut vendor: Vendor) -> Result<Vendor, StoreError> {
        if self.failing_updates.read().await.contains(&vendor.id.0) {
            return Err(StoreError::Unavailable(format!(
                "injected write failure for vendor `{}`",
                vendor.id.0
            )));
        }
        let mut vendors = self.vendors.write().await;
        match vendors.get(&vendor.id.0) {
            Some(stored) if stored.version == vendor.version => {}
            _ => {
                return Err(StoreError::StaleWrite {
                    collection: "vendors",
                    id: vendor.id.0,
                    expected_version: vendor.version,
                })
            }
        }
        vendor.version += 1;
        vendors.insert(vendor.id.0.clone(), vendor.clone());
        Ok(vendor)
    }
}

#[derive(Default)]
pub struct InMemoryOrganizationStore {
    organizations: RwLock<BTreeMap<String, Organization>>,
}

#[async_trait::async_trait]
impl OrganizationStore for InMemoryOrganizationStore {
    async fn get(&self, id: &OrganizationId) -> Result<Option<Organization>, StoreError> {
        Ok(self.organizations.read().await.get(&id.0).cloned())
    }

    async fn save(&self, organization: Organization) -> Result<(), StoreError> {
        self.organizations.write().await.insert(organization.id.0.clone(), organization);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<BTreeMap<String, OrganizationRules>>,
}

#[async_trait::async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn find_rules(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<OrganizationRules>, StoreError> {
        Ok(self.rules.read().await.get(&organization_id.0).cloned())
    }

    async fn save_rule(
        &self,
        organization_id: &OrganizationId,
        rule: RuleNumber,
        threshold: RuleThreshold,
    ) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        rules
            .entry(organization_id.0.clone())
            .or_insert_with(|| OrganizationRules::empty(organization_id.clone()))
            .set(rule, threshold);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryNotificationLogStore {
    logs: RwLock<Vec<NotificationLog>>,
}

impl InMemoryNotificationLogStore {
    pub async fn all(&self) -> Vec<NotificationLog> {
        self.logs.read().await.clone()
    }
}

#[async_trait::async_trait]
impl NotificationLogStore for InMemoryNotificationLogStore {
    async fn append(&self, log: NotificationLog) -> Result<(), StoreError> {
        self.logs.write().await.push(log);
        Ok(())
    }

    async fn has_sent(
        &self,
        notification_type: NotificationType,
        subject: &NotificationSubject,
    ) -> Result<bool, StoreError> {
        let logs = self.logs.read().await;
        Ok(logs.iter().any(|log| {
            log.notification_type == notification_type
                && &log.subject == subject
                && log.status == DeliveryStatus::Sent
        }))
    }

    async fn list_for(&self, subject: &NotificationSubject) -> Result<Vec<NotificationLog>, StoreError> {
        let logs = self.logs.read().await;
        Ok(logs.iter().filter(|log| &log.subject == subject).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<BTreeMap<String, User>>,
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id.0).cloned())
    }

    async fn save_user(&self, user: User) -> Result<(), StoreError> {
        self.users.write().await.insert(user.id.0.clone(), user);
        Ok(())
    }
}

/// Dispatcher that records every message and can be told to reject some recipients.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: RwLock<Vec<OutboundEmail>>,
    failing_recipients: RwLock<HashSet<String>>,
}

impl RecordingDispatcher {
    pub async fn fail_for_recipient(&self, address: impl Into<String>) {
        self.failing_recipients.write().await.insert(address.into());
    }

    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.read().await.clone()
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, email: &OutboundEmail) -> Result<DispatchReceipt, DispatchError> {
        let failing = self.failing_recipients.read().await;
        if let Some(address) = email.to.iter().find(|address| failing.contains(*address)) {
            return Err(DispatchError::Rejected(format!("mailbox `{address}` unavailable")));
        }
        drop(failing);
        self.sent.write().await.push(email.clone());
        Ok(DispatchReceipt { message_id: Uuid::new_v4().to_string() })
    }
}

/// Concrete in-memory adapters, kept typed so tests can seed and inspect them.
#[derive(Clone, Default)]
pub struct MemoryPorts {
    pub purchase_requests: Arc<InMemoryPurchaseRequestStore>,
    pub vendors: Arc<InMemoryVendorStore>,
    pub organizations: Arc<InMemoryOrganizationStore>,
    pub rules: Arc<InMemoryRuleStore>,
    pub notification_logs: Arc<InMemoryNotificationLogStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

impl MemoryPorts {
    pub fn ports(&self) -> Ports {
        Ports {
            purchase_requests: self.purchase_requests.clone(),
            vendors: self.vendors.clone(),
            organizations: self.organizations.clone(),
            rules: self.rules.clone(),
            notification_logs: self.notification_logs.clone(),
            users: self.users.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{InMemoryPurchaseRequestStore, InMemoryRuleStore};
    use crate::domain::organization::{OrganizationId, RuleNumber, RuleThreshold};
    use crate::domain::purchase_request::{PurchaseRequest, PurchaseRequestId};
    use crate::domain::user::UserId;
    use crate::ports::{PurchaseRequestStore, RuleStore, StoreError};

    fn draft() -> PurchaseRequest {
        PurchaseRequest::draft(
            PurchaseRequestId("pr-1".to_string()),
            "PR-0001",
            OrganizationId("org-1".to_string()),
            UserId("requestor".to_string()),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn update_rejects_stale_versions() {
        let store = InMemoryPurchaseRequestStore::default();
        let original = store.insert(draft()).await.expect("insert");

        let first = store.update(original.clone()).await.expect("first writer wins");
        assert_eq!(first.version, 1);

        let error = store.update(original).await.expect_err("second writer is stale");
        assert!(matches!(error, StoreError::StaleWrite { expected_version: 0, .. }));
    }

    #[tokio::test]
    async fn rules_are_absent_until_a_rule_is_saved() {
        let store = InMemoryRuleStore::default();
        let org = OrganizationId("org-1".to_string());
        assert!(store.find_rules(&org).await.expect("find").is_none());

        store
            .save_rule(&org, RuleNumber::Rule1, RuleThreshold::new(50_000.into()))
            .await
            .expect("save");
        let rules = store.find_rules(&org).await.expect("find").expect("present");
        assert_eq!(rules.missing().len(), 6);
    }
}
