//! Storage, directory and delivery seams used by the workflow service and the sweeps.
//!
//! Every store works on whole documents. Writes to purchase requests and
//! vendors are compare-and-swap on `version`: the caller passes the document
//! it read, and the store rejects the write if someone else bumped the
//! version in between.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::notification::{
    DispatchReceipt, NotificationLog, NotificationSubject, NotificationType, OutboundEmail,
};
use crate::domain::organization::{Organization, OrganizationId, OrganizationRules, RuleNumber, RuleThreshold};
use crate::domain::purchase_request::{PrStatus, PurchaseRequest, PurchaseRequestId};
use crate::domain::user::{User, UserId};
use crate::domain::vendor::{Vendor, VendorId};

pub mod memory;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{collection} `{id}` changed since it was read (expected version {expected_version})")]
    StaleWrite { collection: &'static str, id: String, expected_version: u64 },
    #[error("{collection} `{id}` already exists")]
    Duplicate { collection: &'static str, id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed {collection} document `{id}`: {reason}")]
    Malformed { collection: &'static str, id: String, reason: String },
}

impl StoreError {
    /// Id of the document the error is about, when there is one.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::StaleWrite { id, .. } | Self::Duplicate { id, .. } | Self::Malformed { id, .. } => {
                Some(id)
            }
            Self::Unavailable(_) => None,
        }
    }
}

/// Documents read from a collection scan.
///
/// A row that cannot be decoded lands in `malformed` instead of failing the
/// whole scan, so the readable documents are still returned.
#[derive(Clone, Debug)]
pub struct Listing<T> {
    pub documents: Vec<T>,
    pub malformed: Vec<StoreError>,
}

impl<T> Listing<T> {
    pub fn complete(documents: Vec<T>) -> Self {
        Self { documents, malformed: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.documents.len() + self.malformed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.malformed.is_empty()
    }
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self::complete(Vec::new())
    }
}

impl<T> FromIterator<Result<T, StoreError>> for Listing<T> {
    fn from_iter<I: IntoIterator<Item = Result<T, StoreError>>>(rows: I) -> Self {
        let mut listing = Self::default();
        for row in rows {
            match row {
                Ok(document) => listing.documents.push(document),
                Err(error) => listing.malformed.push(error),
            }
        }
        listing
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("provider rejected message: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("dispatcher misconfigured: {0}")]
    Misconfigured(String),
}

#[async_trait]
pub trait PurchaseRequestStore: Send + Sync {
    async fn get(&self, id: &PurchaseRequestId) -> Result<Option<PurchaseRequest>, StoreError>;

    /// `Err` only when the collection cannot be queried at all.
    async fn list_by_status(&self, statuses: &[PrStatus]) -> Result<Listing<PurchaseRequest>, StoreError>;

    /// Requests pending approval whose two approvers disagree on the quote.
    async fn list_quote_conflicts(&self) -> Result<Listing<PurchaseRequest>, StoreError>;

    async fn insert(&self, request: PurchaseRequest) -> Result<PurchaseRequest, StoreError>;

    /// Writes `request` if the stored version still equals `request.version`.
    /// Returns the document as stored, with its version bumped.
    async fn update(&self, request: PurchaseRequest) -> Result<PurchaseRequest, StoreError>;
}

#[async_trait]
pub trait VendorStore: Send + Sync {
    async fn get(&self, id: &VendorId) -> Result<Option<Vendor>, StoreError>;
    async fn list_approved(&self) -> Result<Listing<Vendor>, StoreError>;
    async fn insert(&self, vendor: Vendor) -> Result<Vendor, StoreError>;
    async fn update(&self, vendor: Vendor) -> Result<Vendor, StoreError>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn get(&self, id: &OrganizationId) -> Result<Option<Organization>, StoreError>;
    async fn save(&self, organization: Organization) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// `None` when the organization has no rule documents at all.
    async fn find_rules(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<OrganizationRules>, StoreError>;

    async fn save_rule(
        &self,
        organization_id: &OrganizationId,
        rule: RuleNumber,
        threshold: RuleThreshold,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait NotificationLogStore: Send + Sync {
    async fn append(&self, log: NotificationLog) -> Result<(), StoreError>;

    /// Whether a successfully delivered notification of this type already exists for the subject.
    async fn has_sent(
        &self,
        notification_type: NotificationType,
        subject: &NotificationSubject,
    ) -> Result<bool, StoreError>;

    async fn list_for(&self, subject: &NotificationSubject) -> Result<Vec<NotificationLog>, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError>;
    async fn save_user(&self, user: User) -> Result<(), StoreError>;
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<DispatchReceipt, DispatchError>;
}

/// The full set of adapters a deployment wires together.
#[derive(Clone)]
pub struct Ports {
    pub purchase_requests: Arc<dyn PurchaseRequestStore>,
    pub vendors: Arc<dyn VendorStore>,
    pub organizations: Arc<dyn OrganizationStore>,
    pub rules: Arc<dyn RuleStore>,
    pub notification_logs: Arc<dyn NotificationLogStore>,
    pub users: Arc<dyn UserDirectory>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
}
