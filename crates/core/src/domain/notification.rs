use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::organization::OrganizationId;
use crate::domain::purchase_request::PurchaseRequestId;
use crate::domain::vendor::VendorId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    StatusChange,
    DailyReminder,
    UrgentReminder,
    DeliveryDelay,
    VendorExpiry,
    HighValueVendorExpiry,
    QuoteConflict,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatusChange => "STATUS_CHANGE",
            Self::DailyReminder => "DAILY_REMINDER",
            Self::UrgentReminder => "URGENT_REMINDER",
            Self::DeliveryDelay => "DELIVERY_DELAY",
            Self::VendorExpiry => "VENDOR_EXPIRY",
            Self::HighValueVendorExpiry => "HIGH_VALUE_VENDOR_EXPIRY",
            Self::QuoteConflict => "QUOTE_CONFLICT",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// What a notification is about.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NotificationSubject {
    PurchaseRequest(PurchaseRequestId),
    Vendor(VendorId),
    Digest(OrganizationId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NotificationLog {
    pub id: String,
    pub notification_type: NotificationType,
    pub subject: NotificationSubject,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl NotificationLog {
    pub fn new(
        notification_type: NotificationType,
        subject: NotificationSubject,
        email: &OutboundEmail,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            notification_type,
            subject,
            recipients: email.to.clone(),
            cc: email.cc.clone(),
            status,
            timestamp,
            message_id: None,
            message: Some(email.subject.clone()),
            error: None,
        }
    }

    pub fn pr_id(&self) -> Option<&PurchaseRequestId> {
        match &self.subject {
            NotificationSubject::PurchaseRequest(id) => Some(id),
            _ => None,
        }
    }

    pub fn vendor_id(&self) -> Option<&VendorId> {
        match &self.subject {
            NotificationSubject::Vendor(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReceipt {
    pub message_id: String,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{DeliveryStatus, NotificationLog, NotificationSubject, NotificationType, OutboundEmail};
    use crate::domain::purchase_request::PurchaseRequestId;

    #[test]
    fn log_captures_recipients_and_subject_line() {
        let email = OutboundEmail {
            to: vec!["buyer@example.com".to_string()],
            cc: vec!["procurement@example.com".to_string()],
            subject: "Delivery delayed".to_string(),
            text: String::new(),
            html: String::new(),
            from: None,
        };
        let log = NotificationLog::new(
            NotificationType::DeliveryDelay,
            NotificationSubject::PurchaseRequest(PurchaseRequestId("pr-9".to_string())),
            &email,
            DeliveryStatus::Sent,
            Utc::now(),
        );

        assert_eq!(log.pr_id().map(|id| id.0.as_str()), Some("pr-9"));
        assert_eq!(log.vendor_id(), None);
        assert_eq!(log.cc, vec!["procurement@example.com".to_string()]);
        let json = serde_json::to_value(&log).expect("serialize");
        assert_eq!(json["notificationType"], "DELIVERY_DELAY");
    }
}
