//! Rendering, delivery and logging of outbound notifications.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::notification::{
    DeliveryStatus, NotificationLog, NotificationSubject, OutboundEmail,
};
use crate::errors::ApplicationError;
use crate::ports::{DispatchError, NotificationDispatcher, NotificationLogStore, Ports, StoreError};

pub mod dispatch;
pub mod render;

pub use dispatch::{dispatcher_from_config, HttpNotificationDispatcher, LogOnlyDispatcher};
pub use render::{
    format_amount, status_label, DeliveryDelayMessage, DigestItem, DigestMessage, Message,
    NotificationRenderer, QuoteConflictMessage, RenderedMessage, StatusChangeMessage,
    VendorExpiryMessage,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("template rendering failed: {0}")]
    Render(String),
    #[error("no recipients for {0}")]
    NoRecipients(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("notification log write failed: {0}")]
    Store(#[from] StoreError),
}

impl From<NotifyError> for ApplicationError {
    fn from(value: NotifyError) -> Self {
        match value {
            NotifyError::Store(error) => error.into(),
            NotifyError::Render(_) => Self::Configuration(value.to_string()),
            NotifyError::NoRecipients(_) | NotifyError::Dispatch(_) => {
                Self::Integration(value.to_string())
            }
        }
    }
}

/// Renders, sends and records a notification. Every dispatch attempt,
/// successful or not, leaves exactly one `NotificationLog`.
#[derive(Clone)]
pub struct Notifier {
    renderer: Arc<NotificationRenderer>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    logs: Arc<dyn NotificationLogStore>,
}

impl Notifier {
    pub fn new(
        renderer: Arc<NotificationRenderer>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        logs: Arc<dyn NotificationLogStore>,
    ) -> Self {
        Self { renderer, dispatcher, logs }
    }

    pub fn from_ports(ports: &Ports) -> Result<Self, NotifyError> {
        Ok(Self::new(
            Arc::new(NotificationRenderer::embedded()?),
            ports.dispatcher.clone(),
            ports.notification_logs.clone(),
        ))
    }

    pub async fn notify(
        &self,
        subject: NotificationSubject,
        to: Vec<String>,
        cc: Vec<String>,
        message: &Message,
        at: DateTime<Utc>,
    ) -> Result<NotificationLog, NotifyError> {
        let notification_type = message.notification_type();
        let to = normalize_recipients(to, &[]);
        if to.is_empty() {
            return Err(NotifyError::NoRecipients(notification_type.to_string()));
        }
        let cc = normalize_recipients(cc, &to);

        let rendered = self.renderer.render(message)?;
        let email = OutboundEmail {
            to,
            cc,
            subject: rendered.subject,
            text: rendered.text,
            html: rendered.html,
            from: None,
        };

        match self.dispatcher.send(&email).await {
            Ok(receipt) => {
                let mut log =
                    NotificationLog::new(notification_type, subject, &email, DeliveryStatus::Sent, at);
                log.message_id = Some(receipt.message_id);
                self.logs.append(log.clone()).await?;
                info!(
                    event_name = "notification.sent",
                    notification_type = %notification_type,
                    recipients = email.to.len(),
                    "notification sent"
                );
                Ok(log)
            }
            Err(error) => {
                let mut log = NotificationLog::new(
                    notification_type,
                    subject,
                    &email,
                    DeliveryStatus::Failed,
                    at,
                );
                log.error = Some(error.to_string());
                self.logs.append(log).await?;
                warn!(
                    event_name = "notification.failed",
                    notification_type = %notification_type,
                    error = %error,
                    "notification dispatch failed"
                );
                Err(NotifyError::Dispatch(error))
            }
        }
    }
}

/// Trims, drops blanks and duplicates, and removes anything already in `exclude`.
fn normalize_recipients(addresses: Vec<String>, exclude: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for address in addresses {
        let trimmed = address.trim();
        if trimmed.is_empty()
            || exclude.iter().any(|existing| existing.eq_ignore_ascii_case(trimmed))
            || seen.iter().any(|existing| existing.eq_ignore_ascii_case(trimmed))
        {
            continue;
        }
        seen.push(trimmed.to_string());
    }
    seen
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Message, NotifyError, Notifier, QuoteConflictMessage};
    use crate::domain::notification::{DeliveryStatus, NotificationSubject, NotificationType};
    use crate::domain::purchase_request::PurchaseRequestId;
    use crate::ports::memory::MemoryPorts;

    fn conflict() -> Message {
        Message::QuoteConflict(QuoteConflictMessage {
            pr_number: "PR-3".to_string(),
            description: "Printers".to_string(),
            first_quote: "Vendor A (LSL 10 000)".to_string(),
            second_quote: "Vendor B (LSL 11 500)".to_string(),
            days_in_conflict: 2,
        })
    }

    fn subject() -> NotificationSubject {
        NotificationSubject::PurchaseRequest(PurchaseRequestId("pr-3".to_string()))
    }

    #[tokio::test]
    async fn successful_send_is_logged_with_deduplicated_recipients() {
        let memory = MemoryPorts::default();
        let notifier = Notifier::from_ports(&memory.ports()).expect("notifier");

        let log = notifier
            .notify(
                subject(),
                vec!["a@org.test".to_string(), " A@org.test ".to_string(), "b@org.test".to_string()],
                vec!["b@org.test".to_string(), "procurement@org.test".to_string(), String::new()],
                &conflict(),
                Utc::now(),
            )
            .await
            .expect("send");

        assert_eq!(log.status, DeliveryStatus::Sent);
        assert_eq!(log.recipients, vec!["a@org.test".to_string(), "b@org.test".to_string()]);
        assert_eq!(log.cc, vec!["procurement@org.test".to_string()]);
        assert!(log.message_id.is_some());
        assert_eq!(memory.notification_logs.all().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_dispatch_still_leaves_a_failed_log() {
        let memory = MemoryPorts::default();
        memory.dispatcher.fail_for_recipient("a@org.test").await;
        let notifier = Notifier::from_ports(&memory.ports()).expect("notifier");

        let error = notifier
            .notify(subject(), vec!["a@org.test".to_string()], Vec::new(), &conflict(), Utc::now())
            .await
            .expect_err("dispatch fails");
        assert!(matches!(error, NotifyError::Dispatch(_)));

        let logs = memory.notification_logs.all().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryStatus::Failed);
        assert_eq!(logs[0].notification_type, NotificationType::QuoteConflict);
        assert!(logs[0].error.is_some());
    }

    #[tokio::test]
    async fn empty_recipient_list_is_refused_without_logging() {
        let memory = MemoryPorts::default();
        let notifier = Notifier::from_ports(&memory.ports()).expect("notifier");
        let error = notifier
            .notify(subject(), vec!["  ".to_string()], Vec::new(), &conflict(), Utc::now())
            .await
            .expect_err("no recipients");
        assert!(matches!(error, NotifyError::NoRecipients(_)));
        assert!(memory.notification_logs.all().await.is_empty());
    }
}
