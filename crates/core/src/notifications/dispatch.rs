use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{NotificationProvider, NotificationsConfig};
use crate::domain::notification::{DispatchReceipt, OutboundEmail};
use crate::ports::{DispatchError, NotificationDispatcher};

/// Writes messages to the log instead of delivering them.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOnlyDispatcher;

#[async_trait]
impl NotificationDispatcher for LogOnlyDispatcher {
    async fn send(&self, email: &OutboundEmail) -> Result<DispatchReceipt, DispatchError> {
        let message_id = format!("log-{}", Uuid::new_v4());
        info!(
            event_name = "notification.logged",
            message_id = %message_id,
            to = ?email.to,
            cc = ?email.cc,
            subject = %email.subject,
            "notification delivery is log-only"
        );
        Ok(DispatchReceipt { message_id })
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    cc: &'a [String],
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Posts messages as JSON to a transactional-mail HTTP API using a bearer key.
#[derive(Clone)]
pub struct HttpNotificationDispatcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    from_address: String,
}

impl HttpNotificationDispatcher {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: SecretString,
        from_address: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| DispatchError::Misconfigured(error.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into(), api_key, from_address: from_address.into() })
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotificationDispatcher {
    async fn send(&self, email: &OutboundEmail) -> Result<DispatchReceipt, DispatchError> {
        let body = SendRequest {
            from: email.from.as_deref().unwrap_or(&self.from_address),
            to: &email.to,
            cc: &email.cc,
            subject: &email.subject,
            text: &email.text,
            html: &email.html,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| DispatchError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                event_name = "notification.rejected",
                status = status.as_u16(),
                subject = %email.subject,
                "mail provider rejected message"
            );
            return Err(DispatchError::Rejected(format!("{status}: {detail}")));
        }

        let parsed = response.json::<SendResponse>().await.unwrap_or_default();
        Ok(DispatchReceipt { message_id: parsed.id.unwrap_or_else(|| Uuid::new_v4().to_string()) })
    }
}

pub fn dispatcher_from_config(
    config: &NotificationsConfig,
) -> Result<Arc<dyn NotificationDispatcher>, DispatchError> {
    match config.provider {
        NotificationProvider::Log => Ok(Arc::new(LogOnlyDispatcher)),
        NotificationProvider::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                DispatchError::Misconfigured("notifications.endpoint is not set".to_string())
            })?;
            let api_key = config.api_key.clone().ok_or_else(|| {
                DispatchError::Misconfigured("notifications.api_key is not set".to_string())
            })?;
            let dispatcher = HttpNotificationDispatcher::new(
                endpoint,
                api_key,
                config.from_address.clone(),
                Duration::from_secs(config.timeout_secs),
            )?;
            Ok(Arc::new(dispatcher))
        }
    }
}
