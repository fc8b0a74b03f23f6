use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};

use crate::domain::notification::NotificationType;
use crate::domain::purchase_request::{PrStatus, PurchaseRequest, QuoteId};

use super::NotifyError;

const TEMPLATES: &[(&str, &str)] = &[
    ("status_change.txt", include_str!("../../templates/notifications/status_change.txt")),
    ("status_change.html", include_str!("../../templates/notifications/status_change.html")),
    ("digest.txt", include_str!("../../templates/notifications/digest.txt")),
    ("digest.html", include_str!("../../templates/notifications/digest.html")),
    ("delivery_delay.txt", include_str!("../../templates/notifications/delivery_delay.txt")),
    ("delivery_delay.html", include_str!("../../templates/notifications/delivery_delay.html")),
    ("vendor_expiry.txt", include_str!("../../templates/notifications/vendor_expiry.txt")),
    ("vendor_expiry.html", include_str!("../../templates/notifications/vendor_expiry.html")),
    ("quote_conflict.txt", include_str!("../../templates/notifications/quote_conflict.txt")),
    ("quote_conflict.html", include_str!("../../templates/notifications/quote_conflict.html")),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusChangeMessage {
    pub pr_number: String,
    pub status_label: String,
    pub description: String,
    pub amount: String,
    pub actor: String,
    pub notes: Option<String>,
    pub action_required: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DigestItem {
    pub pr_number: String,
    pub status: String,
    pub description: String,
    pub amount: String,
    pub business_days_open: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DigestMessage {
    pub audience: String,
    pub organization: String,
    pub urgent: bool,
    pub items: Vec<DigestItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryDelayMessage {
    pub pr_number: String,
    pub description: String,
    pub estimated_delivery: String,
    pub business_days_overdue: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VendorExpiryMessage {
    pub vendor_name: String,
    pub organization: String,
    pub high_value: bool,
    pub approval_reason: String,
    pub expired_on: String,
    pub months_approved: u32,
    pub three_quote_window: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuoteConflictMessage {
    pub pr_number: String,
    pub description: String,
    pub first_quote: String,
    pub second_quote: String,
    pub days_in_conflict: i64,
}

impl StatusChangeMessage {
    pub fn for_request(request: &PurchaseRequest, actor: &str, action_required: Option<&str>) -> Self {
        Self {
            pr_number: request.pr_number.clone(),
            status_label: status_label(request.status).to_string(),
            description: request.description.clone().unwrap_or_default(),
            amount: format_amount(request.estimated_amount, request.currency.as_deref()),
            actor: actor.to_string(),
            notes: request.status_history.last().and_then(|entry| entry.notes.clone()),
            action_required: action_required.map(str::to_string),
        }
    }
}

impl DigestItem {
    pub fn for_request(request: &PurchaseRequest, business_days_open: i64) -> Self {
        Self {
            pr_number: request.pr_number.clone(),
            status: status_label(request.status).to_string(),
            description: request.description.clone().unwrap_or_default(),
            amount: format_amount(request.estimated_amount, request.currency.as_deref()),
            business_days_open,
        }
    }
}

impl QuoteConflictMessage {
    pub fn for_request(request: &PurchaseRequest, days_in_conflict: i64) -> Self {
        let workflow = &request.approval_workflow;
        Self {
            pr_number: request.pr_number.clone(),
            description: request.description.clone().unwrap_or_default(),
            first_quote: describe_quote(request, workflow.first_approver_selected_quote_id.as_ref()),
            second_quote: describe_quote(request, workflow.second_approver_selected_quote_id.as_ref()),
            days_in_conflict,
        }
    }
}

pub fn status_label(status: PrStatus) -> &'static str {
    match status {
        PrStatus::Draft => "Draft",
        PrStatus::Submitted => "Submitted",
        PrStatus::InQueue => "In procurement queue",
        PrStatus::PendingApproval => "Pending approval",
        PrStatus::Approved => "Approved",
        PrStatus::Ordered => "Ordered",
        PrStatus::Completed => "Completed",
        PrStatus::RevisionRequired => "Revision required",
        PrStatus::Rejected => "Rejected",
        PrStatus::Canceled => "Canceled",
    }
}

pub fn format_amount(amount: Option<Decimal>, currency: Option<&str>) -> String {
    match (amount, currency) {
        (Some(amount), Some(currency)) => format!("{currency} {}", amount.round_dp(2)),
        (Some(amount), None) => amount.round_dp(2).to_string(),
        (None, _) => "not estimated".to_string(),
    }
}

fn describe_quote(request: &PurchaseRequest, quote_id: Option<&QuoteId>) -> String {
    match quote_id.and_then(|id| request.quote(id)) {
        Some(quote) => format!("{} ({} {})", quote.vendor_name, quote.currency, quote.amount.round_dp(2)),
        None => quote_id.map(|id| id.0.clone()).unwrap_or_else(|| "none".to_string()),
    }
}

/// A notification body awaiting rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    StatusChange(StatusChangeMessage),
    Digest(DigestMessage),
    DeliveryDelay(DeliveryDelayMessage),
    VendorExpiry(VendorExpiryMessage),
    QuoteConflict(QuoteConflictMessage),
}

impl Message {
    pub fn notification_type(&self) -> NotificationType {
        match self {
            Self::StatusChange(_) => NotificationType::StatusChange,
            Self::Digest(digest) if digest.urgent => NotificationType::UrgentReminder,
            Self::Digest(_) => NotificationType::DailyReminder,
            Self::DeliveryDelay(_) => NotificationType::DeliveryDelay,
            Self::VendorExpiry(expiry) if expiry.high_value => NotificationType::HighValueVendorExpiry,
            Self::VendorExpiry(_) => NotificationType::VendorExpiry,
            Self::QuoteConflict(_) => NotificationType::QuoteConflict,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::StatusChange(message) => {
                format!("PR {}: {}", message.pr_number, message.status_label)
            }
            Self::Digest(message) => format!(
                "{}{} purchase request(s) awaiting {}",
                if message.urgent { "URGENT: " } else { "" },
                message.items.len(),
                message.audience
            ),
            Self::DeliveryDelay(message) => {
                format!("Delivery overdue for PR {}", message.pr_number)
            }
            Self::VendorExpiry(message) if message.high_value => {
                format!("High-value vendor approval expired: {}", message.vendor_name)
            }
            Self::VendorExpiry(message) => {
                format!("Vendor approval expired: {}", message.vendor_name)
            }
            Self::QuoteConflict(message) => {
                format!("Quote conflict on PR {} ({} days)", message.pr_number, message.days_in_conflict)
            }
        }
    }

    fn template_stem(&self) -> &'static str {
        match self {
            Self::StatusChange(_) => "status_change",
            Self::Digest(_) => "digest",
            Self::DeliveryDelay(_) => "delivery_delay",
            Self::VendorExpiry(_) => "vendor_expiry",
            Self::QuoteConflict(_) => "quote_conflict",
        }
    }

    fn context(&self) -> Result<Context, tera::Error> {
        match self {
            Self::StatusChange(message) => Context::from_serialize(message),
            Self::Digest(message) => Context::from_serialize(message),
            Self::DeliveryDelay(message) => Context::from_serialize(message),
            Self::VendorExpiry(message) => Context::from_serialize(message),
            Self::QuoteConflict(message) => Context::from_serialize(message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Renders notification bodies from the embedded templates. HTML templates are autoescaped.
#[derive(Clone, Debug)]
pub struct NotificationRenderer {
    tera: Tera,
}

impl NotificationRenderer {
    pub fn embedded() -> Result<Self, NotifyError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())
            .map_err(|error| NotifyError::Render(error.to_string()))?;
        Ok(Self { tera })
    }

    pub fn render(&self, message: &Message) -> Result<RenderedMessage, NotifyError> {
        let context = message.context().map_err(|error| NotifyError::Render(error.to_string()))?;
        let stem = message.template_stem();
        let render = |extension: &str| {
            self.tera
                .render(&format!("{stem}.{extension}"), &context)
                .map_err(|error| NotifyError::Render(format!("{stem}.{extension}: {error}")))
        };
        Ok(RenderedMessage { subject: message.subject(), text: render("txt")?, html: render("html")? })
    }
}

#[cfg(test)]
mod tests {
    use super::{DigestItem, DigestMessage, Message, NotificationRenderer, StatusChangeMessage};
    use crate::domain::notification::NotificationType;

    #[test]
    fn html_bodies_are_escaped_and_text_bodies_are_not() {
        let renderer = NotificationRenderer::embedded().expect("templates load");
        let rendered = renderer
            .render(&Message::StatusChange(StatusChangeMessage {
                pr_number: "PR-0007".to_string(),
                status_label: "Submitted".to_string(),
                description: "Cables <cat6> & connectors".to_string(),
                amount: "LSL 1200.00".to_string(),
                actor: "Palesa".to_string(),
                notes: None,
                action_required: Some("Review and queue the request".to_string()),
            }))
            .expect("render");

        assert_eq!(rendered.subject, "PR PR-0007: Submitted");
        assert!(rendered.html.contains("Cables &lt;cat6&gt; &amp; connectors"));
        assert!(rendered.text.contains("Cables <cat6> & connectors"));
        assert!(rendered.text.contains("Action required: Review and queue the request"));
    }

    #[test]
    fn urgent_digest_uses_urgent_type_and_lists_every_item() {
        let renderer = NotificationRenderer::embedded().expect("templates load");
        let message = Message::Digest(DigestMessage {
            audience: "approval".to_string(),
            organization: "Org One".to_string(),
            urgent: true,
            items: vec![
                DigestItem {
                    pr_number: "PR-1".to_string(),
                    status: "PENDING_APPROVAL".to_string(),
                    description: "Chairs".to_string(),
                    amount: "LSL 900.00".to_string(),
                    business_days_open: 4,
                },
                DigestItem {
                    pr_number: "PR-2".to_string(),
                    status: "PENDING_APPROVAL".to_string(),
                    description: "Desks".to_string(),
                    amount: "LSL 4000.00".to_string(),
                    business_days_open: 6,
                },
            ],
        });

        assert_eq!(message.notification_type(), NotificationType::UrgentReminder);
        let rendered = renderer.render(&message).expect("render");
        assert!(rendered.subject.starts_with("URGENT: 2 purchase request(s)"));
        assert!(rendered.text.contains("PR-1") && rendered.text.contains("PR-2"));
    }
}
