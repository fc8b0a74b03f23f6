use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditContext, AuditSink};
use crate::domain::notification::NotificationSubject;
use crate::domain::organization::Organization;
use crate::domain::purchase_request::{ApproverSlot, PrStatus, PurchaseRequest, PurchaseRequestId, QuoteId};
use crate::domain::user::{PermissionLevel, User, UserId};
use crate::domain::vendor::VendorId;
use crate::errors::{ApplicationError, DomainError};
use crate::notifications::{Message, Notifier, QuoteConflictMessage, StatusChangeMessage};
use crate::ports::Ports;
use crate::rules::{Decision, RuleEngine};
use crate::vendors::VendorApprovalLifecycle;
use crate::workflow::engine::StatusStateMachine;
use crate::workflow::states::{Actor, Transition, WorkflowAction, WorkflowCommand, WorkflowEffect};

/// Who is calling, under which correlation id, and at what instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub caller: UserId,
    pub correlation_id: String,
    pub at: DateTime<Utc>,
}

impl Invocation {
    pub fn new(caller: UserId) -> Self {
        Self { caller, correlation_id: Uuid::new_v4().to_string(), at: Utc::now() }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }
}

/// Interactive purchase-request operations.
///
/// Each call loads the request and the caller, applies the state machine,
/// and writes the result back with a version check. Notifications go out
/// after the write and never undo it.
#[derive(Clone)]
pub struct WorkflowService {
    ports: Ports,
    notifier: Notifier,
    machine: StatusStateMachine,
    rules: RuleEngine,
    lifecycle: VendorApprovalLifecycle,
    audit: Arc<dyn AuditSink>,
}

impl WorkflowService {
    pub fn new(ports: Ports, notifier: Notifier, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            ports,
            notifier,
            machine: StatusStateMachine::new(),
            rules: RuleEngine,
            lifecycle: VendorApprovalLifecycle::default(),
            audit,
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: VendorApprovalLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub async fn get(&self, pr_id: &PurchaseRequestId) -> Result<PurchaseRequest, ApplicationError> {
        self.ports
            .purchase_requests
            .get(pr_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("purchase request", pr_id.0.clone()))
    }

    pub async fn submit(
        &self,
        pr_id: &PurchaseRequestId,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        self.execute(pr_id, WorkflowCommand::Submit, call).await
    }

    pub async fn enqueue(
        &self,
        pr_id: &PurchaseRequestId,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        self.execute(pr_id, WorkflowCommand::Enqueue, call).await
    }

    /// Evaluates the organization's rules against the request and routes it
    /// to its nominated approvers. Missing rules block routing.
    pub async fn route_to_approval(
        &self,
        pr_id: &PurchaseRequestId,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        let current = self.get(pr_id).await?;
        let caller = self.caller(call).await?;
        if current.status != PrStatus::InQueue {
            return Err(DomainError::InvalidTransition {
                from: current.status,
                action: WorkflowAction::RouteToApproval,
            }
            .into());
        }

        let (Some(amount), Some(currency)) = (current.estimated_amount, current.currency.as_deref())
        else {
            return Err(DomainError::Validation(
                "estimated amount and currency are required for routing".to_string(),
            )
            .into());
        };
        let rules = self.ports.rules.find_rules(&current.organization_id).await?;
        let decision =
            self.rules.evaluate_for(&current.organization_id, rules.as_ref(), amount, currency)?;
        self.check_nominees(&current, &decision).await?;

        self.run(current, caller, WorkflowCommand::RouteToApproval { decision }, call).await
    }

    pub async fn approve(
        &self,
        pr_id: &PurchaseRequestId,
        slot: ApproverSlot,
        quote_id: QuoteId,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        self.execute(pr_id, WorkflowCommand::Approve { slot, quote_id }, call).await
    }

    pub async fn reject(
        &self,
        pr_id: &PurchaseRequestId,
        reason: impl Into<String>,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        self.execute(pr_id, WorkflowCommand::Reject { reason: reason.into() }, call).await
    }

    pub async fn request_revision(
        &self,
        pr_id: &PurchaseRequestId,
        notes: impl Into<String>,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        self.execute(pr_id, WorkflowCommand::RequestRevision { notes: notes.into() }, call).await
    }

    pub async fn mark_ordered(
        &self,
        pr_id: &PurchaseRequestId,
        estimated_delivery_date: Option<DateTime<Utc>>,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        self.execute(pr_id, WorkflowCommand::MarkOrdered { estimated_delivery_date }, call).await
    }

    pub async fn mark_completed(
        &self,
        pr_id: &PurchaseRequestId,
        final_amount: Option<Decimal>,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        self.execute(pr_id, WorkflowCommand::MarkCompleted { final_amount }, call).await
    }

    pub async fn cancel(
        &self,
        pr_id: &PurchaseRequestId,
        reason: Option<String>,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        self.execute(pr_id, WorkflowCommand::Cancel { reason }, call).await
    }

    pub async fn record_status_override(
        &self,
        pr_id: &PurchaseRequestId,
        status: PrStatus,
        notes: impl Into<String>,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        self.execute(pr_id, WorkflowCommand::RecordOverride { status, notes: notes.into() }, call)
            .await
    }

    async fn execute(
        &self,
        pr_id: &PurchaseRequestId,
        command: WorkflowCommand,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        let current = self.get(pr_id).await?;
        let caller = self.caller(call).await?;
        self.run(current, caller, command, call).await
    }

    async fn run(
        &self,
        current: PurchaseRequest,
        caller: User,
        command: WorkflowCommand,
        call: &Invocation,
    ) -> Result<Transition, ApplicationError> {
        let actor = Actor::from(&caller);
        let audit =
            AuditContext::new(Some(current.id.clone()), call.correlation_id.as_str(), caller.id.0.as_str());
        let mut transition = self.machine.apply_with_audit(
            &current,
            &command,
            &actor,
            call.at,
            self.audit.as_ref(),
            &audit,
        )?;

        transition.request = self.ports.purchase_requests.update(transition.request.clone()).await?;
        info!(
            event_name = "workflow.transition_persisted",
            correlation_id = %call.correlation_id,
            pr_id = %transition.request.id,
            from = %transition.outcome.from,
            to = %transition.outcome.to,
            version = transition.request.version,
            "purchase request updated"
        );

        if transition.outcome.action == WorkflowAction::MarkCompleted {
            self.record_vendor_order(&transition.request, call).await;
        }
        self.announce(&transition, &caller, call).await;
        Ok(transition)
    }

    async fn caller(&self, call: &Invocation) -> Result<User, ApplicationError> {
        let user = self
            .ports
            .users
            .get_user(&call.caller)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", call.caller.0.clone()))?;
        if !user.active {
            return Err(DomainError::Permission(format!("user `{}` is inactive", user.id)).into());
        }
        Ok(user)
    }

    async fn check_nominees(
        &self,
        request: &PurchaseRequest,
        decision: &Decision,
    ) -> Result<(), ApplicationError> {
        let mut nominees = Vec::new();
        nominees.extend(request.approver.iter());
        if decision.requires_dual_approval {
            nominees.extend(request.approver2.iter());
        }

        for nominee in nominees {
            let user = self
                .ports
                .users
                .get_user(nominee)
                .await?
                .ok_or_else(|| ApplicationError::not_found("user", nominee.0.clone()))?;
            if !user.active {
                return Err(DomainError::Validation(format!("approver `{nominee}` is inactive")).into());
            }
            if user.organization_id != request.organization_id
                && user.permission_level != PermissionLevel::Admin
            {
                return Err(DomainError::Validation(format!(
                    "approver `{nominee}` belongs to another organization"
                ))
                .into());
            }
            if !user.permission_level.can_approve(decision.approver_level) {
                return Err(DomainError::Validation(format!(
                    "approver `{nominee}` cannot sign off {:?}-level amounts",
                    decision.approver_level
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Feeds a completed order into the selected vendor's approval record.
    async fn record_vendor_order(&self, request: &PurchaseRequest, call: &Invocation) {
        let workflow = &request.approval_workflow;
        let Some(quote) = workflow.first_approver_selected_quote_id.as_ref().and_then(|id| request.quote(id))
        else {
            return;
        };
        let Some(vendor_id) = quote.vendor_id.clone().map(VendorId) else {
            return;
        };
        let order_value = request.final_amount.unwrap_or(quote.amount);

        if let Err(error) = self.apply_vendor_order(request, &vendor_id, order_value, call.at).await {
            warn!(
                event_name = "workflow.vendor_update_failed",
                correlation_id = %call.correlation_id,
                pr_id = %request.id,
                vendor_id = %vendor_id,
                error = %error,
                "completed order was not recorded on the vendor"
            );
        }
    }

    async fn apply_vendor_order(
        &self,
        request: &PurchaseRequest,
        vendor_id: &VendorId,
        order_value: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let vendor = self
            .ports
            .vendors
            .get(vendor_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("vendor", vendor_id.0.clone()))?;
        let organization = self.organization(request).await?;
        let rules = self
            .ports
            .rules
            .find_rules(&request.organization_id)
            .await?
            .ok_or_else(|| DomainError::RulesNotInitialized {
                organization_id: request.organization_id.clone(),
                missing: crate::domain::organization::RuleNumber::ALL.to_vec(),
            })?;
        let updated = self.lifecycle.record_completed_order(&vendor, order_value, &organization, &rules, at)?;
        self.ports.vendors.update(updated).await?;
        Ok(())
    }

    async fn organization(&self, request: &PurchaseRequest) -> Result<Organization, ApplicationError> {
        self.ports
            .organizations
            .get(&request.organization_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("organization", request.organization_id.0.clone()))
    }

    async fn announce(&self, transition: &Transition, caller: &User, call: &Invocation) {
        let request = &transition.request;
        let procurement = match self.organization(request).await {
            Ok(organization) => organization.procurement_email,
            Err(error) => {
                warn!(
                    event_name = "workflow.organization_lookup_failed",
                    correlation_id = %call.correlation_id,
                    pr_id = %request.id,
                    error = %error,
                    "procurement address unavailable"
                );
                None
            }
        };
        let status_change = |action: Option<&str>| {
            Message::StatusChange(StatusChangeMessage::for_request(request, caller.display_name(), action))
        };

        for effect in &transition.outcome.effects {
            let (to, cc, message) = match effect {
                WorkflowEffect::NotifyProcurement => {
                    let action = match request.status {
                        PrStatus::Submitted => Some("Review the request and accept it into the queue"),
                        PrStatus::Approved => Some("Place the order with the selected vendor"),
                        _ => None,
                    };
                    (procurement.iter().cloned().collect(), Vec::new(), status_change(action))
                }
                WorkflowEffect::NotifyApprovers => {
                    let approvers: Vec<UserId> = request
                        .approval_workflow
                        .outstanding_approvers()
                        .into_iter()
                        .cloned()
                        .collect();
                    (
                        self.emails(&approvers).await,
                        Vec::new(),
                        status_change(Some("Select a quote and approve, reject or request a revision")),
                    )
                }
                WorkflowEffect::NotifyRequestor => {
                    let action = (request.status == PrStatus::RevisionRequired)
                        .then_some("Update the request and resubmit it");
                    (
                        self.emails(std::slice::from_ref(&request.requestor)).await,
                        Vec::new(),
                        status_change(action),
                    )
                }
                WorkflowEffect::AwaitingOtherApprover { slot } => {
                    let other = match slot {
                        ApproverSlot::First => ApproverSlot::Second,
                        ApproverSlot::Second => ApproverSlot::First,
                    };
                    let waiting: Vec<UserId> =
                        request.approval_workflow.assignee(other).into_iter().cloned().collect();
                    (
                        self.emails(&waiting).await,
                        Vec::new(),
                        status_change(Some("Select a quote to complete the dual approval")),
                    )
                }
                WorkflowEffect::QuoteConflictDetected => {
                    let workflow = &request.approval_workflow;
                    let approvers: Vec<UserId> = workflow
                        .current_approver
                        .iter()
                        .chain(workflow.second_approver.iter())
                        .cloned()
                        .collect();
                    (
                        self.emails(&approvers).await,
                        procurement.iter().cloned().collect(),
                        Message::QuoteConflict(QuoteConflictMessage::for_request(request, 0)),
                    )
                }
                WorkflowEffect::QuoteConflictResolved => continue,
            };

            if to.is_empty() {
                debug!(
                    event_name = "workflow.notification_skipped",
                    correlation_id = %call.correlation_id,
                    pr_id = %request.id,
                    effect = ?effect,
                    "no recipient address on file"
                );
                continue;
            }
            let subject = NotificationSubject::PurchaseRequest(request.id.clone());
            if let Err(error) = self.notifier.notify(subject, to, cc, &message, call.at).await {
                warn!(
                    event_name = "workflow.notification_failed",
                    correlation_id = %call.correlation_id,
                    pr_id = %request.id,
                    effect = ?effect,
                    error = %error,
                    "status notification failed; transition stands"
                );
            }
        }
    }

    async fn emails(&self, users: &[UserId]) -> Vec<String> {
        let mut emails = Vec::new();
        for id in users {
            match self.ports.users.get_user(id).await {
                Ok(Some(user)) if user.active => emails.push(user.email),
                Ok(_) => {}
                Err(error) => warn!(
                    event_name = "workflow.user_lookup_failed",
                    user_id = %id,
                    error = %error,
                    "recipient lookup failed"
                ),
            }
        }
        emails
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{Invocation, WorkflowService};
    use crate::audit::InMemoryAuditSink;
    use crate::domain::notification::{DeliveryStatus, NotificationType};
    use crate::domain::organization::{Organization, OrganizationId, RuleNumber, RuleThreshold};
    use crate::domain::purchase_request::{
        ApproverSlot, PrStatus, PurchaseRequest, PurchaseRequestId, QuoteId, VendorQuote,
    };
    use crate::domain::user::{PermissionLevel, User, UserId};
    use crate::domain::vendor::{Vendor, VendorId};
    use crate::errors::ErrorKind;
    use crate::notifications::Notifier;
    use crate::ports::memory::MemoryPorts;
    use crate::ports::{
        OrganizationStore, PurchaseRequestStore, RuleStore, UserDirectory, VendorStore,
    };

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap()
    }

    fn org() -> OrganizationId {
        OrganizationId("org-1".to_string())
    }

    fn user(id: &str, level: PermissionLevel) -> User {
        User {
            id: UserId(id.to_string()),
            email: format!("{id}@org.test"),
            name: None,
            permission_level: level,
            organization_id: org(),
            active: true,
        }
    }

    fn call(caller: &str, day: u32) -> Invocation {
        Invocation::new(UserId(caller.to_string())).with_correlation_id("req-1").at(at(day))
    }

    async fn seed(memory: &MemoryPorts, with_rules: bool) {
        memory
            .organizations
            .save(Organization {
                id: org(),
                name: "Org One".to_string(),
                procurement_email: Some("procurement@org.test".to_string()),
                finance_email: None,
                asset_management_email: None,
                vendor_approval_3quote_duration: 12,
                vendor_approval_completed_duration: 12,
                vendor_approval_manual_duration: 6,
                high_value_vendor_max_duration: 24,
                high_value_vendor_multiplier: Decimal::from(2),
                active: true,
            })
            .await
            .expect("org");
        for (id, level) in [
            ("requestor", PermissionLevel::Requester),
            ("buyer", PermissionLevel::Procurement),
            ("approver-a", PermissionLevel::SeniorApprover),
            ("approver-b", PermissionLevel::SeniorApprover),
            ("clerk", PermissionLevel::FinanceApprover),
        ] {
            memory.users.save_user(user(id, level)).await.expect("user");
        }
        if with_rules {
            for (rule, threshold) in [
                (RuleNumber::Rule1, RuleThreshold::with_uom(Decimal::from(50_000), "LSL")),
                (RuleNumber::Rule2, RuleThreshold::new(Decimal::from(2))),
                (RuleNumber::Rule3, RuleThreshold::with_uom(Decimal::from(250_000), "LSL")),
                (RuleNumber::Rule4, RuleThreshold::new(Decimal::from(3))),
                (RuleNumber::Rule5, RuleThreshold::new(Decimal::from(2))),
                (RuleNumber::Rule6, RuleThreshold::new(Decimal::from(5))),
                (RuleNumber::Rule7, RuleThreshold::new(Decimal::from(10))),
            ] {
                memory.rules.save_rule(&org(), rule, threshold).await.expect("rule");
            }
        }
    }

    async fn draft(memory: &MemoryPorts, id: &str, amount: i64, approver: &str) -> PurchaseRequestId {
        let mut pr = PurchaseRequest::draft(
            PurchaseRequestId(id.to_string()),
            format!("PR-{id}"),
            org(),
            UserId("requestor".to_string()),
            at(2),
        );
        pr.description = Some("Office chairs".to_string());
        pr.estimated_amount = Some(Decimal::from(amount));
        pr.currency = Some("LSL".to_string());
        pr.quotes = vec![
            VendorQuote {
                id: QuoteId("Q1".to_string()),
                vendor_name: "Chairs Ltd".to_string(),
                vendor_id: Some("vendor-1".to_string()),
                amount: Decimal::from(amount),
                currency: "LSL".to_string(),
            },
            VendorQuote {
                id: QuoteId("Q2".to_string()),
                vendor_name: "Seats Inc".to_string(),
                vendor_id: None,
                amount: Decimal::from(amount + 500),
                currency: "LSL".to_string(),
            },
        ];
        pr.approver = Some(UserId(approver.to_string()));
        pr.approver2 = Some(UserId("approver-b".to_string()));
        memory.purchase_requests.insert(pr).await.expect("insert").id
    }

    fn service(memory: &MemoryPorts) -> WorkflowService {
        let ports = memory.ports();
        let notifier = Notifier::from_ports(&ports).expect("notifier");
        WorkflowService::new(ports, notifier, Arc::new(InMemoryAuditSink::default()))
    }

    async fn to_pending(service: &WorkflowService, id: &PurchaseRequestId) -> PurchaseRequest {
        service.submit(id, &call("requestor", 3)).await.expect("submit");
        service.enqueue(id, &call("buyer", 3)).await.expect("enqueue");
        service.route_to_approval(id, &call("buyer", 3)).await.expect("route").request
    }

    #[tokio::test]
    async fn single_approval_path_persists_each_step_and_notifies() {
        let memory = MemoryPorts::default();
        seed(&memory, true).await;
        let id = draft(&memory, "pr-1", 20_000, "approver-a").await;
        let service = service(&memory);

        let pending = to_pending(&service, &id).await;
        assert_eq!(pending.status, PrStatus::PendingApproval);
        assert!(!pending.approval_workflow.requires_dual_approval);
        assert_eq!(pending.version, 3);

        let approved = service
            .approve(&id, ApproverSlot::First, QuoteId("Q1".to_string()), &call("approver-a", 4))
            .await
            .expect("approve");
        assert_eq!(approved.request.status, PrStatus::Approved);

        let stored = service.get(&id).await.expect("stored");
        assert_eq!(stored, approved.request);

        let sent = memory.dispatcher.sent().await;
        assert!(sent.iter().any(|email| email.to == vec!["procurement@org.test".to_string()]
            && email.subject.contains("Submitted")));
        assert!(sent.iter().any(|email| email.to == vec!["approver-a@org.test".to_string()]));
        assert!(sent.iter().any(|email| email.to == vec!["requestor@org.test".to_string()]
            && email.subject.contains("Approved")));
    }

    #[tokio::test]
    async fn routing_without_rules_is_a_config_error_and_writes_nothing() {
        let memory = MemoryPorts::default();
        seed(&memory, false).await;
        let id = draft(&memory, "pr-2", 20_000, "approver-a").await;
        let service = service(&memory);
        service.submit(&id, &call("requestor", 3)).await.expect("submit");
        let queued = service.enqueue(&id, &call("buyer", 3)).await.expect("enqueue").request;

        let error = service.route_to_approval(&id, &call("buyer", 3)).await.expect_err("no rules");
        assert_eq!(error.kind(), ErrorKind::Config);
        assert_eq!(service.get(&id).await.expect("stored"), queued);
    }

    #[tokio::test]
    async fn nominee_without_authority_for_the_amount_is_refused() {
        let memory = MemoryPorts::default();
        seed(&memory, true).await;
        let id = draft(&memory, "pr-3", 120_000, "clerk").await;
        let service = service(&memory);
        service.submit(&id, &call("requestor", 3)).await.expect("submit");
        service.enqueue(&id, &call("buyer", 3)).await.expect("enqueue");

        let error = service.route_to_approval(&id, &call("buyer", 3)).await.expect_err("finance only");
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(error.to_string().contains("clerk"));
    }

    #[tokio::test]
    async fn requestor_cannot_route_and_unknown_callers_are_not_found() {
        let memory = MemoryPorts::default();
        seed(&memory, true).await;
        let id = draft(&memory, "pr-4", 20_000, "approver-a").await;
        let service = service(&memory);
        service.submit(&id, &call("requestor", 3)).await.expect("submit");

        let error = service.enqueue(&id, &call("requestor", 3)).await.expect_err("not procurement");
        assert_eq!(error.kind(), ErrorKind::Permission);

        let error = service.enqueue(&id, &call("ghost", 3)).await.expect_err("unknown caller");
        assert_eq!(error.kind(), ErrorKind::NotFound);

        let error = service
            .enqueue(&PurchaseRequestId("missing".to_string()), &call("buyer", 3))
            .await
            .expect_err("unknown request");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn notification_failure_does_not_undo_the_transition() {
        let memory = MemoryPorts::default();
        seed(&memory, true).await;
        memory.dispatcher.fail_for_recipient("procurement@org.test").await;
        let id = draft(&memory, "pr-5", 20_000, "approver-a").await;
        let service = service(&memory);

        let submitted = service.submit(&id, &call("requestor", 3)).await.expect("submit stands");
        assert_eq!(submitted.request.status, PrStatus::Submitted);
        assert_eq!(service.get(&id).await.expect("stored").status, PrStatus::Submitted);

        let logs = memory.notification_logs.all().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_transient_and_sends_nothing() {
        let memory = MemoryPorts::default();
        seed(&memory, true).await;
        let id = draft(&memory, "pr-6", 20_000, "approver-a").await;
        memory.purchase_requests.fail_updates_for(&id).await;
        let service = service(&memory);

        let error = service.submit(&id, &call("requestor", 3)).await.expect_err("write fails");
        assert_eq!(error.kind(), ErrorKind::TransientIo);
        assert_eq!(service.get(&id).await.expect("stored").status, PrStatus::Draft);
        assert!(memory.dispatcher.sent().await.is_empty());
    }

    #[tokio::test]
    async fn dual_approval_conflict_notifies_both_approvers() {
        let memory = MemoryPorts::default();
        seed(&memory, true).await;
        let id = draft(&memory, "pr-7", 120_000, "approver-a").await;
        let service = service(&memory);
        let pending = to_pending(&service, &id).await;
        assert!(pending.approval_workflow.requires_dual_approval);

        service
            .approve(&id, ApproverSlot::First, QuoteId("Q1".to_string()), &call("approver-a", 4))
            .await
            .expect("first");
        let conflicted = service
            .approve(&id, ApproverSlot::Second, QuoteId("Q2".to_string()), &call("approver-b", 4))
            .await
            .expect("second");
        assert!(conflicted.request.approval_workflow.quote_conflict);
        assert_eq!(conflicted.request.status, PrStatus::PendingApproval);

        let logs = memory.notification_logs.all().await;
        let conflict = logs
            .iter()
            .find(|log| log.notification_type == NotificationType::QuoteConflict)
            .expect("conflict notice");
        assert_eq!(
            conflict.recipients,
            vec!["approver-a@org.test".to_string(), "approver-b@org.test".to_string()]
        );
        assert_eq!(conflict.cc, vec!["procurement@org.test".to_string()]);
    }

    #[tokio::test]
    async fn completing_an_order_approves_the_selected_vendor() {
        let memory = MemoryPorts::default();
        seed(&memory, true).await;
        memory
            .vendors
            .insert(Vendor::new(VendorId("vendor-1".to_string()), org(), "Chairs Ltd", at(1)))
            .await
            .expect("vendor");
        let id = draft(&memory, "pr-8", 20_000, "approver-a").await;
        let service = service(&memory);
        to_pending(&service, &id).await;
        service
            .approve(&id, ApproverSlot::First, QuoteId("Q1".to_string()), &call("approver-a", 4))
            .await
            .expect("approve");
        service.mark_ordered(&id, Some(at(10)), &call("buyer", 5)).await.expect("order");
        let done = service
            .mark_completed(&id, Some(Decimal::from(21_000)), &call("buyer", 12))
            .await
            .expect("complete");
        assert_eq!(done.request.status, PrStatus::Completed);

        let vendor = memory
            .vendors
            .get(&VendorId("vendor-1".to_string()))
            .await
            .expect("get")
            .expect("vendor");
        assert!(vendor.is_approved);
        assert_eq!(vendor.cumulative_order_value, Decimal::from(21_000));
        assert_eq!(vendor.last_completed_order_date, Some(at(12)));
    }
}
