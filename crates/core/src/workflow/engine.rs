use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::approvals::{ConflictResolution, QuoteConflictResolver};
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::purchase_request::{
    ApprovalAction, ApprovalHistoryEntry, ApprovalWorkflow, ApproverSlot, PrStatus,
    PurchaseRequest, QuoteId, StatusHistoryEntry,
};
use crate::errors::DomainError;
use crate::rules::{Decision, RuleEngine};
use crate::workflow::states::{
    Actor, Transition, TransitionOutcome, WorkflowAction, WorkflowCommand, WorkflowEffect,
};

/// Purchase-request status state machine.
///
/// `apply` never mutates its input: on error the caller still holds the
/// unchanged document, on success it receives an updated copy whose status
/// history ends with the new status.
#[derive(Clone, Debug, Default)]
pub struct StatusStateMachine {
    rules: RuleEngine,
    resolver: QuoteConflictResolver,
}

impl StatusStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(
        &self,
        current: &PurchaseRequest,
        command: &WorkflowCommand,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<Transition, DomainError> {
        let action = command.action();
        let from = current.status;
        if !is_allowed(from, command) {
            return Err(DomainError::InvalidTransition { from, action });
        }
        ensure_same_organization(current, actor)?;

        let mut request = current.clone();
        let mut effects = Vec::new();
        let mut conflict = None;

        match command {
            WorkflowCommand::Submit => {
                ensure_requestor_or_procurement(current, actor, action)?;
                let missing = current.missing_required_fields();
                if !missing.is_empty() {
                    return Err(DomainError::Validation(format!(
                        "missing required fields: {}",
                        missing.join(", ")
                    )));
                }
                let notes = if from == PrStatus::RevisionRequired {
                    reset_cycle(&mut request.approval_workflow);
                    "resubmitted after revision"
                } else {
                    "submitted for procurement review"
                };
                request.push_history(PrStatus::Submitted, &actor.user_id, Some(notes.to_string()), at);
                effects.push(WorkflowEffect::NotifyProcurement);
            }
            WorkflowCommand::Enqueue => {
                ensure_procurement(actor, action)?;
                request.push_history(
                    PrStatus::InQueue,
                    &actor.user_id,
                    Some("accepted into procurement queue".to_string()),
                    at,
                );
            }
            WorkflowCommand::RouteToApproval { decision } => {
                ensure_procurement(actor, action)?;
                route(&mut request, decision, at)?;
                let notes = if decision.requires_dual_approval {
                    "routed for dual approval"
                } else {
                    "routed for approval"
                };
                request.push_history(
                    PrStatus::PendingApproval,
                    &actor.user_id,
                    Some(notes.to_string()),
                    at,
                );
                effects.push(WorkflowEffect::NotifyApprovers);
            }
            WorkflowCommand::Approve { slot, quote_id } => {
                let (to, notes, resolution) =
                    self.approve(&mut request, *slot, quote_id, actor, at, &mut effects)?;
                conflict = resolution;
                request.push_history(to, &actor.user_id, Some(notes), at);
            }
            WorkflowCommand::Reject { reason } => {
                let reason = required_text(reason, "a rejection reason is required")?;
                if !actor.is_admin() && assigned_slot(&request.approval_workflow, actor).is_none() {
                    return Err(DomainError::Permission(format!(
                        "user `{}` is not an assigned approver",
                        actor.user_id
                    )));
                }
                record_approval(&mut request, actor, ApprovalAction::Rejected, None, Some(&reason), at);
                request.push_history(PrStatus::Rejected, &actor.user_id, Some(reason), at);
                effects.extend([WorkflowEffect::NotifyRequestor, WorkflowEffect::NotifyProcurement]);
            }
            WorkflowCommand::RequestRevision { notes } => {
                let notes = required_text(notes, "revision notes are required")?;
                let approver = assigned_slot(&request.approval_workflow, actor).is_some()
                    && from == PrStatus::PendingApproval;
                if !approver && !actor.level.is_procurement_or_admin() {
                    return Err(DomainError::Permission(format!(
                        "user `{}` cannot request a revision",
                        actor.user_id
                    )));
                }
                if from == PrStatus::PendingApproval {
                    record_approval(
                        &mut request,
                        actor,
                        ApprovalAction::RevisionRequested,
                        None,
                        Some(&notes),
                        at,
                    );
                }
                request.push_history(PrStatus::RevisionRequired, &actor.user_id, Some(notes), at);
                effects.push(WorkflowEffect::NotifyRequestor);
            }
            WorkflowCommand::MarkOrdered { estimated_delivery_date } => {
                ensure_procurement(actor, action)?;
                if let Some(date) = estimated_delivery_date {
                    request.estimated_delivery_date = Some(*date);
                }
                request.push_history(PrStatus::Ordered, &actor.user_id, None, at);
                effects.push(WorkflowEffect::NotifyRequestor);
            }
            WorkflowCommand::MarkCompleted { final_amount } => {
                ensure_procurement(actor, action)?;
                let notes = match *final_amount {
                    Some(amount) => {
                        request.final_amount = Some(amount);
                        self.variance_note(&request, amount)
                    }
                    None => None,
                };
                request.push_history(PrStatus::Completed, &actor.user_id, notes, at);
                effects.push(WorkflowEffect::NotifyRequestor);
            }
            WorkflowCommand::Cancel { reason } => {
                ensure_requestor_or_procurement(current, actor, action)?;
                request.push_history(PrStatus::Canceled, &actor.user_id, reason.clone(), at);
                if from != PrStatus::Draft {
                    effects.push(WorkflowEffect::NotifyProcurement);
                }
            }
            WorkflowCommand::RecordOverride { status, notes } => {
                if !actor.is_admin() {
                    return Err(DomainError::Permission(
                        "only administrators may override a status".to_string(),
                    ));
                }
                let notes = required_text(notes, "override notes are required")?;
                request.status = *status;
                request.status_history.push(StatusHistoryEntry {
                    status: *status,
                    timestamp: at,
                    user: actor.user_id.clone(),
                    notes: Some(notes),
                    out_of_sequence: true,
                });
                request.updated_at = at;
            }
        }

        let outcome = TransitionOutcome { from, to: request.status, action, effects, conflict };
        Ok(Transition { request, outcome })
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &PurchaseRequest,
        command: &WorkflowCommand,
        actor: &Actor,
        at: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<Transition, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, command, actor, at);
        match &result {
            Ok(transition) => {
                sink.emit(
                    AuditEvent::new(
                        Some(current.id.clone()),
                        audit.correlation_id.as_str(),
                        "workflow.transition_applied",
                        AuditCategory::Workflow,
                        audit.actor.as_str(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", transition.outcome.from.as_str())
                    .with_metadata("to", transition.outcome.to.as_str())
                    .with_metadata("action", transition.outcome.action.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        Some(current.id.clone()),
                        audit.correlation_id.as_str(),
                        "workflow.transition_rejected",
                        AuditCategory::Workflow,
                        audit.actor.as_str(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("action", command.action().to_string())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    fn approve(
        &self,
        request: &mut PurchaseRequest,
        slot: ApproverSlot,
        quote_id: &QuoteId,
        actor: &Actor,
        at: DateTime<Utc>,
        effects: &mut Vec<WorkflowEffect>,
    ) -> Result<(PrStatus, String, Option<ConflictResolution>), DomainError> {
        let workflow = &request.approval_workflow;
        let Some(decision) = workflow.decision.clone() else {
            return Err(DomainError::InvariantViolation(format!(
                "purchase request `{}` is pending approval without a routing decision",
                request.id.0
            )));
        };
        if slot == ApproverSlot::Second && !workflow.requires_dual_approval {
            return Err(DomainError::Validation(
                "the second approver slot is only used for dual approval".to_string(),
            ));
        }
        if workflow.assignee(slot) != Some(&actor.user_id) {
            return Err(DomainError::Permission(format!(
                "user `{}` is not assigned to the {slot} approver slot",
                actor.user_id
            )));
        }
        if !actor.level.can_approve(decision.approver_level) {
            return Err(DomainError::Permission(format!(
                "user `{}` lacks authority for {:?} approvals",
                actor.user_id, decision.approver_level
            )));
        }
        if request.quote(quote_id).is_none() {
            return Err(DomainError::Validation(format!(
                "quote `{}` does not belong to this purchase request",
                quote_id.0
            )));
        }

        let workflow = &mut request.approval_workflow;
        match slot {
            ApproverSlot::First => workflow.first_approver_selected_quote_id = Some(quote_id.clone()),
            ApproverSlot::Second => {
                workflow.second_approver_selected_quote_id = Some(quote_id.clone())
            }
        }

        if !workflow.requires_dual_approval {
            workflow.first_approval_complete = true;
            workflow.last_updated = Some(at);
            record_approval(request, actor, ApprovalAction::Approved, Some((slot, quote_id)), None, at);
            effects.extend([WorkflowEffect::NotifyRequestor, WorkflowEffect::NotifyProcurement]);
            return Ok((PrStatus::Approved, format!("approved with quote {}", quote_id.0), None));
        }

        record_approval(request, actor, ApprovalAction::QuoteSelected, Some((slot, quote_id)), None, at);
        let resolution = self.resolver.resolve(&mut request.approval_workflow, at);
        let (to, notes) = match &resolution {
            ConflictResolution::AwaitingSelection => {
                effects.push(WorkflowEffect::AwaitingOtherApprover { slot });
                (PrStatus::PendingApproval, format!("{slot} approver selected quote {}", quote_id.0))
            }
            ConflictResolution::Conflict { first, second, newly_detected, .. } => {
                if *newly_detected {
                    effects.push(WorkflowEffect::QuoteConflictDetected);
                }
                (
                    PrStatus::PendingApproval,
                    format!("quote conflict: first approver chose {}, second chose {}", first.0, second.0),
                )
            }
            ConflictResolution::Agreed { quote_id, was_in_conflict } => {
                if *was_in_conflict {
                    effects.push(WorkflowEffect::QuoteConflictResolved);
                }
                record_approval(request, actor, ApprovalAction::Approved, Some((slot, quote_id)), None, at);
                effects.extend([WorkflowEffect::NotifyRequestor, WorkflowEffect::NotifyProcurement]);
                (PrStatus::Approved, format!("dual approval agreed on quote {}", quote_id.0))
            }
        };
        Ok((to, notes, Some(resolution)))
    }

    fn variance_note(&self, request: &PurchaseRequest, final_amount: Decimal) -> Option<String> {
        let workflow = &request.approval_workflow;
        let decision = workflow.decision.as_ref()?;
        let quote = request.quote(workflow.first_approver_selected_quote_id.as_ref()?)?;
        Some(self.rules.check_variance(decision, quote.amount, final_amount).describe())
    }
}

fn is_allowed(from: PrStatus, command: &WorkflowCommand) -> bool {
    use PrStatus::{
        Approved, Draft, InQueue, Ordered, PendingApproval, RevisionRequired, Submitted,
    };

    match command {
        WorkflowCommand::Submit => matches!(from, Draft | RevisionRequired),
        WorkflowCommand::Enqueue => from == Submitted,
        WorkflowCommand::RouteToApproval { .. } => from == InQueue,
        WorkflowCommand::Approve { .. } | WorkflowCommand::Reject { .. } => {
            from == PendingApproval
        }
        WorkflowCommand::RequestRevision { .. } => matches!(from, Submitted | PendingApproval),
        WorkflowCommand::MarkOrdered { .. } => from == Approved,
        WorkflowCommand::MarkCompleted { .. } => from == Ordered,
        WorkflowCommand::Cancel { .. } => !from.is_terminal(),
        WorkflowCommand::RecordOverride { .. } => true,
    }
}

fn route(request: &mut PurchaseRequest, decision: &Decision, at: DateTime<Utc>) -> Result<(), DomainError> {
    let Some(approver) = request.approver.clone() else {
        return Err(DomainError::Validation("an approver must be nominated".to_string()));
    };

    let second_approver = if decision.requires_dual_approval {
        let Some(second) = request.approver2.clone() else {
            return Err(DomainError::Validation(
                "dual approval requires a second approver".to_string(),
            ));
        };
        if decision.min_unique_approvers >= 2 && second == approver {
            return Err(DomainError::Validation(format!(
                "dual approval requires {} distinct approvers",
                decision.min_unique_approvers
            )));
        }
        Some(second)
    } else {
        None
    };

    let quote_count = request.quotes.len() as u32;
    if quote_count < decision.min_quotes_required {
        return Err(DomainError::Validation(format!(
            "{} quotes required, {quote_count} provided",
            decision.min_quotes_required
        )));
    }

    let history = std::mem::take(&mut request.approval_workflow.approval_history);
    request.approval_workflow = ApprovalWorkflow {
        current_approver: Some(approver),
        second_approver,
        requires_dual_approval: decision.requires_dual_approval,
        approval_history: history,
        last_updated: Some(at),
        decision: Some(decision.clone()),
        ..ApprovalWorkflow::default()
    };
    Ok(())
}

fn reset_cycle(workflow: &mut ApprovalWorkflow) {
    let history = std::mem::take(&mut workflow.approval_history);
    *workflow = ApprovalWorkflow { approval_history: history, ..ApprovalWorkflow::default() };
}

fn record_approval(
    request: &mut PurchaseRequest,
    actor: &Actor,
    action: ApprovalAction,
    selection: Option<(ApproverSlot, &QuoteId)>,
    notes: Option<&str>,
    at: DateTime<Utc>,
) {
    let slot = selection
        .map(|(slot, _)| slot)
        .or_else(|| assigned_slot(&request.approval_workflow, actor));
    request.approval_workflow.approval_history.push(ApprovalHistoryEntry {
        approver: actor.user_id.clone(),
        slot,
        action,
        quote_id: selection.map(|(_, quote_id)| quote_id.clone()),
        timestamp: at,
        notes: notes.map(str::to_string),
    });
}

fn assigned_slot(workflow: &ApprovalWorkflow, actor: &Actor) -> Option<ApproverSlot> {
    if workflow.current_approver.as_ref() == Some(&actor.user_id) {
        Some(ApproverSlot::First)
    } else if workflow.requires_dual_approval
        && workflow.second_approver.as_ref() == Some(&actor.user_id)
    {
        Some(ApproverSlot::Second)
    } else {
        None
    }
}

fn required_text(value: &str, message: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(message.to_string()));
    }
    Ok(trimmed.to_string())
}

fn ensure_same_organization(request: &PurchaseRequest, actor: &Actor) -> Result<(), DomainError> {
    if actor.is_admin() || actor.organization_id == request.organization_id {
        return Ok(());
    }
    Err(DomainError::Permission(format!(
        "user `{}` does not belong to organization `{}`",
        actor.user_id, request.organization_id
    )))
}

fn ensure_procurement(actor: &Actor, action: WorkflowAction) -> Result<(), DomainError> {
    if actor.level.is_procurement_or_admin() {
        return Ok(());
    }
    Err(DomainError::Permission(format!(
        "user `{}` cannot {action} purchase requests",
        actor.user_id
    )))
}

fn ensure_requestor_or_procurement(
    request: &PurchaseRequest,
    actor: &Actor,
    action: WorkflowAction,
) -> Result<(), DomainError> {
    if actor.user_id == request.requestor {
        return Ok(());
    }
    ensure_procurement(actor, action)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::organization::OrganizationId;
    use crate::domain::purchase_request::{
        ApproverSlot, PrStatus, PurchaseRequest, PurchaseRequestId, QuoteId, VendorQuote,
    };
    use crate::domain::user::{PermissionLevel, UserId};
    use crate::errors::DomainError;
    use crate::rules::{ApproverLevel, Decision};
    use crate::workflow::engine::StatusStateMachine;
    use crate::workflow::states::{Actor, WorkflowAction, WorkflowCommand, WorkflowEffect};

    fn at(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap()
    }

    fn actor(id: &str, level: PermissionLevel) -> Actor {
        Actor {
            user_id: UserId(id.to_string()),
            level,
            organization_id: OrganizationId("org-1".to_string()),
        }
    }

    fn requestor() -> Actor {
        actor("requestor", PermissionLevel::Requester)
    }

    fn procurement() -> Actor {
        actor("buyer", PermissionLevel::Procurement)
    }

    fn decision(dual: bool) -> Decision {
        Decision {
            requires_dual_approval: dual,
            approver_level: ApproverLevel::Finance,
            min_quotes_required: 1,
            min_unique_approvers: 2,
            allowed_variance_up: Decimal::from(5),
            allowed_variance_down: Decimal::from(10),
            currency: "LSL".to_string(),
        }
    }

    fn quote(id: &str, amount: i64) -> VendorQuote {
        VendorQuote {
            id: QuoteId(id.to_string()),
            vendor_name: format!("Vendor {id}"),
            vendor_id: None,
            amount: Decimal::from(amount),
            currency: "LSL".to_string(),
        }
    }

    fn complete_draft() -> PurchaseRequest {
        let mut pr = PurchaseRequest::draft(
            PurchaseRequestId("pr-1".to_string()),
            "PR-0001",
            OrganizationId("org-1".to_string()),
            UserId("requestor".to_string()),
            at(2),
        );
        pr.description = Some("Laptops".to_string());
        pr.estimated_amount = Some(Decimal::from(120_000));
        pr.currency = Some("LSL".to_string());
        pr.quotes = vec![quote("Q1", 118_000), quote("Q2", 121_000)];
        pr.approver = Some(UserId("approver-a".to_string()));
        pr.approver2 = Some(UserId("approver-b".to_string()));
        pr
    }

    fn pending(dual: bool) -> PurchaseRequest {
        let engine = StatusStateMachine::new();
        let mut pr = complete_draft();
        for (command, who) in [
            (WorkflowCommand::Submit, requestor()),
            (WorkflowCommand::Enqueue, procurement()),
            (WorkflowCommand::RouteToApproval { decision: decision(dual) }, procurement()),
        ] {
            pr = engine.apply(&pr, &command, &who, at(3)).expect("advance").request;
        }
        pr
    }

    fn approver(id: &str) -> Actor {
        actor(id, PermissionLevel::FinanceApprover)
    }

    fn approve(slot: ApproverSlot, quote_id: &str) -> WorkflowCommand {
        WorkflowCommand::Approve { slot, quote_id: QuoteId(quote_id.to_string()) }
    }

    #[test]
    fn canonical_path_reaches_completed_with_full_history() {
        let engine = StatusStateMachine::new();
        let mut pr = pending(false);
        pr = engine.apply(&pr, &approve(ApproverSlot::First, "Q1"), &approver("approver-a"), at(4))
            .expect("approve")
            .request;
        assert_eq!(pr.status, PrStatus::Approved);

        pr = engine
            .apply(&pr, &WorkflowCommand::MarkOrdered { estimated_delivery_date: Some(at(20)) }, &procurement(), at(5))
            .expect("order")
            .request;
        let done = engine
            .apply(
                &pr,
                &WorkflowCommand::MarkCompleted { final_amount: Some(Decimal::from(130_000)) },
                &procurement(),
                at(25),
            )
            .expect("complete");

        let statuses: Vec<PrStatus> =
            done.request.status_history.iter().map(|entry| entry.status).collect();
        assert_eq!(
            statuses,
            vec![
                PrStatus::Draft,
                PrStatus::Submitted,
                PrStatus::InQueue,
                PrStatus::PendingApproval,
                PrStatus::Approved,
                PrStatus::Ordered,
                PrStatus::Completed,
            ]
        );
        let note = done.request.status_history.last().and_then(|entry| entry.notes.clone());
        assert!(note.expect("variance note").contains("above quote"));
        assert_eq!(done.request.estimated_delivery_date, Some(at(20)));
        done.request.check_invariants().expect("consistent document");
    }

    #[test]
    fn rule5_decides_whether_one_person_may_fill_both_slots() {
        let engine = StatusStateMachine::new();
        let mut pr = complete_draft();
        pr.approver2 = pr.approver.clone();
        for (command, who) in [(WorkflowCommand::Submit, requestor()), (WorkflowCommand::Enqueue, procurement())] {
            pr = engine.apply(&pr, &command, &who, at(3)).expect("advance").request;
        }

        let two_people = decision(true);
        let error = engine
            .apply(&pr, &WorkflowCommand::RouteToApproval { decision: two_people }, &procurement(), at(3))
            .expect_err("same approver twice");
        assert_eq!(
            error,
            DomainError::Validation("dual approval requires 2 distinct approvers".to_string())
        );

        let one_person = Decision { min_unique_approvers: 1, ..decision(true) };
        let routed = engine
            .apply(&pr, &WorkflowCommand::RouteToApproval { decision: one_person }, &procurement(), at(3))
            .expect("rule5 = 1 allows a repeated approver");
        let workflow = &routed.request.approval_workflow;
        assert_eq!(routed.request.status, PrStatus::PendingApproval);
        assert_eq!(workflow.current_approver, workflow.second_approver);
    }

    #[test]
    fn approve_on_draft_is_invalid_and_leaves_document_untouched() {
        let engine = StatusStateMachine::new();
        let pr = complete_draft();
        let before = pr.clone();

        let error = engine
            .apply(&pr, &approve(ApproverSlot::First, "Q1"), &approver("approver-a"), at(4))
            .expect_err("draft cannot be approved");

        assert_eq!(
            error,
            DomainError::InvalidTransition { from: PrStatus::Draft, action: WorkflowAction::Approve }
        );
        assert_eq!(pr, before);
    }

    #[test]
    fn submit_requires_amount_currency_and_description() {
        let engine = StatusStateMachine::new();
        let mut pr = complete_draft();
        pr.currency = None;
        pr.description = Some("   ".to_string());

        let error = engine.apply(&pr, &WorkflowCommand::Submit, &requestor(), at(3)).expect_err("invalid");
        assert!(matches!(error, DomainError::Validation(ref message)
            if message.contains("currency") && message.contains("description")));
    }

    #[test]
    fn dual_approval_conflict_then_agreement() {
        let engine = StatusStateMachine::new();
        let pr = pending(true);

        let first = engine
            .apply(&pr, &approve(ApproverSlot::First, "Q1"), &approver("approver-a"), at(4))
            .expect("first selection");
        assert_eq!(first.request.status, PrStatus::PendingApproval);
        assert!(first
            .outcome
            .effects
            .contains(&WorkflowEffect::AwaitingOtherApprover { slot: ApproverSlot::First }));

        let second = engine
            .apply(&first.request, &approve(ApproverSlot::Second, "Q2"), &approver("approver-b"), at(5))
            .expect("second selection");
        assert_eq!(second.request.status, PrStatus::PendingApproval);
        assert!(second.request.approval_workflow.quote_conflict);
        assert_eq!(second.request.approval_workflow.last_updated, Some(at(5)));
        assert!(second.outcome.effects.contains(&WorkflowEffect::QuoteConflictDetected));

        let agreed = engine
            .apply(
                &second.request,
                &approve(ApproverSlot::Second, "Q1"),
                &approver("approver-b"),
                at(5) + Duration::hours(3),
            )
            .expect("agreement");
        let workflow = &agreed.request.approval_workflow;
        assert_eq!(agreed.request.status, PrStatus::Approved);
        assert!(!workflow.quote_conflict);
        assert!(workflow.first_approval_complete && workflow.second_approval_complete);
        assert!(agreed.outcome.effects.contains(&WorkflowEffect::QuoteConflictResolved));
        agreed.request.check_invariants().expect("consistent");
    }

    #[test]
    fn only_the_assigned_approver_may_fill_a_slot() {
        let engine = StatusStateMachine::new();
        let pr = pending(true);

        let error = engine
            .apply(&pr, &approve(ApproverSlot::First, "Q1"), &approver("approver-b"), at(4))
            .expect_err("wrong slot");
        assert!(matches!(error, DomainError::Permission(_)));

        let error = engine
            .apply(&pr, &approve(ApproverSlot::First, "Q9"), &approver("approver-a"), at(4))
            .expect_err("unknown quote");
        assert!(matches!(error, DomainError::Validation(_)));
    }

    #[test]
    fn second_slot_is_rejected_for_single_approval() {
        let engine = StatusStateMachine::new();
        let pr = pending(false);
        assert!(pr.approval_workflow.second_approver.is_none());

        let error = engine
            .apply(&pr, &approve(ApproverSlot::Second, "Q1"), &approver("approver-b"), at(4))
            .expect_err("no second slot");
        assert!(matches!(error, DomainError::Validation(_)));
    }

    #[test]
    fn routing_enforces_second_approver_and_quote_minimum() {
        let engine = StatusStateMachine::new();
        let mut pr = complete_draft();
        pr.approver2 = None;
        for (command, who) in
            [(WorkflowCommand::Submit, requestor()), (WorkflowCommand::Enqueue, procurement())]
        {
            pr = engine.apply(&pr, &command, &who, at(3)).expect("advance").request;
        }

        let error = engine
            .apply(&pr, &WorkflowCommand::RouteToApproval { decision: decision(true) }, &procurement(), at(3))
            .expect_err("missing second approver");
        assert!(matches!(error, DomainError::Validation(_)));

        let mut strict = decision(false);
        strict.min_quotes_required = 3;
        let error = engine
            .apply(&pr, &WorkflowCommand::RouteToApproval { decision: strict }, &procurement(), at(3))
            .expect_err("too few quotes");
        assert!(matches!(error, DomainError::Validation(ref message) if message.contains("3 quotes")));
    }

    #[test]
    fn reject_requires_reason() {
        let engine = StatusStateMachine::new();
        let pr = pending(false);

        let error = engine
            .apply(&pr, &WorkflowCommand::Reject { reason: " ".to_string() }, &approver("approver-a"), at(4))
            .expect_err("reason required");
        assert!(matches!(error, DomainError::Validation(_)));

        let rejected = engine
            .apply(
                &pr,
                &WorkflowCommand::Reject { reason: "over budget".to_string() },
                &approver("approver-a"),
                at(4),
            )
            .expect("reject");
        assert_eq!(rejected.request.status, PrStatus::Rejected);
        assert!(rejected.request.status.is_terminal());
    }

    #[test]
    fn revision_resets_the_approval_cycle_on_resubmit() {
        let engine = StatusStateMachine::new();
        let pr = pending(true);
        let revised = engine
            .apply(
                &pr,
                &WorkflowCommand::RequestRevision { notes: "split the order".to_string() },
                &approver("approver-a"),
                at(4),
            )
            .expect("revision")
            .request;
        assert_eq!(revised.status, PrStatus::RevisionRequired);
        assert!(revised.approval_workflow.requires_dual_approval);

        let resubmitted =
            engine.apply(&revised, &WorkflowCommand::Submit, &requestor(), at(5)).expect("resubmit").request;
        assert_eq!(resubmitted.status, PrStatus::Submitted);
        assert!(!resubmitted.approval_workflow.requires_dual_approval);
        assert!(resubmitted.approval_workflow.decision.is_none());
        assert_eq!(resubmitted.approval_workflow.approval_history.len(), 1);
    }

    #[test]
    fn terminal_states_cannot_be_canceled() {
        let engine = StatusStateMachine::new();
        let canceled = engine
            .apply(&complete_draft(), &WorkflowCommand::Cancel { reason: None }, &requestor(), at(3))
            .expect("cancel draft")
            .request;
        let error = engine
            .apply(&canceled, &WorkflowCommand::Cancel { reason: None }, &requestor(), at(4))
            .expect_err("already terminal");
        assert!(matches!(error, DomainError::InvalidTransition { from: PrStatus::Canceled, .. }));
    }

    #[test]
    fn out_of_sequence_override_is_recorded_not_normalized() {
        let engine = StatusStateMachine::new();
        let pr = complete_draft();

        let error = engine
            .apply(
                &pr,
                &WorkflowCommand::RecordOverride { status: PrStatus::Ordered, notes: "legacy".to_string() },
                &procurement(),
                at(3),
            )
            .expect_err("admin only");
        assert!(matches!(error, DomainError::Permission(_)));

        let overridden = engine
            .apply(
                &pr,
                &WorkflowCommand::RecordOverride {
                    status: PrStatus::Ordered,
                    notes: "ordered outside the system".to_string(),
                },
                &actor("root", PermissionLevel::Admin),
                at(3),
            )
            .expect("override")
            .request;
        let last = overridden.status_history.last().expect("entry");
        assert_eq!(overridden.status, PrStatus::Ordered);
        assert!(last.out_of_sequence);
        overridden.check_invariants().expect("history still ends with current status");
    }

    #[test]
    fn callers_from_other_organizations_are_refused() {
        let engine = StatusStateMachine::new();
        let mut outsider = procurement();
        outsider.organization_id = OrganizationId("org-2".to_string());
        let pr = engine
            .apply(&complete_draft(), &WorkflowCommand::Submit, &requestor(), at(3))
            .expect("submit")
            .request;

        let error = engine.apply(&pr, &WorkflowCommand::Enqueue, &outsider, at(3)).expect_err("outsider");
        assert!(matches!(error, DomainError::Permission(_)));
    }

    #[test]
    fn transition_emits_audit_event() {
        let engine = StatusStateMachine::new();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(None, "req-42", "workflow-engine");

        let _ = engine
            .apply_with_audit(&complete_draft(), &WorkflowCommand::Submit, &requestor(), at(3), &sink, &audit)
            .expect("submit");
        let _ = engine.apply_with_audit(
            &complete_draft(),
            &WorkflowCommand::Enqueue,
            &procurement(),
            at(3),
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "workflow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("SUBMITTED"));
        assert_eq!(events[1].event_type, "workflow.transition_rejected");
        assert_eq!(events[1].correlation_id, "req-42");
    }
}
