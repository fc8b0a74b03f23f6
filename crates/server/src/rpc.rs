//! JSON RPC surface for interactive workflow actions.
//!
//! - `POST /purchase-requests/{id}/submit`
//! - `POST /purchase-requests/{id}/enqueue`
//! - `POST /purchase-requests/{id}/route-to-approval`
//! - `POST /purchase-requests/{id}/approve`           `approverSlot`, `quoteId`
//! - `POST /purchase-requests/{id}/reject`            `reason`
//! - `POST /purchase-requests/{id}/request-revision`  `notes`
//! - `POST /purchase-requests/{id}/mark-ordered`      `estimatedDeliveryDate?`
//! - `POST /purchase-requests/{id}/mark-completed`    `finalAmount?`
//! - `POST /purchase-requests/{id}/cancel`            `reason?`
//! - `POST /purchase-requests/{id}/status-override`   `status`, `notes`
//! - `POST /vendors/{id}/approve`                     `justification?`
//! - `POST /vendors/{id}/deapprove`                   `justification`
//! - `POST /vendors/{id}/three-quote`
//! - `POST /jobs/{job}/run`
//!
//! Every body carries `callerId`. A request may pass `x-correlation-id`;
//! otherwise one is generated and echoed in error bodies.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use procura_core::domain::purchase_request::{ApproverSlot, PrStatus, PurchaseRequest, PurchaseRequestId, QuoteId};
use procura_core::domain::user::UserId;
use procura_core::domain::vendor::{Vendor, VendorId};
use procura_core::workflow::states::{Transition, TransitionOutcome};
use procura_core::{
    ApplicationError, ErrorKind, Invocation, JobName, ReminderScheduler, SweepReport, VendorService,
    WorkflowService,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct RpcState {
    pub workflow: WorkflowService,
    pub scheduler: ReminderScheduler,
    pub vendors: VendorService,
}

pub fn router(state: RpcState) -> Router {
    Router::new()
        .route("/purchase-requests/{id}/submit", post(submit))
        .route("/purchase-requests/{id}/enqueue", post(enqueue))
        .route("/purchase-requests/{id}/route-to-approval", post(route_to_approval))
        .route("/purchase-requests/{id}/approve", post(approve))
        .route("/purchase-requests/{id}/reject", post(reject))
        .route("/purchase-requests/{id}/request-revision", post(request_revision))
        .route("/purchase-requests/{id}/mark-ordered", post(mark_ordered))
        .route("/purchase-requests/{id}/mark-completed", post(mark_completed))
        .route("/purchase-requests/{id}/cancel", post(cancel))
        .route("/purchase-requests/{id}/status-override", post(status_override))
        .route("/vendors/{id}/approve", post(approve_vendor))
        .route("/vendors/{id}/deapprove", post(deapprove_vendor))
        .route("/vendors/{id}/three-quote", post(record_three_quote))
        .route("/jobs/{job}/run", post(run_job))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub caller_id: String,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoFields {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBody {
    pub approver_slot: ApproverSlot,
    pub quote_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReasonBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct OptionalReasonBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesBody {
    pub notes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkOrderedBody {
    #[serde(default)]
    pub estimated_delivery_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkCompletedBody {
    #[serde(default)]
    pub final_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct StatusOverrideBody {
    pub status: PrStatus,
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct JustificationBody {
    #[serde(default)]
    pub justification: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub request: PurchaseRequest,
    pub outcome: TransitionOutcome,
}

impl From<Transition> for TransitionResponse {
    fn from(transition: Transition) -> Self {
        Self { request: transition.request, outcome: transition.outcome }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct RpcError {
    status: StatusCode,
    body: ErrorBody,
}

impl RpcError {
    fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "bad_request".to_string(),
                message: message.into(),
                correlation_id: correlation_id.to_string(),
            },
        }
    }

    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        let kind = error.kind();
        warn!(
            event_name = "rpc.request_failed",
            correlation_id = %correlation_id,
            kind = kind.as_str(),
            error = %error,
            "rpc request failed"
        );
        let interface = error.into_interface(correlation_id);
        let message = match kind {
            ErrorKind::Config | ErrorKind::TransientIo | ErrorKind::Internal => {
                interface.user_message().to_string()
            }
            _ => interface.message().to_string(),
        };
        Self {
            status: StatusCode::from_u16(interface.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: ErrorBody {
                error: kind.as_str().to_string(),
                message,
                correlation_id: correlation_id.to_string(),
            },
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Unwraps the body and builds the invocation for the caller it names.
fn begin<T>(
    headers: &HeaderMap,
    payload: Result<Json<Envelope<T>>, JsonRejection>,
) -> Result<(T, Invocation), RpcError> {
    let correlation_id = correlation_id(headers);
    let Json(envelope) =
        payload.map_err(|rejection| RpcError::bad_request(rejection.body_text(), &correlation_id))?;
    let caller_id = envelope.caller_id.trim();
    if caller_id.is_empty() {
        return Err(RpcError::bad_request("callerId must not be blank", &correlation_id));
    }
    let call = Invocation::new(UserId(caller_id.to_string())).with_correlation_id(correlation_id);
    Ok((envelope.body, call))
}

fn respond(
    result: Result<Transition, ApplicationError>,
    call: &Invocation,
) -> Result<Json<TransitionResponse>, RpcError> {
    result
        .map(|transition| Json(transition.into()))
        .map_err(|error| RpcError::from_application(error, &call.correlation_id))
}

fn respond_vendor(result: Result<Vendor, ApplicationError>, call: &Invocation) -> Result<Json<Vendor>, RpcError> {
    result.map(Json).map_err(|error| RpcError::from_application(error, &call.correlation_id))
}

// ---------------------------------------------------------------------------
// Purchase-request handlers
// ---------------------------------------------------------------------------

type TransitionResult = Result<Json<TransitionResponse>, RpcError>;

async fn submit(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<NoFields>>, JsonRejection>,
) -> TransitionResult {
    let (_, call) = begin(&headers, payload)?;
    respond(state.workflow.submit(&PurchaseRequestId(id), &call).await, &call)
}

async fn enqueue(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<NoFields>>, JsonRejection>,
) -> TransitionResult {
    let (_, call) = begin(&headers, payload)?;
    respond(state.workflow.enqueue(&PurchaseRequestId(id), &call).await, &call)
}

async fn route_to_approval(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<NoFields>>, JsonRejection>,
) -> TransitionResult {
    let (_, call) = begin(&headers, payload)?;
    respond(state.workflow.route_to_approval(&PurchaseRequestId(id), &call).await, &call)
}

async fn approve(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<ApproveBody>>, JsonRejection>,
) -> TransitionResult {
    let (body, call) = begin(&headers, payload)?;
    let result = state
        .workflow
        .approve(&PurchaseRequestId(id), body.approver_slot, QuoteId(body.quote_id), &call)
        .await;
    respond(result, &call)
}

async fn reject(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<ReasonBody>>, JsonRejection>,
) -> TransitionResult {
    let (body, call) = begin(&headers, payload)?;
    respond(state.workflow.reject(&PurchaseRequestId(id), body.reason, &call).await, &call)
}

async fn request_revision(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<NotesBody>>, JsonRejection>,
) -> TransitionResult {
    let (body, call) = begin(&headers, payload)?;
    respond(state.workflow.request_revision(&PurchaseRequestId(id), body.notes, &call).await, &call)
}

async fn mark_ordered(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<MarkOrderedBody>>, JsonRejection>,
) -> TransitionResult {
    let (body, call) = begin(&headers, payload)?;
    let result =
        state.workflow.mark_ordered(&PurchaseRequestId(id), body.estimated_delivery_date, &call).await;
    respond(result, &call)
}

async fn mark_completed(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<MarkCompletedBody>>, JsonRejection>,
) -> TransitionResult {
    let (body, call) = begin(&headers, payload)?;
    let result = state.workflow.mark_completed(&PurchaseRequestId(id), body.final_amount, &call).await;
    respond(result, &call)
}

async fn cancel(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<OptionalReasonBody>>, JsonRejection>,
) -> TransitionResult {
    let (body, call) = begin(&headers, payload)?;
    respond(state.workflow.cancel(&PurchaseRequestId(id), body.reason, &call).await, &call)
}

async fn status_override(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<StatusOverrideBody>>, JsonRejection>,
) -> TransitionResult {
    let (body, call) = begin(&headers, payload)?;
    let result =
        state.workflow.record_status_override(&PurchaseRequestId(id), body.status, body.notes, &call).await;
    respond(result, &call)
}

// ---------------------------------------------------------------------------
// Vendor handlers
// ---------------------------------------------------------------------------

async fn approve_vendor(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<JustificationBody>>, JsonRejection>,
) -> Result<Json<Vendor>, RpcError> {
    let (body, call) = begin(&headers, payload)?;
    let result = state.vendors.approve_manually(&VendorId(id), body.justification.as_deref(), &call).await;
    respond_vendor(result, &call)
}

async fn deapprove_vendor(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<JustificationBody>>, JsonRejection>,
) -> Result<Json<Vendor>, RpcError> {
    let (body, call) = begin(&headers, payload)?;
    let justification = body.justification.unwrap_or_default();
    let result = state.vendors.deapprove(&VendorId(id), &justification, &call).await;
    respond_vendor(result, &call)
}

async fn record_three_quote(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Envelope<NoFields>>, JsonRejection>,
) -> Result<Json<Vendor>, RpcError> {
    let (_, call) = begin(&headers, payload)?;
    respond_vendor(state.vendors.record_three_quote_process(&VendorId(id), &call).await, &call)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Runs a sweep immediately. A sweep that could not start answers 503 with its report.
async fn run_job(
    State(state): State<RpcState>,
    Path(job): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<SweepReport>), RpcError> {
    let correlation_id = correlation_id(&headers);
    let job = job.parse::<JobName>().map_err(|message| RpcError {
        status: StatusCode::NOT_FOUND,
        body: ErrorBody { error: "not_found".to_string(), message, correlation_id: correlation_id.clone() },
    })?;

    let report = state.scheduler.run_job(job, Utc::now()).await;
    let status = if report.success { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    Ok((status, Json(report)))
}
