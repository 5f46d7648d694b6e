//! HTTP surface for the allotment workflow.
//!
//! Every endpoint requires a bearer credential. Responses share one envelope:
//! `success` plus either the payload or a human-readable `message`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::identity::{authenticate, CallerIdentity, CredentialVerifier, UserId};

use super::domain::{DonorId, DonorRegistration, NotificationId, RequestId, RequestSubmission};
use super::repository::{AllotmentStore, Directory, NotificationSink, RequestQuery};
use super::service::{AllotmentService, WorkflowError};

/// Shared handler state: the workflow service plus the credential verifier.
pub struct AllotmentState<S, D, N> {
    pub service: Arc<AllotmentService<S, D, N>>,
    pub verifier: Arc<dyn CredentialVerifier>,
}

impl<S, D, N> Clone for AllotmentState<S, D, N> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            verifier: Arc::clone(&self.verifier),
        }
    }
}

/// Builds the router exposing the allotment workflow.
pub fn allotment_router<S, D, N>(
    service: Arc<AllotmentService<S, D, N>>,
    verifier: Arc<dyn CredentialVerifier>,
) -> Router
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route(
            "/donor-requests/create",
            post(create_request_handler::<S, D, N>),
        )
        .route("/donor-requests/all", get(list_requests_handler::<S, D, N>))
        .route(
            "/donor-requests/:request_id",
            get(get_request_handler::<S, D, N>).delete(delete_request_handler::<S, D, N>),
        )
        .route(
            "/donor-requests/:request_id/matching-donors",
            get(matching_donors_handler::<S, D, N>),
        )
        .route(
            "/donor-requests/:request_id/allot",
            put(allot_handler::<S, D, N>),
        )
        .route(
            "/donor-requests/:request_id/accept-donor",
            put(accept_donor_handler::<S, D, N>),
        )
        .route(
            "/donor-requests/:request_id/reject-donor",
            put(reject_donor_handler::<S, D, N>),
        )
        .route(
            "/donor-requests/:request_id/cancel-allotment",
            put(cancel_allotment_handler::<S, D, N>),
        )
        .route("/donors/register", post(register_donor_handler::<S, D, N>))
        .route(
            "/donors/:donor_id",
            get(get_donor_handler::<S, D, N>).delete(delete_donor_handler::<S, D, N>),
        )
        .route("/notifications", get(notifications_handler::<S, D, N>))
        .route(
            "/notifications/:notification_id/read",
            put(mark_notification_read_handler::<S, D, N>),
        )
        .with_state(AllotmentState { service, verifier })
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = match &self {
            WorkflowError::Identity(_) => StatusCode::UNAUTHORIZED,
            WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
            WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
            WorkflowError::BadState(_) | WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::Conflict(_) => StatusCode::CONFLICT,
            WorkflowError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            // Infrastructure detail stays in the logs, not the response.
            WorkflowError::Unavailable(detail) => {
                error!(%detail, "allotment operation failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(json!({ "success": false, "message": message })),
        )
            .into_response()
    }
}

fn bearer_caller(
    verifier: &dyn CredentialVerifier,
    headers: &HeaderMap,
) -> Result<CallerIdentity, WorkflowError> {
    authenticate(verifier, headers).map_err(WorkflowError::from)
}

fn parse_body<T: DeserializeOwned>(body: Option<Json<Value>>) -> Result<T, WorkflowError> {
    let Json(value) = body.ok_or_else(|| {
        WorkflowError::Validation("request body must be valid JSON".to_string())
    })?;
    serde_json::from_value(value).map_err(|error| WorkflowError::Validation(error.to_string()))
}

fn request_query(params: &HashMap<String, String>) -> Result<RequestQuery, WorkflowError> {
    let page = match params.get("page") {
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|page| *page >= 1)
            .ok_or_else(|| {
                WorkflowError::Validation("page must be a positive integer".to_string())
            })?,
        None => 1,
    };
    Ok(RequestQuery {
        search: params.get("search").cloned(),
        created_by: params.get("createdBy").cloned().map(UserId),
        allotted_to: params.get("allottedTo").cloned().map(DonorId),
        allotted_doctor: params.get("allottedDoctors").cloned().map(UserId),
        page,
    })
}

#[derive(Debug, Deserialize)]
struct AllotBody {
    #[serde(rename = "donorId")]
    donor_id: DonorId,
}

pub(crate) async fn create_request_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    let submission: RequestSubmission = match parse_body(body) {
        Ok(submission) => submission,
        Err(error) => return error.into_response(),
    };
    match state.service.create_request(&caller, submission) {
        Ok(view) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "donor request submitted",
                "request": view,
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn list_requests_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    if let Err(error) = bearer_caller(state.verifier.as_ref(), &headers) {
        return error.into_response();
    }
    let query = match request_query(&params) {
        Ok(query) => query,
        Err(error) => return error.into_response(),
    };
    match state.service.list_requests(query) {
        Ok(listing) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "requests": listing.requests,
                "total": listing.total,
                "page": listing.page,
                "pages": listing.pages,
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn get_request_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    if let Err(error) = bearer_caller(state.verifier.as_ref(), &headers) {
        return error.into_response();
    }
    match state.service.get_request(&RequestId(request_id)) {
        Ok(view) => (
            StatusCode::OK,
            Json(json!({ "success": true, "request": view })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn delete_request_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    match state.service.delete_request(&caller, &RequestId(request_id)) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "donor request deleted" })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn matching_donors_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    if let Err(error) = bearer_caller(state.verifier.as_ref(), &headers) {
        return error.into_response();
    }
    match state.service.matching_donors(&RequestId(request_id)) {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "donors": outcome.donors,
                "total": outcome.total,
                "criteria": outcome.criteria,
                "pass": outcome.pass,
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn allot_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    let payload: AllotBody = match parse_body(body) {
        Ok(payload) => payload,
        Err(error) => return error.into_response(),
    };
    match state
        .service
        .allot(&caller, &RequestId(request_id), &payload.donor_id)
    {
        Ok(view) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "donor allotted to request",
                "request": view,
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn accept_donor_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    match state.service.accept_donor(&caller, &RequestId(request_id)) {
        Ok(view) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "allotted donor accepted",
                "donorRequest": view,
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn reject_donor_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    match state.service.reject_donor(&caller, &RequestId(request_id)) {
        Ok(view) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "allotted donor rejected and returned to the pool",
                "donorRequest": view,
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn cancel_allotment_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    match state
        .service
        .cancel_allotment(&caller, &RequestId(request_id))
    {
        Ok(view) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "allotment cancelled",
                "request": view,
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn register_donor_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    let registration: DonorRegistration = match parse_body(body) {
        Ok(registration) => registration,
        Err(error) => return error.into_response(),
    };
    match state.service.register_donor(&caller, registration) {
        Ok(donor) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "donor registered",
                "donor": donor,
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn get_donor_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Path(donor_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    match state.service.get_donor(&caller, &DonorId(donor_id)) {
        Ok(donor) => (
            StatusCode::OK,
            Json(json!({ "success": true, "donor": donor })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn delete_donor_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Path(donor_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    match state.service.delete_donor(&caller, &DonorId(donor_id)) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "donor deleted" })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn notifications_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    match state.service.notifications_feed(&caller) {
        Ok(feed) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "notifications": feed.notifications,
                "unread": feed.unread,
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn mark_notification_read_handler<S, D, N>(
    State(state): State<AllotmentState<S, D, N>>,
    Path(notification_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AllotmentStore + 'static,
    D: Directory + 'static,
    N: NotificationSink + 'static,
{
    let caller = match bearer_caller(state.verifier.as_ref(), &headers) {
        Ok(caller) => caller,
        Err(error) => return error.into_response(),
    };
    match state
        .service
        .mark_notification_read(&caller, &NotificationId(notification_id))
    {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "notification marked as read" })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}
