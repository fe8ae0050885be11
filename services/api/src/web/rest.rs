//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every response, success or failure, uses the same envelope:
//! `{"success": true, "data": ...}` or `{"success": false, "error": "..."}`.

use crate::web::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use transcript_insights_core::{FollowUpStatus, PipelineError, PortError, TranscriptSubmission};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        analyze_transcript_handler,
        get_meeting_handler,
        list_follow_ups_handler,
        update_follow_up_status_handler,
        list_recurring_issues_handler,
    ),
    components(
        schemas(ApiEnvelope, AnalyzeTranscriptRequest, UpdateFollowUpStatusRequest)
    ),
    tags(
        (name = "Transcript Insights API", description = "Meeting transcript analysis and cross-meeting insights.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The envelope wrapped around every response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type HandlerError = (StatusCode, Json<ApiEnvelope>);
type HandlerResult = Result<(StatusCode, Json<ApiEnvelope>), HandlerError>;

fn fail(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ApiEnvelope {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
}

fn respond<T: Serialize>(status: StatusCode, data: &T) -> HandlerResult {
    let value = serde_json::to_value(data).map_err(|e| {
        error!("Failed to serialize response: {}", e);
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialize response")
    })?;
    Ok((
        status,
        Json(ApiEnvelope {
            success: true,
            data: Some(value),
            error: None,
        }),
    ))
}

fn port_failure(context: &str, e: PortError) -> HandlerError {
    match e {
        PortError::NotFound(what) => fail(StatusCode::NOT_FOUND, what),
        PortError::Unavailable(_) => {
            error!("{}: {}", context, e);
            fail(StatusCode::SERVICE_UNAVAILABLE, format!("{}: store unavailable", context))
        }
        other => {
            error!("{}: {}", context, other);
            fail(StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
        }
    }
}

/// Maps a pipeline failure to its HTTP status.
pub fn pipeline_error_status(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PipelineError::ExtractionUnavailable(_) | PipelineError::UnrepairableOutput(_) => {
            StatusCode::BAD_GATEWAY
        }
        PipelineError::Persistence(_) | PipelineError::FollowUpPersistence { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// The payload for `POST /analyze-transcript`.
///
/// Fields are optional at the wire level so a missing field yields a precise
/// 400 message instead of a generic deserialization failure.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTranscriptRequest {
    pub transcript: Option<String>,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub meeting_date: Option<String>,
    pub meeting_title: Option<String>,
    pub meeting_purpose: Option<String>,
    pub user_id: Option<String>,
    pub company_name: Option<String>,
}

fn parse_meeting_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

impl AnalyzeTranscriptRequest {
    /// Resolves the meeting date; blank required text fields are left for the
    /// pipeline's own input check.
    fn into_submission(self) -> Result<TranscriptSubmission, String> {
        let raw_date = self
            .meeting_date
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| "meetingDate is required".to_string())?;
        let meeting_date = parse_meeting_date(&raw_date)
            .ok_or_else(|| format!("meetingDate '{}' is not a valid date", raw_date))?;

        Ok(TranscriptSubmission {
            transcript: self.transcript.unwrap_or_default(),
            meeting_date,
            meeting_title: self.meeting_title,
            meeting_purpose: self.meeting_purpose,
            user_id: self.user_id.unwrap_or_default(),
            company_name: self.company_name.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FollowUpQuery {
    /// `pending` (default) or `completed`.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateFollowUpStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
struct FollowUpStatusChanged {
    id: Uuid,
    status: FollowUpStatus,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Analyse a meeting transcript and store the results.
#[utoipa::path(
    post,
    path = "/analyze-transcript",
    request_body = AnalyzeTranscriptRequest,
    responses(
        (status = 200, description = "Transcript analysed and stored", body = ApiEnvelope),
        (status = 400, description = "Missing or invalid input", body = ApiEnvelope),
        (status = 502, description = "Extraction failed or returned unusable output", body = ApiEnvelope),
        (status = 500, description = "Persistence failed", body = ApiEnvelope)
    )
)]
pub async fn analyze_transcript_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeTranscriptRequest>, JsonRejection>,
) -> HandlerResult {
    let Json(request) = payload.map_err(|e| {
        warn!("Rejected analyze-transcript body: {}", e);
        fail(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e.body_text()))
    })?;
    let submission = request
        .into_submission()
        .map_err(|message| fail(StatusCode::BAD_REQUEST, message))?;

    match app_state.pipeline.run(submission).await {
        Ok(output) => {
            info!(
                meeting_id = %output.meeting_id,
                company = %output.company_name,
                "Transcript analysed"
            );
            respond(StatusCode::OK, &output)
        }
        Err(e) => {
            let status = pipeline_error_status(&e);
            if status.is_server_error() {
                error!("Transcript analysis failed: {}", e);
            } else {
                warn!("Transcript analysis rejected: {}", e);
            }
            Err(fail(status, e.to_string()))
        }
    }
}

/// Fetch one stored meeting.
#[utoipa::path(
    get,
    path = "/meetings/{id}",
    params(("id" = Uuid, Path, description = "Meeting id")),
    responses(
        (status = 200, description = "The meeting", body = ApiEnvelope),
        (status = 404, description = "No such meeting", body = ApiEnvelope)
    )
)]
pub async fn get_meeting_handler(
    State(app_state): State<Arc<AppState>>,
    meeting_id: Result<Path<Uuid>, PathRejection>,
) -> HandlerResult {
    let Path(meeting_id) = meeting_id.map_err(|e| fail(StatusCode::BAD_REQUEST, e.body_text()))?;
    let meeting = app_state
        .store
        .get_meeting(meeting_id)
        .await
        .map_err(|e| port_failure("Failed to load meeting", e))?;
    respond(StatusCode::OK, &meeting)
}

/// List follow-ups by status, earliest deadline first.
#[utoipa::path(
    get,
    path = "/follow-ups",
    params(FollowUpQuery),
    responses(
        (status = 200, description = "Matching follow-ups", body = ApiEnvelope),
        (status = 400, description = "Unknown status", body = ApiEnvelope)
    )
)]
pub async fn list_follow_ups_handler(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<FollowUpQuery>, QueryRejection>,
) -> HandlerResult {
    let Query(query) = query.map_err(|e| fail(StatusCode::BAD_REQUEST, e.body_text()))?;
    let status = match query.status.as_deref() {
        None => FollowUpStatus::Pending,
        Some(raw) => raw
            .parse::<FollowUpStatus>()
            .map_err(|message| fail(StatusCode::BAD_REQUEST, message))?,
    };
    let follow_ups = app_state
        .store
        .list_follow_ups(status)
        .await
        .map_err(|e| port_failure("Failed to list follow-ups", e))?;
    respond(StatusCode::OK, &follow_ups)
}

/// Mark a follow-up pending or completed.
#[utoipa::path(
    patch,
    path = "/follow-ups/{id}/status",
    params(("id" = Uuid, Path, description = "Follow-up id")),
    request_body = UpdateFollowUpStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiEnvelope),
        (status = 400, description = "Unknown status", body = ApiEnvelope),
        (status = 404, description = "No such follow-up", body = ApiEnvelope)
    )
)]
pub async fn update_follow_up_status_handler(
    State(app_state): State<Arc<AppState>>,
    follow_up_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateFollowUpStatusRequest>, JsonRejection>,
) -> HandlerResult {
    let Path(follow_up_id) =
        follow_up_id.map_err(|e| fail(StatusCode::BAD_REQUEST, e.body_text()))?;
    let Json(request) = payload.map_err(|e| fail(StatusCode::BAD_REQUEST, e.body_text()))?;
    let status = request
        .status
        .parse::<FollowUpStatus>()
        .map_err(|message| fail(StatusCode::BAD_REQUEST, message))?;

    app_state
        .store
        .update_follow_up_status(follow_up_id, status)
        .await
        .map_err(|e| port_failure("Failed to update follow-up", e))?;
    info!(%follow_up_id, status = status.as_str(), "Follow-up status updated");
    respond(
        StatusCode::OK,
        &FollowUpStatusChanged {
            id: follow_up_id,
            status,
        },
    )
}

/// List a company's recurring issues, highest priority first.
#[utoipa::path(
    get,
    path = "/companies/{id}/recurring-issues",
    params(("id" = Uuid, Path, description = "Company id")),
    responses(
        (status = 200, description = "Recurring issues", body = ApiEnvelope)
    )
)]
pub async fn list_recurring_issues_handler(
    State(app_state): State<Arc<AppState>>,
    company_id: Result<Path<Uuid>, PathRejection>,
) -> HandlerResult {
    let Path(company_id) = company_id.map_err(|e| fail(StatusCode::BAD_REQUEST, e.body_text()))?;
    let issues = app_state
        .store
        .list_recurring_issues(company_id)
        .await
        .map_err(|e| port_failure("Failed to list recurring issues", e))?;
    respond(StatusCode::OK, &issues)
}
