//! Payment intent handlers: creation, status query, listing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::DateTime;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        CreateIntentRequest, FeeRecordView, IntentCreatedResponse, IntentListResponse,
        IntentStatusResponse, IntentSummary, IntentView, ListIntentsQuery,
    },
    services::{CreateIntent, IntentFilter},
    startup::AppState,
};

/// Create a payment intent with a renderable payment code.
pub async fn create_intent(
    State(state): State<AppState>,
    Json(payload): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<IntentCreatedResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        student_id = %payload.student_id,
        amount = payload.amount,
        fee_type = %payload.fee_type,
        semester = ?payload.semester,
        "Creating payment intent"
    );

    let created = state
        .intent_manager
        .create_intent(CreateIntent {
            student_id: payload.student_id,
            amount: payload.amount,
            fee_type: payload.fee_type,
            semester: payload.semester,
            description: payload.description,
            created_by: payload.created_by,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IntentCreatedResponse::from(created)),
    ))
}

/// Status query: the intent (read-time classified) plus a snapshot of the
/// fee record it targets.
pub async fn get_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> Result<Json<IntentStatusResponse>, AppError> {
    let intent = state
        .intents
        .get(&intent_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment intent not found".to_string()))?;

    let student = state
        .students
        .get(&intent.student_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;
    let fee_record = student.record_for(intent.semester).map(FeeRecordView::from);

    Ok(Json(IntentStatusResponse {
        intent: IntentView::at(intent, DateTime::now()),
        fee_record,
    }))
}

/// Newest-first intent listing with filters and pagination.
pub async fn list_intents(
    State(state): State<AppState>,
    Query(params): Query<ListIntentsQuery>,
) -> Result<Json<IntentListResponse>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).max(1).min(100);

    let filter = IntentFilter {
        student_id: params.student_id,
        status: params.status,
        fee_type: params.fee_type,
        semester: params.semester,
    };

    let (intents, total) = state.intents.list(&filter, page, limit).await?;
    let now = DateTime::now();
    let total_pages = (total as f64 / limit as f64).ceil() as u64;

    Ok(Json(IntentListResponse {
        intents: intents
            .into_iter()
            .map(|intent| IntentSummary::at(intent, now))
            .collect(),
        total,
        page,
        limit,
        total_pages,
    }))
}
