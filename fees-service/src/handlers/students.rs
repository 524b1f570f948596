//! Student ledger handlers: creation, ledger view, administrative fee edits.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::DateTime;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{CreateStudentRequest, StudentFeesResponse, StudentResponse, UpdateFeesRequest},
    models::{FeeRecord, FeeStructureUpdate, Student},
    startup::AppState,
};

/// Create a student; the fee ledger for the current semester is created
/// with it.
pub async fn create_student(
    State(state): State<AppState>,
    Json(payload): Json<CreateStudentRequest>,
) -> Result<(StatusCode, Json<StudentResponse>), AppError> {
    payload.validate()?;
    if payload.fee_structure.has_negative() {
        return Err(AppError::Validation(
            "Fee amounts cannot be negative".to_string(),
        ));
    }

    let now = DateTime::now();
    let student = Student {
        id: Uuid::new_v4(),
        roll_number: payload.roll_number.trim().to_uppercase(),
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        email: payload.email.trim().to_lowercase(),
        phone: payload.phone.trim().to_string(),
        course: payload.course,
        department: payload.department,
        semester: payload.semester,
        admission_year: payload.admission_year,
        is_active: true,
        fee_structure: FeeRecord::new(
            payload.fee_structure,
            payload.total_fee,
            payload.due_date.map(DateTime::from_chrono),
            now,
        ),
        semester_fees: Default::default(),
        settled_payments: Vec::new(),
        version: 0,
        created_at: now,
        updated_at: now,
    };

    tracing::info!(
        student_id = %student.id,
        roll_number = %student.roll_number,
        semester = student.semester,
        total_fee = student.fee_structure.total,
        "Creating student ledger"
    );

    state.students.insert(student.clone()).await?;

    Ok((StatusCode::CREATED, Json(StudentResponse::from(student))))
}

/// Ledger view: current-semester record plus the per-semester history.
pub async fn get_student_fees(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<StudentFeesResponse>, AppError> {
    let student = state
        .students
        .get(&student_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

    Ok(Json(StudentFeesResponse::from(&student)))
}

/// Administrative fee structure edit for the current semester. Never
/// touches `paid`; totals re-derive.
pub async fn update_student_fees(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
    Json(payload): Json<UpdateFeesRequest>,
) -> Result<Json<StudentFeesResponse>, AppError> {
    payload.validate()?;
    if let Some(components) = &payload.fee_structure {
        if components.has_negative() {
            return Err(AppError::Validation(
                "Fee amounts cannot be negative".to_string(),
            ));
        }
    }

    let update = FeeStructureUpdate {
        components: payload.fee_structure,
        total: payload.total_fee,
        due_date: payload.due_date.map(DateTime::from_chrono),
    };

    tracing::info!(student_id = %student_id, "Updating fee structure");

    let student = state.students.update_fees(&student_id, &update).await?;

    Ok(Json(StudentFeesResponse::from(&student)))
}
