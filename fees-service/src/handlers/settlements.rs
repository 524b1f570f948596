//! Settlement handlers: gateway confirmation, manual confirmation, receipts.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{ManualVerifyRequest, ReceiptResponse, SettlementResponse, VerifyPaymentRequest},
    models::IntentStatus,
    startup::AppState,
};

/// Gateway confirmation: verify the signature and settle the intent.
///
/// Redelivery of an already-settled confirmation returns the prior result
/// with a 200, never an error; the gateway stops retrying on success.
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<SettlementResponse>, AppError> {
    payload.validate()?;

    tracing::info!(
        razorpay_order_id = %payload.razorpay_order_id,
        razorpay_payment_id = %payload.razorpay_payment_id,
        "Verifying gateway payment"
    );

    let outcome = state
        .settlement
        .settle(
            &payload.razorpay_order_id,
            &payload.razorpay_payment_id,
            &payload.razorpay_signature,
        )
        .await?;

    Ok(Json(SettlementResponse::new(
        outcome,
        "Payment verified and recorded successfully",
    )))
}

/// Manual confirmation for payments completed directly in a UPI app.
pub async fn verify_manual(
    State(state): State<AppState>,
    Json(payload): Json<ManualVerifyRequest>,
) -> Result<Json<SettlementResponse>, AppError> {
    payload.validate()?;

    tracing::info!(
        intent_id = %payload.payment_id,
        transaction_id = %payload.transaction_id,
        amount = payload.amount,
        "Recording manual payment"
    );

    let outcome = state
        .settlement
        .settle_manual(&payload.payment_id, &payload.transaction_id, payload.amount)
        .await?;

    Ok(Json(SettlementResponse::new(
        outcome,
        "Payment recorded successfully",
    )))
}

/// Receipt for a completed intent.
pub async fn get_receipt(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let intent = state
        .intents
        .get(&intent_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment intent not found".to_string()))?;

    if intent.status != IntentStatus::Completed {
        return Err(AppError::conflict(
            "Receipt is available only for completed payments",
        ));
    }
    let receipt = intent.receipt.clone().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "completed intent {} has no receipt",
            intent.id
        ))
    })?;

    Ok(Json(ReceiptResponse {
        receipt_number: receipt.number,
        issued_at: receipt.issued_at.to_string(),
        intent_id: intent.id,
        student_id: intent.student_id,
        amount: intent.amount,
        fee_type: intent.fee_type,
        semester: intent.semester,
        academic_year: intent.academic_year,
        transaction_id: intent.razorpay_payment_id,
        paid_at: intent.paid_at.map(|at| at.to_string()),
    }))
}
