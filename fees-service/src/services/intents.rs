//! Payment intent creation: the write-side funnel in front of the ledger.

use std::sync::Arc;

use chrono::Datelike;
use mongodb::bson::DateTime;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{FeeType, INTENT_TTL_MILLIS, IntentStatus, PaymentCode, PaymentIntent};
use crate::services::gateway::PaymentGateway;
use crate::services::metrics;
use crate::services::store::{InsertOutcome, IntentStore, StudentStore};
use crate::services::upi::UpiService;

/// Inputs for intent creation, shape-validated at the edge.
#[derive(Debug, Clone)]
pub struct CreateIntent {
    pub student_id: Uuid,
    pub amount: i64,
    pub fee_type: FeeType,
    pub semester: Option<i32>,
    pub description: Option<String>,
    pub created_by: Option<String>,
}

/// A freshly created intent plus any advisory warnings.
#[derive(Debug)]
pub struct CreatedIntent {
    pub intent: PaymentIntent,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct IntentManager {
    students: Arc<dyn StudentStore>,
    intents: Arc<dyn IntentStore>,
    gateway: Arc<dyn PaymentGateway>,
    upi: UpiService,
}

impl IntentManager {
    pub fn new(
        students: Arc<dyn StudentStore>,
        intents: Arc<dyn IntentStore>,
        gateway: Arc<dyn PaymentGateway>,
        upi: UpiService,
    ) -> Self {
        Self {
            students,
            intents,
            gateway,
            upi,
        }
    }

    /// Create a payment intent for one of a student's fees.
    ///
    /// Every check runs before any side effect. An error response means
    /// nothing was created anywhere; the gateway order is only placed once
    /// the request has cleared all local validation, and the intent is only
    /// persisted once the order exists.
    pub async fn create_intent(&self, request: CreateIntent) -> Result<CreatedIntent, AppError> {
        let student = self
            .students
            .get(&request.student_id)
            .await?
            .filter(|student| student.is_active)
            .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

        let semester = request.semester.unwrap_or(student.semester);
        let record = student.record_for(semester).ok_or_else(|| {
            AppError::Validation(format!("Fee structure not found for semester {}", semester))
        })?;

        if student.is_settled(request.fee_type, semester) {
            return Err(AppError::conflict(format!(
                "{} fee is already paid for semester {}",
                request.fee_type, semester
            )));
        }

        let mut warnings = Vec::new();
        let allocation = record.allocation_for(request.fee_type);
        if allocation > 0 {
            if request.amount > allocation {
                return Err(AppError::Validation(format!(
                    "Amount ({}) exceeds expected {} fee ({})",
                    request.amount, request.fee_type, allocation
                )));
            }
            if request.amount < allocation {
                warnings.push(format!(
                    "This is a partial payment. Expected {} fee is {}",
                    request.fee_type, allocation
                ));
            }
        }

        if record.paid + request.amount > record.total {
            let max_payable = (record.total - record.paid).max(0);
            return Err(AppError::conflict_with(
                format!(
                    "Payment amount ({}) would exceed the pending balance ({})",
                    request.amount, max_payable
                ),
                json!({ "max_payable": max_payable }),
            ));
        }

        if let Some(existing) = self
            .intents
            .find_live_pending(&student.id, request.fee_type, semester)
            .await?
        {
            return Err(duplicate_pending(&existing));
        }

        let now = DateTime::now();
        let intent_id = PaymentIntent::generate_id(now);
        let description = request.description.clone().unwrap_or_else(|| {
            format!(
                "{} payment for {} - Semester {}",
                request.fee_type,
                student.full_name(),
                semester
            )
        });

        let order = self
            .gateway
            .create_order(
                rupees_to_paise(request.amount),
                "INR",
                &intent_id,
                json!({
                    "student_id": student.id,
                    "roll_number": student.roll_number,
                    "fee_type": request.fee_type,
                    "semester": semester.to_string(),
                    "payment_id": intent_id,
                }),
            )
            .await?;

        let upi_link = self
            .upi
            .payment_link(request.amount, &description, &intent_id);
        let qr_image_base64 = self.upi.qr_png_base64(&upi_link).map_err(AppError::Internal)?;

        let intent = PaymentIntent {
            id: intent_id,
            student_id: student.id,
            amount: request.amount,
            fee_type: request.fee_type,
            semester,
            academic_year: current_academic_year(now),
            description,
            status: IntentStatus::Pending,
            razorpay_order_id: Some(order.id),
            razorpay_payment_id: None,
            razorpay_signature: None,
            payment_code: PaymentCode {
                upi_link,
                qr_image_base64,
            },
            receipt: None,
            created_by: request.created_by,
            created_at: now,
            expires_at: DateTime::from_millis(now.timestamp_millis() + INTENT_TTL_MILLIS),
            paid_at: None,
        };

        let created = intent.clone();
        match self.intents.insert_pending(intent).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::DuplicatePending(existing) => {
                // lost the slot to a concurrent twin; surface its intent
                return Err(duplicate_pending(&existing));
            }
        }

        metrics::record_intent_created(created.fee_type.as_str());
        tracing::info!(
            intent_id = %created.id,
            student_id = %created.student_id,
            amount = created.amount,
            fee_type = %created.fee_type,
            semester = created.semester,
            "payment intent created"
        );

        Ok(CreatedIntent {
            intent: created,
            warnings,
        })
    }
}

fn duplicate_pending(existing: &PaymentIntent) -> AppError {
    AppError::conflict_with(
        format!(
            "A pending {} payment already exists for semester {}. Complete it or wait for it to expire.",
            existing.fee_type, existing.semester
        ),
        json!({
            "existing_intent_id": existing.id,
            "expires_at": existing.expires_at.try_to_rfc3339_string().unwrap_or_default(),
        }),
    )
}

fn rupees_to_paise(amount: i64) -> u64 {
    (amount.max(0) as u64) * 100
}

fn current_academic_year(now: DateTime) -> String {
    let year = now.to_chrono().year();
    format!("{}-{}", year, year + 1)
}
