use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{FeeType, IntentStatus, PaymentCode, PaymentIntent, SemesterStatus};
use crate::services::intents::CreatedIntent;
use crate::services::settlement::{LedgerSnapshot, SettlementOutcome};

use super::students::FeeRecordView;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIntentRequest {
    pub student_id: Uuid,

    #[validate(range(min = 1, message = "Amount must be at least 1 rupee"))]
    pub amount: i64,

    pub fee_type: FeeType,

    #[validate(range(min = 1, max = 8, message = "Semester must be between 1 and 8"))]
    pub semester: Option<i32>,

    #[validate(length(max = 500, message = "Description is too long"))]
    pub description: Option<String>,

    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Order id is required"))]
    pub razorpay_order_id: String,

    #[validate(length(min = 1, message = "Payment id is required"))]
    pub razorpay_payment_id: String,

    #[validate(length(min = 1, message = "Signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ManualVerifyRequest {
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub payment_id: String,

    #[validate(length(min = 1, message = "Transaction id is required"))]
    pub transaction_id: String,

    #[validate(range(min = 1, message = "Amount must be at least 1 rupee"))]
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListIntentsQuery {
    pub student_id: Option<Uuid>,
    pub status: Option<IntentStatus>,
    pub fee_type: Option<FeeType>,
    pub semester: Option<i32>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct IntentCreatedResponse {
    pub intent_id: String,
    pub payment_code: PaymentCode,
    pub amount: i64,
    pub fee_type: FeeType,
    pub semester: i32,
    pub status: IntentStatus,
    pub expires_at: String,
    pub warnings: Vec<String>,
}

impl From<CreatedIntent> for IntentCreatedResponse {
    fn from(created: CreatedIntent) -> Self {
        let intent = created.intent;
        Self {
            intent_id: intent.id,
            payment_code: intent.payment_code,
            amount: intent.amount,
            fee_type: intent.fee_type,
            semester: intent.semester,
            status: intent.status,
            expires_at: intent.expires_at.to_string(),
            warnings: created.warnings,
        }
    }
}

/// Full intent view; `status` is the read-time classification, so a stored
/// `pending` past its expiry reads as `expired`.
#[derive(Debug, Serialize)]
pub struct IntentView {
    pub intent_id: String,
    pub student_id: Uuid,
    pub amount: i64,
    pub fee_type: FeeType,
    pub semester: i32,
    pub academic_year: String,
    pub description: String,
    pub status: IntentStatus,
    pub razorpay_order_id: Option<String>,
    pub payment_code: PaymentCode,
    pub receipt_number: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub paid_at: Option<String>,
}

impl IntentView {
    pub fn at(intent: PaymentIntent, now: DateTime) -> Self {
        let status = intent.effective_status(now);
        Self {
            intent_id: intent.id,
            student_id: intent.student_id,
            amount: intent.amount,
            fee_type: intent.fee_type,
            semester: intent.semester,
            academic_year: intent.academic_year,
            description: intent.description,
            status,
            razorpay_order_id: intent.razorpay_order_id,
            payment_code: intent.payment_code,
            receipt_number: intent.receipt.map(|receipt| receipt.number),
            created_by: intent.created_by,
            created_at: intent.created_at.to_string(),
            expires_at: intent.expires_at.to_string(),
            paid_at: intent.paid_at.map(|at| at.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IntentStatusResponse {
    pub intent: IntentView,
    pub fee_record: Option<FeeRecordView>,
}

/// List row; omits the payment code so pages stay small.
#[derive(Debug, Serialize)]
pub struct IntentSummary {
    pub intent_id: String,
    pub student_id: Uuid,
    pub amount: i64,
    pub fee_type: FeeType,
    pub semester: i32,
    pub academic_year: String,
    pub status: IntentStatus,
    pub receipt_number: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub paid_at: Option<String>,
}

impl IntentSummary {
    pub fn at(intent: PaymentIntent, now: DateTime) -> Self {
        let status = intent.effective_status(now);
        Self {
            intent_id: intent.id,
            student_id: intent.student_id,
            amount: intent.amount,
            fee_type: intent.fee_type,
            semester: intent.semester,
            academic_year: intent.academic_year,
            status,
            receipt_number: intent.receipt.map(|receipt| receipt.number),
            created_at: intent.created_at.to_string(),
            expires_at: intent.expires_at.to_string(),
            paid_at: intent.paid_at.map(|at| at.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IntentListResponse {
    pub intents: Vec<IntentSummary>,
    pub total: u64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct StudentSummary {
    pub id: Uuid,
    pub roll_number: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct LedgerSummaryView {
    pub semester: i32,
    pub total: i64,
    pub paid: i64,
    pub pending: i64,
    pub status: SemesterStatus,
}

impl From<&LedgerSnapshot> for LedgerSummaryView {
    fn from(ledger: &LedgerSnapshot) -> Self {
        Self {
            semester: ledger.semester,
            total: ledger.total,
            paid: ledger.paid,
            pending: ledger.pending,
            status: ledger.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    pub intent_id: String,
    pub receipt_number: String,
    pub amount: i64,
    pub fee_type: FeeType,
    pub semester: i32,
    pub status: IntentStatus,
    pub paid_at: Option<String>,
    pub is_fully_paid: bool,
    pub message: String,
    pub student: StudentSummary,
    pub ledger: LedgerSummaryView,
}

impl SettlementResponse {
    pub fn new(outcome: SettlementOutcome, message: &str) -> Self {
        Self {
            intent_id: outcome.intent.id.clone(),
            receipt_number: outcome.receipt_number.clone(),
            amount: outcome.intent.amount,
            fee_type: outcome.intent.fee_type,
            semester: outcome.intent.semester,
            status: outcome.intent.status,
            paid_at: outcome.intent.paid_at.map(|at| at.to_string()),
            is_fully_paid: outcome.is_fully_paid,
            message: message.to_string(),
            student: StudentSummary {
                id: outcome.student.id,
                roll_number: outcome.student.roll_number.clone(),
                name: outcome.student.full_name(),
            },
            ledger: LedgerSummaryView::from(&outcome.ledger),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub receipt_number: String,
    pub issued_at: String,
    pub intent_id: String,
    pub student_id: Uuid,
    pub amount: i64,
    pub fee_type: FeeType,
    pub semester: i32,
    pub academic_year: String,
    pub transaction_id: Option<String>,
    pub paid_at: Option<String>,
}
