//! Storage ports for the student ledger and intent collections.
//!
//! Two implementations exist: `FeeRepository` on MongoDB and the in-memory
//! stores used by tests and local development. The conditional-update
//! contracts here are what the settlement engine's exactly-once behavior
//! rests on.

use async_trait::async_trait;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    FeeStructureUpdate, FeeType, IntentStatus, PaymentIntent, PaymentRef, Receipt, Student,
};

/// Outcome of the conditional pending insert.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted,
    /// A live pending intent already holds the (student, fee type, semester)
    /// slot.
    DuplicatePending(PaymentIntent),
}

/// Fields written when an intent settles.
#[derive(Debug, Clone)]
pub struct SettlementUpdate {
    pub transaction_id: String,
    pub signature: Option<String>,
    pub paid_at: DateTime,
    pub receipt: Receipt,
}

/// Outcome of the conditional completion update.
#[derive(Debug)]
pub enum CompleteOutcome {
    /// This call won the pending -> completed transition.
    Completed(PaymentIntent),
    /// Another settlement already completed the intent.
    AlreadyCompleted(PaymentIntent),
    /// The intent is not payable; carries the effective status.
    NotPending(IntentStatus),
    /// The receipt number is already taken; the caller regenerates.
    ReceiptCollision,
}

/// Filters for intent listing, matched against effective status.
#[derive(Debug, Default, Clone)]
pub struct IntentFilter {
    pub student_id: Option<Uuid>,
    pub status: Option<IntentStatus>,
    pub fee_type: Option<FeeType>,
    pub semester: Option<i32>,
}

impl IntentFilter {
    pub fn matches(&self, intent: &PaymentIntent, now: DateTime) -> bool {
        self.student_id.map_or(true, |id| intent.student_id == id)
            && self
                .status
                .map_or(true, |status| intent.effective_status(now) == status)
            && self
                .fee_type
                .map_or(true, |fee_type| intent.fee_type == fee_type)
            && self
                .semester
                .map_or(true, |semester| intent.semester == semester)
    }
}

#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Inserts a new student; Conflict when the roll number or email is
    /// already taken.
    async fn insert(&self, student: Student) -> Result<(), AppError>;

    async fn get(&self, id: &Uuid) -> Result<Option<Student>, AppError>;

    /// Administrative fee structure update for the current semester.
    async fn update_fees(
        &self,
        id: &Uuid,
        update: &FeeStructureUpdate,
    ) -> Result<Student, AppError>;

    /// Applies a settled payment to the student's ledger, serialized per
    /// student. Idempotent per payment id; returns the post-apply student
    /// either way.
    async fn apply_payment(
        &self,
        id: &Uuid,
        semester: i32,
        academic_year: &str,
        payment: &PaymentRef,
    ) -> Result<Student, AppError>;
}

#[async_trait]
pub trait IntentStore: Send + Sync {
    /// Conditionally inserts a pending intent: fails closed when a live
    /// pending intent holds the same (student, fee type, semester) slot. A
    /// stored-pending blocker already past its deadline is reclassified to
    /// expired and replaced.
    async fn insert_pending(&self, intent: PaymentIntent) -> Result<InsertOutcome, AppError>;

    async fn get(&self, id: &str) -> Result<Option<PaymentIntent>, AppError>;

    async fn find_by_order(&self, order_id: &str) -> Result<Option<PaymentIntent>, AppError>;

    /// The live pending intent for a (student, fee type, semester), if any.
    async fn find_live_pending(
        &self,
        student_id: &Uuid,
        fee_type: FeeType,
        semester: i32,
    ) -> Result<Option<PaymentIntent>, AppError>;

    /// One-shot pending -> completed transition: assigns the receipt and
    /// settlement fields only when the intent is still live at
    /// `update.paid_at`.
    async fn complete(
        &self,
        id: &str,
        update: &SettlementUpdate,
    ) -> Result<CompleteOutcome, AppError>;

    /// Advisory pending -> expired flip; false when the intent was not
    /// stored-pending.
    async fn mark_expired(&self, id: &str) -> Result<bool, AppError>;

    /// Newest-first page of intents plus the total match count.
    async fn list(
        &self,
        filter: &IntentFilter,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<PaymentIntent>, u64), AppError>;
}
