//! Settlement engine: verifies payment confirmations and commits them to
//! the ledger exactly once.

use std::sync::Arc;

use anyhow::anyhow;
use mongodb::bson::DateTime;
use service_core::error::AppError;

use crate::models::{
    FeeRecord, IntentStatus, PaymentIntent, PaymentRef, Receipt, SemesterStatus, Student,
};
use crate::services::gateway::PaymentGateway;
use crate::services::metrics;
use crate::services::store::{CompleteOutcome, IntentStore, SettlementUpdate, StudentStore};

const MAX_RECEIPT_ATTEMPTS: usize = 5;

/// Ledger state of the settled semester, as returned to callers.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub semester: i32,
    pub total: i64,
    pub paid: i64,
    pub pending: i64,
    pub status: SemesterStatus,
}

impl LedgerSnapshot {
    fn from_record(semester: i32, record: &FeeRecord) -> Self {
        LedgerSnapshot {
            semester,
            total: record.total,
            paid: record.paid,
            pending: record.pending,
            status: record.status(),
        }
    }
}

/// Result of a settlement, including the idempotent replay of one that
/// already went through.
#[derive(Debug)]
pub struct SettlementOutcome {
    pub intent: PaymentIntent,
    pub student: Student,
    pub ledger: LedgerSnapshot,
    pub is_fully_paid: bool,
    pub receipt_number: String,
}

#[derive(Clone)]
pub struct SettlementEngine {
    students: Arc<dyn StudentStore>,
    intents: Arc<dyn IntentStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl SettlementEngine {
    pub fn new(
        students: Arc<dyn StudentStore>,
        intents: Arc<dyn IntentStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            students,
            intents,
            gateway,
        }
    }

    /// Gateway-confirmed settlement. The signature gate runs before any
    /// lookup or write; a mismatch mutates nothing.
    pub async fn settle(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<SettlementOutcome, AppError> {
        if !self.gateway.verify_signature(order_id, payment_id, signature) {
            return Err(AppError::Signature(
                "Invalid payment signature".to_string(),
            ));
        }
        let intent = self
            .intents
            .find_by_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment record not found".to_string()))?;
        self.finish(
            intent,
            payment_id.to_string(),
            Some(signature.to_string()),
            "gateway",
        )
        .await
    }

    /// Manual settlement by intent id, for payments completed in a UPI app
    /// with no gateway callback. `amount` must match the intent exactly.
    pub async fn settle_manual(
        &self,
        intent_id: &str,
        transaction_id: &str,
        amount: i64,
    ) -> Result<SettlementOutcome, AppError> {
        let intent = self
            .intents
            .get(intent_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment record not found".to_string()))?;
        if amount != intent.amount {
            return Err(AppError::Validation(format!(
                "Payment amount mismatch: expected {}",
                intent.amount
            )));
        }
        self.finish(intent, transaction_id.to_string(), None, "manual")
            .await
    }

    /// Commits a confirmed payment: ledger first, then the intent flip.
    ///
    /// The ledger apply is keyed by the intent id, so a crash between the
    /// two writes is healed on retry; the re-apply is skipped and only the
    /// intent flip runs again.
    async fn finish(
        &self,
        intent: PaymentIntent,
        transaction_id: String,
        signature: Option<String>,
        method: &'static str,
    ) -> Result<SettlementOutcome, AppError> {
        let now = DateTime::now();
        match intent.effective_status(now) {
            IntentStatus::Pending => {}
            IntentStatus::Completed => {
                // re-delivered confirmation; return the prior result
                return self.replay(intent).await;
            }
            IntentStatus::Expired => {
                if intent.status == IntentStatus::Pending {
                    self.intents.mark_expired(&intent.id).await?;
                    metrics::record_intent_expired();
                }
                return Err(not_payable(IntentStatus::Expired));
            }
            IntentStatus::Failed => {
                return Err(not_payable(IntentStatus::Failed));
            }
        }

        let payment = PaymentRef {
            payment_id: intent.id.clone(),
            amount: intent.amount,
            fee_type: intent.fee_type,
            paid_at: now,
            transaction_id: transaction_id.clone(),
        };
        let student = self
            .students
            .apply_payment(&intent.student_id, intent.semester, &intent.academic_year, &payment)
            .await?;

        let mut attempts = 0;
        let completed = loop {
            let update = SettlementUpdate {
                transaction_id: transaction_id.clone(),
                signature: signature.clone(),
                paid_at: now,
                receipt: Receipt::generate(now),
            };
            match self.intents.complete(&intent.id, &update).await? {
                CompleteOutcome::Completed(completed) => break completed,
                CompleteOutcome::AlreadyCompleted(completed) => break completed,
                CompleteOutcome::NotPending(status) => {
                    return Err(not_payable(status));
                }
                CompleteOutcome::ReceiptCollision => {
                    attempts += 1;
                    if attempts >= MAX_RECEIPT_ATTEMPTS {
                        return Err(AppError::Internal(anyhow!(
                            "could not allocate a unique receipt number for {}",
                            intent.id
                        )));
                    }
                    tracing::warn!(
                        intent_id = %intent.id,
                        attempts,
                        "receipt number collision, regenerating"
                    );
                }
            }
        };

        metrics::record_settlement(method, completed.fee_type.as_str(), completed.amount);
        tracing::info!(
            intent_id = %completed.id,
            student_id = %completed.student_id,
            amount = completed.amount,
            method,
            "payment settled"
        );

        self.outcome(completed, student)
    }

    /// Prior-result replay for an already-settled intent.
    async fn replay(&self, intent: PaymentIntent) -> Result<SettlementOutcome, AppError> {
        let student = self
            .students
            .get(&intent.student_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;
        self.outcome(intent, student)
    }

    fn outcome(
        &self,
        intent: PaymentIntent,
        student: Student,
    ) -> Result<SettlementOutcome, AppError> {
        let receipt_number = intent
            .receipt
            .as_ref()
            .map(|receipt| receipt.number.clone())
            .ok_or_else(|| {
                AppError::Internal(anyhow!("completed intent {} has no receipt", intent.id))
            })?;
        let ledger = student
            .record_for(intent.semester)
            .map(|record| LedgerSnapshot::from_record(intent.semester, record))
            .ok_or_else(|| {
                AppError::Internal(anyhow!(
                    "no ledger record for settled semester {}",
                    intent.semester
                ))
            })?;
        let is_fully_paid = ledger.total > 0 && ledger.paid >= ledger.total;
        Ok(SettlementOutcome {
            intent,
            student,
            ledger,
            is_fully_paid,
            receipt_number,
        })
    }
}

fn not_payable(status: IntentStatus) -> AppError {
    match status {
        IntentStatus::Expired => AppError::conflict("Payment intent has expired"),
        status => AppError::conflict(format!("Payment intent is {}, not payable", status)),
    }
}
