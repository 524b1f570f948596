//! In-memory stores for tests and local development.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    FeeStructureUpdate, FeeType, IntentStatus, PaymentIntent, PaymentRef, Student,
};
use crate::services::store::{
    CompleteOutcome, InsertOutcome, IntentFilter, IntentStore, SettlementUpdate, StudentStore,
};

/// HashMap-backed student store. The write lock serializes ledger mutations,
/// standing in for the repository's version check.
#[derive(Default, Clone)]
pub struct InMemoryStudentStore {
    students: Arc<RwLock<HashMap<Uuid, Student>>>,
}

impl InMemoryStudentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StudentStore for InMemoryStudentStore {
    async fn insert(&self, student: Student) -> Result<(), AppError> {
        let mut students = self.students.write().await;
        let duplicate = students.values().any(|existing| {
            existing.roll_number == student.roll_number || existing.email == student.email
        });
        if duplicate {
            return Err(AppError::conflict(
                "Student with this roll number or email already exists",
            ));
        }
        students.insert(student.id, student);
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Student>, AppError> {
        Ok(self.students.read().await.get(id).cloned())
    }

    async fn update_fees(
        &self,
        id: &Uuid,
        update: &FeeStructureUpdate,
    ) -> Result<Student, AppError> {
        let mut students = self.students.write().await;
        let student = students
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))?;
        student.update_fee_structure(update);
        student.version += 1;
        student.updated_at = DateTime::now();
        Ok(student.clone())
    }

    async fn apply_payment(
        &self,
        id: &Uuid,
        semester: i32,
        academic_year: &str,
        payment: &PaymentRef,
    ) -> Result<Student, AppError> {
        let mut students = self.students.write().await;
        let student = students
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))?;
        if student.apply_payment(semester, academic_year, payment) {
            student.version += 1;
            student.updated_at = DateTime::now();
        }
        Ok(student.clone())
    }
}

#[derive(Default)]
struct IntentState {
    intents: HashMap<String, PaymentIntent>,
    issued_receipts: HashSet<String>,
}

/// HashMap-backed intent store honoring the same conditional-update
/// contract as the Mongo repository.
#[derive(Default, Clone)]
pub struct InMemoryIntentStore {
    state: Arc<RwLock<IntentState>>,
}

impl InMemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntentStore for InMemoryIntentStore {
    async fn insert_pending(&self, intent: PaymentIntent) -> Result<InsertOutcome, AppError> {
        let now = DateTime::now();
        let mut state = self.state.write().await;

        let blocker_id = state
            .intents
            .values()
            .find(|existing| {
                existing.status == IntentStatus::Pending
                    && existing.student_id == intent.student_id
                    && existing.fee_type == intent.fee_type
                    && existing.semester == intent.semester
            })
            .map(|existing| existing.id.clone());

        if let Some(blocker_id) = blocker_id {
            if let Some(existing) = state.intents.get_mut(&blocker_id) {
                if existing.is_live(now) {
                    return Ok(InsertOutcome::DuplicatePending(existing.clone()));
                }
                // stored-pending but past its deadline: reclassify and let
                // the new intent through
                existing.status = IntentStatus::Expired;
            }
        }

        state.intents.insert(intent.id.clone(), intent);
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, id: &str) -> Result<Option<PaymentIntent>, AppError> {
        Ok(self.state.read().await.intents.get(id).cloned())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<PaymentIntent>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .intents
            .values()
            .find(|intent| intent.razorpay_order_id.as_deref() == Some(order_id))
            .cloned())
    }

    async fn find_live_pending(
        &self,
        student_id: &Uuid,
        fee_type: FeeType,
        semester: i32,
    ) -> Result<Option<PaymentIntent>, AppError> {
        let now = DateTime::now();
        let state = self.state.read().await;
        Ok(state
            .intents
            .values()
            .find(|intent| {
                intent.student_id == *student_id
                    && intent.fee_type == fee_type
                    && intent.semester == semester
                    && intent.is_live(now)
            })
            .cloned())
    }

    async fn complete(
        &self,
        id: &str,
        update: &SettlementUpdate,
    ) -> Result<CompleteOutcome, AppError> {
        let mut state = self.state.write().await;

        let snapshot = match state.intents.get(id) {
            Some(intent) => intent.clone(),
            None => {
                return Err(AppError::NotFound(format!("Payment intent {} not found", id)));
            }
        };

        match snapshot.status {
            IntentStatus::Completed => return Ok(CompleteOutcome::AlreadyCompleted(snapshot)),
            IntentStatus::Pending if snapshot.expires_at < update.paid_at => {
                return Ok(CompleteOutcome::NotPending(IntentStatus::Expired));
            }
            IntentStatus::Pending => {}
            other => return Ok(CompleteOutcome::NotPending(other)),
        }

        if !state.issued_receipts.insert(update.receipt.number.clone()) {
            return Ok(CompleteOutcome::ReceiptCollision);
        }

        match state.intents.get_mut(id) {
            Some(intent) => {
                intent.status = IntentStatus::Completed;
                intent.razorpay_payment_id = Some(update.transaction_id.clone());
                intent.razorpay_signature = update.signature.clone();
                intent.paid_at = Some(update.paid_at);
                intent.receipt = Some(update.receipt.clone());
                Ok(CompleteOutcome::Completed(intent.clone()))
            }
            None => Err(AppError::Database(anyhow::anyhow!(
                "intent disappeared during completion"
            ))),
        }
    }

    async fn mark_expired(&self, id: &str) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.intents.get_mut(id) {
            Some(intent) if intent.status == IntentStatus::Pending => {
                intent.status = IntentStatus::Expired;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(
        &self,
        filter: &IntentFilter,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<PaymentIntent>, u64), AppError> {
        let now = DateTime::now();
        let state = self.state.read().await;
        let mut matches: Vec<PaymentIntent> = state
            .intents
            .values()
            .filter(|intent| filter.matches(intent, now))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matches.len() as u64;
        let skip = ((page - 1).max(0) * limit.max(0)) as usize;
        let items = matches
            .into_iter()
            .skip(skip)
            .take(limit.max(0) as usize)
            .collect();
        Ok((items, total))
    }
}
