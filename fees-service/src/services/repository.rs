use anyhow::anyhow;
use async_trait::async_trait;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{DateTime, doc},
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    FeeStructureUpdate, FeeType, IntentStatus, PaymentIntent, PaymentRef, Student,
};
use crate::services::store::{
    CompleteOutcome, InsertOutcome, IntentFilter, IntentStore, SettlementUpdate, StudentStore,
};

const MAX_VERSION_RETRIES: usize = 5;
const MAX_INSERT_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct FeeRepository {
    students: Collection<Student>,
    intents: Collection<PaymentIntent>,
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

impl FeeRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            students: db.collection("students"),
            intents: db.collection("payment_intents"),
        }
    }

    /// Initialize the unique and query indexes both stores rely on.
    pub async fn init_indexes(&self) -> anyhow::Result<()> {
        let roll_index = IndexModel::builder()
            .keys(doc! { "roll_number": 1 })
            .options(
                IndexOptions::builder()
                    .name("roll_number_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("email_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.students
            .create_indexes([roll_index, email_index], None)
            .await?;

        // One live pending intent per (student, fee type, semester);
        // completed and expired intents fall out of the partial index
        let pending_slot_index = IndexModel::builder()
            .keys(doc! { "student_id": 1, "fee_type": 1, "semester": 1 })
            .options(
                IndexOptions::builder()
                    .name("pending_slot_idx".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "status": "pending" })
                    .build(),
            )
            .build();

        let order_index = IndexModel::builder()
            .keys(doc! { "razorpay_order_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("razorpay_order_idx".to_string())
                    .unique(true)
                    .sparse(true)
                    .build(),
            )
            .build();

        let receipt_index = IndexModel::builder()
            .keys(doc! { "receipt.number": 1 })
            .options(
                IndexOptions::builder()
                    .name("receipt_number_idx".to_string())
                    .unique(true)
                    .sparse(true)
                    .build(),
            )
            .build();

        let student_history_index = IndexModel::builder()
            .keys(doc! { "student_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("student_history_idx".to_string())
                    .build(),
            )
            .build();

        self.intents
            .create_indexes(
                [
                    pending_slot_index,
                    order_index,
                    receipt_index,
                    student_history_index,
                ],
                None,
            )
            .await?;

        tracing::info!("Fees service indexes initialized");
        Ok(())
    }

    async fn find_student(&self, id: &Uuid) -> Result<Option<Student>, AppError> {
        let student = self
            .students
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?;
        Ok(student)
    }

    /// Load-mutate-replace with a version compare-and-swap. `mutate` returns
    /// false for a no-op (e.g. an already-applied payment), which is
    /// returned as-is without a write.
    async fn mutate_student<F>(&self, id: &Uuid, mutate: F) -> Result<Student, AppError>
    where
        F: Fn(&mut Student) -> bool + Send + Sync,
    {
        for _ in 0..MAX_VERSION_RETRIES {
            let mut student = self
                .find_student(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))?;
            let expected_version = student.version;

            if !mutate(&mut student) {
                return Ok(student);
            }
            student.version = expected_version + 1;
            student.updated_at = DateTime::now();

            let filter = doc! { "_id": id.to_string(), "version": expected_version };
            let result = self.students.replace_one(filter, &student, None).await?;
            if result.modified_count == 1 {
                return Ok(student);
            }
            tracing::debug!(student_id = %id, "lost ledger version race, retrying");
        }
        Err(AppError::Database(anyhow!(
            "could not apply ledger update for student {} after {} attempts",
            id,
            MAX_VERSION_RETRIES
        )))
    }

    async fn find_stored_pending(
        &self,
        student_id: &Uuid,
        fee_type: FeeType,
        semester: i32,
    ) -> Result<Option<PaymentIntent>, AppError> {
        let filter = doc! {
            "student_id": student_id.to_string(),
            "fee_type": fee_type.as_str(),
            "semester": semester,
            "status": IntentStatus::Pending.as_str(),
        };
        let intent = self.intents.find_one(filter, None).await?;
        Ok(intent)
    }
}

#[async_trait]
impl StudentStore for FeeRepository {
    async fn insert(&self, student: Student) -> Result<(), AppError> {
        match self.students.insert_one(&student, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(AppError::conflict(
                "Student with this roll number or email already exists",
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Student>, AppError> {
        self.find_student(id).await
    }

    async fn update_fees(
        &self,
        id: &Uuid,
        update: &FeeStructureUpdate,
    ) -> Result<Student, AppError> {
        self.mutate_student(id, |student| {
            student.update_fee_structure(update);
            true
        })
        .await
    }

    async fn apply_payment(
        &self,
        id: &Uuid,
        semester: i32,
        academic_year: &str,
        payment: &PaymentRef,
    ) -> Result<Student, AppError> {
        self.mutate_student(id, |student| {
            student.apply_payment(semester, academic_year, payment)
        })
        .await
    }
}

#[async_trait]
impl IntentStore for FeeRepository {
    async fn insert_pending(&self, intent: PaymentIntent) -> Result<InsertOutcome, AppError> {
        for _ in 0..MAX_INSERT_ATTEMPTS {
            match self.intents.insert_one(&intent, None).await {
                Ok(_) => return Ok(InsertOutcome::Inserted),
                Err(err) if is_duplicate_key(&err) => {
                    let blocker = self
                        .find_stored_pending(&intent.student_id, intent.fee_type, intent.semester)
                        .await?;
                    match blocker {
                        Some(existing) if existing.is_live(DateTime::now()) => {
                            return Ok(InsertOutcome::DuplicatePending(existing));
                        }
                        Some(existing) => {
                            // stored-pending but expired: reclassify so the
                            // partial index frees the slot, then retry
                            self.mark_expired(&existing.id).await?;
                        }
                        None => {
                            // blocker settled between insert and lookup
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(AppError::Database(anyhow!(
            "could not insert payment intent {} after {} attempts",
            intent.id,
            MAX_INSERT_ATTEMPTS
        )))
    }

    async fn get(&self, id: &str) -> Result<Option<PaymentIntent>, AppError> {
        let intent = self.intents.find_one(doc! { "_id": id }, None).await?;
        Ok(intent)
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<PaymentIntent>, AppError> {
        let intent = self
            .intents
            .find_one(doc! { "razorpay_order_id": order_id }, None)
            .await?;
        Ok(intent)
    }

    async fn find_live_pending(
        &self,
        student_id: &Uuid,
        fee_type: FeeType,
        semester: i32,
    ) -> Result<Option<PaymentIntent>, AppError> {
        let filter = doc! {
            "student_id": student_id.to_string(),
            "fee_type": fee_type.as_str(),
            "semester": semester,
            "status": IntentStatus::Pending.as_str(),
            "expires_at": { "$gt": DateTime::now() },
        };
        let intent = self.intents.find_one(filter, None).await?;
        Ok(intent)
    }

    async fn complete(
        &self,
        id: &str,
        update: &SettlementUpdate,
    ) -> Result<CompleteOutcome, AppError> {
        let mut set = doc! {
            "status": IntentStatus::Completed.as_str(),
            "razorpay_payment_id": update.transaction_id.as_str(),
            "paid_at": update.paid_at,
            "receipt": {
                "number": update.receipt.number.as_str(),
                "issued_at": update.receipt.issued_at,
            },
        };
        if let Some(signature) = &update.signature {
            set.insert("razorpay_signature", signature.as_str());
        }

        let filter = doc! {
            "_id": id,
            "status": IntentStatus::Pending.as_str(),
            "expires_at": { "$gt": update.paid_at },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        match self
            .intents
            .find_one_and_update(filter, doc! { "$set": set }, options)
            .await
        {
            Ok(Some(intent)) => Ok(CompleteOutcome::Completed(intent)),
            Ok(None) => {
                let current = IntentStore::get(self, id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("Payment intent {} not found", id))
                })?;
                match current.status {
                    IntentStatus::Completed => Ok(CompleteOutcome::AlreadyCompleted(current)),
                    _ => Ok(CompleteOutcome::NotPending(
                        current.effective_status(update.paid_at),
                    )),
                }
            }
            Err(err) if is_duplicate_key(&err) => Ok(CompleteOutcome::ReceiptCollision),
            Err(err) => Err(err.into()),
        }
    }

    async fn mark_expired(&self, id: &str) -> Result<bool, AppError> {
        let filter = doc! { "_id": id, "status": IntentStatus::Pending.as_str() };
        let update = doc! { "$set": { "status": IntentStatus::Expired.as_str() } };
        let result = self.intents.update_one(filter, update, None).await?;
        Ok(result.modified_count > 0)
    }

    async fn list(
        &self,
        filter: &IntentFilter,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<PaymentIntent>, u64), AppError> {
        use futures::TryStreamExt;
        use mongodb::options::FindOptions;

        let now = DateTime::now();
        let mut query = doc! {};
        if let Some(student_id) = &filter.student_id {
            query.insert("student_id", student_id.to_string());
        }
        if let Some(fee_type) = filter.fee_type {
            query.insert("fee_type", fee_type.as_str());
        }
        if let Some(semester) = filter.semester {
            query.insert("semester", semester);
        }
        // status filters follow read-time classification: a stored-pending
        // intent past its deadline counts as expired, not pending
        match filter.status {
            Some(IntentStatus::Pending) => {
                query.insert("status", IntentStatus::Pending.as_str());
                query.insert("expires_at", doc! { "$gt": now });
            }
            Some(IntentStatus::Expired) => {
                query.insert(
                    "$or",
                    vec![
                        doc! { "status": IntentStatus::Expired.as_str() },
                        doc! {
                            "status": IntentStatus::Pending.as_str(),
                            "expires_at": { "$lte": now },
                        },
                    ],
                );
            }
            Some(status) => {
                query.insert("status", status.as_str());
            }
            None => {}
        }

        let total = self.intents.count_documents(query.clone(), None).await?;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(((page - 1).max(0) * limit.max(0)) as u64)
            .limit(limit)
            .build();

        let cursor = self.intents.find(query, Some(options)).await?;
        let intents: Vec<PaymentIntent> = cursor.try_collect().await?;
        Ok((intents, total))
    }
}
