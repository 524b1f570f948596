//! Student fee ledger: per-semester fee records and settlement trails.

use std::collections::BTreeMap;

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::FeeType;

const DEFAULT_DUE_DAYS: i64 = 30;
const BACKFILL_DUE_DAYS: i64 = 90;

fn days_after(start: DateTime, days: i64) -> DateTime {
    DateTime::from_millis(start.timestamp_millis() + days * 24 * 60 * 60 * 1000)
}

/// Per-category fee breakdown, in whole rupees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeComponents {
    #[serde(default)]
    pub tuition: i64,
    #[serde(default)]
    pub exam: i64,
    #[serde(default)]
    pub library: i64,
    #[serde(default)]
    pub lab: i64,
    #[serde(default)]
    pub hostel: i64,
    #[serde(default)]
    pub mess: i64,
    #[serde(default)]
    pub other: i64,
}

impl FeeComponents {
    pub fn component_total(&self) -> i64 {
        self.tuition + self.exam + self.library + self.lab + self.hostel + self.mess + self.other
    }

    /// Allocation for a component fee type; `None` for `full`, which has no
    /// fixed allocation of its own.
    pub fn amount_for(&self, fee_type: FeeType) -> Option<i64> {
        match fee_type {
            FeeType::Tuition => Some(self.tuition),
            FeeType::Exam => Some(self.exam),
            FeeType::Library => Some(self.library),
            FeeType::Lab => Some(self.lab),
            FeeType::Hostel => Some(self.hostel),
            FeeType::Mess => Some(self.mess),
            FeeType::Other => Some(self.other),
            FeeType::Full => None,
        }
    }

    pub fn has_negative(&self) -> bool {
        [
            self.tuition,
            self.exam,
            self.library,
            self.lab,
            self.hostel,
            self.mess,
            self.other,
        ]
        .iter()
        .any(|v| *v < 0)
    }
}

/// Fee record for one semester: component breakdown plus running totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRecord {
    #[serde(default)]
    pub components: FeeComponents,
    pub total: i64,
    pub paid: i64,
    pub pending: i64,
    pub due_date: DateTime,
}

impl FeeRecord {
    /// New current-semester record. Without an explicit due date the fees
    /// fall due 30 days from `now`.
    pub fn new(
        components: FeeComponents,
        total_override: Option<i64>,
        due_date: Option<DateTime>,
        now: DateTime,
    ) -> Self {
        let mut record = FeeRecord {
            components,
            total: total_override.unwrap_or(0),
            paid: 0,
            pending: 0,
            due_date: due_date.unwrap_or_else(|| days_after(now, DEFAULT_DUE_DAYS)),
        };
        record.recompute();
        record
    }

    /// Re-derives `total` and `pending` after any mutation. A non-zero
    /// component breakdown is authoritative for `total`; otherwise the
    /// stored lump total stands. `pending` never goes negative.
    pub fn recompute(&mut self) {
        let component_total = self.components.component_total();
        if component_total > 0 {
            self.total = component_total;
        }
        self.pending = (self.total - self.paid).max(0);
    }

    /// Amount expected for a fee type: the component allocation, or the
    /// outstanding balance for `full`.
    pub fn allocation_for(&self, fee_type: FeeType) -> i64 {
        match self.components.amount_for(fee_type) {
            Some(amount) => amount,
            None => self.pending,
        }
    }

    pub fn is_fully_paid(&self) -> bool {
        self.total > 0 && self.paid >= self.total
    }

    /// Whether a fee type no longer accepts payments against this record.
    /// A component counts as settled once cumulative payments cover its
    /// allocation; a zero allocation is never settled.
    pub fn is_settled(&self, fee_type: FeeType) -> bool {
        match self.components.amount_for(fee_type) {
            Some(allocation) => allocation > 0 && self.paid >= allocation,
            None => self.paid >= self.total,
        }
    }

    pub fn status(&self) -> SemesterStatus {
        SemesterStatus::derive(self.paid, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemesterStatus {
    Pending,
    Partial,
    Completed,
}

impl SemesterStatus {
    pub fn derive(paid: i64, total: i64) -> Self {
        if total > 0 && paid >= total {
            SemesterStatus::Completed
        } else if paid > 0 && paid < total {
            SemesterStatus::Partial
        } else {
            SemesterStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SemesterStatus::Pending => "pending",
            SemesterStatus::Partial => "partial",
            SemesterStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SemesterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settlement trail entry recording one applied payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRef {
    pub payment_id: String,
    pub amount: i64,
    pub fee_type: FeeType,
    pub paid_at: DateTime,
    pub transaction_id: String,
}

/// Fee record for a semester other than the student's current one, kept
/// with its own settlement trail and derived status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterFeeRecord {
    pub semester: i32,
    pub academic_year: String,
    pub record: FeeRecord,
    pub status: SemesterStatus,
    #[serde(default)]
    pub settled_payments: Vec<PaymentRef>,
}

impl SemesterFeeRecord {
    /// Record created lazily when a payment settles against a semester with
    /// no stored fees. The payment amount becomes the semester total.
    pub fn backfilled(semester: i32, academic_year: &str, amount: i64, now: DateTime) -> Self {
        SemesterFeeRecord {
            semester,
            academic_year: academic_year.to_string(),
            record: FeeRecord {
                components: FeeComponents::default(),
                total: amount,
                paid: 0,
                pending: amount,
                due_date: days_after(now, BACKFILL_DUE_DAYS),
            },
            status: SemesterStatus::Pending,
            settled_payments: Vec::new(),
        }
    }
}

/// Field-wise fee structure update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct FeeStructureUpdate {
    pub components: Option<FeeComponents>,
    pub total: Option<i64>,
    pub due_date: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub roll_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub course: String,
    pub department: String,
    pub semester: i32,
    pub admission_year: i32,
    pub is_active: bool,
    /// Current-semester fees.
    pub fee_structure: FeeRecord,
    /// Records for other semesters, keyed by semester number. BSON maps key
    /// by string, hence the custom codec.
    #[serde(with = "semester_map", default)]
    pub semester_fees: BTreeMap<i32, SemesterFeeRecord>,
    /// Settlement trail for the current semester.
    #[serde(default)]
    pub settled_payments: Vec<PaymentRef>,
    /// Bumped on every persisted mutation; storage compare-and-swaps on it.
    #[serde(default)]
    pub version: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Fee record for a semester: the current structure, or a stored
    /// historical record.
    pub fn record_for(&self, semester: i32) -> Option<&FeeRecord> {
        if semester == self.semester {
            Some(&self.fee_structure)
        } else {
            self.semester_fees.get(&semester).map(|entry| &entry.record)
        }
    }

    pub fn is_settled(&self, fee_type: FeeType, semester: i32) -> bool {
        self.record_for(semester)
            .is_some_and(|record| record.is_settled(fee_type))
    }

    /// Settlement trail lookup for one payment id within a semester.
    pub fn has_applied(&self, payment_id: &str, semester: i32) -> bool {
        let trail = if semester == self.semester {
            &self.settled_payments
        } else {
            match self.semester_fees.get(&semester) {
                Some(entry) => &entry.settled_payments,
                None => return false,
            }
        };
        trail.iter().any(|p| p.payment_id == payment_id)
    }

    /// Applies a settled payment to the ledger. Returns `false` and leaves
    /// the ledger untouched when this payment id is already in the target
    /// semester's trail, so retried settlements cannot double count.
    pub fn apply_payment(
        &mut self,
        semester: i32,
        academic_year: &str,
        payment: &PaymentRef,
    ) -> bool {
        if self.has_applied(&payment.payment_id, semester) {
            return false;
        }
        if semester == self.semester {
            self.fee_structure.paid += payment.amount;
            self.fee_structure.recompute();
            self.settled_payments.push(payment.clone());
        } else {
            let entry = self.semester_fees.entry(semester).or_insert_with(|| {
                SemesterFeeRecord::backfilled(
                    semester,
                    academic_year,
                    payment.amount,
                    payment.paid_at,
                )
            });
            entry.record.paid += payment.amount;
            entry.record.recompute();
            entry.status = SemesterStatus::derive(entry.record.paid, entry.record.total);
            entry.settled_payments.push(payment.clone());
        }
        true
    }

    /// Administrative adjustment of the current-semester fee structure.
    /// Payments are never touched here; totals re-derive per the recompute
    /// rule.
    pub fn update_fee_structure(&mut self, update: &FeeStructureUpdate) {
        if let Some(components) = &update.components {
            self.fee_structure.components = components.clone();
        }
        if let Some(total) = update.total {
            self.fee_structure.total = total;
        }
        if let Some(due_date) = update.due_date {
            self.fee_structure.due_date = due_date;
        }
        self.fee_structure.recompute();
    }
}

/// BSON documents key maps by string; semesters are i32 keys in memory.
mod semester_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::SemesterFeeRecord;

    pub fn serialize<S>(
        map: &BTreeMap<i32, SemesterFeeRecord>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(semester, record)| (semester.to_string(), record)))
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<i32, SemesterFeeRecord>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, SemesterFeeRecord>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| {
                key.parse::<i32>()
                    .map(|semester| (semester, value))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(tuition: i64, exam: i64) -> FeeComponents {
        FeeComponents {
            tuition,
            exam,
            ..Default::default()
        }
    }

    fn test_student(components: FeeComponents, total_override: Option<i64>) -> Student {
        let now = DateTime::now();
        Student {
            id: Uuid::new_v4(),
            roll_number: "CS2021001".to_string(),
            first_name: "Asha".to_string(),
            last_name: "Verma".to_string(),
            email: "asha.verma@example.edu".to_string(),
            phone: "9876543210".to_string(),
            course: "B.Tech".to_string(),
            department: "Computer Science".to_string(),
            semester: 3,
            admission_year: 2021,
            is_active: true,
            fee_structure: FeeRecord::new(components, total_override, None, now),
            semester_fees: BTreeMap::new(),
            settled_payments: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn payment(id: &str, amount: i64, fee_type: FeeType) -> PaymentRef {
        PaymentRef {
            payment_id: id.to_string(),
            amount,
            fee_type,
            paid_at: DateTime::now(),
            transaction_id: format!("txn_{}", id),
        }
    }

    #[test]
    fn test_component_total_overrides_lump_total() {
        let record = FeeRecord::new(components(30000, 5000), Some(99999), None, DateTime::now());
        assert_eq!(record.total, 35000);
        assert_eq!(record.pending, 35000);
    }

    #[test]
    fn test_lump_total_kept_when_components_zero() {
        let record = FeeRecord::new(FeeComponents::default(), Some(50000), None, DateTime::now());
        assert_eq!(record.total, 50000);
        assert_eq!(record.pending, 50000);
    }

    #[test]
    fn test_pending_is_clamped_at_zero() {
        let mut record = FeeRecord::new(FeeComponents::default(), Some(1000), None, DateTime::now());
        record.paid = 1500;
        record.recompute();
        assert_eq!(record.pending, 0);
    }

    #[test]
    fn test_semester_status_derivation() {
        assert_eq!(SemesterStatus::derive(0, 0), SemesterStatus::Pending);
        assert_eq!(SemesterStatus::derive(0, 1000), SemesterStatus::Pending);
        assert_eq!(SemesterStatus::derive(400, 1000), SemesterStatus::Partial);
        assert_eq!(SemesterStatus::derive(1000, 1000), SemesterStatus::Completed);
        assert_eq!(SemesterStatus::derive(1200, 1000), SemesterStatus::Completed);
        // zero-total records never read as completed
        assert_eq!(SemesterStatus::derive(500, 0), SemesterStatus::Pending);
    }

    #[test]
    fn test_component_settlement_requires_nonzero_allocation() {
        let mut student = test_student(components(30000, 5000), None);
        assert!(!student.is_settled(FeeType::Tuition, 3));
        // library has no allocation, so it can never settle
        student.fee_structure.paid = 35000;
        student.fee_structure.recompute();
        assert!(student.is_settled(FeeType::Tuition, 3));
        assert!(!student.is_settled(FeeType::Library, 3));
    }

    #[test]
    fn test_full_settlement_tracks_total() {
        let mut student = test_student(FeeComponents::default(), Some(40000));
        assert!(!student.is_settled(FeeType::Full, 3));
        student.fee_structure.paid = 40000;
        student.fee_structure.recompute();
        assert!(student.is_settled(FeeType::Full, 3));
    }

    #[test]
    fn test_apply_payment_updates_current_semester() {
        let mut student = test_student(components(30000, 5000), None);
        let applied = student.apply_payment(3, "2024-2025", &payment("PAY_1", 30000, FeeType::Tuition));
        assert!(applied);
        assert_eq!(student.fee_structure.paid, 30000);
        assert_eq!(student.fee_structure.pending, 5000);
        assert_eq!(student.settled_payments.len(), 1);
        assert!(student.semester_fees.is_empty());
    }

    #[test]
    fn test_apply_payment_is_idempotent_per_payment_id() {
        let mut student = test_student(components(30000, 5000), None);
        let pay = payment("PAY_1", 30000, FeeType::Tuition);
        assert!(student.apply_payment(3, "2024-2025", &pay));
        assert!(!student.apply_payment(3, "2024-2025", &pay));
        assert_eq!(student.fee_structure.paid, 30000);
        assert_eq!(student.settled_payments.len(), 1);
    }

    #[test]
    fn test_apply_payment_backfills_missing_semester() {
        let mut student = test_student(components(30000, 5000), None);
        let applied = student.apply_payment(2, "2023-2024", &payment("PAY_2", 8000, FeeType::Exam));
        assert!(applied);
        // current semester untouched
        assert_eq!(student.fee_structure.paid, 0);
        let entry = student.semester_fees.get(&2).unwrap();
        assert_eq!(entry.academic_year, "2023-2024");
        assert_eq!(entry.record.total, 8000);
        assert_eq!(entry.record.paid, 8000);
        assert_eq!(entry.record.pending, 0);
        assert_eq!(entry.status, SemesterStatus::Completed);
        assert_eq!(entry.settled_payments.len(), 1);
    }

    #[test]
    fn test_apply_payment_partial_on_existing_semester_record() {
        let mut student = test_student(components(30000, 5000), None);
        student.semester_fees.insert(
            1,
            SemesterFeeRecord {
                semester: 1,
                academic_year: "2021-2022".to_string(),
                record: FeeRecord::new(FeeComponents::default(), Some(20000), None, DateTime::now()),
                status: SemesterStatus::Pending,
                settled_payments: Vec::new(),
            },
        );
        assert!(student.apply_payment(1, "2021-2022", &payment("PAY_3", 5000, FeeType::Other)));
        let entry = student.semester_fees.get(&1).unwrap();
        assert_eq!(entry.record.paid, 5000);
        assert_eq!(entry.record.pending, 15000);
        assert_eq!(entry.status, SemesterStatus::Partial);
    }

    #[test]
    fn test_trail_lookup_is_scoped_per_semester() {
        let mut student = test_student(components(30000, 5000), None);
        assert!(student.apply_payment(3, "2024-2025", &payment("PAY_4", 1000, FeeType::Exam)));
        assert!(student.has_applied("PAY_4", 3));
        assert!(!student.has_applied("PAY_4", 2));
    }

    #[test]
    fn test_update_fee_structure_preserves_paid() {
        let mut student = test_student(components(30000, 5000), None);
        student.fee_structure.paid = 10000;
        student.fee_structure.recompute();
        student.update_fee_structure(&FeeStructureUpdate {
            components: Some(components(40000, 5000)),
            total: None,
            due_date: None,
        });
        assert_eq!(student.fee_structure.total, 45000);
        assert_eq!(student.fee_structure.paid, 10000);
        assert_eq!(student.fee_structure.pending, 35000);
    }

    #[test]
    fn test_semester_map_round_trips_through_string_keys() {
        let mut student = test_student(components(30000, 5000), None);
        student.apply_payment(1, "2021-2022", &payment("PAY_5", 2000, FeeType::Other));
        let json = serde_json::to_value(&student).unwrap();
        assert!(json["semester_fees"]["1"].is_object());
        let back: Student = serde_json::from_value(json).unwrap();
        assert_eq!(back.semester_fees.get(&1).unwrap().record.paid, 2000);
    }
}
