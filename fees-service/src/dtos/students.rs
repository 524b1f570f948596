use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    FeeComponents, FeeRecord, PaymentRef, SemesterFeeRecord, SemesterStatus, Student,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, message = "Roll number is required"))]
    pub roll_number: String,

    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,

    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 10, max = 15, message = "Phone must be 10 to 15 digits"))]
    pub phone: String,

    #[validate(length(min = 1, message = "Course is required"))]
    pub course: String,

    #[validate(length(min = 1, message = "Department is required"))]
    pub department: String,

    #[validate(range(min = 1, max = 8, message = "Semester must be between 1 and 8"))]
    pub semester: i32,

    #[validate(range(min = 2000, max = 2100, message = "Admission year is out of range"))]
    pub admission_year: i32,

    /// Component breakdown; all omitted components default to zero.
    #[serde(default)]
    pub fee_structure: FeeComponents,

    /// Lump total for institutions that do not itemize components.
    #[validate(range(min = 0, message = "Total fee cannot be negative"))]
    pub total_fee: Option<i64>,

    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFeesRequest {
    pub fee_structure: Option<FeeComponents>,

    #[validate(range(min = 0, message = "Total fee cannot be negative"))]
    pub total_fee: Option<i64>,

    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StudentResponse {
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
    pub created_at: String,
}

impl From<Student> for StudentResponse {
    fn from(s: Student) -> Self {
        Self {
            id: s.id,
            roll_number: s.roll_number,
            first_name: s.first_name,
            last_name: s.last_name,
            email: s.email,
            phone: s.phone,
            course: s.course,
            department: s.department,
            semester: s.semester,
            admission_year: s.admission_year,
            is_active: s.is_active,
            created_at: s.created_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeeRecordView {
    pub components: FeeComponents,
    pub total: i64,
    pub paid: i64,
    pub pending: i64,
    pub due_date: String,
    pub status: SemesterStatus,
}

impl From<&FeeRecord> for FeeRecordView {
    fn from(record: &FeeRecord) -> Self {
        Self {
            components: record.components.clone(),
            total: record.total,
            paid: record.paid,
            pending: record.pending,
            due_date: record.due_date.to_string(),
            status: record.status(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentRefView {
    pub payment_id: String,
    pub amount: i64,
    pub fee_type: crate::models::FeeType,
    pub paid_at: String,
    pub transaction_id: String,
}

impl From<&PaymentRef> for PaymentRefView {
    fn from(p: &PaymentRef) -> Self {
        Self {
            payment_id: p.payment_id.clone(),
            amount: p.amount,
            fee_type: p.fee_type,
            paid_at: p.paid_at.to_string(),
            transaction_id: p.transaction_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SemesterFeeView {
    pub semester: i32,
    pub academic_year: String,
    #[serde(flatten)]
    pub record: FeeRecordView,
    pub settled_payments: Vec<PaymentRefView>,
}

impl From<&SemesterFeeRecord> for SemesterFeeView {
    fn from(s: &SemesterFeeRecord) -> Self {
        Self {
            semester: s.semester,
            academic_year: s.academic_year.clone(),
            record: FeeRecordView::from(&s.record),
            settled_payments: s.settled_payments.iter().map(PaymentRefView::from).collect(),
        }
    }
}

/// Ledger view: the current semester's record plus the keyed history,
/// oldest semester first.
#[derive(Debug, Serialize)]
pub struct StudentFeesResponse {
    pub student_id: Uuid,
    pub roll_number: String,
    pub semester: i32,
    pub current: FeeRecordView,
    pub current_settled_payments: Vec<PaymentRefView>,
    pub semesters: Vec<SemesterFeeView>,
}

impl From<&Student> for StudentFeesResponse {
    fn from(student: &Student) -> Self {
        Self {
            student_id: student.id,
            roll_number: student.roll_number.clone(),
            semester: student.semester,
            current: FeeRecordView::from(&student.fee_structure),
            current_settled_payments: student
                .settled_payments
                .iter()
                .map(PaymentRefView::from)
                .collect(),
            semesters: student.semester_fees.values().map(SemesterFeeView::from).collect(),
        }
    }
}
