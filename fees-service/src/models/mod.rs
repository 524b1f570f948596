//! Domain models for fees-service.

mod payment;
mod student;

pub use payment::{
    FeeType, INTENT_TTL_MILLIS, IntentStatus, PaymentCode, PaymentIntent, Receipt,
};
pub use student::{
    FeeComponents, FeeRecord, FeeStructureUpdate, PaymentRef, SemesterFeeRecord, SemesterStatus,
    Student,
};
