//! Payment intent and receipt models.

use mongodb::bson::DateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Intents stay payable for 24 hours after creation.
pub const INTENT_TTL_MILLIS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeType {
    Tuition,
    Exam,
    Library,
    Lab,
    Hostel,
    Mess,
    Other,
    Full,
}

impl FeeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeType::Tuition => "tuition",
            FeeType::Exam => "exam",
            FeeType::Library => "library",
            FeeType::Lab => "lab",
            FeeType::Hostel => "hostel",
            FeeType::Mess => "mess",
            FeeType::Other => "other",
            FeeType::Full => "full",
        }
    }
}

impl std::fmt::Display for FeeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Only `pending -> completed` and `pending -> expired/failed` transitions
/// are legal; `completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Completed,
    Expired,
    Failed,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Completed => "completed",
            IntentStatus::Expired => "expired",
            IntentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// UPI rail for an intent: deep link plus inline QR image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCode {
    pub upi_link: String,
    pub qr_image_base64: String,
}

/// Receipt issued exactly once when an intent settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub number: String,
    pub issued_at: DateTime,
}

impl Receipt {
    /// `RCP<epoch-millis><0..=999>`. Uniqueness comes from storage, not the
    /// format; callers regenerate on collision.
    pub fn generate(now: DateTime) -> Self {
        let suffix = rand::thread_rng().gen_range(0..1000);
        Receipt {
            number: format!("RCP{}{}", now.timestamp_millis(), suffix),
            issued_at: now,
        }
    }
}

/// A payment obligation handed to a payer. Never deleted; expiry is
/// classified at read time against `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_id: Uuid,
    pub amount: i64,
    pub fee_type: FeeType,
    pub semester: i32,
    pub academic_year: String,
    pub description: String,
    pub status: IntentStatus,
    // absent (not null) when unset, so the sparse unique indexes skip them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub razorpay_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub razorpay_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub razorpay_signature: Option<String>,
    pub payment_code: PaymentCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime,
    pub expires_at: DateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime>,
}

impl PaymentIntent {
    /// `PAY_<epoch-millis>_<9 uppercase base36 chars>`.
    pub fn generate_id(now: DateTime) -> String {
        const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..9)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("PAY_{}_{}", now.timestamp_millis(), suffix)
    }

    /// Status as observed at `now`: a stored-pending intent past its
    /// deadline reads as expired even before storage catches up.
    pub fn effective_status(&self, now: DateTime) -> IntentStatus {
        if self.status == IntentStatus::Pending && self.expires_at < now {
            IntentStatus::Expired
        } else {
            self.status
        }
    }

    /// Live means still payable: effectively pending at `now`.
    pub fn is_live(&self, now: DateTime) -> bool {
        self.effective_status(now) == IntentStatus::Pending
    }
}
