//! Payment gateway seam.

use async_trait::async_trait;
use service_core::error::AppError;

/// Order registered with the payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    pub status: String,
}

/// External payment rails: order registration at intent creation and
/// signature verification at settlement.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers an order for `amount_paise`. A failure here must leave no
    /// local state behind; callers persist intents only after it returns.
    async fn create_order(
        &self,
        amount_paise: u64,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
    ) -> Result<GatewayOrder, AppError>;

    /// Checks the gateway's settlement signature for an order/payment pair.
    /// Never mutates anything.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}
