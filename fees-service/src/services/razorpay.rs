//! Razorpay payment provider client.
//!
//! Implements Razorpay's Orders API for order registration and HMAC-SHA256
//! signature verification for settlement confirmation.

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::RazorpayConfig;
use crate::services::gateway::{GatewayOrder, PaymentGateway};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Razorpay API client.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

/// Order creation request body.
#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    /// Amount in the smallest currency unit (paise for INR).
    amount: u64,
    currency: String,
    /// Caller-side reference; we pass the intent id.
    receipt: String,
    notes: serde_json::Value,
}

/// The subset of Razorpay's order entity we act on.
#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: u64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayApiError {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    code: String,
    description: String,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Check if Razorpay is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    /// Compute HMAC-SHA256 over `payload` with the key secret, hex encoded.
    fn compute_signature(&self, payload: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac =
            HmacSha256::new_from_slice(self.config.key_secret.expose_secret().as_bytes())
                .map_err(|_| anyhow!("Invalid key length"))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(
        &self,
        amount_paise: u64,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
    ) -> Result<GatewayOrder, AppError> {
        if !self.is_configured() {
            return Err(AppError::Gateway(
                "Razorpay credentials not configured".to_string(),
            ));
        }

        let request = CreateOrderRequest {
            amount: amount_paise,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
            notes,
        };

        let url = format!("{}/orders", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Gateway("Razorpay order creation timed out".to_string())
                } else {
                    AppError::Gateway(format!("Razorpay request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Gateway(format!("Razorpay response unreadable: {}", e)))?;

        tracing::debug!(status = %status, body = %body, "Razorpay create_order response");

        if status.is_success() {
            let order: RazorpayOrder = serde_json::from_str(&body).map_err(|e| {
                AppError::Gateway(format!("Razorpay returned an unexpected body: {}", e))
            })?;
            tracing::info!(
                order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                "Razorpay order created"
            );
            Ok(GatewayOrder {
                id: order.id,
                amount: order.amount,
                currency: order.currency,
                status: order.status,
            })
        } else {
            let error: RazorpayApiError =
                serde_json::from_str(&body).unwrap_or_else(|_| RazorpayApiError {
                    error: RazorpayErrorDetail {
                        code: "UNKNOWN".to_string(),
                        description: body.clone(),
                    },
                });
            tracing::error!(
                code = %error.error.code,
                description = %error.error.description,
                "Razorpay order creation failed"
            );
            Err(AppError::Gateway(format!(
                "{} - {}",
                error.error.code, error.error.description
            )))
        }
    }

    /// The signature is computed as
    /// `HMAC-SHA256(order_id + "|" + payment_id, key_secret)` and compared
    /// in constant time.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let payload = format!("{}|{}", order_id, payment_id);
        let expected = match self.compute_signature(&payload) {
            Ok(expected) => expected,
            Err(_) => return false,
        };

        let is_valid = constant_time_eq(&expected, signature);

        if is_valid {
            tracing::info!(
                order_id = %order_id,
                payment_id = %payment_id,
                "Payment signature verified successfully"
            );
        } else {
            tracing::warn!(
                order_id = %order_id,
                payment_id = %payment_id,
                "Payment signature verification failed"
            );
        }

        is_valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn test_config() -> RazorpayConfig {
        RazorpayConfig {
            key_id: "rzp_test_123".to_string(),
            key_secret: Secret::new("my_secret_key".to_string()),
            api_base_url: "https://api.razorpay.com/v1".to_string(),
        }
    }

    #[test]
    fn test_is_configured() {
        let client = RazorpayClient::new(test_config());
        assert!(client.is_configured());

        let empty_config = RazorpayConfig {
            key_id: "".to_string(),
            key_secret: Secret::new("".to_string()),
            api_base_url: "".to_string(),
        };
        let client = RazorpayClient::new(empty_config);
        assert!(!client.is_configured());
    }

    #[test]
    fn test_signature_round_trip() {
        let client = RazorpayClient::new(test_config());
        let expected = client.compute_signature("order_123|pay_456").unwrap();
        assert!(client.verify_signature("order_123", "pay_456", &expected));
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let client = RazorpayClient::new(test_config());
        assert!(!client.verify_signature("order_123", "pay_456", "invalid_signature"));
    }

    #[test]
    fn test_signature_is_bound_to_payment_pair() {
        let client = RazorpayClient::new(test_config());
        let signature = client.compute_signature("order_123|pay_456").unwrap();
        assert!(!client.verify_signature("order_123", "pay_999", &signature));
        assert!(!client.verify_signature("order_999", "pay_456", &signature));
    }

    #[test]
    fn test_constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(!constant_time_eq("abc", "abd"));
    }
}
