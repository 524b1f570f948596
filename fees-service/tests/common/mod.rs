//! Shared harness for fees-service integration tests.
//!
//! Spawns the real router over in-memory stores, with the Razorpay Orders
//! API stubbed by wiremock so order registration and signature verification
//! run the production code paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::http::StatusCode;
use fees_service::config::{Config, DatabaseConfig, RazorpayConfig, ServerConfig, UpiConfig};
use fees_service::services::memory::{InMemoryIntentStore, InMemoryStudentStore};
use fees_service::services::{IntentStore, RazorpayClient};
use fees_service::{AppState, app_router};
use hmac::{Hmac, Mac};
use secrecy::Secret;
use serde_json::{Value, json};
use sha2::Sha256;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const TEST_KEY_SECRET: &str = "test_key_secret";

/// Hands out Razorpay-shaped orders with sequential ids, echoing back the
/// requested amount.
struct SequentialOrders {
    counter: AtomicU64,
}

impl Respond for SequentialOrders {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let amount = serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| body["amount"].as_u64())
            .unwrap_or(0);
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_json(json!({
            "id": format!("order_it_{}", n),
            "amount": amount,
            "currency": "INR",
            "status": "created",
        }))
    }
}

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub students: Arc<InMemoryStudentStore>,
    pub intents: Arc<InMemoryIntentStore>,
    pub razorpay_server: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let razorpay_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(SequentialOrders {
                counter: AtomicU64::new(0),
            })
            .mount(&razorpay_server)
            .await;

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                // In-memory stores are injected below; nothing connects here.
                url: Secret::new("mongodb://localhost:27017".to_string()),
                db_name: "fees_test_unused".to_string(),
            },
            razorpay: RazorpayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: Secret::new(TEST_KEY_SECRET.to_string()),
                api_base_url: razorpay_server.uri(),
            },
            upi: UpiConfig {
                vpa: "test@upi".to_string(),
                merchant_name: "Test Merchant".to_string(),
            },
            service_name: "fees-service-test".to_string(),
            log_json: false,
        };

        let students = Arc::new(InMemoryStudentStore::new());
        let intents = Arc::new(InMemoryIntentStore::new());
        let gateway = Arc::new(RazorpayClient::new(config.razorpay.clone()));

        let state = AppState::new(config, students.clone(), intents.clone(), gateway);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener
            .local_addr()
            .expect("Failed to read local address")
            .port();
        let address = format!("http://127.0.0.1:{}", port);

        let router = app_router(state);
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        TestApp {
            address,
            api_client: reqwest::Client::new(),
            students,
            intents,
            razorpay_server,
        }
    }

    /// Swap the order stub for one that refuses every request.
    pub async fn break_gateway(&self) {
        self.razorpay_server.reset().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {
                    "code": "SERVER_ERROR",
                    "description": "order registration refused",
                }
            })))
            .mount(&self.razorpay_server)
            .await;
    }

    /// Registers a student with a 30000 tuition + 5000 exam structure in
    /// semester 3 and returns the assigned id.
    pub async fn seed_student(&self, roll_number: &str, email: &str) -> Uuid {
        let response = self
            .api_client
            .post(format!("{}/students", self.address))
            .json(&sample_student(roll_number, email))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(StatusCode::CREATED, response.status());
        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["id"]
            .as_str()
            .expect("Missing student id")
            .parse()
            .expect("Invalid student id")
    }

    /// Creates a payment intent, asserting 201, and returns the response body.
    pub async fn create_intent(&self, student_id: Uuid, amount: i64, fee_type: &str) -> Value {
        let response = self
            .api_client
            .post(format!("{}/payments/intents", self.address))
            .json(&json!({
                "student_id": student_id,
                "amount": amount,
                "fee_type": fee_type,
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(StatusCode::CREATED, response.status());
        response.json().await.expect("Failed to parse JSON")
    }

    /// Looks up the gateway order id recorded on an intent.
    pub async fn order_id_of(&self, intent_id: &str) -> String {
        let intent = self
            .intents
            .get(intent_id)
            .await
            .expect("Store read failed")
            .expect("Intent not found");
        intent.razorpay_order_id.expect("Intent has no order id")
    }

    /// Confirms a payment through the verify endpoint with a valid signature.
    pub async fn settle(&self, order_id: &str, payment_id: &str) -> reqwest::Response {
        self.api_client
            .post(format!("{}/payments/verify", self.address))
            .json(&json!({
                "razorpay_order_id": order_id,
                "razorpay_payment_id": payment_id,
                "razorpay_signature": sign(order_id, payment_id),
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Fetches the ledger view for a student.
    pub async fn fees_of(&self, student_id: Uuid) -> Value {
        let response = self
            .api_client
            .get(format!("{}/students/{}/fees", self.address, student_id))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(StatusCode::OK, response.status());
        response.json().await.expect("Failed to parse JSON")
    }
}

/// Valid student registration payload.
pub fn sample_student(roll_number: &str, email: &str) -> Value {
    json!({
        "roll_number": roll_number,
        "first_name": "Asha",
        "last_name": "Nair",
        "email": email,
        "phone": "9876543210",
        "course": "B.Tech",
        "department": "Computer Science",
        "semester": 3,
        "admission_year": 2024,
        "fee_structure": { "tuition": 30000, "exam": 5000 },
    })
}

/// Computes the settlement signature the gateway would attach for an
/// order/payment pair.
pub fn sign(order_id: &str, payment_id: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(TEST_KEY_SECRET.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
