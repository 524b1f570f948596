//! Application wiring: state, router, and server lifecycle.

use std::sync::Arc;

use axum::http::{header, Method};
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers;
use crate::services::{
    FeeRepository, IntentManager, IntentStore, PaymentGateway, RazorpayClient, SettlementEngine,
    StudentStore, UpiService,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub students: Arc<dyn StudentStore>,
    pub intents: Arc<dyn IntentStore>,
    pub intent_manager: IntentManager,
    pub settlement: SettlementEngine,
}

impl AppState {
    /// Wires the intent manager and settlement engine over a pair of stores
    /// and a gateway. Tests inject in-memory stores here.
    pub fn new(
        config: Config,
        students: Arc<dyn StudentStore>,
        intents: Arc<dyn IntentStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let upi = UpiService::new(config.upi.clone());
        let intent_manager =
            IntentManager::new(students.clone(), intents.clone(), gateway.clone(), upi);
        let settlement = SettlementEngine::new(students.clone(), intents.clone(), gateway);
        Self {
            config,
            students,
            intents,
            intent_manager,
            settlement,
        }
    }
}

/// Full HTTP surface.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Ledger endpoints
        .route("/students", post(handlers::students::create_student))
        .route(
            "/students/:id/fees",
            get(handlers::students::get_student_fees).put(handlers::students::update_student_fees),
        )
        // Intent endpoints
        .route("/payments/intents", post(handlers::intents::create_intent))
        .route("/payments/intents/:id", get(handlers::intents::get_intent))
        .route("/payments", get(handlers::intents::list_intents))
        // Settlement endpoints
        .route(
            "/payments/verify",
            post(handlers::settlements::verify_payment),
        )
        .route(
            "/payments/verify-manual",
            post(handlers::settlements::verify_manual),
        )
        .route(
            "/payments/:id/receipt",
            get(handlers::settlements::get_receipt),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

pub struct Application {
    host: String,
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let repository = FeeRepository::new(&db);
        repository.init_indexes().await?;

        let razorpay = RazorpayClient::new(config.razorpay.clone());
        if razorpay.is_configured() {
            tracing::info!("Razorpay client initialized");
        } else {
            tracing::warn!("Razorpay credentials not configured - gateway orders will fail");
        }

        let repository = Arc::new(repository);
        let state = AppState::new(
            config.clone(),
            repository.clone(),
            repository,
            Arc::new(razorpay),
        );

        Ok(Self {
            host: config.server.host.clone(),
            port: config.server.port,
            router: app_router(state),
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
