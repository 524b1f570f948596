use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub upi: UpiConfig,
    pub service_name: String,
    pub log_json: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct UpiConfig {
    pub vpa: String,
    pub merchant_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("FEES_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("FEES_SERVICE_PORT")
            .unwrap_or_else(|_| "3004".to_string())
            .parse()?;

        let db_url = env::var("FEES_DATABASE_URL").expect("FEES_DATABASE_URL must be set");
        let db_name = env::var("FEES_DATABASE_NAME").unwrap_or_else(|_| "fees_db".to_string());

        let razorpay_key_id = env::var("RAZORPAY_KEY_ID").unwrap_or_default();
        let razorpay_key_secret = env::var("RAZORPAY_KEY_SECRET").unwrap_or_default();
        let razorpay_api_base_url = env::var("RAZORPAY_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string());

        let upi_vpa = env::var("UPI_VPA").unwrap_or_else(|_| "studentportal@upi".to_string());
        let upi_merchant_name =
            env::var("UPI_MERCHANT_NAME").unwrap_or_else(|_| "Student Portal".to_string());

        let log_json = env::var("FEES_LOG_JSON")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            razorpay: RazorpayConfig {
                key_id: razorpay_key_id,
                key_secret: Secret::new(razorpay_key_secret),
                api_base_url: razorpay_api_base_url,
            },
            upi: UpiConfig {
                vpa: upi_vpa,
                merchant_name: upi_merchant_name,
            },
            service_name: "fees-service".to_string(),
            log_json,
        })
    }
}
