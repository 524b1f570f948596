pub mod gateway;
pub mod intents;
pub mod memory;
pub mod metrics;
pub mod razorpay;
pub mod repository;
pub mod settlement;
pub mod store;
pub mod upi;

pub use gateway::{GatewayOrder, PaymentGateway};
pub use intents::{CreateIntent, CreatedIntent, IntentManager};
pub use razorpay::RazorpayClient;
pub use repository::FeeRepository;
pub use settlement::{LedgerSnapshot, SettlementEngine, SettlementOutcome};
pub use store::{IntentFilter, IntentStore, StudentStore};
pub use upi::UpiService;
