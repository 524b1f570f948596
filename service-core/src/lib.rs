//! service-core: Shared infrastructure for the fees platform services.
pub mod error;
pub mod observability;
