//! service-core: Shared HTTP infrastructure for the genvideo backend.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
