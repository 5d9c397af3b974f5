pub mod cashfree;
pub mod database;
pub mod email;
pub mod error;
pub mod jwt;
pub mod library;
pub mod memory;
pub mod metrics;
pub mod repository;

pub use cashfree::{CashfreeClient, GatewayError};
pub use database::Database;
pub use email::{EmailProvider, EmailService, MockEmailService, SentEmail};
pub use error::ServiceError;
pub use jwt::{Claims, JwtService, TokenError, TokenPurpose};
pub use library::VideoLibrary;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use repository::{PaymentRepository, UserRepository, VideoRepository};
