//! HTTP handlers for genvideo-service.

pub mod auth;
pub mod generate;
pub mod health;
pub mod password;
pub mod payments;
pub mod subscription;
pub mod videos;

pub use auth::*;
pub use generate::*;
pub use health::*;
pub use password::*;
pub use payments::*;
pub use subscription::*;
pub use videos::*;
