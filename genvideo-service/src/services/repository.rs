//! Storage seams. `Database` backs them with PostgreSQL; `InMemoryStore` backs them in tests.

use crate::models::{
    CompletionOutcome, NewPaymentOrder, NewUser, NewVideo, OrderCompletion, Payment,
    PaymentOrder, User, Video,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `AppError::Conflict` when the email is taken.
    async fn create_user(&self, new_user: &NewUser) -> Result<User, AppError>;

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn set_auth_key(&self, user_id: i64, auth_key: Option<&str>) -> Result<(), AppError>;

    async fn set_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Store the new hash and clear the reset token and the session.
    async fn complete_password_reset(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), AppError>;

    /// Returns false when no such user exists.
    async fn update_subscription(
        &self,
        user_id: i64,
        subscription: &str,
        expiry: NaiveDate,
    ) -> Result<bool, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn count_videos(&self, user_id: i64) -> Result<i64, AppError>;

    /// Newest first, with the total count for pagination.
    async fn list_videos(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Video>, i64), AppError>;

    async fn find_video(&self, user_id: i64, filename: &str) -> Result<Option<Video>, AppError>;

    /// Insert only while the owner holds fewer than `max_videos`; `None` means the cap was hit.
    async fn insert_video_within_limit(
        &self,
        new_video: &NewVideo,
        max_videos: i64,
    ) -> Result<Option<Video>, AppError>;

    async fn delete_video(&self, user_id: i64, filename: &str) -> Result<bool, AppError>;

    async fn delete_all_videos(&self, user_id: i64) -> Result<u64, AppError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_order(&self, order: &NewPaymentOrder) -> Result<PaymentOrder, AppError>;

    async fn find_order(&self, order_id: &str) -> Result<Option<PaymentOrder>, AppError>;

    async fn latest_order_for_user(&self, user_id: i64)
        -> Result<Option<PaymentOrder>, AppError>;

    /// Atomically credit the subscription, append the ledger row and mark the order
    /// COMPLETED. A second call for the same order is a no-op.
    async fn complete_order(
        &self,
        completion: &OrderCompletion,
    ) -> Result<CompletionOutcome, AppError>;

    async fn find_payment(&self, order_id: &str) -> Result<Option<Payment>, AppError>;
}
