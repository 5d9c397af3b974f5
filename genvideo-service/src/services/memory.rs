//! Process-local storage used by tests and local runs without PostgreSQL.
//! Mirrors the constraints of the SQL schema: unique emails and filenames,
//! the per-user video cap and at-most-once order completion.

use crate::models::{
    subscription_expiry_for, CompletionOutcome, NewPaymentOrder, NewUser, NewVideo,
    OrderCompletion, OrderStatus, Payment, PaymentOrder, User, Video,
};
use crate::services::repository::{PaymentRepository, UserRepository, VideoRepository};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    next_user_id: i64,
    next_video_id: i64,
    next_payment_id: i64,
    users: HashMap<i64, User>,
    videos: Vec<Video>,
    orders: HashMap<String, PaymentOrder>,
    payments: Vec<Payment>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("In-memory store poisoned")))
    }

    /// Number of ledger rows, across all orders.
    pub fn payment_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.payments.len()).unwrap_or(0)
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, AppError> {
        let mut inner = self.lock()?;
        if inner.users.values().any(|u| u.email == new_user.email) {
            return Err(AppError::Conflict(anyhow::anyhow!("User already exists")));
        }

        inner.next_user_id += 1;
        let user = User {
            id: inner.next_user_id,
            email: new_user.email.clone(),
            password: new_user.password_hash.clone(),
            name: new_user.name.clone(),
            subscription: new_user.subscription.clone(),
            subscription_expiry: Some(new_user.subscription_expiry),
            auth_key: None,
            reset_token: None,
            reset_token_expiry: None,
            created_at: Utc::now(),
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn set_auth_key(&self, user_id: i64, auth_key: Option<&str>) -> Result<(), AppError> {
        if let Some(user) = self.lock()?.users.get_mut(&user_id) {
            user.auth_key = auth_key.map(str::to_string);
        }
        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(user) = self.lock()?.users.get_mut(&user_id) {
            user.reset_token = Some(token.to_string());
            user.reset_token_expiry = Some(expires_at);
        }
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), AppError> {
        if let Some(user) = self.lock()?.users.get_mut(&user_id) {
            user.password = password_hash.to_string();
            user.reset_token = None;
            user.reset_token_expiry = None;
            user.auth_key = None;
        }
        Ok(())
    }

    async fn update_subscription(
        &self,
        user_id: i64,
        subscription: &str,
        expiry: NaiveDate,
    ) -> Result<bool, AppError> {
        match self.lock()?.users.get_mut(&user_id) {
            Some(user) => {
                user.subscription = subscription.to_string();
                user.subscription_expiry = Some(expiry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }
}

#[async_trait]
impl VideoRepository for InMemoryStore {
    async fn count_videos(&self, user_id: i64) -> Result<i64, AppError> {
        Ok(self
            .lock()?
            .videos
            .iter()
            .filter(|v| v.user_id == user_id)
            .count() as i64)
    }

    async fn list_videos(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Video>, i64), AppError> {
        let inner = self.lock()?;
        let mut owned: Vec<Video> = inner
            .videos
            .iter()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = owned.len() as i64;
        let page = owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn find_video(&self, user_id: i64, filename: &str) -> Result<Option<Video>, AppError> {
        Ok(self
            .lock()?
            .videos
            .iter()
            .find(|v| v.user_id == user_id && v.filename == filename)
            .cloned())
    }

    async fn insert_video_within_limit(
        &self,
        new_video: &NewVideo,
        max_videos: i64,
    ) -> Result<Option<Video>, AppError> {
        let mut inner = self.lock()?;
        if inner.videos.iter().any(|v| v.filename == new_video.filename) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Video {} already exists",
                new_video.filename
            )));
        }

        let owned = inner
            .videos
            .iter()
            .filter(|v| v.user_id == new_video.user_id)
            .count() as i64;
        if owned >= max_videos {
            return Ok(None);
        }

        inner.next_video_id += 1;
        let video = Video {
            id: inner.next_video_id,
            user_id: new_video.user_id,
            filename: new_video.filename.clone(),
            duration: new_video.duration,
            created_at: Utc::now(),
        };
        inner.videos.push(video.clone());
        Ok(Some(video))
    }

    async fn delete_video(&self, user_id: i64, filename: &str) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        let before = inner.videos.len();
        inner
            .videos
            .retain(|v| !(v.user_id == user_id && v.filename == filename));
        Ok(inner.videos.len() < before)
    }

    async fn delete_all_videos(&self, user_id: i64) -> Result<u64, AppError> {
        let mut inner = self.lock()?;
        let before = inner.videos.len();
        inner.videos.retain(|v| v.user_id != user_id);
        Ok((before - inner.videos.len()) as u64)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn create_order(&self, order: &NewPaymentOrder) -> Result<PaymentOrder, AppError> {
        let mut inner = self.lock()?;
        if inner.orders.contains_key(&order.order_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Order {} already exists",
                order.order_id
            )));
        }

        let stored = PaymentOrder {
            order_id: order.order_id.clone(),
            cf_order_id: Some(order.cf_order_id.clone()),
            user_id: order.user_id,
            amount: order.amount,
            currency: order.currency.clone(),
            subscription_type: order.subscription_type.clone(),
            duration_days: order.duration_days,
            status: OrderStatus::Initiated.as_str().to_string(),
            payment_response: Some(order.gateway_response.clone()),
            created_at: Utc::now(),
            updated_at: None,
        };
        inner.orders.insert(stored.order_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<PaymentOrder>, AppError> {
        Ok(self.lock()?.orders.get(order_id).cloned())
    }

    async fn latest_order_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<PaymentOrder>, AppError> {
        Ok(self
            .lock()?
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn complete_order(
        &self,
        completion: &OrderCompletion,
    ) -> Result<CompletionOutcome, AppError> {
        // The whole completion runs under one lock, like the row lock in SQL
        let mut inner = self.lock()?;

        let order = inner
            .orders
            .get(&completion.order_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

        if order.is_completed() {
            return Ok(CompletionOutcome::AlreadyCompleted);
        }

        let expiry = subscription_expiry_for(completion.completed_on, order.duration_days)?;
        let user = inner
            .users
            .get_mut(&order.user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        user.subscription = order.subscription_type.clone();
        user.subscription_expiry = Some(expiry);

        inner.next_payment_id += 1;
        let payment = Payment {
            id: inner.next_payment_id,
            order_id: order.order_id.clone(),
            user_id: order.user_id,
            amount: order.amount,
            payment_status: completion.payment_status.clone(),
            payment_method: completion.payment_method.clone(),
            transaction_id: completion.transaction_id.clone(),
            payment_date: Utc::now(),
        };
        inner.payments.push(payment);

        if let Some(stored) = inner.orders.get_mut(&order.order_id) {
            stored.status = OrderStatus::Completed.as_str().to_string();
            stored.updated_at = Some(Utc::now());
            stored.payment_response = Some(completion.gateway_response.clone());
        }

        Ok(CompletionOutcome::Completed {
            user_id: order.user_id,
            subscription: order.subscription_type,
            subscription_expiry: expiry,
        })
    }

    async fn find_payment(&self, order_id: &str) -> Result<Option<Payment>, AppError> {
        Ok(self
            .lock()?
            .payments
            .iter()
            .find(|p| p.order_id == order_id)
            .cloned())
    }
}
