//! PostgreSQL implementation of the repository traits.

use crate::models::{
    subscription_expiry_for, CompletionOutcome, NewPaymentOrder, NewUser, NewVideo,
    OrderCompletion, OrderStatus, Payment, PaymentOrder, User, Video,
};
use crate::services::repository::{PaymentRepository, UserRepository, VideoRepository};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

const USER_COLUMNS: &str = "id, email, password, name, subscription, subscription_expiry, \
                            auth_key, reset_token, reset_token_expiry, created_at";
const VIDEO_COLUMNS: &str = "id, user_id, filename, duration, created_at";
const ORDER_COLUMNS: &str = "order_id, cf_order_id, user_id, amount, currency, subscription_type, \
                             duration_days, status, payment_response, created_at, updated_at";

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "genvideo-service"))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        info!(max_connections = max_connections, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl UserRepository for Database {
    #[instrument(skip(self, new_user), fields(email = %new_user.email))]
    async fn create_user(&self, new_user: &NewUser) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password, name, subscription, subscription_expiry)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.name)
        .bind(&new_user.subscription)
        .bind(new_user.subscription_expiry)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("User already exists"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create user: {}", e)),
        })?;

        info!(user_id = user.id, "User created");
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load user"))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load user"))
    }

    async fn set_auth_key(&self, user_id: i64, auth_key: Option<&str>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET auth_key = $1 WHERE id = $2")
            .bind(auth_key)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to update session"))?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET reset_token = $1, reset_token_expiry = $2 WHERE id = $3")
            .bind(token)
            .bind(expires_at)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to store reset token"))?;
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password = $1, reset_token = NULL, reset_token_expiry = NULL, auth_key = NULL
            WHERE id = $2
            "#,
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to reset password"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_subscription(
        &self,
        user_id: i64,
        subscription: &str,
        expiry: NaiveDate,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET subscription = $1, subscription_expiry = $2 WHERE id = $3",
        )
        .bind(subscription)
        .bind(expiry)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update subscription"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("Health check failed"))?;
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for Database {
    async fn count_videos(&self, user_id: i64) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM videos WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to count videos"))
    }

    async fn list_videos(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Video>, i64), AppError> {
        let total = self.count_videos(user_id).await?;

        let videos = sqlx::query_as::<_, Video>(&format!(
            r#"
            SELECT {VIDEO_COLUMNS}
            FROM videos
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list videos"))?;

        Ok((videos, total))
    }

    async fn find_video(&self, user_id: i64, filename: &str) -> Result<Option<Video>, AppError> {
        sqlx::query_as::<_, Video>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE user_id = $1 AND filename = $2"
        ))
        .bind(user_id)
        .bind(filename)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load video"))
    }

    #[instrument(skip(self, new_video), fields(user_id = new_video.user_id, filename = %new_video.filename))]
    async fn insert_video_within_limit(
        &self,
        new_video: &NewVideo,
        max_videos: i64,
    ) -> Result<Option<Video>, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        // Serialize inserts per user so concurrent renders cannot overshoot the cap
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(new_video.user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to lock user"))?;

        let video = sqlx::query_as::<_, Video>(&format!(
            r#"
            INSERT INTO videos (user_id, filename, duration)
            SELECT $1, $2, $3
            WHERE (SELECT COUNT(*) FROM videos WHERE user_id = $1) < $4
            RETURNING {VIDEO_COLUMNS}
            "#
        ))
        .bind(new_video.user_id)
        .bind(&new_video.filename)
        .bind(new_video.duration)
        .bind(max_videos)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to save video"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit video"))?;

        Ok(video)
    }

    async fn delete_video(&self, user_id: i64, filename: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM videos WHERE user_id = $1 AND filename = $2")
            .bind(user_id)
            .bind(filename)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete video"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_videos(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM videos WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to clear videos"))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PaymentRepository for Database {
    #[instrument(skip(self, order), fields(order_id = %order.order_id, user_id = order.user_id))]
    async fn create_order(&self, order: &NewPaymentOrder) -> Result<PaymentOrder, AppError> {
        sqlx::query_as::<_, PaymentOrder>(&format!(
            r#"
            INSERT INTO payment_orders
                (order_id, cf_order_id, user_id, amount, currency, subscription_type,
                 duration_days, status, payment_response)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(&order.order_id)
        .bind(&order.cf_order_id)
        .bind(order.user_id)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(&order.subscription_type)
        .bind(order.duration_days)
        .bind(OrderStatus::Initiated.as_str())
        .bind(&order.gateway_response)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Order {} already exists", order.order_id))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create order: {}", e)),
        })
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<PaymentOrder>, AppError> {
        sqlx::query_as::<_, PaymentOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM payment_orders WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load order"))
    }

    async fn latest_order_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<PaymentOrder>, AppError> {
        sqlx::query_as::<_, PaymentOrder>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM payment_orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load latest order"))
    }

    #[instrument(skip(self, completion), fields(order_id = %completion.order_id))]
    async fn complete_order(
        &self,
        completion: &OrderCompletion,
    ) -> Result<CompletionOutcome, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let order = sqlx::query_as::<_, PaymentOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM payment_orders WHERE order_id = $1 FOR UPDATE"
        ))
        .bind(&completion.order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to lock order"))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

        if order.is_completed() {
            tx.rollback()
                .await
                .map_err(db_error("Failed to roll back"))?;
            info!("Order already completed");
            return Ok(CompletionOutcome::AlreadyCompleted);
        }

        let expiry = subscription_expiry_for(completion.completed_on, order.duration_days)?;

        sqlx::query("UPDATE users SET subscription = $1, subscription_expiry = $2 WHERE id = $3")
            .bind(&order.subscription_type)
            .bind(expiry)
            .bind(order.user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to credit subscription"))?;

        sqlx::query(
            r#"
            INSERT INTO payments
                (order_id, user_id, amount, payment_status, payment_method, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&order.order_id)
        .bind(order.user_id)
        .bind(order.amount)
        .bind(&completion.payment_status)
        .bind(&completion.payment_method)
        .bind(&completion.transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to record payment"))?;

        sqlx::query(
            r#"
            UPDATE payment_orders
            SET status = $1, updated_at = NOW(), payment_response = $2
            WHERE order_id = $3
            "#,
        )
        .bind(OrderStatus::Completed.as_str())
        .bind(&completion.gateway_response)
        .bind(&order.order_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to mark order completed"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit order completion"))?;

        info!(
            user_id = order.user_id,
            subscription = %order.subscription_type,
            expiry = %expiry,
            "Order completed and subscription credited"
        );

        Ok(CompletionOutcome::Completed {
            user_id: order.user_id,
            subscription: order.subscription_type,
            subscription_expiry: expiry,
        })
    }

    async fn find_payment(&self, order_id: &str) -> Result<Option<Payment>, AppError> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, order_id, user_id, amount, payment_status, payment_method,
                   transaction_id, payment_date
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load payment"))
    }
}
