use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use validator::Validate;

/// JSON body extractor for the account endpoints.
///
/// Any body that does not deserialize (bad syntax, wrong content type, a
/// missing field) is a 400; a body that deserializes but fails its
/// `validator` rules is a 422 with the offending fields in `details`.
pub struct ValidatedJson<T>(pub T);

fn body_error(rejection: JsonRejection) -> AppError {
    tracing::debug!(error = %rejection.body_text(), "Rejected request body");
    AppError::BadRequest(anyhow::anyhow!(
        "Invalid request body: {}",
        rejection.body_text()
    ))
}

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(body_error)?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}
