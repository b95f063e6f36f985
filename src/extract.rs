use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON body extractor whose rejections use the API error shape.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let message = match &rejection {
                    JsonRejection::JsonDataError(_) => "Invalid JSON data",
                    JsonRejection::JsonSyntaxError(_) => "Invalid JSON syntax",
                    JsonRejection::MissingJsonContentType(_) => "Expected a JSON body",
                    _ => "Failed to read JSON body",
                };
                tracing::debug!(error = %rejection, "json body rejected");
                Err(AppError::Validation(message.into()))
            }
        }
    }
}
