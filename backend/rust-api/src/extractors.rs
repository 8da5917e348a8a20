use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use validator::Validate;

/// JSON body extractor that rejects with a JSON error instead of plain text.
pub struct AppJson<T>(pub T);

/// `AppJson` that also runs the body's `validator` rules.
pub struct ValidatedJson<T>(pub T);

fn json_error(status: StatusCode, message: String) -> Response {
    tracing::warn!("{}", message);
    (
        status,
        Json(json!({
            "message": message,
            "status": status.as_u16()
        })),
    )
        .into_response()
}

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(json_error(
                StatusCode::BAD_REQUEST,
                format!("Failed to parse JSON request body: {}", rejection),
            )),
        }
    }
}

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: serde::de::DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let AppJson(value) = AppJson::<T>::from_request(req, state).await?;
        value.validate().map_err(|e| {
            json_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Validation failed: {}", e),
            )
        })?;
        Ok(ValidatedJson(value))
    }
}
