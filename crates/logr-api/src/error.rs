//! HTTP error mapping: domain errors become status codes plus a JSON
//! `{"detail": ...}` body.

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use logr_core::Error;

/// API-level error carrying everything needed for the wire response.
#[derive(Debug)]
pub enum ApiError {
    /// A domain error mapped by kind.
    Core(Error),
    /// Shape-level request problem (missing/misshapen fields).
    Shape { status: StatusCode, detail: String },
}

impl ApiError {
    /// 404 with a plain detail message.
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::Core(Error::NotFound(detail.into()))
    }

    /// 400 with a plain detail message.
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Core(Error::Validation(detail.into()))
    }

    /// 401 with a plain detail message.
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::Core(Error::Unauthorized(detail.into()))
    }

    /// 403 with a plain detail message.
    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::Core(Error::Forbidden(detail.into()))
    }

    /// 503 with a plain detail message.
    pub fn unconfigured(detail: impl Into<String>) -> Self {
        Self::Core(Error::Config(detail.into()))
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Shape { status, .. } => *status,
            Self::Core(err) => match err {
                Error::Validation(_) => StatusCode::BAD_REQUEST,
                Error::NotFound(_) | Error::LogNotFound(_) => StatusCode::NOT_FOUND,
                Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                Error::Forbidden(_) => StatusCode::FORBIDDEN,
                Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                Error::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Shape { detail, .. } => detail.clone(),
            Self::Core(err) => err.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Core(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_secs = match &self {
            ApiError::Core(Error::RateLimited(secs)) => Some(*secs),
            _ => None,
        };
        let body = Json(serde_json::json!({ "detail": self.detail() }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_secs {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

/// `Json` extractor that reports rejections in the service's error
/// shape: missing/mistyped fields are 422, malformed JSON is 400.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                let status = match &rejection {
                    JsonRejection::JsonDataError(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    _ => StatusCode::BAD_REQUEST,
                };
                Err(ApiError::Shape {
                    status,
                    detail: rejection.body_text(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::validation("bad level").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("nope").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::unauthorized("no key").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::forbidden("no scope").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::unconfigured("no master key").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Core(Error::RateLimited(10)).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Core(Error::Internal("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::Core(Error::RateLimited(42)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "42");
    }

    #[test]
    fn test_database_error_is_500() {
        let err = ApiError::Core(Error::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
