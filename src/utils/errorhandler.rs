use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response}
};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::engine::EngineError;

const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";

#[derive(Debug, Error)]
pub enum AppError {

    #[error("Database query failed: {0}")]
    DatabaseError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Validation error: {message}")]
    ValidationError { message: String, details: Option<Value> },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Scheduling conflict: {0}")]
    SchedulingConflict(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Unexpected server error")]
    Unexpected,
}

impl AppError {

    pub fn database<T: Into<String>>(msg: T) -> Self {
        AppError::DatabaseError(msg.into())
    }

    pub fn bad_request<T: Into<String>>(msg: T) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        AppError::ValidationError { message: msg.into(), details: None }
    }

    /// Validation failure with a field path, rendered under `error.details`.
    pub fn invalid_field<T: Into<String>>(field: &str, msg: T) -> Self {
        let message = msg.into();
        AppError::ValidationError {
            details: Some(json!([{ "path": [field], "message": message }])),
            message,
        }
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn too_many_requests<T: Into<String>>(msg: T) -> Self {
        AppError::TooManyRequests(msg.into())
    }

    pub fn upstream<T: Into<String>>(msg: T) -> Self {
        AppError::Upstream(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::SchedulingConflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::DatabaseError(_) => "INTERNAL_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::SchedulingConflict(_) => "SCHEDULING_CONFLICT",
            AppError::TooManyRequests(_) => "RATE_LIMIT_EXCEEDED",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Unexpected => "INTERNAL_ERROR",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = e {
            return AppError::not_found("resource not found");
        }
        if let Some(db_err) = e.as_database_error() {
            match db_err.code().as_deref() {
                Some(EXCLUSION_VIOLATION) => {
                    return AppError::SchedulingConflict(
                        "booking conflicts with an existing booking, please choose a different time".into(),
                    );
                }
                Some(UNIQUE_VIOLATION) => return AppError::conflict("resource already exists"),
                _ => {}
            }
        }
        error!("database error: {}", e);
        AppError::database("database operation failed")
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::SchedulingConflict(_) => AppError::SchedulingConflict(
                "booking conflicts with an existing booking, please choose a different time".into(),
            ),
            EngineError::InvalidInterval => AppError::invalid_field("scheduledEnd", e.to_string()),
            EngineError::NoLineItems
            | EngineError::InvalidLineItem { .. }
            | EngineError::LineItemTotalMismatch { .. } => AppError::invalid_field("lineItems", e.to_string()),
            EngineError::NegativeDiscount | EngineError::DiscountExceedsSubtotal { .. } => {
                AppError::invalid_field("discountAmount", e.to_string())
            }
            EngineError::PercentOutOfRange(_) => AppError::validation(e.to_string()),
            EngineError::Overflow => AppError::validation(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, details) = match self {
            AppError::DatabaseError(msg)
            | AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::SchedulingConflict(msg)
            | AppError::TooManyRequests(msg)
            | AppError::Upstream(msg) => (msg, None),

            AppError::ValidationError { message, details } => (message, details),

            AppError::Unexpected => ("Unexpected server error".to_string(), None),
        };

        let mut error = json!({
            "message": message,
            "code": code,
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        let body = Json(json!({
            "success": false,
            "error": error
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn engine_conflict_maps_to_409() {
        let err: AppError = EngineError::SchedulingConflict(Uuid::new_v4()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "SCHEDULING_CONFLICT");
    }

    #[test]
    fn totals_errors_are_validation_failures() {
        let err: AppError = EngineError::DiscountExceedsSubtotal { discount: 2, subtotal: 1 }.into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        match err {
            AppError::ValidationError { details: Some(details), .. } => {
                assert_eq!(details[0]["path"][0], "discountAmount");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[derive(Debug)]
    struct PgCode(&'static str);

    impl std::fmt::Display for PgCode {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "postgres error {}", self.0)
        }
    }

    impl std::error::Error for PgCode {}

    impl sqlx::error::DatabaseError for PgCode {
        fn message(&self) -> &str {
            "constraint violated"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.0.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> AppError {
        sqlx::Error::Database(Box::new(PgCode(code))).into()
    }

    #[test]
    fn overlap_constraint_is_a_scheduling_conflict() {
        let err = db_error("23P01");
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "SCHEDULING_CONFLICT");
    }

    #[test]
    fn unique_violation_is_a_plain_conflict() {
        let err = db_error("23505");
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn other_database_errors_stay_internal() {
        let err = db_error("42P01");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn row_not_found_is_404() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn response_body_uses_error_envelope() {
        let response = AppError::too_many_requests("slow down").into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["error"]["message"], "slow down");
        assert!(body["error"].get("details").is_none());
    }
}
