use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// AppError
///
/// The single error taxonomy shared by the policy engine, the repositories and the
/// handlers. Every variant maps to exactly one HTTP status, so handlers can simply
/// propagate with `?` and let `IntoResponse` render the body.
#[derive(Debug, Error)]
pub enum AppError {
    /// Credentials are missing or invalid where the operation requires them.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is authenticated but the access policy denies the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The record (or the caller's linked profile) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input shape or uniqueness violation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store or audit failure. Never reported to the client as a success.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// ErrorBody
///
/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    code: &'static str,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Wraps a failed audit append. The surrounding mutation has been rolled back.
    pub fn audit(cause: impl std::fmt::Display) -> Self {
        tracing::error!("audit append failed: {}", cause);
        AppError::Internal("Failed to record audit entry".to_string())
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} not found", what))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, message) = match &self {
            AppError::Unauthorized(msg) => ("Unauthorized", msg.clone()),
            AppError::Forbidden(msg) => ("Forbidden", msg.clone()),
            AppError::NotFound(msg) => ("Not Found", msg.clone()),
            AppError::Validation(msg) => ("Validation Error", msg.clone()),
            // Internal details stay in the logs.
            AppError::Internal(_) => ("Internal Server Error", "An unexpected error occurred".to_string()),
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("request rejected: {}", self);
        }

        let body = ErrorBody {
            error,
            message,
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

/// Store errors
///
/// Constraint violations are the caller's fault and surface as validation errors;
/// everything else is an internal failure.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // unique_violation
                Some("23505") => AppError::Validation(unique_message(db.constraint())),
                // foreign_key_violation
                Some("23503") => {
                    AppError::Validation("Referenced record does not exist".to_string())
                }
                // check_violation
                Some("23514") => AppError::Validation(format!(
                    "Constraint {} violated",
                    db.constraint().unwrap_or("check")
                )),
                _ => {
                    tracing::error!("database error: {:?}", e);
                    AppError::Internal(e.to_string())
                }
            },
            _ => {
                tracing::error!("store error: {:?}", e);
                AppError::Internal(e.to_string())
            }
        }
    }
}

/// Maps the unique index names from the migrations to field-level messages.
fn unique_message(constraint: Option<&str>) -> String {
    let field = match constraint {
        Some("users_username_key") => "username",
        Some("driver_profiles_national_id_key") => "national_id",
        Some("driver_profiles_license_number_key") => "license_number",
        Some("driver_profiles_user_id_key") | Some("passenger_profiles_user_id_key") => "user",
        Some("vehicles_plate_number_key") => "plate_number",
        Some(other) => other,
        None => "value",
    };
    format!("A record with this {} already exists", field)
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthorized(format!("Invalid token: {}", e))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("credential hashing failed: {}", e))
    }
}
