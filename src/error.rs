use crate::models::{ErrorBody, ErrorResponse};
use crate::position::PositionError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Position(#[from] PositionError),
    /// Stored channel hierarchy contradicts itself (parent cycle, depth
    /// mismatch). Never retried.
    #[error("corrupt channel hierarchy: {0}")]
    CorruptHierarchy(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "internal_error",
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "invalid_request",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "already_exists",
            AppError::Position(_) => "invalid_position",
            AppError::CorruptHierarchy(_) => "corrupt_hierarchy",
        }
    }

    /// Message safe to show to a caller. Internal details are logged
    /// instead of returned.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(e) => {
                tracing::error!("database error: {e}");
                "internal database error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {e}");
                "internal error".to_string()
            }
            AppError::CorruptHierarchy(e) => {
                tracing::error!("corrupt channel hierarchy: {e}");
                "channel hierarchy is inconsistent".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.public_message(),
            },
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => AppError::NotFound("resource not found".to_string()),
            _ => AppError::Database(e),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_position_errors_convert() {
        let err: AppError = PositionError::DepthExceeded { raw: 0x0101_0101 }.into();
        assert_eq!(err.code(), "invalid_position");
        assert!(err.to_string().contains("maximum depth"));
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Internal("secret detail".into());
        let body = err.to_response();
        assert_eq!(body.error.code, "internal_error");
        assert!(!body.error.message.contains("secret"));
    }
}
