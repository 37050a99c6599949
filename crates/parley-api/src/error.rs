use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use parley_types::api::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Db(#[from] parley_db::Error),

    #[error("missing or invalid session token")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(&'static str),

    /// The request could not be extracted (bad path, query or body).
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("push notifications are not configured")]
    PushDisabled,

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use parley_db::Error as Db;

        match self {
            ApiError::Db(Db::Invalid(_)) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Db(Db::Forbidden(_) | Db::NotParticipant) => StatusCode::FORBIDDEN,
            ApiError::Db(Db::NotFound(_) | Db::ProfileNotFound) => StatusCode::NOT_FOUND,
            ApiError::PushDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Db(Db::Sqlite(_) | Db::LockPoisoned) | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_store_errors_to_statuses() {
        use parley_db::Error as Db;

        assert_eq!(ApiError::from(Db::Invalid("x")).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(Db::NotParticipant).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(Db::Forbidden("x")).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(Db::ProfileNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(Db::NotFound("message")).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(Db::LockPoisoned).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::PushDisabled.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
