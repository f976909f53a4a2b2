use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Top-level error for startup and the HTTP surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Feed store error: {0}")]
    Store(#[from] StoreError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] idempotent_consumer::LedgerError),

    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolveError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let code = self.status_code();
        HttpResponse::build(code).json(ErrorResponse {
            error: self.to_string(),
            code: code.as_u16(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Feed store round-trip failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("feed store unavailable: {0}")]
    Unavailable(String),
}

/// Follower lookup failure, classified for the retry-vs-drop decision.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("follower lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("follower service unreachable: {0}")]
    Connect(String),

    #[error("follower service returned {code:?}: {message}")]
    Rpc { code: tonic::Code, message: String },
}

impl ResolveError {
    /// Transient failures may succeed on redelivery; permanent ones will not.
    pub fn is_transient(&self) -> bool {
        match self {
            ResolveError::Timeout(_) | ResolveError::Connect(_) => true,
            ResolveError::Rpc { code, .. } => matches!(
                code,
                tonic::Code::Unavailable
                    | tonic::Code::DeadlineExceeded
                    | tonic::Code::ResourceExhausted
                    | tonic::Code::Aborted
                    | tonic::Code::Internal
                    | tonic::Code::Unknown
                    | tonic::Code::Cancelled
            ),
        }
    }
}

impl From<tonic::Status> for ResolveError {
    fn from(status: tonic::Status) -> Self {
        ResolveError::Rpc {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl From<tonic::transport::Error> for ResolveError {
    fn from(err: tonic::transport::Error) -> Self {
        ResolveError::Connect(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("delivery stream closed")]
    StreamClosed,

    #[error("publish not confirmed by broker: {0}")]
    NotConfirmed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_classification() {
        assert!(ResolveError::Timeout(Duration::from_secs(3)).is_transient());
        assert!(ResolveError::Connect("refused".into()).is_transient());
        assert!(ResolveError::from(tonic::Status::unavailable("down")).is_transient());
        assert!(ResolveError::from(tonic::Status::deadline_exceeded("slow")).is_transient());

        assert!(!ResolveError::from(tonic::Status::invalid_argument("bad id")).is_transient());
        assert!(!ResolveError::from(tonic::Status::not_found("no user")).is_transient());
        assert!(!ResolveError::from(tonic::Status::unimplemented("nope")).is_transient());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Store(StoreError::Unavailable("down".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
