//! Domain error taxonomy. Each component gets its own `thiserror` enum so
//! callers can match on failure kind (retryable vs terminal); `ApiError`
//! is the HTTP-boundary umbrella that maps everything to the response
//! envelope described in the external interfaces section.

use serde::Serialize;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("queue {0} is paused")]
    Paused(String),
    #[error("job {0} not found")]
    JobNotFound(uuid::Uuid),
    #[error("queue {0} not found")]
    QueueNotFound(String),
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("processor error: {0}")]
    Processor(String),
    #[error("job timed out after {0}ms")]
    Timeout(u64),
    #[error("queue {0} rate limit exceeded")]
    RateLimited(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl DispatchError {
    /// Processor and timeout failures are recoverable against `attempts`;
    /// broker/store failures are infrastructure faults and must not
    /// mutate job state until the broker confirms (per the error-handling
    /// design: infrastructure errors are retried outside the attempt
    /// counter).
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, DispatchError::Broker(_) | DispatchError::Store(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression {0}: {1}")]
    InvalidCron(String, String),
    #[error("unknown timezone {0}")]
    InvalidTimezone(String),
    #[error("schedule {0} not found")]
    NotFound(uuid::Uuid),
    #[error("schedule must set exactly one of cron or at")]
    AmbiguousTrigger,
    #[error("schedule name {1} already exists for tenant {0}")]
    NameConflict(String, String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Delivery(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("subscription {0} not found")]
    NotFound(uuid::Uuid),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Delivery(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("dimension mismatch: index is {expected}, embedding is {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding provider failed: {0}")]
    Provider(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("session {0} not found")]
    SessionNotFound(uuid::Uuid),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(uuid::Uuid),
    #[error("checkpoint restoration is not implemented")]
    RestoreUnsupported,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// HTTP-boundary error code, matching the external response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    ValidationError,
    AuthenticationError,
    AuthorizationError,
    ResourceNotFound,
    ResourceConflict,
    RateLimitExceeded,
    ExternalServiceError,
    InternalError,
}

impl ErrorCode {
    pub fn status(self) -> u16 {
        match self {
            ErrorCode::ValidationError => 400,
            ErrorCode::AuthenticationError => 401,
            ErrorCode::AuthorizationError => 403,
            ErrorCode::ResourceNotFound => 404,
            ErrorCode::ResourceConflict => 409,
            ErrorCode::RateLimitExceeded => 429,
            ErrorCode::ExternalServiceError => 503,
            ErrorCode::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorCode::AuthorizationError => "AUTHORIZATION_ERROR",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::ResourceConflict => "RESOURCE_CONFLICT",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceNotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match &e {
            DispatchError::Broker(BrokerError::JobNotFound(_)) => {
                ApiError::new(ErrorCode::ResourceNotFound, e.to_string())
            }
            DispatchError::Broker(_) | DispatchError::Store(_) => {
                ApiError::new(ErrorCode::ExternalServiceError, e.to_string())
            }
            DispatchError::RateLimited(_) => ApiError::new(ErrorCode::RateLimitExceeded, e.to_string()),
            _ => ApiError::new(ErrorCode::InternalError, e.to_string()),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        match &e {
            SchedulerError::NotFound(_) => ApiError::new(ErrorCode::ResourceNotFound, e.to_string()),
            SchedulerError::InvalidCron(_, _) | SchedulerError::InvalidTimezone(_) | SchedulerError::AmbiguousTrigger => {
                ApiError::new(ErrorCode::ValidationError, e.to_string())
            }
            SchedulerError::NameConflict(_, _) => ApiError::new(ErrorCode::ResourceConflict, e.to_string()),
            SchedulerError::Store(_) | SchedulerError::Delivery(_) => {
                ApiError::new(ErrorCode::ExternalServiceError, e.to_string())
            }
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(e: WebhookError) -> Self {
        match &e {
            WebhookError::NotFound(_) => ApiError::new(ErrorCode::ResourceNotFound, e.to_string()),
            _ => ApiError::new(ErrorCode::ExternalServiceError, e.to_string()),
        }
    }
}

impl From<VectorError> for ApiError {
    fn from(e: VectorError) -> Self {
        match &e {
            VectorError::DimensionMismatch { .. } => ApiError::new(ErrorCode::ValidationError, e.to_string()),
            _ => ApiError::new(ErrorCode::ExternalServiceError, e.to_string()),
        }
    }
}

impl From<ReasoningError> for ApiError {
    fn from(e: ReasoningError) -> Self {
        match &e {
            ReasoningError::SessionNotFound(_) => ApiError::new(ErrorCode::ResourceNotFound, e.to_string()),
            ReasoningError::Store(_) => ApiError::new(ErrorCode::ExternalServiceError, e.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match &e {
            SessionError::NotFound(_) => ApiError::new(ErrorCode::ResourceNotFound, e.to_string()),
            SessionError::RestoreUnsupported => ApiError::new(ErrorCode::ValidationError, e.to_string()),
            SessionError::Store(_) => ApiError::new(ErrorCode::ExternalServiceError, e.to_string()),
        }
    }
}
