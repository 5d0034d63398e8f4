use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("No active session found. Please sign in again.")]
    SessionMissing,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The backend answered `{success: false, error}`; the message is shown verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Gateway(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::SessionMissing => ErrorCode::SessionMissing,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::Rejected(_) => ErrorCode::Rejected,
            AppError::Gateway(_) => ErrorCode::GatewayError,
            AppError::Transport(_) => ErrorCode::TransportError,
            AppError::InvalidPayload(_) => ErrorCode::InvalidPayload,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether retrying later (polling, reconnect) can make the error go away.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Transport(_) | AppError::Gateway(_)
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(format!("request failed: {}", err))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    DatabaseError,
    SessionMissing,
    InvalidInput,
    Rejected,
    GatewayError,
    TransportError,
    InvalidPayload,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::SessionMissing => "SESSION_MISSING",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::Rejected => "REJECTED",
            ErrorCode::GatewayError => "GATEWAY_ERROR",
            ErrorCode::TransportError => "TRANSPORT_ERROR",
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
