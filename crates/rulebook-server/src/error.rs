use rulebook_common::error::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("history unavailable: {0}")]
    HistoryUnavailable(String),

    #[error("corpus validation failed: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),
}
