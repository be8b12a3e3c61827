use thiserror::Error;
use tonic::Status;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Configuration(msg) => {
                Status::failed_precondition(format!("Configuration error: {}", msg))
            }
            AppError::Connection(msg) => Status::unavailable(format!("Connection error: {}", msg)),
            AppError::Read(msg) => Status::unavailable(format!("Read error: {}", msg)),
            AppError::Write(msg) => Status::unavailable(format!("Write error: {}", msg)),
            AppError::InvalidInput(msg) => Status::invalid_argument(msg),
            AppError::NotFound(msg) => Status::not_found(msg),
            AppError::Unauthenticated(msg) => Status::unauthenticated(msg),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
