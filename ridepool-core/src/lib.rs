pub mod booking;
pub mod geo;
pub mod repository;
pub mod ride;
pub mod search;
pub mod service;
pub mod user;

pub use service::RideService;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Store error: {0}")]
    Store(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
