pub mod auth;

pub use auth::{require_identity, Claims, Identity};
