pub mod events;
pub mod pii;
