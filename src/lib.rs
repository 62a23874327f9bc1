//! card_ledger Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod block_request;
pub mod card;
pub mod crypto;
pub mod domain;
pub mod jobs;
pub mod transfer;
pub mod user;

// Private modules (used only by main.rs binary)
pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use crypto::{EncryptionKey, SecretCodec};
pub use domain::{Amount, AmountError, Balance, DomainError, Identity, Role};
