//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

pub use routes::create_router;

use sqlx::PgPool;

use crate::crypto::SecretCodec;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub codec: SecretCodec,
}

impl AppState {
    pub fn new(pool: PgPool, codec: SecretCodec) -> Self {
        Self { pool, codec }
    }
}
