//! Database module
//!
//! Database connection and schema verification utilities.

use sqlx::PgPool;

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec![
        "api_keys",
        "users",
        "cards",
        "transfers",
        "block_requests",
    ];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    // The single-pending-per-card invariant is backed by a partial unique
    // index; refuse to start without it.
    let index_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_indexes
            WHERE schemaname = 'public'
              AND tablename = 'block_requests'
              AND indexname = 'block_requests_one_pending_per_card'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !index_exists {
        tracing::error!(
            "Required index 'block_requests_one_pending_per_card' does not exist. \
             Please run migrations."
        );
        return Ok(false);
    }

    Ok(true)
}
