//! Block-request workflow
//!
//! User-initiated requests to block a card, resolved by an administrator.
//! PENDING → APPROVED | REJECTED; approval is the only path by which a
//! request affects card state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::card::service::require_admin;
use crate::card::{CardRepository, CardService, CardView};
use crate::crypto::SecretCodec;
use crate::domain::{DomainError, Identity};
use crate::error::AppError;

/// Block-request status. Approved and Rejected are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl BlockRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockRequestStatus::Pending => "PENDING",
            BlockRequestStatus::Approved => "APPROVED",
            BlockRequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BlockRequestStatus::Pending),
            "APPROVED" => Some(BlockRequestStatus::Approved),
            "REJECTED" => Some(BlockRequestStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for BlockRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's request to block one of their cards
#[derive(Debug, Clone, Serialize)]
pub struct BlockRequest {
    pub id: i64,
    pub card_id: i64,
    pub requested_by: i64,
    pub reason: String,
    pub status: BlockRequestStatus,
    pub processed_by: Option<i64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub admin_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

type BlockRequestRow = (
    i64,
    i64,
    i64,
    String,
    String,
    Option<i64>,
    Option<DateTime<Utc>>,
    Option<String>,
    DateTime<Utc>,
);

const REQUEST_COLUMNS: &str = "id, card_id, requested_by, reason, status, processed_by, \
     processed_at, admin_comment, created_at";

fn map_row(row: BlockRequestRow) -> Result<BlockRequest, AppError> {
    let (id, card_id, requested_by, reason, status, processed_by, processed_at, admin_comment, created_at) =
        row;

    let status = BlockRequestStatus::from_str_opt(&status).ok_or_else(|| {
        AppError::Internal(format!("Unknown block request status '{}' for request {}", status, id))
    })?;

    Ok(BlockRequest {
        id,
        card_id,
        requested_by,
        reason,
        status,
        processed_by,
        processed_at,
        admin_comment,
        created_at,
    })
}

/// Postgres unique violation, raised by the partial unique index on
/// pending requests when two creates race
const PG_UNIQUE_VIOLATION: &str = "23505";

/// Block-request workflow operations
#[derive(Debug, Clone)]
pub struct BlockRequestService {
    pool: PgPool,
    cards: CardService,
}

impl BlockRequestService {
    pub fn new(pool: PgPool, codec: SecretCodec) -> Self {
        Self {
            cards: CardService::new(pool.clone(), codec),
            pool,
        }
    }

    /// Create a PENDING block request for a card the caller owns.
    ///
    /// At most one PENDING request may exist per card; a duplicate fails
    /// whoever the requester is.
    pub async fn create(
        &self,
        card_id: i64,
        reason: String,
        identity: &Identity,
    ) -> Result<BlockRequest, AppError> {
        let owner_id: Option<i64> = sqlx::query_scalar("SELECT owner_id FROM cards WHERE id = $1")
            .bind(card_id)
            .fetch_optional(&self.pool)
            .await?;

        // Missing and foreign cards look identical to the requester
        match owner_id {
            Some(owner_id) if owner_id == identity.user_id => {}
            _ => return Err(AppError::AccessDenied),
        }

        let pending_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM block_requests WHERE card_id = $1 AND status = 'PENDING')",
        )
        .bind(card_id)
        .fetch_one(&self.pool)
        .await?;

        if pending_exists {
            return Err(DomainError::DuplicatePendingRequest.into());
        }

        let row: BlockRequestRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO block_requests (card_id, requested_by, reason, status)
            VALUES ($1, $2, $3, 'PENDING')
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        ))
        .bind(card_id)
        .bind(identity.user_id)
        .bind(&reason)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // Two concurrent creates can both pass the probe above; the
            // partial unique index turns the loser into the domain error.
            if is_unique_violation(&e) {
                AppError::Domain(DomainError::DuplicatePendingRequest)
            } else {
                AppError::Database(e)
            }
        })?;

        tracing::info!(card_id, requested_by = identity.user_id, "Block request created");
        map_row(row)
    }

    /// Approve a PENDING request and block the referenced card, atomically
    pub async fn approve(
        &self,
        request_id: i64,
        admin_comment: Option<String>,
        identity: &Identity,
    ) -> Result<BlockRequest, AppError> {
        require_admin(identity)?;

        let mut tx = self.pool.begin().await?;

        let request = Self::lock_request(&mut tx, request_id).await?;
        if request.status != BlockRequestStatus::Pending {
            return Err(DomainError::RequestNotPending { action: "approved" }.into());
        }

        let mut card = CardRepository::lock_for_update(&mut tx, request.card_id)
            .await?
            .ok_or(AppError::CardNotFound(request.card_id))?;

        // The only workflow path that touches card state
        card.block()?;
        CardRepository::update_in_tx(&mut tx, &card).await?;

        let row: BlockRequestRow = sqlx::query_as(&format!(
            r#"
            UPDATE block_requests
            SET status = 'APPROVED', processed_by = $2, processed_at = NOW(), admin_comment = $3
            WHERE id = $1
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .bind(identity.user_id)
        .bind(&admin_comment)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            request_id,
            card_id = request.card_id,
            processed_by = identity.user_id,
            "Block request approved, card blocked"
        );
        map_row(row)
    }

    /// Reject a PENDING request; card state is untouched
    pub async fn reject(
        &self,
        request_id: i64,
        admin_comment: Option<String>,
        identity: &Identity,
    ) -> Result<BlockRequest, AppError> {
        require_admin(identity)?;

        let mut tx = self.pool.begin().await?;

        let request = Self::lock_request(&mut tx, request_id).await?;
        if request.status != BlockRequestStatus::Pending {
            return Err(DomainError::RequestNotPending { action: "rejected" }.into());
        }

        let row: BlockRequestRow = sqlx::query_as(&format!(
            r#"
            UPDATE block_requests
            SET status = 'REJECTED', processed_by = $2, processed_at = NOW(), admin_comment = $3
            WHERE id = $1
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .bind(identity.user_id)
        .bind(&admin_comment)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            request_id,
            processed_by = identity.user_id,
            "Block request rejected"
        );
        map_row(row)
    }

    /// All requests, optionally filtered by status, newest first (admin)
    pub async fn list(
        &self,
        status: Option<BlockRequestStatus>,
        identity: &Identity,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BlockRequest>, AppError> {
        require_admin(identity)?;

        let rows: Vec<BlockRequestRow> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {}
                    FROM block_requests
                    WHERE status = $1
                    ORDER BY created_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                    REQUEST_COLUMNS
                ))
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {}
                    FROM block_requests
                    ORDER BY created_at DESC
                    LIMIT $1 OFFSET $2
                    "#,
                    REQUEST_COLUMNS
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(map_row).collect()
    }

    /// Number of PENDING requests (admin notification badge)
    pub async fn pending_count(&self, identity: &Identity) -> Result<i64, AppError> {
        require_admin(identity)?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM block_requests WHERE status = 'PENDING'")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Cards with at least one PENDING request, deduplicated by card (admin)
    pub async fn cards_with_pending(&self, identity: &Identity) -> Result<Vec<CardView>, AppError> {
        require_admin(identity)?;
        self.cards.views_with_pending_requests().await
    }

    async fn lock_request(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        request_id: i64,
    ) -> Result<BlockRequest, AppError> {
        let row: Option<BlockRequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM block_requests WHERE id = $1 FOR UPDATE",
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(map_row)
            .transpose()?
            .ok_or(AppError::RequestNotFound(request_id))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            BlockRequestStatus::Pending,
            BlockRequestStatus::Approved,
            BlockRequestStatus::Rejected,
        ] {
            assert_eq!(BlockRequestStatus::from_str_opt(status.as_str()), Some(status));
        }
        assert_eq!(BlockRequestStatus::from_str_opt("OPEN"), None);
    }
}
