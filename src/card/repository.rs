//! Card persistence
//!
//! Load/save contract for cards, including the row-locking primitive the
//! transfer engine builds on and the set-based expiration update.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::Balance;
use crate::error::AppError;

use super::{Card, CardStatus};

/// Data for a card row about to be inserted (id and timestamps are assigned
/// by the database)
#[derive(Debug, Clone)]
pub struct NewCard {
    pub owner_id: i64,
    pub number_encrypted: String,
    pub number_hash: String,
    pub holder: String,
    pub expiration_date: NaiveDate,
    pub cvv_encrypted: String,
}

type CardRow = (
    i64,
    i64,
    String,
    String,
    String,
    NaiveDate,
    String,
    Decimal,
    String,
    DateTime<Utc>,
);

const CARD_COLUMNS: &str = "id, owner_id, number_encrypted, number_hash, holder, \
     expiration_date, cvv_encrypted, balance, status, created_at";

fn map_row(row: CardRow) -> Result<Card, AppError> {
    let (
        id,
        owner_id,
        number_encrypted,
        number_hash,
        holder,
        expiration_date,
        cvv_encrypted,
        balance,
        status,
        created_at,
    ) = row;

    let status = CardStatus::from_str_opt(&status)
        .ok_or_else(|| AppError::Internal(format!("Unknown card status '{}' for card {}", status, id)))?;
    let balance = Balance::new(balance)
        .map_err(|e| AppError::Internal(format!("Corrupt balance for card {}: {}", id, e)))?;

    Ok(Card::from_db(
        id,
        owner_id,
        number_encrypted,
        number_hash,
        holder,
        expiration_date,
        cvv_encrypted,
        balance,
        status,
        Some(created_at),
    ))
}

/// Card load/save operations
#[derive(Debug, Clone)]
pub struct CardRepository {
    pool: PgPool,
}

impl CardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, card_id: i64) -> Result<Option<Card>, AppError> {
        let row: Option<CardRow> = sqlx::query_as(&format!(
            "SELECT {} FROM cards WHERE id = $1",
            CARD_COLUMNS
        ))
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_row).transpose()
    }

    pub async fn find_by_owner(&self, owner_id: i64) -> Result<Vec<Card>, AppError> {
        let rows: Vec<CardRow> = sqlx::query_as(&format!(
            "SELECT {} FROM cards WHERE owner_id = $1 ORDER BY id",
            CARD_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_row).collect()
    }

    /// Admin listing, newest first
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Card>, AppError> {
        let rows: Vec<CardRow> = sqlx::query_as(&format!(
            "SELECT {} FROM cards ORDER BY id DESC LIMIT $1 OFFSET $2",
            CARD_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_row).collect()
    }

    /// Duplicate-PAN probe via the deterministic fingerprint
    pub async fn number_hash_exists(&self, number_hash: &str) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM cards WHERE number_hash = $1)")
                .bind(number_hash)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    pub async fn insert(&self, new_card: NewCard) -> Result<Card, AppError> {
        let row: CardRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO cards
                (owner_id, number_encrypted, number_hash, holder,
                 expiration_date, cvv_encrypted, balance, status)
            VALUES ($1, $2, $3, $4, $5, $6, 0, 'ACTIVE')
            RETURNING {}
            "#,
            CARD_COLUMNS
        ))
        .bind(new_card.owner_id)
        .bind(&new_card.number_encrypted)
        .bind(&new_card.number_hash)
        .bind(&new_card.holder)
        .bind(new_card.expiration_date)
        .bind(&new_card.cvv_encrypted)
        .fetch_one(&self.pool)
        .await?;

        map_row(row)
    }

    /// Persist the card's mutable fields
    pub async fn update(&self, card: &Card) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE cards
            SET balance = $2, status = $3, holder = $4, expiration_date = $5
            WHERE id = $1
            "#,
        )
        .bind(card.id())
        .bind(card.balance().value())
        .bind(card.status().as_str())
        .bind(card.holder())
        .bind(card.expiration_date())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Same as `update`, but inside a caller-owned transaction
    pub async fn update_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        card: &Card,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE cards
            SET balance = $2, status = $3, holder = $4, expiration_date = $5
            WHERE id = $1
            "#,
        )
        .bind(card.id())
        .bind(card.balance().value())
        .bind(card.status().as_str())
        .bind(card.holder())
        .bind(card.expiration_date())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Load a card with a row lock held until the transaction ends.
    ///
    /// Callers locking two cards must do so in ascending id order; that fixed
    /// order is what keeps concurrent transfers on the same pair from
    /// deadlocking.
    pub async fn lock_for_update(
        tx: &mut Transaction<'_, Postgres>,
        card_id: i64,
    ) -> Result<Option<Card>, AppError> {
        let row: Option<CardRow> = sqlx::query_as(&format!(
            "SELECT {} FROM cards WHERE id = $1 FOR UPDATE",
            CARD_COLUMNS
        ))
        .bind(card_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(map_row).transpose()
    }

    /// Cards that have at least one PENDING block request, deduplicated
    pub async fn find_with_pending_requests(&self) -> Result<Vec<Card>, AppError> {
        let rows: Vec<CardRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT c.id, c.owner_id, c.number_encrypted, c.number_hash, c.holder,
                   c.expiration_date, c.cvv_encrypted, c.balance, c.status, c.created_at
            FROM cards c
            JOIN block_requests br ON br.card_id = c.id
            WHERE br.status = 'PENDING'
            ORDER BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_row).collect()
    }

    /// Set-based ACTIVE → EXPIRED transition for all cards expiring strictly
    /// before `date`. Returns the number of rows changed; running it again
    /// with the same date changes nothing.
    pub async fn expire_before(&self, date: NaiveDate) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE cards
            SET status = 'EXPIRED'
            WHERE status = 'ACTIVE' AND expiration_date < $1
            "#,
        )
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete a card together with everything referencing it.
    ///
    /// The referencing rows go first, in one transaction; there is no
    /// reliance on database-level cascades.
    pub async fn delete(&self, card_id: i64) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM transfers WHERE from_card_id = $1 OR to_card_id = $1")
            .bind(card_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM block_requests WHERE card_id = $1")
            .bind(card_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM cards WHERE id = $1")
            .bind(card_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(deleted > 0)
    }
}
