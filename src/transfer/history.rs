//! Transfer history and statistics
//!
//! Read side over the append-only transfer ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use crate::domain::Identity;
use crate::error::AppError;

use super::TransferRecord;

/// Aggregate statistics for one card
#[derive(Debug, Clone, Serialize)]
pub struct CardStats {
    pub card_id: i64,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub incoming_count: i64,
    pub outgoing_count: i64,
}

/// Aggregate statistics for one user, summed across all their cards
#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub user_id: i64,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub incoming_count: i64,
    pub outgoing_count: i64,
}

type TransferRow = (i64, i64, i64, Decimal, String, Option<String>, DateTime<Utc>);

fn map_row(row: TransferRow) -> TransferRecord {
    let (id, from_card_id, to_card_id, amount, status, description, transfer_date) = row;
    TransferRecord {
        id,
        from_card_id,
        to_card_id,
        amount,
        status,
        description,
        transfer_date,
    }
}

/// Transfer history queries
#[derive(Debug, Clone)]
pub struct TransferHistory {
    pool: PgPool,
}

impl TransferHistory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All transfers where the user owns either side, newest first
    pub async fn by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransferRecord>, AppError> {
        let rows: Vec<TransferRow> = sqlx::query_as(
            r#"
            SELECT t.id, t.from_card_id, t.to_card_id, t.amount, t.status,
                   t.description, t.transfer_date
            FROM transfers t
            JOIN cards fc ON fc.id = t.from_card_id
            JOIN cards tc ON tc.id = t.to_card_id
            WHERE fc.owner_id = $1 OR tc.owner_id = $1
            ORDER BY t.transfer_date DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_row).collect())
    }

    /// Transfers touching one card, newest first.
    ///
    /// Regular users may only see their own cards and get the non-leaking
    /// AccessDenied otherwise; admins see any card.
    pub async fn by_card(
        &self,
        card_id: i64,
        identity: &Identity,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransferRecord>, AppError> {
        self.check_card_visibility(card_id, identity).await?;

        let rows: Vec<TransferRow> = sqlx::query_as(
            r#"
            SELECT id, from_card_id, to_card_id, amount, status, description, transfer_date
            FROM transfers
            WHERE from_card_id = $1 OR to_card_id = $1
            ORDER BY transfer_date DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(card_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(map_row).collect())
    }

    /// Income/expense totals and operation counts for one card
    pub async fn card_stats(
        &self,
        card_id: i64,
        identity: &Identity,
    ) -> Result<CardStats, AppError> {
        self.check_card_visibility(card_id, identity).await?;

        let (total_income, total_expense, incoming_count, outgoing_count): (
            Decimal,
            Decimal,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(amount) FILTER (WHERE to_card_id = $1), 0),
                COALESCE(SUM(amount) FILTER (WHERE from_card_id = $1), 0),
                COUNT(*) FILTER (WHERE to_card_id = $1),
                COUNT(*) FILTER (WHERE from_card_id = $1)
            FROM transfers
            WHERE from_card_id = $1 OR to_card_id = $1
            "#,
        )
        .bind(card_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CardStats {
            card_id,
            total_income,
            total_expense,
            incoming_count,
            outgoing_count,
        })
    }

    /// Income/expense totals and operation counts summed across a user's
    /// cards. Regular users may only query themselves.
    pub async fn user_stats(
        &self,
        user_id: i64,
        identity: &Identity,
    ) -> Result<UserStats, AppError> {
        if !identity.is_admin() && identity.user_id != user_id {
            return Err(AppError::AccessDenied);
        }

        let (total_income, total_expense, incoming_count, outgoing_count): (
            Decimal,
            Decimal,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(t.amount) FILTER (WHERE tc.owner_id = $1), 0),
                COALESCE(SUM(t.amount) FILTER (WHERE fc.owner_id = $1), 0),
                COUNT(*) FILTER (WHERE tc.owner_id = $1),
                COUNT(*) FILTER (WHERE fc.owner_id = $1)
            FROM transfers t
            JOIN cards fc ON fc.id = t.from_card_id
            JOIN cards tc ON tc.id = t.to_card_id
            WHERE fc.owner_id = $1 OR tc.owner_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UserStats {
            user_id,
            total_income,
            total_expense,
            incoming_count,
            outgoing_count,
        })
    }

    /// Ownership gate shared by the per-card reads
    async fn check_card_visibility(
        &self,
        card_id: i64,
        identity: &Identity,
    ) -> Result<(), AppError> {
        let owner_id: Option<i64> = sqlx::query_scalar("SELECT owner_id FROM cards WHERE id = $1")
            .bind(card_id)
            .fetch_optional(&self.pool)
            .await?;

        if identity.is_admin() {
            return match owner_id {
                Some(_) => Ok(()),
                None => Err(AppError::CardNotFound(card_id)),
            };
        }

        match owner_id {
            Some(owner_id) if owner_id == identity.user_id => Ok(()),
            _ => Err(AppError::AccessDenied),
        }
    }
}
