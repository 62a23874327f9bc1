//! Transfer engine
//!
//! Executes a money movement between two cards as one atomic unit: both card
//! rows are locked for the duration of the transaction, every precondition
//! is checked in order, and the debit, credit and transfer record land
//! together or not at all.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::card::{Card, CardRepository, CardStatus};
use crate::crypto::SecretCodec;
use crate::domain::{Amount, DomainError, Identity};
use crate::error::AppError;

use super::{TransferCommand, TransferOutcome, TRANSFER_COMPLETED};

/// Executes card-to-card transfers
#[derive(Debug, Clone)]
pub struct TransferEngine {
    pool: PgPool,
    codec: SecretCodec,
}

impl TransferEngine {
    pub fn new(pool: PgPool, codec: SecretCodec) -> Self {
        Self { pool, codec }
    }

    /// Execute the transfer command.
    ///
    /// On any precondition failure the transaction rolls back and nothing is
    /// persisted; no partial debit/credit state is ever observable.
    pub async fn execute(
        &self,
        command: TransferCommand,
        identity: &Identity,
    ) -> Result<TransferOutcome, AppError> {
        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        // Lock both rows in ascending id order; concurrent transfers sharing
        // a card serialize here instead of deadlocking or double-spending
        // past the balance check.
        let (lo, hi) = if command.from_card_id <= command.to_card_id {
            (command.from_card_id, command.to_card_id)
        } else {
            (command.to_card_id, command.from_card_id)
        };

        let lo_card = CardRepository::lock_for_update(&mut tx, lo).await?;
        let hi_card = if hi == lo {
            None
        } else {
            CardRepository::lock_for_update(&mut tx, hi).await?
        };

        let (mut from_card, mut to_card) = if command.from_card_id == lo {
            (lo_card, hi_card)
        } else {
            (hi_card, lo_card)
        };

        // Same-card transfers surface the one locked row on both sides so
        // the check sequence sees them in contract order.
        if command.from_card_id == command.to_card_id {
            to_card = from_card.clone();
        }

        check_transfer(
            from_card.as_ref(),
            to_card.as_ref(),
            identity,
            &amount,
            command.cvv.as_deref(),
            &self.codec,
        )?;

        // Checks passed; both cards exist from here on.
        let mut from_card = from_card
            .take()
            .ok_or_else(|| AppError::Internal("from card vanished after checks".to_string()))?;
        let mut to_card = to_card
            .take()
            .ok_or_else(|| AppError::Internal("to card vanished after checks".to_string()))?;

        from_card.debit(&amount)?;
        to_card.credit(&amount)?;

        CardRepository::update_in_tx(&mut tx, &from_card).await?;
        CardRepository::update_in_tx(&mut tx, &to_card).await?;

        let (transfer_id, transfer_date): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO transfers (from_card_id, to_card_id, amount, status, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, transfer_date
            "#,
        )
        .bind(from_card.id())
        .bind(to_card.id())
        .bind(amount.value())
        .bind(TRANSFER_COMPLETED)
        .bind(&command.description)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            transfer_id,
            from_card_id = from_card.id(),
            to_card_id = to_card.id(),
            amount = %amount,
            transfer_date = %transfer_date,
            "Transfer completed"
        );

        Ok(TransferOutcome {
            transfer_id,
            from_card_id: from_card.id(),
            to_card_id: to_card.id(),
            amount: amount.value(),
            status: TRANSFER_COMPLETED.to_string(),
        })
    }
}

/// The transfer precondition sequence, in contract order. Each failure is
/// terminal for the attempt.
///
/// Pure over already-loaded cards so the sequence is testable without a
/// database.
fn check_transfer(
    from_card: Option<&Card>,
    to_card: Option<&Card>,
    identity: &Identity,
    amount: &Amount,
    cvv: Option<&str>,
    codec: &SecretCodec,
) -> Result<(), AppError> {
    // 1. The requester must own the source card. A missing card and a card
    //    owned by someone else produce the same error so callers cannot
    //    probe which card ids exist.
    let from_card = match from_card {
        Some(card) if card.owner_id() == identity.user_id => card,
        _ => return Err(AppError::AccessDenied),
    };

    // 2. The destination must exist; same non-leaking error.
    let to_card = match to_card {
        Some(card) => card,
        None => return Err(AppError::AccessDenied),
    };

    // 3. CVV verification, if the caller supplied one.
    if let Some(candidate) = cvv {
        if !from_card.verify_cvv(codec, candidate)? {
            return Err(DomainError::InvalidCvv.into());
        }
    }

    // 4. Distinct cards.
    if from_card.id() == to_card.id() {
        return Err(DomainError::SameCardTransfer.into());
    }

    // 5. Both sides active; the error names which side is not.
    if from_card.status() != CardStatus::Active {
        return Err(DomainError::CardNotActive {
            card_id: from_card.id(),
        }
        .into());
    }
    if to_card.status() != CardStatus::Active {
        return Err(DomainError::CardNotActive {
            card_id: to_card.id(),
        }
        .into());
    }

    // 6. Sufficient funds.
    if !from_card.can_debit(amount) {
        return Err(DomainError::insufficient_funds(
            amount.value(),
            from_card.balance().value(),
        )
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{generate_pan, pan_fingerprint};
    use crate::crypto::EncryptionKey;
    use crate::domain::Balance;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn codec() -> SecretCodec {
        SecretCodec::new(&EncryptionKey::generate())
    }

    fn card(codec: &SecretCodec, id: i64, owner_id: i64, balance: i64, status: CardStatus) -> Card {
        let pan = generate_pan();
        Card::from_db(
            id,
            owner_id,
            codec.encrypt(&pan).unwrap(),
            pan_fingerprint(&pan),
            "Holder".to_string(),
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            codec.encrypt("123").unwrap(),
            Balance::new(Decimal::new(balance, 0)).unwrap(),
            status,
            None,
        )
    }

    fn amount(value: i64) -> Amount {
        Amount::from_integer(value).unwrap()
    }

    #[test]
    fn test_checks_pass_on_happy_path() {
        let codec = codec();
        let from = card(&codec, 1, 10, 1000, CardStatus::Active);
        let to = card(&codec, 2, 20, 500, CardStatus::Active);

        let result = check_transfer(
            Some(&from),
            Some(&to),
            &Identity::user(10),
            &amount(100),
            Some("123"),
            &codec,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_and_foreign_from_card_are_indistinguishable() {
        let codec = codec();
        let foreign = card(&codec, 1, 999, 1000, CardStatus::Active);
        let to = card(&codec, 2, 20, 500, CardStatus::Active);
        let identity = Identity::user(10);

        let missing = check_transfer(None, Some(&to), &identity, &amount(100), None, &codec);
        let not_owned = check_transfer(
            Some(&foreign),
            Some(&to),
            &identity,
            &amount(100),
            None,
            &codec,
        );

        assert!(matches!(missing, Err(AppError::AccessDenied)));
        assert!(matches!(not_owned, Err(AppError::AccessDenied)));
    }

    #[test]
    fn test_missing_destination_is_access_denied() {
        let codec = codec();
        let from = card(&codec, 1, 10, 1000, CardStatus::Active);

        let result = check_transfer(
            Some(&from),
            None,
            &Identity::user(10),
            &amount(100),
            None,
            &codec,
        );
        assert!(matches!(result, Err(AppError::AccessDenied)));
    }

    #[test]
    fn test_wrong_cvv_rejected() {
        let codec = codec();
        let from = card(&codec, 1, 10, 1000, CardStatus::Active);
        let to = card(&codec, 2, 20, 500, CardStatus::Active);

        let result = check_transfer(
            Some(&from),
            Some(&to),
            &Identity::user(10),
            &amount(100),
            Some("999"),
            &codec,
        );
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::InvalidCvv))
        ));
    }

    #[test]
    fn test_same_card_rejected() {
        let codec = codec();
        let from = card(&codec, 1, 10, 1000, CardStatus::Active);

        let result = check_transfer(
            Some(&from),
            Some(&from),
            &Identity::user(10),
            &amount(100),
            None,
            &codec,
        );
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::SameCardTransfer))
        ));
    }

    #[test]
    fn test_inactive_sides_are_named() {
        let codec = codec();
        let identity = Identity::user(10);

        let from_blocked = card(&codec, 1, 10, 1000, CardStatus::Blocked);
        let to = card(&codec, 2, 20, 500, CardStatus::Active);
        let result = check_transfer(
            Some(&from_blocked),
            Some(&to),
            &identity,
            &amount(100),
            None,
            &codec,
        );
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::CardNotActive { card_id: 1 }))
        ));

        let from = card(&codec, 1, 10, 1000, CardStatus::Active);
        let to_expired = card(&codec, 2, 20, 500, CardStatus::Expired);
        let result = check_transfer(
            Some(&from),
            Some(&to_expired),
            &identity,
            &amount(100),
            None,
            &codec,
        );
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::CardNotActive { card_id: 2 }))
        ));
    }

    #[test]
    fn test_insufficient_funds_last() {
        let codec = codec();
        let from = card(&codec, 1, 10, 50, CardStatus::Active);
        let to = card(&codec, 2, 20, 500, CardStatus::Active);

        let result = check_transfer(
            Some(&from),
            Some(&to),
            &Identity::user(10),
            &amount(100),
            None,
            &codec,
        );
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::InsufficientFunds { .. }))
        ));
    }

    #[test]
    fn test_ownership_checked_before_cvv() {
        // A caller probing someone else's card with a bad CVV learns nothing
        // beyond AccessDenied.
        let codec = codec();
        let foreign = card(&codec, 1, 999, 1000, CardStatus::Active);
        let to = card(&codec, 2, 20, 500, CardStatus::Active);

        let result = check_transfer(
            Some(&foreign),
            Some(&to),
            &Identity::user(10),
            &amount(100),
            Some("999"),
            &codec,
        );
        assert!(matches!(result, Err(AppError::AccessDenied)));
    }
}
