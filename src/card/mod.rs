//! Card entity and lifecycle
//!
//! The money-bearing entity of the ledger. Owns the status state machine and
//! the balance mutation primitives; everything that changes a card's balance
//! or status goes through the methods here so the invariants hold in one
//! place.

pub mod repository;
pub mod service;

pub use repository::{CardRepository, NewCard};
pub use service::{CardService, CardView, CreateCardCommand, UpdateCardCommand};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{self, CryptoError, SecretCodec};
use crate::domain::{Amount, Balance, DomainError};

/// Card status state machine.
///
/// ACTIVE ⇄ BLOCKED via admin block/activate; ACTIVE → EXPIRED via the
/// expiration sweep only. EXPIRED is terminal: no transition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardStatus {
    Active,
    Blocked,
    Expired,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "ACTIVE",
            CardStatus::Blocked => "BLOCKED",
            CardStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(CardStatus::Active),
            "BLOCKED" => Some(CardStatus::Blocked),
            "EXPIRED" => Some(CardStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for CardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bank card account.
///
/// `number` and `cvv` are held only in encrypted form; the clear PAN exists
/// transiently inside the codec boundary and surfaces only as the masked
/// form.
#[derive(Debug, Clone)]
pub struct Card {
    id: i64,
    owner_id: i64,
    number_encrypted: String,
    number_hash: String,
    holder: String,
    expiration_date: NaiveDate,
    cvv_encrypted: String,
    balance: Balance,
    status: CardStatus,
    created_at: Option<DateTime<Utc>>,
}

impl Card {
    /// Rehydrate a card from its stored row
    #[allow(clippy::too_many_arguments)]
    pub fn from_db(
        id: i64,
        owner_id: i64,
        number_encrypted: String,
        number_hash: String,
        holder: String,
        expiration_date: NaiveDate,
        cvv_encrypted: String,
        balance: Balance,
        status: CardStatus,
        created_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
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
        }
    }

    // =========================================================================
    // Balance primitives
    // =========================================================================

    /// True iff the card is ACTIVE and holds at least `amount`
    pub fn can_debit(&self, amount: &Amount) -> bool {
        self.status == CardStatus::Active && self.balance.is_sufficient_for(amount)
    }

    /// Withdraw from the card.
    ///
    /// Fails (rather than panicking or going negative) so callers can tell a
    /// business-rule rejection from an unexpected error.
    pub fn debit(&mut self, amount: &Amount) -> Result<(), DomainError> {
        if self.status != CardStatus::Active {
            return Err(DomainError::CardNotActive { card_id: self.id });
        }
        if !self.balance.is_sufficient_for(amount) {
            return Err(DomainError::insufficient_funds(
                amount.value(),
                self.balance.value(),
            ));
        }

        self.balance = self
            .balance
            .debit(amount)
            .map_err(|_| DomainError::insufficient_funds(amount.value(), self.balance.value()))?;
        Ok(())
    }

    /// Deposit onto the card.
    ///
    /// Credit itself does not check status; whether a BLOCKED or EXPIRED card
    /// may receive money is the caller's policy decision (the transfer engine
    /// checks both sides are ACTIVE before invoking this).
    pub fn credit(&mut self, amount: &Amount) -> Result<(), DomainError> {
        self.balance = self
            .balance
            .credit(amount)
            .map_err(|e| DomainError::InvalidAmount(e.to_string()))?;
        Ok(())
    }

    // =========================================================================
    // Status transitions
    // =========================================================================

    /// ACTIVE → BLOCKED (admin capability, checked by callers)
    pub fn block(&mut self) -> Result<(), DomainError> {
        match self.status {
            CardStatus::Active => {
                self.status = CardStatus::Blocked;
                Ok(())
            }
            CardStatus::Blocked => Err(DomainError::InvalidTransition {
                from: "BLOCKED".to_string(),
                to: "BLOCKED".to_string(),
            }),
            CardStatus::Expired => Err(DomainError::CardExpired { card_id: self.id }),
        }
    }

    /// BLOCKED → ACTIVE
    pub fn activate(&mut self) -> Result<(), DomainError> {
        match self.status {
            CardStatus::Blocked => {
                self.status = CardStatus::Active;
                Ok(())
            }
            CardStatus::Active => Err(DomainError::InvalidTransition {
                from: "ACTIVE".to_string(),
                to: "ACTIVE".to_string(),
            }),
            CardStatus::Expired => Err(DomainError::CardExpired { card_id: self.id }),
        }
    }

    /// True if the card's expiration date lies strictly before `date`
    pub fn is_expired_as_of(&self, date: NaiveDate) -> bool {
        self.expiration_date < date
    }

    // =========================================================================
    // Sensitive-field access
    // =========================================================================

    /// Display-safe number: decrypt, keep the last 4, mask the rest.
    /// The full PAN never leaves this call.
    pub fn masked_number(&self, codec: &SecretCodec) -> Result<String, CryptoError> {
        let pan = codec.decrypt(&self.number_encrypted)?;
        Ok(crypto::mask_pan(&pan))
    }

    /// Compare a candidate CVV against the card's stored CVV
    pub fn verify_cvv(&self, codec: &SecretCodec, candidate: &str) -> Result<bool, CryptoError> {
        let cvv = codec.decrypt(&self.cvv_encrypted)?;
        Ok(cvv == candidate)
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }

    pub fn number_hash(&self) -> &str {
        &self.number_hash
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn set_holder(&mut self, holder: String) {
        self.holder = holder;
    }

    pub fn expiration_date(&self) -> NaiveDate {
        self.expiration_date
    }

    pub fn set_expiration_date(&mut self, date: NaiveDate) {
        self.expiration_date = date;
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    pub fn status(&self) -> CardStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

// =========================================================================
// PAN generation and fingerprinting
// =========================================================================

/// Test BIN prefix for generated card numbers
const PAN_PREFIX: &str = "4000";

/// Generate a 16-digit PAN with the test BIN prefix
pub fn generate_pan() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();

    let mut pan = String::from(PAN_PREFIX);
    for _ in 0..12 {
        pan.push_str(&rng.gen_range(0..10).to_string());
    }
    pan
}

/// Generate a 3-digit CVV
pub fn generate_cvv() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    format!("{:03}", rng.gen_range(100..1000))
}

/// Deterministic fingerprint of a PAN for uniqueness checks.
///
/// Ciphertexts are nonce-randomized, so duplicate detection keys on this
/// digest instead of the stored ciphertext.
pub fn pan_fingerprint(pan: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pan.as_bytes());
    hex::encode(hasher.finalize())
}
