//! Card operations
//!
//! Orchestrates card creation and administration on top of the repository
//! and the secret codec. Every operation takes the caller's identity and
//! checks capability explicitly.

use chrono::{Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::crypto::SecretCodec;
use crate::domain::Identity;
use crate::error::AppError;
use crate::user::UserRepository;

use super::{generate_cvv, generate_pan, pan_fingerprint, Card, CardRepository, CardStatus, NewCard};

/// Default card validity when the request does not pin a date
const DEFAULT_VALIDITY_MONTHS: u32 = 48;

/// Attempts to find an unused PAN before giving up
const PAN_GENERATION_ATTEMPTS: usize = 5;

/// Command to issue a new card for a user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCardCommand {
    pub owner_id: i64,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

/// Command to update a card's mutable fields.
///
/// The holder is not settable directly; it always tracks the owning user's
/// current name and is re-derived on every update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCardCommand {
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

/// Display-safe card representation.
///
/// The only number form that ever crosses the API boundary; the CVV never
/// appears in any response.
#[derive(Debug, Clone, Serialize)]
pub struct CardView {
    pub id: i64,
    pub masked_number: String,
    pub holder: String,
    pub expiration_date: NaiveDate,
    pub balance: Decimal,
    pub status: CardStatus,
    pub owner_id: i64,
}

impl CardView {
    pub fn from_card(card: &Card, codec: &SecretCodec) -> Result<Self, AppError> {
        Ok(Self {
            id: card.id(),
            masked_number: card.masked_number(codec)?,
            holder: card.holder().to_string(),
            expiration_date: card.expiration_date(),
            balance: card.balance().value(),
            status: card.status(),
            owner_id: card.owner_id(),
        })
    }
}

/// Card administration service
#[derive(Debug, Clone)]
pub struct CardService {
    cards: CardRepository,
    users: UserRepository,
    codec: SecretCodec,
}

impl CardService {
    pub fn new(pool: PgPool, codec: SecretCodec) -> Self {
        Self {
            cards: CardRepository::new(pool.clone()),
            users: UserRepository::new(pool),
            codec,
        }
    }

    /// Issue a new card for a user (admin capability).
    ///
    /// Generates PAN and CVV, stores both only as ciphertext, and derives the
    /// holder field from the owning user's name.
    pub async fn create_for_user(
        &self,
        command: CreateCardCommand,
        identity: &Identity,
    ) -> Result<CardView, AppError> {
        require_admin(identity)?;

        let owner = self.users.get(command.owner_id).await?;
        if !owner.is_active {
            return Err(AppError::InvalidRequest(format!(
                "User {} is deactivated",
                owner.id
            )));
        }

        let pan = self.unused_pan().await?;
        let cvv = generate_cvv();

        let expiration_date = match command.expiration_date {
            Some(date) => date,
            None => default_expiration(),
        };

        let new_card = NewCard {
            owner_id: owner.id,
            number_encrypted: self.codec.encrypt(&pan)?,
            number_hash: pan_fingerprint(&pan),
            holder: owner.holder_name(),
            expiration_date,
            cvv_encrypted: self.codec.encrypt(&cvv)?,
        };

        let card = self.cards.insert(new_card).await?;

        tracing::info!(
            card_id = card.id(),
            owner_id = owner.id,
            "Card issued"
        );

        CardView::from_card(&card, &self.codec)
    }

    /// Fetch one card, scoped by capability.
    ///
    /// Regular users get the same AccessDenied whether the card is missing or
    /// owned by someone else; admins get a real NotFound.
    pub async fn get(&self, card_id: i64, identity: &Identity) -> Result<CardView, AppError> {
        let card = self.load_owned(card_id, identity).await?;
        CardView::from_card(&card, &self.codec)
    }

    /// List cards: all of them for admins, own cards for regular users
    pub async fn list(
        &self,
        identity: &Identity,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CardView>, AppError> {
        let cards = if identity.is_admin() {
            self.cards.list(limit, offset).await?
        } else {
            self.cards.find_by_owner(identity.user_id).await?
        };

        cards
            .iter()
            .map(|card| CardView::from_card(card, &self.codec))
            .collect()
    }

    /// Update holder / expiration (admin capability)
    pub async fn update(
        &self,
        card_id: i64,
        command: UpdateCardCommand,
        identity: &Identity,
    ) -> Result<CardView, AppError> {
        require_admin(identity)?;

        let mut card = self
            .cards
            .find_by_id(card_id)
            .await?
            .ok_or(AppError::CardNotFound(card_id))?;

        // Holder tracks the owner's current name
        let owner = self.users.get(card.owner_id()).await?;
        card.set_holder(owner.holder_name());

        if let Some(date) = command.expiration_date {
            card.set_expiration_date(date);
        }

        self.cards.update(&card).await?;
        CardView::from_card(&card, &self.codec)
    }

    /// Delete a card and all rows referencing it (admin capability)
    pub async fn delete(&self, card_id: i64, identity: &Identity) -> Result<(), AppError> {
        require_admin(identity)?;

        if !self.cards.delete(card_id).await? {
            return Err(AppError::CardNotFound(card_id));
        }

        tracing::info!(card_id, "Card deleted");
        Ok(())
    }

    /// ACTIVE → BLOCKED (admin capability)
    pub async fn block(&self, card_id: i64, identity: &Identity) -> Result<CardView, AppError> {
        require_admin(identity)?;

        let mut card = self
            .cards
            .find_by_id(card_id)
            .await?
            .ok_or(AppError::CardNotFound(card_id))?;

        card.block()?;
        self.cards.update(&card).await?;

        tracing::info!(card_id, "Card blocked");
        CardView::from_card(&card, &self.codec)
    }

    /// BLOCKED → ACTIVE (admin capability)
    pub async fn activate(&self, card_id: i64, identity: &Identity) -> Result<CardView, AppError> {
        require_admin(identity)?;

        let mut card = self
            .cards
            .find_by_id(card_id)
            .await?
            .ok_or(AppError::CardNotFound(card_id))?;

        card.activate()?;
        self.cards.update(&card).await?;

        tracing::info!(card_id, "Card activated");
        CardView::from_card(&card, &self.codec)
    }

    /// Masked views of all cards with a pending block request (for the
    /// block-request admin surface)
    pub async fn views_with_pending_requests(&self) -> Result<Vec<CardView>, AppError> {
        let cards = self.cards.find_with_pending_requests().await?;
        cards
            .iter()
            .map(|card| CardView::from_card(card, &self.codec))
            .collect()
    }

    /// Load a card the caller may see, with the non-leaking error contract
    async fn load_owned(&self, card_id: i64, identity: &Identity) -> Result<Card, AppError> {
        let card = self.cards.find_by_id(card_id).await?;

        if identity.is_admin() {
            return card.ok_or(AppError::CardNotFound(card_id));
        }

        match card {
            Some(card) if card.owner_id() == identity.user_id => Ok(card),
            // Missing and foreign cards are indistinguishable to a regular user
            _ => Err(AppError::AccessDenied),
        }
    }

    /// Generate a PAN whose fingerprint is not yet in use
    async fn unused_pan(&self) -> Result<String, AppError> {
        for _ in 0..PAN_GENERATION_ATTEMPTS {
            let pan = generate_pan();
            if !self.cards.number_hash_exists(&pan_fingerprint(&pan)).await? {
                return Ok(pan);
            }
        }

        Err(AppError::AlreadyExists(
            "Could not generate an unused card number".to_string(),
        ))
    }
}

/// Reject non-admin callers
pub(crate) fn require_admin(identity: &Identity) -> Result<(), AppError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("admin role required".to_string()))
    }
}

fn default_expiration() -> NaiveDate {
    let today = Utc::now().date_naive();
    today
        .checked_add_months(Months::new(DEFAULT_VALIDITY_MONTHS))
        .unwrap_or(today)
}
