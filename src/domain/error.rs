//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

/// Business rule violations and domain invariant failures.
/// Independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Insufficient balance for debit operation
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    /// Card is not in ACTIVE status
    #[error("Card {card_id} is not active")]
    CardNotActive { card_id: i64 },

    /// Card is expired; expired is a terminal state
    #[error("Card {card_id} is expired")]
    CardExpired { card_id: i64 },

    /// Illegal status transition
    #[error("Cannot transition card from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Transfer to same card
    #[error("Cannot transfer to the same card")]
    SameCardTransfer,

    /// Supplied CVV does not match the card's CVV
    #[error("Invalid CVV code")]
    InvalidCvv,

    /// A PENDING block request already exists for the card
    #[error("You already have a pending block request for this card")]
    DuplicatePendingRequest,

    /// Block request is not in PENDING status
    #[error("Only pending requests can be {action}")]
    RequestNotPending { action: &'static str },

    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    ) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Check if this is a client error (caller's fault, not a system fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::CardNotActive { .. }
                | Self::CardExpired { .. }
                | Self::InvalidTransition { .. }
                | Self::SameCardTransfer
                | Self::InvalidCvv
                | Self::DuplicatePendingRequest
                | Self::RequestNotPending { .. }
                | Self::InvalidAmount(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_insufficient_funds_error() {
        let err = DomainError::insufficient_funds(Decimal::new(100, 0), Decimal::new(50, 0));

        assert!(err.is_client_error());
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_request_not_pending_message() {
        let err = DomainError::RequestNotPending { action: "approved" };
        assert_eq!(err.to_string(), "Only pending requests can be approved");
    }

    #[test]
    fn test_duplicate_pending_message() {
        let err = DomainError::DuplicatePendingRequest;
        assert_eq!(
            err.to_string(),
            "You already have a pending block request for this card"
        );
    }
}
