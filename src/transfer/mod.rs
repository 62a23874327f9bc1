//! Transfer module
//!
//! Atomic money movement between two cards, plus the read side over the
//! resulting append-only ledger.

pub mod engine;
pub mod history;

pub use engine::TransferEngine;
pub use history::{CardStats, TransferHistory, UserStats};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Status value stamped onto persisted transfers.
/// Failed attempts are never persisted, so this is the only value.
pub const TRANSFER_COMPLETED: &str = "COMPLETED";

/// One completed money movement. Created only by the engine, immutable
/// thereafter.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub id: i64,
    pub from_card_id: i64,
    pub to_card_id: i64,
    pub amount: Decimal,
    pub status: String,
    pub description: Option<String>,
    pub transfer_date: DateTime<Utc>,
}

/// Command to move money between two cards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_card_id: i64,
    pub to_card_id: i64,
    /// Amount as string for precise decimal
    pub amount: String,
    /// Optional CVV verification of the source card
    pub cvv: Option<String>,
    /// Optional memo
    pub description: Option<String>,
}

impl TransferCommand {
    pub fn new(from_card_id: i64, to_card_id: i64, amount: String) -> Self {
        Self {
            from_card_id,
            to_card_id,
            amount,
            cvv: None,
            description: None,
        }
    }

    pub fn with_cvv(mut self, cvv: String) -> Self {
        self.cvv = Some(cvv);
        self
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }
}

/// Result of a successful transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transfer_id: i64,
    pub from_card_id: i64,
    pub to_card_id: i64,
    pub amount: Decimal,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_command_builder() {
        let cmd = TransferCommand::new(1, 2, "100.00".to_string())
            .with_cvv("123".to_string())
            .with_description("Test payment".to_string());

        assert_eq!(cmd.amount, "100.00");
        assert_eq!(cmd.cvv, Some("123".to_string()));
        assert_eq!(cmd.description, Some("Test payment".to_string()));
    }
}
