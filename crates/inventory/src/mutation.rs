use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult, StockKey};

use crate::operation::StockOperationType;
use crate::stock::{StockLevels, StockRecord};

/// Append-only audit entry written for every ledger change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMutation {
    pub key: StockKey,
    /// Position in the key's log, starting at 1, in the order mutations were applied.
    pub sequence: u64,
    pub operation: StockOperationType,
    /// Units the caller asked to move (signed for adjustments).
    pub quantity: i64,
    pub previous_stock: StockLevels,
    pub new_stock: StockLevels,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl StockMutation {
    /// Record the change from `before` to `after`.
    pub fn between(
        sequence: u64,
        operation: StockOperationType,
        quantity: i64,
        before: &StockRecord,
        after: &StockRecord,
        reference: Option<String>,
    ) -> Self {
        Self {
            key: after.key(),
            sequence,
            operation,
            quantity,
            previous_stock: before.levels(),
            new_stock: after.levels(),
            reference,
            occurred_at: after.last_updated_at(),
        }
    }

    pub fn on_hand_delta(&self) -> i64 {
        self.new_stock.on_hand - self.previous_stock.on_hand
    }

    pub fn reserved_delta(&self) -> i64 {
        self.new_stock.reserved - self.previous_stock.reserved
    }

    /// Units that left the shelf through a completed sale.
    pub fn sold_units(&self) -> i64 {
        if self.operation == StockOperationType::Sale {
            (-self.on_hand_delta()).max(0)
        } else {
            0
        }
    }
}

/// Check that a key's log replays cleanly: sequences are gap-free from 1 and
/// each entry starts where the previous one ended.
pub fn verify_chain(mutations: &[StockMutation]) -> DomainResult<()> {
    let mut expected_seq = 1;
    let mut last: Option<StockLevels> = None;
    for m in mutations {
        if m.sequence != expected_seq {
            return Err(DomainError::consistency(format!(
                "sequence gap on {}: expected {expected_seq}, found {}",
                m.key, m.sequence
            )));
        }
        if let Some(prev) = last {
            if prev != m.previous_stock {
                return Err(DomainError::consistency(format!(
                    "broken chain on {} at sequence {}: previous entry ended at {:?}, this one starts at {:?}",
                    m.key, m.sequence, prev, m.previous_stock
                )));
            }
        }
        last = Some(m.new_stock);
        expected_seq += 1;
    }
    Ok(())
}
