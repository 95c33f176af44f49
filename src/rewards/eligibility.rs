use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::ledger::models::UserPosition;
use crate::config::SETTLEMENT_PERIOD_SECS;

/// A position earns rewards once it has been held this long
pub const ELIGIBILITY_DELAY_SECS: i64 = 60;

/// A user's total stake on one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPosition {
    pub target_id: String,
    pub amount: u64,
    /// Placement time of the first bet reported for the target
    pub placed_at: Option<DateTime<Utc>>,
}

/// Positions without a known placement time are never eligible
pub fn is_eligible(placed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match placed_at {
        Some(placed_at) => now - placed_at >= TimeDelta::seconds(ELIGIBILITY_DELAY_SECS),
        None => false,
    }
}

/// Sums positions per target, preserving the order targets first appear in
pub fn aggregate_positions(positions: &[UserPosition]) -> Vec<AggregatedPosition> {
    let mut aggregated: Vec<AggregatedPosition> = Vec::new();

    for position in positions {
        match aggregated
            .iter_mut()
            .find(|entry| entry.target_id == position.target_id)
        {
            Some(entry) => entry.amount = entry.amount.saturating_add(position.bet_amount),
            None => aggregated.push(AggregatedPosition {
                target_id: position.target_id.clone(),
                amount: position.bet_amount,
                placed_at: position.placed_at,
            }),
        }
    }

    aggregated
}

/// Whole seconds until the next minute boundary, 0 exactly on a boundary
pub fn time_until_next_settlement(now: DateTime<Utc>) -> Duration {
    let period = SETTLEMENT_PERIOD_SECS as i64;
    let elapsed = now.timestamp().rem_euclid(period);
    Duration::from_secs(((period - elapsed) % period) as u64)
}
