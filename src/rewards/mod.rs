// Display-only reward projections computed from the latest pool snapshot
pub mod eligibility;
pub mod estimator;
pub mod report;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ledger::models::{PoolSnapshot, Target, UserPosition};
use eligibility::{aggregate_positions, is_eligible, AggregatedPosition};
use estimator::{estimate, RewardBreakdown};

/// Projected rate of one target for one user
#[derive(Debug, Clone, Serialize)]
pub struct TargetProjection {
    pub target: Target,
    pub user_bet: u64,
    pub breakdown: RewardBreakdown,
}

/// A user's aggregated stake with its projected rate and eligibility
#[derive(Debug, Clone, Serialize)]
pub struct PositionProjection {
    pub position: AggregatedPosition,
    pub target_known: bool,
    pub eligible: bool,
    pub breakdown: RewardBreakdown,
}

/// Rates for every target in the snapshot, as seen by the holder of `positions`
pub fn project_targets(
    snapshot: &PoolSnapshot,
    positions: &[UserPosition],
    now: DateTime<Utc>,
) -> Vec<TargetProjection> {
    let aggregated = aggregate_positions(positions);

    snapshot
        .targets()
        .iter()
        .map(|target| {
            let user_bet = aggregated
                .iter()
                .find(|p| p.target_id == target.id)
                .map(|p| p.amount)
                .unwrap_or(0);
            TargetProjection {
                target: target.clone(),
                user_bet,
                breakdown: estimate(snapshot, target, user_bet, now),
            }
        })
        .collect()
}

/// Rates and eligibility for each target the user holds.
///
/// Targets missing from the snapshot project a zero rate.
pub fn project_positions(
    snapshot: &PoolSnapshot,
    positions: &[UserPosition],
    now: DateTime<Utc>,
) -> Vec<PositionProjection> {
    aggregate_positions(positions)
        .into_iter()
        .map(|position| {
            let target = snapshot.target(&position.target_id);
            let breakdown = target
                .map(|t| estimate(snapshot, t, position.amount, now))
                .unwrap_or_else(RewardBreakdown::zero);
            PositionProjection {
                eligible: is_eligible(position.placed_at, now),
                target_known: target.is_some(),
                breakdown,
                position,
            }
        })
        .collect()
}
