// Projected return rate for a target, mirroring the ledger's settlement
// distribution. All arithmetic is f64 and keeps the ledger's operation order
// so the displayed figures match the authoritative ones.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ledger::models::{PoolSnapshot, Target};

/// Rank weights for ranks 1..=10; every rank past 10 gets the last entry
pub const RANK_WEIGHTS: [u32; 10] = [15, 14, 13, 12, 11, 10, 9, 8, 7, 6];
pub const FLOOR_RANK_WEIGHT: u32 = 6;
pub const TOTAL_WEIGHT: u32 = sum_weights(&RANK_WEIGHTS);

/// Share of platform volume distributed per cycle, in percent
pub const DISTRIBUTION_PCT: f64 = 1.0;
pub const SUPPORTER_BONUS_CAP_PCT: f64 = 10.0;
pub const NEW_TARGET_BONUS_PCT: f64 = 5.0;
pub const NEW_TARGET_WINDOW_DAYS: f64 = 7.0;
/// Daily reward ceiling as a multiple of the stake
pub const DAILY_CAP_MULTIPLIER: f64 = 1.5;
pub const MIN_ADJUSTMENT_FACTOR: f64 = 0.8;
pub const MIN_DISPLAY_RATE_PCT: f64 = 1.0;

const MILLIS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

const fn sum_weights(weights: &[u32; 10]) -> u32 {
    let mut total = 0;
    let mut i = 0;
    while i < weights.len() {
        total += weights[i];
        i += 1;
    }
    total
}

/// Every intermediate quantity of one estimate, kept for audit
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RewardBreakdown {
    pub total_bets_across_targets: f64,
    pub effective_bet_amount: f64,
    pub distribution_pool: f64,
    pub rank_weight: f64,
    pub total_weight: f64,
    pub base_reward: f64,
    pub supporter_bonus_pct: f64,
    pub growth_bonus_pct: f64,
    pub new_target_bonus_pct: f64,
    pub total_bonus_pct: f64,
    pub total_reward: f64,
    pub user_share_ratio: f64,
    pub raw_user_reward: f64,
    pub daily_cap: f64,
    pub capped_reward: f64,
    pub hourly_rate_pct: f64,
    pub user_share_pct: f64,
    pub adjustment_factor: f64,
    pub adjusted_hourly_rate: f64,
    pub daily_rate_pct: f64,
    pub final_rate_pct: f64,
}

impl RewardBreakdown {
    /// Result for a target nobody has bet on
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn display_rate(&self) -> String {
        format_rate(self.final_rate_pct)
    }
}

/// Stake used for display: users without a position see the 1-unit rate
pub fn effective_bet_amount(bet_amount: u64) -> u64 {
    if bet_amount > 0 {
        bet_amount
    } else {
        1
    }
}

pub fn rank_index(rank: u32) -> usize {
    (rank.clamp(1, 10) - 1) as usize
}

pub fn rank_weight(rank: u32) -> u32 {
    RANK_WEIGHTS
        .get(rank_index(rank))
        .copied()
        .unwrap_or(FLOOR_RANK_WEIGHT)
}

pub fn supporter_bonus_pct(supporter_count: u32) -> f64 {
    (supporter_count as f64 * 1.0).min(SUPPORTER_BONUS_CAP_PCT)
}

/// Tapering bonus for ranks 6..=10 (5, 4, 3, 2, 1), as the ledger pays it.
///
/// Ranks past 10 share rank 10's index, so they get 1 like their floor weight.
pub fn growth_bonus_pct(rank_index: usize) -> f64 {
    if rank_index >= 5 {
        (10 - rank_index) as f64 * 1.0
    } else {
        0.0
    }
}

pub fn new_target_bonus_pct(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match created_at {
        Some(created_at) => {
            let days = (now - created_at).num_milliseconds() as f64 / MILLIS_PER_DAY;
            if days < NEW_TARGET_WINDOW_DAYS {
                NEW_TARGET_BONUS_PCT
            } else {
                0.0
            }
        }
        None => 0.0,
    }
}

/// Large shares of a target's pool taper the rate, floored at 80%
pub fn adjustment_factor(user_share_pct: f64) -> f64 {
    MIN_ADJUSTMENT_FACTOR.max(1.0 - user_share_pct / 200.0)
}

/// Projects the daily return rate of `bet_amount` staked on `target`.
///
/// Pure: the result depends only on the arguments.
pub fn estimate(
    snapshot: &PoolSnapshot,
    target: &Target,
    bet_amount: u64,
    now: DateTime<Utc>,
) -> RewardBreakdown {
    if target.total_bet == 0 {
        return RewardBreakdown::zero();
    }

    let effective_bet_amount = effective_bet_amount(bet_amount) as f64;
    let target_total = target.total_bet as f64;

    // An empty platform total falls back to the target's own volume
    let total_bets_across_targets = match snapshot.total_bet_across_targets() {
        0 => target_total,
        total => total as f64,
    };
    let distribution_pool = (total_bets_across_targets * DISTRIBUTION_PCT) / 100.0;

    let rank_index = rank_index(target.rank);
    let rank_weight = rank_weight(target.rank) as f64;
    let total_weight = TOTAL_WEIGHT as f64;
    let base_reward = (distribution_pool * rank_weight) / total_weight;

    let supporter_bonus_pct = supporter_bonus_pct(target.supporter_count);
    let growth_bonus_pct = growth_bonus_pct(rank_index);
    let new_target_bonus_pct = new_target_bonus_pct(target.created_at, now);
    let total_bonus_pct = supporter_bonus_pct + growth_bonus_pct + new_target_bonus_pct;
    let total_reward = base_reward * (100.0 + total_bonus_pct) / 100.0;

    let user_share_ratio = effective_bet_amount / target_total;
    let raw_user_reward = total_reward * user_share_ratio;
    let daily_cap = effective_bet_amount * DAILY_CAP_MULTIPLIER;
    let capped_reward = raw_user_reward.min(daily_cap);

    let hourly_rate_pct = (capped_reward / effective_bet_amount) * 100.0;
    let user_share_pct = (effective_bet_amount / target_total) * 100.0;
    let adjustment_factor = adjustment_factor(user_share_pct);
    let adjusted_hourly_rate = hourly_rate_pct * adjustment_factor;
    let daily_rate_pct = adjusted_hourly_rate * 24.0;
    let final_rate_pct = MIN_DISPLAY_RATE_PCT.max(daily_rate_pct);

    RewardBreakdown {
        total_bets_across_targets,
        effective_bet_amount,
        distribution_pool,
        rank_weight,
        total_weight,
        base_reward,
        supporter_bonus_pct,
        growth_bonus_pct,
        new_target_bonus_pct,
        total_bonus_pct,
        total_reward,
        user_share_ratio,
        raw_user_reward,
        daily_cap,
        capped_reward,
        hourly_rate_pct,
        user_share_pct,
        adjustment_factor,
        adjusted_hourly_rate,
        daily_rate_pct,
        final_rate_pct,
    }
}

/// `"0%"` for the zero rate, otherwise one decimal with a `%` suffix.
///
/// Exact ties round away from zero (`1.25` -> `"1.3%"`), matching the
/// rounding the betting frontend applies.
pub fn format_rate(rate_pct: f64) -> String {
    if rate_pct == 0.0 {
        return "0%".to_string();
    }
    format!("{}%", to_fixed_1(rate_pct))
}

fn to_fixed_1(value: f64) -> String {
    let scaled = value * 10.0;
    let exact = value.mul_add(10.0, -scaled) == 0.0;
    if exact && scaled.abs().fract() == 0.5 {
        let rounded = scaled.trunc() + scaled.signum();
        return format!("{:.1}", rounded / 10.0);
    }
    format!("{:.1}", value)
}
