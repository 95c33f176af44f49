use chrono::{DateTime, Utc};

use super::eligibility::time_until_next_settlement;
use super::estimator::estimate;
use super::{project_positions, project_targets};
use crate::ledger::models::{PoolSnapshot, UserPosition};

/// Plain-text rates table for the `rates` command.
///
/// `what_if_bet` replaces the user's stake on every target when given.
pub fn render_rates(
    snapshot: &PoolSnapshot,
    positions: &[UserPosition],
    what_if_bet: Option<u64>,
    now: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        format!(
            "Pool: {} targets, {} total bet (snapshot {})",
            snapshot.targets().len(),
            snapshot.total_bet_across_targets(),
            snapshot.fetched_at().format("%Y-%m-%d %H:%M:%S UTC")
        ),
        String::new(),
        format!(
            "{:<6} {:<24} {:>10} {:>14} {:>12} {:>8}",
            "RANK", "TARGET", "SUPPORTERS", "TOTAL BET", "YOUR BET", "RATE"
        ),
    ];

    for projection in project_targets(snapshot, positions, now) {
        let (user_bet, breakdown) = match what_if_bet {
            Some(bet) => (bet, estimate(snapshot, &projection.target, bet, now)),
            None => (projection.user_bet, projection.breakdown),
        };
        lines.push(format!(
            "{:<6} {:<24} {:>10} {:>14} {:>12} {:>8}",
            format!("#{}", projection.target.rank),
            projection.target.name,
            projection.target.supporter_count,
            projection.target.total_bet,
            user_bet,
            breakdown.display_rate()
        ));
    }

    if !positions.is_empty() {
        lines.push(String::new());
        lines.push("Your positions:".to_string());
        for projection in project_positions(snapshot, positions, now) {
            let status = if !projection.target_known {
                "target no longer listed"
            } else if projection.eligible {
                "eligible"
            } else {
                "pending (held < 1 min)"
            };
            lines.push(format!(
                "  {:<24} {:>12} {:>8}  {}",
                projection.position.target_id,
                projection.position.amount,
                projection.breakdown.display_rate(),
                status
            ));
        }
    }

    let countdown = time_until_next_settlement(now);
    lines.push(String::new());
    lines.push(format!("Next settlement in {}s", countdown.as_secs()));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::Target;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 45).unwrap()
    }

    fn snapshot() -> PoolSnapshot {
        let target = |id: &str, name: &str, total_bet: u64, rank: u32| Target {
            id: id.to_string(),
            name: name.to_string(),
            total_bet,
            rank,
            supporter_count: 3,
            created_at: None,
        };
        PoolSnapshot::new(
            vec![target("a", "Alpha", 600, 1), target("b", "Beta", 400, 2)],
            now(),
        )
    }

    #[test]
    fn test_renders_targets_and_countdown() {
        let rendered = render_rates(&snapshot(), &[], None, now());

        assert!(rendered.starts_with("Pool: 2 targets, 1000 total bet"));
        assert!(rendered.contains("#1"));
        assert!(rendered.contains("Alpha"));
        assert!(rendered.contains("Beta"));
        assert!(rendered.contains('%'));
        assert!(!rendered.contains("Your positions"));
        assert!(rendered.ends_with("Next settlement in 15s"));
    }

    #[test]
    fn test_countdown_reads_zero_on_boundary() {
        let boundary = Utc.with_ymd_and_hms(2024, 6, 1, 12, 1, 0).unwrap();
        let rendered = render_rates(&snapshot(), &[], None, boundary);
        assert!(rendered.ends_with("Next settlement in 0s"));
    }

    #[test]
    fn test_what_if_bet_applies_to_every_target() {
        let snapshot = snapshot();
        let rendered = render_rates(&snapshot, &[], Some(250), now());

        let alpha = snapshot.target("a").unwrap();
        let expected = estimate(&snapshot, alpha, 250, now()).display_rate();
        let alpha_line = rendered.lines().find(|l| l.contains("Alpha")).unwrap();
        assert!(alpha_line.contains("250"));
        assert!(alpha_line.trim_end().ends_with(&expected));
    }

    #[test]
    fn test_positions_show_eligibility() {
        let positions = vec![
            UserPosition {
                target_id: "a".to_string(),
                bet_amount: 100,
                placed_at: Some(now() - TimeDelta::minutes(10)),
            },
            UserPosition {
                target_id: "b".to_string(),
                bet_amount: 20,
                placed_at: Some(now() - TimeDelta::seconds(10)),
            },
            UserPosition {
                target_id: "gone".to_string(),
                bet_amount: 5,
                placed_at: None,
            },
        ];

        let rendered = render_rates(&snapshot(), &positions, None, now());

        assert!(rendered.contains("Your positions:"));
        let line = |id: &str| {
            rendered
                .lines()
                .find(|l| l.trim_start().starts_with(id) && l.starts_with("  "))
                .unwrap()
                .to_string()
        };
        assert!(line("a").ends_with("eligible"));
        assert!(line("b").ends_with("pending (held < 1 min)"));
        assert!(line("gone").contains("0%"));
        assert!(line("gone").ends_with("target no longer listed"));
    }
}
