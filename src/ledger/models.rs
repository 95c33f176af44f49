use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{AppError, AppResult};

// ========== WIRE RECORDS ==========
//
// The ledger's GraphQL layer is loosely typed: amounts show up as numbers or
// strings, ranks and supporter counts may be missing. Records are converted
// into the typed models below exactly once.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    pub app_id: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub total_bet: Option<Value>,
    #[serde(default)]
    pub rank: Option<Value>,
    #[serde(default)]
    pub supporters: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfoRecord {
    pub app_id: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub added_at: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetRecord {
    pub app_id: Value,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct AllAppsForBettingData {
    #[serde(rename = "getAllAppsForBetting", default)]
    pub apps: Vec<TargetRecord>,
}

#[derive(Debug, Deserialize)]
pub struct AllAppsData {
    #[serde(rename = "getAllApps", default)]
    pub apps: Vec<AppInfoRecord>,
}

#[derive(Debug, Deserialize)]
pub struct UserBetsData {
    #[serde(rename = "getUserBets", default)]
    pub bets: Vec<BetRecord>,
}

// ========== DOMAIN MODELS ==========

/// A bettable application competing for the reward pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub total_bet: u64,
    /// 1-based, 1 = best
    pub rank: u32,
    pub supporter_count: u32,
    /// `None` when the ledger has no registration record for the target
    pub created_at: Option<DateTime<Utc>>,
}

impl Target {
    pub fn from_record(record: &TargetRecord, created_at: Option<DateTime<Utc>>) -> AppResult<Self> {
        let id = parse_id(&record.app_id)?;
        let rank = parse_amount(record.rank.as_ref(), "rank")?;
        let supporters = parse_amount(record.supporters.as_ref(), "supporters")?;

        Ok(Self {
            name: record
                .name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("App {}", id)),
            total_bet: parse_amount(record.total_bet.as_ref(), "totalBet")?,
            rank: u32::try_from(rank.max(1)).unwrap_or(u32::MAX),
            supporter_count: u32::try_from(supporters).unwrap_or(u32::MAX),
            created_at,
            id,
        })
    }
}

/// Immutable view of the betting pool at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    targets: Vec<Target>,
    total_bet_across_targets: u64,
    fetched_at: DateTime<Utc>,
}

impl PoolSnapshot {
    /// Builds a snapshot, computing the platform total from the targets
    pub fn new(targets: Vec<Target>, fetched_at: DateTime<Utc>) -> Self {
        let targets = dedup_targets(targets);
        let total = targets
            .iter()
            .fold(0u64, |acc, target| acc.saturating_add(target.total_bet));
        Self {
            targets,
            total_bet_across_targets: total,
            fetched_at,
        }
    }

    /// Builds a snapshot with an explicit platform total
    #[cfg(test)]
    pub fn with_total(targets: Vec<Target>, total_bet_across_targets: u64, fetched_at: DateTime<Utc>) -> Self {
        Self {
            targets: dedup_targets(targets),
            total_bet_across_targets,
            fetched_at,
        }
    }

    /// Joins the betting totals with the registration records
    pub fn from_records(
        targets: &[TargetRecord],
        apps: &[AppInfoRecord],
        fetched_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let mut registry = HashMap::new();
        for app in apps {
            let id = parse_id(&app.app_id)?;
            let added_at = match app.added_at.as_ref().filter(|v| !v.is_null()) {
                Some(added_at) => Some(parse_ledger_timestamp(added_at)?),
                None => None,
            };
            registry.insert(id, (added_at, app.name.as_deref()));
        }

        let targets = targets
            .iter()
            .map(|record| {
                let id = parse_id(&record.app_id)?;
                let (created_at, registered_name) =
                    registry.get(&id).copied().unwrap_or((None, None));
                let mut target = Target::from_record(record, created_at)?;
                // the betting totals may omit names the registry has
                if let Some(name) = registered_name.filter(|n| !n.is_empty()) {
                    if record.name.as_deref().map_or(true, str::is_empty) {
                        target.name = name.to_string();
                    }
                }
                Ok(target)
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self::new(targets, fetched_at))
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, id: &str) -> Option<&Target> {
        self.targets.iter().find(|target| target.id == id)
    }

    pub fn total_bet_across_targets(&self) -> u64 {
        self.total_bet_across_targets
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// One bet held by a user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPosition {
    pub target_id: String,
    pub bet_amount: u64,
    pub placed_at: Option<DateTime<Utc>>,
}

impl TryFrom<&BetRecord> for UserPosition {
    type Error = AppError;

    fn try_from(record: &BetRecord) -> AppResult<Self> {
        let placed_at = match record.timestamp.as_ref().filter(|v| !v.is_null()) {
            Some(timestamp) => Some(parse_ledger_timestamp(timestamp)?),
            None => None,
        };

        Ok(Self {
            target_id: parse_id(&record.app_id)?,
            bet_amount: parse_amount(record.amount.as_ref(), "amount")?,
            placed_at,
        })
    }
}

fn dedup_targets(targets: Vec<Target>) -> Vec<Target> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| {
            let fresh = seen.insert(target.id.clone());
            if !fresh {
                warn!("Duplicate target {} in snapshot, keeping first entry", target.id);
            }
            fresh
        })
        .collect()
}

// ========== BOUNDARY COERCION ==========

fn parse_id(value: &Value) -> AppResult<String> {
    match value {
        Value::String(id) if !id.is_empty() => Ok(id.clone()),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(AppError::InvalidInput(format!("Invalid appId: {}", other))),
    }
}

/// Non-negative integer from a JSON number or numeric string. Missing or null is 0.
pub fn parse_amount(value: Option<&Value>, field: &str) -> AppResult<u64> {
    let invalid = || AppError::InvalidInput(format!("Invalid {}: {:?}", field, value));

    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) => Ok(v),
            None => n.as_f64().and_then(integral).ok_or_else(invalid),
        },
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(0);
            }
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
                .ok_or_else(invalid)
        }
        Some(_) => Err(invalid()),
    }
}

fn integral(v: f64) -> Option<u64> {
    (v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64).then(|| v as u64)
}

/// Converts a ledger timestamp into the canonical `DateTime<Utc>`.
///
/// Numbers and numeric strings are microseconds since the Unix epoch, the
/// ledger's native unit. RFC 3339 strings are accepted as well.
pub fn parse_ledger_timestamp(value: &Value) -> AppResult<DateTime<Utc>> {
    let invalid = || AppError::InvalidInput(format!("Invalid ledger timestamp: {}", value));

    let micros = match value {
        Value::Number(n) => n.as_i64().ok_or_else(invalid)?,
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(micros) => micros,
                Err(_) => {
                    return DateTime::parse_from_rfc3339(s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|_| invalid());
                }
            }
        }
        _ => return Err(invalid()),
    };

    from_micros(micros).ok_or_else(invalid)
}

pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}
