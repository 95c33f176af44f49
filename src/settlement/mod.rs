// Settlement cadence and the request it drives
pub mod scheduler;
pub mod trigger;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::TriggerError;

pub use scheduler::SettlementScheduler;
pub use trigger::{run_once, LedgerSettlementTrigger, SettlementTrigger};

/// One scheduler tick that reached the ledger. Terminal once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementCycle {
    pub id: Uuid,
    /// Minute boundary the cycle was scheduled for
    pub scheduled_at: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl SettlementCycle {
    pub fn completed(
        id: Uuid,
        scheduled_at: DateTime<Utc>,
        fired_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        result: &Result<(), TriggerError>,
    ) -> Self {
        Self {
            id,
            scheduled_at,
            fired_at,
            finished_at,
            succeeded: result.is_ok(),
            error_detail: result.as_ref().err().map(ToString::to_string),
        }
    }
}
