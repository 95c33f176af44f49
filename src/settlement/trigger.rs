use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::TriggerError;
use crate::ledger::graphql::SETTLE_MUTATION;
use crate::ledger::LedgerClient;

/// Issues one settlement request. Owns no scheduling state.
#[async_trait]
pub trait SettlementTrigger: Send + Sync {
    async fn trigger(&self) -> Result<(), TriggerError>;
}

/// Sends the `settle` mutation to the betting application
pub struct LedgerSettlementTrigger {
    client: Arc<LedgerClient>,
    caller: String,
}

impl LedgerSettlementTrigger {
    pub fn new(client: Arc<LedgerClient>, caller: String) -> Self {
        Self { client, caller }
    }
}

#[async_trait]
impl SettlementTrigger for LedgerSettlementTrigger {
    async fn trigger(&self) -> Result<(), TriggerError> {
        info!("📤 Sending settlement request to {}", self.client.endpoint());

        let response = self
            .client
            .execute::<Value>(SETTLE_MUTATION, json!({ "caller": self.caller }))
            .await?;

        match response.error_messages() {
            Some(errors) => Err(TriggerError::Application(errors)),
            None => Ok(()),
        }
    }
}

/// Runs a single settlement and logs the outcome. Never fails past this point.
pub async fn run_once(trigger: &dyn SettlementTrigger) -> Result<(), TriggerError> {
    info!("🔄 Running settlement...");

    let result = trigger.trigger().await;
    match &result {
        Ok(()) => info!("✓ Settlement completed successfully"),
        Err(TriggerError::Application(errors)) => {
            error!("❌ Settlement failed with errors: {:?}", errors)
        }
        Err(e) => error!("❌ Settlement request failed: {}", e),
    }

    info!(
        "Settlement run completed with status: {}",
        if result.is_ok() { "SUCCESS" } else { "FAILED" }
    );
    result
}
