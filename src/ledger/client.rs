use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::graphql::{
    GraphQlRequest, GraphQlResponse, ALL_APPS_FOR_BETTING_QUERY, ALL_APPS_QUERY, USER_BETS_QUERY,
};
use super::models::{AllAppsData, AllAppsForBettingData, PoolSnapshot, UserBetsData, UserPosition};
use crate::error::{AppError, AppResult};

/// Supplies pool snapshots and user positions to the reward estimator
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> AppResult<PoolSnapshot>;

    async fn fetch_positions(&self, owner: &str) -> AppResult<Vec<UserPosition>>;
}

/// HTTP client for the betting application's GraphQL endpoint
pub struct LedgerClient {
    client: Client,
    endpoint: String,
}

impl LedgerClient {
    pub fn new(endpoint: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one GraphQL document. Non-2xx statuses are returned as errors.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<GraphQlResponse<T>, reqwest::Error> {
        let request = GraphQlRequest { query, variables };

        self.client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<GraphQlResponse<T>>()
            .await
    }

    /// Like `execute`, but treats an error list or a missing `data` as failure
    pub async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> AppResult<T> {
        let response = self.execute::<T>(query, variables).await?;

        if let Some(errors) = response.error_messages() {
            return Err(AppError::ExternalError(format!(
                "GraphQL errors: {}",
                errors.join("; ")
            )));
        }

        response
            .data
            .ok_or_else(|| AppError::NotFound("GraphQL response without data".to_string()))
    }
}

#[async_trait]
impl SnapshotSource for LedgerClient {
    async fn fetch_snapshot(&self) -> AppResult<PoolSnapshot> {
        let (totals, registry) = tokio::join!(
            self.query::<AllAppsForBettingData>(ALL_APPS_FOR_BETTING_QUERY, json!({})),
            self.query::<AllAppsData>(ALL_APPS_QUERY, json!({})),
        );

        let totals = totals?;
        let registry = match registry {
            Ok(registry) => registry.apps,
            Err(e) => {
                // Creation times only feed the new-target bonus
                warn!("⚠️ Could not load app registry, new-target bonus disabled: {}", e);
                Vec::new()
            }
        };

        let snapshot = PoolSnapshot::from_records(&totals.apps, &registry, Utc::now())?;
        debug!(
            "📊 Snapshot: {} targets, {} total bet",
            snapshot.targets().len(),
            snapshot.total_bet_across_targets()
        );
        Ok(snapshot)
    }

    async fn fetch_positions(&self, owner: &str) -> AppResult<Vec<UserPosition>> {
        let data = self
            .query::<UserBetsData>(USER_BETS_QUERY, json!({ "owner": owner }))
            .await?;

        data.bets.iter().map(UserPosition::try_from).collect()
    }
}
