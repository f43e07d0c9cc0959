//! HTTP client for the event indexer.

use super::{DataSourceError, EventQuery, IndexerSource};
use crate::domain::{decode_events, EventKind, LedgerEvent};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Observed ceiling on events returned per query.
pub const DEFAULT_EVENT_LIMIT: usize = 10_000;

#[derive(Debug, Clone)]
pub struct HttpIndexer {
    client: Client,
    base_url: String,
}

impl HttpIndexer {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn events_url(&self, kind: EventKind) -> String {
        let path = match kind {
            EventKind::Supply => "supply",
            EventKind::Withdraw => "withdraw",
        };
        format!("{}/v1/events/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_events(&self, query: &EventQuery) -> Result<serde_json::Value, DataSourceError> {
        let url = self.events_url(query.kind);
        let params = [
            ("pool", query.pool_id.to_string()),
            ("position", query.position_key.to_string()),
            ("limit", query.limit.to_string()),
        ];
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(10)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&params)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

/// Pull the event array out of either a bare array or a `{"data": [...]}` page.
fn event_array(response: &serde_json::Value) -> Result<&Vec<serde_json::Value>, DataSourceError> {
    response
        .as_array()
        .or_else(|| response.get("data").and_then(|d| d.as_array()))
        .ok_or_else(|| DataSourceError::ParseError("Expected array response".to_string()))
}

#[async_trait]
impl IndexerSource for HttpIndexer {
    async fn fetch_events(&self, query: &EventQuery) -> Result<Vec<LedgerEvent>, DataSourceError> {
        debug!(
            "Fetching {} events for position={}, pool={}, limit={}",
            query.kind,
            query.position_key.short(),
            query.pool_id.short(),
            query.limit
        );

        let response = self.get_events(query).await?;
        let events = decode_events(query.kind, event_array(&response)?)?;

        if events.len() >= query.limit {
            tracing::warn!(
                position_key = %query.position_key.short(),
                kind = %query.kind,
                limit = query.limit,
                "Event query hit its result ceiling; history may be truncated"
            );
        }

        Ok(events)
    }
}
