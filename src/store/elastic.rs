//! Search index backend over the REST API
//!
//! ## Requests
//!
//! | Operation | Request |
//! |---|---|
//! | connect | `GET /` (reads the cluster version) |
//! | ping | `HEAD /` |
//! | search | `POST /{index}/_search` |
//! | mark | `POST /{index}/_update/{id}` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Certificate, Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::backend::AlertStore;
use super::error::{StoreError, StoreResult};
use crate::AlertRecord;
use crate::config::StoreConfig;

#[derive(Debug, Deserialize)]
struct ClusterInfo {
    version: ClusterVersion,
}

#[derive(Debug, Deserialize)]
struct ClusterVersion {
    number: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

/// Search index client
///
/// The HTTP client is built on `connect` and dropped on `close`; every other call
/// fails with `StoreError::NotConnected` in between.
pub struct ElasticStore {
    config: StoreConfig,
    client: RwLock<Option<Client>>,
}

impl ElasticStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    async fn build_client(&self) -> StoreResult<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout))
            .danger_accept_invalid_certs(!self.config.verify_certs);

        if let Some(path) = &self.config.ca_certs {
            let pem = tokio::fs::read(path).await?;
            let certificate = Certificate::from_pem(&pem).map_err(|e| {
                StoreError::InvalidConfig(format!("bad CA bundle {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        builder
            .build()
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))
    }

    fn endpoint(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = Url::parse(&self.config.base_url())
            .map_err(|e| StoreError::InvalidConfig(format!("bad store address: {e}")))?;

        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidConfig("store address cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn request(&self, client: &Client, method: Method, url: Url) -> RequestBuilder {
        client
            .request(method, url)
            .basic_auth(&self.config.username, self.config.password.as_deref())
    }

    async fn current_client(&self) -> StoreResult<Client> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotConnected)
    }
}

async fn failure_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("status {status}: {body}")
}

#[async_trait]
impl AlertStore for ElasticStore {
    #[instrument(skip(self), fields(url = %self.config.base_url()))]
    async fn connect(&self) -> StoreResult<String> {
        let client = self.build_client().await?;
        let response = self
            .request(&client, Method::GET, self.endpoint(&[])?)
            .send()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::ConnectionFailed(failure_detail(response).await));
        }

        let info: ClusterInfo = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        *self.client.write().await = Some(client);
        info!("connected to search index version {}", info.version.number);

        Ok(info.version.number)
    }

    async fn ping(&self) -> bool {
        let Ok(client) = self.current_client().await else {
            return false;
        };
        let Ok(url) = self.endpoint(&[]) else {
            return false;
        };

        match self.request(&client, Method::HEAD, url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("store ping failed: {e}");
                false
            }
        }
    }

    #[instrument(skip(self), fields(index = %index))]
    async fn search_unprocessed(
        &self,
        index: &str,
        limit: usize,
    ) -> StoreResult<Vec<AlertRecord>> {
        let client = self.current_client().await?;
        let query = json!({
            "query": { "bool": { "must": [ { "term": { "processed": false } } ] } },
            "sort": [ { "timestamp": { "order": "asc" } } ],
            "size": limit
        });

        let response = self
            .request(&client, Method::POST, self.endpoint(&[index, "_search"])?)
            .json(&query)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(StoreError::IndexNotFound(index.to_string())),
            status if !status.is_success() => {
                return Err(StoreError::QueryFailed(failure_detail(response).await));
            }
            _ => {}
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        let records: Vec<AlertRecord> = body
            .hits
            .hits
            .into_iter()
            .map(|hit| AlertRecord::new(hit.index, hit.id, hit.source))
            .collect();

        debug!("found {} unprocessed record(s)", records.len());
        Ok(records)
    }

    #[instrument(skip(self, at), fields(index = %index))]
    async fn mark_processed(&self, index: &str, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let client = self.current_client().await?;
        let update = json!({
            "doc": {
                "processed": true,
                "processed_at": at.to_rfc3339_opts(SecondsFormat::Micros, true)
            }
        });

        let response = self
            .request(&client, Method::POST, self.endpoint(&[index, "_update", id])?)
            .json(&update)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::QueryFailed(failure_detail(response).await))
        }
    }

    async fn close(&self) -> StoreResult<()> {
        if self.client.write().await.take().is_some() {
            info!("search index connection closed");
        } else {
            warn!("search index connection was already closed");
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "elasticsearch"
    }
}
