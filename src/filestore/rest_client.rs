use super::{FilestoreService, InstanceDetails, OperationDetails, OperationHandle, SnapshotDetails};
use crate::config::FilestoreSettings;
use crate::error::ServiceError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

// Refresh metadata tokens this long before they actually expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSnapshotsResponse {
    #[serde(default)]
    snapshots: Vec<SnapshotDetails>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Filestore v1 REST client.
pub struct RestFilestoreClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    static_token: Option<String>,
    metadata_token_url: String,
    cached_token: Mutex<Option<CachedToken>>,
}

impl RestFilestoreClient {
    pub fn new(settings: &FilestoreSettings) -> Result<Self, ServiceError> {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            timeout,
            static_token: settings.access_token.clone().filter(|t| !t.is_empty()),
            metadata_token_url: settings.metadata_token_url.clone(),
            cached_token: Mutex::new(None),
        })
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.endpoint, resource.trim_matches('/'))
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        let mut cached = self.cached_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .get(&self.metadata_token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| ServiceError::Auth(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ServiceError::Auth(format!(
                "metadata server answered {}",
                response.status()
            )));
        }
        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| ServiceError::Auth(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!("Fetched access token valid for {}s", lifetime.as_secs());
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let token = self.access_token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))
    }

    fn map_transport_error(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout(self.timeout)
        } else {
            ServiceError::from(err)
        }
    }

    async fn parse<T: DeserializeOwned>(&self, response: Response) -> Result<T, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("Filestore API answered {}: {}", status, body);
            return Err(api_error(status));
        }
        response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

fn api_error(status: StatusCode) -> ServiceError {
    ServiceError::Api {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}

#[async_trait::async_trait]
impl FilestoreService for RestFilestoreClient {
    async fn get_instance(&self, name: &str) -> Result<Option<InstanceDetails>, ServiceError> {
        let response = self.send(self.client.get(self.url(name))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.parse(response).await.map(Some)
    }

    async fn list_snapshots(&self, parent: &str) -> Result<Vec<SnapshotDetails>, ServiceError> {
        let url = format!("{}/snapshots", self.url(parent));
        let mut snapshots = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: ListSnapshotsResponse = self.parse(self.send(request).await?).await?;
            snapshots.extend(page.snapshots);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(snapshots)
    }

    async fn create_snapshot(
        &self,
        parent: &str,
        snapshot_id: &str,
    ) -> Result<OperationHandle, ServiceError> {
        let request = self
            .client
            .post(format!("{}/snapshots", self.url(parent)))
            .query(&[("snapshotId", snapshot_id)])
            .json(&serde_json::json!({}));
        self.parse(self.send(request).await?).await
    }

    async fn delete_snapshot(&self, name: &str) -> Result<OperationHandle, ServiceError> {
        let request = self.client.delete(self.url(name));
        self.parse(self.send(request).await?).await
    }

    async fn get_operation(&self, name: &str) -> Result<OperationDetails, ServiceError> {
        let request = self.client.get(self.url(name));
        self.parse(self.send(request).await?).await
    }
}
