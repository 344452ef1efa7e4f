//! Remote mirror client.

use std::future::Future;
use std::time::Duration;

use uuid::Uuid;

use super::{SyncError, SyncPayload};

/// The authoritative network-backed copy of the user's data.
///
/// Both operations are idempotent upserts keyed by record id; pushing the
/// same state twice is a no-op on the service side.
pub trait RemoteMirror: Send + Sync {
    /// Upload the full local state.
    fn push(
        &self,
        user_id: Uuid,
        payload: &SyncPayload,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Download the mirror's current state.
    fn fetch(&self, user_id: Uuid) -> impl Future<Output = Result<SyncPayload, SyncError>> + Send;
}

/// HTTP client for the remote mirror service.
pub struct HttpRemote {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpRemote {
    /// Create a client against the given service base URL.
    pub fn new(base_url: String, token: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn state_url(&self, user_id: Uuid) -> String {
        format!("{}/v1/users/{}/state", self.base_url, user_id)
    }
}

impl RemoteMirror for HttpRemote {
    async fn push(&self, user_id: Uuid, payload: &SyncPayload) -> Result<(), SyncError> {
        let response = self
            .http
            .put(self.state_url(user_id))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(user = %user_id, records = payload.record_count(), "Pushed state");
        Ok(())
    }

    async fn fetch(&self, user_id: Uuid) -> Result<SyncPayload, SyncError> {
        let response = self
            .http
            .get(self.state_url(user_id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let payload = response.json::<SyncPayload>().await?;
        tracing::debug!(user = %user_id, records = payload.record_count(), "Fetched state");
        Ok(payload)
    }
}
