//! reqwest-backed implementation of [`DashboardApi`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    BlockRequest, DashboardApi, IpDetail, NoteRequest, ReleaseRequest, Settings, SettingsUpdate,
};
use crate::config;
use crate::core::{AuditEntry, Flow, Summary};
use crate::error::AppError;

/// HTTP client for the monitoring server's JSON API.
#[derive(Debug, Clone)]
pub struct HttpDashboardClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpDashboardClient {
    /// Create a client for `base_url` (e.g. `http://localhost:5000`).
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        Self::with_timeout(base_url, Duration::from_secs(config::HTTP_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_value(&self, path: &str) -> Result<serde_json::Value, AppError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await?;
        read_json(response).await
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<serde_json::Value, AppError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, AppError> {
    let status = response.status();
    if !status.is_success() {
        tracing::debug!("{} answered {status}", response.url());
        return Err(AppError::ServerRejection {
            status: status.as_u16(),
        });
    }
    Ok(response.json().await?)
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, AppError> {
    Ok(serde_json::from_value(value)?)
}

impl DashboardApi for HttpDashboardClient {
    async fn fetch_flows(&self, limit: usize) -> Result<Vec<Flow>, AppError> {
        let value = self.get_value(&format!("/api/flows?limit={limit}")).await?;
        Flow::list_from_value(value)
    }

    async fn fetch_summary(&self) -> Result<Summary, AppError> {
        decode(self.get_value("/api/summary").await?)
    }

    async fn fetch_ip(&self, ip: &str) -> Result<IpDetail, AppError> {
        let detail: IpDetail = decode(self.get_value(&format!("/api/ip/{ip}")).await?)?;
        detail.validate()?;
        Ok(detail)
    }

    async fn block(&self, req: BlockRequest) -> Result<(), AppError> {
        self.post("/api/block", &req).await?;
        tracing::info!("Blocked {} ({}) as {}", req.ip, req.reason, req.operator);
        Ok(())
    }

    async fn release(&self, req: ReleaseRequest) -> Result<(), AppError> {
        self.post("/api/release", &req).await?;
        tracing::info!("Released {} as {}", req.ip, req.operator);
        Ok(())
    }

    async fn add_note(&self, req: NoteRequest) -> Result<(), AppError> {
        self.post("/api/notes", &req).await?;
        Ok(())
    }

    async fn fetch_logs(&self, limit: usize) -> Result<Vec<AuditEntry>, AppError> {
        decode(self.get_value(&format!("/api/logs?limit={limit}")).await?)
    }

    async fn fetch_settings(&self) -> Result<Settings, AppError> {
        decode(self.get_value("/api/settings").await?)
    }

    async fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, AppError> {
        update.validate()?;
        decode(self.post("/api/settings", &update).await?)
    }
}
