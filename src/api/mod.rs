//! HTTP contract with the monitoring server.
//!
//! [`DashboardApi`] is the seam between the view logic and the network; the
//! production implementation is [`HttpDashboardClient`]. Payload schemas live
//! here and are validated when decoded.

pub mod client;
#[cfg(test)]
pub(crate) mod fake;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AuditEntry, Flow, FlowStatus, Summary};
use crate::error::AppError;

pub use client::HttpDashboardClient;

/// Body of `POST /api/block`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockRequest {
    pub ip: String,
    pub reason: String,
    pub operator: String,
}

/// Body of `POST /api/release`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseRequest {
    pub ip: String,
    pub operator: String,
    pub note: String,
}

/// Body of `POST /api/notes`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteRequest {
    pub ip: String,
    pub operator: String,
    pub note: String,
}

/// Server-side automation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub auto_block: bool,
    pub threshold: f64,
}

/// Partial update for `POST /api/settings`; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_block: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl SettingsUpdate {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.auto_block.is_none() && self.threshold.is_none() {
            return Err(AppError::InvalidInput("settings update is empty".into()));
        }
        if let Some(t) = self.threshold {
            if !t.is_finite() || !(0.0..=1.0).contains(&t) {
                return Err(AppError::InvalidInput(format!(
                    "threshold {t} must be between 0 and 1"
                )));
            }
        }
        Ok(())
    }
}

/// An operator note attached to an IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    #[serde(deserialize_with = "crate::core::flow::de_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub operator: String,
    pub text: String,
}

/// Everything the server knows about one IP (`GET /api/ip/{ip}`).
///
/// An IP the server learned about only through a block has no metrics, so
/// every metric is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpDetail {
    pub ip: String,
    #[serde(default = "default_status")]
    pub status: FlowStatus,
    #[serde(default)]
    pub ddos_probability: Option<f64>,
    #[serde(default)]
    pub flow_bytes_s: Option<f64>,
    #[serde(default)]
    pub flow_packets_s: Option<f64>,
    #[serde(default)]
    pub dst_ip: Option<String>,
    #[serde(default)]
    pub dst_port: Option<u16>,
    #[serde(default)]
    pub notes: Vec<NoteRecord>,
    #[serde(default)]
    pub blocked_by: Option<String>,
    #[serde(default)]
    pub block_reason: Option<String>,
    #[serde(default, deserialize_with = "crate::core::flow::de_opt_timestamp")]
    pub blocked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub released_by: Option<String>,
    #[serde(default, deserialize_with = "crate::core::flow::de_opt_timestamp")]
    pub released_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
}

fn default_status() -> FlowStatus {
    FlowStatus::Normal
}

impl IpDetail {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(p) = self.ddos_probability {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(AppError::Parse(format!(
                    "ddos_probability {p} for {} is outside [0, 1]",
                    self.ip
                )));
            }
        }
        Ok(())
    }
}

/// Operations the dashboard needs from the server.
///
/// Futures are `Send` so calls can run on spawned tasks while the view task
/// keeps handling events.
pub trait DashboardApi: Send + Sync + 'static {
    fn fetch_flows(&self, limit: usize) -> impl Future<Output = Result<Vec<Flow>, AppError>> + Send;

    fn fetch_summary(&self) -> impl Future<Output = Result<Summary, AppError>> + Send;

    fn fetch_ip(&self, ip: &str) -> impl Future<Output = Result<IpDetail, AppError>> + Send;

    fn block(&self, req: BlockRequest) -> impl Future<Output = Result<(), AppError>> + Send;

    fn release(&self, req: ReleaseRequest) -> impl Future<Output = Result<(), AppError>> + Send;

    fn add_note(&self, req: NoteRequest) -> impl Future<Output = Result<(), AppError>> + Send;

    fn fetch_logs(&self, limit: usize) -> impl Future<Output = Result<Vec<AuditEntry>, AppError>> + Send;

    fn fetch_settings(&self) -> impl Future<Output = Result<Settings, AppError>> + Send;

    fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> impl Future<Output = Result<Settings, AppError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_update_serializes_only_set_fields() {
        let update = SettingsUpdate {
            auto_block: Some(false),
            threshold: None,
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"auto_block": false}));
    }

    #[test]
    fn test_settings_update_validation() {
        assert!(SettingsUpdate::default().validate().is_err());
        let bad = SettingsUpdate {
            auto_block: None,
            threshold: Some(1.5),
        };
        assert_eq!(bad.validate().unwrap_err().kind(), "InvalidInput");
        let ok = SettingsUpdate {
            auto_block: None,
            threshold: Some(0.85),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_ip_detail_for_block_only_ip() {
        let value = json!({
            "ip": "203.0.113.45",
            "status": "blocked",
            "blocked_at": "2024-03-01T10:00:00.000001Z",
            "blocked_by": "alice",
            "block_reason": "manual",
            "notes": [{"timestamp": "2024-03-01T10:01:00Z", "operator": "alice", "text": "botnet"}],
            "history": []
        });
        let detail: IpDetail = serde_json::from_value(value).unwrap();
        assert_eq!(detail.status, FlowStatus::Blocked);
        assert!(detail.ddos_probability.is_none());
        assert_eq!(detail.notes[0].text, "botnet");
        assert!(detail.validate().is_ok());
    }

    #[test]
    fn test_ip_detail_defaults_status_to_normal() {
        let detail: IpDetail = serde_json::from_value(json!({"ip": "1.2.3.4"})).unwrap();
        assert_eq!(detail.status, FlowStatus::Normal);
    }
}
