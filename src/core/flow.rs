//! Flow records, statuses, and status-change events.
//!
//! A [`Flow`] summarizes recent traffic from one source IP together with the
//! server's DDoS risk estimate. Field names on the wire follow the server's
//! JSON (`src_ip`, `ddos_probability`, ...). Every parser in this crate runs
//! [`Flow::validate`] before a flow reaches the store.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config;
use crate::error::AppError;

/// Risk classification of a source IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Normal,
    Suspicious,
    HighRisk,
    Blocked,
}

impl FlowStatus {
    pub const ALL: [FlowStatus; 4] = [
        FlowStatus::Normal,
        FlowStatus::Suspicious,
        FlowStatus::HighRisk,
        FlowStatus::Blocked,
    ];

    /// Wire name (`high_risk`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Normal => "normal",
            FlowStatus::Suspicious => "suspicious",
            FlowStatus::HighRisk => "high_risk",
            FlowStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        FlowStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown status '{s}'")))
    }
}

/// Probability cut-offs used when the client has to derive a status itself.
///
/// The mapping is monotone: a higher probability never yields a lower status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    pub high_risk: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            high_risk: config::HIGH_RISK_THRESHOLD,
        }
    }
}

impl RiskThresholds {
    pub fn classify(&self, probability: f64) -> FlowStatus {
        if probability >= self.high_risk {
            FlowStatus::HighRisk
        } else if probability > 0.0 {
            FlowStatus::Suspicious
        } else {
            FlowStatus::Normal
        }
    }
}

/// Latest traffic record for one source IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(rename = "src_ip")]
    pub source_ip: String,
    #[serde(rename = "dst_ip")]
    pub destination_ip: String,
    #[serde(rename = "dst_port")]
    pub destination_port: u16,
    #[serde(deserialize_with = "de_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Bytes per second.
    #[serde(rename = "flow_bytes_s")]
    pub bytes_per_sec: f64,
    /// Packets per second.
    #[serde(rename = "flow_packets_s")]
    pub packets_per_sec: f64,
    #[serde(deserialize_with = "de_count")]
    pub total_packets: u64,
    #[serde(rename = "avg_pkt_size")]
    pub avg_packet_size: f64,
    #[serde(rename = "ddos_probability")]
    pub risk_probability: f64,
    pub status: FlowStatus,
    #[serde(default, deserialize_with = "de_note", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Flow {
    /// Check the invariants every flow must satisfy before it enters the store.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.source_ip.parse::<IpAddr>().is_err() {
            return Err(AppError::Parse(format!(
                "src_ip '{}' is not an IP address",
                self.source_ip
            )));
        }
        if self.destination_ip.parse::<IpAddr>().is_err() {
            return Err(AppError::Parse(format!(
                "dst_ip '{}' is not an IP address",
                self.destination_ip
            )));
        }
        if !self.risk_probability.is_finite() || !(0.0..=1.0).contains(&self.risk_probability) {
            return Err(AppError::Parse(format!(
                "ddos_probability {} for {} is outside [0, 1]",
                self.risk_probability, self.source_ip
            )));
        }
        for (name, value) in [
            ("flow_bytes_s", self.bytes_per_sec),
            ("flow_packets_s", self.packets_per_sec),
            ("avg_pkt_size", self.avg_packet_size),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::Parse(format!(
                    "{name} {value} for {} must be a non-negative number",
                    self.source_ip
                )));
            }
        }
        Ok(())
    }

    /// Decode and validate one flow from a JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, AppError> {
        let flow: Flow = serde_json::from_value(value)?;
        flow.validate()?;
        Ok(flow)
    }

    /// Decode and validate a JSON array of flows.
    pub fn list_from_value(value: serde_json::Value) -> Result<Vec<Self>, AppError> {
        let flows: Vec<Flow> = serde_json::from_value(value)?;
        for flow in &flows {
            flow.validate()?;
        }
        Ok(flows)
    }
}

/// Who caused a status change: the server/system, or a named operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Initiator {
    System,
    Operator(String),
}

impl Initiator {
    pub fn operator(name: impl Into<String>) -> Self {
        Initiator::Operator(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Initiator::System => "system",
            Initiator::Operator(name) => name,
        }
    }
}

impl From<&str> for Initiator {
    fn from(s: &str) -> Self {
        if s.is_empty() || s == "system" {
            Initiator::System
        } else {
            Initiator::Operator(s.to_string())
        }
    }
}

impl fmt::Display for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Initiator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Initiator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Initiator::from(s.as_str()))
    }
}

/// A key's status moved from `old_status` to `new_status`. Drives transient highlighting only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    pub ip: String,
    pub old_status: FlowStatus,
    pub new_status: FlowStatus,
    #[serde(rename = "by")]
    pub initiator: Initiator,
}

impl StatusChangeEvent {
    /// True when the server blocked an IP on its own (auto-block).
    pub fn is_auto_block(&self) -> bool {
        self.new_status == FlowStatus::Blocked && self.initiator == Initiator::System
    }
}

fn de_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if value.is_finite() && value >= 0.0 {
        Ok(value.round() as u64)
    } else {
        Err(serde::de::Error::custom(format!(
            "total_packets {value} must be a non-negative number"
        )))
    }
}

/// Accepts RFC 3339, or a naive ISO-8601 timestamp read as UTC.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp {s:?}: {e}"))
}

pub(crate) fn de_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse_timestamp(&s).map_err(serde::de::Error::custom)
}

pub(crate) fn de_opt_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.is_empty() => parse_timestamp(&s).map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

fn de_note<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let note = Option::<String>::deserialize(deserializer)?;
    Ok(note.filter(|n| !n.trim().is_empty()))
}
