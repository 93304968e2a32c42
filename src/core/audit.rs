//! Audit log of operator actions, as returned by `GET /api/logs`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Operator action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Block,
    Release,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditAction::Block => "block",
            AuditAction::Release => "release",
        })
    }
}

impl std::str::FromStr for AuditAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(AuditAction::Block),
            "release" => Ok(AuditAction::Release),
            other => Err(AppError::InvalidInput(format!("unknown audit action '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(deserialize_with = "crate::core::flow::de_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub ip: String,
    pub operator: String,
    /// Set on blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Set on releases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AuditEntry {
    /// The reason for a block or the note on a release, whichever is present.
    pub fn detail(&self) -> Option<&str> {
        self.reason
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.note.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub ip_substring: Option<String>,
    pub action: Option<AuditAction>,
}

/// The most recently fetched page of the audit log.
#[derive(Debug, Default)]
pub struct AuditLogView {
    entries: Vec<AuditEntry>,
}

impl AuditLogView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held page with a fresh poll result.
    pub fn replace(&mut self, entries: Vec<AuditEntry>) {
        self.entries = entries;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries matching `filter`, newest first.
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let needle = filter
            .ip_substring
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let mut matched: Vec<AuditEntry> = self
            .entries
            .iter()
            .filter(|e| needle.as_ref().map_or(true, |n| e.ip.to_lowercase().contains(n)))
            .filter(|e| filter.action.map_or(true, |a| e.action == a))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched
    }
}
