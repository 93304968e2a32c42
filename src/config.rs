//! Centralized runtime constants and environment configuration for flowwatch.
//!
//! All tunable intervals, limits, and thresholds are collected here so they can
//! be found and adjusted in a single place rather than scattered across modules.

use std::time::Duration;

use crate::core::flow::RiskThresholds;
use crate::push::transport::ReconnectPolicy;

/// Interval between flow snapshot polls (milliseconds).
pub const FLOW_POLL_INTERVAL_MS: u64 = 3000;

/// Number of flows requested per snapshot poll.
pub const FLOW_PAGE_SIZE: usize = 50;

/// Interval between audit log polls (milliseconds).
pub const LOG_POLL_INTERVAL_MS: u64 = 5000;

/// Number of audit log entries requested per poll.
pub const LOG_PAGE_SIZE: usize = 100;

/// Timeout applied to every HTTP request (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Maximum number of push reconnect attempts before the transport gives up.
pub const PUSH_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay before the first push reconnect attempt (milliseconds).
pub const PUSH_RECONNECT_DELAY_MS: u64 = 3000;

/// Upper bound on the push reconnect delay (milliseconds).
pub const PUSH_RECONNECT_DELAY_MAX_MS: u64 = 5000;

/// Capacity of the mpsc channels feeding the view task.
pub const CHANNEL_CAPACITY: usize = 256;

/// Risk probability at or above which a flow counts as high risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.90;

/// Interval between simulator iterations (milliseconds).
pub const SIMULATOR_TICK_MS: u64 = 2000;

/// Operator name used when none is configured.
pub const DEFAULT_OPERATOR: &str = "operator";

/// Block reason sent for blocks issued from the flow table.
pub const MANUAL_BLOCK_REASON: &str = "manual";

/// Release note sent for releases issued from the flow table.
pub const MANUAL_RELEASE_NOTE: &str = "Manual release";

/// Server base URL used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Connection settings and tunables for one dashboard session.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Base URL of the HTTP API, without a trailing slash.
    pub server_url: String,
    /// Websocket URL of the push channel.
    pub push_url: String,
    /// Name recorded as the operator on block/release/note requests.
    pub operator: String,
    pub page_size: usize,
    pub poll_interval: Duration,
    pub log_page_size: usize,
    pub log_poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub thresholds: RiskThresholds,
    /// Evict flows not seen for this long. `None` keeps them forever.
    pub flow_ttl: Option<Duration>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            push_url: push_url_for(DEFAULT_SERVER_URL),
            operator: DEFAULT_OPERATOR.to_string(),
            page_size: FLOW_PAGE_SIZE,
            poll_interval: Duration::from_millis(FLOW_POLL_INTERVAL_MS),
            log_page_size: LOG_PAGE_SIZE,
            log_poll_interval: Duration::from_millis(LOG_POLL_INTERVAL_MS),
            reconnect: ReconnectPolicy::default(),
            thresholds: RiskThresholds::default(),
            flow_ttl: None,
        }
    }
}

impl DashboardConfig {
    /// Build a config from `FLOWWATCH_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(url) = lookup("FLOWWATCH_SERVER_URL") {
            cfg.server_url = url.trim_end_matches('/').to_string();
            cfg.push_url = push_url_for(&cfg.server_url);
        }
        if let Some(url) = lookup("FLOWWATCH_PUSH_URL") {
            cfg.push_url = url;
        }
        if let Some(op) = lookup("FLOWWATCH_OPERATOR").filter(|s| !s.trim().is_empty()) {
            cfg.operator = op;
        }
        if let Some(n) = lookup("FLOWWATCH_PAGE_SIZE").and_then(|s| s.parse().ok()) {
            cfg.page_size = n;
        }
        if let Some(ms) = lookup("FLOWWATCH_POLL_INTERVAL_MS").and_then(|s| s.parse::<u64>().ok()) {
            if ms > 0 {
                cfg.poll_interval = Duration::from_millis(ms);
            }
        }
        cfg.flow_ttl = lookup("FLOWWATCH_FLOW_TTL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        cfg
    }
}

/// Derive the push websocket URL from the HTTP base URL.
pub fn push_url_for(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws}/ws")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    /// Compile-time sanity: all constants are positive.
    #[test]
    fn test_all_intervals_positive() {
        const _: () = assert!(FLOW_POLL_INTERVAL_MS > 0);
        const _: () = assert!(LOG_POLL_INTERVAL_MS > 0);
        const _: () = assert!(FLOW_PAGE_SIZE > 0);
        const _: () = assert!(LOG_PAGE_SIZE > 0);
        const _: () = assert!(PUSH_MAX_RECONNECT_ATTEMPTS > 0);
        const _: () = assert!(PUSH_RECONNECT_DELAY_MS <= PUSH_RECONNECT_DELAY_MAX_MS);
        const _: () = assert!(CHANNEL_CAPACITY > 0);
        const _: () = assert!(SIMULATOR_TICK_MS > 0);
    }

    #[test]
    fn test_defaults_without_environment() {
        let cfg = DashboardConfig::from_lookup(|_| None);
        assert_eq!(cfg.server_url, "http://localhost:5000");
        assert_eq!(cfg.push_url, "ws://localhost:5000/ws");
        assert_eq!(cfg.operator, "operator");
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.poll_interval, Duration::from_secs(3));
        assert_eq!(cfg.log_poll_interval, Duration::from_secs(5));
        assert!(cfg.flow_ttl.is_none());
    }

    #[test]
    fn test_server_url_derives_push_url() {
        let cfg = DashboardConfig::from_lookup(lookup_from(&[(
            "FLOWWATCH_SERVER_URL",
            "https://soc.example.net/",
        )]));
        assert_eq!(cfg.server_url, "https://soc.example.net");
        assert_eq!(cfg.push_url, "wss://soc.example.net/ws");
    }

    #[test]
    fn test_explicit_push_url_wins() {
        let cfg = DashboardConfig::from_lookup(lookup_from(&[
            ("FLOWWATCH_SERVER_URL", "http://10.1.1.1:5000"),
            ("FLOWWATCH_PUSH_URL", "ws://10.1.1.2:9000/events"),
        ]));
        assert_eq!(cfg.push_url, "ws://10.1.1.2:9000/events");
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let cfg = DashboardConfig::from_lookup(lookup_from(&[
            ("FLOWWATCH_PAGE_SIZE", "lots"),
            ("FLOWWATCH_POLL_INTERVAL_MS", "0"),
            ("FLOWWATCH_FLOW_TTL_SECS", "600"),
            ("FLOWWATCH_OPERATOR", "  "),
        ]));
        assert_eq!(cfg.page_size, FLOW_PAGE_SIZE);
        assert_eq!(cfg.poll_interval, Duration::from_millis(FLOW_POLL_INTERVAL_MS));
        assert_eq!(cfg.flow_ttl, Some(Duration::from_secs(600)));
        assert_eq!(cfg.operator, DEFAULT_OPERATOR);
    }
}
