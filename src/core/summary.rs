//! Headline counts shown above the flow table.

use serde::{Deserialize, Serialize};

use crate::core::flow::{Flow, FlowStatus, RiskThresholds};

/// Payload of `GET /api/summary` and of the `summary_update` push event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_flows: u64,
    pub active_ips: u64,
    pub high_risk_count: u64,
    pub suspicious_count: u64,
    pub blocked_count: u64,
}

impl Summary {
    /// Recompute the counts locally. Risk buckets come from the probability,
    /// the blocked count from the status, matching how the server counts.
    pub fn from_flows<'a>(flows: impl IntoIterator<Item = &'a Flow>, thresholds: &RiskThresholds) -> Self {
        let mut summary = Summary::default();
        for flow in flows {
            summary.total_flows += 1;
            summary.active_ips += 1;
            match thresholds.classify(flow.risk_probability) {
                FlowStatus::HighRisk => summary.high_risk_count += 1,
                FlowStatus::Suspicious => summary.suspicious_count += 1,
                _ => {}
            }
            if flow.status == FlowStatus::Blocked {
                summary.blocked_count += 1;
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flow::tests::{at, make_flow};

    #[test]
    fn test_from_flows_buckets_by_probability() {
        let mut zero = make_flow("10.0.0.1", FlowStatus::Normal, at(0));
        zero.risk_probability = 0.0;
        let flows = vec![
            zero,
            make_flow("10.0.0.2", FlowStatus::Suspicious, at(0)),
            make_flow("10.0.0.3", FlowStatus::HighRisk, at(0)),
            make_flow("10.0.0.4", FlowStatus::Blocked, at(0)),
        ];

        let summary = Summary::from_flows(&flows, &RiskThresholds::default());
        assert_eq!(
            summary,
            Summary {
                total_flows: 4,
                active_ips: 4,
                high_risk_count: 2,
                suspicious_count: 1,
                blocked_count: 1,
            }
        );
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        let summary = Summary::from_flows(std::iter::empty(), &RiskThresholds::default());
        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn test_decode_server_payload() {
        let json = r#"{"total_flows":12,"active_ips":12,"high_risk_count":3,"suspicious_count":5,"blocked_count":2}"#;
        let summary: Summary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.high_risk_count, 3);
        assert_eq!(summary.blocked_count, 2);
    }
}
