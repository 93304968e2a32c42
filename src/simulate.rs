//! Synthetic flow generator for exercising a dashboard without live traffic.
//!
//! Flows are sent to the server as `flow_update` push events, which the server
//! rebroadcasts to every connected dashboard.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DashboardConfig;
use crate::core::{Flow, RiskThresholds};
use crate::error::AppError;
use crate::push::{OutboundEvent, PushEvent, PushTransport};

pub const BASE_IPS: [&str; 8] = [
    "192.168.1.100",
    "192.168.1.105",
    "10.0.0.50",
    "172.16.0.20",
    "203.0.113.45",
    "198.51.100.200",
    "192.0.2.75",
    "10.20.30.40",
];

const PORTS: [u16; 5] = [22, 80, 443, 3306, 5432];

const HIGH_RISK_PROBABILITY: f64 = 0.95;
const SUSPICIOUS_PROBABILITY: f64 = 0.72;
const NORMAL_PROBABILITY: f64 = 0.1;

/// Which one-off flow to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    HighRisk,
    Suspicious,
}

pub struct Simulator {
    rng: StdRng,
    thresholds: RiskThresholds,
    iteration: u64,
}

impl Simulator {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self::with_rng(StdRng::from_entropy(), thresholds)
    }

    pub fn seeded(seed: u64, thresholds: RiskThresholds) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), thresholds)
    }

    fn with_rng(rng: StdRng, thresholds: RiskThresholds) -> Self {
        Self {
            rng,
            thresholds,
            iteration: 0,
        }
    }

    /// Flows for the next tick. A high-risk flow every 5th tick, a suspicious
    /// one every 4th, and a low-risk one every 3rd; some ticks produce nothing.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Flow> {
        self.iteration += 1;
        let n = self.iteration;
        let mut flows = Vec::new();
        if n % 5 == 1 {
            flows.push(self.flow(BASE_IPS[0], HIGH_RISK_PROBABILITY, now));
        }
        if n % 4 == 1 {
            flows.push(self.flow(BASE_IPS[2], SUSPICIOUS_PROBABILITY, now));
        }
        if n % 3 == 0 {
            flows.push(self.flow(BASE_IPS[5], NORMAL_PROBABILITY, now));
        }
        flows
    }

    /// A single flow from a random public-looking address.
    pub fn inject(&mut self, kind: Injection, now: DateTime<Utc>) -> Flow {
        let ip = self.random_ip();
        let probability = match kind {
            Injection::HighRisk => HIGH_RISK_PROBABILITY,
            Injection::Suspicious => SUSPICIOUS_PROBABILITY,
        };
        self.flow(&ip, probability, now)
    }

    pub fn flow(&mut self, ip: &str, probability: f64, now: DateTime<Utc>) -> Flow {
        Flow {
            source_ip: ip.to_string(),
            destination_ip: "10.0.0.1".to_string(),
            destination_port: PORTS[self.rng.gen_range(0..PORTS.len())],
            timestamp: now,
            bytes_per_sec: self.rng.gen_range(0.0..500_000.0),
            packets_per_sec: self.rng.gen_range(0.0..15_000.0),
            total_packets: self.rng.gen_range(0..100_000),
            avg_packet_size: 256.0 + self.rng.gen_range(0.0..256.0),
            risk_probability: probability,
            status: self.thresholds.classify(probability),
            note: None,
        }
    }

    fn random_ip(&mut self) -> String {
        format!(
            "{}.{}.{}.{}",
            192 + self.rng.gen_range(0..64u16),
            self.rng.gen_range(0..256u16),
            self.rng.gen_range(0..256u16),
            100 + self.rng.gen_range(0..155u16)
        )
    }
}

/// Connect to the push channel and send simulated flows every `tick`.
/// Stops after `iterations` ticks when given, otherwise on Ctrl+C.
pub async fn run_simulation(
    config: &DashboardConfig,
    tick: Duration,
    iterations: Option<u64>,
    inject: Option<Injection>,
) -> Result<(), AppError> {
    let (transport, mut events) = PushTransport::spawn(config.push_url.clone(), config.reconnect);
    wait_connected(&mut events).await?;

    let mut sim = Simulator::new(config.thresholds);
    if let Some(kind) = inject {
        let flow = sim.inject(kind, Utc::now());
        tracing::info!("Injected {} ({:?})", flow.source_ip, kind);
        send(&transport, flow)?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(tick);
    let mut sent = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                for flow in sim.tick(Utc::now()) {
                    tracing::info!("Simulated {} ({})", flow.source_ip, flow.status);
                    send(&transport, flow)?;
                }
                sent += 1;
                if iterations.is_some_and(|max| sent >= max) {
                    break;
                }
            }
            event = events.recv() => {
                if matches!(event, Some(PushEvent::Disconnected) | None) {
                    return Err(AppError::Channel("push channel closed".into()));
                }
            }
        }
    }
    tracing::info!("Simulation stopped after {sent} ticks");
    Ok(())
}

async fn wait_connected(events: &mut tokio::sync::mpsc::Receiver<PushEvent>) -> Result<(), AppError> {
    loop {
        match events.recv().await {
            Some(PushEvent::Connected) => return Ok(()),
            Some(PushEvent::Disconnected) | None => {
                return Err(AppError::Channel("could not connect to the push channel".into()))
            }
            Some(_) => {}
        }
    }
}

fn send(transport: &PushTransport, flow: Flow) -> Result<(), AppError> {
    if transport.send(OutboundEvent::FlowUpdate(flow)) {
        Ok(())
    } else {
        Err(AppError::Channel("push channel is not accepting events".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flow::tests::at;
    use crate::core::FlowStatus;

    #[test]
    fn test_tick_schedule() {
        let mut sim = Simulator::seeded(7, RiskThresholds::default());
        let ips: Vec<Vec<String>> = (0..6)
            .map(|_| sim.tick(at(0)).into_iter().map(|f| f.source_ip).collect())
            .collect();
        assert_eq!(ips[0], vec!["192.168.1.100", "10.0.0.50"]);
        assert!(ips[1].is_empty());
        assert_eq!(ips[2], vec!["198.51.100.200"]);
        assert!(ips[3].is_empty());
        assert_eq!(ips[4], vec!["10.0.0.50"]);
        assert_eq!(ips[5], vec!["192.168.1.100", "198.51.100.200"]);
    }

    #[test]
    fn test_generated_flows_validate() {
        let mut sim = Simulator::seeded(42, RiskThresholds::default());
        for _ in 0..50 {
            for flow in sim.tick(at(0)) {
                flow.validate().unwrap();
                assert!(PORTS.contains(&flow.destination_port));
                assert!(flow.avg_packet_size >= 256.0 && flow.avg_packet_size < 512.0);
            }
        }
    }

    #[test]
    fn test_status_follows_thresholds() {
        let mut sim = Simulator::seeded(1, RiskThresholds::default());
        assert_eq!(sim.flow("10.0.0.1", 0.95, at(0)).status, FlowStatus::HighRisk);
        assert_eq!(sim.flow("10.0.0.1", 0.72, at(0)).status, FlowStatus::Suspicious);
        assert_eq!(sim.flow("10.0.0.1", 0.0, at(0)).status, FlowStatus::Normal);
    }

    #[test]
    fn test_injected_ip_is_valid() {
        let mut sim = Simulator::seeded(3, RiskThresholds::default());
        for _ in 0..100 {
            let flow = sim.inject(Injection::Suspicious, at(0));
            flow.validate().unwrap();
            let first: u16 = flow.source_ip.split('.').next().unwrap().parse().unwrap();
            assert!((192..=255).contains(&first));
        }
    }
}
