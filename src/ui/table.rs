//! Plain-text flow table for the terminal.

use std::io::Write;

use super::{format_bytes_rate, format_packet_rate, format_risk, format_time, status_label, Renderer};
use crate::api::Settings;
use crate::core::{Flow, FlowStatus, StatusChangeEvent, Summary};

const HEADER: [&str; 8] = [
    "TIME", "SOURCE", "DESTINATION", "BYTES", "PACKETS", "TOTAL", "RISK", "STATUS",
];

/// Render `flows` as aligned text rows, header first.
pub fn render_table(flows: &[Flow]) -> String {
    if flows.is_empty() {
        return "No flows found\n".to_string();
    }
    let rows: Vec<[String; 8]> = flows.iter().map(row).collect();
    let mut widths = HEADER.map(str::len);
    for r in &rows {
        for (w, cell) in widths.iter_mut().zip(r.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADER.map(String::from), &widths);
    for r in &rows {
        push_line(&mut out, r, &widths);
    }
    out
}

fn row(flow: &Flow) -> [String; 8] {
    [
        format_time(&flow.timestamp),
        flow.source_ip.clone(),
        format!("{}:{}", flow.destination_ip, flow.destination_port),
        format_bytes_rate(flow.bytes_per_sec),
        format_packet_rate(flow.packets_per_sec),
        flow.total_packets.to_string(),
        format_risk(flow.risk_probability),
        status_label(flow.status),
    ]
}

fn push_line(out: &mut String, cells: &[String; 8], widths: &[usize; 8]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, w)| format!("{cell:<w$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

pub fn render_summary_line(summary: &Summary) -> String {
    format!(
        "flows {} | active IPs {} | high risk {} | suspicious {} | blocked {}",
        summary.total_flows,
        summary.active_ips,
        summary.high_risk_count,
        summary.suspicious_count,
        summary.blocked_count
    )
}

/// Writes the table and status lines to any writer (stdout in the CLI).
pub struct TableRenderer<W> {
    out: W,
}

impl TableRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> TableRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::warn!("Failed to write to terminal: {e}");
        }
    }
}

impl<W: Write + Send + 'static> Renderer for TableRenderer<W> {
    fn render_flows(&mut self, flows: &[Flow]) {
        let table = render_table(flows);
        self.write(&table);
    }

    fn render_summary(&mut self, summary: &Summary) {
        let line = format!("{}\n", render_summary_line(summary));
        self.write(&line);
    }

    fn highlight(&mut self, change: &StatusChangeEvent) {
        let marker = if change.new_status == FlowStatus::Blocked { "!!" } else { "**" };
        let line = format!(
            "{marker} {} {} -> {} (by {})\n",
            change.ip,
            status_label(change.old_status),
            status_label(change.new_status),
            change.initiator
        );
        self.write(&line);
    }

    fn connection_status(&mut self, connected: bool) {
        let line = if connected {
            "[push] connected\n"
        } else {
            "[push] disconnected\n"
        };
        self.write(line);
    }

    fn settings(&mut self, settings: &Settings) {
        let line = format!(
            "[settings] auto-block {} at {}\n",
            if settings.auto_block { "on" } else { "off" },
            format_risk(settings.threshold)
        );
        self.write(&line);
    }
}
