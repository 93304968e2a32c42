//! Read-only commands: summary, IP detail, audit log.

use std::fmt::Write;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::{DashboardApi, IpDetail};
use crate::core::{AuditFilter, AuditLogView};
use crate::error::AppError;
use crate::services::PollTask;
use crate::ui::{self, table};

/// Headline counts as reported by the server.
pub async fn summary_report(api: &impl DashboardApi) -> Result<String, AppError> {
    let summary = api.fetch_summary().await?;
    Ok(table::render_summary_line(&summary))
}

/// Everything the server knows about one IP.
pub async fn detail_report(api: &impl DashboardApi, ip: &str) -> Result<String, AppError> {
    let detail = api.fetch_ip(ip).await?;
    Ok(format_detail(&detail))
}

/// The audit log, newest first, narrowed by `filter`.
pub async fn logs_report(
    api: &impl DashboardApi,
    limit: usize,
    filter: &AuditFilter,
) -> Result<String, AppError> {
    let mut view = AuditLogView::new();
    view.replace(api.fetch_logs(limit).await?);
    Ok(format_logs(&view, filter))
}

/// Re-fetch the audit log every `interval` and hand each page that differs
/// from the last one to `emit`. Runs until `stop` resolves.
pub async fn follow_logs<A: DashboardApi>(
    api: Arc<A>,
    limit: usize,
    filter: &AuditFilter,
    interval: Duration,
    stop: impl Future<Output = ()>,
    mut emit: impl FnMut(&str),
) {
    let (tx, mut rx) = mpsc::channel(1);
    let poller = PollTask::spawn(
        interval,
        move || {
            let api = Arc::clone(&api);
            async move { api.fetch_logs(limit).await }
        },
        tx,
    );
    tokio::pin!(stop);

    let mut view = AuditLogView::new();
    let mut shown: Option<String> = None;
    loop {
        tokio::select! {
            _ = &mut stop => break,
            result = rx.recv() => match result {
                Some(Ok(entries)) => {
                    view.replace(entries);
                    let page = format_logs(&view, filter);
                    if shown.as_deref() != Some(page.as_str()) {
                        emit(&page);
                        shown = Some(page);
                    }
                }
                Some(Err(e)) => tracing::warn!("Audit log poll failed: {e}"),
                None => break,
            },
        }
    }
    poller.cancel();
}

fn format_logs(view: &AuditLogView, filter: &AuditFilter) -> String {
    let entries = view.query(filter);
    if entries.is_empty() {
        return "No log entries".to_string();
    }

    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{}  {:<7}  {:<15}  {:<12}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.action.to_string().to_uppercase(),
            entry.ip,
            entry.operator,
            entry.detail().unwrap_or("-")
        );
    }
    out.trim_end().to_string()
}

pub fn format_detail(detail: &IpDetail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "IP:          {}", detail.ip);
    let _ = writeln!(out, "Status:      {}", ui::status_label(detail.status));
    if let Some(p) = detail.ddos_probability {
        let _ = writeln!(out, "Risk:        {}", ui::format_risk(p));
    }
    if let (Some(dst), Some(port)) = (&detail.dst_ip, detail.dst_port) {
        let _ = writeln!(out, "Destination: {dst}:{port}");
    }
    if let Some(bps) = detail.flow_bytes_s {
        let _ = writeln!(out, "Bytes:       {}", ui::format_bytes_rate(bps));
    }
    if let Some(pps) = detail.flow_packets_s {
        let _ = writeln!(out, "Packets:     {}", ui::format_packet_rate(pps));
    }
    if let Some(by) = &detail.blocked_by {
        let reason = detail.block_reason.as_deref().unwrap_or("-");
        let _ = writeln!(out, "Blocked by:  {by} ({reason})");
    }
    if let Some(by) = &detail.released_by {
        let _ = writeln!(out, "Released by: {by}");
    }
    if detail.notes.is_empty() {
        let _ = writeln!(out, "Notes:       none");
    } else {
        let _ = writeln!(out, "Notes:");
        for note in &detail.notes {
            let _ = writeln!(
                out,
                "  {} {}: {}",
                note.timestamp.format("%Y-%m-%d %H:%M"),
                note.operator,
                note.text
            );
        }
    }
    out.trim_end().to_string()
}
