//! Presentation seam: what the view draws and how it tells the operator things.
//!
//! [`Renderer`] and [`Notifier`] have no knowledge of the store. The view task
//! calls them after each mutation; the terminal implementations live in
//! [`table`] and [`notify`].

pub mod notify;
pub mod table;

use chrono::{DateTime, Local, Utc};

use crate::api::Settings;
use crate::core::{Flow, FlowStatus, StatusChangeEvent, Summary};

pub use notify::TracingNotifier;
pub use table::TableRenderer;

/// Severity of an operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
    Warning,
    Info,
}

pub trait Notifier: Send + 'static {
    fn notify(&mut self, level: Level, message: &str);

    fn success(&mut self, message: &str) {
        self.notify(Level::Success, message);
    }

    fn error(&mut self, message: &str) {
        self.notify(Level::Error, message);
    }

    fn warning(&mut self, message: &str) {
        self.notify(Level::Warning, message);
    }

    fn info(&mut self, message: &str) {
        self.notify(Level::Info, message);
    }
}

pub trait Renderer: Send + 'static {
    /// Redraw the flow table with already filtered and ordered rows.
    fn render_flows(&mut self, flows: &[Flow]);

    fn render_summary(&mut self, summary: &Summary);

    /// Transient emphasis for a row whose status just changed.
    fn highlight(&mut self, change: &StatusChangeEvent);

    fn connection_status(&mut self, connected: bool);

    fn settings(&mut self, settings: &Settings);
}

/// Bytes per second as `KB/s` with two decimals.
pub fn format_bytes_rate(bytes_per_sec: f64) -> String {
    format!("{:.2} KB/s", bytes_per_sec / 1024.0)
}

/// Packets per second in thousands with one decimal.
pub fn format_packet_rate(packets_per_sec: f64) -> String {
    format!("{:.1}K/s", packets_per_sec / 1000.0)
}

pub fn format_risk(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// `high_risk` -> `HIGH RISK`.
pub fn status_label(status: FlowStatus) -> String {
    status.as_str().replace('_', " ").to_uppercase()
}

/// Wall-clock time of day in the local zone.
pub fn format_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M:%S").to_string()
}
