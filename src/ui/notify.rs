use super::{Level, Notifier};

/// Sends operator notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&mut self, level: Level, message: &str) {
        match level {
            Level::Success => tracing::info!(target: "flowwatch::operator", "✓ {message}"),
            Level::Info => tracing::info!(target: "flowwatch::operator", "{message}"),
            Level::Warning => tracing::warn!(target: "flowwatch::operator", "{message}"),
            Level::Error => tracing::error!(target: "flowwatch::operator", "{message}"),
        }
    }
}
