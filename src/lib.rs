//! flowwatch: terminal client for a DDoS flow-monitoring server.
//!
//! The heart of the crate is [`core::FlowStateStore`], which reconciles flow
//! polls, push events, and optimistic operator actions into one consistent view.

pub mod api;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod push;
pub mod services;
pub mod simulate;
pub mod ui;

pub use error::AppError;

/// Install the global tracing subscriber and a panic hook that logs panics.
///
/// `RUST_LOG` overrides the default `flowwatch=info` filter.
pub fn init_tracing() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC in flowwatch: {info}");
        default_hook(info);
    }));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowwatch=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
