//! Push channel: JSON envelope codec and the reconnecting websocket transport.
//!
//! Every frame is a text message `{"event": "<name>", "data": <payload>}`.
//! Inbound events the dashboard does not understand are ignored.

pub mod transport;

use serde::{Deserialize, Serialize};

use crate::api::Settings;
use crate::core::{Flow, StatusChangeEvent, Summary};
use crate::error::AppError;

pub use transport::{PushTransport, ReconnectPolicy};

/// Events delivered to the view by the push transport.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// The socket is open and `request_summary` has been sent.
    Connected,
    /// The socket was lost, or the transport gave up reconnecting.
    Disconnected,
    SummaryUpdate(Summary),
    FlowUpdate(Flow),
    IpStatusChange(StatusChangeEvent),
    SettingsUpdated(Settings),
}

/// Events the dashboard sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    RequestSummary,
    /// Used by the simulator to inject synthetic flows.
    FlowUpdate(Flow),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::RequestSummary => "request_summary",
            OutboundEvent::FlowUpdate(_) => "flow_update",
        }
    }
}

#[derive(Deserialize)]
struct InboundEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Flow>,
}

/// Decode one inbound frame. `Ok(None)` means the event name is not one the
/// dashboard handles.
pub fn decode_event(text: &str) -> Result<Option<PushEvent>, AppError> {
    let envelope: InboundEnvelope = serde_json::from_str(text)?;
    let event = match envelope.event.as_str() {
        "summary_update" => PushEvent::SummaryUpdate(serde_json::from_value(envelope.data)?),
        "flow_update" => PushEvent::FlowUpdate(Flow::from_value(envelope.data)?),
        "ip_status_change" => {
            let change: StatusChangeEvent = serde_json::from_value(envelope.data)?;
            if change.ip.trim().is_empty() {
                return Err(AppError::Parse("ip_status_change without an ip".into()));
            }
            PushEvent::IpStatusChange(change)
        }
        "settings_updated" => PushEvent::SettingsUpdated(serde_json::from_value(envelope.data)?),
        other => {
            tracing::trace!("Ignoring push event {other:?}");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

/// Encode one outbound event as a text frame.
pub fn encode_event(event: &OutboundEvent) -> Result<String, AppError> {
    let data = match event {
        OutboundEvent::RequestSummary => None,
        OutboundEvent::FlowUpdate(flow) => Some(flow),
    };
    Ok(serde_json::to_string(&OutboundEnvelope {
        event: event.name(),
        data,
    })?)
}
