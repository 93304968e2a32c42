//! Verification queue: suspicious IPs awaiting an operator decision.
//!
//! Candidates are read from the flow store on demand, so an IP leaves the
//! queue as soon as its status stops being `suspicious` (blocked, released, or
//! reclassified by the server). Selection and per-IP notes are local state.

use std::collections::{BTreeSet, HashMap};

use crate::core::flow::{Flow, FlowStatus};
use crate::core::store::{ActionRequest, FlowFilter, FlowStateStore, StatusAction};

/// Block reason recorded for decisions taken from the queue.
pub const VERIFICATION_REASON: &str = "verification";

/// Release note recorded for decisions taken from the queue.
pub const VERIFICATION_RELEASE_NOTE: &str = "Released from verification";

#[derive(Debug, Default)]
pub struct VerificationQueue {
    selected: BTreeSet<String>,
    notes: HashMap<String, String>,
}

impl VerificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspicious flows, newest first.
    pub fn candidates(&self, store: &FlowStateStore) -> Vec<Flow> {
        store.query(&FlowFilter::status(FlowStatus::Suspicious))
    }

    /// Flip selection of `ip`. Returns whether it is now selected.
    pub fn toggle(&mut self, ip: &str) -> bool {
        if self.selected.remove(ip) {
            false
        } else {
            self.selected.insert(ip.to_string());
            true
        }
    }

    pub fn selected(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }

    pub fn has_selection(&self) -> bool {
        !self.selected.is_empty()
    }

    /// Attach a note recorded after the IP is blocked. An empty note clears it.
    pub fn set_note(&mut self, ip: &str, note: &str) {
        if note.trim().is_empty() {
            self.notes.remove(ip);
        } else {
            self.notes.insert(ip.to_string(), note.trim().to_string());
        }
    }

    pub fn note(&self, ip: &str) -> Option<&str> {
        self.notes.get(ip).map(String::as_str)
    }

    /// Request for a single decision on `ip`.
    pub fn decide(&mut self, ip: &str, action: StatusAction) -> ActionRequest {
        self.selected.remove(ip);
        let note = self.notes.remove(ip);
        match action {
            StatusAction::Block => ActionRequest::block(ip, VERIFICATION_REASON).with_note(note),
            StatusAction::Release => ActionRequest::release(ip, VERIFICATION_RELEASE_NOTE),
        }
    }

    /// Drain the selection into one request per IP, in IP order.
    pub fn bulk(&mut self, action: StatusAction) -> Vec<ActionRequest> {
        let ips: Vec<String> = std::mem::take(&mut self.selected).into_iter().collect();
        ips.iter().map(|ip| self.decide(ip, action)).collect()
    }

    /// Forget selections and notes for IPs that are no longer candidates.
    pub fn prune(&mut self, store: &FlowStateStore) {
        let still_suspicious = |ip: &str| {
            store
                .get(ip)
                .is_some_and(|flow| flow.status == FlowStatus::Suspicious)
        };
        self.selected.retain(|ip| still_suspicious(ip));
        self.notes.retain(|ip, _| still_suspicious(ip));
    }
}
