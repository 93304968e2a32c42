//! Local view of the current flow per source IP, reconciled from three sources.
//!
//! Snapshots (periodic polls), push updates, and optimistic operator actions all
//! mutate one [`FlowStateStore`]. Precedence follows logical freshness rather
//! than arrival order:
//!
//! - push updates and operator actions are *explicit writes*; each one records
//!   the instant it happened as the key's freshness floor;
//! - a snapshot value is ignored for a key whose floor is later than the
//!   instant the snapshot was requested;
//! - `blocked` set by an explicit write survives snapshots (metrics are still
//!   refreshed) until another explicit write changes it;
//! - an operator action the server has not answered yet keeps its status
//!   against every snapshot;
//! - an optimistic action is rolled back only if no newer write decided the
//!   key's status in the meantime, checked through a per-key status revision.
//!
//! The store is a plain owned value. Callers serialize access by owning it from
//! one task; listeners run synchronously before the mutating call returns.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::flow::{Flow, FlowStatus, Initiator, RiskThresholds, StatusChangeEvent};
use crate::core::summary::Summary;
use crate::error::AppError;

/// Flows from one poll, stamped with the instant the poll request was issued.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub flows: Vec<Flow>,
}

impl Snapshot {
    pub fn new(taken_at: DateTime<Utc>, flows: Vec<Flow>) -> Self {
        Self { taken_at, flows }
    }
}

/// Operator action applied optimistically before the server confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Block,
    Release,
}

impl StatusAction {
    pub fn target_status(&self) -> FlowStatus {
        match self {
            StatusAction::Block => FlowStatus::Blocked,
            StatusAction::Release => FlowStatus::Normal,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            StatusAction::Block => "blocked",
            StatusAction::Release => "released",
        }
    }
}

/// An operator block/release as it will be sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub ip: String,
    pub action: StatusAction,
    /// Block reason (`manual`, `verification`, ...). Ignored for releases.
    pub reason: Option<String>,
    /// Release note, or a note attached after a successful block.
    pub note: Option<String>,
}

impl ActionRequest {
    pub fn block(ip: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            action: StatusAction::Block,
            reason: Some(reason.into()),
            note: None,
        }
    }

    pub fn release(ip: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            action: StatusAction::Release,
            reason: None,
            note: Some(note.into()),
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note.filter(|n| !n.trim().is_empty());
        self
    }
}

/// Which kind of write last decided an entry's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Snapshot,
    Push,
    Operator,
}

#[derive(Debug, Clone)]
struct Entry {
    flow: Flow,
    origin: Origin,
    /// Revision of the write that last decided `flow.status`.
    status_revision: u64,
    /// Instant of the latest explicit write (push or operator action).
    floor: Option<DateTime<Utc>>,
    /// Revision of an operator action the server has not answered yet.
    pending: Option<u64>,
}

impl Entry {
    /// Whether a snapshot reporting `incoming` must leave the status alone.
    /// Unanswered actions keep theirs, and explicit blocks hold until released.
    fn holds_status(&self, incoming: FlowStatus) -> bool {
        if incoming == self.flow.status {
            return false;
        }
        self.pending.is_some()
            || (self.flow.status == FlowStatus::Blocked && self.origin != Origin::Snapshot)
    }
}

/// Pre-action state captured so a failed action can be undone.
#[derive(Debug, Clone)]
struct PriorState {
    status: FlowStatus,
    origin: Origin,
    floor: Option<DateTime<Utc>>,
    pending: Option<u64>,
}

/// Receipt for an optimistic action; pass it back to `confirm` or `rollback`.
#[derive(Debug)]
#[must_use = "an optimistic action must be confirmed or rolled back"]
pub struct ActionHandle {
    ip: String,
    action: StatusAction,
    revision: u64,
    prior: PriorState,
}

impl ActionHandle {
    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn action(&self) -> StatusAction {
        self.action
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Result of rolling back an optimistic action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The entry was restored to its pre-action status.
    Reverted,
    /// A newer push or snapshot decided the status after the action; it is kept.
    Superseded,
}

/// Keys touched by one mutation and the status transitions among them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub keys: BTreeSet<String>,
    pub status_changes: Vec<StatusChangeEvent>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn touch(&mut self, ip: &str) {
        self.keys.insert(ip.to_string());
    }

    fn status(&mut self, ip: &str, old: FlowStatus, new: FlowStatus, initiator: Initiator) {
        if old != new {
            self.status_changes.push(StatusChangeEvent {
                ip: ip.to_string(),
                old_status: old,
                new_status: new,
                initiator,
            });
        }
    }
}

/// Query parameters for [`FlowStateStore::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowFilter {
    /// Case-insensitive substring of the source IP.
    pub ip_substring: Option<String>,
    pub status: Option<FlowStatus>,
}

impl FlowFilter {
    pub fn status(status: FlowStatus) -> Self {
        Self {
            ip_substring: None,
            status: Some(status),
        }
    }

    fn matches(&self, flow: &Flow) -> bool {
        let ip_ok = match &self.ip_substring {
            Some(needle) if !needle.is_empty() => flow
                .source_ip
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        };
        ip_ok && self.status.map_or(true, |s| flow.status == s)
    }
}

/// Identifies a registered change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ChangeSet) + Send>;

/// Authoritative local view of "current flow per source IP".
#[derive(Default)]
pub struct FlowStateStore {
    entries: HashMap<String, Entry>,
    next_revision: u64,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl FlowStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ip: &str) -> Option<&Flow> {
        self.entries.get(ip).map(|e| &e.flow)
    }

    /// Register a listener invoked after every mutation that changed at least one key.
    pub fn on_change(&mut self, listener: impl FnMut(&ChangeSet) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Merge a polled snapshot. Keys missing from the snapshot are left alone.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let taken_at = snapshot.taken_at;

        for flow in snapshot.flows {
            let ip = flow.source_ip.clone();
            match self.entries.get(&ip) {
                None => {
                    let revision = self.bump();
                    self.entries.insert(
                        ip.clone(),
                        Entry {
                            flow,
                            origin: Origin::Snapshot,
                            status_revision: revision,
                            floor: None,
                            pending: None,
                        },
                    );
                    changes.touch(&ip);
                }
                Some(entry) if entry.floor.is_some_and(|floor| floor > taken_at) => {
                    tracing::debug!(
                        "Ignoring stale snapshot value for {ip} (requested {taken_at}, explicit write at {:?})",
                        entry.floor
                    );
                }
                Some(entry) if entry.flow == flow => {}
                Some(entry) if entry.holds_status(flow.status) => {
                    let mut merged = flow;
                    merged.status = entry.flow.status;
                    if entry.flow != merged {
                        if let Some(entry) = self.entries.get_mut(&ip) {
                            entry.flow = merged;
                        }
                        changes.touch(&ip);
                    }
                }
                Some(entry) => {
                    let old_status = entry.flow.status;
                    let new_status = flow.status;
                    let revision = self.bump();
                    if let Some(entry) = self.entries.get_mut(&ip) {
                        entry.flow = flow;
                        entry.origin = Origin::Snapshot;
                        entry.status_revision = revision;
                    }
                    changes.touch(&ip);
                    changes.status(&ip, old_status, new_status, Initiator::System);
                }
            }
        }

        self.notify(&changes);
        changes
    }

    /// Upsert a pushed flow unconditionally.
    pub fn apply_push_update(&mut self, flow: Flow) -> ChangeSet {
        self.apply_push_update_at(flow, Utc::now())
    }

    pub(crate) fn apply_push_update_at(&mut self, flow: Flow, received_at: DateTime<Utc>) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let ip = flow.source_ip.clone();
        let revision = self.bump();
        let new_status = flow.status;

        let old = self.entries.insert(
            ip.clone(),
            Entry {
                flow,
                origin: Origin::Push,
                status_revision: revision,
                floor: Some(received_at),
                pending: None,
            },
        );

        match old {
            Some(old) => {
                if self.entries.get(&ip).map(|e| &e.flow) != Some(&old.flow) {
                    changes.touch(&ip);
                }
                changes.status(&ip, old.flow.status, new_status, Initiator::System);
            }
            None => changes.touch(&ip),
        }

        self.notify(&changes);
        changes
    }

    /// Apply an `ip_status_change` push. Unknown keys are ignored.
    pub fn apply_status_push(&mut self, ip: &str, new_status: FlowStatus, initiator: Initiator) -> ChangeSet {
        let mut changes = ChangeSet::default();
        if !self.entries.contains_key(ip) {
            tracing::debug!("Status push for unknown IP {ip} ignored");
            return changes;
        }

        let revision = self.bump();
        let now = Utc::now();
        if let Some(entry) = self.entries.get_mut(ip) {
            let old_status = entry.flow.status;
            entry.flow.status = new_status;
            entry.origin = Origin::Push;
            entry.status_revision = revision;
            entry.floor = Some(now);
            entry.pending = None;
            if old_status != new_status {
                changes.touch(ip);
                changes.status(ip, old_status, new_status, initiator);
            }
        }

        self.notify(&changes);
        changes
    }

    /// Apply an operator block/release locally before the server confirms it.
    pub fn apply_optimistic_action(
        &mut self,
        ip: &str,
        action: StatusAction,
        initiator: Initiator,
    ) -> Result<(ActionHandle, ChangeSet), AppError> {
        let Some(entry) = self.entries.get(ip) else {
            return Err(AppError::InvalidInput(format!("no flow tracked for {ip}")));
        };
        let prior = PriorState {
            status: entry.flow.status,
            origin: entry.origin,
            floor: entry.floor,
            pending: entry.pending,
        };

        let revision = self.bump();
        let new_status = action.target_status();
        let mut changes = ChangeSet::default();
        if let Some(entry) = self.entries.get_mut(ip) {
            entry.flow.status = new_status;
            entry.origin = Origin::Operator;
            entry.status_revision = revision;
            entry.floor = Some(Utc::now());
            entry.pending = Some(revision);
        }
        if prior.status != new_status {
            changes.touch(ip);
            changes.status(ip, prior.status, new_status, initiator);
        }

        self.notify(&changes);
        let handle = ActionHandle {
            ip: ip.to_string(),
            action,
            revision,
            prior,
        };
        Ok((handle, changes))
    }

    /// The server accepted the action. Local state already reflects it.
    pub fn confirm(&mut self, handle: ActionHandle) {
        if let Some(entry) = self.entries.get_mut(&handle.ip) {
            if entry.pending == Some(handle.revision) {
                entry.pending = None;
            }
        }
        tracing::debug!(
            "Confirmed {} of {} (revision {})",
            handle.action.verb(),
            handle.ip,
            handle.revision
        );
    }

    /// The server rejected the action; undo it unless something newer decided the status.
    pub fn rollback(&mut self, handle: ActionHandle) -> (RollbackOutcome, ChangeSet) {
        let mut changes = ChangeSet::default();
        let current = match self.entries.get(&handle.ip) {
            Some(entry) if entry.status_revision == handle.revision => entry.flow.status,
            _ => {
                if let Some(entry) = self.entries.get_mut(&handle.ip) {
                    if entry.pending == Some(handle.revision) {
                        entry.pending = None;
                    }
                }
                tracing::debug!(
                    "Rollback of {} for {} superseded by a newer write",
                    handle.action.verb(),
                    handle.ip
                );
                return (RollbackOutcome::Superseded, changes);
            }
        };

        let revision = self.bump();
        if let Some(entry) = self.entries.get_mut(&handle.ip) {
            entry.flow.status = handle.prior.status;
            entry.origin = handle.prior.origin;
            entry.floor = handle.prior.floor;
            entry.pending = handle.prior.pending;
            entry.status_revision = revision;
        }
        if current != handle.prior.status {
            changes.touch(&handle.ip);
            changes.status(&handle.ip, current, handle.prior.status, Initiator::System);
        }

        self.notify(&changes);
        (RollbackOutcome::Reverted, changes)
    }

    /// Flows matching `filter`, newest first. Equal timestamps order by IP.
    pub fn query(&self, filter: &FlowFilter) -> Vec<Flow> {
        let mut flows: Vec<Flow> = self
            .entries
            .values()
            .map(|e| &e.flow)
            .filter(|f| filter.matches(f))
            .cloned()
            .collect();
        flows.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.source_ip.cmp(&b.source_ip))
        });
        flows
    }

    /// Counts over the local view, classified the same way the server counts.
    pub fn summary(&self, thresholds: &RiskThresholds) -> Summary {
        Summary::from_flows(self.entries.values().map(|e| &e.flow), thresholds)
    }

    /// Drop every entry (the operator's "clear data" action).
    pub fn clear(&mut self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for ip in self.entries.keys() {
            changes.touch(ip);
        }
        self.entries.clear();
        self.notify(&changes);
        changes
    }

    /// Remove entries whose latest flow is older than `ttl` at `now`.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, ttl: Duration) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return changes;
        };
        let cutoff = now - ttl;
        self.entries.retain(|ip, entry| {
            let keep = entry.flow.timestamp >= cutoff;
            if !keep {
                changes.keys.insert(ip.clone());
            }
            keep
        });
        if !changes.is_empty() {
            tracing::debug!("Evicted {} stale flows", changes.keys.len());
        }
        self.notify(&changes);
        changes
    }

    fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    fn notify(&mut self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        for (_, listener) in self.listeners.iter_mut() {
            listener(changes);
        }
    }
}
