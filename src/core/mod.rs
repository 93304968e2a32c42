//! Core logic: flow model, reconciliation store, and the derived views.
//!
//! - [`FlowStateStore`]: current flow per source IP, reconciled from polls, pushes, and operator actions
//! - [`Flow`] / [`FlowStatus`] / [`StatusChangeEvent`]: the data model and boundary validation
//! - [`Summary`]: headline counts
//! - [`AuditLogView`]: filtered view over the audit log
//! - [`VerificationQueue`]: suspicious IPs awaiting a decision

pub mod audit;
pub mod flow;
pub mod store;
pub mod summary;
pub mod verification;

pub use audit::{AuditAction, AuditEntry, AuditFilter, AuditLogView};
pub use flow::{Flow, FlowStatus, Initiator, RiskThresholds, StatusChangeEvent};
pub use store::{
    ActionHandle, ActionRequest, ChangeSet, FlowFilter, FlowStateStore, ListenerId,
    RollbackOutcome, Snapshot, StatusAction,
};
pub use summary::Summary;
pub use verification::VerificationQueue;
