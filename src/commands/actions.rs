//! One-shot block, release, and note commands.
//!
//! These talk to the server directly; the optimistic path used by the live
//! view lives in [`FlowView`](crate::services::FlowView).

use crate::api::{BlockRequest, DashboardApi, NoteRequest, ReleaseRequest};
use crate::error::AppError;

use super::logic::validate_ip;

/// Block `ip`, then attach `note` if one was given.
pub async fn block_ip(
    api: &impl DashboardApi,
    operator: &str,
    ip: &str,
    reason: &str,
    note: Option<&str>,
) -> Result<String, AppError> {
    let ip = validate_ip(ip)?;
    api.block(BlockRequest {
        ip: ip.clone(),
        reason: reason.to_string(),
        operator: operator.to_string(),
    })
    .await?;

    if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
        add_note(api, operator, &ip, note).await?;
    }
    Ok(format!("IP {ip} blocked"))
}

pub async fn release_ip(
    api: &impl DashboardApi,
    operator: &str,
    ip: &str,
    note: &str,
) -> Result<String, AppError> {
    let ip = validate_ip(ip)?;
    api.release(ReleaseRequest {
        ip: ip.clone(),
        operator: operator.to_string(),
        note: note.to_string(),
    })
    .await?;
    Ok(format!("IP {ip} released"))
}

pub async fn add_note(
    api: &impl DashboardApi,
    operator: &str,
    ip: &str,
    text: &str,
) -> Result<String, AppError> {
    let ip = validate_ip(ip)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::InvalidInput("Please enter a note".into()));
    }
    api.add_note(NoteRequest {
        ip: ip.clone(),
        operator: operator.to_string(),
        note: text.to_string(),
    })
    .await?;
    Ok(format!("Note added to {ip}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_block_with_note_posts_both() {
        let api = FakeApi::default();
        let message = block_ip(&api, "alice", "10.0.0.50", "manual", Some(" syn flood "))
            .await
            .unwrap();
        assert_eq!(message, "IP 10.0.0.50 blocked");
        assert_eq!(api.blocks.lock().unwrap()[0].operator, "alice");
        assert_eq!(api.notes.lock().unwrap()[0].note, "syn flood");
    }

    #[tokio::test]
    async fn test_rejected_block_skips_note() {
        let api = FakeApi::default();
        api.reject_actions.store(true, Ordering::SeqCst);
        let err = block_ip(&api, "alice", "10.0.0.50", "manual", Some("x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ServerRejection");
        assert!(api.notes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_validates_ip_before_sending() {
        let api = FakeApi::default();
        let err = release_ip(&api, "alice", "host.example", "Manual release")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
        assert!(api.releases.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_note_rejected() {
        let api = FakeApi::default();
        assert!(add_note(&api, "alice", "10.0.0.50", "   ").await.is_err());
    }
}
