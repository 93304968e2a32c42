//! In-memory [`DashboardApi`] for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{
    BlockRequest, DashboardApi, IpDetail, NoteRequest, ReleaseRequest, Settings, SettingsUpdate,
};
use crate::core::{AuditEntry, Flow, Summary};
use crate::error::AppError;

pub(crate) struct FakeApi {
    pub flows: Mutex<Vec<Flow>>,
    pub details: Mutex<HashMap<String, IpDetail>>,
    pub logs: Mutex<Vec<AuditEntry>>,
    pub settings: Mutex<Settings>,
    pub reject_actions: AtomicBool,
    pub blocks: Mutex<Vec<BlockRequest>>,
    pub releases: Mutex<Vec<ReleaseRequest>>,
    pub notes: Mutex<Vec<NoteRequest>>,
    pub summary_calls: AtomicUsize,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            flows: Mutex::new(Vec::new()),
            details: Mutex::new(HashMap::new()),
            logs: Mutex::new(Vec::new()),
            settings: Mutex::new(Settings {
                auto_block: true,
                threshold: 0.9,
            }),
            reject_actions: AtomicBool::new(false),
            blocks: Mutex::new(Vec::new()),
            releases: Mutex::new(Vec::new()),
            notes: Mutex::new(Vec::new()),
            summary_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeApi {
    pub fn with_flows(flows: Vec<Flow>) -> Self {
        Self {
            flows: Mutex::new(flows),
            ..Default::default()
        }
    }

    fn outcome(&self) -> Result<(), AppError> {
        if self.reject_actions.load(Ordering::SeqCst) {
            Err(AppError::ServerRejection { status: 500 })
        } else {
            Ok(())
        }
    }
}

impl DashboardApi for FakeApi {
    async fn fetch_flows(&self, limit: usize) -> Result<Vec<Flow>, AppError> {
        let flows = self.flows.lock().unwrap();
        Ok(flows.iter().take(limit).cloned().collect())
    }

    async fn fetch_summary(&self) -> Result<Summary, AppError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        let flows = self.flows.lock().unwrap();
        Ok(Summary::from_flows(flows.iter(), &Default::default()))
    }

    async fn fetch_ip(&self, ip: &str) -> Result<IpDetail, AppError> {
        self.details
            .lock()
            .unwrap()
            .get(ip)
            .cloned()
            .ok_or(AppError::ServerRejection { status: 404 })
    }

    async fn block(&self, req: BlockRequest) -> Result<(), AppError> {
        self.blocks.lock().unwrap().push(req);
        self.outcome()
    }

    async fn release(&self, req: ReleaseRequest) -> Result<(), AppError> {
        self.releases.lock().unwrap().push(req);
        self.outcome()
    }

    async fn add_note(&self, req: NoteRequest) -> Result<(), AppError> {
        self.notes.lock().unwrap().push(req);
        Ok(())
    }

    async fn fetch_logs(&self, limit: usize) -> Result<Vec<AuditEntry>, AppError> {
        let logs = self.logs.lock().unwrap();
        Ok(logs.iter().take(limit).cloned().collect())
    }

    async fn fetch_settings(&self) -> Result<Settings, AppError> {
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, AppError> {
        update.validate()?;
        let mut settings = self.settings.lock().unwrap();
        if let Some(auto_block) = update.auto_block {
            settings.auto_block = auto_block;
        }
        if let Some(threshold) = update.threshold {
            settings.threshold = threshold;
        }
        Ok(settings.clone())
    }
}
