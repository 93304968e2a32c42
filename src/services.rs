//! Background tasks of a dashboard session.
//!
//! `FlowView` is the single task that owns a [`FlowStateStore`]. Poll results,
//! push events, operator commands, and the outcomes of server calls all reach
//! it over channels and are handled one at a time, so the store is never
//! shared. Server calls run on spawned tasks and report back as completions.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::api::{BlockRequest, DashboardApi, NoteRequest, ReleaseRequest, Settings};
use crate::config::{self, DashboardConfig};
use crate::core::{
    ActionHandle, ActionRequest, ChangeSet, Flow, FlowFilter, FlowStateStore, Initiator,
    RollbackOutcome, Snapshot, StatusAction, Summary, VerificationQueue,
};
use crate::error::AppError;
use crate::push::{OutboundEvent, PushEvent};
use crate::ui::{format_risk, Notifier, Renderer};

/// Periodic fetch with cooperative cancellation.
///
/// The first fetch starts immediately. Fetches never overlap: a tick that
/// arrives while one is pending is skipped. After [`cancel`](Self::cancel) no
/// further fetch starts, and a fetch already in flight has its result
/// discarded. Dropping the handle cancels.
pub struct PollTask {
    cancelled: Arc<AtomicBool>,
}

impl PollTask {
    pub fn spawn<T, F, Fut>(period: Duration, mut fetch: F, results: mpsc::Sender<T>) -> Self
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }
                let result = fetch().await;
                if flag.load(Ordering::Relaxed) {
                    tracing::debug!("Discarding poll result that resolved after cancel");
                    break;
                }
                if results.send(result).await.is_err() {
                    break;
                }
            }
        });
        Self { cancelled }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Operator input to a running [`FlowView`].
#[derive(Debug)]
pub enum ViewCommand {
    /// Block or release, applied locally before the server answers.
    Act(ActionRequest),
    Note { ip: String, text: String },
    SetFilter(FlowFilter),
    /// Toggle an IP in the verification selection.
    Select(String),
    VerificationNote { ip: String, note: String },
    /// Decide one verification candidate.
    Decide { ip: String, action: StatusAction },
    /// Apply `action` to every selected verification candidate.
    Bulk(StatusAction),
    Clear,
    Query {
        filter: FlowFilter,
        reply: oneshot::Sender<Vec<Flow>>,
    },
    Candidates(oneshot::Sender<Vec<Flow>>),
    Shutdown,
}

enum Completion {
    Action {
        handle: ActionHandle,
        request: ActionRequest,
        result: Result<(), AppError>,
    },
    Note {
        ip: String,
        result: Result<(), AppError>,
    },
    Summary(Result<Summary, AppError>),
    Settings(Result<Settings, AppError>),
}

/// The task that owns one store and everything drawn from it.
pub struct FlowView<A, R, N> {
    api: Arc<A>,
    config: DashboardConfig,
    store: FlowStateStore,
    queue: VerificationQueue,
    filter: FlowFilter,
    settings: Option<Settings>,
    renderer: R,
    notifier: N,
    outbound: Option<mpsc::Sender<OutboundEvent>>,
    push_connected: bool,
    completions: mpsc::Sender<Completion>,
    completions_rx: Option<mpsc::Receiver<Completion>>,
    changes_rx: mpsc::UnboundedReceiver<ChangeSet>,
}

impl<A, R, N> FlowView<A, R, N>
where
    A: DashboardApi,
    R: Renderer,
    N: Notifier,
{
    pub fn new(api: Arc<A>, config: DashboardConfig, renderer: R, notifier: N) -> Self {
        let mut store = FlowStateStore::new();
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let _ = store.on_change(move |changes| {
            let _ = changes_tx.send(changes.clone());
        });
        let (completions, completions_rx) = mpsc::channel(crate::config::CHANNEL_CAPACITY);
        Self {
            api,
            config,
            store,
            queue: VerificationQueue::new(),
            filter: FlowFilter::default(),
            settings: None,
            renderer,
            notifier,
            outbound: None,
            push_connected: false,
            completions,
            completions_rx: Some(completions_rx),
            changes_rx,
        }
    }

    /// Route `request_summary` through the push channel instead of HTTP.
    pub fn with_outbound(mut self, outbound: mpsc::Sender<OutboundEvent>) -> Self {
        self.outbound = Some(outbound);
        self
    }

    /// Run until `Shutdown` or until every command sender is gone.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ViewCommand>, mut push: mpsc::Receiver<PushEvent>) {
        let Some(mut completions_rx) = self.completions_rx.take() else {
            return;
        };
        let (poll_tx, mut poll_rx) = mpsc::channel(1);
        let poller = self.spawn_poller(poll_tx);
        self.spawn_summary_fetch();
        self.spawn_settings_fetch();

        let mut push_open = true;
        loop {
            tokio::select! {
                Some(result) = poll_rx.recv() => self.on_poll(result),
                event = push.recv(), if push_open => match event {
                    Some(event) => self.on_push(event),
                    None => push_open = false,
                },
                Some(done) = completions_rx.recv() => self.on_completion(done),
                command = commands.recv() => match command {
                    Some(ViewCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
            }
            self.flush_changes();
        }

        poller.cancel();
        tracing::info!("Flow view stopped");
    }

    fn spawn_poller(&self, results: mpsc::Sender<Result<Snapshot, AppError>>) -> PollTask {
        let api = Arc::clone(&self.api);
        let limit = self.config.page_size;
        PollTask::spawn(
            self.config.poll_interval,
            move || {
                let api = Arc::clone(&api);
                async move {
                    let taken_at = Utc::now();
                    let flows = api.fetch_flows(limit).await?;
                    Ok::<_, AppError>(Snapshot::new(taken_at, flows))
                }
            },
            results,
        )
    }

    fn on_poll(&mut self, result: Result<Snapshot, AppError>) {
        match result {
            Ok(snapshot) => {
                let changes = self.store.apply_snapshot(snapshot);
                self.warn_auto_blocks(&changes);
                if let Some(ttl) = self.config.flow_ttl {
                    let _ = self.store.evict_stale(Utc::now(), ttl);
                }
                self.queue.prune(&self.store);
            }
            Err(e) => tracing::warn!("Flow poll failed: {e}"),
        }
    }

    fn on_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::Connected => {
                self.push_connected = true;
                self.renderer.connection_status(true);
            }
            PushEvent::Disconnected => {
                self.push_connected = false;
                self.renderer.connection_status(false);
            }
            PushEvent::SummaryUpdate(summary) => self.show_summary(summary),
            PushEvent::FlowUpdate(flow) => {
                let _ = self.store.apply_push_update(flow);
                self.spawn_summary_fetch();
            }
            PushEvent::IpStatusChange(change) => {
                let known = self.store.get(&change.ip).is_some();
                let _ = self
                    .store
                    .apply_status_push(&change.ip, change.new_status, change.initiator.clone());
                if known && change.is_auto_block() {
                    let message = self.auto_block_message(&change.ip);
                    self.notifier.warning(&message);
                }
                self.queue.prune(&self.store);
            }
            PushEvent::SettingsUpdated(settings) => {
                self.show_settings(settings);
                self.notifier.info("Settings updated");
            }
        }
    }

    fn on_command(&mut self, command: ViewCommand) {
        match command {
            ViewCommand::Act(request) => self.start_action(request),
            ViewCommand::Note { ip, text } => self.start_note(ip, text),
            ViewCommand::SetFilter(filter) => {
                self.filter = filter;
                self.render_flows();
            }
            ViewCommand::Select(ip) => {
                let selected = self.queue.toggle(&ip);
                tracing::debug!("{ip} {}", if selected { "selected" } else { "deselected" });
            }
            ViewCommand::VerificationNote { ip, note } => self.queue.set_note(&ip, &note),
            ViewCommand::Decide { ip, action } => {
                let request = self.queue.decide(&ip, action);
                self.start_action(request);
            }
            ViewCommand::Bulk(action) => {
                if !self.queue.has_selection() {
                    self.notifier.warning("No IPs selected");
                    return;
                }
                for request in self.queue.bulk(action) {
                    self.start_action(request);
                }
            }
            ViewCommand::Clear => {
                let cleared = self.store.clear();
                self.queue.prune(&self.store);
                self.notifier.info(&format!("Cleared {} flows", cleared.keys.len()));
            }
            ViewCommand::Query { filter, reply } => {
                let _ = reply.send(self.store.query(&filter));
            }
            ViewCommand::Candidates(reply) => {
                let _ = reply.send(self.queue.candidates(&self.store));
            }
            ViewCommand::Shutdown => {}
        }
    }

    fn start_action(&mut self, request: ActionRequest) {
        let initiator = Initiator::operator(self.config.operator.as_str());
        let handle = match self.store.apply_optimistic_action(&request.ip, request.action, initiator) {
            Ok((handle, _)) => handle,
            Err(e) => {
                self.notifier.error(&format!("Cannot update {}: {e}", request.ip));
                return;
            }
        };

        let api = Arc::clone(&self.api);
        let operator = self.config.operator.clone();
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = match request.action {
                StatusAction::Block => {
                    api.block(BlockRequest {
                        ip: request.ip.clone(),
                        reason: request
                            .reason
                            .clone()
                            .unwrap_or_else(|| config::MANUAL_BLOCK_REASON.to_string()),
                        operator,
                    })
                    .await
                }
                StatusAction::Release => {
                    api.release(ReleaseRequest {
                        ip: request.ip.clone(),
                        operator,
                        note: request
                            .note
                            .clone()
                            .unwrap_or_else(|| config::MANUAL_RELEASE_NOTE.to_string()),
                    })
                    .await
                }
            };
            let _ = tx
                .send(Completion::Action {
                    handle,
                    request,
                    result,
                })
                .await;
        });
    }

    fn start_note(&mut self, ip: String, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            self.notifier.error("Please enter a note");
            return;
        }
        let api = Arc::clone(&self.api);
        let operator = self.config.operator.clone();
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = api
                .add_note(NoteRequest {
                    ip: ip.clone(),
                    operator,
                    note: text,
                })
                .await;
            let _ = tx.send(Completion::Note { ip, result }).await;
        });
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Action {
                handle,
                request,
                result: Ok(()),
            } => {
                self.store.confirm(handle);
                self.notifier
                    .success(&format!("IP {} {}", request.ip, request.action.verb()));
                if request.action == StatusAction::Block {
                    if let Some(note) = request.note {
                        self.start_note(request.ip, note);
                    }
                }
                self.request_summary();
            }
            Completion::Action {
                handle,
                request,
                result: Err(e),
            } => {
                let (outcome, _) = self.store.rollback(handle);
                if outcome == RollbackOutcome::Superseded {
                    tracing::info!(
                        "Server rejected {} of {}; a newer update already decided its status",
                        request.action.verb(),
                        request.ip
                    );
                }
                let verb = match request.action {
                    StatusAction::Block => "block",
                    StatusAction::Release => "release",
                };
                self.notifier
                    .error(&format!("Failed to {verb} IP {}: {e}", request.ip));
            }
            Completion::Note { ip, result } => match result {
                Ok(()) => self.notifier.success(&format!("Note added to {ip}")),
                Err(e) => self.notifier.error(&format!("Failed to add note to {ip}: {e}")),
            },
            Completion::Summary(Ok(summary)) => self.show_summary(summary),
            Completion::Summary(Err(e)) => tracing::warn!("Summary refresh failed: {e}"),
            Completion::Settings(Ok(settings)) => self.show_settings(settings),
            Completion::Settings(Err(e)) => tracing::debug!("Settings unavailable: {e}"),
        }
    }

    /// Over the push channel while it is up, otherwise over HTTP.
    fn request_summary(&mut self) {
        if let Some(outbound) = self.outbound.as_ref().filter(|_| self.push_connected) {
            if outbound.try_send(OutboundEvent::RequestSummary).is_ok() {
                return;
            }
        }
        self.spawn_summary_fetch();
    }

    fn spawn_summary_fetch(&self) {
        let api = Arc::clone(&self.api);
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = api.fetch_summary().await;
            let _ = tx.send(Completion::Summary(result)).await;
        });
    }

    fn spawn_settings_fetch(&self) {
        let api = Arc::clone(&self.api);
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = api.fetch_settings().await;
            let _ = tx.send(Completion::Settings(result)).await;
        });
    }

    fn show_summary(&mut self, summary: Summary) {
        self.renderer.render_summary(&summary);
    }

    fn show_settings(&mut self, settings: Settings) {
        self.renderer.settings(&settings);
        self.settings = Some(settings);
    }

    fn auto_block_message(&self, ip: &str) -> String {
        match &self.settings {
            Some(settings) => format!("IP {ip} auto-blocked ({}+)", format_risk(settings.threshold)),
            None => format!("IP {ip} auto-blocked"),
        }
    }

    fn warn_auto_blocks(&mut self, changes: &ChangeSet) {
        for change in changes.status_changes.iter().filter(|c| c.is_auto_block()) {
            let message = self.auto_block_message(&change.ip);
            self.notifier.warning(&message);
        }
    }

    /// Redraw once for every batch of store changes since the last event.
    fn flush_changes(&mut self) {
        let mut dirty = false;
        while let Ok(changes) = self.changes_rx.try_recv() {
            dirty = true;
            for change in &changes.status_changes {
                self.renderer.highlight(change);
            }
        }
        if dirty {
            self.render_flows();
        }
    }

    fn render_flows(&mut self) {
        let flows = self.store.query(&self.filter);
        self.renderer.render_flows(&flows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use crate::core::flow::tests::{at, make_flow};
    use crate::core::{FlowStatus, StatusChangeEvent};
    use crate::ui::Level;

    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::Notify;
    use tokio::task::JoinHandle;

    #[derive(Default, Clone)]
    struct Recorder {
        messages: Arc<Mutex<Vec<(Level, String)>>>,
        highlights: Arc<Mutex<Vec<StatusChangeEvent>>>,
        renders: Arc<AtomicUsize>,
        connected: Arc<Mutex<Option<bool>>>,
    }

    impl Recorder {
        fn has(&self, level: Level, needle: &str) -> bool {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .any(|(l, m)| *l == level && m.contains(needle))
        }
    }

    impl Notifier for Recorder {
        fn notify(&mut self, level: Level, message: &str) {
            self.messages.lock().unwrap().push((level, message.to_string()));
        }
    }

    impl Renderer for Recorder {
        fn render_flows(&mut self, _flows: &[Flow]) {
            self.renders.fetch_add(1, Ordering::SeqCst);
        }
        fn render_summary(&mut self, _summary: &Summary) {}
        fn highlight(&mut self, change: &StatusChangeEvent) {
            self.highlights.lock().unwrap().push(change.clone());
        }
        fn connection_status(&mut self, connected: bool) {
            *self.connected.lock().unwrap() = Some(connected);
        }
        fn settings(&mut self, _settings: &Settings) {}
    }

    struct Session {
        api: Arc<FakeApi>,
        recorder: Recorder,
        commands: mpsc::Sender<ViewCommand>,
        push: mpsc::Sender<PushEvent>,
        task: JoinHandle<()>,
    }

    impl Session {
        fn start(api: FakeApi) -> Self {
            Self::start_with(api, None)
        }

        fn start_with(api: FakeApi, outbound: Option<mpsc::Sender<OutboundEvent>>) -> Self {
            let api = Arc::new(api);
            let recorder = Recorder::default();
            let config = DashboardConfig {
                operator: "alice".into(),
                poll_interval: Duration::from_secs(3600),
                ..DashboardConfig::default()
            };
            let mut view = FlowView::new(Arc::clone(&api), config, recorder.clone(), recorder.clone());
            if let Some(outbound) = outbound {
                view = view.with_outbound(outbound);
            }
            let (commands, commands_rx) = mpsc::channel(16);
            let (push, push_rx) = mpsc::channel(16);
            let task = tokio::spawn(view.run(commands_rx, push_rx));
            Self {
                api,
                recorder,
                commands,
                push,
                task,
            }
        }

        async fn query(&self) -> Vec<Flow> {
            let (reply, rx) = oneshot::channel();
            self.commands
                .send(ViewCommand::Query {
                    filter: FlowFilter::default(),
                    reply,
                })
                .await
                .unwrap();
            rx.await.unwrap()
        }

        async fn status_of(&self, ip: &str) -> Option<FlowStatus> {
            self.query()
                .await
                .into_iter()
                .find(|f| f.source_ip == ip)
                .map(|f| f.status)
        }

        async fn wait_status(&self, ip: &str, status: FlowStatus) {
            for _ in 0..400 {
                if self.status_of(ip).await == Some(status) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("{ip} never reached {status}");
        }

        async fn set_connected(&self, connected: bool) {
            let event = if connected {
                PushEvent::Connected
            } else {
                PushEvent::Disconnected
            };
            self.push.send(event).await.unwrap();
            let seen = Arc::clone(&self.recorder.connected);
            eventually(|| *seen.lock().unwrap() == Some(connected)).await;
        }

        async fn loaded(self) -> Self {
            for _ in 0..200 {
                if !self.query().await.is_empty() {
                    return self;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("initial snapshot never arrived");
        }

        async fn shutdown(self) {
            self.commands.send(ViewCommand::Shutdown).await.unwrap();
            self.task.await.unwrap();
        }
    }

    async fn eventually(cond: impl Fn() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    fn seed() -> Vec<Flow> {
        vec![
            make_flow("192.168.1.100", FlowStatus::HighRisk, at(3)),
            make_flow("10.0.0.50", FlowStatus::Suspicious, at(2)),
            make_flow("172.16.0.20", FlowStatus::Suspicious, at(1)),
        ]
    }

    #[tokio::test]
    async fn test_poll_task_discards_result_after_cancel() {
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel(4);

        let task = {
            let gate = Arc::clone(&gate);
            let calls = Arc::clone(&calls);
            PollTask::spawn(
                Duration::from_millis(10),
                move || {
                    let gate = Arc::clone(&gate);
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        gate.notified().await;
                        42u32
                    }
                },
                tx,
            )
        };

        eventually(|| calls.load(Ordering::SeqCst) == 1).await;
        task.cancel();
        gate.notify_one();

        let next = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(next, None, "result resolved after cancel must be dropped");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "fetches never overlap");
    }

    #[tokio::test]
    async fn test_poll_task_delivers_until_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        let task = PollTask::spawn(Duration::from_millis(5), || async { "tick" }, tx);
        assert_eq!(rx.recv().await, Some("tick"));
        assert_eq!(rx.recv().await, Some("tick"));
        drop(task);
        while rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_block_is_optimistic_and_confirmed() {
        let session = Session::start(FakeApi::with_flows(seed())).loaded().await;
        session
            .commands
            .send(ViewCommand::Act(ActionRequest::block("10.0.0.50", config::MANUAL_BLOCK_REASON)))
            .await
            .unwrap();

        assert_eq!(session.status_of("10.0.0.50").await, Some(FlowStatus::Blocked));
        let recorder = session.recorder.clone();
        eventually(|| recorder.has(Level::Success, "IP 10.0.0.50 blocked")).await;

        let blocks = session.api.blocks.lock().unwrap().clone();
        assert_eq!(
            blocks,
            vec![BlockRequest {
                ip: "10.0.0.50".into(),
                reason: "manual".into(),
                operator: "alice".into(),
            }]
        );
        assert_eq!(session.status_of("10.0.0.50").await, Some(FlowStatus::Blocked));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_release_rolls_back() {
        let api = FakeApi::with_flows(vec![make_flow("203.0.113.45", FlowStatus::Blocked, at(1))]);
        api.reject_actions.store(true, Ordering::SeqCst);
        let session = Session::start(api).loaded().await;

        session
            .commands
            .send(ViewCommand::Act(ActionRequest::release("203.0.113.45", config::MANUAL_RELEASE_NOTE)))
            .await
            .unwrap();

        let recorder = session.recorder.clone();
        eventually(|| recorder.has(Level::Error, "Failed to release IP 203.0.113.45")).await;
        assert_eq!(session.status_of("203.0.113.45").await, Some(FlowStatus::Blocked));
        assert_eq!(
            session.api.releases.lock().unwrap()[0].note,
            "Manual release"
        );
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_action_on_unknown_ip_reports_error() {
        let session = Session::start(FakeApi::with_flows(seed())).loaded().await;
        session
            .commands
            .send(ViewCommand::Act(ActionRequest::block("8.8.8.8", "manual")))
            .await
            .unwrap();
        let recorder = session.recorder.clone();
        eventually(|| recorder.has(Level::Error, "Cannot update 8.8.8.8")).await;
        assert!(session.api.blocks.lock().unwrap().is_empty());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_auto_block_push_warns_and_highlights() {
        let session = Session::start(FakeApi::with_flows(seed())).loaded().await;
        session
            .push
            .send(PushEvent::IpStatusChange(StatusChangeEvent {
                ip: "192.168.1.100".into(),
                old_status: FlowStatus::HighRisk,
                new_status: FlowStatus::Blocked,
                initiator: Initiator::System,
            }))
            .await
            .unwrap();

        let recorder = session.recorder.clone();
        eventually(|| recorder.has(Level::Warning, "IP 192.168.1.100 auto-blocked")).await;
        assert_eq!(session.status_of("192.168.1.100").await, Some(FlowStatus::Blocked));
        assert!(recorder
            .highlights
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.ip == "192.168.1.100" && c.new_status == FlowStatus::Blocked));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_flow_push_upserts_and_refreshes_summary() {
        let session = Session::start(FakeApi::with_flows(seed())).loaded().await;
        let api = Arc::clone(&session.api);
        eventually(|| api.summary_calls.load(Ordering::SeqCst) >= 1).await;
        let before = api.summary_calls.load(Ordering::SeqCst);

        let flow = make_flow("198.51.100.200", FlowStatus::HighRisk, Utc::now());
        session.push.send(PushEvent::FlowUpdate(flow)).await.unwrap();

        session.wait_status("198.51.100.200", FlowStatus::HighRisk).await;
        eventually(|| api.summary_calls.load(Ordering::SeqCst) > before).await;
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_bulk_verification_blocks_selection_and_posts_notes() {
        let session = Session::start(FakeApi::with_flows(seed())).loaded().await;
        let c = &session.commands;
        c.send(ViewCommand::Select("10.0.0.50".into())).await.unwrap();
        c.send(ViewCommand::Select("172.16.0.20".into())).await.unwrap();
        c.send(ViewCommand::VerificationNote {
            ip: "10.0.0.50".into(),
            note: "syn flood".into(),
        })
        .await
        .unwrap();
        c.send(ViewCommand::Bulk(StatusAction::Block)).await.unwrap();

        let api = Arc::clone(&session.api);
        eventually(|| api.notes.lock().unwrap().len() == 1).await;
        let blocks = api.blocks.lock().unwrap().clone();
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.reason == "verification"));
        assert_eq!(api.notes.lock().unwrap()[0].note, "syn flood");

        let (reply, rx) = oneshot::channel();
        c.send(ViewCommand::Candidates(reply)).await.unwrap();
        assert!(rx.await.unwrap().is_empty());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_bulk_without_selection_warns() {
        let session = Session::start(FakeApi::with_flows(seed())).loaded().await;
        session
            .commands
            .send(ViewCommand::Bulk(StatusAction::Release))
            .await
            .unwrap();
        let recorder = session.recorder.clone();
        eventually(|| recorder.has(Level::Warning, "No IPs selected")).await;
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_clear_empties_view() {
        let session = Session::start(FakeApi::with_flows(seed())).loaded().await;
        session.commands.send(ViewCommand::Clear).await.unwrap();
        assert!(session.query().await.is_empty());
        assert!(session.recorder.has(Level::Info, "Cleared 3 flows"));
        assert!(session.recorder.renders.load(Ordering::SeqCst) >= 2);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_summary_after_action_uses_push_only_while_connected() {
        let (outbound, mut outbound_rx) = mpsc::channel(16);
        let session = Session::start_with(FakeApi::with_flows(seed()), Some(outbound))
            .loaded()
            .await;
        let api = Arc::clone(&session.api);
        let recorder = session.recorder.clone();
        eventually(|| api.summary_calls.load(Ordering::SeqCst) >= 1).await;

        session.set_connected(true).await;
        let before = api.summary_calls.load(Ordering::SeqCst);
        session
            .commands
            .send(ViewCommand::Act(ActionRequest::block("10.0.0.50", "manual")))
            .await
            .unwrap();
        eventually(|| recorder.has(Level::Success, "IP 10.0.0.50 blocked")).await;
        let sent = tokio::time::timeout(Duration::from_secs(2), outbound_rx.recv())
            .await
            .unwrap();
        assert!(matches!(sent, Some(OutboundEvent::RequestSummary)));
        assert_eq!(api.summary_calls.load(Ordering::SeqCst), before);

        session.set_connected(false).await;
        session
            .commands
            .send(ViewCommand::Act(ActionRequest::block("172.16.0.20", "manual")))
            .await
            .unwrap();
        eventually(|| recorder.has(Level::Success, "IP 172.16.0.20 blocked")).await;
        eventually(|| api.summary_calls.load(Ordering::SeqCst) > before).await;
        assert!(outbound_rx.try_recv().is_err());
        session.shutdown().await;
    }
}
