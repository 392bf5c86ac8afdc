use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use probe_core::{
    build_directory, format_json_params, params_are_valid_json, DirectoryNode, GatewayError,
    InsertRecord, InvocationRecord, InvokeOutcome, InvokeReply, Notification, RecordGateway,
    Selection, SelectionOrigin, TargetDescriptor, TargetId, UpdateRecord,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, info, warn};

use crate::registry::{TargetPatch, TargetRegistry};
use crate::state::{Epoch, SessionState};

pub const RECORD_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const NOTICE_VISIBLE_FOR: Duration = Duration::from_secs(3);
const COMMAND_QUEUE_CAPACITY: usize = 64;
const COMPLETION_QUEUE_CAPACITY: usize = 64;

/// User or programmatic actions driving the session. Asynchronous call
/// sites never touch `SessionState` themselves; their results come back
/// through the same queue as these commands, so the synchronizer task is
/// the single mutation path.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    AddTarget { name: String, host: String, port: u16 },
    UpdateTarget { id: TargetId, patch: TargetPatch },
    RemoveTarget { id: TargetId },
    ActivateTarget { id: TargetId },
    SelectService { service: Option<String> },
    SelectMethod { method: Option<String> },
    SelectRecord { record: InvocationRecord, origin: SelectionOrigin },
    ClearSelection,
    EditParams { text: String },
    Invoke,
    SaveRecord,
    UpdateSelectedRecord,
    RenameRecord { id: i64, name: String },
    DeleteRecord { id: i64 },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MutationAction {
    Insert,
    Update,
    Rename,
    Delete { id: i64 },
}

impl MutationAction {
    fn label(self) -> &'static str {
        match self {
            MutationAction::Insert => "save",
            MutationAction::Update => "update",
            MutationAction::Rename => "rename",
            MutationAction::Delete { .. } => "delete",
        }
    }

    fn done_message(self) -> &'static str {
        match self {
            MutationAction::Insert => "test case saved",
            MutationAction::Update => "test case updated",
            MutationAction::Rename => "test case renamed",
            MutationAction::Delete { .. } => "test case deleted",
        }
    }
}

/// Results funneled back from in-flight gateway calls. Each carries the
/// tags that were live when the request was issued; `apply_completion`
/// compares them to current state and silently drops anything stale.
#[derive(Debug)]
pub(crate) enum Completion {
    Services {
        epoch: Epoch,
        port: u16,
        outcome: Result<Vec<String>, GatewayError>,
    },
    Methods {
        epoch: Epoch,
        service: String,
        outcome: Result<Vec<String>, GatewayError>,
    },
    Records {
        epoch: Epoch,
        method: Option<String>,
        outcome: Result<Vec<InvocationRecord>, GatewayError>,
    },
    Directory {
        port: u16,
        outcome: Result<Vec<DirectoryNode>, GatewayError>,
    },
    Invoke {
        outcome: Result<InvokeReply, GatewayError>,
    },
    Mutation {
        action: MutationAction,
        outcome: Result<(), GatewayError>,
    },
}

/// Handle held by consumers: a command sender plus a watch receiver of
/// state snapshots.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }
}

/// Spawns the session task. The seeded registry's first target (if any)
/// becomes active and its catalog load is issued immediately.
pub fn spawn_session(
    gateway: Arc<dyn RecordGateway>,
    seed_targets: Vec<TargetDescriptor>,
) -> (SessionHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_QUEUE_CAPACITY);
    let (watch_tx, watch_rx) = watch::channel(SessionState::new());
    let registry = TargetRegistry::new(seed_targets);
    let synchronizer = Synchronizer::new(gateway, registry, completion_tx, watch_tx);
    let task = tokio::spawn(run(synchronizer, command_rx, completion_rx));
    (
        SessionHandle {
            commands: command_tx,
            state: watch_rx,
        },
        task,
    )
}

async fn run(
    mut sync: Synchronizer,
    mut command_rx: mpsc::Receiver<SessionCommand>,
    mut completion_rx: mpsc::Receiver<Completion>,
) {
    sync.bootstrap();
    sync.publish();
    let mut poll = sync.rebuild_poll();

    loop {
        tokio::select! {
            maybe_command = command_rx.recv() => {
                match maybe_command {
                    None | Some(SessionCommand::Shutdown) => break,
                    Some(command) => sync.handle_command(command),
                }
            }
            Some(completion) = completion_rx.recv() => {
                sync.apply_completion(completion);
            }
            _ = tick_or_pending(poll.as_mut()) => {
                sync.handle_poll_tick();
            }
            _ = clear_at_or_pending(sync.notice_deadline) => {
                sync.clear_notification();
            }
        }

        if sync.take_poll_dirty() {
            poll = sync.rebuild_poll();
        }
        sync.publish();
    }
    info!(event = "session_stopped");
}

async fn tick_or_pending(poll: Option<&mut Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn clear_at_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub(crate) struct Synchronizer {
    gateway: Arc<dyn RecordGateway>,
    registry: TargetRegistry,
    pub(crate) state: SessionState,
    completion_tx: mpsc::Sender<Completion>,
    watch_tx: watch::Sender<SessionState>,
    poll_dirty: bool,
    notice_deadline: Option<Instant>,
}

impl Synchronizer {
    pub(crate) fn new(
        gateway: Arc<dyn RecordGateway>,
        registry: TargetRegistry,
        completion_tx: mpsc::Sender<Completion>,
        watch_tx: watch::Sender<SessionState>,
    ) -> Self {
        Self {
            gateway,
            registry,
            state: SessionState::new(),
            completion_tx,
            watch_tx,
            poll_dirty: false,
            notice_deadline: None,
        }
    }

    pub(crate) fn bootstrap(&mut self) {
        self.sync_targets();
        if self.registry.active().is_some() {
            self.target_changed();
        }
    }

    pub(crate) fn publish(&self) {
        let _ = self.watch_tx.send(self.state.clone());
    }

    pub(crate) fn take_poll_dirty(&mut self) -> bool {
        std::mem::take(&mut self.poll_dirty)
    }

    /// The poll interval only exists while a service is active, and is
    /// rebuilt from scratch whenever the active service or method moves so
    /// a stale timer can never refresh the wrong filter.
    pub(crate) fn rebuild_poll(&self) -> Option<Interval> {
        self.state.active_service.as_ref()?;
        Some(interval_at(
            Instant::now() + RECORD_POLL_INTERVAL,
            RECORD_POLL_INTERVAL,
        ))
    }

    fn active_port(&self) -> Option<u16> {
        self.registry.active().map(|target| target.port)
    }

    fn sync_targets(&mut self) {
        self.state.targets = self.registry.targets().to_vec();
        self.state.active_target = self.registry.active_id();
    }

    pub(crate) fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::AddTarget { name, host, port } => {
                let id = self.registry.add(name, host, port);
                info!(event = "target_added", target = %id, port);
                self.target_changed();
            }
            SessionCommand::UpdateTarget { id, patch } => {
                if self.registry.update(id, patch) {
                    self.sync_targets();
                } else {
                    self.notify_error("unknown target");
                }
            }
            SessionCommand::RemoveTarget { id } => {
                let was_active = self.registry.active_id() == Some(id);
                if !self.registry.remove(id) {
                    return;
                }
                info!(event = "target_removed", target = %id, was_active);
                if was_active {
                    self.target_changed();
                } else {
                    self.sync_targets();
                }
            }
            SessionCommand::ActivateTarget { id } => {
                if self.registry.active_id() == Some(id) {
                    return;
                }
                if self.registry.set_active(id) {
                    self.target_changed();
                } else {
                    self.notify_error("unknown target");
                }
            }
            SessionCommand::SelectService { service } => {
                let service = service.filter(|name| !name.trim().is_empty());
                self.service_changed(service);
            }
            SessionCommand::SelectMethod { method } => {
                self.state.active_method = method;
                self.issue_records();
                self.poll_dirty = true;
            }
            SessionCommand::SelectRecord { record, origin } => {
                self.state.edit_buffer = format_json_params(&record.json_params);
                self.state.selection = Some(Selection { record, origin });
            }
            SessionCommand::ClearSelection => {
                self.state.selection = None;
            }
            SessionCommand::EditParams { text } => {
                self.state.edit_buffer = text;
            }
            SessionCommand::Invoke => self.handle_invoke(),
            SessionCommand::SaveRecord => self.handle_save(),
            SessionCommand::UpdateSelectedRecord => self.handle_update_selected(),
            SessionCommand::RenameRecord { id, name } => {
                self.issue_update(UpdateRecord::rename(id, name), MutationAction::Rename);
            }
            SessionCommand::DeleteRecord { id } => self.issue_delete(id),
            // The run loop breaks before dispatching Shutdown here.
            SessionCommand::Shutdown => {}
        }
    }

    /// Target cascade: new epoch, filters cleared, catalog and directory
    /// reloads issued for the new target. The selection is left alone.
    fn target_changed(&mut self) {
        self.state.epoch.bump();
        self.state.active_service = None;
        self.state.active_method = None;
        self.state.methods.clear();
        self.state.records.clear();
        self.state.loading_methods = false;
        self.sync_targets();
        self.poll_dirty = true;
        match self.active_port() {
            Some(port) => {
                self.issue_services(port);
                self.issue_directory(port);
            }
            None => {
                self.state.services.clear();
                self.state.directory.clear();
                self.state.loading_services = false;
            }
        }
    }

    /// Service cascade: new epoch, method cleared, methods and filtered
    /// records reloaded. A cleared (or blank) service empties both lists
    /// without a network call.
    fn service_changed(&mut self, service: Option<String>) {
        self.state.epoch.bump();
        self.state.active_method = None;
        self.state.active_service = service;
        self.poll_dirty = true;
        if self.state.active_service.is_some() {
            self.issue_methods();
            self.issue_records();
        } else {
            self.state.methods.clear();
            self.state.records.clear();
            self.state.loading_methods = false;
        }
    }

    pub(crate) fn handle_poll_tick(&mut self) {
        if self.state.active_service.is_some() {
            self.issue_records();
        }
    }

    fn issue_services(&mut self, port: u16) {
        self.state.loading_services = true;
        let epoch = self.state.epoch;
        let gateway = Arc::clone(&self.gateway);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway.list_services(port).await;
            let _ = tx
                .send(Completion::Services {
                    epoch,
                    port,
                    outcome,
                })
                .await;
        });
    }

    fn issue_methods(&mut self) {
        let (Some(port), Some(service)) =
            (self.active_port(), self.state.active_service.clone())
        else {
            return;
        };
        self.state.loading_methods = true;
        let epoch = self.state.epoch;
        let gateway = Arc::clone(&self.gateway);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway.list_methods(port, &service).await;
            let _ = tx
                .send(Completion::Methods {
                    epoch,
                    service,
                    outcome,
                })
                .await;
        });
    }

    fn issue_records(&mut self) {
        let (Some(port), Some(_)) = (self.active_port(), self.state.active_service.as_ref())
        else {
            return;
        };
        let epoch = self.state.epoch;
        let method = self.state.active_method.clone();
        let gateway = Arc::clone(&self.gateway);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway.list_records(port).await;
            let _ = tx
                .send(Completion::Records {
                    epoch,
                    method,
                    outcome,
                })
                .await;
        });
    }

    fn issue_directory(&mut self, port: u16) {
        let gateway = Arc::clone(&self.gateway);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = load_directory(gateway.as_ref(), port).await;
            let _ = tx.send(Completion::Directory { port, outcome }).await;
        });
    }

    fn handle_invoke(&mut self) {
        let (Some(service), Some(method)) = (
            self.state.active_service.clone(),
            self.state.active_method.clone(),
        ) else {
            self.notify_error("select a service and method first");
            return;
        };
        let Some(port) = self.active_port() else {
            return;
        };
        if !params_are_valid_json(&self.state.edit_buffer) {
            self.notify_error("request params are not valid JSON");
            return;
        }
        self.state.loading_invoke = true;
        self.state.last_response = None;
        let params = self.state.edit_buffer.clone();
        let gateway = Arc::clone(&self.gateway);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway.invoke(port, &service, &method, &params).await;
            let _ = tx.send(Completion::Invoke { outcome }).await;
        });
    }

    fn handle_save(&mut self) {
        let (Some(service), Some(method)) = (
            self.state.active_service.clone(),
            self.state.active_method.clone(),
        ) else {
            self.notify_error("select a service and method first");
            return;
        };
        let Some(port) = self.active_port() else {
            return;
        };
        if !params_are_valid_json(&self.state.edit_buffer) {
            self.notify_error("request params are not valid JSON");
            return;
        }
        let name = format!(
            "{service} - {method} - {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        let req = InsertRecord {
            port,
            service,
            method,
            name,
            json_params: self.state.edit_buffer.clone(),
        };
        let gateway = Arc::clone(&self.gateway);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway.insert_record(&req).await.map(|id| {
                info!(event = "record_inserted", record_id = id);
            });
            let _ = tx
                .send(Completion::Mutation {
                    action: MutationAction::Insert,
                    outcome,
                })
                .await;
        });
    }

    /// Commits the edit buffer to the selected record. A directory-born
    /// selection writes back under the service/method captured when it was
    /// picked, because the entry may have been opened while the active
    /// filters pointed elsewhere; a list-born selection is consistent with
    /// the filters by construction and uses them directly.
    fn handle_update_selected(&mut self) {
        let Some(selection) = self.state.selection.clone() else {
            self.notify_error("select a test case first");
            return;
        };
        let Some(port) = self.active_port() else {
            return;
        };
        let (service, method) = match &selection.origin {
            SelectionOrigin::FromDirectory { service, method } => {
                (service.clone(), method.clone())
            }
            SelectionOrigin::FromList => {
                match (
                    self.state.active_service.clone(),
                    self.state.active_method.clone(),
                ) {
                    (Some(service), Some(method)) => (service, method),
                    _ => {
                        self.notify_error("missing service or method for the selected test case");
                        return;
                    }
                }
            }
        };
        if !params_are_valid_json(&self.state.edit_buffer) {
            self.notify_error("request params are not valid JSON");
            return;
        }
        let req = UpdateRecord {
            id: selection.record.id,
            name: selection.record.name.clone(),
            port: Some(port),
            service: Some(service),
            method: Some(method),
            json_params: Some(self.state.edit_buffer.clone()),
        };
        self.issue_update(req, MutationAction::Update);
    }

    fn issue_update(&mut self, req: UpdateRecord, action: MutationAction) {
        let gateway = Arc::clone(&self.gateway);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway.update_record(&req).await;
            let _ = tx.send(Completion::Mutation { action, outcome }).await;
        });
    }

    fn issue_delete(&mut self, id: i64) {
        let gateway = Arc::clone(&self.gateway);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway.delete_record(id).await;
            let _ = tx
                .send(Completion::Mutation {
                    action: MutationAction::Delete { id },
                    outcome,
                })
                .await;
        });
    }

    pub(crate) fn apply_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Services {
                epoch,
                port,
                outcome,
            } => {
                if epoch != self.state.epoch || self.active_port() != Some(port) {
                    debug!(event = "stale_completion_dropped", stage = "services", port);
                    return;
                }
                self.state.loading_services = false;
                match outcome {
                    Ok(services) => self.state.services = services,
                    Err(err) => {
                        self.state.services.clear();
                        self.notify_error(format!("failed to load services: {err}"));
                    }
                }
            }
            Completion::Methods {
                epoch,
                service,
                outcome,
            } => {
                if epoch != self.state.epoch
                    || self.state.active_service.as_deref() != Some(service.as_str())
                {
                    debug!(
                        event = "stale_completion_dropped",
                        stage = "methods",
                        service
                    );
                    return;
                }
                self.state.loading_methods = false;
                match outcome {
                    Ok(methods) => self.state.methods = methods,
                    Err(err) => {
                        self.state.methods.clear();
                        self.notify_error(format!("failed to load methods: {err}"));
                    }
                }
            }
            Completion::Records {
                epoch,
                method,
                outcome,
            } => {
                if epoch != self.state.epoch || self.state.active_method != method {
                    debug!(event = "stale_completion_dropped", stage = "records");
                    return;
                }
                match outcome {
                    Ok(records) => self.apply_records(records),
                    Err(err) => {
                        self.state.records.clear();
                        self.notify_error(format!("failed to load test cases: {err}"));
                    }
                }
            }
            Completion::Directory { port, outcome } => {
                if self.active_port() != Some(port) {
                    debug!(event = "stale_completion_dropped", stage = "directory", port);
                    return;
                }
                match outcome {
                    Ok(tree) => self.state.directory = tree,
                    Err(err) => {
                        self.state.directory.clear();
                        self.notify_error(format!("failed to build directory: {err}"));
                    }
                }
            }
            Completion::Invoke { outcome } => {
                self.state.loading_invoke = false;
                self.state.last_response = Some(match outcome {
                    Ok(reply) => InvokeOutcome {
                        success: true,
                        body: reply.result,
                        elapsed_ms: reply.elapsed_ms,
                        finished_at: Utc::now(),
                    },
                    Err(err) => InvokeOutcome {
                        success: false,
                        body: err.to_string(),
                        elapsed_ms: 0,
                        finished_at: Utc::now(),
                    },
                });
            }
            Completion::Mutation { action, outcome } => self.apply_mutation(action, outcome),
        }
    }

    /// The gateway returns the whole record list for the port; the live
    /// filter is applied here against the current service/method, and the
    /// selection is pruned if its id fell out of the refreshed list.
    fn apply_records(&mut self, records: Vec<InvocationRecord>) {
        let service = self.state.active_service.clone();
        let method = self.state.active_method.clone();
        self.state.records = records
            .into_iter()
            .filter(|record| {
                service
                    .as_deref()
                    .map_or(true, |service| record.service == service)
            })
            .filter(|record| {
                method
                    .as_deref()
                    .map_or(true, |method| record.method == method)
            })
            .collect();
        if let Some(selected) = self.state.selected_record_id() {
            if !self
                .state
                .records
                .iter()
                .any(|record| record.id == selected)
            {
                debug!(event = "selection_pruned", record_id = selected);
                self.state.selection = None;
            }
        }
    }

    fn apply_mutation(&mut self, action: MutationAction, outcome: Result<(), GatewayError>) {
        match outcome {
            Ok(()) => {
                if let MutationAction::Delete { id } = action {
                    if self.state.selected_record_id() == Some(id) {
                        self.state.selection = None;
                    }
                }
                self.notify_success(action.done_message());
                if let Some(port) = self.active_port() {
                    self.issue_directory(port);
                    self.issue_records();
                }
            }
            Err(err) => {
                warn!(event = "record_mutation_failed", action = action.label(), error = %err);
                self.notify_error(format!("{} failed: {err}", action.label()));
            }
        }
    }

    fn notify_success(&mut self, message: impl Into<String>) {
        self.state.notification = Some(Notification::success(message));
        self.notice_deadline = Some(Instant::now() + NOTICE_VISIBLE_FOR);
    }

    fn notify_error(&mut self, message: impl Into<String>) {
        self.state.notification = Some(Notification::error(message));
        self.notice_deadline = Some(Instant::now() + NOTICE_VISIBLE_FOR);
    }

    pub(crate) fn clear_notification(&mut self) {
        self.state.notification = None;
        self.notice_deadline = None;
    }
}

/// Fetches the catalog and records for a port and joins them into the
/// directory tree. Any failing call fails the whole rebuild; the caller
/// turns that into an empty tree plus a notification.
async fn load_directory(
    gateway: &dyn RecordGateway,
    port: u16,
) -> Result<Vec<DirectoryNode>, GatewayError> {
    let services = gateway.list_services(port).await?;
    let records = gateway.list_records(port).await?;
    let mut methods_by_service = HashMap::new();
    for service in &services {
        let methods = gateway.list_methods(port, service).await?;
        methods_by_service.insert(service.clone(), methods);
    }
    Ok(build_directory(&services, &methods_by_service, &records))
}
