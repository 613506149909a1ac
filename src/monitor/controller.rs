use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::agents::{AgentInfo, AgentRegistry, AgentStatus};
use super::error::MonitorError;
use super::event_log::{EventLog, LogEntry, LogKind};
use super::run::{RunState, WorkflowRun};
use crate::api::{ApiError, HttpWorkflowApi, ResultBundle, WorkflowApi};
use crate::bus::event_types::{
    CATEGORY_AGENT, CATEGORY_LOG, CATEGORY_RESULT, CATEGORY_RUN, EVENT_AGENT_STATUS_CHANGED,
    EVENT_LOG_APPENDED, EVENT_RESULTS_LOADED, EVENT_RUN_RESET, EVENT_RUN_STATE_CHANGED,
};
use crate::bus::{BusEvent, EventBus};
use crate::config::MonitorConfig;
use crate::core::{resolve_workflow_id, validate_workflow_id, WorkflowIdCell};
use crate::stream::{
    ConnectionState, HttpStreamConnector, StreamClient, StreamConnector, StreamEvent,
    StreamHandle, StreamSignal, PARSE_ERROR_MESSAGE,
};

pub(crate) const RETRIES_EXHAUSTED_MESSAGE: &str =
    "Connection lost to workflow monitoring after multiple retries";
pub(crate) const STREAM_REJECTED_PREFIX: &str = "Workflow stream rejected";

/// Drives one workflow run from start request to fetched results.
///
/// The controller is the only writer of run, agent and log state. All
/// operations take `&mut self`, so handlers never interleave; the stream's
/// connection task talks to it only through the [`StreamHandle`].
pub struct WorkflowController {
    api: Arc<dyn WorkflowApi>,
    streams: StreamClient,
    bus: Arc<EventBus>,
    preflight: bool,
    results_delay: Duration,
    run: WorkflowRun,
    id_cell: WorkflowIdCell,
    agents: AgentRegistry,
    log: EventLog,
    results: Option<ResultBundle>,
    stream: Option<StreamHandle>,
}

impl WorkflowController {
    pub fn new(
        api: Arc<dyn WorkflowApi>,
        connector: Arc<dyn StreamConnector>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            api,
            streams: StreamClient::new(connector, config.retry_policy()),
            bus: Arc::new(EventBus::new()),
            preflight: config.preflight,
            results_delay: config.results_delay(),
            run: WorkflowRun::default(),
            id_cell: WorkflowIdCell::new(),
            agents: AgentRegistry::default(),
            log: EventLog::new(),
            results: None,
            stream: None,
        }
    }

    /// Controller talking HTTP to `config.base_url`.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        let api = Arc::new(HttpWorkflowApi::new(config)?);
        let connector = Arc::new(HttpStreamConnector::from_config(config)?);
        Ok(Self::new(api, connector, config))
    }

    /// Replace the default agent catalog, e.g. with the server's list.
    pub fn with_catalog(mut self, catalog: Vec<AgentInfo>) -> Self {
        self.agents.replace_catalog(catalog);
        self
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn run(&self) -> &WorkflowRun {
        &self.run
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn results(&self) -> Option<&ResultBundle> {
        self.results.as_ref()
    }

    pub fn workflow_id(&self) -> Option<&str> {
        resolve_workflow_id(self.id_cell.get(), self.run.id.as_deref(), None)
    }

    pub fn stream_state(&self) -> ConnectionState {
        self.stream
            .as_ref()
            .map(StreamHandle::state)
            .unwrap_or(ConnectionState::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.bus.subscribe()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Submit `config` to the service and begin monitoring the new run.
    pub async fn start<T>(&mut self, config: &T) -> Result<&WorkflowRun, MonitorError>
    where
        T: Serialize + ?Sized,
    {
        if !self.run.state.accepts_start() {
            return Err(MonitorError::Busy(self.run.state));
        }
        if self.run.state == RunState::Error {
            self.reset();
        }

        self.transition(RunState::Initializing);
        self.append_log(LogKind::System, "Starting workflow...", None);

        let id = match self.request_start(config).await {
            Ok(id) => id,
            Err(e) => {
                self.fail(format!("Failed to start workflow: {e}"));
                return Err(MonitorError::Start(e));
            }
        };

        self.id_cell.set(id.clone());
        self.run.id = Some(id.clone());
        self.run.started_at = Some(Utc::now());
        self.run.last_error = None;
        self.transition(RunState::Executing);
        self.reset_agents();
        self.append_log(LogKind::System, format!("Workflow started: {id}"), None);

        match self.streams.open(&id) {
            Ok(handle) => self.stream = Some(handle),
            Err(e) => {
                self.fail(format!("Failed to open workflow stream: {e}"));
                return Err(MonitorError::Stream(e));
            }
        }

        Ok(&self.run)
    }

    async fn request_start<T>(&self, config: &T) -> Result<String, ApiError>
    where
        T: Serialize + ?Sized,
    {
        let payload =
            serde_json::to_value(config).map_err(|e| ApiError::Serialization(e.to_string()))?;
        if self.preflight {
            debug!("running health check before start");
            self.api.health_check().await?;
        }
        let id = self.api.start_workflow(&payload).await?;
        validate_workflow_id(&id)?;
        Ok(id)
    }

    /// Close any stream and return to idle. Safe to call repeatedly.
    pub fn reset(&mut self) {
        self.close_stream();
        let previous = self.run.id.take();
        self.run = WorkflowRun::default();
        self.id_cell.clear();
        self.agents.reset();
        self.log.clear();
        self.results = None;
        self.bus.emit(
            CATEGORY_RUN,
            EVENT_RUN_RESET,
            previous,
            json!({ "state": RunState::Idle.as_str() }),
        );
    }

    // -----------------------------------------------------------------------
    // Event pumping
    // -----------------------------------------------------------------------

    /// Wait for and apply the next stream signal. Returns `false` once there
    /// is no open stream left to read from.
    pub async fn next_update(&mut self) -> bool {
        let Some(handle) = self.stream.as_mut() else {
            return false;
        };
        match handle.next().await {
            Some(signal) => {
                self.handle_signal(signal).await;
                true
            }
            None => {
                debug!("event stream finished");
                self.close_stream();
                false
            }
        }
    }

    /// Pump updates until the run is completed or failed, or the stream ends.
    pub async fn wait_for_terminal(&mut self) -> &WorkflowRun {
        while !self.run.is_terminal() && self.next_update().await {}
        &self.run
    }

    pub async fn handle_signal(&mut self, signal: StreamSignal) {
        match signal {
            StreamSignal::Opened => {
                self.append_log(LogKind::System, "Connected to workflow monitoring", None);
            }
            StreamSignal::Event(event) => self.handle_event(event, None).await,
            StreamSignal::Reconnecting {
                attempt,
                max_retries,
                ..
            } => {
                self.append_log(
                    LogKind::System,
                    format!("Connection lost. Retrying... ({attempt}/{max_retries})"),
                    None,
                );
            }
            StreamSignal::RetriesExhausted { attempts, reason } => {
                warn!(attempts, "giving up on event stream: {}", reason);
                self.handle_event(
                    StreamEvent::Error {
                        message: RETRIES_EXHAUSTED_MESSAGE.to_string(),
                    },
                    None,
                )
                .await;
            }
            StreamSignal::Rejected { reason } => {
                warn!("event stream rejected: {}", reason);
                self.handle_event(
                    StreamEvent::Error {
                        message: format!("{STREAM_REJECTED_PREFIX}: {reason}"),
                    },
                    None,
                )
                .await;
            }
        }
    }

    /// Fold one decoded event into run, agent and log state.
    ///
    /// `fallback_id` is consulted for the result fetch only when neither the
    /// stable cell nor the run carries a valid identifier.
    pub async fn handle_event(&mut self, event: StreamEvent, fallback_id: Option<&str>) {
        match event {
            StreamEvent::Connected { message, .. } => {
                let text = message.unwrap_or_else(|| "Connected to workflow stream".to_string());
                self.append_log(LogKind::System, text, None);
            }
            StreamEvent::AgentStarted(update) => {
                let name = self
                    .agents
                    .display_name(&update.agent_id, update.agent_name.as_deref());
                let status = self.agents.mark_started(&update.agent_id, update.task);
                self.publish_agent(&update.agent_id, &status);
                self.append_log(
                    LogKind::Agent,
                    format!("{name} is starting..."),
                    Some(&update.agent_id),
                );
            }
            StreamEvent::AgentProgress(update) => {
                let name = self
                    .agents
                    .display_name(&update.agent_id, update.agent_name.as_deref());
                let text = update
                    .message
                    .clone()
                    .or_else(|| update.task.clone())
                    .unwrap_or_else(|| "working...".to_string());
                let status =
                    self.agents
                        .mark_progress(&update.agent_id, update.progress, update.task);
                self.publish_agent(&update.agent_id, &status);
                self.append_log(
                    LogKind::Progress,
                    format!("{name}: {text}"),
                    Some(&update.agent_id),
                );
            }
            StreamEvent::AgentCompleted(update) => {
                let name = self
                    .agents
                    .display_name(&update.agent_id, update.agent_name.as_deref());
                let status = self.agents.mark_completed(&update.agent_id);
                self.publish_agent(&update.agent_id, &status);
                let text = match update.result_summary {
                    Some(summary) => format!("{name} completed: {summary}"),
                    None => format!("{name} completed"),
                };
                self.append_log(LogKind::Success, text, Some(&update.agent_id));
            }
            StreamEvent::WorkflowCompleted {
                workflow_id,
                status,
                message,
                results,
            } => {
                let fallback = fallback_id.or(workflow_id.as_deref()).map(str::to_string);
                self.complete(status, message, results, fallback).await;
            }
            StreamEvent::Error { message } => {
                self.close_stream();
                if self.run.state.can_transition_to(RunState::Error) {
                    self.fail(message);
                } else {
                    warn!(state = %self.run.state, "error event after run finished: {}", message);
                    self.append_log(LogKind::Error, message, None);
                }
            }
            StreamEvent::Unknown { kind } => {
                debug!(kind = %kind, "unrecognized workflow event");
                self.append_log(LogKind::System, format!("Unknown event type: {kind}"), None);
            }
            StreamEvent::Malformed { reason } => {
                warn!("discarding malformed workflow event: {}", reason);
                self.append_log(LogKind::Error, PARSE_ERROR_MESSAGE, None);
            }
        }
    }

    async fn complete(
        &mut self,
        status: Option<String>,
        message: Option<String>,
        inline_results: Option<serde_json::Value>,
        fallback_id: Option<String>,
    ) {
        if self.run.state != RunState::Executing {
            info!(state = %self.run.state, "ignoring completion event");
            self.append_log(
                LogKind::System,
                format!("Ignoring completion event while {}", self.run.state),
                None,
            );
            return;
        }

        self.close_stream();
        self.transition(RunState::Completed);

        let mut text = message.unwrap_or_else(|| "Workflow completed successfully!".to_string());
        if let Some(status) = status.filter(|s| s != "completed") {
            text.push_str(&format!(" (status: {status})"));
        }
        self.append_log(LogKind::System, text, None);

        let resolved = resolve_workflow_id(
            self.id_cell.get(),
            self.run.id.as_deref(),
            fallback_id.as_deref(),
        )
        .map(str::to_string);
        let Some(id) = resolved else {
            error!("workflow completed without a usable identifier");
            self.append_log(
                LogKind::Error,
                "Workflow completed but no ID available for results",
                None,
            );
            return;
        };

        if !self.results_delay.is_zero() {
            tokio::time::sleep(self.results_delay).await;
        }

        match self.api.fetch_results(&id).await {
            Ok(bundle) => self.store_results(&id, bundle),
            Err(e) => match inline_results {
                Some(results) => {
                    warn!(workflow_id = %id, "result fetch failed, using inline results: {}", e);
                    self.store_results(
                        &id,
                        ResultBundle {
                            results,
                            metadata: None,
                        },
                    );
                }
                None => {
                    error!(workflow_id = %id, "result fetch failed: {}", e);
                    self.append_log(LogKind::Error, format!("Failed to load results: {e}"), None);
                }
            },
        }
    }

    fn store_results(&mut self, id: &str, bundle: ResultBundle) {
        self.bus.emit(
            CATEGORY_RESULT,
            EVENT_RESULTS_LOADED,
            Some(id.to_string()),
            json!({ "workflow_id": id, "results": bundle.results, "metadata": bundle.metadata }),
        );
        self.results = Some(bundle);
        self.append_log(LogKind::Success, "Results ready", None);
    }

    // -----------------------------------------------------------------------
    // State helpers
    // -----------------------------------------------------------------------

    fn transition(&mut self, next: RunState) -> bool {
        let previous = self.run.state;
        if !previous.can_transition_to(next) {
            warn!(from = %previous, to = %next, "ignoring invalid run transition");
            return false;
        }
        self.run.state = next;
        info!(from = %previous, to = %next, workflow_id = ?self.run.id, "run state changed");
        self.bus.emit(
            CATEGORY_RUN,
            EVENT_RUN_STATE_CHANGED,
            self.run.id.clone(),
            json!({
                "state": next.as_str(),
                "previous": previous.as_str(),
                "workflow_id": self.run.id,
                "last_error": self.run.last_error,
            }),
        );
        true
    }

    fn fail(&mut self, message: String) {
        self.close_stream();
        self.run.last_error = Some(message.clone());
        self.transition(RunState::Error);
        self.append_log(LogKind::Error, message, None);
    }

    fn close_stream(&mut self) {
        if let Some(mut handle) = self.stream.take() {
            handle.close();
        }
    }

    fn reset_agents(&mut self) {
        self.agents.reset();
        let statuses: Vec<(String, AgentStatus)> = self
            .agents
            .statuses()
            .map(|(id, status)| (id.to_string(), status.clone()))
            .collect();
        for (id, status) in statuses {
            self.publish_agent(&id, &status);
        }
    }

    fn publish_agent(&self, agent_id: &str, status: &AgentStatus) {
        self.bus.emit(
            CATEGORY_AGENT,
            EVENT_AGENT_STATUS_CHANGED,
            self.run.id.clone(),
            json!({
                "agent_id": agent_id,
                "status": status.status.to_string(),
                "progress": status.progress,
                "current_task": status.current_task,
            }),
        );
    }

    fn append_log(&mut self, kind: LogKind, text: impl Into<String>, agent_id: Option<&str>) {
        let entry: LogEntry = self.log.append(kind, text, agent_id).clone();
        self.bus.emit(
            CATEGORY_LOG,
            EVENT_LOG_APPENDED,
            self.run.id.clone(),
            json!({
                "id": entry.id,
                "seq": entry.seq,
                "kind": entry.kind.to_string(),
                "text": entry.text,
                "agent_id": entry.agent_id,
                "timestamp": entry.timestamp.to_rfc3339(),
            }),
        );
    }
}
