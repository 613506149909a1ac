//! Test doubles for the controller's two seams.
//!
//! [`ScriptedConnector`] plays back one scripted outcome per connection
//! attempt and records when each attempt happened. [`RecordingApi`] answers
//! start and result requests from canned values and records every call.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::api::{ApiError, ResultBundle, WorkflowApi};
use crate::config::MonitorConfig;
use crate::core::WorkflowIdError;
use crate::stream::{EventFrames, SseEvent, StreamConnector, StreamError};

/// What one connection attempt does.
pub enum ConnectOutcome {
    /// The connect call itself fails.
    Fail(String),
    /// Connects, delivers these `data:` payloads, then the server closes.
    Deliver(Vec<String>),
    /// Connects, delivers these payloads, then stays open without sending.
    DeliverAndHold(Vec<String>),
    /// Connects and forwards payloads pushed by the test as they arrive.
    Live(mpsc::UnboundedReceiver<String>),
    /// The connect call fails in a way no retry can fix.
    Invalid,
}

pub fn message(data: &str) -> SseEvent {
    SseEvent {
        event_type: SseEvent::DEFAULT_TYPE.to_string(),
        data: data.to_string(),
        id: None,
        retry: None,
    }
}

fn frames(payloads: Vec<String>) -> impl futures::Stream<Item = Result<SseEvent, StreamError>> {
    futures::stream::iter(payloads.into_iter().map(|p| Ok(message(&p))))
}

#[derive(Clone)]
pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<ConnectOutcome>>>,
    attempts: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl ScriptedConnector {
    pub fn new(script: Vec<ConnectOutcome>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Connector whose every attempt fails.
    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    pub async fn attempt_count(&self) -> usize {
        self.attempts.lock().await.len()
    }

    pub async fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().await.iter().map(|(_, at)| *at).collect()
    }

    pub async fn connected_ids(&self) -> Vec<String> {
        self.attempts.lock().await.iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self, workflow_id: &str) -> Result<EventFrames, StreamError> {
        self.attempts
            .lock()
            .await
            .push((workflow_id.to_string(), Instant::now()));

        // An exhausted script behaves like an unreachable server.
        let outcome = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| ConnectOutcome::Fail("connection refused".to_string()));

        match outcome {
            ConnectOutcome::Fail(reason) => Err(StreamError::Connection(reason)),
            ConnectOutcome::Invalid => Err(WorkflowIdError::Empty.into()),
            ConnectOutcome::Deliver(payloads) => Ok(Box::pin(frames(payloads))),
            ConnectOutcome::DeliverAndHold(payloads) => {
                Ok(Box::pin(frames(payloads).chain(futures::stream::pending())))
            }
            ConnectOutcome::Live(rx) => Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                let payload = rx.recv().await?;
                Some((Ok(message(&payload)), rx))
            }))),
        }
    }
}

/// Canned start behaviour.
#[derive(Debug, Clone)]
pub enum StartReply {
    Id(String),
    HttpStatus(u16),
    Rejected(String),
}

#[derive(Debug, Clone)]
pub enum ResultsReply {
    Bundle(Value),
    HttpStatus(u16),
}

pub struct RecordingApi {
    start: StartReply,
    results: ResultsReply,
    healthy: bool,
    start_bodies: Mutex<Vec<Value>>,
    health_calls: Mutex<usize>,
    fetches: Mutex<Vec<(String, Instant)>>,
}

impl RecordingApi {
    pub fn new(start: StartReply, results: ResultsReply) -> Self {
        Self {
            start,
            results,
            healthy: true,
            start_bodies: Mutex::new(Vec::new()),
            health_calls: Mutex::new(0),
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Starts return `id`; results return a small fixed bundle.
    pub fn succeeding(id: &str) -> Self {
        Self::new(
            StartReply::Id(id.to_string()),
            ResultsReply::Bundle(serde_json::json!({ "curriculum": { "units": 3 } })),
        )
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub async fn start_bodies(&self) -> Vec<Value> {
        self.start_bodies.lock().await.clone()
    }

    pub async fn health_calls(&self) -> usize {
        *self.health_calls.lock().await
    }

    pub async fn fetched_ids(&self) -> Vec<String> {
        self.fetches.lock().await.iter().map(|(id, _)| id.clone()).collect()
    }

    pub async fn fetch_times(&self) -> Vec<Instant> {
        self.fetches.lock().await.iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl WorkflowApi for RecordingApi {
    async fn health_check(&self) -> Result<(), ApiError> {
        *self.health_calls.lock().await += 1;
        if self.healthy {
            Ok(())
        } else {
            Err(ApiError::Request("connection refused".to_string()))
        }
    }

    async fn start_workflow(&self, config: &Value) -> Result<String, ApiError> {
        self.start_bodies.lock().await.push(config.clone());
        match &self.start {
            StartReply::Id(id) => Ok(id.clone()),
            StartReply::HttpStatus(status) => Err(ApiError::Http {
                status: *status,
                message: "Internal Server Error".to_string(),
            }),
            StartReply::Rejected(reason) => Err(ApiError::Rejected(reason.clone())),
        }
    }

    async fn fetch_results(&self, workflow_id: &str) -> Result<ResultBundle, ApiError> {
        self.fetches
            .lock()
            .await
            .push((workflow_id.to_string(), Instant::now()));
        match &self.results {
            ResultsReply::Bundle(results) => Ok(ResultBundle {
                results: results.clone(),
                metadata: None,
            }),
            ResultsReply::HttpStatus(status) => Err(ApiError::Http {
                status: *status,
                message: "Workflow not found".to_string(),
            }),
        }
    }
}

/// Defaults with no result delay, so tests that do not care about timing
/// need not advance the clock.
pub fn fast_config() -> MonitorConfig {
    MonitorConfig {
        results_delay_ms: 0,
        ..MonitorConfig::default()
    }
}
