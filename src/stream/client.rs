use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::connector::{EventFrames, StreamConnector};
use super::error::StreamError;
use super::events::StreamEvent;
use crate::core::validate_workflow_id;

/// Bounded linear backoff: the delay before reconnect `n` is `n * backoff_unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Retrying { attempt: u32 },
    Closed,
}

/// What the connection task reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    Opened,
    Event(StreamEvent),
    Reconnecting {
        attempt: u32,
        max_retries: u32,
        delay: Duration,
    },
    RetriesExhausted {
        attempts: u32,
        reason: String,
    },
    /// The subscription can never succeed, so no retry was attempted.
    Rejected {
        reason: String,
    },
}

/// Opens subscriptions; one [`StreamHandle`] per monitored workflow.
#[derive(Clone)]
pub struct StreamClient {
    connector: Arc<dyn StreamConnector>,
    policy: RetryPolicy,
}

impl StreamClient {
    pub fn new(connector: Arc<dyn StreamConnector>, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Validate `workflow_id` and spawn the connection task for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(&self, workflow_id: &str) -> Result<StreamHandle, StreamError> {
        let workflow_id = validate_workflow_id(workflow_id)?.to_string();

        let active = Arc::new(AtomicBool::new(true));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let task = tokio::spawn(run_connection(
            workflow_id.clone(),
            self.connector.clone(),
            self.policy,
            active.clone(),
            signal_tx,
            state_tx,
        ));

        Ok(StreamHandle {
            workflow_id,
            active,
            state_rx,
            signals: signal_rx,
            task,
        })
    }
}

/// Owner side of one subscription. Dropping it closes the connection.
pub struct StreamHandle {
    workflow_id: String,
    active: Arc<AtomicBool>,
    state_rx: watch::Receiver<ConnectionState>,
    signals: mpsc::UnboundedReceiver<StreamSignal>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        if !self.is_active() {
            return ConnectionState::Closed;
        }
        *self.state_rx.borrow()
    }

    /// Watch connection state changes from another task.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Next signal, or `None` once the handle is closed or the task has
    /// finished and every queued signal has been delivered.
    pub async fn next(&mut self) -> Option<StreamSignal> {
        if !self.is_active() {
            return None;
        }
        let signal = self.signals.recv().await?;
        // close() may have raced the receive
        self.is_active().then_some(signal)
    }

    pub fn close(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!(workflow_id = %self.workflow_id, "closing event stream");
        }
        self.task.abort();
        self.signals.close();
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

enum PumpOutcome {
    Terminal,
    Cancelled,
    Failed(String),
}

async fn run_connection(
    workflow_id: String,
    connector: Arc<dyn StreamConnector>,
    policy: RetryPolicy,
    active: Arc<AtomicBool>,
    signals: mpsc::UnboundedSender<StreamSignal>,
    state: watch::Sender<ConnectionState>,
) {
    let mut attempts: u32 = 0;

    loop {
        if !active.load(Ordering::SeqCst) {
            break;
        }
        state.send_replace(ConnectionState::Connecting);

        let reason = match connector.connect(&workflow_id).await {
            Ok(mut frames) => {
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                attempts = 0;
                state.send_replace(ConnectionState::Open);
                info!(workflow_id = %workflow_id, "event stream open");
                if signals.send(StreamSignal::Opened).is_err() {
                    break;
                }
                match pump(&mut frames, &active, &signals).await {
                    PumpOutcome::Terminal | PumpOutcome::Cancelled => break,
                    PumpOutcome::Failed(reason) => reason,
                }
            }
            Err(e) if !e.is_retryable() => {
                error!(workflow_id = %workflow_id, "event stream cannot connect: {}", e);
                let _ = signals.send(StreamSignal::Rejected {
                    reason: e.to_string(),
                });
                break;
            }
            Err(e) => e.to_string(),
        };

        if attempts >= policy.max_retries {
            error!(
                workflow_id = %workflow_id,
                attempts,
                "event stream lost after multiple retries: {}",
                reason
            );
            let _ = signals.send(StreamSignal::RetriesExhausted { attempts, reason });
            break;
        }

        attempts += 1;
        let delay = policy.delay_for(attempts);
        warn!(
            workflow_id = %workflow_id,
            "Event stream lost ({}), reconnecting in {:?} (attempt {}/{})",
            reason,
            delay,
            attempts,
            policy.max_retries
        );
        state.send_replace(ConnectionState::Retrying { attempt: attempts });
        if signals
            .send(StreamSignal::Reconnecting {
                attempt: attempts,
                max_retries: policy.max_retries,
                delay,
            })
            .is_err()
        {
            break;
        }
        tokio::time::sleep(delay).await;
    }

    state.send_replace(ConnectionState::Closed);
}

async fn pump(
    frames: &mut EventFrames,
    active: &AtomicBool,
    signals: &mpsc::UnboundedSender<StreamSignal>,
) -> PumpOutcome {
    while let Some(item) = frames.next().await {
        if !active.load(Ordering::SeqCst) {
            return PumpOutcome::Cancelled;
        }
        match item {
            Ok(frame) => {
                if !frame.is_message() {
                    trace!(event_type = %frame.event_type, "ignoring named SSE event");
                    continue;
                }
                let event = StreamEvent::decode(&frame.data);
                let terminal = event.is_terminal();
                if signals.send(StreamSignal::Event(event)).is_err() {
                    return PumpOutcome::Cancelled;
                }
                if terminal {
                    debug!("terminal event received, dropping connection");
                    return PumpOutcome::Terminal;
                }
            }
            Err(e) => return PumpOutcome::Failed(e.to_string()),
        }
    }
    PumpOutcome::Failed("stream closed by server".to_string())
}
