use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::{debug, info};

use super::error::StreamError;
use super::sse::{SseDecoder, SseEvent};
use crate::config::MonitorConfig;
use crate::core::validate_workflow_id;

/// Frames from one open subscription. The stream ending means the remote
/// closed the connection.
pub type EventFrames = Pin<Box<dyn Stream<Item = Result<SseEvent, StreamError>> + Send>>;

/// Opens one push subscription for a workflow.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, workflow_id: &str) -> Result<EventFrames, StreamError>;
}

/// SSE over HTTP at `{base_url}/workflow/stream/{id}`.
pub struct HttpStreamConnector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStreamConnector {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The stream stays open for the whole run, so there is no overall
    /// request timeout. The connect phase is bounded by the request timeout
    /// and each read by the idle timeout, which turns a silently dead
    /// connection into a stream error.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .read_timeout(config.stream_idle_timeout())
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| StreamError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::new(config.base_url.clone(), client))
    }

    pub fn stream_url(&self, workflow_id: &str) -> String {
        format!(
            "{}/workflow/stream/{}",
            self.base_url,
            urlencoding::encode(workflow_id)
        )
    }
}

#[async_trait]
impl StreamConnector for HttpStreamConnector {
    async fn connect(&self, workflow_id: &str) -> Result<EventFrames, StreamError> {
        validate_workflow_id(workflow_id)?;
        let url = self.stream_url(workflow_id);
        debug!("Opening event stream at {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| StreamError::Connection(format!("Failed to connect to SSE stream: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        info!("Connected to SSE stream at {}", url);

        let frames = response
            .bytes_stream()
            .scan(SseDecoder::new(), |decoder, chunk| {
                let batch: Vec<Result<SseEvent, StreamError>> = match chunk {
                    Ok(bytes) => decoder.push(&bytes).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(StreamError::Transport(format!("Stream error: {e}")))],
                };
                futures::future::ready(Some(futures::stream::iter(batch)))
            })
            .flatten();

        Ok(Box::pin(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_encodes_the_identifier() {
        let connector =
            HttpStreamConnector::new("http://localhost:8080/api/", reqwest::Client::new());
        assert_eq!(
            connector.stream_url("wf 1"),
            "http://localhost:8080/api/workflow/stream/wf%201"
        );
    }

    #[tokio::test]
    async fn rejects_placeholder_ids_before_connecting() {
        let connector = HttpStreamConnector::new("http://127.0.0.1:9", reqwest::Client::new());
        let err = match connector.connect("undefined").await {
            Ok(_) => panic!("placeholder id must be rejected"),
            Err(e) => e,
        };
        assert!(matches!(err, StreamError::InvalidWorkflowId(_)));
        assert!(!err.is_retryable());
    }
}
