use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::types::{
    AgentDescriptor, AgentsEnvelope, ErrorBody, ResultBundle, StartResponse, StatusEnvelope,
    WorkflowStatusView,
};
use crate::config::MonitorConfig;
use crate::core::validate_workflow_id;

/// The service calls the controller depends on.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    /// Liveness probe issued before a start when preflight is enabled.
    async fn health_check(&self) -> Result<(), ApiError> {
        Ok(())
    }

    /// Submit a workflow configuration and return the server-issued id.
    async fn start_workflow(&self, config: &Value) -> Result<String, ApiError>;

    async fn fetch_results(&self, workflow_id: &str) -> Result<ResultBundle, ApiError>;
}

pub struct HttpWorkflowApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWorkflowApi {
    pub fn new(config: &MonitorConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(config.base_url.clone(), client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn workflow_endpoint(&self, action: &str, workflow_id: &str) -> Result<String, ApiError> {
        let id = validate_workflow_id(workflow_id)?;
        Ok(self.endpoint(&format!(
            "workflow/{}/{}",
            action,
            urlencoding::encode(id)
        )))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let response = ensure_success(response).await?;
        decode_json(response).await
    }

    /// `GET /workflow/status/{id}`.
    pub async fn fetch_status(&self, workflow_id: &str) -> Result<WorkflowStatusView, ApiError> {
        let url = self.workflow_endpoint("status", workflow_id)?;
        let envelope: StatusEnvelope = self.get_json(&url).await?;
        match envelope.workflow {
            Some(workflow) if envelope.success => Ok(workflow),
            _ => Err(ApiError::Rejected(
                envelope
                    .error
                    .unwrap_or_else(|| "status unavailable".to_string()),
            )),
        }
    }

    /// `GET /agents/available`.
    pub async fn list_agents(&self) -> Result<Vec<AgentDescriptor>, ApiError> {
        let envelope: AgentsEnvelope = self.get_json(&self.endpoint("agents/available")).await?;
        if !envelope.success {
            return Err(ApiError::Rejected(
                envelope
                    .error
                    .unwrap_or_else(|| "agent catalog unavailable".to_string()),
            ));
        }
        Ok(envelope.agents)
    }

    /// `GET /workflow/package/{id}`; the body is passed through untouched.
    pub async fn download_package(&self, workflow_id: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.workflow_endpoint("package", workflow_id)?;
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let response = ensure_success(response).await?;
        let bytes = response.bytes().await?;
        info!(workflow_id, size = bytes.len(), "downloaded workflow package");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl WorkflowApi for HttpWorkflowApi {
    async fn health_check(&self) -> Result<(), ApiError> {
        let url = self.endpoint("test");
        let body: Value = self.get_json(&url).await?;
        match body.get("success").and_then(Value::as_bool) {
            Some(false) => Err(ApiError::Rejected(
                body.get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("health check failed")
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }

    async fn start_workflow(&self, config: &Value) -> Result<String, ApiError> {
        let url = self.endpoint("workflow/start");
        debug!("POST {}", url);
        let response = self.client.post(&url).json(config).send().await?;
        let response = ensure_success(response).await?;
        let body: StartResponse = decode_json(response).await?;

        if !body.success {
            let reason = body
                .error
                .or(body.message)
                .unwrap_or_else(|| "workflow start was rejected".to_string());
            warn!("workflow start rejected: {}", reason);
            return Err(ApiError::Rejected(reason));
        }

        let id = body
            .workflow_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(ApiError::MissingWorkflowId)?;
        validate_workflow_id(&id)?;
        info!(workflow_id = %id, "workflow started");
        Ok(id)
    }

    async fn fetch_results(&self, workflow_id: &str) -> Result<ResultBundle, ApiError> {
        let url = self.workflow_endpoint("results", workflow_id)?;
        let bundle: ResultBundle = self.get_json(&url).await?;
        info!(workflow_id, "fetched workflow results");
        Ok(bundle)
    }
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Http {
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.error.or(parsed.message) {
            return message;
        }
    }
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    } else {
        body.to_string()
    }
}
