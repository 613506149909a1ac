use thiserror::Error;

use super::run::RunState;
use crate::api::ApiError;
use crate::config::ConfigError;
use crate::stream::StreamError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("a workflow is already {0}; reset before starting another")]
    Busy(RunState),
    #[error("workflow start failed: {0}")]
    Start(#[from] ApiError),
    #[error("event stream failed: {0}")]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
