//! Push subscription to a workflow's progress events.
//!
//! A [`StreamClient`] spawns one connection task per workflow. The task owns
//! the connection and its retry counter; the owner reads decoded
//! [`StreamSignal`]s from the returned [`StreamHandle`] and never shares
//! state with the task.

mod client;
mod connector;
mod error;
mod events;
mod sse;

pub use client::{ConnectionState, RetryPolicy, StreamClient, StreamHandle, StreamSignal};
pub use connector::{EventFrames, HttpStreamConnector, StreamConnector};
pub use error::StreamError;
pub use events::{AgentUpdate, EventKind, StreamEvent};
pub use sse::{SseDecoder, SseEvent};

pub(crate) use events::PARSE_ERROR_MESSAGE;
