//! The kernel side: message envelopes and the access traits the kernel
//! transport implements.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

pub const DEBUG_REQUEST: &str = "debug_request";
pub const DEBUG_REPLY: &str = "debug_reply";
pub const DEBUG_EVENT: &str = "debug_event";

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("no kernel is running for {0}")]
    NotRunning(String),

    #[error("kernel failed to start: {0}")]
    StartFailed(String),

    #[error("kernel connection closed")]
    ConnectionClosed,
}

/// A message on the kernel's pub/sub channel.
///
/// Debug traffic is only a subset of what a kernel emits; `msg_type` tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelMessage {
    pub msg_type: String,
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugMessageKind {
    Request,
    Reply,
    Event,
}

impl DebugMessageKind {
    pub fn from_msg_type(msg_type: &str) -> Option<Self> {
        match msg_type {
            DEBUG_REQUEST => Some(DebugMessageKind::Request),
            DEBUG_REPLY => Some(DebugMessageKind::Reply),
            DEBUG_EVENT => Some(DebugMessageKind::Event),
            _ => None,
        }
    }
}

impl KernelMessage {
    pub fn new(msg_type: impl Into<String>, content: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            content,
        }
    }

    pub fn debug_request(content: Value) -> Self {
        Self::new(DEBUG_REQUEST, content)
    }

    pub fn debug_reply(content: Value) -> Self {
        Self::new(DEBUG_REPLY, content)
    }

    pub fn debug_event(content: Value) -> Self {
        Self::new(DEBUG_EVENT, content)
    }

    pub fn debug_kind(&self) -> Option<DebugMessageKind> {
        DebugMessageKind::from_msg_type(&self.msg_type)
    }
}

/// A live connection to a running kernel.
pub trait KernelConnection: Send + Sync {
    /// Subscribe to every message the kernel publishes, in emission order.
    fn messages(&self) -> broadcast::Receiver<KernelMessage>;

    /// Fire-and-forget send on the kernel's command channel.
    fn send_raw(&self, message: KernelMessage) -> Result<(), KernelError>;
}

/// Finds (and if needed starts) the kernel backing a notebook document.
#[async_trait]
pub trait KernelAccess: Send + Sync {
    /// Make sure a kernel is running for `document`.
    async fn ensure_kernel(&self, document: &Url) -> Result<Arc<dyn KernelConnection>, KernelError>;

    /// The document's kernel, if one is currently running.
    fn document_kernel(&self, document: &Url) -> Option<Arc<dyn KernelConnection>>;
}
