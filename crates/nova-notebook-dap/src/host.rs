//! The editor host: debug session management and UI affordances.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("debug host rejected the request: {0}")]
    Rejected(String),

    #[error("custom request {command} failed: {message}")]
    CustomRequest { command: String, message: String },
}

/// Configuration handed to the host when starting a session, and echoed back
/// to the adapter factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugConfiguration {
    #[serde(rename = "type")]
    pub adapter_type: String,
    pub name: String,
    pub request: String,
    /// Address of the notebook document the session debugs.
    #[serde(rename = "__document", default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

impl DebugConfiguration {
    pub fn attach(adapter_type: impl Into<String>, name: impl Into<String>, document: &Url) -> Self {
        Self {
            adapter_type: adapter_type.into(),
            name: name.into(),
            request: "attach".to_owned(),
            document: Some(document.as_str().to_owned()),
        }
    }
}

/// A debug session as the host sees it.
#[async_trait]
pub trait DebugSessionHandle: Send + Sync {
    fn id(&self) -> SessionId;

    /// Send a non-standard request through the session and wait for its response body.
    async fn custom_request(&self, command: &str, arguments: Value) -> Result<Value, HostError>;
}

#[async_trait]
pub trait DebugHost: Send + Sync {
    /// Ask the host to start a session. The host answers by invoking the
    /// adapter factory with `configuration`.
    async fn start_debugging(&self, configuration: DebugConfiguration) -> Result<(), HostError>;

    /// The session currently in the host's foreground.
    fn active_debug_session(&self) -> Option<SessionId>;

    async fn stop_debugging(&self, session: &SessionId) -> Result<(), HostError>;

    fn show_error_message(&self, message: &str);

    /// Toggle the breakpoint margin for a notebook document.
    fn set_breakpoint_margin(&self, document: &Url, enabled: bool);
}
