use std::fmt;
use std::sync::Arc;

use nova_config::StopPolicy;
use tokio::sync::watch;
use url::Url;

use crate::error::SessionError;
use crate::host::{DebugHost, DebugSessionHandle, HostError, SessionId};

#[derive(Clone)]
pub enum SessionState {
    /// The host was asked to start a session and has not answered yet.
    Starting,
    Active(Arc<dyn DebugSessionHandle>),
    Failed(String),
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Starting => f.write_str("Starting"),
            SessionState::Active(handle) => f.debug_tuple("Active").field(&handle.id()).finish(),
            SessionState::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}

/// The coordinator's record of one notebook's debug session.
///
/// A session is created before the host has produced a session handle. The
/// adapter factory settles it later through [`Session::resolve`] or
/// [`Session::reject`]; whichever comes first wins.
pub struct Session {
    document: Url,
    state: watch::Sender<SessionState>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("document", &self.document.as_str())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Session {
    pub fn new(document: Url) -> Self {
        let (state, _) = watch::channel(SessionState::Starting);
        Self { document, state }
    }

    pub fn document(&self) -> &Url {
        &self.document
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn handle(&self) -> Option<Arc<dyn DebugSessionHandle>> {
        match &*self.state.borrow() {
            SessionState::Active(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.handle().map(|handle| handle.id())
    }

    pub fn resolve(&self, handle: Arc<dyn DebugSessionHandle>) -> bool {
        self.settle(SessionState::Active(handle))
    }

    pub fn reject(&self, reason: impl Into<String>) -> bool {
        self.settle(SessionState::Failed(reason.into()))
    }

    fn settle(&self, next: SessionState) -> bool {
        let settled = self.state.send_if_modified(|state| {
            if matches!(state, SessionState::Starting) {
                *state = next;
                true
            } else {
                false
            }
        });
        if !settled {
            tracing::warn!(
                target: "nova.notebook_dap.session",
                document = %self.document,
                state = ?self.state(),
                "ignoring attempt to settle a session twice"
            );
        }
        settled
    }

    /// Wait until the session leaves `Starting`.
    pub async fn wait(&self) -> Result<Arc<dyn DebugSessionHandle>, SessionError> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| !matches!(state, SessionState::Starting))
            .await
            .map_err(|_| SessionError::Abandoned)?
            .clone();
        match state {
            SessionState::Active(handle) => Ok(handle),
            SessionState::Failed(reason) => Err(SessionError::Rejected(reason)),
            SessionState::Starting => Err(SessionError::Abandoned),
        }
    }

    /// Ask the host to stop this session.
    ///
    /// With [`StopPolicy::Foreground`] the host is only asked when this session
    /// is the host's active one; otherwise nothing happens.
    pub async fn stop(&self, host: &dyn DebugHost, policy: StopPolicy) -> Result<(), HostError> {
        let Some(id) = self.session_id() else {
            tracing::debug!(
                target: "nova.notebook_dap.session",
                document = %self.document,
                state = ?self.state(),
                "session has no host handle; nothing to stop"
            );
            return Ok(());
        };

        let foreground = host.active_debug_session().as_ref() == Some(&id);
        if !foreground && policy == StopPolicy::Foreground {
            tracing::info!(
                target: "nova.notebook_dap.session",
                document = %self.document,
                session = %id,
                "session is not the active debug session; not stopping it"
            );
            return Ok(());
        }

        host.stop_debugging(&id).await
    }
}
