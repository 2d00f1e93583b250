//! One debug session per notebook document.

use std::collections::HashMap;
use std::sync::Arc;

use nova_config::{DebuggerConfig, LogBuffer, LogRecord, NovaConfig};
use parking_lot::Mutex;
use url::Url;

use crate::breakpoints::{BreakpointRepair, BreakpointStore, CellAnchors};
use crate::bridge::{DebugAdapter, ProtocolBridge};
use crate::error::SessionError;
use crate::host::{DebugConfiguration, DebugHost, DebugSessionHandle, SessionId};
use crate::kernel::KernelAccess;
use crate::notebook::NotebookDocument;
use crate::session::Session;

struct SessionEntry {
    document: Arc<dyn NotebookDocument>,
    session: Arc<Session>,
}

enum Toggle {
    Stop(Arc<Session>),
    Start(Arc<Session>),
}

/// Owns the document → session registry.
///
/// The registry only reflects what the host has confirmed: entries are added
/// when a start is requested and removed when the host reports termination
/// (or the start fails).
pub struct SessionCoordinator {
    config: DebuggerConfig,
    host: Arc<dyn DebugHost>,
    kernels: Arc<dyn KernelAccess>,
    breakpoints: Arc<dyn BreakpointStore>,
    sessions: Mutex<HashMap<Url, SessionEntry>>,
    anchors: Mutex<HashMap<Url, CellAnchors>>,
    logs: Arc<LogBuffer>,
}

/// Target prefix shared by every event this crate emits.
const LOG_TARGET: &str = "nova.notebook_dap";

impl SessionCoordinator {
    /// Set up tracing from `config.logging` and build a coordinator using
    /// `config.debugger`. This is the entry point for hosts.
    pub fn from_config(
        config: &NovaConfig,
        host: Arc<dyn DebugHost>,
        kernels: Arc<dyn KernelAccess>,
        breakpoints: Arc<dyn BreakpointStore>,
    ) -> Self {
        let logs = nova_config::init_tracing(&config.logging);
        tracing::debug!(
            target: "nova.notebook_dap.coordinator",
            adapter_type = %config.debugger.adapter_type,
            stop_policy = ?config.debugger.stop_policy,
            "notebook debugging configured"
        );
        Self {
            logs,
            ..Self::new(config.debugger.clone(), host, kernels, breakpoints)
        }
    }

    pub fn new(
        config: DebuggerConfig,
        host: Arc<dyn DebugHost>,
        kernels: Arc<dyn KernelAccess>,
        breakpoints: Arc<dyn BreakpointStore>,
    ) -> Self {
        Self {
            config,
            host,
            kernels,
            breakpoints,
            sessions: Mutex::new(HashMap::new()),
            anchors: Mutex::new(HashMap::new()),
            logs: nova_config::global_log_buffer(),
        }
    }

    /// The adapter-type identifier to register the factory under.
    pub fn adapter_type(&self) -> &str {
        &self.config.adapter_type
    }

    pub fn session_for(&self, document: &Url) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .get(document)
            .map(|entry| entry.session.clone())
    }

    pub fn has_session(&self, document: &Url) -> bool {
        self.sessions.lock().contains_key(document)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Recent bridge and session events, oldest first, for a host's output
    /// panel or a bug report.
    pub fn recent_activity(&self, limit: usize) -> Vec<LogRecord> {
        self.logs.recent_for_target(LOG_TARGET, limit)
    }

    /// Start debugging `document`, or stop its session if one exists.
    ///
    /// A failed start is reported to the user and leaves no session behind.
    pub async fn toggle_debugging(
        &self,
        document: Arc<dyn NotebookDocument>,
    ) -> Result<(), SessionError> {
        let uri = document.uri().clone();
        let toggle = {
            let mut sessions = self.sessions.lock();
            match sessions.get(&uri) {
                Some(entry) => Toggle::Stop(entry.session.clone()),
                None => {
                    let session = Arc::new(Session::new(uri.clone()));
                    sessions.insert(
                        uri.clone(),
                        SessionEntry {
                            document,
                            session: session.clone(),
                        },
                    );
                    Toggle::Start(session)
                }
            }
        };

        match toggle {
            Toggle::Stop(session) => {
                self.stop_session(&session).await;
                Ok(())
            }
            Toggle::Start(session) => match self.start_session(&uri, &session).await {
                Ok(handle) => {
                    tracing::info!(
                        target: "nova.notebook_dap.coordinator",
                        document = %uri,
                        session = %handle.id(),
                        "notebook debug session started"
                    );
                    self.host.set_breakpoint_margin(&uri, true);
                    Ok(())
                }
                Err(err) => {
                    session.reject(err.to_string());
                    self.discard(&uri, &session);
                    self.host.set_breakpoint_margin(&uri, false);
                    self.host
                        .show_error_message(&format!("Can't start debugging. {err}"));
                    tracing::warn!(
                        target: "nova.notebook_dap.coordinator",
                        document = %uri,
                        error = %err,
                        "failed to start notebook debug session"
                    );
                    Err(err)
                }
            },
        }
    }

    async fn start_session(
        &self,
        uri: &Url,
        session: &Session,
    ) -> Result<Arc<dyn DebugSessionHandle>, SessionError> {
        self.kernels.ensure_kernel(uri).await?;
        let configuration =
            DebugConfiguration::attach(&self.config.adapter_type, &self.config.session_name, uri);
        self.host.start_debugging(configuration).await?;
        session.wait().await
    }

    /// Remove `session`'s entry, unless it was already replaced.
    fn discard(&self, uri: &Url, session: &Arc<Session>) {
        let mut sessions = self.sessions.lock();
        if sessions
            .get(uri)
            .is_some_and(|entry| Arc::ptr_eq(&entry.session, session))
        {
            sessions.remove(uri);
        }
    }

    async fn stop_session(&self, session: &Session) {
        if let Err(err) = session.stop(&*self.host, self.config.stop_policy).await {
            tracing::warn!(
                target: "nova.notebook_dap.coordinator",
                document = %session.document(),
                error = %err,
                "failed to stop notebook debug session"
            );
        }
    }

    /// Host callback: a debug session ended. Returns whether it was one of ours.
    pub fn on_did_terminate_session(&self, session: &SessionId) -> bool {
        let removed = {
            let mut sessions = self.sessions.lock();
            let document = sessions
                .iter()
                .find(|(_, entry)| entry.session.session_id().as_ref() == Some(session))
                .map(|(document, _)| document.clone());
            document.and_then(|document| sessions.remove_entry(&document))
        };

        let Some((document, _)) = removed else {
            return false;
        };
        tracing::info!(
            target: "nova.notebook_dap.coordinator",
            document = %document,
            session = %session,
            "notebook debug session terminated"
        );
        self.host.set_breakpoint_margin(&document, false);
        true
    }

    /// Host callback: a notebook document was closed.
    pub async fn on_did_close_notebook(&self, document: &dyn NotebookDocument) -> BreakpointRepair {
        if let Some(session) = self.session_for(document.uri()) {
            self.stop_session(&session).await;
        }
        let repair = self.fix_breakpoints(document);
        // Reopening the notebook hands out fresh cell addresses.
        self.anchors.lock().remove(document.uri());
        repair
    }

    /// Move breakpoints of cells whose position changed since the last repair
    /// of `document`. Repeating a repair on an unchanged notebook moves nothing.
    pub fn fix_breakpoints(&self, document: &dyn NotebookDocument) -> BreakpointRepair {
        let uri = document.uri().clone();
        let mut anchors = self.anchors.lock().remove(&uri).unwrap_or_default();
        let repair = anchors.repair(document, &*self.breakpoints);
        self.anchors.lock().insert(uri, anchors);
        repair
    }

    /// Host callback: build the adapter for a session we asked the host to start.
    ///
    /// Returns `None` when the document's kernel is gone (the pending session
    /// is rejected) or when no session was registered for the configuration.
    pub fn create_debug_adapter(
        &self,
        handle: Arc<dyn DebugSessionHandle>,
        configuration: &DebugConfiguration,
    ) -> Option<DebugAdapter> {
        let entry = configuration
            .document
            .as_deref()
            .and_then(|document| Url::parse(document).ok())
            .and_then(|document| {
                self.sessions
                    .lock()
                    .get(&document)
                    .map(|entry| (entry.document.clone(), entry.session.clone()))
            });

        let Some((document, session)) = entry else {
            tracing::error!(
                target: "nova.notebook_dap.coordinator",
                document = ?configuration.document,
                session = %handle.id(),
                "no notebook debug session registered for adapter request"
            );
            return None;
        };

        match self.kernels.document_kernel(document.uri()) {
            Some(kernel) => {
                session.resolve(handle.clone());
                Some(ProtocolBridge::new(
                    handle,
                    document,
                    kernel,
                    self.config.cell_scheme.clone(),
                ))
            }
            None => {
                session.reject(SessionError::KernelStopped.to_string());
                None
            }
        }
    }

    /// Stop every tracked session and forget them.
    pub async fn dispose(&self) {
        let entries: Vec<(Url, Arc<Session>)> = self
            .sessions
            .lock()
            .drain()
            .map(|(document, entry)| (document, entry.session))
            .collect();
        self.anchors.lock().clear();
        for (document, session) in entries {
            self.stop_session(&session).await;
            self.host.set_breakpoint_margin(&document, false);
        }
    }
}
