//! Per-session adapter between the editor's DAP stream and the kernel's debug
//! messages.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cell_files::CellFileMap;
use crate::dap::{visit_sources, ProtocolMessage, Request};
use crate::error::BridgeError;
use crate::host::{DebugSessionHandle, SessionId};
use crate::kernel::{KernelConnection, KernelMessage};
use crate::notebook::{
    cell_base_name, cell_display_name, cell_index, is_cell_address, NotebookCell,
    NotebookDocument,
};

/// Custom session request that writes a cell's code to a kernel-visible file.
pub const DUMP_CELL_COMMAND: &str = "dumpCell";

const SET_BREAKPOINTS: &str = "setBreakpoints";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DumpCellResponse {
    source_path: String,
}

/// What the adapter factory hands back to the host: the bridge plus the
/// stream of messages it emits towards the editor.
pub struct DebugAdapter {
    pub bridge: ProtocolBridge,
    pub messages: mpsc::UnboundedReceiver<ProtocolMessage>,
}

pub struct ProtocolBridge {
    inner: Arc<BridgeInner>,
    cancel: CancellationToken,
}

struct BridgeInner {
    session: Arc<dyn DebugSessionHandle>,
    document: Arc<dyn NotebookDocument>,
    kernel: Arc<dyn KernelConnection>,
    cell_scheme: String,
    cells: Mutex<CellFileMap>,
    to_editor: mpsc::UnboundedSender<ProtocolMessage>,
}

impl ProtocolBridge {
    /// Create a bridge and start forwarding the kernel's debug messages.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        session: Arc<dyn DebugSessionHandle>,
        document: Arc<dyn NotebookDocument>,
        kernel: Arc<dyn KernelConnection>,
        cell_scheme: impl Into<String>,
    ) -> DebugAdapter {
        let (to_editor, messages) = mpsc::unbounded_channel();
        let kernel_messages = kernel.messages();
        let inner = Arc::new(BridgeInner {
            session,
            document,
            kernel,
            cell_scheme: cell_scheme.into(),
            cells: Mutex::new(CellFileMap::new()),
            to_editor,
        });
        let cancel = CancellationToken::new();
        spawn_kernel_subscription(inner.clone(), kernel_messages, cancel.clone());

        DebugAdapter {
            bridge: Self { inner, cancel },
            messages,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.session.id()
    }

    pub fn document(&self) -> &Url {
        self.inner.document.uri()
    }

    /// Forward an editor message to the kernel.
    ///
    /// Failures are logged and the message is dropped; nothing is reported
    /// back to the host.
    pub async fn handle_message(&self, message: ProtocolMessage) {
        let kind = message.kind();
        let name = message.name().to_owned();
        if let Err(err) = self.inner.forward_to_kernel(message).await {
            tracing::warn!(
                target: "nova.notebook_dap.bridge",
                session = %self.inner.session.id(),
                ?kind,
                command = %name,
                error = %err,
                "dropping editor message"
            );
        }
    }

    pub fn file_for_cell(&self, cell: &str) -> Option<String> {
        self.inner.cells.lock().file_for_cell(cell).map(str::to_owned)
    }

    pub fn cell_for_file(&self, file: &str) -> Option<Url> {
        self.inner.cells.lock().cell_for_file(file).cloned()
    }

    pub fn materialized_cells(&self) -> usize {
        self.inner.cells.lock().len()
    }

    /// Stop forwarding kernel messages. Messages still in flight are dropped.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ProtocolBridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl BridgeInner {
    async fn forward_to_kernel(&self, mut message: ProtocolMessage) -> Result<(), BridgeError> {
        if let ProtocolMessage::Request(request) = &message {
            if let Some(address) = self.unmaterialized_breakpoint_cell(request) {
                self.dump_cell(&address).await;
            }
        }

        self.rewrite_for_kernel(&mut message);

        let envelope = match &message {
            ProtocolMessage::Request(_) => KernelMessage::debug_request(serde_json::to_value(&message)?),
            // Replies to requests the kernel sent us.
            ProtocolMessage::Response(_) => KernelMessage::debug_reply(serde_json::to_value(&message)?),
            ProtocolMessage::Event(event) => {
                return Err(BridgeError::UnexpectedMessage {
                    kind: "event",
                    name: event.event.clone(),
                })
            }
        };
        self.kernel.send_raw(envelope)?;
        Ok(())
    }

    /// The cell a `setBreakpoints` request targets, when that cell has no file yet.
    fn unmaterialized_breakpoint_cell(&self, request: &Request) -> Option<String> {
        if request.command != SET_BREAKPOINTS {
            return None;
        }
        let path = request
            .arguments
            .as_ref()?
            .pointer("/source/path")?
            .as_str()?;
        if !is_cell_address(path, &self.cell_scheme) || self.cells.lock().contains_cell(path) {
            return None;
        }
        Some(path.to_owned())
    }

    async fn dump_cell(&self, address: &str) {
        let cells = self.document.cells();
        let Some(cell) = cells.into_iter().find(|cell| cell.uri.as_str() == address) else {
            tracing::debug!(
                target: "nova.notebook_dap.bridge",
                cell = address,
                "breakpoint cell not found in notebook; leaving address unmapped"
            );
            return;
        };

        match self.request_dump(&cell).await {
            Ok(source_path) => {
                tracing::debug!(
                    target: "nova.notebook_dap.bridge",
                    cell = address,
                    path = %source_path,
                    "materialized cell"
                );
                self.cells.lock().insert(cell.uri, source_path);
            }
            Err(err) => {
                tracing::error!(
                    target: "nova.notebook_dap.bridge",
                    session = %self.session.id(),
                    cell = address,
                    error = %err,
                    "failed to dump cell for debugging"
                );
            }
        }
    }

    async fn request_dump(&self, cell: &NotebookCell) -> Result<String, BridgeError> {
        let response = self
            .session
            .custom_request(DUMP_CELL_COMMAND, json!({ "code": cell.text }))
            .await?;
        let response: DumpCellResponse = serde_json::from_value(response)?;
        Ok(response.source_path)
    }

    fn rewrite_for_kernel(&self, message: &mut ProtocolMessage) {
        let cells = self.cells.lock();
        if cells.is_empty() {
            return;
        }
        visit_sources(message, |source| {
            if let Some(file) = source.path().and_then(|path| cells.file_for_cell(path)) {
                let file = file.to_owned();
                source.set_path(file);
            }
        });
    }

    fn to_editor_message(&self, message: KernelMessage) -> Result<ProtocolMessage, BridgeError> {
        let mut message: ProtocolMessage = serde_json::from_value(message.content)?;
        self.rewrite_for_editor(&mut message);
        Ok(message)
    }

    fn rewrite_for_editor(&self, message: &mut ProtocolMessage) {
        let mapped: HashMap<String, Url> = {
            let cells = self.cells.lock();
            if cells.is_empty() {
                return;
            }
            let mut mapped = HashMap::new();
            visit_sources(message, |source| {
                if let Some(path) = source.path() {
                    if let Some(cell) = cells.cell_for_file(path) {
                        mapped.insert(path.to_owned(), cell.clone());
                    }
                }
            });
            mapped
        };
        if mapped.is_empty() {
            return;
        }

        // Cell order can change between messages; look it up fresh each time.
        let current = self.document.cells();
        visit_sources(message, |source| {
            let Some(cell) = source.path().and_then(|path| mapped.get(path)) else {
                return;
            };
            let name = match cell_index(&current, cell.as_str()) {
                Some(index) => cell_display_name(cell, index),
                None => cell_base_name(cell).to_owned(),
            };
            source.set_path(cell.as_str());
            source.set_name(name);
        });
    }
}

fn spawn_kernel_subscription(
    inner: Arc<BridgeInner>,
    mut messages: broadcast::Receiver<KernelMessage>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                received = messages.recv() => received,
            };

            let message = match received {
                Ok(message) => message,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "nova.notebook_dap.bridge",
                        skipped,
                        "kernel message stream lagged; messages were dropped"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!(
                        target: "nova.notebook_dap.bridge",
                        session = %inner.session.id(),
                        "kernel message stream closed"
                    );
                    return;
                }
            };

            if message.debug_kind().is_none() {
                continue;
            }

            match inner.to_editor_message(message) {
                Ok(message) => {
                    if inner.to_editor.send(message).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        target: "nova.notebook_dap.bridge",
                        session = %inner.session.id(),
                        error = %err,
                        "dropping malformed kernel debug message"
                    );
                }
            }
        }
    });
}
