//! In-memory stand-ins for the editor host, the kernel and the notebook.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nova_config::{DebuggerConfig, NovaConfig};
use nova_notebook_dap::{
    BreakpointStore, DebugAdapter, DebugConfiguration, DebugHost, DebugSessionHandle, HostError,
    KernelAccess, KernelConnection, KernelError, KernelMessage, NotebookCell, NotebookDocument,
    ProtocolMessage, SessionCoordinator, SessionId, SourceBreakpoint,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use url::Url;

pub const CELL_SCHEME: &str = "vscode-notebook-cell";

/// Shared, ordered record of side effects across fakes.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub struct FakeNotebook {
    uri: Url,
    cells: RwLock<Vec<NotebookCell>>,
}

impl FakeNotebook {
    /// A notebook whose cell addresses carry their position as the fragment.
    pub fn new(name: &str, sources: &[&str]) -> Arc<Self> {
        let uri = Url::parse(&format!("file:///work/{name}")).unwrap();
        let cells = sources
            .iter()
            .enumerate()
            .map(|(index, text)| NotebookCell::new(cell_uri(name, index), *text))
            .collect();
        Arc::new(Self {
            uri,
            cells: RwLock::new(cells),
        })
    }

    pub fn cell(&self, index: usize) -> NotebookCell {
        self.cells.read()[index].clone()
    }

    pub fn remove_cell(&self, index: usize) -> NotebookCell {
        self.cells.write().remove(index)
    }

    pub fn move_cell(&self, from: usize, to: usize) {
        let mut cells = self.cells.write();
        let cell = cells.remove(from);
        cells.insert(to, cell);
    }
}

impl NotebookDocument for FakeNotebook {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn cells(&self) -> Vec<NotebookCell> {
        self.cells.read().clone()
    }
}

pub fn cell_uri(name: &str, position: usize) -> Url {
    Url::parse(&format!("{CELL_SCHEME}:/work/{name}#{position:08}")).unwrap()
}

pub struct FakeKernel {
    events: broadcast::Sender<KernelMessage>,
    sent: Mutex<Vec<KernelMessage>>,
    journal: Journal,
}

impl FakeKernel {
    pub fn new(journal: Journal) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            sent: Mutex::new(Vec::new()),
            journal,
        })
    }

    /// Publish a message as if the kernel emitted it.
    pub fn emit(&self, message: KernelMessage) {
        self.events.send(message).expect("bridge is subscribed");
    }

    pub fn sent(&self) -> Vec<KernelMessage> {
        self.sent.lock().clone()
    }
}

impl KernelConnection for FakeKernel {
    fn messages(&self) -> broadcast::Receiver<KernelMessage> {
        self.events.subscribe()
    }

    fn send_raw(&self, message: KernelMessage) -> Result<(), KernelError> {
        self.journal.push(format!("send:{}", message.msg_type));
        self.sent.lock().push(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeKernels {
    running: Mutex<HashMap<Url, Arc<FakeKernel>>>,
    refuse_start: Mutex<Option<String>>,
    journal: Journal,
}

impl FakeKernels {
    pub fn with_journal(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            journal,
            ..Self::default()
        })
    }

    pub fn kernel(&self, document: &Url) -> Arc<FakeKernel> {
        self.running
            .lock()
            .get(document)
            .cloned()
            .expect("kernel running")
    }

    pub fn shutdown(&self, document: &Url) {
        self.running.lock().remove(document);
    }

    pub fn refuse_start(&self, reason: &str) {
        *self.refuse_start.lock() = Some(reason.to_owned());
    }
}

#[async_trait]
impl KernelAccess for FakeKernels {
    async fn ensure_kernel(&self, document: &Url) -> Result<Arc<dyn KernelConnection>, KernelError> {
        if let Some(reason) = self.refuse_start.lock().clone() {
            return Err(KernelError::StartFailed(reason));
        }
        let kernel = self
            .running
            .lock()
            .entry(document.clone())
            .or_insert_with(|| FakeKernel::new(self.journal.clone()))
            .clone();
        Ok(kernel)
    }

    fn document_kernel(&self, document: &Url) -> Option<Arc<dyn KernelConnection>> {
        self.running
            .lock()
            .get(document)
            .map(|kernel| kernel.clone() as Arc<dyn KernelConnection>)
    }
}

pub struct FakeSession {
    id: SessionId,
    dumps: Mutex<Vec<String>>,
    fail_dumps: Mutex<bool>,
    journal: Journal,
}

impl FakeSession {
    pub fn new(id: &str, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new(id),
            dumps: Mutex::new(Vec::new()),
            fail_dumps: Mutex::new(false),
            journal,
        })
    }

    /// Code of every cell dumped so far.
    pub fn dumps(&self) -> Vec<String> {
        self.dumps.lock().clone()
    }

    pub fn fail_dumps(&self) {
        *self.fail_dumps.lock() = true;
    }

    /// Kernel path assigned to the `n`th dump (1-based).
    pub fn dump_path(n: usize) -> String {
        format!("/tmp/ipykernel_4242/{n}.py")
    }
}

#[async_trait]
impl DebugSessionHandle for FakeSession {
    fn id(&self) -> SessionId {
        self.id.clone()
    }

    async fn custom_request(&self, command: &str, arguments: Value) -> Result<Value, HostError> {
        self.journal.push(command);
        if command != "dumpCell" || *self.fail_dumps.lock() {
            return Err(HostError::CustomRequest {
                command: command.to_owned(),
                message: "kernel rejected the request".to_owned(),
            });
        }
        let code = arguments
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let mut dumps = self.dumps.lock();
        dumps.push(code);
        Ok(json!({ "sourcePath": Self::dump_path(dumps.len()) }))
    }
}

pub struct FakeHost {
    starts_tx: mpsc::UnboundedSender<DebugConfiguration>,
    starts_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<DebugConfiguration>>,
    reject_start: Mutex<Option<String>>,
    active: Mutex<Option<SessionId>>,
    stopped: Mutex<Vec<SessionId>>,
    errors: Mutex<Vec<String>>,
    margins: Mutex<HashMap<Url, bool>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        let (starts_tx, starts_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            starts_tx,
            starts_rx: tokio::sync::Mutex::new(starts_rx),
            reject_start: Mutex::new(None),
            active: Mutex::new(None),
            stopped: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            margins: Mutex::new(HashMap::new()),
        })
    }

    /// The next configuration passed to `start_debugging`.
    pub async fn next_start(&self) -> DebugConfiguration {
        let mut rx = self.starts_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("host was asked to start a session")
            .expect("start channel open")
    }

    pub fn reject_start(&self, reason: &str) {
        *self.reject_start.lock() = Some(reason.to_owned());
    }

    pub fn set_active(&self, session: Option<&str>) {
        *self.active.lock() = session.map(SessionId::new);
    }

    pub fn stopped(&self) -> Vec<SessionId> {
        self.stopped.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn margin(&self, document: &Url) -> Option<bool> {
        self.margins.lock().get(document).copied()
    }
}

#[async_trait]
impl DebugHost for FakeHost {
    async fn start_debugging(&self, configuration: DebugConfiguration) -> Result<(), HostError> {
        if let Some(reason) = self.reject_start.lock().clone() {
            return Err(HostError::Rejected(reason));
        }
        let _ = self.starts_tx.send(configuration);
        Ok(())
    }

    fn active_debug_session(&self) -> Option<SessionId> {
        self.active.lock().clone()
    }

    async fn stop_debugging(&self, session: &SessionId) -> Result<(), HostError> {
        self.stopped.lock().push(session.clone());
        Ok(())
    }

    fn show_error_message(&self, message: &str) {
        self.errors.lock().push(message.to_owned());
    }

    fn set_breakpoint_margin(&self, document: &Url, enabled: bool) {
        self.margins.lock().insert(document.clone(), enabled);
    }
}

#[derive(Default)]
pub struct FakeBreakpoints {
    breakpoints: Mutex<Vec<SourceBreakpoint>>,
    pub journal: Journal,
}

impl FakeBreakpoints {
    pub fn add(&self, breakpoint: SourceBreakpoint) {
        self.breakpoints.lock().push(breakpoint);
    }

    pub fn all(&self) -> Vec<SourceBreakpoint> {
        self.breakpoints.lock().clone()
    }
}

impl BreakpointStore for FakeBreakpoints {
    fn breakpoints(&self) -> Vec<SourceBreakpoint> {
        self.breakpoints.lock().clone()
    }

    fn remove_breakpoints(&self, breakpoints: &[SourceBreakpoint]) {
        self.journal.push(format!("remove:{}", breakpoints.len()));
        self.breakpoints.lock().retain(|bp| !breakpoints.contains(bp));
    }

    fn add_breakpoints(&self, breakpoints: &[SourceBreakpoint]) {
        self.journal.push(format!("add:{}", breakpoints.len()));
        self.breakpoints.lock().extend_from_slice(breakpoints);
    }
}

pub struct Harness {
    pub journal: Journal,
    pub host: Arc<FakeHost>,
    pub kernels: Arc<FakeKernels>,
    pub breakpoints: Arc<FakeBreakpoints>,
    pub coordinator: Arc<SessionCoordinator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DebuggerConfig::default())
    }

    pub fn with_config(config: DebuggerConfig) -> Self {
        Self::build(|host, kernels, breakpoints| {
            SessionCoordinator::new(config, host, kernels, breakpoints)
        })
    }

    /// Goes through the host entry point, which also installs tracing.
    pub fn from_nova_config(config: &NovaConfig) -> Self {
        Self::build(|host, kernels, breakpoints| {
            SessionCoordinator::from_config(config, host, kernels, breakpoints)
        })
    }

    fn build(
        coordinator: impl FnOnce(
            Arc<dyn DebugHost>,
            Arc<dyn KernelAccess>,
            Arc<dyn BreakpointStore>,
        ) -> SessionCoordinator,
    ) -> Self {
        let journal = Journal::default();
        let host = FakeHost::new();
        let kernels = FakeKernels::with_journal(journal.clone());
        let breakpoints = Arc::new(FakeBreakpoints::default());
        let coordinator = Arc::new(coordinator(
            host.clone(),
            kernels.clone(),
            breakpoints.clone(),
        ));
        Self {
            journal,
            host,
            kernels,
            breakpoints,
            coordinator,
        }
    }

    /// Toggle debugging on `notebook` and play the host's part of the start
    /// handshake, returning the adapter built for `session_id`.
    pub async fn start(&self, notebook: &Arc<FakeNotebook>, session_id: &str) -> Started {
        let toggle = tokio::spawn({
            let coordinator = self.coordinator.clone();
            let notebook = notebook.clone();
            async move { coordinator.toggle_debugging(notebook).await }
        });

        let configuration = self.host.next_start().await;
        let session = FakeSession::new(session_id, self.journal.clone());
        let adapter = self
            .coordinator
            .create_debug_adapter(session.clone(), &configuration)
            .expect("adapter for registered session");
        toggle
            .await
            .expect("toggle task")
            .expect("session started");

        Started {
            configuration,
            session,
            adapter,
            kernel: self.kernels.kernel(notebook.uri()),
        }
    }
}

pub struct Started {
    pub configuration: DebugConfiguration,
    pub session: Arc<FakeSession>,
    pub adapter: DebugAdapter,
    pub kernel: Arc<FakeKernel>,
}

impl Started {
    /// Next message the bridge emitted towards the editor.
    pub async fn next_editor_message(&mut self) -> ProtocolMessage {
        tokio::time::timeout(Duration::from_secs(5), self.adapter.messages.recv())
            .await
            .expect("bridge emitted a message")
            .expect("editor channel open")
    }

    pub fn last_sent(&self) -> KernelMessage {
        self.kernel.sent().last().cloned().expect("a message was sent to the kernel")
    }
}
