//! Notebook debugging over a kernel's debug messages.
//!
//! The editor speaks the Debug Adapter Protocol and addresses code as cells
//! inside a notebook document. The kernel only understands DAP payloads wrapped
//! in its own `debug_request` / `debug_reply` / `debug_event` messages and
//! addresses code as plain files. This crate provides:
//! - [`SessionCoordinator`]: one debug session per notebook document, session
//!   start/stop, and breakpoint repair after cells move.
//! - [`ProtocolBridge`]: the per-session adapter that forwards messages both
//!   ways and rewrites source locations between cell and file addresses.

pub mod breakpoints;
pub mod bridge;
pub mod cell_files;
pub mod coordinator;
pub mod dap;
pub mod error;
pub mod host;
pub mod kernel;
pub mod notebook;
pub mod session;

pub use crate::breakpoints::{
    fix_breakpoints, BreakpointLocation, BreakpointRepair, BreakpointStore, CellAnchors, Position,
    Range, SourceBreakpoint,
};
pub use crate::bridge::{DebugAdapter, ProtocolBridge, DUMP_CELL_COMMAND};
pub use crate::cell_files::CellFileMap;
pub use crate::coordinator::SessionCoordinator;
pub use crate::dap::{Event, ProtocolMessage, Request, Response};
pub use crate::error::{BridgeError, SessionError};
pub use crate::host::{DebugConfiguration, DebugHost, DebugSessionHandle, HostError, SessionId};
pub use crate::kernel::{DebugMessageKind, KernelAccess, KernelConnection, KernelError, KernelMessage};
pub use crate::notebook::{NotebookCell, NotebookDocument};
pub use crate::session::{Session, SessionState};
