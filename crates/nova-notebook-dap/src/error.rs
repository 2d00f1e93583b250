use thiserror::Error;

use crate::host::HostError;
use crate::kernel::KernelError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Kernel appears to have been stopped")]
    KernelStopped,

    #[error("{0}")]
    Rejected(String),

    #[error("session was dropped before it started")]
    Abandoned,
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("unexpected {kind} message {name:?} from the editor")]
    UnexpectedMessage { kind: &'static str, name: String },
}
