pub mod messages;
pub mod source;

pub use messages::{Event, MessageKind, ProtocolMessage, Request, Response};
pub use source::{visit_sources, SourceMut};
