use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A DAP message as it travels between the editor and the kernel.
///
/// The wire `type` field selects the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    Request(Request),
    Response(Response),
    Event(Event),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Response,
    Event,
}

impl ProtocolMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ProtocolMessage::Request(_) => MessageKind::Request,
            ProtocolMessage::Response(_) => MessageKind::Response,
            ProtocolMessage::Event(_) => MessageKind::Event,
        }
    }

    /// The request command, response command or event name.
    pub fn name(&self) -> &str {
        match self {
            ProtocolMessage::Request(request) => &request.command,
            ProtocolMessage::Response(response) => &response.command,
            ProtocolMessage::Event(event) => &event.event,
        }
    }

    pub fn seq(&self) -> i64 {
        match self {
            ProtocolMessage::Request(request) => request.seq,
            ProtocolMessage::Response(response) => response.seq,
            ProtocolMessage::Event(event) => event.seq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl Request {
    pub fn new(seq: i64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            seq,
            command: command.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: i64,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn success(seq: i64, request: &Request, body: Option<Value>) -> Self {
        Self {
            seq,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    pub fn error(seq: i64, request: &Request, message: impl Into<String>) -> Self {
        Self {
            seq,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.into()),
            body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: i64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(seq: i64, event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq,
            event: event.into(),
            body,
        }
    }
}

impl From<Request> for ProtocolMessage {
    fn from(request: Request) -> Self {
        ProtocolMessage::Request(request)
    }
}

impl From<Response> for ProtocolMessage {
    fn from(response: Response) -> Self {
        ProtocolMessage::Response(response)
    }
}

impl From<Event> for ProtocolMessage {
    fn from(event: Event) -> Self {
        ProtocolMessage::Event(event)
    }
}
