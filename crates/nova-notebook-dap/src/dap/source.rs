//! Walks the DAP `Source` fields embedded in a message.
//!
//! Which fields carry a `Source` is fixed by the protocol schema, so the walk is
//! driven by [`SOURCE_FIELDS`] rather than by inspecting arbitrary JSON. Paths
//! are relative to the message payload: `arguments` for requests, `body` for
//! events and successful responses.

use serde_json::{Map, Value};

use super::messages::{MessageKind, ProtocolMessage};

#[derive(Debug, Clone, Copy)]
enum Step {
    Field(&'static str),
    Each,
}

#[derive(Debug)]
struct SourceField {
    kind: MessageKind,
    name: &'static str,
    path: &'static [Step],
}

const fn field(kind: MessageKind, name: &'static str, path: &'static [Step]) -> SourceField {
    SourceField { kind, name, path }
}

use MessageKind::{Event, Request, Response};
use Step::{Each, Field};

const SOURCE_FIELDS: &[SourceField] = &[
    field(Event, "output", &[Field("source")]),
    field(Event, "loadedSource", &[Field("source")]),
    field(Event, "breakpoint", &[Field("breakpoint"), Field("source")]),
    field(Request, "setBreakpoints", &[Field("source")]),
    field(Request, "breakpointLocations", &[Field("source")]),
    field(Request, "source", &[Field("source")]),
    field(Request, "gotoTargets", &[Field("source")]),
    field(Response, "stackTrace", &[Field("stackFrames"), Each, Field("source")]),
    field(Response, "loadedSources", &[Field("sources"), Each]),
    field(Response, "scopes", &[Field("scopes"), Each, Field("source")]),
    field(Response, "setFunctionBreakpoints", &[Field("breakpoints"), Each, Field("source")]),
    field(Response, "setBreakpoints", &[Field("breakpoints"), Each, Field("source")]),
];

/// Mutable view of a single DAP `Source` object.
pub struct SourceMut<'a> {
    fields: &'a mut Map<String, Value>,
}

impl SourceMut<'_> {
    pub fn path(&self) -> Option<&str> {
        self.fields.get("path").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.fields.insert("path".to_owned(), Value::String(path.into()));
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.fields.insert("name".to_owned(), Value::String(name.into()));
    }
}

/// Invoke `hook` on every `Source` reachable from `message`.
///
/// Unsuccessful responses carry no sources. Missing or `null` sources are skipped.
pub fn visit_sources<F>(message: &mut ProtocolMessage, mut hook: F)
where
    F: FnMut(&mut SourceMut<'_>),
{
    let (kind, name, payload) = match message {
        ProtocolMessage::Request(request) => {
            (Request, request.command.as_str(), request.arguments.as_mut())
        }
        ProtocolMessage::Response(response) if response.success => {
            (Response, response.command.as_str(), response.body.as_mut())
        }
        ProtocolMessage::Response(_) => return,
        ProtocolMessage::Event(event) => (Event, event.event.as_str(), event.body.as_mut()),
    };
    let Some(payload) = payload else {
        return;
    };

    for entry in SOURCE_FIELDS
        .iter()
        .filter(|entry| entry.kind == kind && entry.name == name)
    {
        walk(payload, entry.path, &mut hook);
    }
}

fn walk<F>(value: &mut Value, path: &[Step], hook: &mut F)
where
    F: FnMut(&mut SourceMut<'_>),
{
    match path.split_first() {
        None => {
            if let Value::Object(fields) = value {
                hook(&mut SourceMut { fields });
            }
        }
        Some((Field(name), rest)) => {
            if let Some(child) = value.get_mut(*name) {
                walk(child, rest, hook);
            }
        }
        Some((Each, rest)) => {
            if let Value::Array(items) = value {
                for item in items {
                    walk(item, rest, hook);
                }
            }
        }
    }
}
