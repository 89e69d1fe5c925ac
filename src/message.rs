//! JSON-RPC 1.0 message model.
//!
//! This module implements the typed message record used on both sides of a
//! connection, the strict structural validation JSON-RPC 1.0 requires, and
//! the conversions between messages and their wire-level JSON objects.
//!
//! The wire format is one top-level JSON object per message, with no
//! framing envelope. Absent optional fields may be omitted or sent as JSON
//! null; both are accepted on receive, and a few nulls are emitted on send
//! for compatibility with peers expecting the classic JSON-RPC 1.0 shapes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use thiserror::Error;

/// Process-wide source of request ids: a monotonically increasing unsigned
/// integer, wrapping modulo its range. Collisions after a wrap are
/// tolerated because id matching is per-endpoint and short-lived.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn mint_id() -> Value {
    Value::from(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Reasons a JSON value fails to decode into a [`Message`].
///
/// These are surfaced to the caller of [`Message::from_json`] and are never
/// sent on the wire. An endpoint that receives a structurally invalid
/// message reports a protocol error instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("\"method\" is not a JSON string")]
    MethodNotString,
    #[error("message has unexpected member \"{0}\"")]
    UnexpectedMember(String),
    #[error("\"params\" must be JSON array")]
    ParamsNotArray,
    #[error("{variant} must have \"{field}\"")]
    MissingField {
        variant: &'static str,
        field: &'static str,
    },
    #[error("{variant} must not have \"{field}\"")]
    ForbiddenField {
        variant: &'static str,
        field: &'static str,
    },
}

/// A JSON-RPC 1.0 message.
///
/// The variant determines exactly which fields are present:
///
/// | Variant | method | params | result | error | id |
/// |---------|--------|--------|--------|-------|----|
/// | Request | yes    | yes    | no     | no    | yes |
/// | Notify  | yes    | yes    | no     | no    | no  |
/// | Reply   | no     | no     | yes    | no    | yes |
/// | Error   | no     | no     | no     | yes   | yes |
///
/// `params` is always a JSON array. A message exclusively owns its JSON
/// subtrees and is consumed exactly once: by the endpoint on send, or by
/// whoever picks it up from `recv`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call that expects an answer carrying the same id.
    Request {
        method: String,
        params: Vec<Value>,
        id: Value,
    },
    /// A call that expects no answer.
    Notify { method: String, params: Vec<Value> },
    /// A successful answer to a request.
    Reply { result: Value, id: Value },
    /// A failed answer to a request.
    Error { error: Value, id: Value },
}

impl Message {
    /// Builds a request with a freshly minted integer id, returning the
    /// message together with a clone of the id for matching the reply.
    pub fn request(method: impl Into<String>, params: Vec<Value>) -> (Self, Value) {
        let id = mint_id();
        let msg = Message::Request {
            method: method.into(),
            params,
            id: id.clone(),
        };
        (msg, id)
    }

    pub fn notify(method: impl Into<String>, params: Vec<Value>) -> Self {
        Message::Notify {
            method: method.into(),
            params,
        }
    }

    /// Builds a reply answering the request that carried `id`.
    pub fn reply(result: Value, id: Value) -> Self {
        Message::Reply { result, id }
    }

    /// Builds an error answering the request that carried `id`.
    pub fn error(error: Value, id: Value) -> Self {
        Message::Error { error, id }
    }

    /// Human-readable variant name for diagnostics.
    pub fn variant(&self) -> &'static str {
        match self {
            Message::Request { .. } => "request",
            Message::Notify { .. } => "notification",
            Message::Reply { .. } => "reply",
            Message::Error { .. } => "error",
        }
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request { method, .. } | Message::Notify { method, .. } => Some(method),
            _ => None,
        }
    }

    /// The id, for every variant that carries one.
    pub fn id(&self) -> Option<&Value> {
        match self {
            Message::Request { id, .. }
            | Message::Reply { id, .. }
            | Message::Error { id, .. } => Some(id),
            Message::Notify { .. } => None,
        }
    }

    /// Encodes the message as its wire-level JSON object.
    ///
    /// Fields present in the variant are emitted verbatim. For
    /// compatibility with JSON-RPC 1.0 peers, absent fields are padded
    /// with JSON null as follows: a reply emits `error: null`, an error
    /// emits `result: null`, a notification emits `id: null`. A request
    /// emits only its populated fields.
    pub fn into_json(self) -> Value {
        let mut object = Map::new();
        match self {
            Message::Request { method, params, id } => {
                object.insert("method".to_owned(), Value::String(method));
                object.insert("params".to_owned(), Value::Array(params));
                object.insert("id".to_owned(), id);
            }
            Message::Notify { method, params } => {
                object.insert("method".to_owned(), Value::String(method));
                object.insert("params".to_owned(), Value::Array(params));
                object.insert("id".to_owned(), Value::Null);
            }
            Message::Reply { result, id } => {
                object.insert("result".to_owned(), result);
                object.insert("error".to_owned(), Value::Null);
                object.insert("id".to_owned(), id);
            }
            Message::Error { error, id } => {
                object.insert("result".to_owned(), Value::Null);
                object.insert("error".to_owned(), error);
                object.insert("id".to_owned(), id);
            }
        }
        Value::Object(object)
    }

    /// Decodes a wire-level JSON value into a message.
    ///
    /// The value must be a JSON object whose members are drawn from
    /// {method, params, result, error, id}; a member whose value is JSON
    /// null is treated as absent, and any other member is rejected. The
    /// variant is inferred by priority (`result` present means reply,
    /// else `error` means error, else `id` means request, else
    /// notification) and the field-presence table is then enforced.
    pub fn from_json(value: Value) -> Result<Self, MessageError> {
        let Value::Object(object) = value else {
            return Err(MessageError::NotAnObject);
        };

        let mut method = None;
        let mut params = None;
        let mut result = None;
        let mut error = None;
        let mut id = None;
        for (name, member) in object {
            if member.is_null() {
                continue;
            }
            match name.as_str() {
                "method" => match member {
                    Value::String(s) => method = Some(s),
                    _ => return Err(MessageError::MethodNotString),
                },
                "params" => params = Some(member),
                "result" => result = Some(member),
                "error" => error = Some(member),
                "id" => id = Some(member),
                _ => return Err(MessageError::UnexpectedMember(name)),
            }
        }

        let params = match params {
            Some(Value::Array(elements)) => Some(elements),
            Some(_) => return Err(MessageError::ParamsNotArray),
            None => None,
        };

        let variant = if result.is_some() {
            "reply"
        } else if error.is_some() {
            "error"
        } else if id.is_some() {
            "request"
        } else {
            "notification"
        };
        let expected = match variant {
            "request" => [true, true, false, false, true],
            "notification" => [true, true, false, false, false],
            "reply" => [false, false, true, false, true],
            _ => [false, false, false, true, true],
        };
        let present = [
            method.is_some(),
            params.is_some(),
            result.is_some(),
            error.is_some(),
            id.is_some(),
        ];
        enforce_presence(variant, present, expected)?;

        match (method, params, result, error, id) {
            (Some(method), Some(params), None, None, Some(id)) => {
                Ok(Message::Request { method, params, id })
            }
            (Some(method), Some(params), None, None, None) => {
                Ok(Message::Notify { method, params })
            }
            (None, None, Some(result), None, Some(id)) => Ok(Message::Reply { result, id }),
            (None, None, None, Some(error), Some(id)) => Ok(Message::Error { error, id }),
            _ => unreachable!("presence table enforced above"),
        }
    }
}

fn enforce_presence(
    variant: &'static str,
    present: [bool; 5],
    expected: [bool; 5],
) -> Result<(), MessageError> {
    const FIELDS: [&str; 5] = ["method", "params", "result", "error", "id"];
    for (i, field) in FIELDS.into_iter().enumerate() {
        if present[i] != expected[i] {
            return Err(if expected[i] {
                MessageError::MissingField { variant, field }
            } else {
                MessageError::ForbiddenField { variant, field }
            });
        }
    }
    Ok(())
}
