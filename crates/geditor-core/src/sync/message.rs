//! Sync protocol message types
//!
//! Messages exchanged with the editing server as JSON text frames:
//! `{ "event": <name>, "ack"?: <id>, "data"?: <payload> }`.
//! Requests that expect an answer carry an `ack` id; the server replies
//! with an `ack` event echoing it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{Document, DocumentId};

/// Acknowledgment ID correlating a request with its reply
pub type AckId = u64;

pub const EVENT_OPEN: &str = "document.open";
pub const EVENT_LIST: &str = "document.list";
pub const EVENT_SAVE: &str = "document.save";
pub const EVENT_UPDATE: &str = "document.update";
pub const EVENT_EDITOR_CHANGE: &str = "editor.change";
pub const EVENT_ACK: &str = "ack";

/// Errors encoding or decoding frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event '{0}'")]
    UnknownEvent(String),

    #[error("Ack frame without an ack id")]
    MissingAck,
}

/// Payload of `document.save`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    /// Absent when creating a new document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    pub title: String,
    pub text: String,
}

/// Payload of `document.update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    pub document_id: DocumentId,
    pub title: String,
    pub text: String,
}

/// Events sent to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "document.open")]
    Open { id: DocumentId },

    #[serde(rename = "document.list")]
    List,

    #[serde(rename = "document.save")]
    Save(SavePayload),

    #[serde(rename = "document.update")]
    Update(UpdatePayload),

    /// Full body text, not a diff
    #[serde(rename = "editor.change")]
    EditorChange(String),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Open { .. } => EVENT_OPEN,
            ClientEvent::List => EVENT_LIST,
            ClientEvent::Save(_) => EVENT_SAVE,
            ClientEvent::Update(_) => EVENT_UPDATE,
            ClientEvent::EditorChange(_) => EVENT_EDITOR_CHANGE,
        }
    }
}

/// A client event with its optional acknowledgment ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    pub ack: Option<AckId>,
    pub event: ClientEvent,
}

impl ClientMessage {
    /// Fire-and-forget message
    pub fn new(event: ClientEvent) -> Self {
        Self { ack: None, event }
    }

    /// Message expecting an `ack` reply
    pub fn with_ack(event: ClientEvent, ack: AckId) -> Self {
        Self {
            ack: Some(ack),
            event,
        }
    }

    /// Encode to a JSON text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut frame = serde_json::to_value(&self.event)?;
        if let (Some(ack), Value::Object(map)) = (self.ack, &mut frame) {
            map.insert("ack".to_string(), Value::from(ack));
        }
        Ok(serde_json::to_string(&frame)?)
    }
}

/// Server reply: `{ success, data }` or `{ success: false, message }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Reply<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// The payload, or the server's failure message
    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(self
                .message
                .unwrap_or_else(|| "reply carried no data".to_string())),
            (false, _) => Err(self
                .message
                .unwrap_or_else(|| "request failed".to_string())),
        }
    }
}

/// Reply carrying the document list
pub type ListReply = Reply<Vec<Document>>;

/// Messages received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Reply to an acknowledged request; decoded by whoever issued it
    Ack { ack: AckId, data: Value },
    /// List snapshot, also pushed after a save
    DocumentList(ListReply),
    /// Pushed after an update
    DocumentUpdate(ListReply),
    /// Body text broadcast from another session
    EditorChange(String),
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    ack: Option<AckId>,
    #[serde(default)]
    data: Value,
}

impl ServerMessage {
    /// Decode a JSON text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)?;
        match frame.event.as_str() {
            EVENT_ACK => Ok(ServerMessage::Ack {
                ack: frame.ack.ok_or(ProtocolError::MissingAck)?,
                data: frame.data,
            }),
            EVENT_LIST => Ok(ServerMessage::DocumentList(serde_json::from_value(
                frame.data,
            )?)),
            EVENT_UPDATE => Ok(ServerMessage::DocumentUpdate(serde_json::from_value(
                frame.data,
            )?)),
            EVENT_EDITOR_CHANGE => Ok(ServerMessage::EditorChange(serde_json::from_value(
                frame.data,
            )?)),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Decode the payload of an `ack` frame
    pub fn decode_reply<T: DeserializeOwned>(data: Value) -> Result<Reply<T>, ProtocolError> {
        Ok(serde_json::from_value(data)?)
    }
}
