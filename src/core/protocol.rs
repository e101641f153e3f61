//! Wire protocol
//!
//! Outbound messages are JSON text frames, except the EOF byte which goes
//! out unframed. Inbound payloads are literal terminal output unless they
//! match one of the few structured frames the backend may send.

use serde::{Deserialize, Serialize};

/// The EOF control byte (Ctrl+D)
pub const EOF_BYTE: u8 = 0x04;

/// A message from the client to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Command { text: String },
    Signal { name: String },
    Special { key: String },
    Resize { cols: u16, rows: u16 },
    RawControl { bytes: Vec<u8> },
    Ping,
}

/// A discrete unit on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
}

#[derive(Serialize)]
struct Dimensions {
    cols: u16,
    rows: u16,
}

/// JSON shape of the framed outbound messages
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireMessage<'a> {
    Command { command: &'a str },
    Signal { signal: &'a str },
    Special { key: &'a str },
    Resize { dimensions: Dimensions },
    Control { data: &'a [u8] },
    Ping,
}

impl OutboundMessage {
    pub fn command(text: impl Into<String>) -> Self {
        OutboundMessage::Command { text: text.into() }
    }

    pub fn signal(name: impl Into<String>) -> Self {
        OutboundMessage::Signal { name: name.into() }
    }

    pub fn special(key: impl Into<String>) -> Self {
        OutboundMessage::Special { key: key.into() }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Command { .. } => "command",
            OutboundMessage::Signal { .. } => "signal",
            OutboundMessage::Special { .. } => "special",
            OutboundMessage::Resize { .. } => "resize",
            OutboundMessage::RawControl { .. } => "control",
            OutboundMessage::Ping => "ping",
        }
    }

    /// Encode into a wire frame
    pub fn encode(&self) -> Result<Frame, serde_json::Error> {
        let wire = match self {
            OutboundMessage::Command { text } => WireMessage::Command { command: text },
            OutboundMessage::Signal { name } => WireMessage::Signal { signal: name },
            OutboundMessage::Special { key } => WireMessage::Special { key },
            OutboundMessage::Resize { cols, rows } => WireMessage::Resize {
                dimensions: Dimensions { cols: *cols, rows: *rows },
            },
            OutboundMessage::RawControl { bytes } if bytes[..] == [EOF_BYTE] => {
                // EOF travels as the bare byte, not as a control frame
                return Ok(Frame::Text(char::from(EOF_BYTE).to_string()));
            }
            OutboundMessage::RawControl { bytes } => WireMessage::Control { data: bytes },
            OutboundMessage::Ping => WireMessage::Ping,
        };
        serde_json::to_string(&wire).map(Frame::Text)
    }
}

/// Raw payload received from the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

/// Interpreted inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Text to write to the display surface
    Output(String),
    /// Remote working directory update
    Path(String),
    /// Liveness reply
    Pong,
}

/// Structured frames the backend may send
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StructuredFrame {
    Output { data: String },
    Path { path: String },
    Pong,
}

impl InboundMessage {
    /// Interpret a payload. Never fails: anything unrecognized is output.
    pub fn decode(payload: Payload) -> InboundMessage {
        let text = match payload {
            Payload::Text(text) => text,
            Payload::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        };

        if !text.trim_start().starts_with('{') {
            return InboundMessage::Output(text);
        }

        match serde_json::from_str::<StructuredFrame>(&text) {
            Ok(StructuredFrame::Output { data }) => InboundMessage::Output(data),
            Ok(StructuredFrame::Path { path }) => InboundMessage::Path(path),
            Ok(StructuredFrame::Pong) => InboundMessage::Pong,
            Err(_) => InboundMessage::Output(text),
        }
    }
}
