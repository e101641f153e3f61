//! Core session components.
//!
//! - **input**: Raw input bytes to atomic editor events
//! - **editor**: Client-side line editor (no I/O)
//! - **protocol**: Outbound frame encoding and inbound payload decoding
//! - **transport**: Connection lifecycle over a channel-pair link
//! - **ws**: WebSocket link implementation
//! - **session**: Controller composing editor, transport and display surface
//!
//! # Architecture
//!
//! ```text
//! TerminalSession
//! ├── LineEditor
//! │   └── CommandHistory
//! ├── SessionTransport
//! │   └── Link ── worker thread (WsConnector)
//! └── DisplaySurface
//! ```

pub mod input;
pub mod editor;
pub mod protocol;
pub mod transport;
pub mod ws;
pub mod session;
