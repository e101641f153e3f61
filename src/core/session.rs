//! Terminal session controller
//!
//! Glues the display surface, the line editor and the transport together.
//! All work happens on the caller's thread in response to discrete events:
//! raw input, transport polls, resizes.

use tracing::{debug, info, warn};

use super::editor::LineEditor;
use super::input::InputEvent;
use super::protocol::{InboundMessage, OutboundMessage};
use super::transport::{Connector, SessionTransport, TransportError, TransportEvent};
use crate::history::CommandHistory;

/// Capabilities the controller needs from the terminal widget
pub trait DisplaySurface {
    /// Write text (local echo or backend output)
    fn write(&mut self, text: &str);
    /// Clear the visible screen
    fn clear(&mut self);
    /// Current viewport size as (cols, rows)
    fn size(&self) -> (u16, u16);
}

/// Connection status exposed to the outer UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }
}

/// Controller options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub history_limit: usize,
    pub forward_history_keys: bool,
    /// Print a banner when the connection opens
    pub banner: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_limit: crate::history::HISTORY_LIMIT,
            forward_history_keys: false,
            banner: true,
        }
    }
}

/// One interactive terminal session
pub struct TerminalSession<S: DisplaySurface, C: Connector> {
    transport: SessionTransport<C>,
    editor: LineEditor,
    options: SessionOptions,
    /// Attached display surface; `None` once stopped
    surface: Option<S>,
    status: ConnectionStatus,
    /// Last viewport size known to the backend
    dimensions: Option<(u16, u16)>,
    /// Latest size seen while the connection was not open
    pending_resize: Option<(u16, u16)>,
    /// Remote working directory, if the backend reports it
    remote_path: Option<String>,
}

impl<S: DisplaySurface, C: Connector> TerminalSession<S, C> {
    pub fn new(transport: SessionTransport<C>, options: SessionOptions) -> Self {
        let editor = LineEditor::new(
            CommandHistory::new(options.history_limit),
            options.forward_history_keys,
        );
        Self {
            transport,
            editor,
            options,
            surface: None,
            status: ConnectionStatus::Disconnected,
            dimensions: None,
            pending_resize: None,
            remote_path: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn assessment_id(&self) -> Option<&str> {
        self.transport.assessment_id()
    }

    pub fn remote_path(&self) -> Option<&str> {
        self.remote_path.as_deref()
    }

    pub fn editor(&self) -> &LineEditor {
        &self.editor
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    /// Attach `surface` and open a connection for `assessment_id`.
    ///
    /// Any previous session is stopped first.
    pub fn start(&mut self, assessment_id: &str, surface: S) {
        self.stop();

        self.dimensions = Some(surface.size());
        self.surface = Some(surface);
        self.editor.reset();
        self.connect(|transport| transport.open(assessment_id));
    }

    /// Reconnect the current session with the attached surface
    pub fn restart(&mut self) {
        if self.surface.is_none() {
            return;
        }
        self.connect(|transport| transport.reconnect());
    }

    fn connect<F>(&mut self, open: F)
    where
        F: FnOnce(&mut SessionTransport<C>) -> Result<(), TransportError>,
    {
        match open(&mut self.transport) {
            Ok(()) => {
                self.status = ConnectionStatus::Connecting;
                self.write("\x1b[90mConnecting...\x1b[0m\r\n");
            }
            Err(e) => {
                warn!("Failed to open session: {}", e);
                self.status = ConnectionStatus::Disconnected;
                self.write_error(&e.to_string());
            }
        }
    }

    /// Close the connection and detach the surface. Safe to call repeatedly.
    pub fn stop(&mut self) -> Option<S> {
        self.transport.close();
        if self.status != ConnectionStatus::Disconnected {
            info!("Session stopped");
        }
        self.status = ConnectionStatus::Disconnected;
        self.pending_resize = None;
        self.surface.take()
    }

    /// Route raw input from the display surface
    pub fn handle_input(&mut self, data: &[u8]) {
        if self.surface.is_none() {
            return;
        }

        for event in InputEvent::split(data) {
            let action = self.editor.handle(event);

            // Local echo never waits for the backend
            if let Some(echo) = action.echo {
                self.write(&echo);
            }

            if let Some(message) = action.message {
                self.send(&message);
            }
        }
    }

    fn send(&mut self, message: &OutboundMessage) {
        if let Err(e) = self.transport.send(message) {
            debug!("Dropped {} message: {}", message.kind(), e);
            self.write_error(&e.to_string());
        }
    }

    /// Process pending transport events
    pub fn poll(&mut self) {
        for event in self.transport.poll() {
            match event {
                TransportEvent::Open => {
                    self.status = ConnectionStatus::Connected;
                    self.editor.reset();
                    if self.options.banner {
                        let id = self.transport.assessment_id().unwrap_or_default().to_string();
                        self.write(&format!(
                            "\x1b[32mConnected to terminal session {}\x1b[0m\r\n",
                            id
                        ));
                    }
                    if let Some((cols, rows)) = self.pending_resize.take() {
                        self.send(&OutboundMessage::Resize { cols, rows });
                    }
                }
                TransportEvent::Message(InboundMessage::Output(text)) => self.write(&text),
                TransportEvent::Message(InboundMessage::Path(path)) => {
                    debug!("Remote path: {}", path);
                    self.remote_path = Some(path);
                }
                TransportEvent::Message(InboundMessage::Pong) => debug!("Pong received"),
                TransportEvent::Error(e) => {
                    self.status = ConnectionStatus::Disconnected;
                    self.write_error(&e.to_string());
                }
                TransportEvent::Closed => {
                    self.status = ConnectionStatus::Disconnected;
                    self.write("\r\n\x1b[33mConnection closed\x1b[0m\r\n");
                }
            }
        }
    }

    /// Report a new viewport size; only actual changes reach the backend
    pub fn resize(&mut self, cols: u16, rows: u16) {
        if self.dimensions == Some((cols, rows)) {
            return;
        }
        self.dimensions = Some((cols, rows));

        if self.status == ConnectionStatus::Connected {
            self.send(&OutboundMessage::Resize { cols, rows });
        } else {
            // Latest wins; delivered once the connection opens
            self.pending_resize = Some((cols, rows));
        }
    }

    pub fn clear_screen(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            surface.clear();
        }
    }

    fn write(&mut self, text: &str) {
        if let Some(surface) = self.surface.as_mut() {
            surface.write(text);
        }
    }

    fn write_error(&mut self, message: &str) {
        self.write(&format!("\r\n\x1b[31m[error] {}\x1b[0m\r\n", message));
    }
}

impl<S: DisplaySurface, C: Connector> Drop for TerminalSession<S, C> {
    fn drop(&mut self) {
        self.stop();
    }
}
