//! Session transport
//!
//! Owns one message-framed connection bound to an assessment id. The
//! socket itself lives behind a [`Connector`], which hands back a [`Link`]:
//! a pair of channels carrying outbound frames and inbound link events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::protocol::{Frame, InboundMessage, OutboundMessage, Payload};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("not connected to terminal backend")]
    NotConnected,

    #[error("invalid connection URI: {0}")]
    InvalidUri(String),

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("connection worker has gone away")]
    LinkClosed,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
    Reconnecting,
}

/// Event reported by a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    Message(Payload),
    Closed,
    Failed(String),
}

/// Event surfaced to the session controller
#[derive(Debug)]
pub enum TransportEvent {
    Open,
    Message(InboundMessage),
    Closed,
    Error(TransportError),
}

/// Channel pair connected to one underlying socket
pub struct Link {
    outbound: Sender<Frame>,
    events: Receiver<LinkEvent>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Link {
    pub fn new(outbound: Sender<Frame>, events: Receiver<LinkEvent>) -> Self {
        Self {
            outbound,
            events,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Attach the worker thread driving the socket and its shutdown flag
    pub fn with_worker(mut self, worker: JoinHandle<()>, shutdown: Arc<AtomicBool>) -> Self {
        self.worker = Some(worker);
        self.shutdown = shutdown;
        self
    }

    fn send(&self, frame: Frame) -> Result<()> {
        self.outbound.send(frame).map_err(|_| TransportError::LinkClosed)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        // Only reap a worker that is already done; one stuck in a handshake
        // exits on its own once it sees the flag
        if let Some(handle) = self.worker.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

/// Opens links to a backend URI
pub trait Connector {
    fn connect(&self, uri: &str) -> Link;
}

/// Build `{ws|wss}://{host}/ws/terminal/{assessment_id}`.
///
/// The scheme mirrors the origin's (`https` → `wss`), the host is the
/// override when given, otherwise the origin's own host and port.
pub fn session_uri(origin: &Url, host_override: Option<&str>, assessment_id: &str) -> Result<String> {
    if assessment_id.trim().is_empty() {
        return Err(TransportError::InvalidUri("empty assessment id".to_string()));
    }

    let scheme = if origin.scheme() == "https" { "wss" } else { "ws" };

    let host = match host_override.map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) => {
            // Accept "host", "host:port" or a full URL
            let host = host.split_once("://").map_or(host, |(_, rest)| rest);
            host.trim_end_matches('/').to_string()
        }
        None => {
            let name = origin
                .host_str()
                .ok_or_else(|| TransportError::InvalidUri(format!("origin has no host: {}", origin)))?;
            match origin.port() {
                Some(port) => format!("{}:{}", name, port),
                None => name.to_string(),
            }
        }
    };

    let mut url = Url::parse(&format!("{}://{}/", scheme, host))
        .map_err(|e| TransportError::InvalidUri(format!("{}: {}", host, e)))?;
    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidUri(host.clone()))?
        .pop_if_empty()
        .extend(["ws", "terminal", assessment_id]);

    Ok(url.to_string())
}

/// Session transport
pub struct SessionTransport<C: Connector> {
    connector: C,
    origin: Url,
    host_override: Option<String>,
    state: ReadyState,
    assessment_id: Option<String>,
    link: Option<Link>,
}

impl<C: Connector> SessionTransport<C> {
    pub fn new(connector: C, origin: Url, host_override: Option<String>) -> Self {
        Self {
            connector,
            origin,
            host_override,
            state: ReadyState::Disconnected,
            assessment_id: None,
            link: None,
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state
    }

    pub fn assessment_id(&self) -> Option<&str> {
        self.assessment_id.as_deref()
    }

    /// Open a connection for `assessment_id`, replacing any existing one.
    ///
    /// An id that yields no valid URI leaves the current connection as is.
    pub fn open(&mut self, assessment_id: &str) -> Result<()> {
        let uri = session_uri(&self.origin, self.host_override.as_deref(), assessment_id)?;

        self.release();
        info!("Connecting to {}", uri);

        self.assessment_id = Some(assessment_id.to_string());
        self.link = Some(self.connector.connect(&uri));
        self.state = ReadyState::Connecting;
        Ok(())
    }

    /// Explicitly re-open the last session
    pub fn reconnect(&mut self) -> Result<()> {
        let id = self.assessment_id.clone().ok_or_else(|| {
            TransportError::InvalidUri("no session to reconnect".to_string())
        })?;
        self.release();
        self.state = ReadyState::Reconnecting;
        info!("Reconnecting session {}", id);
        self.open(&id)
    }

    /// Encode and queue a message; fails unless the connection is open
    pub fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        if self.state != ReadyState::Open {
            return Err(TransportError::NotConnected);
        }
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;

        let frame = message.encode()?;
        debug!("Sending {} frame", message.kind());
        link.send(frame)
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.link.is_some() {
            info!("Closing connection");
        }
        self.release();
        self.state = ReadyState::Closed;
    }

    fn release(&mut self) {
        // Dropping the link signals its worker to close the socket
        self.link = None;
    }

    /// Drain pending link events
    pub fn poll(&mut self) -> Vec<TransportEvent> {
        let mut link_events = Vec::new();
        if let Some(link) = &self.link {
            loop {
                match link.events.try_recv() {
                    Ok(event) => link_events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        link_events.push(LinkEvent::Closed);
                        break;
                    }
                }
            }
        }

        let mut events = Vec::new();
        for event in link_events {
            match event {
                LinkEvent::Opened => {
                    info!("Connection open");
                    self.state = ReadyState::Open;
                    // Liveness probe; nothing depends on the answer
                    if let Err(e) = self.send(&OutboundMessage::Ping) {
                        warn!("Failed to send ping: {}", e);
                    }
                    events.push(TransportEvent::Open);
                }
                LinkEvent::Message(payload) => {
                    if self.state == ReadyState::Open {
                        events.push(TransportEvent::Message(InboundMessage::decode(payload)));
                    }
                }
                LinkEvent::Closed => {
                    info!("Connection closed");
                    self.release();
                    self.state = ReadyState::Closed;
                    events.push(TransportEvent::Closed);
                    break;
                }
                LinkEvent::Failed(reason) => {
                    warn!("Connection error: {}", reason);
                    self.release();
                    self.state = ReadyState::Errored;
                    events.push(TransportEvent::Error(TransportError::Connect(reason)));
                    events.push(TransportEvent::Closed);
                    break;
                }
            }
        }
        events
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc::{self, Receiver, Sender};

    use super::*;

    /// Backend side of a link created by [`ChannelConnector`]
    pub struct RemoteEnd {
        pub uri: String,
        pub frames: Receiver<Frame>,
        pub events: Sender<LinkEvent>,
    }

    impl RemoteEnd {
        /// All frames sent so far, as text
        pub fn sent(&self) -> Vec<String> {
            self.frames
                .try_iter()
                .map(|frame| match frame {
                    Frame::Text(text) => text,
                })
                .collect()
        }
    }

    /// Connector that records each link so tests can play the backend
    #[derive(Clone, Default)]
    pub struct ChannelConnector {
        pub remotes: Rc<RefCell<Vec<RemoteEnd>>>,
    }

    impl ChannelConnector {
        pub fn last(&self) -> std::cell::RefMut<'_, RemoteEnd> {
            std::cell::RefMut::map(self.remotes.borrow_mut(), |r| {
                r.last_mut().expect("no link opened")
            })
        }

        pub fn count(&self) -> usize {
            self.remotes.borrow().len()
        }
    }

    impl Connector for ChannelConnector {
        fn connect(&self, uri: &str) -> Link {
            let (frame_tx, frame_rx) = mpsc::channel();
            let (event_tx, event_rx) = mpsc::channel();
            self.remotes.borrow_mut().push(RemoteEnd {
                uri: uri.to_string(),
                frames: frame_rx,
                events: event_tx,
            });
            Link::new(frame_tx, event_rx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ChannelConnector;
    use super::*;

    fn origin(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn transport(connector: &ChannelConnector) -> SessionTransport<ChannelConnector> {
        SessionTransport::new(connector.clone(), origin("http://localhost:8000"), None)
    }

    #[test]
    fn test_session_uri_scheme_parity() {
        assert_eq!(
            session_uri(&origin("http://localhost:8000"), None, "abc").unwrap(),
            "ws://localhost:8000/ws/terminal/abc"
        );
        assert_eq!(
            session_uri(&origin("https://app.example.com/dashboard"), None, "abc").unwrap(),
            "wss://app.example.com/ws/terminal/abc"
        );
    }

    #[test]
    fn test_session_uri_host_override() {
        let page = origin("https://app.example.com");
        assert_eq!(
            session_uri(&page, Some("backend.internal:9000"), "42").unwrap(),
            "wss://backend.internal:9000/ws/terminal/42"
        );
        assert_eq!(
            session_uri(&page, Some("http://backend.internal/"), "42").unwrap(),
            "wss://backend.internal/ws/terminal/42"
        );
        // Blank override falls back to the origin host
        assert_eq!(
            session_uri(&page, Some("  "), "42").unwrap(),
            "wss://app.example.com/ws/terminal/42"
        );
    }

    #[test]
    fn test_session_uri_encodes_id() {
        assert_eq!(
            session_uri(&origin("http://h"), None, "a b/c").unwrap(),
            "ws://h/ws/terminal/a%20b%2Fc"
        );
        assert!(matches!(
            session_uri(&origin("http://h"), None, ""),
            Err(TransportError::InvalidUri(_))
        ));
    }

    #[test]
    fn test_send_requires_open() {
        let connector = ChannelConnector::default();
        let mut transport = transport(&connector);

        assert!(matches!(
            transport.send(&OutboundMessage::Ping),
            Err(TransportError::NotConnected)
        ));

        transport.open("abc").unwrap();
        assert_eq!(transport.ready_state(), ReadyState::Connecting);
        assert!(matches!(
            transport.send(&OutboundMessage::command("ls")),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_open_sends_single_ping() {
        let connector = ChannelConnector::default();
        let mut transport = transport(&connector);
        transport.open("abc").unwrap();
        assert_eq!(connector.last().uri, "ws://localhost:8000/ws/terminal/abc");

        connector.last().events.send(LinkEvent::Opened).unwrap();
        let events = transport.poll();
        assert!(matches!(events.as_slice(), [TransportEvent::Open]));
        assert_eq!(transport.ready_state(), ReadyState::Open);
        assert_eq!(connector.last().sent(), vec![r#"{"type":"ping"}"#.to_string()]);

        transport.send(&OutboundMessage::command("ls")).unwrap();
        assert_eq!(
            connector.last().sent(),
            vec![r#"{"type":"command","command":"ls"}"#.to_string()]
        );
    }

    #[test]
    fn test_inbound_messages_decoded() {
        let connector = ChannelConnector::default();
        let mut transport = transport(&connector);
        transport.open("abc").unwrap();
        {
            let remote = connector.last();
            remote.events.send(LinkEvent::Opened).unwrap();
            remote.events.send(LinkEvent::Message(Payload::Text("hello\r\n".into()))).unwrap();
        }

        let events = transport.poll();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            TransportEvent::Message(InboundMessage::Output(text)) if text == "hello\r\n"
        ));
    }

    #[test]
    fn test_failure_reports_error_then_closed() {
        let connector = ChannelConnector::default();
        let mut transport = transport(&connector);
        transport.open("abc").unwrap();
        connector.last().events.send(LinkEvent::Failed("refused".into())).unwrap();

        let events = transport.poll();
        assert!(matches!(
            events.as_slice(),
            [TransportEvent::Error(TransportError::Connect(_)), TransportEvent::Closed]
        ));
        assert_eq!(transport.ready_state(), ReadyState::Errored);

        // No automatic reconnect
        assert!(transport.poll().is_empty());
        assert_eq!(connector.count(), 1);
    }

    #[test]
    fn test_dropped_worker_counts_as_closed() {
        let connector = ChannelConnector::default();
        let mut transport = transport(&connector);
        transport.open("abc").unwrap();
        connector.remotes.borrow_mut().clear();

        let events = transport.poll();
        assert!(matches!(events.as_slice(), [TransportEvent::Closed]));
        assert_eq!(transport.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let connector = ChannelConnector::default();
        let mut transport = transport(&connector);
        transport.open("abc").unwrap();

        transport.close();
        assert_eq!(transport.ready_state(), ReadyState::Closed);
        transport.close();
        assert_eq!(transport.ready_state(), ReadyState::Closed);
        assert!(transport.poll().is_empty());
    }

    #[test]
    fn test_reopen_replaces_link() {
        let connector = ChannelConnector::default();
        let mut transport = transport(&connector);
        transport.open("first").unwrap();
        transport.open("second").unwrap();

        assert_eq!(connector.count(), 2);
        // The first link's sender was dropped with the link
        let remotes = connector.remotes.borrow();
        assert!(remotes[0].frames.recv().is_err());
        assert_eq!(transport.assessment_id(), Some("second"));
    }

    #[test]
    fn test_invalid_reopen_keeps_open_link() {
        let connector = ChannelConnector::default();
        let mut transport = transport(&connector);
        transport.open("abc").unwrap();
        connector.last().events.send(LinkEvent::Opened).unwrap();
        transport.poll();
        connector.last().sent();

        assert!(matches!(transport.open(" "), Err(TransportError::InvalidUri(_))));
        assert_eq!(transport.ready_state(), ReadyState::Open);
        assert_eq!(transport.assessment_id(), Some("abc"));
        assert_eq!(connector.count(), 1);

        // The state still matches a live link
        transport.send(&OutboundMessage::command("pwd")).unwrap();
        assert_eq!(
            connector.last().sent(),
            vec![r#"{"type":"command","command":"pwd"}"#.to_string()]
        );
    }

    #[test]
    fn test_reconnect_uses_last_id() {
        let connector = ChannelConnector::default();
        let mut transport = transport(&connector);
        assert!(transport.reconnect().is_err());

        transport.open("abc").unwrap();
        connector.last().events.send(LinkEvent::Closed).unwrap();
        transport.poll();
        assert_eq!(transport.ready_state(), ReadyState::Closed);

        transport.reconnect().unwrap();
        assert_eq!(transport.ready_state(), ReadyState::Connecting);
        assert_eq!(connector.count(), 2);
        assert_eq!(connector.last().uri, "ws://localhost:8000/ws/terminal/abc");
    }
}
