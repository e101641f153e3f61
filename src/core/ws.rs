//! WebSocket connector
//!
//! Runs one socket per link on a worker thread. The worker owns the socket
//! exclusively: it forwards queued outbound frames, reads with a short
//! timeout, and reports everything else as link events.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};

use super::protocol::{Frame, Payload};
use super::transport::{Connector, Link, LinkEvent};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Connector backed by `tungstenite`
pub struct WsConnector {
    /// How long a read may block before queued frames are flushed
    poll_interval: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
        }
    }
}

impl Connector for WsConnector {
    fn connect(&self, uri: &str) -> Link {
        let (frame_tx, frame_rx) = mpsc::channel::<Frame>();
        let (event_tx, event_rx) = mpsc::channel::<LinkEvent>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let uri = uri.to_string();
        let flag = shutdown.clone();
        let poll_interval = self.poll_interval;
        let worker = thread::spawn(move || {
            run_worker(&uri, frame_rx, event_tx, flag, poll_interval);
        });

        Link::new(frame_tx, event_rx).with_worker(worker, shutdown)
    }
}

fn run_worker(
    uri: &str,
    frames: Receiver<Frame>,
    events: Sender<LinkEvent>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut socket = match tungstenite::connect(uri) {
        Ok((socket, response)) => {
            debug!("Handshake complete: {}", response.status());
            socket
        }
        Err(e) => {
            error!("Failed to connect to {}: {}", uri, e);
            let _ = events.send(LinkEvent::Failed(e.to_string()));
            return;
        }
    };

    if shutdown.load(Ordering::SeqCst) {
        let _ = socket.close(None);
        return;
    }

    if let Err(e) = set_read_timeout(&socket, Some(poll_interval)) {
        let _ = events.send(LinkEvent::Failed(e.to_string()));
        return;
    }

    if events.send(LinkEvent::Opened).is_err() {
        let _ = socket.close(None);
        return;
    }

    match pump(&mut socket, &frames, &events, &shutdown) {
        Ok(true) => {
            let _ = events.send(LinkEvent::Closed);
        }
        Ok(false) => {
            info!("Closing socket");
            let _ = socket.close(None);
            let _ = socket.flush();
        }
        Err(e) => {
            error!("Socket error: {}", e);
            let _ = events.send(LinkEvent::Failed(e.to_string()));
        }
    }
}

/// Move frames both ways until either side ends the connection.
///
/// Returns `Ok(true)` when the remote closed, `Ok(false)` on local shutdown.
fn pump(
    socket: &mut Socket,
    frames: &Receiver<Frame>,
    events: &Sender<LinkEvent>,
    shutdown: &AtomicBool,
) -> Result<bool, WsError> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(false);
        }

        // Outbound
        loop {
            match frames.try_recv() {
                Ok(Frame::Text(text)) => socket.send(Message::Text(text))?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(false),
            }
        }

        // Inbound
        let payload = match socket.read() {
            Ok(Message::Text(text)) => Payload::Text(text),
            Ok(Message::Binary(bytes)) => Payload::Binary(bytes),
            Ok(Message::Close(frame)) => {
                // Keep reading so the close reply gets flushed
                debug!("Close frame received: {:?}", frame);
                continue;
            }
            Ok(_) => continue,
            Err(WsError::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return Ok(true),
            Err(e) => return Err(e),
        };

        if events.send(LinkEvent::Message(payload)).is_err() {
            // Nobody is listening any more
            return Ok(false);
        }
    }
}

fn set_read_timeout(socket: &Socket, timeout: Option<Duration>) -> io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(timeout),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_read_timeout(timeout),
        _ => Ok(()),
    }
}
