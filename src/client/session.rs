//! # Peer Session
//!
//! The client side of the relay. A session goes through two states:
//!
//! 1. **Handshaking**: connect and send the chosen identity as one frame.
//!    [`PeerSession::connect`] only returns once this is done.
//! 2. **Active**: two things run at once on the two halves of the stream.
//!    - the caller sends lines with [`PeerSession::send`], each as one write
//!      of an identity frame followed by a content frame
//!    - a background task keeps reading frame pairs and reports each one as a
//!      [`ChatEvent::Message`]
//!
//! The session ends when the server closes the connection or a read fails
//! (reported as [`ChatEvent::ConnectionLost`]), or when the owner calls
//! [`PeerSession::shutdown`] (reported as nothing).
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (events, mut rx) = lan_chat::common::events::channel();
//! let mut session = PeerSession::connect("127.0.0.1:5000", "alice", events).await?;
//! session.send("hi").await?;
//! while let Some(event) = rx.recv().await {
//!     println!("{}", event);
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::common::connection::{FrameReader, ReadOutcome};
use crate::common::error::ChatError;
use crate::common::events::{ChatEvent, EventSender};
use crate::common::frame::{encode, encode_pair};

pub struct PeerSession {
    identity: String,
    local_addr: SocketAddr,
    writer: OwnedWriteHalf,
    /// Cleared by the receive task when the session ends.
    active: Arc<AtomicBool>,
    shutdown: oneshot::Sender<()>,
    receiver: JoinHandle<()>,
}

impl PeerSession {
    /// Connect to the relay at `address` and announce `identity`.
    ///
    /// Incoming messages are pushed into `events` until the session ends.
    ///
    /// # Errors
    /// - `ChatError::Connection` if the server refuses or the handshake write
    ///   fails. Nothing is retried.
    /// - `ChatError::Framing` if `identity` is too long for a frame.
    pub async fn connect(
        address: &str,
        identity: &str,
        events: EventSender,
    ) -> Result<Self, ChatError> {
        let handshake = encode(identity.as_bytes())?;

        let stream = TcpStream::connect(address).await?;
        let local_addr = stream.local_addr()?;
        let (read_half, mut writer) = stream.into_split();

        writer.write_all(&handshake).await?;
        info!("🤝 Connected to {} as '{}'", address, identity);

        let active = Arc::new(AtomicBool::new(true));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let receiver = tokio::spawn(receive_loop(
            FrameReader::new(read_half),
            events,
            active.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            identity: identity.to_string(),
            local_addr,
            writer,
            active,
            shutdown,
            receiver,
        })
    }

    /// Send one chat line.
    ///
    /// The identity and content frames go out in a single write, so the
    /// server never sees one without the other.
    pub async fn send(&mut self, text: &str) -> Result<(), ChatError> {
        if !self.is_active() {
            return Err(ChatError::Closed);
        }

        let bytes = encode_pair(self.identity.as_bytes(), text.as_bytes())?;
        self.writer.write_all(&bytes).await?;

        debug!("📤 Sent {} bytes as '{}'", text.len(), self.identity);
        Ok(())
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `false` once the receive task has stopped.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop the receive task, close the connection and wait for the task to
    /// finish. No [`ChatEvent::ConnectionLost`] is reported for this.
    pub async fn shutdown(self) -> Result<(), ChatError> {
        let Self {
            mut writer,
            active,
            shutdown,
            receiver,
            ..
        } = self;

        // The receive task may already be gone, in which case nobody is listening.
        let _ = shutdown.send(());
        active.store(false, Ordering::SeqCst);

        let closed = writer.shutdown().await;
        if let Err(e) = receiver.await {
            warn!("⚠️  Receive task ended abnormally: {}", e);
        }

        match closed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn receive_loop(
    mut reader: FrameReader,
    events: EventSender,
    active: Arc<AtomicBool>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let reason = loop {
        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown => {
                debug!("Receive loop stopped by shutdown");
                active.store(false, Ordering::SeqCst);
                return;
            }
            outcome = reader.read_pair() => outcome,
        };

        match outcome {
            Ok(ReadOutcome::Pending) => continue,
            Ok(ReadOutcome::Pair(pair)) => {
                let _ = events.send(ChatEvent::Message {
                    identity: pair.identity.text(),
                    text: pair.content.text(),
                });
            }
            Ok(ReadOutcome::Closed { .. }) => break "connection closed by the server".to_string(),
            Err(e) => break e.to_string(),
        }
    };

    active.store(false, Ordering::SeqCst);
    warn!("⚠️  Session ended: {}", reason);
    let _ = events.send(ChatEvent::ConnectionLost { reason });
}
