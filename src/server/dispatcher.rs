//! # Dispatcher - Server Event Loop
//!
//! The relay's single thread of control. It owns the listener, the
//! [`Registry`] and the [`Roster`], and every write to a client goes through
//! it.
//!
//! ## Readiness
//!
//! Each accepted socket is split. Its read half goes to a small connection
//! task that does nothing but read: the identity frame first, then frame
//! pairs, reporting each outcome back over an internal channel. The write half
//! goes into the registry. The dispatcher then waits on exactly two things,
//! the listener and that channel, and reacts to whichever is ready, preferring
//! new connections:
//!
//! ```text
//! accept ──> connection task ──(Joined / Pair / Departed)──> dispatcher ──> write halves
//! ```
//!
//! Because the connection tasks never write and never touch shared state, the
//! binary can run the whole server on a current-thread runtime.
//!
//! ## Broadcasts
//!
//! ```text
//! join:     SERVER / "<identity> has entered the room!"  -> everyone but the new client
//! message:  sender's two frames, byte-for-byte           -> everyone but the sender
//! leave:    SERVER / "<identity> has disconnected!"      -> everyone still connected
//! ```
//!
//! A broadcast is fully written before the next event is looked at. A client
//! whose write fails or times out is torn down after the broadcast finishes.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

use crate::common::connection::{FrameReader, ReadOutcome};
use crate::common::events::{ChatEvent, EventSender};
use crate::common::frame::{encode_pair, FramePair, RawFrame, SERVER_IDENTITY};
use crate::server::config::ServerConfig;
use crate::server::registry::{ConnectionId, Registry};
use crate::server::roster::Roster;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// What the dispatcher keeps per registered client.
struct ClientHandle {
    writer: OwnedWriteHalf,
    addr: SocketAddr,
    /// Dropped together with the registry entry, which tells the connection
    /// task to stop reading.
    _close: oneshot::Sender<()>,
}

/// Reports from connection tasks.
enum Inbound {
    Joined {
        id: ConnectionId,
        addr: SocketAddr,
        identity: RawFrame,
        writer: OwnedWriteHalf,
        close: oneshot::Sender<()>,
    },
    Pair {
        id: ConnectionId,
        pair: FramePair,
    },
    Departed {
        id: ConnectionId,
        reason: String,
    },
}

pub struct Dispatcher {
    listener: TcpListener,
    handshake_timeout: Duration,
    write_timeout: Duration,
    registry: Registry<ClientHandle>,
    roster: Roster,
    events: EventSender,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    next_id: u64,
}

impl Dispatcher {
    /// Bind the listening endpoint.
    ///
    /// This is the only failure that stops the server; everything after it is
    /// contained to the connection it happened on.
    ///
    /// # Example
    /// ```ignore
    /// let (events, mut rx) = lan_chat::common::events::channel();
    /// let dispatcher = Dispatcher::bind(&ServerConfig::default(), events).await?;
    /// tokio::spawn(dispatcher.run());
    /// ```
    pub async fn bind(config: &ServerConfig, events: EventSender) -> Result<Self> {
        let listener = TcpListener::bind(&config.server.address)
            .await
            .with_context(|| format!("failed to bind to {}", config.server.address))?;

        info!("📡 Chat server listening on {}", listener.local_addr()?);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            listener,
            handshake_timeout: config.server.handshake_timeout(),
            write_timeout: config.server.write_timeout(),
            registry: Registry::new(),
            roster: Roster::new(),
            events,
            inbound_tx,
            inbound_rx,
            next_id: 0,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the event loop for the lifetime of the process.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.accept(stream, addr),
                    Err(e) => self.accept_failed(&e).await,
                },

                Some(inbound) = self.inbound_rx.recv() => self.handle_inbound(inbound).await,
            }
        }
    }

    /// Stop accepting for a moment but keep serving connected clients.
    ///
    /// Errors such as running out of file descriptors come back on every
    /// poll. Under the biased select they would starve the inbound channel,
    /// and departures from that channel are what free descriptors again.
    async fn accept_failed(&mut self, e: &std::io::Error) {
        error!("❌ Accept error: {}, pausing accepts", e);

        let pause = tokio::time::sleep(ACCEPT_ERROR_BACKOFF);
        tokio::pin!(pause);

        loop {
            tokio::select! {
                _ = &mut pause => return,
                Some(inbound) = self.inbound_rx.recv() => self.handle_inbound(inbound).await,
            }
        }
    }

    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        debug!("🔗 Accepted connection {} from {}", id, addr);

        tokio::spawn(serve_connection(
            id,
            stream,
            addr,
            self.handshake_timeout,
            self.inbound_tx.clone(),
        ));
    }

    async fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Joined {
                id,
                addr,
                identity,
                writer,
                close,
            } => {
                let handle = ClientHandle {
                    writer,
                    addr,
                    _close: close,
                };
                self.admit(id, identity, handle).await;
            }
            Inbound::Pair { id, pair } => self.relay(id, pair).await,
            Inbound::Departed { id, reason } => self.depart(vec![(id, reason)]).await,
        }
    }

    async fn admit(&mut self, id: ConnectionId, identity_frame: RawFrame, handle: ClientHandle) {
        let addr = handle.addr;
        let identity = identity_frame.text();
        if !self.registry.register(id, identity_frame, handle) {
            warn!("⚠️  Connection {} completed a second handshake, ignoring", id);
            return;
        }

        info!(
            "👋 Accepted new connection from {} username:{}",
            addr, identity
        );
        self.roster.push(identity.clone());
        info!("👥 Connected clients: {}", self.roster.len());
        self.emit(ChatEvent::Joined {
            identity: identity.clone(),
        });

        let notice = format!("{} has entered the room!", identity);
        let targets = self.registry.connections_except(id);
        self.notify(targets, &notice).await;
    }

    async fn relay(&mut self, id: ConnectionId, pair: FramePair) {
        // The sender may have been torn down after a failed write while this
        // pair was still queued.
        let Some(identity) = self.registry.identity_of(id).map(str::to_string) else {
            debug!("Dropping pair from unregistered connection {}", id);
            return;
        };

        // Relayed under the identity announced at handshake, whatever the
        // client put in this pair's identity frame.
        let mut bytes = match self.registry.identity_frame_of(id) {
            Some(frame) => frame.as_bytes().to_vec(),
            None => return,
        };
        bytes.extend_from_slice(pair.content.as_bytes());

        let text = pair.content.text();
        info!("💬 <{}>: {}", identity, text);
        self.emit(ChatEvent::Message { identity, text });

        let targets = self.registry.connections_except(id);
        let failed = self.fan_out(&targets, &bytes).await;
        self.depart(failed).await;
    }

    /// Tear down connections. Each departure tells the remaining clients, and
    /// a failed write during that notice queues another departure, so this
    /// works through a queue rather than recursing.
    async fn depart(&mut self, departures: Vec<(ConnectionId, String)>) {
        let mut queue: VecDeque<_> = departures.into();

        while let Some((id, reason)) = queue.pop_front() {
            let Some(entry) = self.registry.unregister(id) else {
                continue;
            };

            info!(
                "🔌 {} ({}) disconnected: {}",
                entry.identity, entry.connection.addr, reason
            );
            self.roster.remove(&entry.identity);
            info!("👥 Connected clients: {}", self.roster.len());
            self.emit(ChatEvent::Left {
                identity: entry.identity.clone(),
            });

            let notice = format!("{} has disconnected!", entry.identity);
            drop(entry);

            let Some(bytes) = server_notice(&notice) else {
                continue;
            };
            let targets = self.registry.all_connections();
            queue.extend(self.fan_out(&targets, &bytes).await);
        }
    }

    async fn notify(&mut self, targets: Vec<ConnectionId>, notice: &str) {
        let Some(bytes) = server_notice(notice) else {
            return;
        };

        let failed = self.fan_out(&targets, &bytes).await;
        self.depart(failed).await;
    }

    /// Write `bytes` to each target in turn. Returns the targets that could
    /// not be written to.
    async fn fan_out(
        &mut self,
        targets: &[ConnectionId],
        bytes: &[u8],
    ) -> Vec<(ConnectionId, String)> {
        let mut failed = Vec::new();

        for &target in targets {
            let Some(handle) = self.registry.connection_mut(target) else {
                continue;
            };

            match tokio::time::timeout(self.write_timeout, handle.writer.write_all(bytes)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("⚠️  Write to {} failed: {}", handle.addr, e);
                    failed.push((target, format!("write failed: {}", e)));
                }
                Err(_) => {
                    warn!("⚠️  Write to {} timed out", handle.addr);
                    failed.push((target, "write timed out".to_string()));
                }
            }
        }

        failed
    }

    fn emit(&self, event: ChatEvent) {
        // Nobody listening is fine; the relay keeps working headless.
        let _ = self.events.send(event);
    }
}

/// `SERVER` identity frame followed by `notice`.
fn server_notice(notice: &str) -> Option<Vec<u8>> {
    match encode_pair(SERVER_IDENTITY.as_bytes(), notice.as_bytes()) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("❌ Failed to encode server notice: {}", e);
            None
        }
    }
}

/// Read side of one client connection: handshake, then frame pairs until the
/// peer goes away or the dispatcher drops the client.
async fn serve_connection(
    id: ConnectionId,
    stream: TcpStream,
    addr: SocketAddr,
    handshake_timeout: Duration,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    let (read_half, writer) = stream.into_split();
    let mut reader = FrameReader::new(read_half);

    let identity = match tokio::time::timeout(handshake_timeout, reader.read_frame()).await {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => {
            warn!("⚠️  {} closed before sending an identity", addr);
            return;
        }
        Ok(Err(e)) => {
            warn!("⚠️  Handshake with {} failed: {}", addr, e);
            return;
        }
        Err(_) => {
            warn!("⚠️  Handshake with {} timed out", addr);
            return;
        }
    };

    let (close, mut closed) = oneshot::channel();
    let joined = Inbound::Joined {
        id,
        addr,
        identity,
        writer,
        close,
    };
    if inbound.send(joined).is_err() {
        return;
    }

    loop {
        let outcome = tokio::select! {
            biased;
            _ = &mut closed => return,
            outcome = reader.read_pair() => outcome,
        };

        let reason = match outcome {
            Ok(ReadOutcome::Pending) => continue,
            Ok(ReadOutcome::Pair(pair)) => {
                debug!("📨 Pair from {} ({} byte message)", id, pair.content.payload().len());
                if inbound.send(Inbound::Pair { id, pair }).is_err() {
                    return;
                }
                continue;
            }
            Ok(ReadOutcome::Closed { mid_frame: false }) => "closed by peer".to_string(),
            Ok(ReadOutcome::Closed { mid_frame: true }) => "closed in the middle of a frame".to_string(),
            Err(e) => e.to_string(),
        };

        let _ = inbound.send(Inbound::Departed { id, reason });
        return;
    }
}
