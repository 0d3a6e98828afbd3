//! TCP framing around [`nrpc_protocol::Frame`].
//!
//! The original runtime multiplexes many logical peers over a single
//! ZeroMQ ROUTER socket, addressing each by an opaque identity frame.
//! Plain TCP has no such multiplexing primitive, so [`ListenChannel`]
//! reproduces the same addressing model over ordinary accepted
//! connections: each accepted connection is registered under the identity
//! carried by its first frame, and `send_to` looks that identity back up
//! to pick the right socket. [`ConnectChannel`] is the dialing half used
//! by a client opening one outbound leg (forward or reverse).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use nrpc_protocol::{Frame, FrameDecoder, PeerIdentity};

use crate::error::TransportError;
use crate::event::{ChannelEvent, PeerState};

const EVENTS_CAPACITY: usize = 256;
const READ_CHUNK: usize = 64 * 1024;

struct PeerSlot {
    outbound: mpsc::UnboundedSender<Bytes>,
}

struct Registry {
    peers: Mutex<HashMap<PeerIdentity, PeerSlot>>,
    known: Mutex<HashMap<PeerIdentity, bool>>,
    events: broadcast::Sender<ChannelEvent>,
}

impl Registry {
    fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENTS_CAPACITY);
        Arc::new(Self {
            peers: Mutex::new(HashMap::new()),
            known: Mutex::new(HashMap::new()),
            events,
        })
    }

    async fn mark_connected(&self, identity: PeerIdentity, outbound: mpsc::UnboundedSender<Bytes>) {
        self.peers
            .lock()
            .await
            .insert(identity.clone(), PeerSlot { outbound });
        self.known.lock().await.insert(identity.clone(), true);
        let _ = self.events.send(ChannelEvent::Connected(identity));
    }

    async fn mark_disconnected(&self, identity: PeerIdentity) {
        self.peers.lock().await.remove(&identity);
        self.known.lock().await.insert(identity.clone(), false);
        let _ = self.events.send(ChannelEvent::Disconnected(identity));
    }

    async fn state(&self, identity: &PeerIdentity) -> PeerState {
        match self.known.lock().await.get(identity) {
            Some(true) => PeerState::Connected,
            Some(false) => PeerState::Disconnected,
            None => PeerState::Unknown,
        }
    }

    async fn send_to(&self, identity: &PeerIdentity, bytes: Bytes) -> Result<(), TransportError> {
        let peers = self.peers.lock().await;
        let slot = peers
            .get(identity)
            .ok_or_else(|| TransportError::UnknownPeer(identity.clone()))?;
        slot.outbound
            .send(bytes)
            .map_err(|_| TransportError::Closed)
    }
}

/// Drives one accepted (or dialed) TCP connection: a writer task draining an
/// outbound byte queue, and a reader loop decoding frames and forwarding
/// them to `inbound`.
///
/// The dialing side (`ConnectChannel`) already knows its own identity and is
/// registered under it by the caller before this task is even spawned, since
/// it must be able to send before any reply exists (`AddClient`,
/// `ValidateClient`). The accept side (`ListenChannel`) has no identity until
/// the first frame arrives, so `expected_identity` is `None` there and
/// registration happens lazily, keyed off that first decoded frame.
async fn run_connection(
    socket: TcpStream,
    registry: Arc<Registry>,
    inbound: mpsc::UnboundedSender<Frame>,
    outbound_tx: mpsc::UnboundedSender<Bytes>,
    mut outbound_rx: mpsc::UnboundedReceiver<Bytes>,
    expected_identity: Option<PeerIdentity>,
    mut shutdown: Option<oneshot::Receiver<()>>,
) {
    let (mut read_half, mut write_half) = socket.into_split();

    let writer = tokio::spawn(async move {
        while let Some(bytes) = outbound_rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut decoder = FrameDecoder::default();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut identity: Option<PeerIdentity> = expected_identity.clone();

    loop {
        let read_result = match shutdown.as_mut() {
            Some(rx) => {
                tokio::select! {
                    result = read_half.read(&mut buf) => result,
                    _ = rx => {
                        debug!("connection closed locally");
                        break;
                    }
                }
            }
            None => read_half.read(&mut buf).await,
        };
        let n = match read_result {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "connection read failed");
                break;
            }
        };
        decoder.feed(&buf[..n]);
        loop {
            match decoder.try_decode() {
                Ok(Some(frame)) => {
                    if identity.is_none() {
                        let resolved = frame.identity.clone();
                        registry
                            .mark_connected(resolved.clone(), outbound_tx.clone())
                            .await;
                        identity = Some(resolved);
                    }
                    if inbound.send(frame).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "dropping connection on frame decode error");
                    if let Some(id) = identity.clone() {
                        registry.mark_disconnected(id).await;
                    }
                    writer.abort();
                    return;
                }
            }
        }
    }

    if let Some(id) = identity {
        registry.mark_disconnected(id).await;
    }
    writer.abort();
}

/// The server side of a channel: binds one address and accepts connections
/// from any number of peers, each addressed by the identity on its first
/// frame.
pub struct ListenChannel {
    registry: Arc<Registry>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
    local_addr: std::net::SocketAddr,
}

impl ListenChannel {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let registry = Registry::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let accept_registry = registry.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, peer_addr)) => {
                        debug!(%peer_addr, "accepted connection");
                        let registry = accept_registry.clone();
                        let inbound_tx = inbound_tx.clone();
                        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                        tokio::spawn(run_connection(
                            socket,
                            registry,
                            inbound_tx,
                            outbound_tx,
                            outbound_rx,
                            None,
                            None,
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            registry,
            inbound_rx: Mutex::new(inbound_rx),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    pub async fn send_to(
        &self,
        identity: &PeerIdentity,
        status: impl Into<String>,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let frame = Frame::new(identity.clone(), status.into(), payload);
        self.registry.send_to(identity, frame.encode().freeze()).await
    }

    pub async fn try_recv(&self) -> Option<Frame> {
        self.inbound_rx.lock().await.try_recv().ok()
    }

    pub async fn recv_timeout(&self, timeout: Duration) -> Option<Frame> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    pub async fn peer_state(&self, identity: &PeerIdentity) -> PeerState {
        self.registry.state(identity).await
    }

    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.registry.events.subscribe()
    }
}

/// The client side of a channel: dials one address for one logical leg
/// (forward or reverse) and tags every outgoing frame with `self_identity`.
pub struct ConnectChannel {
    registry: Arc<Registry>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
    self_identity: PeerIdentity,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl ConnectChannel {
    pub async fn connect(
        addr: impl ToSocketAddrs,
        self_identity: PeerIdentity,
    ) -> Result<Self, TransportError> {
        let socket = TcpStream::connect(addr).await?;
        let registry = Registry::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        // Register our own outbound slot before the connection task even
        // starts: the handshake sends (`AddClient`, `ValidateClient`) before
        // any reply exists, so `send` must work without waiting on an
        // inbound frame to key off.
        registry
            .mark_connected(self_identity.clone(), outbound_tx.clone())
            .await;

        tokio::spawn(run_connection(
            socket,
            registry.clone(),
            inbound_tx,
            outbound_tx,
            outbound_rx,
            Some(self_identity.clone()),
            Some(shutdown_rx),
        ));

        Ok(Self {
            registry,
            inbound_rx: Mutex::new(inbound_rx),
            self_identity,
            shutdown: Mutex::new(Some(shutdown_tx)),
        })
    }

    /// Closes the underlying TCP connection as if the peer process had
    /// died, so the remote side observes an ordinary disconnect. Idempotent.
    pub async fn close(&self) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.self_identity
    }

    pub async fn send(&self, status: impl Into<String>, payload: Bytes) -> Result<(), TransportError> {
        let frame = Frame::new(self.self_identity.clone(), status.into(), payload);
        self.registry
            .send_to(&self.self_identity, frame.encode().freeze())
            .await
    }

    pub async fn try_recv(&self) -> Option<Frame> {
        self.inbound_rx.lock().await.try_recv().ok()
    }

    pub async fn recv_timeout(&self, timeout: Duration) -> Option<Frame> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    pub async fn is_connected(&self) -> bool {
        self.registry.state(&self.self_identity).await == PeerState::Connected
    }

    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.registry.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_send_reaches_server_and_server_reply_reaches_client() {
        let server = ListenChannel::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();

        let client_identity = PeerIdentity::from("client-1");
        let client = ConnectChannel::connect(addr, client_identity.clone())
            .await
            .unwrap();

        client
            .send("Demo.Ping", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let received = server.recv_timeout(Duration::from_secs(2)).await.unwrap();
        assert_eq!(received.identity, client_identity);
        assert_eq!(received.status, "Demo.Ping");
        assert_eq!(&received.payload[..], b"hello");

        server
            .send_to(&client_identity, "response:Demo.Ping", Bytes::from_static(b"world"))
            .await
            .unwrap();

        let reply = client.recv_timeout(Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply.status, "response:Demo.Ping");
        assert_eq!(&reply.payload[..], b"world");
    }

    #[tokio::test]
    async fn unknown_peer_send_fails_and_disconnect_is_observed() {
        let server = ListenChannel::bind("127.0.0.1:0").await.unwrap();
        let missing = PeerIdentity::from("ghost");
        assert!(matches!(
            server.peer_state(&missing).await,
            PeerState::Unknown
        ));
        let err = server
            .send_to(&missing, "Demo.Ping", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer(_)));

        let addr = server.local_addr();
        let client_identity = PeerIdentity::from("client-2");
        {
            let client = ConnectChannel::connect(addr, client_identity.clone())
                .await
                .unwrap();
            client.send("Demo.Ping", Bytes::new()).await.unwrap();
            let _ = server.recv_timeout(Duration::from_secs(2)).await.unwrap();
        }
        // client dropped; connection closes and server should observe it.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(
            server.peer_state(&client_identity).await,
            PeerState::Disconnected
        ));
    }
}
