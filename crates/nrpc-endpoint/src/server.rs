//! Server-side registration, validation and loss detection.
//!
//! A `ServerEndpoint` owns one [`ListenChannel`] and runs the
//! `AddClient`/`ClientAdded` and `ValidateClient`/`ClientValidated`
//! handshakes itself, so callers above it (the routing layer) only ever
//! see application-level calls and responses.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde_json::{Value as Json, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use nrpc_protocol::{PeerIdentity, routing_message, server_message};
use nrpc_transport::{ChannelEvent, ListenChannel, PeerState};

use crate::client_record::{ClientRecord, ClientState};
use crate::config::EndpointConfig;
use crate::error::EndpointError;
use crate::metadata::SocketMetadata;

/// An application-visible event surfaced by [`ServerEndpoint::poll`].
///
/// Registration and validation handshakes are handled internally and never
/// reach this enum — only things a routing layer needs to act on do.
#[derive(Debug)]
pub enum ServerEvent {
    ClientValidated(u64),
    ClientLost(u64),
    /// A `Service.Method` call on the forward channel.
    Call {
        client_id: u64,
        service: String,
        method: String,
        payload: Json,
    },
    /// A `response:`/`fwd_response:`-wrapped reply on the reverse channel.
    Reply {
        client_id: u64,
        status: String,
        payload: Json,
    },
    /// `ServerMessage.ForwardCall`, routed to another client by the
    /// forwarding layer.
    ForwardCall {
        from_client: u64,
        to_client: u64,
        status: String,
        payload: Json,
    },
    /// One of the `RoutingMessage.*` introspection/reconciliation verbs,
    /// left for the routing layer to interpret and answer.
    Routing {
        client_id: u64,
        status: String,
        payload: Json,
    },
}

/// Renders a peer identity as a signature string for the handshake payload.
/// Identities are opaque bytes; this is a lossy display, not a parse target.
fn identity_signature(identity: &PeerIdentity) -> String {
    String::from_utf8_lossy(identity.as_bytes()).into_owned()
}

pub struct ServerEndpoint {
    listen: ListenChannel,
    clients: Mutex<HashMap<u64, ClientRecord>>,
    forward_index: Mutex<HashMap<PeerIdentity, u64>>,
    next_id: AtomicU64,
    config: EndpointConfig,
    metadata: Mutex<SocketMetadata>,
}

impl ServerEndpoint {
    pub async fn bind(
        addr: impl tokio::net::ToSocketAddrs,
        config: EndpointConfig,
        entry_file: impl Into<String>,
    ) -> Result<Arc<Self>, EndpointError> {
        let listen = ListenChannel::bind(addr).await?;
        let local_addr = listen.local_addr();
        let metadata = SocketMetadata::local(
            entry_file,
            local_addr.ip().to_string(),
            local_addr.port(),
            local_addr.port().wrapping_add(10_000),
        );
        let endpoint = Arc::new(Self {
            listen,
            clients: Mutex::new(HashMap::new()),
            forward_index: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
            metadata: Mutex::new(metadata),
        });

        let loss_watcher = endpoint.clone();
        tokio::spawn(async move { loss_watcher.watch_disconnects().await });

        Ok(endpoint)
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.listen.local_addr()
    }

    /// Attaches an extra user key/value pair to this endpoint's metadata
    /// (e.g. a `fixed_start_time` that should survive reconnects).
    pub async fn add_metadata(&self, key: impl Into<String>, value: Json) {
        let mut metadata = self.metadata.lock().await;
        metadata.extra.insert(key.into(), value);
    }

    pub async fn metadata(&self) -> SocketMetadata {
        self.metadata.lock().await.clone()
    }

    /// The currently validated, non-lost client ids — loss and unvalidated
    /// clients are filtered out (§4.2's "client_ids() filters lost/
    /// unvalidated clients").
    pub async fn client_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .clients
            .lock()
            .await
            .values()
            .filter(|r| r.is_validated())
            .map(|r| r.client_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn client_info(&self, client_id: u64) -> Option<ClientRecord> {
        self.clients.lock().await.get(&client_id).cloned()
    }

    /// Blocks, polling at `loss_poll_interval`, until `client_ids()`
    /// differs from `expected_ids` or `timeout` elapses. Returns the
    /// up-to-date id list either way.
    pub async fn wait_for_change(&self, timeout: std::time::Duration, expected_ids: &[u64]) -> Vec<u64> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.update().await;
            let current = self.client_ids().await;
            if current != expected_ids || tokio::time::Instant::now() >= deadline {
                return current;
            }
            tokio::time::sleep(self.config.loss_poll_interval).await;
        }
    }

    async fn watch_disconnects(self: Arc<Self>) {
        let mut events = self.listen.events();
        while let Ok(event) = events.recv().await {
            if let ChannelEvent::Disconnected(identity) = event {
                self.mark_lost_by_identity(&identity).await;
            }
        }
    }

    async fn mark_lost_by_identity(&self, identity: &PeerIdentity) {
        let mut clients = self.clients.lock().await;
        for record in clients.values_mut() {
            let owns_identity = record.forward_identity == *identity
                || record.reverse_identity.as_ref() == Some(identity);
            if owns_identity && record.state != ClientState::Lost {
                record.state = ClientState::Lost;
                warn!(client_id = record.client_id, "client connection lost");
            }
        }
    }

    /// Re-probes every known client's transport liveness, marking any whose
    /// connection has silently dropped as `Lost`. Complements the
    /// event-driven `watch_disconnects` task for callers that want an
    /// on-demand check.
    pub async fn update(&self) {
        let identities: Vec<(u64, PeerIdentity)> = {
            let clients = self.clients.lock().await;
            clients
                .values()
                .filter(|r| r.is_alive())
                .map(|r| (r.client_id, r.forward_identity.clone()))
                .collect()
        };
        for (client_id, identity) in identities {
            if self.listen.peer_state(&identity).await == PeerState::Disconnected {
                self.mark_lost_by_identity(&identity).await;
                debug!(client_id, "update() detected loss");
            }
        }
    }

    pub async fn client_state(&self, client_id: u64) -> Option<ClientState> {
        self.clients
            .lock()
            .await
            .get(&client_id)
            .map(|r| r.state.clone())
    }

    /// Blocks (with the endpoint's configured poll cadence) until the next
    /// application-relevant event. Runs the registration/validation
    /// handshake transparently when control-verb frames arrive.
    pub async fn poll(&self) -> Result<Option<ServerEvent>, EndpointError> {
        let Some(frame) = self
            .listen
            .recv_timeout(self.config.loss_poll_interval)
            .await
        else {
            return Ok(None);
        };

        match frame.status.as_str() {
            s if s == server_message::ADD_CLIENT => {
                let client_id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let mut client_metadata: SocketMetadata = if frame.payload.is_empty() {
                    SocketMetadata::default()
                } else {
                    serde_json::from_slice(&frame.payload).unwrap_or_default()
                };
                client_metadata.client_signature = identity_signature(&frame.identity);
                let reverse_identity = frame.identity.to_reverse();
                let mut record =
                    ClientRecord::new(client_id, frame.identity.clone(), client_metadata.clone());
                record.reverse_identity = Some(reverse_identity);
                self.clients.lock().await.insert(client_id, record);
                self.forward_index
                    .lock()
                    .await
                    .insert(frame.identity.clone(), client_id);
                let server_metadata = self.metadata().await;
                let payload = Bytes::from(serde_json::to_vec(&json!({
                    "client_id": client_id,
                    "client_signature": client_metadata.client_signature,
                    "client_signature_rev": client_metadata.client_signature_rev,
                    "client_metadata": client_metadata,
                    "server_metadata": server_metadata,
                }))?);
                self.listen
                    .send_to(&frame.identity, server_message::CLIENT_ADDED, payload)
                    .await?;
                info!(client_id, "client added");
                Ok(None)
            }
            s if s == server_message::OPEN_REVERSE => {
                // The client just dialed its reverse leg; this is the first
                // frame on that connection, so it's also what lets our
                // accept-side transport learn the reverse identity. Now we
                // can address it: send ValidateClient and wait for the
                // client's ClientValidated reply.
                let payload: Json = serde_json::from_slice(&frame.payload)?;
                let client_id = payload
                    .get("client_id")
                    .and_then(Json::as_u64)
                    .ok_or_else(|| EndpointError::UnexpectedReply {
                        expected: "client_id in OpenReverse payload",
                        got: payload.to_string(),
                    })?;
                let client_metadata = {
                    let mut clients = self.clients.lock().await;
                    let Some(record) = clients.get_mut(&client_id) else {
                        return Err(EndpointError::UnknownClient(client_id));
                    };
                    record.reverse_identity = Some(frame.identity.clone());
                    record.client_metadata.client_signature_rev = identity_signature(&frame.identity);
                    record.client_metadata.clone()
                };
                let server_metadata = self.metadata().await;
                let request = Bytes::from(serde_json::to_vec(&json!({
                    "client_id": client_id,
                    "client_signature": client_metadata.client_signature,
                    "client_signature_rev": client_metadata.client_signature_rev,
                    "client_metadata": client_metadata,
                    "server_metadata": server_metadata,
                }))?);
                self.listen
                    .send_to(&frame.identity, server_message::VALIDATE_CLIENT, request)
                    .await?;
                Ok(None)
            }
            s if s == server_message::CLIENT_VALIDATED => {
                let payload: Json = serde_json::from_slice(&frame.payload)?;
                let client_id = payload
                    .get("client_id")
                    .and_then(Json::as_u64)
                    .ok_or_else(|| EndpointError::UnexpectedReply {
                        expected: "client_id in ClientValidated payload",
                        got: payload.to_string(),
                    })?;
                {
                    let mut clients = self.clients.lock().await;
                    let Some(record) = clients.get_mut(&client_id) else {
                        return Err(EndpointError::UnknownClient(client_id));
                    };
                    record.state = ClientState::Validated;
                }
                info!(client_id, "client validated");
                Ok(Some(ServerEvent::ClientValidated(client_id)))
            }
            s if s == server_message::FORWARD_CALL => {
                let payload: Json = serde_json::from_slice(&frame.payload)?;
                let from_client = *self
                    .forward_index
                    .lock()
                    .await
                    .get(&frame.identity)
                    .ok_or(EndpointError::UnknownClient(0))?;
                let to_client = payload
                    .get("to_client")
                    .and_then(Json::as_u64)
                    .ok_or_else(|| EndpointError::UnexpectedReply {
                        expected: "to_client in ForwardCall payload",
                        got: payload.to_string(),
                    })?;
                let status = payload
                    .get("status")
                    .and_then(Json::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let inner_payload = payload.get("payload").cloned().unwrap_or(Json::Null);
                Ok(Some(ServerEvent::ForwardCall {
                    from_client,
                    to_client,
                    status,
                    payload: inner_payload,
                }))
            }
            s if s == routing_message::GET_APP_INFO
                || s == routing_message::GET_SCHEMA
                || s == routing_message::SET_SCHEMA =>
            {
                let client_id = self
                    .client_id_for_identity(&frame.identity)
                    .await
                    .ok_or(EndpointError::UnknownClient(0))?;
                let payload: Json = serde_json::from_slice(&frame.payload)?;
                Ok(Some(ServerEvent::Routing {
                    client_id,
                    status: s.to_owned(),
                    payload,
                }))
            }
            status if status.starts_with("response:") || status.starts_with("fwd_response:") => {
                let client_id = self
                    .client_id_for_identity(&frame.identity)
                    .await
                    .ok_or(EndpointError::UnknownClient(0))?;
                let payload: Json = serde_json::from_slice(&frame.payload)?;
                Ok(Some(ServerEvent::Reply {
                    client_id,
                    status: status.to_owned(),
                    payload,
                }))
            }
            status => match nrpc_protocol::split_service_method(status) {
                Some((service, method)) => {
                    let client_id = self
                        .client_id_for_identity(&frame.identity)
                        .await
                        .ok_or(EndpointError::UnknownClient(0))?;
                    let payload: Json = serde_json::from_slice(&frame.payload)?;
                    Ok(Some(ServerEvent::Call {
                        client_id,
                        service: service.to_owned(),
                        method: method.to_owned(),
                        payload,
                    }))
                }
                None => {
                    debug!(status, "dropping unrecognized status frame");
                    Ok(None)
                }
            },
        }
    }

    async fn client_id_for_identity(&self, identity: &PeerIdentity) -> Option<u64> {
        if let Some(id) = self.forward_index.lock().await.get(identity).copied() {
            return Some(id);
        }
        self.clients
            .lock()
            .await
            .values()
            .find(|r| r.reverse_identity.as_ref() == Some(identity))
            .map(|r| r.client_id)
    }

    async fn record(&self, client_id: u64) -> Result<ClientRecord, EndpointError> {
        let clients = self.clients.lock().await;
        let record = clients
            .get(&client_id)
            .ok_or(EndpointError::UnknownClient(client_id))?;
        if !record.is_alive() {
            return Err(EndpointError::ClientLost(client_id));
        }
        Ok(record.clone())
    }

    /// Replies on a client's forward channel — the channel the client's own
    /// call arrived on.
    pub async fn send_forward(
        &self,
        client_id: u64,
        status: impl Into<String>,
        payload: Bytes,
    ) -> Result<(), EndpointError> {
        let record = self.record(client_id).await?;
        self.listen
            .send_to(&record.forward_identity, status, payload)
            .await?;
        Ok(())
    }

    /// Dispatches a server-initiated call to a client on its reverse
    /// channel — the leg the client keeps open specifically so the server
    /// can call back into it.
    pub async fn send_reverse(
        &self,
        client_id: u64,
        status: impl Into<String>,
        payload: Bytes,
    ) -> Result<(), EndpointError> {
        let record = self.record(client_id).await?;
        let reverse = record
            .reverse_identity
            .clone()
            .ok_or(EndpointError::ClientLost(client_id))?;
        self.listen.send_to(&reverse, status, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrpc_transport::ConnectChannel;

    #[tokio::test]
    async fn add_client_then_validate_assigns_and_marks_validated() {
        let endpoint = ServerEndpoint::bind("127.0.0.1:0", EndpointConfig::default(), "demo.rs")
            .await
            .unwrap();
        let addr = endpoint.local_addr();
        let server = endpoint.clone();
        tokio::spawn(async move {
            loop {
                let _ = server.poll().await;
            }
        });

        let forward_identity = PeerIdentity::from("client-a");
        let forward = ConnectChannel::connect(addr, forward_identity.clone())
            .await
            .unwrap();
        forward
            .send(server_message::ADD_CLIENT, Bytes::new())
            .await
            .unwrap();
        let added = forward
            .recv_timeout(std::time::Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(added.status, server_message::CLIENT_ADDED);
        let added_json: Json = serde_json::from_slice(&added.payload).unwrap();
        let client_id = added_json["client_id"].as_u64().unwrap();

        let reverse_identity = forward_identity.to_reverse();
        let reverse = ConnectChannel::connect(addr, reverse_identity)
            .await
            .unwrap();
        reverse
            .send(
                server_message::OPEN_REVERSE,
                Bytes::from(serde_json::to_vec(&json!({ "client_id": client_id })).unwrap()),
            )
            .await
            .unwrap();
        let validate = reverse
            .recv_timeout(std::time::Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(validate.status, server_message::VALIDATE_CLIENT);
        reverse
            .send(
                server_message::CLIENT_VALIDATED,
                Bytes::from(serde_json::to_vec(&json!({ "client_id": client_id })).unwrap()),
            )
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(
            endpoint.client_state(client_id).await,
            Some(ClientState::Validated)
        );
    }
}
