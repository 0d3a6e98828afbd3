//! Client-side registration and validation handshake.
//!
//! A `ClientEndpoint` dials two connections to the same server address: a
//! forward leg it uses to place calls, and a reverse leg the server calls
//! back into. Both are driven through the same `AddClient`/`ClientAdded`
//! and `ValidateClient`/`ClientValidated` handshake the server implements.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde_json::{Value as Json, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

use nrpc_protocol::{PeerIdentity, server_message};
use nrpc_transport::ConnectChannel;

use crate::config::EndpointConfig;
use crate::error::EndpointError;
use crate::metadata::SocketMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEndpointState {
    Initial,
    ForwardConnected,
    Registered,
    ReverseOpened,
    Validated,
    Lost,
}

/// An inbound event from the server on the reverse channel.
#[derive(Debug)]
pub enum ClientEvent {
    /// A `Service.Method` call the server placed back into this client.
    Call {
        service: String,
        method: String,
        payload: Json,
    },
    /// One of the `RoutingMessage.*` verbs (the server introspecting this
    /// client), left for the routing layer to answer.
    Routing { status: String, payload: Json },
}

pub struct ClientEndpoint {
    forward: ConnectChannel,
    reverse: ConnectChannel,
    client_id: u64,
    state: Mutex<ClientEndpointState>,
    config: EndpointConfig,
    call_count: AtomicU64,
    forward_lock: Mutex<()>,
    reverse_lock: Mutex<()>,
    server_metadata: Mutex<SocketMetadata>,
}

impl ClientEndpoint {
    pub async fn connect(
        addr: impl tokio::net::ToSocketAddrs + Clone,
        identity: PeerIdentity,
        config: EndpointConfig,
        metadata: SocketMetadata,
    ) -> Result<Self, EndpointError> {
        let forward = ConnectChannel::connect(addr.clone(), identity.clone()).await?;
        debug!("forward channel connected");

        forward
            .send(
                server_message::ADD_CLIENT,
                Bytes::from(serde_json::to_vec(&metadata)?),
            )
            .await?;
        let added = forward
            .recv_timeout(config.handshake_timeout)
            .await
            .ok_or(EndpointError::HandshakeTimeout("ClientAdded"))?;
        if added.status != server_message::CLIENT_ADDED {
            return Err(EndpointError::UnexpectedReply {
                expected: server_message::CLIENT_ADDED,
                got: added.status,
            });
        }
        let added_json: Json = serde_json::from_slice(&added.payload)?;
        let client_id = added_json
            .get("client_id")
            .and_then(Json::as_u64)
            .ok_or_else(|| EndpointError::UnexpectedReply {
                expected: "client_id in ClientAdded payload",
                got: added_json.to_string(),
            })?;
        let server_metadata: SocketMetadata = added_json
            .get("server_metadata")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let reverse = ConnectChannel::connect(addr, identity.to_reverse()).await?;
        // Announce ourselves on the reverse leg so the server's accept-side
        // transport can learn this connection's identity before it has
        // anything of ours to key a reply off. The server then drives the
        // rest: it sends ValidateClient, and until it does we drop anything
        // else that shows up here, replying message_dropped so the server
        // (or a misbehaving peer) knows why.
        reverse
            .send(
                server_message::OPEN_REVERSE,
                Bytes::from(serde_json::to_vec(&json!({ "client_id": client_id }))?),
            )
            .await?;
        let validated_json = loop {
            let frame = reverse
                .recv_timeout(config.handshake_timeout)
                .await
                .ok_or(EndpointError::HandshakeTimeout("ValidateClient"))?;
            if frame.status == server_message::VALIDATE_CLIENT {
                break serde_json::from_slice::<Json>(&frame.payload)?;
            }
            debug!(status = %frame.status, "dropping early reverse-channel message before validation");
            reverse
                .send(
                    nrpc_protocol::dropped_status(&frame.status),
                    Bytes::from(serde_json::to_vec(&json!({ "error": "Early message dropped" }))?),
                )
                .await?;
        };
        let server_metadata: SocketMetadata = validated_json
            .get("server_metadata")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or(server_metadata);

        reverse
            .send(
                server_message::CLIENT_VALIDATED,
                Bytes::from(serde_json::to_vec(&json!({
                    "client_id": client_id,
                    "client_metadata": metadata,
                }))?),
            )
            .await?;

        info!(client_id, "client endpoint validated");
        Ok(Self {
            forward,
            reverse,
            client_id,
            state: Mutex::new(ClientEndpointState::Validated),
            config,
            call_count: AtomicU64::new(0),
            forward_lock: Mutex::new(()),
            reverse_lock: Mutex::new(()),
            server_metadata: Mutex::new(server_metadata),
        })
    }

    /// The server's metadata, as captured during the connect handshake.
    pub async fn server_metadata(&self) -> SocketMetadata {
        self.server_metadata.lock().await.clone()
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub async fn state(&self) -> ClientEndpointState {
        *self.state.lock().await
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub async fn is_ready(&self) -> bool {
        *self.state.lock().await == ClientEndpointState::Validated
    }

    /// Re-probes both legs' transport liveness, transitioning to `Lost` if
    /// either has silently dropped.
    pub async fn update(&self) {
        let forward_lost = !self.forward.is_connected().await;
        let reverse_lost = !self.reverse.is_connected().await;
        if forward_lost || reverse_lost {
            let mut state = self.state.lock().await;
            if *state != ClientEndpointState::Lost {
                *state = ClientEndpointState::Lost;
            }
        }
    }

    /// Places a `Service.Method` call on the forward channel and awaits its
    /// response. Calls are serialized through `forward_lock`, matching the
    /// protocol's one-outstanding-request-per-direction contract.
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        payload: Json,
    ) -> Result<Json, EndpointError> {
        self.call_raw(&nrpc_protocol::method_status(service, method), payload)
            .await
    }

    /// Places a call under an arbitrary status string (used for the
    /// `RoutingMessage.*` verbs, which aren't `Service.Method`-shaped) and
    /// awaits its `response:`-wrapped reply. Shares the same forward lock
    /// as [`Self::call`], so a routing-message exchange and an ordinary
    /// service call never interleave on the forward channel.
    pub async fn call_raw(&self, status: &str, payload: Json) -> Result<Json, EndpointError> {
        let _guard = self.forward_lock.lock().await;
        if self.state().await == ClientEndpointState::Lost {
            return Err(EndpointError::ClientLost(self.client_id));
        }
        self.forward
            .send(status.to_owned(), Bytes::from(serde_json::to_vec(&payload)?))
            .await?;
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let expected = nrpc_protocol::response_status(status);
        loop {
            let frame = self
                .forward
                .recv_timeout(self.config.handshake_timeout)
                .await
                .ok_or(EndpointError::HandshakeTimeout("call response"))?;
            if frame.status == expected {
                return Ok(serde_json::from_slice(&frame.payload)?);
            }
            debug!(status = %frame.status, "ignoring stray frame while awaiting call response");
        }
    }

    /// Places a `ServerMessage.ForwardCall` envelope on the forward channel
    /// and awaits the server's `fwd_response:<method_name>`-wrapped reply —
    /// the final-hop status a forwarded call comes back under, distinct
    /// from the `response:ServerMessage.ForwardCall` an ordinary
    /// [`Self::call_raw`] would wait for.
    pub async fn call_forward(
        &self,
        to_client: u64,
        method_name: &str,
        payload: Json,
    ) -> Result<Json, EndpointError> {
        let _guard = self.forward_lock.lock().await;
        if self.state().await == ClientEndpointState::Lost {
            return Err(EndpointError::ClientLost(self.client_id));
        }
        let envelope = json!({
            "to_client": to_client,
            "status": method_name,
            "payload": payload,
        });
        self.forward
            .send(
                server_message::FORWARD_CALL,
                Bytes::from(serde_json::to_vec(&envelope)?),
            )
            .await?;
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let expected = nrpc_protocol::forward_response_status(method_name);
        loop {
            let frame = self
                .forward
                .recv_timeout(self.config.handshake_timeout)
                .await
                .ok_or(EndpointError::HandshakeTimeout("forward call response"))?;
            if frame.status == expected {
                return Ok(serde_json::from_slice(&frame.payload)?);
            }
            debug!(status = %frame.status, "ignoring stray frame while awaiting forward response");
        }
    }

    /// Waits for the next server-initiated call on the reverse channel.
    pub async fn next_event(&self) -> Result<Option<ClientEvent>, EndpointError> {
        let Some(frame) = self
            .reverse
            .recv_timeout(self.config.loss_poll_interval)
            .await
        else {
            return Ok(None);
        };
        if frame.status == nrpc_protocol::routing_message::GET_APP_INFO
            || frame.status == nrpc_protocol::routing_message::GET_SCHEMA
            || frame.status == nrpc_protocol::routing_message::SET_SCHEMA
        {
            return Ok(Some(ClientEvent::Routing {
                status: frame.status,
                payload: serde_json::from_slice(&frame.payload)?,
            }));
        }
        match nrpc_protocol::split_service_method(&frame.status) {
            Some((service, method)) => Ok(Some(ClientEvent::Call {
                service: service.to_owned(),
                method: method.to_owned(),
                payload: serde_json::from_slice(&frame.payload)?,
            })),
            None => {
                debug!(status = %frame.status, "dropping unrecognized reverse-channel frame");
                Ok(None)
            }
        }
    }

    /// Replies to a server-initiated call handled via [`Self::next_event`].
    pub async fn respond(
        &self,
        service: &str,
        method: &str,
        payload: Json,
    ) -> Result<(), EndpointError> {
        self.respond_raw(
            &nrpc_protocol::method_status(service, method),
            payload,
        )
        .await
    }

    /// Replies to a [`ClientEvent::Routing`] event under its original
    /// (unwrapped) status string.
    pub async fn respond_raw(&self, status: &str, payload: Json) -> Result<(), EndpointError> {
        let _guard = self.reverse_lock.lock().await;
        let wrapped = nrpc_protocol::response_status(status);
        self.reverse
            .send(wrapped, Bytes::from(serde_json::to_vec(&payload)?))
            .await?;
        Ok(())
    }

    /// Blocks until this endpoint is no longer `Validated` (lost, or
    /// explicitly closed by the caller dropping it).
    pub async fn wait(&self) {
        loop {
            if self.state().await == ClientEndpointState::Lost {
                return;
            }
            tokio::time::sleep(Duration::from_millis(
                self.config.loss_poll_interval.as_millis() as u64,
            ))
            .await;
            self.update().await;
        }
    }

    /// Closes both legs' underlying sockets, as if this process had died,
    /// and marks the endpoint `Lost`. Idempotent.
    pub async fn close(&self) {
        *self.state.lock().await = ClientEndpointState::Lost;
        self.forward.close().await;
        self.reverse.close().await;
    }
}
