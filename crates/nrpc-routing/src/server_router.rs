//! `ServerRouter`: wraps a `ServerEndpoint` with a schema registry, a
//! dispatch table, and client-to-client forwarding.
//!
//! Owns the endpoint's only reader — `ServerEndpoint::poll()` — via a single
//! background task, exactly as `ServerEndpoint` itself owns the one task
//! allowed to read its `ListenChannel`. Forwarding replies are delivered
//! back into in-flight forward calls through `pending_replies`, a
//! `oneshot`-per-outstanding-forward map the dispatch loop fulfills; this is
//! the only way a second logical caller can "read" a reply without a second
//! task touching the endpoint's queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value as Json;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info, warn};

use nrpc_protocol::{response_status, routing_message};
use nrpc_schema::SchemaRegistry;

use nrpc_endpoint::{EndpointConfig, ServerEndpoint, ServerEvent};

use crate::binding::ServiceBinding;
use crate::dispatch::Dispatcher;
use crate::error::RoutingError;
use crate::info::{AppClientInfo, ApplicationInfo, SchemaClientInfo, SchemaInfo};

/// How long a forwarded call waits for the target client's reply before
/// giving up (the endpoint-level handshake timeout governs the legs
/// individually; this bounds the round trip as a whole).
const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ServerRouter {
    endpoint: Arc<ServerEndpoint>,
    dispatcher: Dispatcher,
    entry_file: String,
    is_ready: AtomicBool,
    reverse_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
    pending_replies: Mutex<HashMap<(u64, String), oneshot::Sender<Json>>>,
}

impl ServerRouter {
    pub async fn bind(
        addr: impl tokio::net::ToSocketAddrs,
        config: EndpointConfig,
        entry_file: impl Into<String>,
        registry: SchemaRegistry,
        services: Vec<ServiceBinding>,
    ) -> Result<Arc<Self>, RoutingError> {
        let entry_file = entry_file.into();
        let endpoint = ServerEndpoint::bind(addr, config, entry_file.clone()).await?;
        let router = Arc::new(Self {
            endpoint,
            dispatcher: Dispatcher::new(registry, services),
            entry_file,
            is_ready: AtomicBool::new(true),
            reverse_locks: Mutex::new(HashMap::new()),
            pending_replies: Mutex::new(HashMap::new()),
        });

        let dispatch_loop = router.clone();
        tokio::spawn(async move { dispatch_loop.run().await });

        Ok(router)
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn call_count(&self) -> u64 {
        self.dispatcher.call_count()
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }

    /// This endpoint's current schema, post-reconciliation with whatever
    /// clients have connected so far.
    pub async fn schema_snapshot(&self) -> nrpc_schema::SchemaSnapshot {
        self.dispatcher.schema_snapshot().await
    }

    pub async fn client_ids(&self) -> Vec<u64> {
        self.endpoint.client_ids().await
    }

    pub async fn wait_for_change(&self, timeout: Duration, expected_ids: &[u64]) -> Vec<u64> {
        self.endpoint.wait_for_change(timeout, expected_ids).await
    }

    async fn run(self: Arc<Self>) {
        loop {
            match self.endpoint.poll().await {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => {}
                Err(err) => error!(%err, "server router poll failed"),
            }
        }
    }

    async fn handle_event(self: &Arc<Self>, event: ServerEvent) {
        match event {
            ServerEvent::ClientValidated(client_id) => {
                info!(client_id, "client validated");
            }
            ServerEvent::ClientLost(client_id) => {
                warn!(client_id, "client lost");
                self.fail_pending_replies_for(client_id).await;
            }
            ServerEvent::Call {
                client_id,
                service,
                method,
                payload,
            } => {
                let response = self.dispatcher.invoke(&service, &method, payload).await;
                let status = response_status(&nrpc_protocol::method_status(&service, &method));
                if let Err(err) = self.reply_forward(client_id, status, &response).await {
                    error!(client_id, %err, "failed to send call response");
                }
            }
            ServerEvent::Routing {
                client_id,
                status,
                payload,
            } => {
                let response = self.handle_routing(client_id, &status, payload).await;
                if let Err(err) = self
                    .reply_forward(client_id, response_status(&status), &response)
                    .await
                {
                    error!(client_id, %err, "failed to send routing response");
                }
            }
            ServerEvent::ForwardCall {
                from_client,
                to_client,
                status,
                payload,
            } => {
                let router = self.clone();
                tokio::spawn(async move {
                    let result = router.perform_forward(to_client, &status, payload).await;
                    let response = result.unwrap_or_else(|err| {
                        debug!(to_client, %err, "forward failed, returning null response");
                        Json::Null
                    });
                    let forward_status = nrpc_protocol::forward_response_status(&status);
                    if let Err(err) = router.reply_forward(from_client, forward_status, &response).await
                    {
                        error!(from_client, %err, "failed to return forward result");
                    }
                });
            }
            ServerEvent::Reply {
                client_id,
                status,
                payload,
            } => {
                let mut pending = self.pending_replies.lock().await;
                if let Some(sender) = pending.remove(&(client_id, status.clone())) {
                    let _ = sender.send(payload);
                } else {
                    debug!(client_id, status, "reply with no matching pending forward");
                }
            }
        }
    }

    async fn reply_forward(
        &self,
        client_id: u64,
        status: impl Into<String>,
        response: &Json,
    ) -> Result<(), RoutingError> {
        let bytes = Bytes::from(serde_json::to_vec(response)?);
        self.endpoint.send_forward(client_id, status, bytes).await?;
        Ok(())
    }

    async fn reverse_lock_for(&self, client_id: u64) -> Arc<Mutex<()>> {
        self.reverse_locks
            .lock()
            .await
            .entry(client_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Relays one forwarded call onto `to_client`'s reverse channel and
    /// waits for its `fwd_response:`-wrapped reply, serialized per target
    /// client (§4.7's redesigned per-client reverse lock, see DESIGN.md).
    async fn perform_forward(
        &self,
        to_client: u64,
        status: &str,
        payload: Json,
    ) -> Result<Json, RoutingError> {
        let target_alive = self
            .endpoint
            .client_info(to_client)
            .await
            .is_some_and(|record| record.is_alive());
        if !target_alive {
            debug!(to_client, "forward target missing or lost");
            return Ok(Json::Null);
        }

        let lock = self.reverse_lock_for(to_client).await;
        let _guard = lock.lock().await;

        let expected = response_status(status);
        let (tx, rx) = oneshot::channel();
        self.pending_replies
            .lock()
            .await
            .insert((to_client, expected.clone()), tx);

        let bytes = Bytes::from(serde_json::to_vec(&payload)?);
        if let Err(err) = self.endpoint.send_reverse(to_client, status.to_owned(), bytes).await {
            self.pending_replies.lock().await.remove(&(to_client, expected));
            return Err(err.into());
        }

        match tokio::time::timeout(FORWARD_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            _ => {
                self.pending_replies.lock().await.remove(&(to_client, expected));
                Err(RoutingError::ForwardTimeout(to_client))
            }
        }
    }

    async fn fail_pending_replies_for(&self, client_id: u64) {
        let mut pending = self.pending_replies.lock().await;
        pending.retain(|(id, _), _| *id != client_id);
    }

    async fn handle_routing(&self, client_id: u64, status: &str, payload: Json) -> Json {
        match status {
            s if s == routing_message::GET_APP_INFO => {
                serde_json::to_value(self.app_info(&payload).await).unwrap_or(Json::Null)
            }
            s if s == routing_message::GET_SCHEMA => {
                serde_json::to_value(self.schema_info(client_id).await).unwrap_or(Json::Null)
            }
            s if s == routing_message::SET_SCHEMA => {
                if let Ok(peer) = serde_json::from_value(payload) {
                    self.dispatcher.merge_peer_schema(&peer).await;
                }
                serde_json::to_value(self.schema_info(client_id).await).unwrap_or(Json::Null)
            }
            other => {
                debug!(other, "unrecognized routing verb");
                Json::Null
            }
        }
    }

    async fn app_info(&self, request: &Json) -> ApplicationInfo {
        let with_clients = request
            .get("with_clients")
            .and_then(Json::as_bool)
            .unwrap_or(false);
        let client_ids = self.endpoint.client_ids().await;
        let mut clients = Vec::new();
        if with_clients {
            for &id in &client_ids {
                if let Some(record) = self.endpoint.client_info(id).await {
                    clients.push(AppClientInfo {
                        client_id: id,
                        is_validated: record.is_validated(),
                        is_lost: !record.is_alive(),
                        entry_file: record.client_metadata.entry_file.clone(),
                    });
                }
            }
        }
        ApplicationInfo {
            is_alive: true,
            is_ready: self.is_ready(),
            call_count: self.call_count(),
            types: self.dispatcher.type_count().await,
            services: self.dispatcher.service_count().await,
            metadata: self.endpoint.metadata().await,
            client_count: client_ids.len(),
            clients,
            client_ids,
            entry_file: self.entry_file.clone(),
        }
    }

    async fn schema_info(&self, active_client: u64) -> SchemaInfo {
        self.endpoint.update().await;
        let client_ids = self.endpoint.client_ids().await;
        let mut clients = Vec::with_capacity(client_ids.len());
        let main_port = self.local_addr().port();
        for id in client_ids {
            if let Some(record) = self.endpoint.client_info(id).await {
                clients.push(SchemaClientInfo {
                    main_port,
                    client_id: id,
                    is_validated: record.is_validated(),
                    is_lost: !record.is_alive(),
                    entry_file: record.client_metadata.entry_file.clone(),
                    client_metadata: record.client_metadata,
                });
            }
        }
        SchemaInfo {
            snapshot: self.dispatcher.schema_snapshot().await,
            metadata: self.endpoint.metadata().await,
            active_client,
            entry_file: self.entry_file.clone(),
            clients,
            servers: Vec::new(),
        }
    }
}
