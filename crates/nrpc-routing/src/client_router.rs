//! `ClientRouter`: wraps a `ClientEndpoint` with the same dispatch table and
//! schema registry machinery as `ServerRouter`, plus the connect-time
//! reconciliation sequence (`_sync_with_server`/`_sync_with_client` in
//! `original_source/nrpc_py/routing_socket.py`): pull the server's schema,
//! merge it, then push this side's own schema and merge what comes back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde_json::Value as Json;
use tracing::{debug, error, info};

use nrpc_protocol::{PeerIdentity, routing_message};
use nrpc_schema::SchemaRegistry;

use nrpc_endpoint::{ClientEndpoint, ClientEvent, EndpointConfig, SocketMetadata};

use crate::binding::ServiceBinding;
use crate::dispatch::Dispatcher;
use crate::error::RoutingError;
use crate::info::{ApplicationInfo, SchemaInfo, SchemaServerInfo};

pub struct ClientRouter {
    endpoint: ClientEndpoint,
    dispatcher: Dispatcher,
    entry_file: String,
    is_ready: AtomicBool,
    call_count: AtomicU64,
}

impl ClientRouter {
    pub async fn connect(
        addr: impl tokio::net::ToSocketAddrs + Clone,
        identity: PeerIdentity,
        config: EndpointConfig,
        metadata: SocketMetadata,
        registry: SchemaRegistry,
        services: Vec<ServiceBinding>,
        sync: bool,
    ) -> Result<Arc<Self>, RoutingError> {
        let entry_file = metadata.entry_file.clone();
        let endpoint = ClientEndpoint::connect(addr, identity, config, metadata).await?;
        let router = Arc::new(Self {
            endpoint,
            dispatcher: Dispatcher::new(registry, services),
            entry_file,
            is_ready: AtomicBool::new(false),
            call_count: AtomicU64::new(0),
        });

        if sync {
            router.sync_with_server().await?;
            router.sync_with_client().await?;
        }
        router.is_ready.store(true, Ordering::Relaxed);

        let dispatch_loop = router.clone();
        tokio::spawn(async move { dispatch_loop.run().await });

        Ok(router)
    }

    pub fn client_id(&self) -> u64 {
        self.endpoint.client_id()
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed) + self.dispatcher.call_count()
    }

    /// This endpoint's current schema, post-reconciliation with the server.
    pub async fn schema_snapshot(&self) -> nrpc_schema::SchemaSnapshot {
        self.dispatcher.schema_snapshot().await
    }

    pub async fn is_lost(&self) -> bool {
        self.endpoint.update().await;
        !self.endpoint.is_ready().await
    }

    pub async fn wait(&self) {
        self.endpoint.wait().await;
    }

    pub async fn close(&self) {
        self.endpoint.close().await;
    }

    /// Places an untyped `Service.Method` call and returns the raw JSON
    /// response.
    pub async fn server_call(
        &self,
        service: &str,
        method: &str,
        payload: Json,
    ) -> Result<Json, RoutingError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.endpoint.call(service, method, payload).await?)
    }

    /// Calls `method_name` on a different client (`to_client`), tunneled
    /// through the server per §4.7. `method_name` is `Service.Method`.
    pub async fn forward_call(
        &self,
        to_client: u64,
        method_name: &str,
        payload: Json,
    ) -> Result<Json, RoutingError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .endpoint
            .call_forward(to_client, method_name, payload)
            .await?)
    }

    async fn sync_with_server(&self) -> Result<(), RoutingError> {
        let response = self
            .endpoint
            .call_raw(routing_message::GET_SCHEMA, Json::Null)
            .await?;
        let peer: SchemaInfo = serde_json::from_value(response)?;
        self.dispatcher.find_missing_methods(&peer.snapshot.methods).await;
        self.dispatcher.merge_peer_schema(&peer.snapshot).await;
        Ok(())
    }

    async fn sync_with_client(&self) -> Result<(), RoutingError> {
        let own_schema = self.schema_info(self.client_id()).await;
        let response = self
            .endpoint
            .call_raw(
                routing_message::SET_SCHEMA,
                serde_json::to_value(own_schema)?,
            )
            .await?;
        let peer: SchemaInfo = serde_json::from_value(response)?;
        self.dispatcher.merge_peer_schema(&peer.snapshot).await;
        Ok(())
    }

    async fn run(self: Arc<Self>) {
        loop {
            match self.endpoint.next_event().await {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => {}
                Err(err) => error!(%err, "client router poll failed"),
            }
        }
    }

    async fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::Call {
                service,
                method,
                payload,
            } => {
                let response = self.dispatcher.invoke(&service, &method, payload).await;
                if let Err(err) = self.endpoint.respond(&service, &method, response).await {
                    error!(%err, "failed to send call response");
                }
            }
            ClientEvent::Routing { status, payload } => {
                let response = self.handle_routing(&status, payload).await;
                if let Err(err) = self.endpoint.respond_raw(&status, response).await {
                    error!(%err, "failed to send routing response");
                }
            }
        }
    }

    async fn handle_routing(&self, status: &str, payload: Json) -> Json {
        match status {
            s if s == routing_message::GET_APP_INFO => {
                serde_json::to_value(self.app_info().await).unwrap_or(Json::Null)
            }
            s if s == routing_message::GET_SCHEMA => {
                serde_json::to_value(self.schema_info(self.client_id()).await).unwrap_or(Json::Null)
            }
            s if s == routing_message::SET_SCHEMA => {
                // The original asserts this never happens: only the server
                // answers SetSchema. Log and answer with the current schema
                // rather than panicking the dispatch loop over a misbehaving
                // peer.
                debug!("unexpected SetSchema on a client endpoint");
                let _ = payload;
                serde_json::to_value(self.schema_info(self.client_id()).await).unwrap_or(Json::Null)
            }
            other => {
                debug!(other, "unrecognized routing verb");
                Json::Null
            }
        }
    }

    async fn app_info(&self) -> ApplicationInfo {
        ApplicationInfo {
            is_alive: true,
            is_ready: self.is_ready(),
            call_count: self.call_count(),
            types: self.dispatcher.type_count().await,
            services: self.dispatcher.service_count().await,
            metadata: self.endpoint.server_metadata().await,
            client_count: 0,
            clients: Vec::new(),
            client_ids: Vec::new(),
            entry_file: self.entry_file.clone(),
        }
    }

    async fn schema_info(&self, active_client: u64) -> SchemaInfo {
        let server_metadata = self.endpoint.server_metadata().await;
        SchemaInfo {
            snapshot: self.dispatcher.schema_snapshot().await,
            metadata: server_metadata.clone(),
            active_client,
            entry_file: self.entry_file.clone(),
            clients: Vec::new(),
            servers: vec![SchemaServerInfo {
                port: server_metadata.main_port,
                entry_file: server_metadata.entry_file.clone(),
                server_metadata,
            }],
        }
    }
}

