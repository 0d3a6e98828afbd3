//! Ephemeral-port server/client pairs for integration tests.
//!
//! Mirrors `test_routing.py`'s `TestApplication.start`: bind, connect,
//! exchange a call, then inspect `_get_app_info`/`_get_schema` — just with
//! real TCP sockets and `tokio::test` instead of a manual harness script.

use std::net::SocketAddr;
use std::sync::Arc;

use nrpc_endpoint::{EndpointConfig, SocketMetadata};
use nrpc_protocol::PeerIdentity;
use nrpc_routing::{ClientRouter, RoutingError, ServerRouter, ServiceBinding};
use nrpc_schema::SchemaRegistry;

/// Binds a `ServerRouter` on an OS-assigned loopback port.
pub async fn start_server(
    registry: SchemaRegistry,
    services: Vec<ServiceBinding>,
) -> Result<Arc<ServerRouter>, RoutingError> {
    ServerRouter::bind(
        "127.0.0.1:0",
        EndpointConfig::default(),
        "test-server.rs",
        registry,
        services,
    )
    .await
}

/// Connects a `ClientRouter` to `addr`, running connect-time schema
/// reconciliation.
pub async fn start_client(
    addr: SocketAddr,
    identity: &str,
    registry: SchemaRegistry,
    services: Vec<ServiceBinding>,
) -> Result<Arc<ClientRouter>, RoutingError> {
    let metadata = SocketMetadata::local("test-client.rs", "127.0.0.1", 0, 0);
    ClientRouter::connect(
        addr,
        PeerIdentity::from(identity),
        EndpointConfig::default(),
        metadata,
        registry,
        services,
        true,
    )
    .await
}

/// Same as [`start_client`] but skips connect-time reconciliation, for
/// tests that want to call `sync_with_server`/`sync_with_client`-adjacent
/// behavior themselves or observe a pre-reconciliation schema.
pub async fn start_client_unsynced(
    addr: SocketAddr,
    identity: &str,
    registry: SchemaRegistry,
    services: Vec<ServiceBinding>,
) -> Result<Arc<ClientRouter>, RoutingError> {
    let metadata = SocketMetadata::local("test-client.rs", "127.0.0.1", 0, 0);
    ClientRouter::connect(
        addr,
        PeerIdentity::from(identity),
        EndpointConfig::default(),
        metadata,
        registry,
        services,
        false,
    )
    .await
}
