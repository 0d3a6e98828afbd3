//! A bidirectional typed-RPC runtime over a duplex framed TCP transport.
//!
//! This crate is a thin facade over the workspace's member crates, each
//! responsible for one layer:
//!
//! - [`nrpc_protocol`] — the wire envelope (`Frame`), peer identity, status
//!   conventions, and the schema-agnostic [`Value`] type.
//! - [`nrpc_schema`] — type/service descriptors, the typed JSON codec, and
//!   the per-endpoint [`SchemaRegistry`] that reconciles two peers' schemas.
//! - [`nrpc_transport`] — TCP framing and identity-addressed send/recv.
//! - [`nrpc_endpoint`] — the `AddClient`/`ValidateClient` registration
//!   handshake, client-loss detection, and the per-direction request locks.
//! - [`nrpc_routing`] — dispatch tables, `RoutingMessage.*` introspection,
//!   and client-to-client call forwarding.
//!
//! Most applications only need the re-exports below: declare record types
//! with [`RpcRecord`], bind a [`ServerRouter`] or connect a [`ClientRouter`],
//! and register [`ServiceBinding`]s against it.

pub use nrpc_endpoint::{
    ClientEndpoint, ClientEndpointState, ClientEvent, ClientRecord, ClientState, ConfigError,
    EndpointConfig, EndpointError, ServerEndpoint, ServerEvent, SocketMetadata,
};
pub use nrpc_protocol::{
    Frame, FrameDecodeError, FrameDecoder, PeerIdentity, REVERSE_PREFIX, ScalarValue, Value,
    dropped_status, forward_response_status, method_status, response_status, routing_message,
    server_message, split_service_method,
};
pub use nrpc_routing::{
    AppClientInfo, ApplicationInfo, ClientRouter, DispatchFn, RoutingError, SchemaClientInfo,
    SchemaInfo, SchemaServerInfo, ServerRouter, ServiceBinding, ServiceBindingBuilder,
};
pub use nrpc_schema::{
    CodecError, DYNAMIC_OBJECT, FieldDescriptor, FieldType, MethodDescriptor, RpcRecord,
    SchemaFieldEntry, SchemaMethodEntry, SchemaRegistry, SchemaServiceSummary, SchemaSnapshot,
    SchemaTypeSummary, ServiceDescriptor, TypeDescriptor, TypeResolver, decode, default_value,
    encode,
};
pub use nrpc_transport::{ChannelEvent, ConnectChannel, ListenChannel, PeerState, TransportError};
