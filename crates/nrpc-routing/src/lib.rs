//! Dispatch, schema reconciliation, and client-to-client forwarding on top
//! of `nrpc-endpoint`.
//!
//! `ServerRouter`/`ClientRouter` each wrap an endpoint with a
//! `SchemaRegistry` and an explicit dispatch table (`ServiceBinding`),
//! answer the `RoutingMessage.*` introspection verbs, and (server side)
//! relay `ServerMessage.ForwardCall` between two clients.

mod binding;
mod client_router;
mod dispatch;
mod error;
mod info;
mod server_router;

pub use binding::{DispatchFn, ServiceBinding, ServiceBindingBuilder};
pub use client_router::ClientRouter;
pub use error::RoutingError;
pub use info::{AppClientInfo, ApplicationInfo, SchemaClientInfo, SchemaInfo, SchemaServerInfo};
pub use server_router::ServerRouter;
