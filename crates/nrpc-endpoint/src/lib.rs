//! Client/server registration, validation and loss detection on top of
//! `nrpc-transport`. Owns the `AddClient`/`ClientAdded` and
//! `ValidateClient`/`ClientValidated` handshakes so a routing layer built on
//! top only ever sees application-relevant events.

mod client;
mod client_record;
mod config;
mod error;
mod metadata;
mod server;

pub use client::{ClientEndpoint, ClientEndpointState, ClientEvent};
pub use client_record::{ClientRecord, ClientState};
pub use config::EndpointConfig;
pub use error::{ConfigError, EndpointError};
pub use metadata::SocketMetadata;
pub use server::{ServerEndpoint, ServerEvent};
