//! `GetAppInfo`/`GetSchema` response shapes.
//!
//! Mirrors `original_source/nrpc_py/common_base.py`'s `ApplicationInfo`/
//! `SchemaInfo` TypedDicts field-for-field (minus the `socket_type`/
//! `protocol_type`/`format` enums, which are always TCP/JSON in this port
//! and add nothing — see DESIGN.md).

use serde::{Deserialize, Serialize};

use nrpc_endpoint::SocketMetadata;
use nrpc_schema::SchemaSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppClientInfo {
    pub client_id: u64,
    pub is_validated: bool,
    pub is_lost: bool,
    pub entry_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub is_alive: bool,
    pub is_ready: bool,
    pub call_count: u64,
    pub types: usize,
    pub services: usize,
    pub metadata: SocketMetadata,
    pub client_count: usize,
    pub clients: Vec<AppClientInfo>,
    pub client_ids: Vec<u64>,
    pub entry_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaClientInfo {
    pub main_port: u16,
    pub client_id: u64,
    pub is_validated: bool,
    pub is_lost: bool,
    pub entry_file: String,
    pub client_metadata: SocketMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaServerInfo {
    pub port: u16,
    pub entry_file: String,
    pub server_metadata: SocketMetadata,
}

/// Wire shape of `GetSchema`/`SetSchema`: the flat type/service/field/method
/// snapshot (flattened so it round-trips through [`nrpc_schema::SchemaRegistry::merge_peer`]
/// unmodified) plus the socket-level context the original's `SchemaInfo` adds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    #[serde(flatten)]
    pub snapshot: SchemaSnapshot,
    pub metadata: SocketMetadata,
    pub active_client: u64,
    pub entry_file: String,
    #[serde(default)]
    pub clients: Vec<SchemaClientInfo>,
    #[serde(default)]
    pub servers: Vec<SchemaServerInfo>,
}
