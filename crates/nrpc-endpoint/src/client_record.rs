use chrono::{DateTime, Utc};
use nrpc_protocol::PeerIdentity;

use crate::metadata::SocketMetadata;

/// A server's view of one connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Forward channel registered (`AddClient` acknowledged), reverse
    /// channel not yet validated.
    Pending,
    /// Both channels are up and the reverse handshake completed.
    Validated,
    /// Either channel's underlying connection was observed to drop.
    Lost,
}

#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub client_id: u64,
    pub forward_identity: PeerIdentity,
    pub reverse_identity: Option<PeerIdentity>,
    pub client_metadata: SocketMetadata,
    pub connect_time: DateTime<Utc>,
    pub state: ClientState,
}

impl ClientRecord {
    pub fn new(client_id: u64, forward_identity: PeerIdentity, client_metadata: SocketMetadata) -> Self {
        Self {
            client_id,
            forward_identity,
            reverse_identity: None,
            client_metadata,
            connect_time: Utc::now(),
            state: ClientState::Pending,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state != ClientState::Lost
    }

    pub fn is_validated(&self) -> bool {
        self.state == ClientState::Validated
    }
}
