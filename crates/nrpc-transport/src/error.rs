use nrpc_protocol::{FrameDecodeError, PeerIdentity};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame decode: {0}")]
    Decode(#[from] FrameDecodeError),
    #[error("no connection registered for identity {0:?}")]
    UnknownPeer(PeerIdentity),
    #[error("channel is closed")]
    Closed,
}
