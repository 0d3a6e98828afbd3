#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("transport: {0}")]
    Transport(#[from] nrpc_transport::TransportError),
    #[error("handshake timed out waiting for {0}")]
    HandshakeTimeout(&'static str),
    #[error("unexpected handshake reply: expected {expected}, got status `{got}`")]
    UnexpectedReply { expected: &'static str, got: String },
    #[error("malformed handshake payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("client {0} is not known to this endpoint")]
    UnknownClient(u64),
    #[error("client {0} has been lost")]
    ClientLost(u64),
    #[error("protocol violation on connection: {0}")]
    ProtocolViolation(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}
