#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("endpoint: {0}")]
    Endpoint(#[from] nrpc_endpoint::EndpointError),
    #[error("codec: {0}")]
    Codec(#[from] nrpc_schema::CodecError),
    #[error("malformed routing payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("forwarding call to client {0} timed out")]
    ForwardTimeout(u64),
    #[error("client {0} is not known to this router")]
    UnknownClient(u64),
}
