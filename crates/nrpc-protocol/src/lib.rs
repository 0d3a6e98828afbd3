//! Wire envelope and value model shared by the nrpc runtime crates.
//!
//! This crate has no knowledge of schemas, endpoints, or dispatch — it
//! defines only the three-frame wire format (identity | status | payload),
//! the opaque peer identity type, the status-string conventions, and the
//! `Value` variant the typed codec (in `nrpc-schema`) encodes to/from JSON.

mod frame;
mod identity;
mod status;
mod value;

pub use frame::{Frame, FrameDecodeError, FrameDecoder, MAX_FRAME_LEN};
pub use identity::{PeerIdentity, REVERSE_PREFIX};
pub use status::{
    dropped_status, forward_response_status, method_status, response_status,
    routing_message, server_message, split_service_method,
};
pub use value::{ScalarValue, Value};
