//! Shared fixtures for `nrpc`'s integration tests: `ChildInfo`/`ParentInfo`
//! and a bound `HelloService`, matching §8's S1/S2 scenarios, plus thin
//! helpers for standing up a `ServerRouter`/`ClientRouter` pair on an
//! ephemeral loopback port.

mod fixtures;
mod harness;
mod registry;

pub use fixtures::{ChildInfo, ParentInfo, hello_service_binding, hello_service_descriptor};
pub use harness::{start_client, start_client_unsynced, start_server};
pub use registry::standard_registry;
