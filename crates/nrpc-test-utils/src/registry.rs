//! A `SchemaRegistry` pre-populated with `ChildInfo`/`ParentInfo`/
//! `HelloService` — the starting point for S1/S2-shaped tests. Schema
//! divergence tests (S3/S4) build their own registries directly from
//! `nrpc_schema`'s descriptor types instead, since the whole point there is
//! to diverge from this one.

use nrpc_schema::{RpcRecord, SchemaRegistry};

use crate::fixtures::{ChildInfo, ParentInfo, hello_service_descriptor};

pub fn standard_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.declare_type(ChildInfo::type_descriptor());
    registry.declare_type(ParentInfo::type_descriptor());
    registry.declare_service(hello_service_descriptor());
    registry
}
