//! Type descriptors, typed codec, and the schema registry.
//!
//! Builds on `nrpc-protocol`'s wire envelope and value model to add the
//! layer the original implementation calls "schema": named record/service
//! descriptors, a codec that checks JSON payloads against them, and a
//! per-endpoint registry that reconciles what two endpoints each know.

mod codec;
mod descriptor;
mod registry;

pub use codec::{CodecError, TypeResolver, decode, default_value, encode};
pub use descriptor::{
    DYNAMIC_OBJECT, FieldDescriptor, FieldType, MethodDescriptor, RpcRecord, ServiceDescriptor,
    TypeDescriptor,
};
pub use registry::{
    SchemaFieldEntry, SchemaMethodEntry, SchemaRegistry, SchemaServiceSummary, SchemaSnapshot,
    SchemaTypeSummary,
};
