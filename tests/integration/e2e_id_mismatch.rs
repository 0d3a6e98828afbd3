//! S4 — Id mismatch: client and server declare `ChildInfo.value` under
//! different numeric ids. Reconciliation annotates the field on both sides
//! without aborting the connection.

use nrpc::{FieldDescriptor, SchemaRegistry, ServiceDescriptor, TypeDescriptor};

fn child_info_with_value_id(id: i64) -> TypeDescriptor {
    TypeDescriptor::new("ChildInfo")
        .with_field(FieldDescriptor::new("name", "str", 1))
        .with_field(FieldDescriptor::new("value", "int", id))
}

fn registry_with(type_descriptor: TypeDescriptor) -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.declare_type(type_descriptor);
    registry.declare_service(ServiceDescriptor::new("HelloService"));
    registry
}

#[tokio::test]
async fn id_mismatch_is_annotated_on_both_sides() {
    let server = nrpc_test_utils::start_server(registry_with(child_info_with_value_id(99)), vec![])
        .await
        .expect("server bind failed");
    let addr = server.local_addr();

    let client = nrpc_test_utils::start_client(
        addr,
        "client-s4",
        registry_with(child_info_with_value_id(2)),
        vec![],
    )
    .await
    .expect("client connect failed");

    let field_errors = |snapshot: &nrpc::SchemaSnapshot| -> String {
        snapshot
            .fields
            .iter()
            .find(|f| f.type_name == "ChildInfo" && f.field_name == "value")
            .map(|f| f.field_errors.clone())
            .unwrap_or_default()
    };

    let client_errors = field_errors(&client.schema_snapshot().await);
    let server_errors = field_errors(&server.schema_snapshot().await);
    assert!(client_errors.contains("numbering mismatch"), "{client_errors}");
    assert!(server_errors.contains("numbering mismatch"), "{server_errors}");

    // The connection itself survives the disagreement: the endpoint is
    // still reachable (a routing-level introspection call still succeeds).
    assert!(client.is_ready());
}
