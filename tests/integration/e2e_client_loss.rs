//! S6 — Loss: a validated client is killed; within a couple of poll
//! intervals the server stops listing it and a forwarded call to it
//! resolves to null instead of hanging.

use std::time::Duration;

use serde_json::json;

#[tokio::test]
async fn killed_client_drops_out_of_client_ids_and_forwards_become_no_ops() {
    let server = nrpc_test_utils::start_server(nrpc_test_utils::standard_registry(), vec![])
        .await
        .expect("server bind failed");
    let addr = server.local_addr();

    let survivor = nrpc_test_utils::start_client(
        addr,
        "client-s6-survivor",
        nrpc_test_utils::standard_registry(),
        vec![],
    )
    .await
    .expect("survivor connect failed");

    let victim = nrpc_test_utils::start_client(
        addr,
        "client-s6-victim",
        nrpc_test_utils::standard_registry(),
        vec![nrpc_test_utils::hello_service_binding()],
    )
    .await
    .expect("victim connect failed");
    let victim_id = victim.client_id();

    let before = server.client_ids().await;
    assert!(before.contains(&victim_id));

    victim.close().await;
    drop(victim);

    let after = server.wait_for_change(Duration::from_millis(500), &before).await;
    assert!(!after.contains(&victim_id));

    let response = survivor
        .forward_call(victim_id, "HelloService.Hello", json!({}))
        .await
        .expect("forward call to a lost client should resolve, not error");
    assert_eq!(response, serde_json::Value::Null);
}
