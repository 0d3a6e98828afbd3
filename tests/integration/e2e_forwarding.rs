//! S5 — Forwarding: client A calls into client B through the server.
//! The server relays A's call onto B's reverse channel, waits for B's
//! reply, and returns it to A wrapped as `fwd_response:<method>`.

use serde_json::json;

#[tokio::test]
async fn forward_call_reaches_the_target_client_and_returns_its_response() {
    let server = nrpc_test_utils::start_server(nrpc_test_utils::standard_registry(), vec![])
        .await
        .expect("server bind failed");
    let addr = server.local_addr();

    let client_a = nrpc_test_utils::start_client(
        addr,
        "client-a",
        nrpc_test_utils::standard_registry(),
        vec![],
    )
    .await
    .expect("client A connect failed");

    let client_b = nrpc_test_utils::start_client(
        addr,
        "client-b",
        nrpc_test_utils::standard_registry(),
        vec![nrpc_test_utils::hello_service_binding()],
    )
    .await
    .expect("client B connect failed");

    let request = json!({"summary": "t1", "values": [1, 2, 3], "echos": []});
    let response = client_a
        .forward_call(client_b.client_id(), "HelloService.Hello", request)
        .await
        .expect("forward call failed");

    assert_eq!(
        response,
        json!({"summary": "test=1", "values": [2, 3, 4], "echos": []})
    );
}

#[tokio::test]
async fn forward_call_to_missing_client_returns_null() {
    let server = nrpc_test_utils::start_server(nrpc_test_utils::standard_registry(), vec![])
        .await
        .expect("server bind failed");
    let addr = server.local_addr();

    let client_a = nrpc_test_utils::start_client(
        addr,
        "client-a-alone",
        nrpc_test_utils::standard_registry(),
        vec![],
    )
    .await
    .expect("client A connect failed");

    let response = client_a
        .forward_call(999, "HelloService.Hello", json!({}))
        .await
        .expect("forward call failed");

    assert_eq!(response, serde_json::Value::Null);
}
