//! S2 — Dynamic-object method: `Two(dict) -> dict` echoes its payload
//! verbatim, with no schema checking against its contents.

use serde_json::json;

#[tokio::test]
async fn two_echoes_dynamic_payload_verbatim() {
    let server = nrpc_test_utils::start_server(
        nrpc_test_utils::standard_registry(),
        vec![nrpc_test_utils::hello_service_binding()],
    )
    .await
    .expect("server bind failed");
    let addr = server.local_addr();

    let client = nrpc_test_utils::start_client(
        addr,
        "client-s2",
        nrpc_test_utils::standard_registry(),
        vec![],
    )
    .await
    .expect("client connect failed");

    let request = json!({"x": 123, "y": true});
    let response = client
        .server_call("HelloService", "Two", request.clone())
        .await
        .expect("call failed");

    assert_eq!(response, request);
}
