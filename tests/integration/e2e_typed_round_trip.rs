//! S1 — Typed round-trip: server binds a `HelloService`, client calls
//! `Hello(ParentInfo)` and gets back the declared transform.

use serde_json::json;

#[tokio::test]
async fn hello_call_transforms_parent_info() {
    let server = nrpc_test_utils::start_server(
        nrpc_test_utils::standard_registry(),
        vec![nrpc_test_utils::hello_service_binding()],
    )
    .await
    .expect("server bind failed");
    let addr = server.local_addr();

    let client = nrpc_test_utils::start_client(
        addr,
        "client-s1",
        nrpc_test_utils::standard_registry(),
        vec![],
    )
    .await
    .expect("client connect failed");

    let request = json!({
        "summary": "t1",
        "values": [1, 2, 3],
        "echos": [{"name": "c", "value": 555}],
    });
    let response = client
        .server_call("HelloService", "Hello", request)
        .await
        .expect("call failed");

    assert_eq!(
        response,
        json!({
            "summary": "test=1",
            "values": [2, 3, 4],
            "echos": [{"name": "c", "value": 555}],
        })
    );
}
