//! Scenario S2: with window size 1, writes "a", "b", "c" arrive at the
//! server's reads in exactly that order.

use lsp_core::Params;
use lsp_server::Server;
use lsp_test_support::VirtualNetwork;

#[tokio::test]
async fn writes_with_window_one_are_read_back_in_order() {
    let net = VirtualNetwork::new(0.0);
    let server_socket = net.bind();
    let server_addr = server_socket.local_addr().unwrap();
    let params = Params::new(20, 5, 1).unwrap();
    let server = Server::listen_with_socket(server_socket, params);

    let client_socket = net.bind();
    let client = lsp_client::Client::open_with_socket(client_socket, server_addr, params)
        .await
        .expect("handshake should complete");

    for payload in ["a", "b", "c"] {
        client.write(payload.as_bytes().to_vec()).await.unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..3 {
        let (_, payload) = server.read().await.unwrap();
        received.push(String::from_utf8(payload).unwrap());
    }
    assert_eq!(received, vec!["a", "b", "c"]);

    drop(server);
}
