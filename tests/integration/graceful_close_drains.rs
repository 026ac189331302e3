//! Scenario S6: a client writes a batch of payloads, then closes, while the
//! network drops some datagrams in flight; the server survives throughout.
//! `close()` only returns once every payload has actually been Acked, and
//! every one of them is still readable at the server afterward.

use lsp_core::Params;
use lsp_server::Server;
use lsp_test_support::VirtualNetwork;

#[tokio::test]
async fn close_drains_every_write_despite_dropped_datagrams() {
    let net = VirtualNetwork::new(0.3);
    let server_socket = net.bind();
    let server_addr = server_socket.local_addr().unwrap();
    let params = Params::new(5, 50, 4).unwrap();
    let server = Server::listen_with_socket(server_socket, params);

    let client_socket = net.bind();
    let client = lsp_client::Client::open_with_socket(client_socket, server_addr, params)
        .await
        .expect("handshake should eventually succeed despite drops");

    let expected: Vec<String> = (0..10).map(|i| format!("msg{i}")).collect();
    for payload in &expected {
        client.write(payload.clone().into_bytes()).await.unwrap();
    }
    client.close().await.expect("close should drain once every write is Acked");

    let mut payloads = Vec::new();
    for _ in 0..10 {
        let (_, payload) = server.read().await.unwrap();
        payloads.push(String::from_utf8(payload).unwrap());
    }
    assert_eq!(payloads, expected);

    drop(server);
}
