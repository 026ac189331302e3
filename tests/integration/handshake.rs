//! Scenario S1: a client opening to a server completes the handshake well
//! inside the epoch budget, and both sides agree on the allocated `conn_id`.

use std::time::{Duration, Instant};

use lsp_core::Params;
use lsp_server::Server;
use lsp_test_support::VirtualNetwork;

#[tokio::test]
async fn client_open_completes_quickly_and_agrees_on_conn_id() {
    let net = VirtualNetwork::new(0.0);
    let server_socket = net.bind();
    let server_addr = server_socket.local_addr().unwrap();
    let params = Params::new(100, 5, 1).unwrap();
    let server = Server::listen_with_socket(server_socket, params);

    let client_socket = net.bind();

    let started = Instant::now();
    let client = lsp_client::Client::open_with_socket(client_socket, server_addr, params)
        .await
        .expect("handshake should complete");
    let elapsed = started.elapsed();

    assert_eq!(client.conn_id().await, 1);
    assert!(elapsed <= Duration::from_millis(200), "handshake took {elapsed:?}, expected <= 200ms");

    drop(server);
}
