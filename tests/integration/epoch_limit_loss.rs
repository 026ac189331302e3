//! Scenario S5: the server goes away mid-session. After `epoch_millis *
//! epoch_limit` of silence, the client's pending read and any subsequent
//! write report `ConnectionLost`.

use lsp_core::{LspError, Params};
use lsp_server::Server;
use lsp_test_support::VirtualNetwork;

#[tokio::test]
async fn silence_past_the_epoch_limit_declares_the_connection_lost() {
    let net = VirtualNetwork::new(0.0);
    let server_socket = net.bind();
    let server_addr = server_socket.local_addr().unwrap();
    let params = Params::new(10, 5, 1).unwrap();
    let server = Server::listen_with_socket(server_socket, params);

    let client_socket = net.bind();
    let client = lsp_client::Client::open_with_socket(client_socket, server_addr, params)
        .await
        .expect("handshake should complete");

    drop(server);

    assert_eq!(client.read().await, Err(LspError::ConnectionLost));
    assert_eq!(client.write(b"after-death".to_vec()).await, Err(LspError::ConnectionLost));
}
