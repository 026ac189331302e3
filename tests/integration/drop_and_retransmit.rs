//! Scenario S4: the first Data a client sends is dropped; after one epoch
//! tick it is retransmitted, the server Acks it, and the client's next
//! write proceeds — with no duplicate delivered at the server.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lsp_core::{Datagram, Params};
use lsp_protocol::Message;
use lsp_server::Server;
use lsp_test_support::{VirtualNetwork, VirtualSocket};

/// Wraps a real transport and silently drops the first Data datagram sent
/// through it, passing everything else (including retransmits) along.
struct DropFirstData {
    inner: Arc<VirtualSocket>,
    dropped: AtomicBool,
}

#[async_trait]
impl Datagram for DropFirstData {
    async fn send_to(&self, addr: SocketAddr, buf: &[u8]) -> io::Result<()> {
        if !self.dropped.load(Ordering::SeqCst) {
            if let Ok(msg) = Message::decode(buf) {
                if msg.is_data() {
                    self.dropped.store(true, Ordering::SeqCst);
                    return Ok(());
                }
            }
        }
        self.inner.send_to(addr, buf).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

#[tokio::test]
async fn dropped_data_is_retransmitted_after_one_epoch_and_never_duplicated() {
    let net = VirtualNetwork::new(0.0);
    let server_socket = net.bind();
    let server_addr = server_socket.local_addr().unwrap();
    let params = Params::new(20, 10, 1).unwrap();
    let server = Server::listen_with_socket(server_socket, params);

    let client_socket = Arc::new(DropFirstData {
        inner: net.bind(),
        dropped: AtomicBool::new(false),
    });
    let client = lsp_client::Client::open_with_socket(client_socket, server_addr, params)
        .await
        .expect("handshake should complete");

    client.write(b"x".to_vec()).await.unwrap();
    let (conn_id, payload) = server.read().await.expect("x should survive the drop via retransmission");
    assert_eq!(payload, b"x");

    client.write(b"y".to_vec()).await.unwrap();
    let (second_id, payload) = server.read().await.unwrap();
    assert_eq!(second_id, conn_id);
    assert_eq!(payload, b"y");

    drop(server);
}
