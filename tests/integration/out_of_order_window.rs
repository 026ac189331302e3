//! Scenario S3: with window size 3, Data arrives out of order (seqs 2, 1,
//! 3). Every one is Acked on arrival, but the server's next three reads
//! still deliver payloads 1, 2, 3 in that order.

use lsp_core::{Params, socket};
use lsp_protocol::Message;
use lsp_server::Server;
use lsp_test_support::VirtualNetwork;

#[tokio::test]
async fn out_of_order_arrivals_are_acked_immediately_but_delivered_in_order() {
    let net = VirtualNetwork::new(0.0);
    let server_socket = net.bind();
    let server_addr = server_socket.local_addr().unwrap();
    let params = Params::new(50, 5, 3).unwrap();
    let server = Server::listen_with_socket(server_socket, params);

    let peer = net.bind();
    socket::send(peer.as_ref(), server_addr, &Message::connect()).await;
    let mut buf = vec![0u8; 4096];
    let (len, _) = peer.recv_from(&mut buf).await.unwrap();
    let conn_id = match Message::decode(&buf[..len]).unwrap() {
        Message::Ack { conn_id, seq_num: 0 } => conn_id,
        other => panic!("expected Ack(conn_id, 0), got {other:?}"),
    };

    for seq in [2u32, 1, 3] {
        socket::send(peer.as_ref(), server_addr, &Message::data(conn_id, seq, format!("seq{seq}").into_bytes())).await;
    }

    // Every Data is Acked on arrival, regardless of order.
    let mut acked: Vec<u32> = Vec::new();
    for _ in 0..3 {
        let (len, _) = peer.recv_from(&mut buf).await.unwrap();
        match Message::decode(&buf[..len]).unwrap() {
            Message::Ack { seq_num, .. } => acked.push(seq_num),
            other => panic!("expected Ack, got {other:?}"),
        }
    }
    acked.sort_unstable();
    assert_eq!(acked, vec![1, 2, 3]);

    for expected_seq in [1u32, 2, 3] {
        let (id, payload) = server.read().await.unwrap();
        assert_eq!(id, conn_id);
        assert_eq!(payload, format!("seq{expected_seq}").into_bytes());
    }

    drop(server);
}
