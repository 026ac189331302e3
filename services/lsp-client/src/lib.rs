//! The LSP client: a single outbound connection to one server, driven by a
//! single-threaded event loop that serializes user calls against inbound
//! datagrams and epoch ticks (spec §4.4, §5, §9).

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use lsp_core::connection::{AckOutcome, ConnectionState, DataOutcome, EpochOutcome, WriteOutcome};
use lsp_core::{epoch, socket, Datagram, LspError, Params, UdpTransport};
use lsp_protocol::Message;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

enum ClientRequest {
    Read(oneshot::Sender<Result<Vec<u8>, LspError>>),
    Write(Vec<u8>, oneshot::Sender<Result<(), LspError>>),
    Close(oneshot::Sender<Result<(), LspError>>),
    ConnId(oneshot::Sender<u32>),
}

/// A handle to one open LSP connection. Dropping it tears down the
/// background tasks (event loop, receive loop, epoch clock).
pub struct Client {
    requests: mpsc::UnboundedSender<ClientRequest>,
    event_loop: JoinHandle<()>,
    recv_loop: JoinHandle<()>,
    epoch_handle: JoinHandle<()>,
    epoch_cancel: Option<oneshot::Sender<()>>,
}

impl Client {
    /// Opens a connection to `hostport` (`host:port`). Blocks until the
    /// handshake Ack arrives or `epoch_limit` consecutive silent ticks
    /// elapse, in which case `ConnectionFailed` is returned.
    pub async fn open(hostport: &str, params: Params) -> Result<Self, LspError> {
        let remote_addr = resolve(hostport).await?;
        let local_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        let socket = UdpTransport::bind(local_addr)
            .await
            .map_err(|_| LspError::ConnectionFailed)?;
        Self::open_with_socket(Arc::new(socket), remote_addr, params).await
    }

    /// Test seam: opens a connection over an arbitrary [`Datagram`]
    /// transport (e.g. `lsp-test-support`'s in-memory network) instead of a
    /// real UDP socket.
    pub async fn open_with_socket(
        socket: Arc<dyn Datagram>,
        remote_addr: SocketAddr,
        params: Params,
    ) -> Result<Self, LspError> {
        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let recv_loop = tokio::spawn(socket::recv_loop(socket.clone(), net_tx));

        let (epoch_tx, epoch_rx) = mpsc::unbounded_channel();
        let (epoch_handle, epoch_cancel) =
            epoch::spawn(Duration::from_millis(params.epoch_millis), epoch_tx);

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (open_tx, open_rx) = oneshot::channel();

        let event_loop = tokio::spawn(run_event_loop(
            socket,
            remote_addr,
            params,
            requests_rx,
            net_rx,
            epoch_rx,
            open_tx,
        ));

        match open_rx.await {
            Ok(result) => result.map(|_conn_id| Client {
                requests: requests_tx,
                event_loop,
                recv_loop,
                epoch_handle,
                epoch_cancel: Some(epoch_cancel),
            }),
            Err(_) => Err(LspError::ConnectionFailed),
        }
    }

    pub async fn read(&self) -> Result<Vec<u8>, LspError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(ClientRequest::Read(tx))
            .map_err(|_| LspError::Closed)?;
        rx.await.unwrap_or(Err(LspError::Closed))
    }

    pub async fn write(&self, payload: Vec<u8>) -> Result<(), LspError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(ClientRequest::Write(payload, tx))
            .map_err(|_| LspError::Closed)?;
        rx.await.unwrap_or(Err(LspError::Closed))
    }

    pub async fn close(&self) -> Result<(), LspError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(ClientRequest::Close(tx))
            .map_err(|_| LspError::Closed)?;
        rx.await.unwrap_or(Err(LspError::Closed))
    }

    pub async fn conn_id(&self) -> u32 {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(ClientRequest::ConnId(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(cancel) = self.epoch_cancel.take() {
            let _ = cancel.send(());
        }
        self.event_loop.abort();
        self.recv_loop.abort();
        self.epoch_handle.abort();
    }
}

async fn resolve(hostport: &str) -> Result<SocketAddr, LspError> {
    tokio::net::lookup_host(hostport)
        .await
        .map_err(|_| LspError::ConnectionFailed)?
        .next()
        .ok_or(LspError::ConnectionFailed)
}

#[allow(clippy::too_many_arguments)]
async fn run_event_loop(
    socket: Arc<dyn Datagram>,
    remote_addr: SocketAddr,
    params: Params,
    mut requests: mpsc::UnboundedReceiver<ClientRequest>,
    mut net_rx: mpsc::UnboundedReceiver<(SocketAddr, Message)>,
    mut epoch_rx: mpsc::UnboundedReceiver<()>,
    open_reply: oneshot::Sender<Result<u32, LspError>>,
) {
    let mut conn = ConnectionState::new_client(remote_addr, params.window_size, 0);
    let mut current_epoch: u64 = 0;
    let mut open_reply = Some(open_reply);
    let mut deferred_reads: VecDeque<oneshot::Sender<Result<Vec<u8>, LspError>>> = VecDeque::new();
    let mut deferred_closes: VecDeque<oneshot::Sender<Result<(), LspError>>> = VecDeque::new();
    let mut closed = false;

    for msg in conn.pending_initial_sends() {
        socket::send(socket.as_ref(), remote_addr, &msg).await;
    }

    loop {
        tokio::select! {
            biased;
            maybe = requests.recv() => {
                match maybe {
                    None => break,
                    Some(req) => handle_request(&socket, remote_addr, &mut conn, req, &mut closed, &mut deferred_reads, &mut deferred_closes).await,
                }
            }
            maybe = net_rx.recv() => {
                match maybe {
                    None => {}
                    Some((addr, msg)) if addr == remote_addr => {
                        handle_network(&socket, remote_addr, &mut conn, current_epoch, msg, &mut open_reply).await;
                    }
                    Some(_) => {}
                }
            }
            maybe = epoch_rx.recv() => {
                if maybe.is_some() {
                    current_epoch += 1;
                    let outcome = conn.epoch_tick(current_epoch, params.epoch_limit);
                    handle_epoch_outcome(&socket, remote_addr, outcome, &mut open_reply).await;
                }
            }
        }

        resolve_deferred(&mut conn, &mut deferred_reads, &mut deferred_closes, &mut closed);
    }

    debug!(conn_id = conn.conn_id, "client event loop exiting");
}

async fn handle_request(
    socket: &Arc<dyn Datagram>,
    remote_addr: SocketAddr,
    conn: &mut ConnectionState,
    req: ClientRequest,
    closed: &mut bool,
    deferred_reads: &mut VecDeque<oneshot::Sender<Result<Vec<u8>, LspError>>>,
    deferred_closes: &mut VecDeque<oneshot::Sender<Result<(), LspError>>>,
) {
    match req {
        ClientRequest::Read(reply) => {
            if let Some(payload) = conn.try_deliver() {
                let _ = reply.send(Ok(payload));
            } else if conn.is_lost() {
                let _ = reply.send(Err(LspError::ConnectionLost));
            } else if *closed {
                let _ = reply.send(Err(LspError::Closed));
            } else {
                deferred_reads.push_back(reply);
            }
        }
        ClientRequest::Write(payload, reply) => {
            if *closed {
                let _ = reply.send(Err(LspError::Closed));
            } else if conn.is_lost() {
                let _ = reply.send(Err(LspError::ConnectionLost));
            } else {
                if let WriteOutcome::Send(msg) = conn.write(payload) {
                    socket::send(socket.as_ref(), remote_addr, &msg).await;
                }
                let _ = reply.send(Ok(()));
            }
        }
        ClientRequest::Close(reply) => {
            if *closed {
                let _ = reply.send(Ok(()));
            } else {
                conn.request_close();
                if conn.is_drained() {
                    *closed = true;
                    let _ = reply.send(Ok(()));
                } else if conn.is_lost() {
                    let _ = reply.send(Err(LspError::ConnectionLost));
                } else {
                    deferred_closes.push_back(reply);
                }
            }
        }
        ClientRequest::ConnId(reply) => {
            let _ = reply.send(conn.conn_id);
        }
    }
}

async fn handle_network(
    socket: &Arc<dyn Datagram>,
    remote_addr: SocketAddr,
    conn: &mut ConnectionState,
    current_epoch: u64,
    msg: Message,
    open_reply: &mut Option<oneshot::Sender<Result<u32, LspError>>>,
) {
    match msg {
        Message::Ack { conn_id, seq_num } => {
            let AckOutcome {
                newly_established,
                to_send,
            } = conn.receive_ack(current_epoch, seq_num);
            if newly_established {
                conn.set_conn_id(conn_id);
                if let Some(reply) = open_reply.take() {
                    let _ = reply.send(Ok(conn_id));
                }
            }
            for m in &to_send {
                socket::send(socket.as_ref(), remote_addr, m).await;
            }
        }
        Message::Data { seq_num, payload, .. } => {
            let DataOutcome { ack_to_send, .. } = conn.receive_data(current_epoch, seq_num, payload);
            socket::send(socket.as_ref(), remote_addr, &ack_to_send).await;
        }
        Message::Connect => {
            warn!("client received unexpected Connect, ignoring");
        }
    }
}

async fn handle_epoch_outcome(
    socket: &Arc<dyn Datagram>,
    remote_addr: SocketAddr,
    outcome: EpochOutcome,
    open_reply: &mut Option<oneshot::Sender<Result<u32, LspError>>>,
) {
    if outcome.newly_lost {
        if let Some(reply) = open_reply.take() {
            let _ = reply.send(Err(LspError::ConnectionFailed));
        }
        return;
    }
    for m in &outcome.retransmits {
        socket::send(socket.as_ref(), remote_addr, m).await;
    }
}

fn resolve_deferred(
    conn: &mut ConnectionState,
    deferred_reads: &mut VecDeque<oneshot::Sender<Result<Vec<u8>, LspError>>>,
    deferred_closes: &mut VecDeque<oneshot::Sender<Result<(), LspError>>>,
    closed: &mut bool,
) {
    while conn.has_deliverable() {
        let Some(reply) = deferred_reads.pop_front() else {
            break;
        };
        if let Some(payload) = conn.try_deliver() {
            let _ = reply.send(Ok(payload));
        }
    }
    if conn.is_lost() {
        while let Some(reply) = deferred_reads.pop_front() {
            let _ = reply.send(Err(LspError::ConnectionLost));
        }
    }

    if conn.is_drained() && conn.close_requested() {
        *closed = true;
        while let Some(reply) = deferred_closes.pop_front() {
            let _ = reply.send(Ok(()));
        }
    } else if conn.is_lost() {
        while let Some(reply) = deferred_closes.pop_front() {
            let _ = reply.send(Err(LspError::ConnectionLost));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_test_support::VirtualNetwork;

    fn fast_params() -> Params {
        Params::new(10, 5, 2).unwrap()
    }

    #[tokio::test]
    async fn open_completes_once_peer_acks_the_handshake() {
        let net = VirtualNetwork::new(0.0);
        let client_socket = net.bind();
        let peer_socket = net.bind();
        let peer_addr = peer_socket.local_addr().unwrap();

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let (len, from) = peer_socket.recv_from(&mut buf).await.unwrap();
            let msg = Message::decode(&buf[..len]).unwrap();
            assert!(msg.is_connect());
            socket::send(peer_socket.as_ref(), from, &Message::ack(1, 0)).await;
        });

        let client = Client::open_with_socket(client_socket, peer_addr, fast_params())
            .await
            .expect("handshake should complete");
        assert_eq!(client.conn_id().await, 1);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn open_fails_with_connection_failed_when_peer_never_answers() {
        let net = VirtualNetwork::new(0.0);
        let client_socket = net.bind();
        let unreachable = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 65000);

        let result = Client::open_with_socket(client_socket, unreachable, fast_params()).await;
        assert_eq!(result.err(), Some(LspError::ConnectionFailed));
    }

    #[tokio::test]
    async fn write_then_close_drains_once_peer_acks_every_data() {
        let net = VirtualNetwork::new(0.0);
        let client_socket = net.bind();
        let peer_socket = net.bind();
        let peer_addr = peer_socket.local_addr().unwrap();

        let peer = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let (len, from) = peer_socket.recv_from(&mut buf).await.unwrap();
                match Message::decode(&buf[..len]).unwrap() {
                    Message::Connect => {
                        socket::send(peer_socket.as_ref(), from, &Message::ack(1, 0)).await;
                    }
                    Message::Data { seq_num, .. } => {
                        socket::send(peer_socket.as_ref(), from, &Message::ack(1, seq_num)).await;
                        if seq_num == 1 {
                            return;
                        }
                    }
                    Message::Ack { .. } => {}
                }
            }
        });

        let client = Client::open_with_socket(client_socket, peer_addr, fast_params())
            .await
            .unwrap();
        client.write(b"hello".to_vec()).await.unwrap();
        client.close().await.unwrap();
        peer.await.unwrap();
    }
}
