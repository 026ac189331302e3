//! The LSP server: one datagram socket multiplexed over many connections,
//! keyed by `conn_id`, driven by a single event loop (spec §4.4, §4.4
//! "Server-specific logic", §5, §9).

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lsp_core::connection::{AckOutcome, ConnectionState, DataOutcome, WriteOutcome};
use lsp_core::{epoch, socket, Datagram, LspError, Params, UdpTransport};
use lsp_protocol::Message;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// What a `read()` call returns: the connection it came from, paired with
/// either a delivered payload or a once-per-lost-connection sentinel error.
pub type ServerRead = Result<(u32, Vec<u8>), (u32, LspError)>;

enum ServerRequest {
    Read(oneshot::Sender<ServerRead>),
    Write(u32, Vec<u8>, oneshot::Sender<Result<(), LspError>>),
    CloseConn(u32, oneshot::Sender<Result<(), LspError>>),
    Close(oneshot::Sender<Result<(), LspError>>),
}

pub struct Server {
    requests: mpsc::UnboundedSender<ServerRequest>,
    event_loop: JoinHandle<()>,
    recv_loop: JoinHandle<()>,
    epoch_handle: JoinHandle<()>,
    epoch_cancel: Option<oneshot::Sender<()>>,
}

impl Server {
    pub async fn listen(port: u16, params: Params) -> Result<Self, LspError> {
        let local_addr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), port);
        let socket = UdpTransport::bind(local_addr)
            .await
            .map_err(|_| LspError::ConnectionFailed)?;
        Ok(Self::listen_with_socket(Arc::new(socket), params))
    }

    /// Test seam: listens over an arbitrary [`Datagram`] transport.
    pub fn listen_with_socket(socket: Arc<dyn Datagram>, params: Params) -> Self {
        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let recv_loop = tokio::spawn(socket::recv_loop(socket.clone(), net_tx));

        let (epoch_tx, epoch_rx) = mpsc::unbounded_channel();
        let (epoch_handle, epoch_cancel) = epoch::spawn(Duration::from_millis(params.epoch_millis), epoch_tx);

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let event_loop = tokio::spawn(run_event_loop(socket, params, requests_rx, net_rx, epoch_rx));

        Server {
            requests: requests_tx,
            event_loop,
            recv_loop,
            epoch_handle,
            epoch_cancel: Some(epoch_cancel),
        }
    }

    pub async fn read(&self) -> ServerRead {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(ServerRequest::Read(tx)).is_err() {
            return Err((0, LspError::Closed));
        }
        rx.await.unwrap_or(Err((0, LspError::Closed)))
    }

    pub async fn write(&self, conn_id: u32, payload: Vec<u8>) -> Result<(), LspError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(ServerRequest::Write(conn_id, payload, tx))
            .map_err(|_| LspError::Closed)?;
        rx.await.unwrap_or(Err(LspError::Closed))
    }

    pub async fn close_conn(&self, conn_id: u32) -> Result<(), LspError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(ServerRequest::CloseConn(conn_id, tx))
            .map_err(|_| LspError::Closed)?;
        rx.await.unwrap_or(Err(LspError::Closed))
    }

    pub async fn close(&self) -> Result<(), LspError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(ServerRequest::Close(tx))
            .map_err(|_| LspError::Closed)?;
        rx.await.unwrap_or(Err(LspError::Closed))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(cancel) = self.epoch_cancel.take() {
            let _ = cancel.send(());
        }
        self.event_loop.abort();
        self.recv_loop.abort();
        self.epoch_handle.abort();
    }
}

struct ServerConn {
    state: ConnectionState,
    /// The once-per-lost-connection sentinel has already been delivered to
    /// a `read()` caller; the entry is reclaimed right after.
    lost_reported: bool,
}

async fn run_event_loop(
    socket: Arc<dyn Datagram>,
    params: Params,
    mut requests: mpsc::UnboundedReceiver<ServerRequest>,
    mut net_rx: mpsc::UnboundedReceiver<(SocketAddr, Message)>,
    mut epoch_rx: mpsc::UnboundedReceiver<()>,
) {
    let mut conns: HashMap<u32, ServerConn> = HashMap::new();
    // The reverse lookup (addr -> id); the forward lookup (id -> addr) is
    // never stored separately, since every ServerConn already carries its
    // own remote_addr — a single source of truth instead of two maps that
    // could drift apart.
    let mut addr_to_id: HashMap<SocketAddr, u32> = HashMap::new();
    let mut next_conn_id: u32 = 0;
    let mut current_epoch: u64 = 0;

    let mut deferred_reads: VecDeque<oneshot::Sender<ServerRead>> = VecDeque::new();
    let mut deferred_close_conns: VecDeque<(u32, oneshot::Sender<Result<(), LspError>>)> = VecDeque::new();
    let mut deferred_server_close: VecDeque<oneshot::Sender<Result<(), LspError>>> = VecDeque::new();
    let mut server_closing = false;
    let mut closed = false;

    loop {
        tokio::select! {
            biased;
            maybe = requests.recv() => {
                match maybe {
                    None => break,
                    Some(req) => {
                        handle_request(
                            &socket,
                            req,
                            &mut conns,
                            &mut addr_to_id,
                            &mut deferred_reads,
                            &mut deferred_close_conns,
                            &mut deferred_server_close,
                            &mut server_closing,
                            &mut closed,
                        )
                        .await;
                    }
                }
            }
            maybe = net_rx.recv() => {
                if let Some((addr, msg)) = maybe {
                    handle_network(&socket, &mut conns, &mut addr_to_id, &mut next_conn_id, current_epoch, params, addr, msg).await;
                }
            }
            maybe = epoch_rx.recv() => {
                if maybe.is_some() {
                    current_epoch += 1;
                    for conn in conns.values_mut() {
                        let outcome = conn.state.epoch_tick(current_epoch, params.epoch_limit);
                        if outcome.newly_lost {
                            conn.lost_reported = false;
                        }
                        for m in &outcome.retransmits {
                            socket::send(socket.as_ref(), conn.state.remote_addr, m).await;
                        }
                    }
                }
            }
        }

        resolve_deferred(
            &mut conns,
            &mut addr_to_id,
            &mut deferred_reads,
            &mut deferred_close_conns,
            &mut deferred_server_close,
            server_closing,
            &mut closed,
        );
    }

    debug!(n = conns.len(), "server event loop exiting");
}

#[allow(clippy::too_many_arguments)]
async fn handle_request(
    socket: &Arc<dyn Datagram>,
    req: ServerRequest,
    conns: &mut HashMap<u32, ServerConn>,
    addr_to_id: &mut HashMap<SocketAddr, u32>,
    deferred_reads: &mut VecDeque<oneshot::Sender<ServerRead>>,
    deferred_close_conns: &mut VecDeque<(u32, oneshot::Sender<Result<(), LspError>>)>,
    deferred_server_close: &mut VecDeque<oneshot::Sender<Result<(), LspError>>>,
    server_closing: &mut bool,
    closed: &mut bool,
) {
    match req {
        ServerRequest::Read(reply) => match try_fulfill_read(conns, addr_to_id) {
            Some(outcome) => {
                let _ = reply.send(outcome);
            }
            None => deferred_reads.push_back(reply),
        },
        ServerRequest::Write(conn_id, payload, reply) => match conns.get_mut(&conn_id) {
            None => {
                let _ = reply.send(Err(LspError::NoSuchConnection(conn_id)));
            }
            Some(conn) if conn.state.is_lost() => {
                let _ = reply.send(Err(LspError::ConnectionLost));
            }
            Some(conn) => {
                if let WriteOutcome::Send(msg) = conn.state.write(payload) {
                    socket::send(socket.as_ref(), conn.state.remote_addr, &msg).await;
                }
                let _ = reply.send(Ok(()));
            }
        },
        ServerRequest::CloseConn(conn_id, reply) => match conns.get_mut(&conn_id) {
            None => {
                let _ = reply.send(Err(LspError::NoSuchConnection(conn_id)));
            }
            Some(conn) => {
                conn.state.request_close();
                if conn.state.is_drained() {
                    let _ = reply.send(Ok(()));
                } else if conn.state.is_lost() {
                    let _ = reply.send(Err(LspError::ConnectionLost));
                } else {
                    deferred_close_conns.push_back((conn_id, reply));
                }
            }
        },
        ServerRequest::Close(reply) => {
            *server_closing = true;
            for conn in conns.values_mut() {
                conn.state.request_close();
            }
            if conns.values().all(|c| c.state.is_drained() || c.state.is_lost()) {
                *closed = true;
                let _ = reply.send(Ok(()));
            } else {
                deferred_server_close.push_back(reply);
            }
        }
    }
}

async fn handle_network(
    socket: &Arc<dyn Datagram>,
    conns: &mut HashMap<u32, ServerConn>,
    addr_to_id: &mut HashMap<SocketAddr, u32>,
    next_conn_id: &mut u32,
    current_epoch: u64,
    params: Params,
    addr: SocketAddr,
    msg: Message,
) {
    match msg {
        Message::Connect => {
            if addr_to_id.contains_key(&addr) {
                // Re-Connect from a known address is idempotent: dropped.
                // The client will see its handshake complete once the
                // existing connection's keep-alive Ack arrives.
                return;
            }
            *next_conn_id += 1;
            let id = *next_conn_id;
            let state = ConnectionState::new_server(id, addr, params.window_size, current_epoch);
            socket::send(socket.as_ref(), addr, &Message::ack(id, 0)).await;
            conns.insert(
                id,
                ServerConn {
                    state,
                    lost_reported: false,
                },
            );
            addr_to_id.insert(addr, id);
        }
        Message::Data { seq_num, payload, .. } => {
            let Some(&id) = addr_to_id.get(&addr) else {
                return;
            };
            if let Some(conn) = conns.get_mut(&id) {
                let DataOutcome { ack_to_send, .. } = conn.state.receive_data(current_epoch, seq_num, payload);
                socket::send(socket.as_ref(), addr, &ack_to_send).await;
            }
        }
        Message::Ack { seq_num, .. } => {
            let Some(&id) = addr_to_id.get(&addr) else {
                return;
            };
            if let Some(conn) = conns.get_mut(&id) {
                let AckOutcome { to_send, .. } = conn.state.receive_ack(current_epoch, seq_num);
                for m in &to_send {
                    socket::send(socket.as_ref(), addr, m).await;
                }
            }
        }
    }
}

/// Scans connections in ascending `conn_id` order (a fixed, deterministic
/// "some order" per spec 4.4) for a deliverable message, or else a
/// not-yet-reported lost connection with nothing left to deliver.
fn try_fulfill_read(conns: &mut HashMap<u32, ServerConn>, addr_to_id: &mut HashMap<SocketAddr, u32>) -> Option<ServerRead> {
    let mut ids: Vec<u32> = conns.keys().copied().collect();
    ids.sort_unstable();

    for id in &ids {
        let conn = conns.get_mut(id).expect("id came from conns.keys()");
        if conn.state.has_deliverable() {
            if let Some(payload) = conn.state.try_deliver() {
                return Some(Ok((*id, payload)));
            }
        }
    }

    for id in ids {
        let conn = conns.get_mut(&id).expect("id came from conns.keys()");
        if conn.state.is_lost() && !conn.state.has_deliverable() && !conn.lost_reported {
            conn.lost_reported = true;
            addr_to_id.remove(&conn.state.remote_addr);
            conns.remove(&id);
            return Some(Err((id, LspError::ConnectionLost)));
        }
    }

    None
}

fn resolve_deferred(
    conns: &mut HashMap<u32, ServerConn>,
    addr_to_id: &mut HashMap<SocketAddr, u32>,
    deferred_reads: &mut VecDeque<oneshot::Sender<ServerRead>>,
    deferred_close_conns: &mut VecDeque<(u32, oneshot::Sender<Result<(), LspError>>)>,
    deferred_server_close: &mut VecDeque<oneshot::Sender<Result<(), LspError>>>,
    server_closing: bool,
    closed: &mut bool,
) {
    while let Some(outcome) = try_fulfill_read(conns, addr_to_id) {
        let Some(reply) = deferred_reads.pop_front() else {
            break;
        };
        let _ = reply.send(outcome);
    }

    let mut still_pending = VecDeque::new();
    while let Some((conn_id, reply)) = deferred_close_conns.pop_front() {
        match conns.get(&conn_id) {
            None => {
                let _ = reply.send(Err(LspError::NoSuchConnection(conn_id)));
            }
            Some(conn) if conn.state.is_drained() => {
                let _ = reply.send(Ok(()));
            }
            Some(conn) if conn.state.is_lost() => {
                let _ = reply.send(Err(LspError::ConnectionLost));
            }
            Some(_) => still_pending.push_back((conn_id, reply)),
        }
    }
    *deferred_close_conns = still_pending;

    if server_closing && conns.values().all(|c| c.state.is_drained() || c.state.is_lost()) {
        *closed = true;
        while let Some(reply) = deferred_server_close.pop_front() {
            let _ = reply.send(Ok(()));
        }
    }
}
