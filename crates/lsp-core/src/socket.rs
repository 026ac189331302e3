//! Datagram I/O: one send primitive plus a receive loop that decodes each
//! datagram and hands `(addr, Message)` to the event loop.
//!
//! The event loop talks to a [`Datagram`] trait object rather than
//! `tokio::net::UdpSocket` directly, so tests can substitute an in-memory,
//! drop-injecting transport (see `lsp-test-support`) instead of binding
//! real sockets and racing wall-clock epoch ticks.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use lsp_protocol::Message;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::trace;

/// An unreliable, unordered, connectionless datagram channel.
#[async_trait]
pub trait Datagram: Send + Sync {
    async fn send_to(&self, addr: SocketAddr, buf: &[u8]) -> io::Result<()>;
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// The real transport: a bound `tokio::net::UdpSocket`.
pub struct UdpTransport(UdpSocket);

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        Ok(UdpTransport(UdpSocket::bind(addr).await?))
    }
}

#[async_trait]
impl Datagram for UdpTransport {
    async fn send_to(&self, addr: SocketAddr, buf: &[u8]) -> io::Result<()> {
        self.0.send_to(buf, addr).await.map(|_| ())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }
}

/// Sends one message to `addr`. Internal send failures are swallowed —
/// never surfaced to the application; the epoch loop's retransmission is
/// the sole recovery mechanism.
pub async fn send(socket: &dyn Datagram, addr: SocketAddr, msg: &Message) {
    let bytes = msg.encode();
    if let Err(e) = socket.send_to(addr, &bytes).await {
        trace!(error = %e, %addr, "send_to failed, relying on epoch retransmission");
    }
}

/// Loops on `recv_from`, decoding each datagram and forwarding it on `tx`.
/// Decode failures are discarded silently. Exits when the socket errors
/// (e.g. because it was closed) or when `tx`'s receiver has been dropped.
///
/// Cancellation is the caller's job: hold the `JoinHandle` this is spawned
/// under and `abort()` it as part of endpoint shutdown, since a shared
/// socket has no "close" that unblocks an in-flight `recv_from` from a
/// separate owner.
pub async fn recv_loop(socket: Arc<dyn Datagram>, tx: mpsc::UnboundedSender<(SocketAddr, Message)>) {
    let mut buf = vec![0u8; 65536];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, "recv_from failed, exiting receive loop");
                break;
            }
        };
        match Message::decode(&buf[..len]) {
            Ok(msg) => {
                if tx.send((addr, msg)).is_err() {
                    break;
                }
            }
            Err(e) => trace!(error = %e, %addr, "discarding malformed datagram"),
        }
    }
}
