//! An in-memory, drop-injecting stand-in for a real UDP network. Mirrors
//! the teacher's `MockWsServer`/`MockWsClient` pairing — a harness that
//! lets tests exercise the real client/server event loops without binding
//! a socket or waiting on wall-clock epoch ticks.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lsp_core::Datagram;
use rand::Rng;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

struct Registry {
    routes: Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>>>,
    next_port: AtomicU16,
    drop_rate: f64,
}

/// A virtual network: call [`VirtualNetwork::bind`] to mint endpoints on
/// it, each of which implements [`Datagram`] and can be handed to
/// `lsp-client`/`lsp-server` exactly like a real socket.
#[derive(Clone)]
pub struct VirtualNetwork(Arc<Registry>);

impl VirtualNetwork {
    /// `drop_rate` is the probability (0.0 - 1.0) that any given `send_to`
    /// is silently discarded, simulating an unreliable datagram substrate.
    pub fn new(drop_rate: f64) -> Self {
        VirtualNetwork(Arc::new(Registry {
            routes: Mutex::new(HashMap::new()),
            next_port: AtomicU16::new(1),
            drop_rate,
        }))
    }

    /// Mints a new virtual endpoint with a unique loopback address.
    pub fn bind(&self) -> Arc<VirtualSocket> {
        let port = self.0.next_port.fetch_add(1, Ordering::SeqCst);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let (tx, rx) = mpsc::unbounded_channel();
        self.0.routes.lock().expect("routes mutex poisoned").insert(addr, tx);
        Arc::new(VirtualSocket {
            addr,
            net: self.0.clone(),
            inbox: AsyncMutex::new(rx),
        })
    }
}

pub struct VirtualSocket {
    addr: SocketAddr,
    net: Arc<Registry>,
    inbox: AsyncMutex<mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>>,
}

#[async_trait]
impl Datagram for VirtualSocket {
    async fn send_to(&self, addr: SocketAddr, buf: &[u8]) -> io::Result<()> {
        if self.net.drop_rate > 0.0 && rand::thread_rng().gen_bool(self.net.drop_rate) {
            return Ok(()); // dropped in flight, as an unreliable datagram channel would
        }
        let route = self
            .net
            .routes
            .lock()
            .expect("routes mutex poisoned")
            .get(&addr)
            .cloned();
        if let Some(tx) = route {
            let _ = tx.send((self.addr, buf.to_vec()));
        }
        // An address with nobody listening behaves like a real network
        // blackhole: the send "succeeds" and the datagram is never seen.
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some((from, data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            None => Err(io::Error::other("virtual socket closed")),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_protocol::Message;

    #[tokio::test]
    async fn messages_round_trip_between_two_endpoints() {
        let net = VirtualNetwork::new(0.0);
        let a = net.bind();
        let b = net.bind();

        let msg = Message::data(1, 1, b"hi".to_vec());
        lsp_core::socket::send(a.as_ref(), b.local_addr().unwrap(), &msg).await;

        let mut buf = vec![0u8; 4096];
        let (len, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(from, a.local_addr().unwrap());
        let decoded = Message::decode(&buf[..len]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn full_drop_rate_silently_discards_everything() {
        let net = VirtualNetwork::new(1.0);
        let a = net.bind();
        let b = net.bind();

        let msg = Message::data(1, 1, b"hi".to_vec());
        for _ in 0..20 {
            lsp_core::socket::send(a.as_ref(), b.local_addr().unwrap(), &msg).await;
        }

        let mut buf = vec![0u8; 4096];
        let result = tokio::time::timeout(std::time::Duration::from_millis(50), b.recv_from(&mut buf)).await;
        assert!(result.is_err(), "nothing should have arrived");
    }
}
