//! The link-layer seam.
//!
//! The election addresses peers by sid only; connection management,
//! framing on the socket, and per-destination queueing belong to the
//! [`Transport`] implementation. [`InMemoryNetwork`] is the in-process
//! implementation used by simulations and scenario tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::Sid;

/// Best-effort frame delivery between peers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Queues a frame for delivery to `sid`. Never blocks on the network;
    /// undeliverable frames are dropped.
    async fn send_to(&self, sid: Sid, frame: Bytes);

    /// Waits up to `timeout` for an inbound `(sender, frame)` pair.
    async fn poll_recv(&self, timeout: Duration) -> Option<(Sid, Bytes)>;

    /// True iff every per-peer outbound queue has drained.
    fn have_delivered(&self) -> bool;

    /// (Re)initiates connections to every known peer.
    async fn connect_all(&self);

    /// Tears the link layer down.
    fn halt(&self);
}

/// An in-process message fabric connecting [`InMemoryTransport`] endpoints.
///
/// Frames addressed to the sending peer itself are looped back into its
/// own inbox — a peer counts its own ballot by receiving it like any
/// other, and no connection to self ever exists.
#[derive(Default)]
pub struct InMemoryNetwork {
    table: Mutex<HashMap<Sid, mpsc::UnboundedSender<(Sid, Bytes)>>>,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates an endpoint for `sid` attached to this fabric.
    pub fn register(self: &Arc<Self>, sid: Sid) -> Arc<InMemoryTransport> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.table.lock().unwrap().insert(sid, tx);
        Arc::new(InMemoryTransport {
            sid,
            network: Arc::clone(self),
            inbox: tokio::sync::Mutex::new(rx),
            halted: AtomicBool::new(false),
        })
    }

    /// Delivers a frame to `to`, attributed to `from`. Scenario tests use
    /// this to play the part of peers that are not actually running.
    pub fn inject(&self, from: Sid, to: Sid, frame: Bytes) {
        let table = self.table.lock().unwrap();
        if let Some(tx) = table.get(&to) {
            // A closed inbox means the endpoint halted; best-effort drop.
            let _ = tx.send((from, frame));
        } else {
            trace!(from, to, "dropping frame for unknown peer");
        }
    }

    /// Detaches an endpoint, as if the peer crashed.
    pub fn unregister(&self, sid: Sid) {
        self.table.lock().unwrap().remove(&sid);
    }
}

/// One peer's endpoint on an [`InMemoryNetwork`].
pub struct InMemoryTransport {
    sid: Sid,
    network: Arc<InMemoryNetwork>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Sid, Bytes)>>,
    halted: AtomicBool,
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send_to(&self, sid: Sid, frame: Bytes) {
        if self.halted.load(Ordering::Acquire) {
            return;
        }
        self.network.inject(self.sid, sid, frame);
    }

    async fn poll_recv(&self, timeout: Duration) -> Option<(Sid, Bytes)> {
        if self.halted.load(Ordering::Acquire) {
            return None;
        }
        let mut inbox = self.inbox.lock().await;
        tokio::time::timeout(timeout, inbox.recv()).await.ok().flatten()
    }

    fn have_delivered(&self) -> bool {
        // Unbounded channels hand frames over synchronously; nothing ever
        // sits in an outbound queue.
        true
    }

    async fn connect_all(&self) {}

    fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }
}
