use super::PointToPointChannel;
use crate::error::{ReduceError, Result};
use crate::types::Rank;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, mpsc, watch};

type Inbox = Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>;

/// In-process channel endpoint: one unbounded queue per ordered rank pair.
///
/// Built with [`MemoryChannel::mesh`], which returns one endpoint per rank.
/// Sends never wait for the receiver. Used to run a whole group inside one
/// process (tests, demos) and for failure injection via [`close`](Self::close).
pub struct MemoryChannel {
    rank: Rank,
    world_size: u32,
    outboxes: RwLock<HashMap<Rank, mpsc::UnboundedSender<Vec<u8>>>>,
    inboxes: RwLock<HashMap<Rank, Inbox>>,
    /// Closed flag of every endpoint in the mesh, indexed by rank.
    liveness: Arc<[watch::Sender<bool>]>,
    sent: AtomicU64,
}

impl MemoryChannel {
    /// Build a fully connected mesh of `world_size` endpoints, indexed by rank.
    pub fn mesh(world_size: u32) -> Vec<MemoryChannel> {
        let n = world_size as usize;
        let mut outboxes: Vec<HashMap<Rank, mpsc::UnboundedSender<Vec<u8>>>> =
            (0..n).map(|_| HashMap::new()).collect();
        let mut inboxes: Vec<HashMap<Rank, Inbox>> = (0..n).map(|_| HashMap::new()).collect();
        let liveness: Arc<[watch::Sender<bool>]> =
            (0..n).map(|_| watch::Sender::new(false)).collect();

        for src in 0..world_size {
            for dst in 0..world_size {
                if src == dst {
                    continue;
                }
                let (tx, rx) = mpsc::unbounded_channel();
                outboxes[src as usize].insert(dst, tx);
                inboxes[dst as usize].insert(src, Arc::new(Mutex::new(rx)));
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (out, inb))| MemoryChannel {
                rank: rank as Rank,
                world_size,
                outboxes: RwLock::new(out),
                inboxes: RwLock::new(inb),
                liveness: Arc::clone(&liveness),
                sent: AtomicU64::new(0),
            })
            .collect()
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// Number of messages this endpoint has successfully sent.
    pub fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Simulate this rank crashing.
    ///
    /// Sends to it fail immediately with `PeerDisconnected`, and a peer's
    /// `recv` from it fails the same way once queued messages are drained.
    /// This endpoint's own pending and future calls fail, including a
    /// `recv` already blocked when `close` runs.
    pub fn close(&self) {
        self.liveness[self.rank as usize].send_replace(true);
        if let Ok(mut out) = self.outboxes.write() {
            out.clear();
        }
        if let Ok(mut inb) = self.inboxes.write() {
            inb.clear();
        }
        tracing::debug!(rank = self.rank, "memory channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.is_rank_closed(self.rank)
    }

    fn is_rank_closed(&self, rank: Rank) -> bool {
        *self.liveness[rank as usize].borrow()
    }

    fn closed_error(&self) -> ReduceError {
        ReduceError::transport(format!("memory channel of rank {} is closed", self.rank))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn known_peer(&self, peer: Rank) -> Result<()> {
        if peer >= self.world_size || peer == self.rank {
            return Err(ReduceError::UnknownPeer { rank: peer });
        }
        Ok(())
    }
}

impl PointToPointChannel for MemoryChannel {
    fn send<'a>(&'a self, dest: Rank, payload: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.known_peer(dest)?;
            self.ensure_open()?;
            if self.is_rank_closed(dest) {
                return Err(ReduceError::PeerDisconnected { rank: dest });
            }
            let tx = {
                let map = self
                    .outboxes
                    .read()
                    .map_err(|_| ReduceError::LockPoisoned("memory outboxes"))?;
                map.get(&dest).cloned()
            };
            let tx = tx.ok_or(ReduceError::PeerDisconnected { rank: dest })?;
            tx.send(payload.to_vec())
                .map_err(|_| ReduceError::PeerDisconnected { rank: dest })?;
            self.sent.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }

    fn recv<'a>(&'a self, src: Rank) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            self.known_peer(src)?;
            self.ensure_open()?;
            let inbox = {
                let map = self
                    .inboxes
                    .read()
                    .map_err(|_| ReduceError::LockPoisoned("memory inboxes"))?;
                map.get(&src).cloned()
            };
            let inbox = inbox.ok_or(ReduceError::PeerDisconnected { rank: src })?;
            let mut closed = self.liveness[self.rank as usize].subscribe();
            let closing = closed.wait_for(|c| *c).map(|_| ());
            let mut rx = inbox.lock().await;
            tokio::select! {
                biased;
                () = closing => Err(self.closed_error()),
                msg = rx.recv() => msg.ok_or(ReduceError::PeerDisconnected { rank: src }),
            }
        })
    }
}
