use super::PointToPointChannel;
use crate::error::{ReduceError, Result};
use crate::types::Rank;
use futures::future::BoxFuture;
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

/// Maximum accepted frame size (4 GiB).
const MAX_FRAME_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Queued inbound messages per peer before the read task applies backpressure.
const INBOX_DEPTH: usize = 64;

/// Channel endpoint over one TCP stream per peer.
///
/// Each message is framed as `[len: u64 LE][payload]`. A background task
/// per peer reads frames and queues them, so `recv(src)` only ever sees
/// messages from `src`, in order.
///
/// Streams must be established by the caller (or by
/// [`bootstrap_local`](Self::bootstrap_local) for single-host groups) and
/// the endpoint must be created inside a tokio runtime.
pub struct TcpChannel {
    rank: Rank,
    world_size: u32,
    writers: HashMap<Rank, Mutex<OwnedWriteHalf>>,
    inboxes: HashMap<Rank, Mutex<mpsc::Receiver<Vec<u8>>>>,
    recv_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TcpChannel {
    /// Build an endpoint from one connected stream per peer.
    pub fn from_streams(
        rank: Rank,
        world_size: u32,
        mut streams: HashMap<Rank, TcpStream>,
    ) -> Result<Self> {
        if let Some(&extra) = streams.keys().find(|&&r| r >= world_size || r == rank) {
            return Err(ReduceError::UnknownPeer { rank: extra });
        }
        if let Some(missing) = (0..world_size).find(|&r| r != rank && !streams.contains_key(&r)) {
            return Err(ReduceError::transport(format!("no stream for peer {missing}")));
        }

        let mut writers = HashMap::new();
        let mut inboxes = HashMap::new();
        let mut recv_handles = Vec::new();

        for peer in (0..world_size).filter(|&r| r != rank) {
            let stream = streams
                .remove(&peer)
                .ok_or_else(|| ReduceError::transport(format!("no stream for peer {peer}")))?;
            stream.set_nodelay(true).map_err(|e| {
                ReduceError::transport_with_source(format!("set_nodelay for peer {peer}"), e)
            })?;
            let (reader, writer) = stream.into_split();
            let (tx, rx) = mpsc::channel(INBOX_DEPTH);
            recv_handles.push(tokio::spawn(recv_loop(rank, peer, reader, tx)));
            writers.insert(peer, Mutex::new(writer));
            inboxes.insert(peer, Mutex::new(rx));
        }

        Ok(Self {
            rank,
            world_size,
            writers,
            inboxes,
            recv_handles,
        })
    }

    /// Build a loopback full mesh of `world_size` endpoints on this host.
    ///
    /// For every pair `i < j`, rank `j` connects to rank `i`'s listener and
    /// announces itself with a 4-byte rank hello.
    pub async fn bootstrap_local(world_size: u32) -> Result<Vec<TcpChannel>> {
        let mut listeners = Vec::with_capacity(world_size as usize);
        for _ in 0..world_size {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            let addr = listener.local_addr()?;
            listeners.push((listener, addr));
        }

        let mut streams: Vec<HashMap<Rank, TcpStream>> =
            (0..world_size).map(|_| HashMap::new()).collect();

        for i in 0..world_size {
            for j in (i + 1)..world_size {
                let (listener, addr) = &listeners[i as usize];
                let (accepted, connected) = tokio::try_join!(
                    accept_hello(listener),
                    connect_hello(*addr, j)
                )?;
                let (announced, accepted) = accepted;
                if announced != j {
                    return Err(ReduceError::transport(format!(
                        "rank {i} expected hello from {j}, got {announced}"
                    )));
                }
                streams[i as usize].insert(j, accepted);
                streams[j as usize].insert(i, connected);
            }
        }

        streams
            .into_iter()
            .enumerate()
            .map(|(rank, s)| TcpChannel::from_streams(rank as Rank, world_size, s))
            .collect()
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        for handle in &self.recv_handles {
            handle.abort();
        }
    }
}

impl PointToPointChannel for TcpChannel {
    fn send<'a>(&'a self, dest: Rank, payload: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let writer = self
                .writers
                .get(&dest)
                .ok_or(ReduceError::UnknownPeer { rank: dest })?;
            let mut writer = writer.lock().await;
            writer
                .write_all(&(payload.len() as u64).to_le_bytes())
                .await
                .map_err(|e| {
                    ReduceError::transport_with_source(format!("tcp write len to {dest}"), e)
                })?;
            writer.write_all(payload).await.map_err(|e| {
                ReduceError::transport_with_source(format!("tcp write payload to {dest}"), e)
            })?;
            writer
                .flush()
                .await
                .map_err(|e| ReduceError::transport_with_source(format!("tcp flush to {dest}"), e))
        })
    }

    fn recv<'a>(&'a self, src: Rank) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let inbox = self
                .inboxes
                .get(&src)
                .ok_or(ReduceError::UnknownPeer { rank: src })?;
            inbox
                .lock()
                .await
                .recv()
                .await
                .ok_or(ReduceError::PeerDisconnected { rank: src })
        })
    }
}

/// Background loop: read frames from one peer and queue them.
async fn recv_loop(rank: Rank, peer: Rank, mut reader: OwnedReadHalf, tx: mpsc::Sender<Vec<u8>>) {
    let mut len_buf = [0u8; 8];
    loop {
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            tracing::debug!(rank, peer, "tcp recv loop ended: {e}");
            return;
        }
        let len = u64::from_le_bytes(len_buf);
        if len > MAX_FRAME_SIZE {
            tracing::warn!(rank, peer, len, "tcp frame too large, closing connection");
            return;
        }
        let mut payload = vec![0u8; len as usize];
        if let Err(e) = reader.read_exact(&mut payload).await {
            tracing::debug!(rank, peer, "tcp recv loop ended reading payload: {e}");
            return;
        }
        if tx.send(payload).await.is_err() {
            return;
        }
    }
}

async fn accept_hello(listener: &TcpListener) -> Result<(Rank, TcpStream)> {
    let (mut stream, _addr) = listener.accept().await?;
    let mut hello = [0u8; 4];
    stream.read_exact(&mut hello).await?;
    Ok((Rank::from_le_bytes(hello), stream))
}

async fn connect_hello(addr: std::net::SocketAddr, rank: Rank) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&rank.to_le_bytes()).await?;
    Ok(stream)
}
