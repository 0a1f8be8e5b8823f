//! Point-to-point channels the collective engine runs over.
//!
//! The engine only needs two operations between any pair of ranks, both
//! of which may wait: `send` until the payload is queued or delivered, and
//! `recv` until a payload from that specific source is available.
//!
//! Implementations must
//! - preserve message boundaries (a payload is never re-segmented), and
//! - deliver messages from one sender to one receiver in the order sent.
//!
//! No ordering is required across different peer pairs. A channel that
//! buffers sends (instead of requiring a rendezvous) keeps the engine's
//! "send then receive" exchange deadlock-free.

mod memory;
mod tcp;

pub use memory::MemoryChannel;
pub use tcp::TcpChannel;

use crate::error::Result;
use crate::types::Rank;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Reliable, message-framed, per-pair FIFO transport between ranks.
pub trait PointToPointChannel: Send + Sync {
    /// Send one message to `dest`.
    fn send<'a>(&'a self, dest: Rank, payload: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Receive the next message from `src`.
    fn recv<'a>(&'a self, src: Rank) -> BoxFuture<'a, Result<Vec<u8>>>;
}

impl<C: PointToPointChannel + ?Sized> PointToPointChannel for Arc<C> {
    fn send<'a>(&'a self, dest: Rank, payload: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        (**self).send(dest, payload)
    }

    fn recv<'a>(&'a self, src: Rank) -> BoxFuture<'a, Result<Vec<u8>>> {
        (**self).recv(src)
    }
}

impl<C: PointToPointChannel + ?Sized> PointToPointChannel for Box<C> {
    fn send<'a>(&'a self, dest: Rank, payload: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        (**self).send(dest, payload)
    }

    fn recv<'a>(&'a self, src: Rank) -> BoxFuture<'a, Result<Vec<u8>>> {
        (**self).recv(src)
    }
}
