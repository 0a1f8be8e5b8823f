use crate::collective::{AllreduceEngine, CollectiveStats};
use crate::config::ReduceConfig;
use crate::error::{ReduceError, Result};
use crate::group::ProcessGroup;
use crate::reduce::{Element, ReductionOperator};
use crate::transport::{MemoryChannel, PointToPointChannel};
use crate::types::Rank;

/// Blocking wrapper around [`AllreduceEngine`].
///
/// Owns a `tokio::runtime::Runtime` and calls `block_on()` for each
/// operation, so every rank can be driven from a plain thread.
pub struct SyncEngine<C> {
    inner: AllreduceEngine<C>,
    rt: tokio::runtime::Runtime,
}

impl<C: PointToPointChannel> SyncEngine<C> {
    /// Wrap an existing async engine with a new tokio runtime.
    pub fn from_async(inner: AllreduceEngine<C>) -> Result<Self> {
        Ok(Self {
            inner,
            rt: new_runtime()?,
        })
    }

    pub fn rank(&self) -> Rank {
        self.inner.rank()
    }

    pub fn size(&self) -> u32 {
        self.inner.size()
    }

    /// The wrapped async engine.
    pub fn engine(&self) -> &AllreduceEngine<C> {
        &self.inner
    }

    pub fn allreduce<T, O>(&self, value: T, op: &O) -> Result<T>
    where
        T: Element,
        O: ReductionOperator<T> + ?Sized,
    {
        self.rt.block_on(self.inner.allreduce(value, op))
    }

    pub fn allreduce_in_place<T, O>(&self, data: &mut [T], op: &O) -> Result<CollectiveStats>
    where
        T: Element,
        O: ReductionOperator<T> + ?Sized,
    {
        self.rt.block_on(self.inner.allreduce_in_place(data, op))
    }

    pub fn recover(&self, next_epoch: u64) -> Result<()> {
        self.inner.recover(next_epoch)
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.is_aborted()
    }
}

impl SyncEngine<MemoryChannel> {
    /// One engine per rank over an in-process mesh, each with its own runtime.
    pub fn memory_group(world_size: u32, config: ReduceConfig) -> Result<Vec<Self>> {
        if world_size == 0 {
            return Err(ReduceError::InvalidGroup { rank: 0, size: 0 });
        }
        MemoryChannel::mesh(world_size)
            .into_iter()
            .enumerate()
            .map(|(rank, channel)| {
                let group = ProcessGroup::new(rank as Rank, world_size)?;
                let engine = AllreduceEngine::with_config(group, channel, config.clone())?;
                Self::from_async(engine)
            })
            .collect()
    }
}

fn new_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ReduceError::transport_with_source("tokio runtime", e))
}
