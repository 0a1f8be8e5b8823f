use groupreduce::{AllreduceEngine, MemoryChannel, ProcessGroup, Rank, ReduceConfig};
use std::sync::Arc;

pub type Engine = AllreduceEngine<MemoryChannel>;

/// One engine per rank over an in-process mesh.
pub fn memory_engines(world_size: u32, config: ReduceConfig) -> Vec<Arc<Engine>> {
    MemoryChannel::mesh(world_size)
        .into_iter()
        .enumerate()
        .map(|(rank, channel)| {
            let group = ProcessGroup::new(rank as Rank, world_size).unwrap();
            Arc::new(AllreduceEngine::with_config(group, channel, config.clone()).unwrap())
        })
        .collect()
}

/// Helper: run a collective operation across N engines concurrently and
/// collect each rank's output, indexed by rank.
/// Keeps all engines alive until every task completes.
pub async fn collect_collective_with_config<F, Fut, R>(
    world_size: u32,
    config: ReduceConfig,
    f: F,
) -> Vec<R>
where
    F: Fn(Arc<Engine>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    let engines = memory_engines(world_size, config);

    let f = Arc::new(f);
    let mut handles = Vec::new();
    for e in &engines {
        let e = Arc::clone(e);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(e).await }));
    }
    let mut out = Vec::with_capacity(handles.len());
    for h in handles {
        out.push(h.await.unwrap());
    }
    out
}

pub async fn collect_collective<F, Fut, R>(world_size: u32, f: F) -> Vec<R>
where
    F: Fn(Arc<Engine>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    collect_collective_with_config(world_size, ReduceConfig::default(), f).await
}

/// Run `f` on every rank; assertions live inside `f`.
pub async fn run_collective<F, Fut>(world_size: u32, f: F)
where
    F: Fn(Arc<Engine>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    collect_collective(world_size, f).await;
}
