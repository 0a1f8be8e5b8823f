//! Sum allreduce across a group of ranks running in one process.
//!
//! Each rank reports its rank, the group size and a local value, then
//! every rank reports the combined total.
//!
//! ```bash
//! cargo run --example allreduce
//! RUST_LOG=groupreduce=debug cargo run --example allreduce -- 6
//! ```

use groupreduce::{AllreduceEngine, MemoryChannel, ProcessGroup, ReduceConfig, ReduceOp};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> groupreduce::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let world_size: u32 = std::env::args()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .unwrap_or(4);
    let config = ReduceConfig::from_env();
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into());

    let mut handles = Vec::new();
    for (rank, channel) in MemoryChannel::mesh(world_size).into_iter().enumerate() {
        let group = ProcessGroup::new(rank as u32, world_size)?;
        let engine = Arc::new(AllreduceEngine::with_config(group, channel, config.clone())?);
        let host = host.clone();
        handles.push(tokio::spawn(async move {
            // Deterministic stand-in for a random local value.
            let x = (rank as i64 * 7919 + 13) % 100;
            println!(
                "I am rank {} of {} on {host}, my x = {x}",
                engine.rank(),
                engine.size()
            );
            let total = engine.allreduce(x, &ReduceOp::Sum).await?;
            println!("rank {}: X = {total}", engine.rank());
            groupreduce::Result::Ok(total)
        }));
    }

    for h in handles {
        h.await
            .map_err(|e| groupreduce::ReduceError::transport(format!("rank task failed: {e}")))??;
    }

    Ok(())
}
