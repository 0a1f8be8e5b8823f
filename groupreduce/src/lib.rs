//! Allreduce across a fixed group of cooperating processes.
//!
//! Each rank holds a private value; after a collective call every rank
//! holds the identical combination of all of them. Power-of-two groups use
//! recursive doubling (`log2 N` rounds), other sizes a reduce-then-broadcast
//! ring (`2(N-1)` hops).
//!
//! ```no_run
//! use groupreduce::{AllreduceEngine, MemoryChannel, ProcessGroup, ReduceOp};
//! use std::sync::Arc;
//!
//! # async fn demo() -> groupreduce::Result<()> {
//! let mut handles = Vec::new();
//! for (rank, channel) in MemoryChannel::mesh(4).into_iter().enumerate() {
//!     let engine = Arc::new(AllreduceEngine::new(ProcessGroup::new(rank as u32, 4)?, channel));
//!     handles.push(tokio::spawn(async move {
//!         engine.allreduce(rank as u64, &ReduceOp::Sum).await
//!     }));
//! }
//! for h in handles {
//!     assert_eq!(h.await.unwrap()?, 6);
//! }
//! # Ok(())
//! # }
//! ```

pub mod collective;
pub mod config;
pub mod error;
pub mod group;
pub mod plan;
pub mod protocol;
pub mod reduce;
pub mod sync;
pub mod transport;
pub mod types;

pub use collective::{AllreduceEngine, CollectiveStats};
pub use config::{AlgorithmChoice, ReduceConfig};
pub use error::{ReduceError, Result};
pub use group::ProcessGroup;
pub use plan::{ExchangePlan, Strategy};
pub use reduce::{CustomOp, Element, Reducible, ReductionOperator};
pub use sync::SyncEngine;
pub use transport::{MemoryChannel, PointToPointChannel, TcpChannel};
pub use types::{DataType, Rank, ReduceOp};
