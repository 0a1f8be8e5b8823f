//! The allreduce engine and the exchange algorithms it dispatches to.

mod engine;
mod helpers;
mod recursive_doubling;
mod ring;

pub use engine::{AllreduceEngine, CollectiveStats};
