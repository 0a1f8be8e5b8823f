use crate::collective::helpers::Exchange;
use crate::collective::recursive_doubling::recursive_doubling_allreduce;
use crate::collective::ring::ring_allreduce;
use crate::config::ReduceConfig;
use crate::error::{ReduceError, Result};
use crate::group::ProcessGroup;
use crate::plan::{ExchangePlan, Strategy};
use crate::protocol::element_count;
use crate::reduce::{Element, ReductionOperator};
use crate::transport::PointToPointChannel;
use crate::types::Rank;
use std::sync::atomic::{AtomicU64, Ordering};

/// What one successful collective cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectiveStats {
    pub strategy: Strategy,
    /// Sequential exchange rounds the strategy needs for this group size.
    pub rounds: u32,
    /// Data messages this rank sent.
    pub messages_sent: u32,
    /// Epoch the call ran under.
    pub epoch: u64,
}

/// The failure that aborted the engine, kept to fail later calls fast.
#[derive(Debug, Clone)]
struct FailureRecord {
    peer: Rank,
    step: u32,
    reason: String,
}

impl FailureRecord {
    fn to_error(&self) -> ReduceError {
        ReduceError::collective(
            self.peer,
            self.step,
            format!("group aborted by an earlier failure: {}", self.reason),
        )
    }
}

/// Allreduce engine for one rank of a process group.
///
/// Every member of the group must call [`allreduce`](Self::allreduce) (or
/// [`allreduce_in_place`](Self::allreduce_in_place)) the same number of
/// times, in the same order, with the same element type, operator and
/// buffer length. Nothing enforces this; a rank that deviates makes its
/// partners fail with `CollectiveCommunicationFailure` or wait until
/// `collective_timeout` runs out.
///
/// Calls on one engine are serialized. After a failed call the engine is
/// aborted: later calls fail immediately until the caller has
/// re-synchronized the group and called [`recover`](Self::recover) on
/// every rank with the same epoch.
pub struct AllreduceEngine<C> {
    group: ProcessGroup,
    channel: C,
    config: ReduceConfig,
    in_flight: tokio::sync::Mutex<()>,
    epoch: AtomicU64,
    /// Abort notices from epochs below this were issued before the last
    /// `recover` and are ignored.
    abort_floor: AtomicU64,
    failure: std::sync::Mutex<Option<FailureRecord>>,
}

impl<C: PointToPointChannel> AllreduceEngine<C> {
    /// Engine with the default configuration.
    pub fn new(group: ProcessGroup, channel: C) -> Self {
        Self::build(group, channel, ReduceConfig::default())
    }

    pub fn with_config(group: ProcessGroup, channel: C, config: ReduceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(group, channel, config))
    }

    fn build(group: ProcessGroup, channel: C, config: ReduceConfig) -> Self {
        Self {
            group,
            channel,
            config,
            in_flight: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
            abort_floor: AtomicU64::new(0),
            failure: std::sync::Mutex::new(None),
        }
    }

    pub fn group(&self) -> ProcessGroup {
        self.group
    }

    pub fn rank(&self) -> Rank {
        self.group.rank()
    }

    pub fn size(&self) -> u32 {
        self.group.size()
    }

    pub fn config(&self) -> &ReduceConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Epoch the next call will run under.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Whether an earlier failure has aborted this engine.
    pub fn is_aborted(&self) -> bool {
        self.failure.lock().map(|f| f.is_some()).unwrap_or(true)
    }

    /// Combine `value` across the group. Every rank gets the same result.
    pub async fn allreduce<T, O>(&self, value: T, op: &O) -> Result<T>
    where
        T: Element,
        O: ReductionOperator<T> + ?Sized,
    {
        let mut buf = [value];
        self.allreduce_in_place(&mut buf, op).await?;
        Ok(buf[0])
    }

    /// Element-wise allreduce of `data`, overwritten with the result.
    ///
    /// On error `data` is left untouched. Unsupported operators and buffers
    /// longer than `u32::MAX` elements are rejected before any epoch is
    /// used. A `CollectiveCommunicationFailure` names the rank held
    /// responsible, which can be this rank itself when a partner rejected
    /// a message it sent.
    pub async fn allreduce_in_place<T, O>(&self, data: &mut [T], op: &O) -> Result<CollectiveStats>
    where
        T: Element,
        O: ReductionOperator<T> + ?Sized,
    {
        let _serial = self.in_flight.lock().await;
        self.check_call::<T, O>(data.len(), op)?;

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel);
        let plan = ExchangePlan::new(self.group, self.config.algorithm);
        let strategy = plan.strategy();

        if strategy == Strategy::Local {
            return Ok(CollectiveStats {
                strategy,
                rounds: 0,
                messages_sent: 0,
                epoch,
            });
        }

        let dtype = T::DTYPE;
        tracing::debug!(
            rank = self.rank(),
            size = self.size(),
            epoch,
            %strategy,
            op = op.name(),
            %dtype,
            len = data.len(),
            "allreduce start"
        );

        let ex = Exchange::new(
            &self.channel,
            self.group,
            epoch,
            self.abort_floor.load(Ordering::Acquire),
            self.config.collective_timeout,
        );
        let mut partial = data.to_vec();
        let outcome = match strategy {
            Strategy::RecursiveDoubling => {
                recursive_doubling_allreduce(&ex, &plan, &mut partial, op).await
            }
            Strategy::Ring => ring_allreduce(&ex, &plan, &mut partial, op).await,
            Strategy::Local => Ok(()),
        };

        match outcome {
            Ok(()) => {
                data.copy_from_slice(&partial);
                let stats = CollectiveStats {
                    strategy,
                    rounds: plan.rounds(),
                    messages_sent: ex.messages_sent(),
                    epoch,
                };
                tracing::debug!(rank = self.rank(), epoch, sent = stats.messages_sent, "allreduce done");
                Ok(stats)
            }
            Err(e) => {
                self.abort(&ex, &e).await;
                Err(e)
            }
        }
    }

    /// Clear the aborted state and resume at `next_epoch`.
    ///
    /// The caller must first make sure every live rank has stopped the
    /// failed collective, then call `recover` with the same `next_epoch`
    /// everywhere. Pick an epoch above any epoch used so far so leftover
    /// messages of the failed call are recognized as stale.
    pub fn recover(&self, next_epoch: u64) -> Result<()> {
        let mut failure = self
            .failure
            .lock()
            .map_err(|_| ReduceError::LockPoisoned("engine failure record"))?;
        *failure = None;
        self.epoch.store(next_epoch, Ordering::Release);
        self.abort_floor.store(next_epoch, Ordering::Release);
        tracing::info!(rank = self.rank(), next_epoch, "engine recovered");
        Ok(())
    }

    /// Local checks that must pass before a call takes an epoch.
    fn check_call<T, O>(&self, len: usize, op: &O) -> Result<()>
    where
        O: ReductionOperator<T> + ?Sized,
    {
        op.check_supported()?;
        element_count(len)?;
        self.check_not_aborted()
    }

    fn check_not_aborted(&self) -> Result<()> {
        let failure = self
            .failure
            .lock()
            .map_err(|_| ReduceError::LockPoisoned("engine failure record"))?;
        match failure.as_ref() {
            Some(record) => Err(record.to_error()),
            None => Ok(()),
        }
    }

    /// Record `err`, then tell every other rank the collective is dead.
    async fn abort(&self, ex: &Exchange<'_, C>, err: &ReduceError) {
        let Some((peer, step)) = err.failed_peer() else {
            return;
        };
        let reason = match err {
            ReduceError::CollectiveCommunicationFailure { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        tracing::warn!(
            rank = self.rank(),
            epoch = ex.epoch(),
            peer,
            step,
            reason = %reason,
            "allreduce failed, aborting group"
        );
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(FailureRecord {
                peer,
                step,
                reason: reason.clone(),
            });
        }
        ex.broadcast_abort(peer, step, &reason, self.config.abort_timeout)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlgorithmChoice;
    use crate::transport::MemoryChannel;
    use crate::types::ReduceOp;
    use std::sync::Arc;
    use std::time::Duration;

    fn engines(n: u32, config: ReduceConfig) -> Vec<Arc<AllreduceEngine<MemoryChannel>>> {
        MemoryChannel::mesh(n)
            .into_iter()
            .enumerate()
            .map(|(rank, ch)| {
                let group = ProcessGroup::new(rank as Rank, n).unwrap();
                Arc::new(AllreduceEngine::with_config(group, ch, config.clone()).unwrap())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_solo_group_is_identity() {
        let engine = AllreduceEngine::new(ProcessGroup::solo(), MemoryChannel::mesh(1).remove(0));
        let mut data = [42i32, -1];
        let stats = engine
            .allreduce_in_place(&mut data, &ReduceOp::Sum)
            .await
            .unwrap();
        assert_eq!(data, [42, -1]);
        assert_eq!(stats.strategy, Strategy::Local);
        assert_eq!(stats.rounds, 0);
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(engine.channel().messages_sent(), 0);
        assert_eq!(engine.epoch(), 1);
    }

    #[tokio::test]
    async fn test_epochs_advance_per_call() {
        let engines = engines(2, ReduceConfig::default());
        let mut handles = Vec::new();
        for e in &engines {
            let e = Arc::clone(e);
            handles.push(tokio::spawn(async move {
                let a = e.allreduce(1u32, &ReduceOp::Sum).await.unwrap();
                let b = e.allreduce(5u32, &ReduceOp::Max).await.unwrap();
                (a, b, e.epoch())
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), (2, 5, 2));
        }
    }

    #[tokio::test]
    async fn test_unsupported_op_rejected_before_communication() {
        let engines = engines(2, ReduceConfig::default());
        let err = engines[0]
            .allreduce(1.5f64, &ReduceOp::BitXor)
            .await
            .unwrap_err();
        assert!(matches!(err, ReduceError::UnsupportedOperation { .. }));
        assert_eq!(engines[0].channel().messages_sent(), 0);
        assert_eq!(engines[0].epoch(), 0);
        assert!(!engines[0].is_aborted());
    }

    #[cfg(target_pointer_width = "64")]
    #[tokio::test]
    async fn test_oversized_buffer_rejected_before_epoch() {
        let engines = engines(2, ReduceConfig::default());
        let err = engines[0]
            .check_call::<u8, _>(u32::MAX as usize + 1, &ReduceOp::Sum)
            .unwrap_err();
        assert!(matches!(err, ReduceError::EncodeFailed(_)));
        assert_eq!(err.failed_peer(), None);
        assert!(engines[0].check_call::<u8, _>(u32::MAX as usize, &ReduceOp::Sum).is_ok());
        assert_eq!(engines[0].epoch(), 0);
        assert!(!engines[0].is_aborted());
    }

    #[tokio::test]
    async fn test_with_config_validates() {
        let config = ReduceConfig {
            collective_timeout: Duration::ZERO,
            ..ReduceConfig::default()
        };
        let ch = MemoryChannel::mesh(1).remove(0);
        assert!(matches!(
            AllreduceEngine::with_config(ProcessGroup::solo(), ch, config),
            Err(ReduceError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_call_leaves_buffer_and_poisons() {
        let config = ReduceConfig {
            collective_timeout: Duration::from_millis(50),
            abort_timeout: Duration::from_millis(20),
            algorithm: AlgorithmChoice::Auto,
        };
        let engines = engines(2, config);
        let mut data = [7u8, 8];
        // Rank 1 never shows up.
        let err = engines[0]
            .allreduce_in_place(&mut data, &ReduceOp::Sum)
            .await
            .unwrap_err();
        assert_eq!(err.failed_peer(), Some((1, 0)));
        assert_eq!(data, [7, 8]);
        assert!(engines[0].is_aborted());

        let again = engines[0].allreduce(1u8, &ReduceOp::Sum).await.unwrap_err();
        assert_eq!(again.failed_peer(), Some((1, 0)));

        engines[0].recover(10).unwrap();
        assert!(!engines[0].is_aborted());
        assert_eq!(engines[0].epoch(), 10);
    }
}
