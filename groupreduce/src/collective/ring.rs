use crate::collective::helpers::Exchange;
use crate::error::Result;
use crate::plan::{ExchangePlan, RingAction};
use crate::reduce::{Element, ReductionOperator, combine_into};
use crate::transport::PointToPointChannel;

/// Reduce-then-broadcast allreduce along the ring `0 -> 1 -> ... -> N-1 -> 0`.
///
/// Reduce phase: rank `h` forwards `v0 ∘ ... ∘ vh` to `h + 1`, so rank
/// `N-1` ends up with the total. Broadcast phase: the total travels on
/// from `N-1` to `0`, `1`, ... `N-2`, each rank replacing its partial.
/// Every rank therefore returns the exact bytes rank `N-1` computed.
pub(crate) async fn ring_allreduce<T, O, C>(
    ex: &Exchange<'_, C>,
    plan: &ExchangePlan,
    partial: &mut [T],
    op: &O,
) -> Result<()>
where
    T: Element,
    O: ReductionOperator<T> + ?Sized,
    C: PointToPointChannel + ?Sized,
{
    for hop in plan.ring_schedule() {
        match hop.action {
            RingAction::Send { to } => ex.send(to, hop.hop, partial).await?,
            RingAction::Receive { from, accumulate } => {
                let theirs = ex.recv::<T>(from, hop.hop, partial.len()).await?;
                if accumulate {
                    // The incoming accumulation covers lower ranks only.
                    combine_into(partial, &theirs, op, false);
                } else {
                    partial.copy_from_slice(&theirs);
                }
            }
        }
        tracing::debug!(rank = ex.rank(), hop = hop.hop, epoch = ex.epoch(), "ring hop done");
    }
    Ok(())
}
