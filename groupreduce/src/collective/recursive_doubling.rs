use crate::collective::helpers::Exchange;
use crate::error::Result;
use crate::plan::ExchangePlan;
use crate::reduce::{Element, ReductionOperator, combine_into};
use crate::transport::PointToPointChannel;

/// Recursive-doubling allreduce over a power-of-two group.
///
/// At step `k` each rank swaps its whole partial result with
/// `rank ^ (1 << k)` and folds the partner's value in. After `log2(N)`
/// steps every partial covers all N inputs. The send and the receive of a
/// step run concurrently, so a rendezvous channel cannot deadlock either.
pub(crate) async fn recursive_doubling_allreduce<T, O, C>(
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
    let rank = ex.rank();
    for (step, partner) in plan.doubling_partners() {
        let (_, theirs) = tokio::try_join!(
            ex.send(partner, step, partial),
            ex.recv::<T>(partner, step, partial.len())
        )?;
        combine_into(partial, &theirs, op, rank < partner);
        tracing::debug!(rank, step, partner, epoch = ex.epoch(), "doubling step done");
    }
    Ok(())
}
