use crate::error::{ReduceError, Result};
use crate::group::ProcessGroup;
use crate::protocol::{ControlMessage, Frame, decode_frame, encode_control, encode_data};
use crate::reduce::{Element, decode_elements};
use crate::transport::PointToPointChannel;
use crate::types::Rank;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in deadline when a configured budget overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Per-call exchange context: one rank's view of one collective.
///
/// Every send/recv is bounded by the deadline of its step,
/// `started + (step + 1) * step_timeout`, and every failure is reported as
/// a `CollectiveCommunicationFailure` naming the peer and step.
pub(crate) struct Exchange<'a, C: ?Sized> {
    channel: &'a C,
    group: ProcessGroup,
    epoch: u64,
    /// Oldest epoch whose abort notices still count. Anything older predates
    /// the last `recover` and is discarded.
    abort_floor: u64,
    started: Instant,
    step_timeout: Duration,
    sent: AtomicU32,
}

impl<'a, C: PointToPointChannel + ?Sized> Exchange<'a, C> {
    pub(crate) fn new(
        channel: &'a C,
        group: ProcessGroup,
        epoch: u64,
        abort_floor: u64,
        step_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            group,
            epoch,
            abort_floor,
            started: Instant::now(),
            step_timeout,
            sent: AtomicU32::new(0),
        }
    }

    pub(crate) fn rank(&self) -> Rank {
        self.group.rank()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn messages_sent(&self) -> u32 {
        self.sent.load(Ordering::Relaxed)
    }

    fn deadline(&self, step: u32) -> Instant {
        let budget = self.step_timeout.saturating_mul(step.saturating_add(1));
        self.started
            .checked_add(budget)
            .unwrap_or_else(|| self.started + FAR_FUTURE)
    }

    /// Send this rank's partial result to `peer` for `step`.
    pub(crate) async fn send<T: Element>(&self, peer: Rank, step: u32, values: &[T]) -> Result<()> {
        let frame = encode_data(self.epoch, step, values)
            .map_err(|e| ReduceError::collective(peer, step, e.to_string()))?;
        match tokio::time::timeout_at(self.deadline(step), self.channel.send(peer, &frame)).await {
            Ok(Ok(())) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(e)) => Err(ReduceError::collective(peer, step, e.to_string())),
            Err(_) => Err(ReduceError::collective(
                peer,
                step,
                format!("send timed out after {}ms", self.step_budget_ms(step)),
            )),
        }
    }

    /// Receive `peer`'s partial result for `step`: exactly `count` elements
    /// of type `T` from the current epoch.
    pub(crate) async fn recv<T: Element>(&self, peer: Rank, step: u32, count: usize) -> Result<Vec<T>> {
        let deadline = self.deadline(step);
        loop {
            let bytes = match tokio::time::timeout_at(deadline, self.channel.recv(peer)).await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => return Err(ReduceError::collective(peer, step, e.to_string())),
                Err(_) => {
                    return Err(ReduceError::collective(
                        peer,
                        step,
                        format!("recv timed out after {}ms", self.step_budget_ms(step)),
                    ));
                }
            };

            let frame = decode_frame(&bytes)
                .map_err(|e| ReduceError::collective(peer, step, format!("corrupted message: {e}")))?;

            match frame {
                Frame::Control {
                    header,
                    message: ControlMessage::Abort { origin, reason, .. },
                } => {
                    if header.epoch < self.abort_floor {
                        tracing::debug!(rank = self.rank(), peer, epoch = header.epoch, "discarding stale abort notice");
                        continue;
                    }
                    if !self.group.contains(origin) {
                        return Err(ReduceError::collective(
                            peer,
                            step,
                            format!("corrupted message: abort names unknown rank {origin}"),
                        ));
                    }
                    if header.epoch < self.epoch {
                        return Err(ReduceError::collective(
                            origin,
                            step,
                            format!(
                                "rank {peer} reported collective {} aborted: {reason}",
                                header.epoch
                            ),
                        ));
                    }
                    return Err(ReduceError::collective(
                        origin,
                        step,
                        format!("aborted by rank {peer}: {reason}"),
                    ));
                }
                Frame::Data { header, payload } => {
                    if header.epoch < self.epoch {
                        tracing::debug!(rank = self.rank(), peer, epoch = header.epoch, "discarding stale data frame");
                        continue;
                    }
                    if header.epoch > self.epoch {
                        return Err(ReduceError::collective(
                            peer,
                            step,
                            format!(
                                "message from future collective {} (current {})",
                                header.epoch, self.epoch
                            ),
                        ));
                    }
                    if header.step != step {
                        return Err(ReduceError::collective(
                            peer,
                            step,
                            format!("message for step {} arrived at step {step}", header.step),
                        ));
                    }
                    if header.dtype != T::DTYPE as u8 {
                        return Err(ReduceError::collective(
                            peer,
                            step,
                            format!(
                                "element type tag {} does not match {}",
                                header.dtype,
                                T::DTYPE
                            ),
                        ));
                    }
                    if header.count as usize != count {
                        return Err(ReduceError::collective(
                            peer,
                            step,
                            format!("wrong size: {} elements, expected {count}", header.count),
                        ));
                    }
                    return decode_elements(payload, count)
                        .map_err(|e| ReduceError::collective(peer, step, e.to_string()));
                }
            }
        }
    }

    /// Best-effort notice to every other rank that this collective failed
    /// because of `origin`. Errors and timeouts are logged and ignored.
    pub(crate) async fn broadcast_abort(
        &self,
        origin: Rank,
        step: u32,
        reason: &str,
        abort_timeout: Duration,
    ) {
        let message = ControlMessage::Abort {
            origin,
            step,
            reason: reason.to_string(),
        };
        let frame = match encode_control(self.epoch, step, &message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(rank = self.rank(), error = %e, "failed to encode abort notice");
                return;
            }
        };
        let frame = &frame;
        let sends = self.group.peers().map(|peer| async move {
            match tokio::time::timeout(abort_timeout, self.channel.send(peer, frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(rank = self.rank(), peer, error = %e, "abort notice not delivered");
                }
                Err(_) => {
                    tracing::debug!(rank = self.rank(), peer, "abort notice timed out");
                }
            }
        });
        futures::future::join_all(sends).await;
    }

    fn step_budget_ms(&self, step: u32) -> u128 {
        self.step_timeout
            .saturating_mul(step.saturating_add(1))
            .as_millis()
    }
}
