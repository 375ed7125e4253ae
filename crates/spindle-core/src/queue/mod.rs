//! AsyncQueue: an unbounded FIFO hand-off between two channel endpoints.
//!
//! A single worker owns the buffer. On every iteration it offers two
//! operations at once and takes whichever becomes ready first:
//!
//! - **accept**: always offered. Receive from `input` and push to the back of
//!   the buffer. `None` (all producers gone) ends the worker.
//! - **deliver**: offered only while the buffer is non-empty. Reserve a slot on
//!   `output`, then move the head of the buffer into it.
//!
//! When both are ready `tokio::select!` picks one at random. FIFO still holds
//! because `deliver` only ever exposes the head and `accept` only appends.
//!
//! # No backpressure
//! The buffer has no upper bound. A producer that outpaces the consumer (or a
//! consumer that never reads) grows memory without limit. Callers that need a
//! bound should use a plain bounded `mpsc` channel instead.
//!
//! # Shutdown
//! Closing `input` is the only shutdown signal. Items still buffered at that
//! point are dropped, not flushed; the count is reported in [`QueueReport`].

mod report;

pub use report::{ExitReason, QueueReport};

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::domain::QueueId;

/// Unbounded order-preserving bridge between a producer and a consumer.
///
/// # 使用例
/// ```ignore
/// let (tx, mut rx, worker) = AsyncQueue::bridge::<u64>(1);
/// tx.send(1).await?;
/// assert_eq!(rx.recv().await, Some(1));
/// drop(tx);
/// let report = worker.await?;
/// ```
pub struct AsyncQueue;

impl AsyncQueue {
    /// Run the worker loop on the current task until `input` is closed (or
    /// `output` is closed by the consumer).
    pub async fn run<T: Send>(mut input: mpsc::Receiver<T>, output: mpsc::Sender<T>) -> QueueReport {
        let queue_id = QueueId::generate();
        let mut buffer: VecDeque<T> = VecDeque::new();
        let mut accepted: u64 = 0;
        let mut delivered: u64 = 0;

        tracing::trace!(%queue_id, "queue worker started");

        let reason = loop {
            tokio::select! {
                item = input.recv() => match item {
                    Some(item) => {
                        buffer.push_back(item);
                        accepted += 1;
                    }
                    None => break ExitReason::InputClosed,
                },
                // reserve() は cancel-safe: 選ばれなかった場合に head を失わない
                permit = output.reserve(), if !buffer.is_empty() => match permit {
                    Ok(permit) => {
                        if let Some(item) = buffer.pop_front() {
                            permit.send(item);
                            delivered += 1;
                        }
                    }
                    Err(_) => break ExitReason::OutputClosed,
                },
            }
        };

        let report = QueueReport {
            queue_id,
            accepted,
            delivered,
            dropped: buffer.len() as u64,
            reason,
        };

        tracing::debug!(
            %queue_id,
            accepted = report.accepted,
            delivered = report.delivered,
            dropped = report.dropped,
            reason = ?report.reason,
            "queue worker exited"
        );

        report
    }

    /// Spawn [`AsyncQueue::run`] as a tokio task.
    pub fn spawn<T: Send + 'static>(
        input: mpsc::Receiver<T>,
        output: mpsc::Sender<T>,
    ) -> JoinHandle<QueueReport> {
        tokio::spawn(Self::run(input, output))
    }

    /// Create both endpoint channels and spawn the worker between them.
    ///
    /// `capacity` bounds each endpoint channel (minimum 1); the queue's own
    /// buffer stays unbounded.
    pub fn bridge<T: Send + 'static>(
        capacity: usize,
    ) -> (mpsc::Sender<T>, mpsc::Receiver<T>, JoinHandle<QueueReport>) {
        let capacity = capacity.max(1);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let worker = Self::spawn(in_rx, out_tx);
        (in_tx, out_rx, worker)
    }

    pub fn bridge_with_config<T: Send + 'static>(
        config: &QueueConfig,
    ) -> (mpsc::Sender<T>, mpsc::Receiver<T>, JoinHandle<QueueReport>) {
        Self::bridge(config.channel_capacity)
    }
}
