//! Single-producer-friendly, multi-producer-safe bounded channel (C1).
//!
//! `send` never blocks the producer: items are pushed onto an unbounded
//! `tokio::sync::mpsc` channel and a separate length counter drives
//! `wait_until_drained`'s high-water/low-water hysteresis, per §4.1.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, Notify};

use crate::logging::debug;

struct ChannelState {
    len: AtomicUsize,
    closed: AtomicBool,
    high_water_mark: Option<usize>,
    drained: Notify,
}

impl ChannelState {
    fn low_water(&self) -> usize {
        self.high_water_mark.unwrap_or(0) / 2
    }

    fn is_drained_enough(&self) -> bool {
        match self.high_water_mark {
            None => true,
            Some(_) => {
                self.closed.load(Ordering::Acquire) || self.len.load(Ordering::Acquire) <= self.low_water()
            }
        }
    }
}

/// The producer handle. Cheaply cloneable; every relay worker in the fan-in
/// orchestrator holds one.
pub struct BoundedSender<T> {
    tx: mpsc::UnboundedSender<T>,
    state: Arc<ChannelState>,
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            state: self.state.clone(),
        }
    }
}

pub struct BoundedReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
    state: Arc<ChannelState>,
}

/// Creates a channel. `high_water_mark: None` disables backpressure
/// entirely, matching §4.1's "returns immediately if no high-water mark
/// configured".
pub fn bounded<T>(high_water_mark: Option<usize>) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(ChannelState {
        len: AtomicUsize::new(0),
        closed: AtomicBool::new(false),
        high_water_mark,
        drained: Notify::new(),
    });
    (
        BoundedSender {
            tx,
            state: state.clone(),
        },
        BoundedReceiver { rx, state },
    )
}

impl<T> BoundedSender<T> {
    /// Enqueues `item`. A no-op on a closed channel.
    pub fn send(&self, item: T) {
        if self.state.closed.load(Ordering::Acquire) {
            debug!("dropping send on a closed channel");
            return;
        }
        if self.tx.send(item).is_ok() {
            self.state.len.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Marks end-of-stream. Items already enqueued are still delivered.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
        self.state.drained.notify_waiters();
    }

    /// Suspends until the queue has drained below the low-water mark (half
    /// the high-water mark), or returns immediately if no mark is
    /// configured or the channel is closed.
    pub async fn wait_until_drained(&self) {
        loop {
            let notified = self.state.drained.notified();
            if self.state.is_drained_enough() {
                return;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.state.len.load(Ordering::Acquire)
    }
}

impl<T> BoundedReceiver<T> {
    /// Receives the next item, or `None` once the channel is closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<T> {
        use futures_util::StreamExt;
        self.next().await
    }
}

impl<T> Stream for BoundedReceiver<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                self.state.len.fetch_sub(1, Ordering::AcqRel);
                if self.state.is_drained_enough() {
                    self.state.drained.notify_waiters();
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
