use crate::Unrecoverable;
use derive_more::Constructor;
use futures::{Sink, Stream};
use std::{
    collections::VecDeque,
    fmt::Debug,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tracing::warn;

/// A transmitter that can send an owned `Item`, or something convertible
/// into one.
pub trait Tx
where
    Self: Debug + Clone + Send,
{
    type Item;
    type Error: Unrecoverable + Debug;
    fn send<Item: Into<Self::Item>>(&self, item: Item) -> Result<(), Self::Error>;
}

/// Convenience type that holds the [`UnboundedTx`] and [`UnboundedRx`] halves
/// of a fresh channel.
#[derive(Debug)]
pub struct Channel<T> {
    pub tx: UnboundedTx<T>,
    pub rx: UnboundedRx<T>,
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc_unbounded();
        Self { tx, rx }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct UnboundedTx<T> {
    pub tx: tokio::sync::mpsc::UnboundedSender<T>,
}

impl<T> UnboundedTx<T> {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<T>) -> Self {
        Self { tx }
    }
}

impl<T> Tx for UnboundedTx<T>
where
    T: Debug + Clone + Send,
{
    type Item = T;
    type Error = tokio::sync::mpsc::error::SendError<T>;

    fn send<Item: Into<Self::Item>>(&self, item: Item) -> Result<(), Self::Error> {
        self.tx.send(item.into())
    }
}

impl<T> Sink<T> for UnboundedTx<T> {
    type Error = tokio::sync::mpsc::error::SendError<T>;

    fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        self.tx.send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

#[derive(Debug, Constructor)]
pub struct UnboundedRx<T> {
    pub rx: tokio::sync::mpsc::UnboundedReceiver<T>,
}

impl<T> UnboundedRx<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> tokio_stream::wrappers::UnboundedReceiverStream<T> {
        tokio_stream::wrappers::UnboundedReceiverStream::new(self.rx)
    }
}

impl<T> Stream for UnboundedRx<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

pub fn mpsc_unbounded<T>() -> (UnboundedTx<T>, UnboundedRx<T>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (UnboundedTx::new(tx), UnboundedRx::new(rx))
}

/// A transmit handle that silently disables itself the first time its
/// receiver is dropped, instead of propagating the send error at every
/// later call site. Used for best-effort progress/event emission where a
/// disconnected subscriber should not be treated as a failure.
#[derive(Debug, Clone)]
pub struct ChannelTxDroppable<ChannelTx> {
    state: ChannelState<ChannelTx>,
}

#[derive(Debug, Clone)]
enum ChannelState<Tx> {
    Active(Tx),
    Disabled,
}

impl<ChannelTx> ChannelTxDroppable<ChannelTx> {
    pub fn new(tx: ChannelTx) -> Self {
        Self {
            state: ChannelState::Active(tx),
        }
    }

    pub fn new_disabled() -> Self {
        Self {
            state: ChannelState::Disabled,
        }
    }
}

impl<ChannelTx> ChannelTxDroppable<ChannelTx>
where
    ChannelTx: Tx,
{
    pub fn send(&mut self, item: ChannelTx::Item) {
        let ChannelState::Active(tx) = &self.state else {
            return;
        };

        if tx.send(item).is_err() {
            let name = std::any::type_name::<ChannelTx::Item>();
            warn!(name, "receiver dropped - items will no longer be sent");
            self.state = ChannelState::Disabled;
        }
    }
}

/// A bounded, single-consumer FIFO queue that drops the **oldest** entry
/// on overflow rather than rejecting the newest (spec §5: "Overflow
/// drops the oldest - price stream is latest-wins anyway").
///
/// Used for the per-bot ticker dispatch queue in the [`crate`]'s
/// `TickerRouter`.
struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    dropped: u64,
    closed: bool,
}

pub struct BoundedDropOldestTx<T> {
    inner: Arc<parking_lot::Mutex<Inner<T>>>,
    notify: Arc<tokio::sync::Notify>,
}

impl<T> Clone for BoundedDropOldestTx<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            notify: Arc::clone(&self.notify),
        }
    }
}

pub struct BoundedDropOldestRx<T> {
    inner: Arc<parking_lot::Mutex<Inner<T>>>,
    notify: Arc<tokio::sync::Notify>,
}

/// Construct a [`BoundedDropOldestTx`]/[`BoundedDropOldestRx`] pair with
/// the given capacity (spec §5 default: 16).
pub fn bounded_drop_oldest<T>(capacity: usize) -> (BoundedDropOldestTx<T>, BoundedDropOldestRx<T>) {
    assert!(capacity > 0, "capacity must be positive");
    let inner = Arc::new(parking_lot::Mutex::new(Inner {
        queue: VecDeque::with_capacity(capacity),
        capacity,
        dropped: 0,
        closed: false,
    }));
    let notify = Arc::new(tokio::sync::Notify::new());
    (
        BoundedDropOldestTx {
            inner: Arc::clone(&inner),
            notify: Arc::clone(&notify),
        },
        BoundedDropOldestRx { inner, notify },
    )
}

impl<T> BoundedDropOldestTx<T> {
    /// Push an item, evicting the oldest queued item first if full.
    /// Never blocks.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        if inner.queue.len() >= inner.capacity {
            inner.queue.pop_front();
            inner.dropped += 1;
        }
        inner.queue.push_back(item);
        drop(inner);
        self.notify.notify_one();
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.lock().dropped
    }
}

impl<T> BoundedDropOldestRx<T> {
    /// Await the next item. Returns `None` once the sender side has been
    /// dropped and the queue has drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.queue.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Drain and discard every queued item without yielding any of them.
    /// Used when a bot worker is cancelled (spec §5: "drains and discards
    /// its queue").
    pub fn drain_discard(&mut self) {
        self.inner.lock().queue.clear();
    }
}

impl<T> Drop for BoundedDropOldestRx<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drop_oldest_evicts_front_not_back() {
        let (tx, mut rx) = bounded_drop_oldest::<i32>(2);
        tx.push(1);
        tx.push(2);
        tx.push(3); // evicts 1, queue is now [2, 3]

        assert_eq!(tx.dropped_count(), 1);
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn drain_discard_empties_queue() {
        let (tx, mut rx) = bounded_drop_oldest::<i32>(4);
        tx.push(1);
        tx.push(2);
        rx.drain_discard();

        drop(tx);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn recv_returns_none_after_rx_dropped_and_drained() {
        let (tx, rx) = bounded_drop_oldest::<i32>(4);
        tx.push(1);
        drop(rx);
        // tx side pushing after close is a silent no-op
        tx.push(2);
    }
}
