use crate::error::InitFailure;
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::broadcast;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream,
};

/// How many unconsumed events a subscriber may fall behind before older
/// events are overwritten. Cycle transitions are rare; a subscriber that
/// lags this far has stopped consuming.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// A lazy, infinite stream of completed initialization cycles.
///
/// Each item is the outcome of one cycle: `Ok` carrying the result for a
/// successful initialization, `Err` carrying the recorded [`InitFailure`].
/// A subscriber only observes cycles completed after it subscribed; history
/// is not replayed.
///
/// Returned by
/// [`Readiness::when_initialized`](crate::Readiness::when_initialized).
pub struct WhenInitialized<T> {
    inner: BroadcastStream<Result<T, InitFailure>>,
}

impl<T: Clone + Send + 'static> WhenInitialized<T> {
    pub(crate) fn new(receiver: broadcast::Receiver<Result<T, InitFailure>>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl<T: Clone + Send + 'static> Stream for WhenInitialized<T> {
    type Item = Result<T, InitFailure>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                // A subscriber that fell more than the channel capacity
                // behind resumes with the events that are still buffered.
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(_)))) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T> std::fmt::Debug for WhenInitialized<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhenInitialized").finish()
    }
}

/// A lazy, infinite stream of transitions back to not-ready.
///
/// Emits one `()` marker per reset, including the reset performed internally
/// by [`Readiness::reinitialize`](crate::Readiness::reinitialize). A
/// subscriber only observes resets performed after it subscribed.
///
/// Returned by
/// [`Readiness::when_uninitialized`](crate::Readiness::when_uninitialized).
pub struct WhenUninitialized {
    inner: BroadcastStream<()>,
}

impl WhenUninitialized {
    pub(crate) fn new(receiver: broadcast::Receiver<()>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl Stream for WhenUninitialized {
    type Item = ();

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(()))) => return Poll::Ready(Some(())),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(_)))) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl std::fmt::Debug for WhenUninitialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhenUninitialized").finish()
    }
}

#[test]
fn test_lagged_subscriber_resumes_with_newer_events() {
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let (sender, receiver) = broadcast::channel(2);

        let mut stream = WhenUninitialized::new(receiver);

        for _ in 0..5 {
            sender.send(()).unwrap();
        }

        assert_eq!(stream.next().await, Some(()));
        assert_eq!(stream.next().await, Some(()));
    });
}
