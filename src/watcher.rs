use crate::{
    error::InitFailure,
    events::{WhenInitialized, WhenUninitialized},
    signal::Shared,
};
use std::{future::Future, sync::Arc};

/// A cheap, cloneable handle onto a [`Readiness`](crate::Readiness) or
/// [`ReadyFlag`](crate::ReadyFlag), exposing only the observing operations.
///
/// The owner of the signal keeps the mutating operations to itself and
/// hands these out to external consumers; a watcher cannot resolve, fail or
/// reset the signal. Watchers observe the live instance: a watcher created
/// before a reset sees the new cycle on its next call.
///
/// # Example
///
/// ```rust
/// use ready_room::Readiness;
///
/// # tokio_test::block_on(async {
/// let readiness = Readiness::new();
///
/// let watcher = readiness.watcher();
///
/// assert!(!watcher.is_initialized());
///
/// readiness.initialized_successfully(42).unwrap();
///
/// assert_eq!(watcher.ensure_initialized().await.unwrap(), 42);
/// # });
/// ```
pub struct ReadinessWatcher<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + Sync + 'static> ReadinessWatcher<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Returns a future that resolves once the initialization cycle that is
    /// current at call time completes.
    ///
    /// See [`Readiness::ensure_initialized`](crate::Readiness::ensure_initialized).
    pub fn ensure_initialized(
        &self,
    ) -> impl Future<Output = Result<T, InitFailure>> + Send + 'static {
        self.shared.ensure_initialized()
    }

    /// Whether the current initialization cycle has resolved.
    ///
    /// See [`Readiness::is_initialized`](crate::Readiness::is_initialized).
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.shared.is_initialized()
    }

    /// Subscribes to completed initialization cycles.
    ///
    /// See [`Readiness::when_initialized`](crate::Readiness::when_initialized).
    #[must_use]
    pub fn when_initialized(&self) -> WhenInitialized<T> {
        self.shared.when_initialized()
    }

    /// Subscribes to transitions back to not-ready.
    ///
    /// See [`Readiness::when_uninitialized`](crate::Readiness::when_uninitialized).
    #[must_use]
    pub fn when_uninitialized(&self) -> WhenUninitialized {
        self.shared.when_uninitialized()
    }
}

impl<T> Clone for ReadinessWatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for ReadinessWatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessWatcher")
            .field("ready", &self.is_initialized())
            .finish()
    }
}

#[test]
fn test_watcher_tracks_the_live_instance() {
    use crate::Readiness;
    use std::time::Duration;

    tokio_test::block_on(async {
        let readiness = Readiness::new();
        let watcher = readiness.watcher();

        readiness.initialized_successfully(1).unwrap();

        assert!(watcher.is_initialized());
        assert_eq!(watcher.ensure_initialized().await.unwrap(), 1);

        readiness.mark_as_uninitialized().unwrap();

        assert!(!watcher.is_initialized());

        // A watcher created before the reset waits on the new cycle.
        let pending =
            tokio::time::timeout(Duration::from_millis(50), watcher.ensure_initialized());

        assert!(pending.await.is_err());

        readiness.initialized_successfully(2).unwrap();

        assert_eq!(watcher.ensure_initialized().await.unwrap(), 2);
    });
}

#[test]
fn test_cloned_watchers_share_the_signal() {
    use crate::Readiness;
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let readiness = Readiness::new();
        let watcher = readiness.watcher();
        let clone = watcher.clone();

        let mut ready = clone.when_initialized();

        readiness.initialized_successfully(42).unwrap();

        assert!(watcher.is_initialized());
        assert!(clone.is_initialized());
        assert_eq!(ready.next().await.unwrap().unwrap(), 42);
    });
}
