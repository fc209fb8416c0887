use crate::{
    error::{DynError, ErrorReport, InitFailure, ReinitializeError, TransitionError},
    events::{WhenInitialized, WhenUninitialized, EVENT_CAPACITY},
    watcher::ReadinessWatcher,
};
use std::{
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::{broadcast, watch};

/// The outcome of one initialization cycle.
pub(crate) type Outcome<T> = Result<T, InitFailure>;

/// State shared between a [`Readiness`] and its [`ReadinessWatcher`]s.
///
/// `cycle` holds the one live initialization attempt. Its slot is `None`
/// while unresolved and `Some(outcome)` once resolved; resetting replaces
/// the whole channel rather than writing `None` back, so waiters that
/// subscribed to an earlier, already-resolved cycle keep draining that
/// cycle's outcome.
pub(crate) struct Shared<T> {
    cycle: RwLock<watch::Sender<Option<Outcome<T>>>>,
    ready_events: broadcast::Sender<Outcome<T>>,
    reset_events: broadcast::Sender<()>,
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    fn new() -> Self {
        let (cycle, _) = watch::channel(None);
        let (ready_events, _) = broadcast::channel(EVENT_CAPACITY);
        let (reset_events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            cycle: RwLock::new(cycle),
            ready_events,
            reset_events,
        }
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.cycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .borrow()
            .is_some()
    }

    /// Subscribes to the initialization cycle that is current right now.
    fn subscribe_cycle(&self) -> watch::Receiver<Option<Outcome<T>>> {
        self.cycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe()
    }

    pub(crate) fn ensure_initialized(
        &self,
    ) -> impl Future<Output = Result<T, InitFailure>> + Send + 'static {
        let mut cycle = self.subscribe_cycle();

        async move {
            match cycle.wait_for(Option::is_some).await {
                Ok(resolved) => match &*resolved {
                    Some(outcome) => outcome.clone(),
                    None => unreachable!(),
                },
                // The cycle's sender is only ever replaced once resolved, so
                // the channel cannot close under a still-pending waiter.
                Err(_) => unreachable!(),
            }
        }
    }

    pub(crate) fn when_initialized(&self) -> WhenInitialized<T> {
        WhenInitialized::new(self.ready_events.subscribe())
    }

    pub(crate) fn when_uninitialized(&self) -> WhenUninitialized {
        WhenUninitialized::new(self.reset_events.subscribe())
    }

    /// Resolves the current cycle. Waiters are released first, then the
    /// outcome is published to subscribers.
    fn resolve(&self, outcome: Outcome<T>) -> Result<(), TransitionError> {
        let cycle = self.cycle.write().unwrap_or_else(PoisonError::into_inner);

        if cycle.borrow().is_some() {
            return Err(TransitionError::AlreadyInitialized);
        }

        cycle.send_replace(Some(outcome.clone()));

        drop(cycle);

        let _ = self.ready_events.send(outcome);

        Ok(())
    }

    /// Replaces the current cycle with a fresh unresolved one and publishes
    /// a reset marker.
    fn reset(&self) -> Result<(), TransitionError> {
        let mut cycle = self.cycle.write().unwrap_or_else(PoisonError::into_inner);

        if cycle.borrow().is_none() {
            return Err(TransitionError::NotInitializedYet);
        }

        let (fresh, _) = watch::channel(None);

        *cycle = fresh;

        drop(cycle);

        let _ = self.reset_events.send(());

        Ok(())
    }
}

/// A resettable readiness signal whose awaitable resolves to a value of `T`.
///
/// A [`Readiness`] is meant to live as a private field of the object whose
/// initialization it tracks: the owner drives the mutating operations
/// ([`initialized_successfully`](Self::initialized_successfully),
/// [`initialized_with_error`](Self::initialized_with_error),
/// [`mark_as_uninitialized`](Self::mark_as_uninitialized),
/// [`reinitialize`](Self::reinitialize)) from its own setup logic, one call
/// at a time, and hands everyone else a [`ReadinessWatcher`] via
/// [`watcher`](Self::watcher). [`Readiness`] is deliberately not [`Clone`];
/// only the watcher handle is.
///
/// For a signal that carries no value, see [`ReadyFlag`](crate::ReadyFlag).
///
/// # Example
///
/// ```rust
/// use ready_room::Readiness;
///
/// struct Config {
///     readiness: Readiness<u32>,
/// }
///
/// impl Config {
///     fn new() -> Self {
///         Self {
///             readiness: Readiness::new(),
///         }
///     }
///
///     async fn load(&self) {
///         // Something expensive or long-running...
///
///         self.readiness.initialized_successfully(42).unwrap();
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let config = Config::new();
/// let watcher = config.readiness.watcher();
///
/// config.load().await;
///
/// assert_eq!(watcher.ensure_initialized().await.unwrap(), 42);
/// # });
/// ```
pub struct Readiness<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + Sync + 'static> Readiness<T> {
    /// Creates a new [`Readiness`] in the not-ready state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
        }
    }

    /// Returns a future that resolves once the initialization cycle that is
    /// current *at call time* completes, yielding the cycle's result or its
    /// recorded [`InitFailure`].
    ///
    /// Any number of callers may wait concurrently; they all resolve
    /// together when the cycle resolves. Calling this after resolution
    /// immediately yields the already-resolved outcome, and re-awaiting is
    /// always safe and side-effect-free. A future obtained before a
    /// [`mark_as_uninitialized`](Self::mark_as_uninitialized) keeps draining
    /// the old cycle's outcome; only calls made after the reset observe the
    /// new cycle.
    ///
    /// There is no built-in timeout: if the cycle never resolves, the
    /// future stays pending. Dropping it is the caller's cancellation
    /// mechanism and does not affect the signal.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ready_room::Readiness;
    ///
    /// # tokio_test::block_on(async {
    /// let readiness = Readiness::new();
    ///
    /// readiness.initialized_successfully(42).unwrap();
    ///
    /// assert_eq!(readiness.ensure_initialized().await.unwrap(), 42);
    /// assert_eq!(readiness.ensure_initialized().await.unwrap(), 42);
    /// # });
    /// ```
    pub fn ensure_initialized(
        &self,
    ) -> impl Future<Output = Result<T, InitFailure>> + Send + 'static {
        self.shared.ensure_initialized()
    }

    /// Whether the current initialization cycle has resolved, successfully
    /// or with an error. Never suspends, never mutates.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.shared.is_initialized()
    }

    /// Subscribes to completed initialization cycles.
    ///
    /// The returned stream lazily yields one outcome per cycle completed
    /// after subscription: `Ok` with the result, or `Err` with the recorded
    /// failure. History is not replayed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ready_room::Readiness;
    /// use tokio_stream::StreamExt;
    ///
    /// # tokio_test::block_on(async {
    /// let readiness = Readiness::new();
    ///
    /// let mut ready = readiness.when_initialized();
    ///
    /// readiness.initialized_successfully(42).unwrap();
    ///
    /// assert_eq!(ready.next().await.unwrap().unwrap(), 42);
    /// # });
    /// ```
    #[must_use]
    pub fn when_initialized(&self) -> WhenInitialized<T> {
        self.shared.when_initialized()
    }

    /// Subscribes to transitions back to not-ready.
    ///
    /// The returned stream lazily yields one marker per reset performed
    /// after subscription, including the reset performed internally by
    /// [`reinitialize`](Self::reinitialize). Within one cycle, the marker is
    /// observable strictly before the new cycle's event appears on
    /// [`when_initialized`](Self::when_initialized), so dependent objects
    /// can chain their own not-ready transition before re-entering ready.
    #[must_use]
    pub fn when_uninitialized(&self) -> WhenUninitialized {
        self.shared.when_uninitialized()
    }

    /// Returns a cheap, cloneable handle exposing only the observing
    /// operations: [`ensure_initialized`](ReadinessWatcher::ensure_initialized),
    /// [`is_initialized`](ReadinessWatcher::is_initialized),
    /// [`when_initialized`](ReadinessWatcher::when_initialized) and
    /// [`when_uninitialized`](ReadinessWatcher::when_uninitialized).
    ///
    /// This is the handle to give out to external consumers; the mutating
    /// operations stay with the [`Readiness`] itself.
    #[must_use]
    pub fn watcher(&self) -> ReadinessWatcher<T> {
        ReadinessWatcher::new(Arc::clone(&self.shared))
    }

    /// Resolves the current initialization cycle with `value`.
    ///
    /// Pending [`ensure_initialized`](Self::ensure_initialized) waiters are
    /// released with a clone of `value`, and the value is published to
    /// [`when_initialized`](Self::when_initialized) subscribers.
    ///
    /// # Errors
    ///
    /// * [`TransitionError::AlreadyInitialized`] if the current cycle is
    ///   already resolved. Resolving twice is a bug in the calling code.
    pub fn initialized_successfully(&self, value: T) -> Result<(), TransitionError> {
        self.shared.resolve(Ok(value))
    }

    /// Resolves the current initialization cycle with a failure.
    ///
    /// The failure described by `report` is not raised here; it is stored
    /// and replayed through [`ensure_initialized`](Self::ensure_initialized)
    /// and [`when_initialized`](Self::when_initialized). An error object is
    /// recorded verbatim; a plain message is wrapped into a
    /// [`ReadinessError`](crate::ReadinessError) first.
    ///
    /// # Errors
    ///
    /// * [`TransitionError::MissingErrorOrMessage`] if `report` carries
    ///   neither an error nor a message.
    /// * [`TransitionError::AlreadyInitialized`] if the current cycle is
    ///   already resolved.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ready_room::{ErrorReport, Readiness};
    ///
    /// # tokio_test::block_on(async {
    /// let readiness = Readiness::<u32>::new();
    ///
    /// readiness
    ///     .initialized_with_error(ErrorReport::message("boom"))
    ///     .unwrap();
    ///
    /// let failure = readiness.ensure_initialized().await.unwrap_err();
    ///
    /// assert_eq!(failure.to_string(), "ReadinessError: boom");
    /// # });
    /// ```
    pub fn initialized_with_error(&self, report: ErrorReport) -> Result<(), TransitionError> {
        let failure = report.into_failure()?;

        self.shared.resolve(Err(failure))
    }

    /// Transitions the signal back to not-ready.
    ///
    /// The current resolved cycle is replaced with a fresh unresolved one
    /// and a marker is published to
    /// [`when_uninitialized`](Self::when_uninitialized). Waiters still
    /// draining the old cycle keep its outcome.
    ///
    /// # Errors
    ///
    /// * [`TransitionError::NotInitializedYet`] if the current cycle has not
    ///   resolved.
    pub fn mark_as_uninitialized(&self) -> Result<(), TransitionError> {
        self.shared.reset()
    }

    /// Runs one full reinitialization cycle: reset, run `work`, resolve.
    ///
    /// The reset marker is published strictly before any event of the new
    /// cycle. On success the produced value resolves the new cycle and is
    /// returned. On failure the work's error is re-raised to the caller
    /// either way; with `record_failure` set it is also recorded into the
    /// signal first, otherwise the signal stays not-ready so a later manual
    /// resolution can still complete the cycle.
    ///
    /// # Errors
    ///
    /// * [`TransitionError::NotInitializedYet`] (as
    ///   [`ReinitializeError::Transition`]) if the signal is not currently
    ///   ready. Reinitialization only makes sense from a ready state.
    /// * [`ReinitializeError::Work`] carrying the work's own error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ready_room::Readiness;
    ///
    /// # tokio_test::block_on(async {
    /// let readiness = Readiness::new();
    ///
    /// readiness.initialized_successfully(0).unwrap();
    ///
    /// let value = readiness
    ///     .reinitialize(async || Ok::<_, std::io::Error>(5), true)
    ///     .await
    ///     .unwrap();
    ///
    /// assert_eq!(value, 5);
    /// assert_eq!(readiness.ensure_initialized().await.unwrap(), 5);
    /// # });
    /// ```
    pub async fn reinitialize<F, E>(
        &self,
        work: F,
        record_failure: bool,
    ) -> Result<T, ReinitializeError>
    where
        F: AsyncFnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.mark_as_uninitialized()?;

        match work().await {
            Ok(value) => {
                self.initialized_successfully(value.clone())?;

                Ok(value)
            }
            Err(error) => {
                let error: DynError = Arc::new(error);

                if record_failure {
                    self.initialized_with_error(ErrorReport::from_arc(Arc::clone(&error)))?;
                }

                Err(ReinitializeError::Work(error))
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Readiness<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Readiness<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readiness")
            .field("ready", &self.is_initialized())
            .finish()
    }
}

#[test]
fn test_fresh_signal_is_not_ready() {
    use std::time::Duration;

    tokio_test::block_on(async {
        let readiness = Readiness::<u32>::new();

        assert!(!readiness.is_initialized());

        let wait = tokio::time::timeout(Duration::from_millis(50), readiness.ensure_initialized());

        assert!(wait.await.is_err());
        assert!(!readiness.is_initialized());
    });
}

#[test]
fn test_double_success_is_rejected() {
    let readiness = Readiness::new();

    readiness.initialized_successfully(42).unwrap();

    assert_eq!(
        readiness.initialized_successfully(42),
        Err(TransitionError::AlreadyInitialized)
    );

    assert!(readiness.is_initialized());
}

#[test]
fn test_success_resolves_waiters_and_subscribers() {
    use std::time::Duration;
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let readiness = Readiness::new();
        let watcher = readiness.watcher();

        let mut ready = readiness.when_initialized();

        let (a, b, c, ()) = tokio::join!(
            watcher.ensure_initialized(),
            watcher.ensure_initialized(),
            readiness.ensure_initialized(),
            async {
                tokio::task::yield_now().await;

                readiness.initialized_successfully(7).unwrap();
            }
        );

        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (7, 7, 7));
        assert!(readiness.is_initialized());

        assert_eq!(ready.next().await.unwrap().unwrap(), 7);

        let no_more = tokio::time::timeout(Duration::from_millis(50), ready.next());

        assert!(no_more.await.is_err());
    });
}

#[test]
fn test_error_by_message() {
    use crate::error::ReadinessError;
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let readiness = Readiness::<u32>::new();

        let mut ready = readiness.when_initialized();

        readiness
            .initialized_with_error(ErrorReport::message("boom"))
            .unwrap();

        assert!(readiness.is_initialized());

        let failure = readiness.ensure_initialized().await.unwrap_err();

        assert_eq!(
            failure.downcast_ref::<ReadinessError>().unwrap().message(),
            "boom"
        );

        let event = ready.next().await.unwrap().unwrap_err();

        assert_eq!(
            event.downcast_ref::<ReadinessError>().unwrap().message(),
            "boom"
        );
    });
}

#[test]
fn test_error_by_object_is_replayed_verbatim() {
    use crate::error::ReadinessError;

    tokio_test::block_on(async {
        let readiness = Readiness::<u32>::new();

        let error: DynError = Arc::new(ReadinessError::new("boom"));

        readiness
            .initialized_with_error(ErrorReport::from_arc(Arc::clone(&error)))
            .unwrap();

        let failure = readiness.ensure_initialized().await.unwrap_err();

        assert!(Arc::ptr_eq(failure.error(), &error));
    });
}

#[test]
fn test_missing_error_and_message_is_rejected() {
    let readiness = Readiness::<u32>::new();

    assert_eq!(
        readiness.initialized_with_error(ErrorReport::default()),
        Err(TransitionError::MissingErrorOrMessage)
    );

    assert!(!readiness.is_initialized());

    readiness.initialized_successfully(1).unwrap();

    assert_eq!(
        readiness.initialized_with_error(ErrorReport::message("boom")),
        Err(TransitionError::AlreadyInitialized)
    );
}

#[test]
fn test_error_wins_over_message() {
    use crate::error::ReadinessError;

    tokio_test::block_on(async {
        let readiness = Readiness::<u32>::new();

        let error: DynError = Arc::new(ReadinessError::new("object"));

        readiness
            .initialized_with_error(ErrorReport {
                error: Some(Arc::clone(&error)),
                message: Some(String::from("dropped")),
                trace: None,
            })
            .unwrap();

        let failure = readiness.ensure_initialized().await.unwrap_err();

        assert!(Arc::ptr_eq(failure.error(), &error));
    });
}

#[test]
fn test_trace_is_carried_with_the_failure() {
    tokio_test::block_on(async {
        let readiness = Readiness::<u32>::new();

        readiness
            .initialized_with_error(ErrorReport::message("boom").with_trace("during sign-in"))
            .unwrap();

        let failure = readiness.ensure_initialized().await.unwrap_err();

        assert_eq!(failure.trace(), Some("during sign-in"));
    });
}

#[test]
fn test_mark_as_uninitialized() {
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let readiness = Readiness::new();

        assert_eq!(
            readiness.mark_as_uninitialized(),
            Err(TransitionError::NotInitializedYet)
        );

        readiness.initialized_successfully(1).unwrap();

        let mut resets = readiness.when_uninitialized();

        readiness.mark_as_uninitialized().unwrap();

        assert!(!readiness.is_initialized());
        assert_eq!(resets.next().await, Some(()));
    });
}

#[test]
fn test_reset_does_not_disturb_resolved_waiters() {
    use std::time::Duration;

    tokio_test::block_on(async {
        let readiness = Readiness::new();

        readiness.initialized_successfully(1).unwrap();

        let old_cycle = readiness.ensure_initialized();

        readiness.mark_as_uninitialized().unwrap();

        assert_eq!(old_cycle.await.unwrap(), 1);

        let new_cycle =
            tokio::time::timeout(Duration::from_millis(50), readiness.ensure_initialized());

        assert!(new_cycle.await.is_err());
    });
}

#[test]
fn test_subscribers_do_not_replay_history() {
    use std::time::Duration;
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let readiness = Readiness::new();

        readiness.initialized_successfully(1).unwrap();

        let mut ready = readiness.when_initialized();

        let replayed = tokio::time::timeout(Duration::from_millis(50), ready.next());

        assert!(replayed.await.is_err());
    });
}

#[test]
fn test_reinitialize_resets_before_resolving() {
    use crate::error::ReadinessError;
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let readiness = Readiness::new();

        readiness.initialized_successfully(0).unwrap();

        let mut resets = readiness.when_uninitialized();
        let mut ready = readiness.when_initialized();

        let value = readiness
            .reinitialize(
                async || {
                    // The reset is already observable while the new cycle's
                    // work is still in flight.
                    assert!(!readiness.is_initialized());
                    assert_eq!(resets.next().await, Some(()));

                    Ok::<_, ReadinessError>(5)
                },
                true,
            )
            .await
            .unwrap();

        assert_eq!(value, 5);
        assert_eq!(ready.next().await.unwrap().unwrap(), 5);
        assert_eq!(readiness.ensure_initialized().await.unwrap(), 5);
    });
}

#[test]
fn test_reinitialize_requires_ready() {
    tokio_test::block_on(async {
        let readiness = Readiness::<u32>::new();

        let error = readiness
            .reinitialize(async || Ok::<_, std::io::Error>(5), true)
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            ReinitializeError::Transition(TransitionError::NotInitializedYet)
        ));
    });
}

#[test]
fn test_reinitialize_records_failure() {
    use crate::error::ReadinessError;

    tokio_test::block_on(async {
        let readiness = Readiness::<u32>::new();

        readiness.initialized_successfully(0).unwrap();

        let error = readiness
            .reinitialize(async || Err::<u32, _>(ReadinessError::new("boom")), true)
            .await
            .unwrap_err();

        let ReinitializeError::Work(error) = error else {
            panic!("expected the work's error");
        };

        assert!(readiness.is_initialized());

        let failure = readiness.ensure_initialized().await.unwrap_err();

        assert!(Arc::ptr_eq(failure.error(), &error));
    });
}

#[test]
fn test_reinitialize_can_leave_failure_unrecorded() {
    use crate::error::ReadinessError;
    use std::time::Duration;

    tokio_test::block_on(async {
        let readiness = Readiness::new();

        readiness.initialized_successfully(0).unwrap();

        let result = readiness
            .reinitialize(async || Err::<u32, _>(ReadinessError::new("boom")), false)
            .await;

        assert!(result.is_err());
        assert!(!readiness.is_initialized());

        let pending =
            tokio::time::timeout(Duration::from_millis(50), readiness.ensure_initialized());

        assert!(pending.await.is_err());

        readiness.initialized_successfully(1912).unwrap();

        assert_eq!(readiness.ensure_initialized().await.unwrap(), 1912);
    });
}

#[test]
fn test_one_event_per_cycle() {
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let readiness = Readiness::new();

        let mut ready = readiness.when_initialized();
        let mut resets = readiness.when_uninitialized();

        readiness.initialized_successfully(1).unwrap();
        readiness.mark_as_uninitialized().unwrap();
        readiness
            .initialized_with_error(ErrorReport::message("boom"))
            .unwrap();
        readiness.mark_as_uninitialized().unwrap();
        readiness.initialized_successfully(3).unwrap();

        assert_eq!(ready.next().await.unwrap().unwrap(), 1);
        assert!(ready.next().await.unwrap().is_err());
        assert_eq!(ready.next().await.unwrap().unwrap(), 3);

        assert_eq!(resets.next().await, Some(()));
        assert_eq!(resets.next().await, Some(()));
    });
}
