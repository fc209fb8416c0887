use crate::{
    error::{ErrorReport, InitFailure, ReinitializeError, TransitionError},
    events::{WhenInitialized, WhenUninitialized},
    signal::Readiness,
    watcher::ReadinessWatcher,
};
use std::future::Future;

/// A resettable readiness signal whose awaitable carries no value.
///
/// Everything behaves as on [`Readiness`]; the success operation simply
/// takes no argument and the awaitable resolves to `()`. Use this when the
/// host object only needs to signal *that* it is ready, not hand anything
/// over.
///
/// # Example
///
/// ```rust
/// use ready_room::ReadyFlag;
///
/// struct Cache {
///     readiness: ReadyFlag,
/// }
///
/// impl Cache {
///     fn new() -> Self {
///         Self {
///             readiness: ReadyFlag::new(),
///         }
///     }
///
///     async fn warm_up(&self) {
///         // Something expensive or long-running...
///
///         self.readiness.initialized_successfully().unwrap();
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let cache = Cache::new();
/// let watcher = cache.readiness.watcher();
///
/// cache.warm_up().await;
///
/// watcher.ensure_initialized().await.unwrap();
/// # });
/// ```
pub struct ReadyFlag {
    signal: Readiness<()>,
}

impl ReadyFlag {
    /// Creates a new [`ReadyFlag`] in the not-ready state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: Readiness::new(),
        }
    }

    /// Returns a future that resolves once the initialization cycle that is
    /// current at call time completes.
    ///
    /// See [`Readiness::ensure_initialized`].
    pub fn ensure_initialized(
        &self,
    ) -> impl Future<Output = Result<(), InitFailure>> + Send + 'static {
        self.signal.ensure_initialized()
    }

    /// Whether the current initialization cycle has resolved.
    ///
    /// See [`Readiness::is_initialized`].
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.signal.is_initialized()
    }

    /// Subscribes to completed initialization cycles.
    ///
    /// See [`Readiness::when_initialized`].
    #[must_use]
    pub fn when_initialized(&self) -> WhenInitialized<()> {
        self.signal.when_initialized()
    }

    /// Subscribes to transitions back to not-ready.
    ///
    /// See [`Readiness::when_uninitialized`].
    #[must_use]
    pub fn when_uninitialized(&self) -> WhenUninitialized {
        self.signal.when_uninitialized()
    }

    /// Returns a cheap, cloneable handle exposing only the observing
    /// operations.
    ///
    /// See [`Readiness::watcher`].
    #[must_use]
    pub fn watcher(&self) -> ReadinessWatcher<()> {
        self.signal.watcher()
    }

    /// Resolves the current initialization cycle successfully.
    ///
    /// # Errors
    ///
    /// * [`TransitionError::AlreadyInitialized`] if the current cycle is
    ///   already resolved.
    pub fn initialized_successfully(&self) -> Result<(), TransitionError> {
        self.signal.initialized_successfully(())
    }

    /// Resolves the current initialization cycle with a failure.
    ///
    /// See [`Readiness::initialized_with_error`].
    ///
    /// # Errors
    ///
    /// * [`TransitionError::MissingErrorOrMessage`] if `report` carries
    ///   neither an error nor a message.
    /// * [`TransitionError::AlreadyInitialized`] if the current cycle is
    ///   already resolved.
    pub fn initialized_with_error(&self, report: ErrorReport) -> Result<(), TransitionError> {
        self.signal.initialized_with_error(report)
    }

    /// Transitions the signal back to not-ready.
    ///
    /// See [`Readiness::mark_as_uninitialized`].
    ///
    /// # Errors
    ///
    /// * [`TransitionError::NotInitializedYet`] if the current cycle has not
    ///   resolved.
    pub fn mark_as_uninitialized(&self) -> Result<(), TransitionError> {
        self.signal.mark_as_uninitialized()
    }

    /// Runs one full reinitialization cycle: reset, run `work`, resolve.
    ///
    /// See [`Readiness::reinitialize`].
    ///
    /// # Errors
    ///
    /// * [`TransitionError::NotInitializedYet`] (as
    ///   [`ReinitializeError::Transition`]) if the signal is not currently
    ///   ready.
    /// * [`ReinitializeError::Work`] carrying the work's own error.
    pub async fn reinitialize<F, E>(
        &self,
        work: F,
        record_failure: bool,
    ) -> Result<(), ReinitializeError>
    where
        F: AsyncFnOnce() -> Result<(), E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.signal.reinitialize(work, record_failure).await
    }
}

impl Default for ReadyFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReadyFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyFlag")
            .field("ready", &self.is_initialized())
            .finish()
    }
}

#[test]
fn test_fresh_flag_is_not_ready() {
    use std::time::Duration;

    tokio_test::block_on(async {
        let flag = ReadyFlag::new();

        assert!(!flag.is_initialized());

        let wait = tokio::time::timeout(Duration::from_millis(50), flag.ensure_initialized());

        assert!(wait.await.is_err());
    });
}

#[test]
fn test_flag_success_resolves_waiters_and_subscribers() {
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let flag = ReadyFlag::new();
        let watcher = flag.watcher();

        let mut ready = flag.when_initialized();

        let (a, b, ()) = tokio::join!(
            watcher.ensure_initialized(),
            flag.ensure_initialized(),
            async {
                tokio::task::yield_now().await;

                flag.initialized_successfully().unwrap();
            }
        );

        a.unwrap();
        b.unwrap();

        assert!(flag.is_initialized());
        assert!(ready.next().await.unwrap().is_ok());
    });
}

#[test]
fn test_flag_double_success_is_rejected() {
    let flag = ReadyFlag::new();

    flag.initialized_successfully().unwrap();

    assert_eq!(
        flag.initialized_successfully(),
        Err(TransitionError::AlreadyInitialized)
    );

    assert!(flag.is_initialized());
}

#[test]
fn test_flag_error_by_message() {
    use crate::error::ReadinessError;

    tokio_test::block_on(async {
        let flag = ReadyFlag::new();

        flag.initialized_with_error(ErrorReport::message("boom"))
            .unwrap();

        assert!(flag.is_initialized());

        let failure = flag.ensure_initialized().await.unwrap_err();

        assert_eq!(
            failure.downcast_ref::<ReadinessError>().unwrap().message(),
            "boom"
        );
    });
}

#[test]
fn test_flag_mark_as_uninitialized() {
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let flag = ReadyFlag::new();

        assert_eq!(
            flag.mark_as_uninitialized(),
            Err(TransitionError::NotInitializedYet)
        );

        flag.initialized_successfully().unwrap();

        let mut resets = flag.when_uninitialized();

        flag.mark_as_uninitialized().unwrap();

        assert!(!flag.is_initialized());
        assert_eq!(resets.next().await, Some(()));
    });
}

#[test]
fn test_flag_reinitialize_resets_before_resolving() {
    use crate::error::ReadinessError;
    use tokio_stream::StreamExt;

    tokio_test::block_on(async {
        let flag = ReadyFlag::new();

        flag.initialized_successfully().unwrap();

        let mut resets = flag.when_uninitialized();
        let mut ready = flag.when_initialized();

        flag.reinitialize(
            async || {
                assert!(!flag.is_initialized());
                assert_eq!(resets.next().await, Some(()));

                Ok::<_, ReadinessError>(())
            },
            true,
        )
        .await
        .unwrap();

        assert!(ready.next().await.unwrap().is_ok());
        flag.ensure_initialized().await.unwrap();
    });
}

#[test]
fn test_flag_reinitialize_can_leave_failure_unrecorded() {
    use crate::error::ReadinessError;
    use std::time::Duration;

    tokio_test::block_on(async {
        let flag = ReadyFlag::new();

        flag.initialized_successfully().unwrap();

        let result = flag
            .reinitialize(async || Err::<(), _>(ReadinessError::new("boom")), false)
            .await;

        assert!(result.is_err());
        assert!(!flag.is_initialized());

        let pending = tokio::time::timeout(Duration::from_millis(50), flag.ensure_initialized());

        assert!(pending.await.is_err());

        flag.initialized_successfully().unwrap();

        flag.ensure_initialized().await.unwrap();
    });
}
