use std::{error::Error as StdError, sync::Arc};
use thiserror::Error;

/// An arbitrary initialization error, shared so that every waiter and
/// subscriber replays the exact same object.
pub type DynError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// An initialization failure expressed as a plain message rather than an
/// arbitrary error object.
///
/// Stringifies in the fixed format `ReadinessError: {message}`.
///
/// # Example
///
/// ```rust
/// use ready_room::ReadinessError;
///
/// let error = ReadinessError::new("boom");
///
/// assert_eq!(error.message(), "boom");
/// assert_eq!(error.to_string(), "ReadinessError: boom");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("ReadinessError: {0}")]
pub struct ReadinessError(String);

impl ReadinessError {
    /// Creates a new [`ReadinessError`] wrapping `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The wrapped message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// A contract violation raised synchronously by one of the mutating
/// operations. These indicate a bug in the calling code and are never
/// recovered from automatically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The current initialization cycle is already resolved; it cannot be
    /// resolved a second time.
    #[error("already initialized")]
    AlreadyInitialized,

    /// The current initialization cycle is not resolved yet; the instance
    /// cannot be reset from this state.
    #[error("not initialized yet")]
    NotInitializedYet,

    /// An [`ErrorReport`] carried neither an error nor a message.
    #[error("neither an error nor a message was supplied")]
    MissingErrorOrMessage,
}

/// A failure recorded into a readiness signal, replayed verbatim to every
/// waiter and subscriber.
#[derive(Clone, Debug)]
pub struct InitFailure {
    error: DynError,
    trace: Option<String>,
}

impl InitFailure {
    pub(crate) fn new(error: DynError, trace: Option<String>) -> Self {
        Self { error, trace }
    }

    /// The recorded error, exactly as it was supplied.
    #[must_use]
    pub fn error(&self) -> &DynError {
        &self.error
    }

    /// The caller-supplied trace, if one was attached.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Attempts to downcast the recorded error to a concrete type.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ready_room::{ErrorReport, Readiness, ReadinessError};
    ///
    /// # tokio_test::block_on(async {
    /// let readiness = Readiness::<()>::new();
    ///
    /// readiness
    ///     .initialized_with_error(ErrorReport::message("boom"))
    ///     .unwrap();
    ///
    /// let failure = readiness.ensure_initialized().await.unwrap_err();
    ///
    /// assert_eq!(
    ///     failure.downcast_ref::<ReadinessError>().unwrap().message(),
    ///     "boom"
    /// );
    /// # });
    /// ```
    #[must_use]
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }
}

impl std::fmt::Display for InitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl StdError for InitFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

/// Named options describing a failure to record, passed to
/// [`Readiness::initialized_with_error`](crate::Readiness::initialized_with_error).
///
/// Exactly one of [`error`](Self::error) or [`message`](Self::message) should
/// be supplied. Supplying neither is rejected with
/// [`TransitionError::MissingErrorOrMessage`]; when both are supplied, the
/// error wins and the message is dropped.
///
/// # Example
///
/// ```rust
/// use ready_room::ErrorReport;
///
/// let report = ErrorReport::message("boom").with_trace("at sign_in");
///
/// assert!(report.error.is_none());
/// assert_eq!(report.message.as_deref(), Some("boom"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ErrorReport {
    /// An error object to record and replay verbatim, without wrapping.
    pub error: Option<DynError>,

    /// A plain message, wrapped into a [`ReadinessError`] before being
    /// recorded.
    pub message: Option<String>,

    /// An optional trace describing where the failure originated.
    pub trace: Option<String>,
}

impl ErrorReport {
    /// Reports an arbitrary error object, recorded and replayed verbatim.
    pub fn error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::from_arc(Arc::new(error))
    }

    /// Reports an error object that is already shared.
    #[must_use]
    pub fn from_arc(error: DynError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Reports a plain message, wrapped into a [`ReadinessError`].
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attaches a trace describing where the failure originated.
    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    pub(crate) fn into_failure(self) -> Result<InitFailure, TransitionError> {
        match (self.error, self.message) {
            (None, None) => Err(TransitionError::MissingErrorOrMessage),
            // When both are supplied, the error wins and the message is
            // dropped, in every build profile.
            (Some(error), _) => Ok(InitFailure::new(error, self.trace)),
            (None, Some(message)) => Ok(InitFailure::new(
                Arc::new(ReadinessError::new(message)),
                self.trace,
            )),
        }
    }
}

/// The error returned by
/// [`Readiness::reinitialize`](crate::Readiness::reinitialize).
#[derive(Clone, Debug, Error)]
pub enum ReinitializeError {
    /// The instance was not in a state that permits the transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The reinitialization work itself failed. The same error is recorded
    /// into the signal when the call was made with `record_failure` set.
    #[error("{0}")]
    Work(DynError),
}

impl ReinitializeError {
    /// The failed work's error, if that is what went wrong.
    #[must_use]
    pub fn work_error(&self) -> Option<&DynError> {
        match self {
            Self::Work(error) => Some(error),
            Self::Transition(_) => None,
        }
    }
}

#[test]
fn test_readiness_error_format() {
    let error = ReadinessError::new("boom");

    assert_eq!(error.message(), "boom");
    assert_eq!(error.to_string(), "ReadinessError: boom");
}

#[test]
fn test_report_requires_error_or_message() {
    assert_eq!(
        ErrorReport::default().into_failure().unwrap_err(),
        TransitionError::MissingErrorOrMessage
    );
}

#[test]
fn test_report_wraps_message() {
    let failure = ErrorReport::message("boom")
        .with_trace("somewhere")
        .into_failure()
        .unwrap();

    assert_eq!(
        failure.downcast_ref::<ReadinessError>().unwrap().message(),
        "boom"
    );

    assert_eq!(failure.trace(), Some("somewhere"));
}

#[test]
fn test_report_prefers_error_over_message() {
    let error: DynError = Arc::new(ReadinessError::new("object"));

    let report = ErrorReport {
        error: Some(Arc::clone(&error)),
        message: Some(String::from("dropped")),
        trace: None,
    };

    let failure = report.into_failure().unwrap();

    assert!(Arc::ptr_eq(failure.error(), &error));
    assert_eq!(failure.to_string(), "ReadinessError: object");
}
