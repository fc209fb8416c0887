#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

mod error;
mod events;
mod flag;
mod signal;
mod watcher;

pub use error::{
    DynError, ErrorReport, InitFailure, ReadinessError, ReinitializeError, TransitionError,
};
pub use events::{WhenInitialized, WhenUninitialized};
pub use flag::ReadyFlag;
pub use signal::Readiness;
pub use watcher::ReadinessWatcher;
