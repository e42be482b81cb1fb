//! Errors surfaced by the preparation step.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

use super::state::StateStoreError;
use crate::guest::GuestError;
use crate::task::selector::SelectorError;
use crate::task::{TaskConfigError, TaskError};

/// Fatal failures of a preparation run. Any of these leaves the step in
/// the `todo` state so a retry repeats the whole schedule.
#[derive(Debug, Error)]
pub enum PrepareError {
    /// A record names a method nobody registered.
    #[error("unknown preparation method '{method}'")]
    UnknownMethod {
        /// Method named by the record.
        method: String,
    },
    /// A method rejected its record.
    #[error("invalid preparation task '{task}': {source}")]
    InvalidTask {
        /// Task label.
        task: String,
        /// Rejection reported by the method.
        #[source]
        source: TaskConfigError,
    },
    /// A task failed on a guest.
    #[error("task '{task}' failed on guest {guest}: {source}")]
    TaskApplication {
        /// Task label.
        task: String,
        /// Guest the task was applied to.
        guest: String,
        /// Failure reported by the task.
        #[source]
        source: TaskError,
    },
    /// A task's `on` selector could not be evaluated.
    #[error("cannot evaluate selector of task '{task}' for guest {guest}: {source}")]
    SelectorEvaluation {
        /// Task label.
        task: String,
        /// Guest the selector was evaluated against.
        guest: String,
        /// Reason the selector is invalid.
        #[source]
        source: SelectorError,
    },
    /// The plan data directory could not be created.
    #[error("cannot create data directory {path}: {source}")]
    DataDirectory {
        /// Directory that was being created.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Synchronising the workdir with a guest failed.
    #[error(transparent)]
    Guest(#[from] GuestError),
    /// Step state could not be read or written.
    #[error(transparent)]
    State(#[from] StateStoreError),
}
