//! Preparation tasks: records, the registry that resolves them, and the
//! built-in implementations.

use std::fmt;

use thiserror::Error;

use crate::guest::{Environment, GuestError, GuestProjection};

mod config;
pub mod install;
mod registry;
pub mod selector;
pub mod shell;

pub use config::{
    DEFAULT_PRIORITY, METHOD_KEY, NAME_KEY, ON_KEY, PRIORITY_KEY, PRIORITY_MULTIHOST,
    PRIORITY_RECOMMENDS, PRIORITY_REQUIRES, SUMMARY_KEY, TaskConfig, TaskConfigError,
    TaskFileError, load_task_file,
};
pub use registry::{TaskInstance, TaskMethod, TaskRegistry};

/// Errors raised while applying a task to a guest.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TaskError {
    /// A command run by the task exited unsuccessfully.
    #[error("command `{command}` exited with status {status_text}: {stderr}")]
    CommandFailed {
        /// Command as sent to the guest.
        command: String,
        /// Exit status, if the command reported one.
        status: Option<i32>,
        /// Human readable exit status.
        status_text: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The guest could not run the command at all.
    #[error(transparent)]
    Guest(#[from] GuestError),
}

/// A unit of preparation work that can be applied to a guest.
pub trait Task: fmt::Debug {
    /// Applies the task to `guest`. `environment` is the plan-scoped
    /// variable set; tasks may extend it for later commands.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] when the guest operation fails.
    fn apply(
        &self,
        guest: &GuestProjection<'_>,
        environment: &mut Environment,
    ) -> Result<(), TaskError>;
}

/// Runs `command` on `guest` and turns a non-zero exit into
/// [`TaskError::CommandFailed`].
pub(crate) fn run_checked(
    guest: &GuestProjection<'_>,
    command: &str,
    environment: &Environment,
) -> Result<(), TaskError> {
    let output = guest.execute(command, environment)?;
    if output.is_success() {
        return Ok(());
    }
    Err(TaskError::CommandFailed {
        command: command.to_owned(),
        status: output.code,
        status_text: output.status_text(),
        stderr: output.stderr.trim().to_owned(),
    })
}
