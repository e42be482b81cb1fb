//! Guest abstraction consumed by the preparation step.
//!
//! A guest is a connected test target owned by whoever provisioned it. The
//! preparation step never creates or destroys guests; it only binds them to
//! its own stage through a [`GuestProjection`].

use camino::Utf8Path;
use indexmap::IndexMap;
use thiserror::Error;

use crate::transport::{CommandOutput, TransportError};

mod local;
mod projection;
mod ssh;

pub use local::LocalGuest;
pub use projection::{GuestProjection, Stage, StageContext};
pub use ssh::SshGuest;

/// Plan-scoped variables exported to every command run on a guest.
pub type Environment = IndexMap<String, String>;

/// Errors raised by guest operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GuestError {
    /// The underlying transport failed.
    #[error("guest {guest}: {source}")]
    Transport {
        /// Name of the guest the operation targeted.
        guest: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },
}

/// A connected test target.
///
/// Implementations share one physical connection between every projection
/// made from them, so all methods take `&self`.
pub trait Guest {
    /// Unique name of the guest within a plan.
    fn name(&self) -> &str;

    /// Role tag used to group guests for multihost coordination.
    fn role(&self) -> Option<&str>;

    /// Reachable network address, if the guest has one.
    fn address(&self) -> Option<&str>;

    /// Synchronises the plan workdir to the guest.
    ///
    /// # Errors
    ///
    /// Returns [`GuestError`] when the transfer fails.
    fn push(&self) -> Result<(), GuestError>;

    /// Copies `path` from the guest back to the same local path.
    ///
    /// # Errors
    ///
    /// Returns [`GuestError`] when the transfer fails.
    fn pull(&self, path: &Utf8Path) -> Result<(), GuestError>;

    /// Runs `command` from the workdir of `stage` with `environment`
    /// exported. A non-zero exit status is reported in the output, not as
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`GuestError`] when the command cannot be started.
    fn execute(
        &self,
        stage: &StageContext,
        command: &str,
        environment: &Environment,
    ) -> Result<CommandOutput, GuestError>;
}

impl<G: Guest + ?Sized> Guest for Box<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn role(&self) -> Option<&str> {
        (**self).role()
    }

    fn address(&self) -> Option<&str> {
        (**self).address()
    }

    fn push(&self) -> Result<(), GuestError> {
        (**self).push()
    }

    fn pull(&self, path: &Utf8Path) -> Result<(), GuestError> {
        (**self).pull(path)
    }

    fn execute(
        &self,
        stage: &StageContext,
        command: &str,
        environment: &Environment,
    ) -> Result<CommandOutput, GuestError> {
        (**self).execute(stage, command, environment)
    }
}
