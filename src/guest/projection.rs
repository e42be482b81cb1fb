//! Stage-bound views of a shared guest connection.
//!
//! A guest is created by the provisioning stage, but commands run during
//! preparation must resolve their working directory and logging scope
//! against the preparation stage. [`GuestProjection`] borrows the guest and
//! owns a separate [`StageContext`], so rebinding one projection can never
//! leak into the original guest or into another projection.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use super::{Environment, Guest, GuestError};
use crate::transport::CommandOutput;

/// Pipeline stages a guest can be bound to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Test discovery.
    Discover,
    /// Guest provisioning.
    Provision,
    /// Environment preparation.
    Prepare,
    /// Test execution.
    Execute,
    /// Result reporting.
    Report,
    /// Cleanup.
    Finish,
}

impl Stage {
    /// Directory name used for the stage inside the plan workdir.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Provision => "provision",
            Self::Prepare => "prepare",
            Self::Execute => "execute",
            Self::Report => "report",
            Self::Finish => "finish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// The stage a guest handle currently resolves paths and logging against.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StageContext {
    stage: Stage,
    workdir: Utf8PathBuf,
}

impl StageContext {
    /// Binds `stage` to its directory inside `plan_workdir`.
    #[must_use]
    pub fn for_plan(stage: Stage, plan_workdir: &Utf8Path) -> Self {
        Self {
            stage,
            workdir: plan_workdir.join(stage.as_str()),
        }
    }

    /// Stage identifier.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Working directory commands run from.
    #[must_use]
    pub fn workdir(&self) -> &Utf8Path {
        &self.workdir
    }
}

/// A guest bound to a specific stage.
///
/// Name, role, address, and the connection itself are shared with the
/// original guest; only the stage context is owned.
#[derive(Clone)]
pub struct GuestProjection<'g> {
    guest: &'g dyn Guest,
    stage: StageContext,
}

impl<'g> GuestProjection<'g> {
    /// Projects `guest` onto `stage`.
    #[must_use]
    pub fn new(guest: &'g dyn Guest, stage: StageContext) -> Self {
        Self { guest, stage }
    }

    /// Returns a new projection of the same guest bound to `stage`; the
    /// receiver keeps its own context.
    #[must_use]
    pub fn rebind(&self, stage: StageContext) -> Self {
        Self {
            guest: self.guest,
            stage,
        }
    }

    /// Stage this projection is bound to.
    #[must_use]
    pub const fn stage(&self) -> &StageContext {
        &self.stage
    }

    /// Name of the underlying guest.
    #[must_use]
    pub fn name(&self) -> &str {
        self.guest.name()
    }

    /// Role of the underlying guest.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.guest.role()
    }

    /// Address of the underlying guest.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.guest.address()
    }

    /// Runs `command` from this projection's stage workdir.
    ///
    /// # Errors
    ///
    /// Returns [`GuestError`] when the command cannot be started.
    pub fn execute(
        &self,
        command: &str,
        environment: &Environment,
    ) -> Result<CommandOutput, GuestError> {
        self.guest.execute(&self.stage, command, environment)
    }

    /// Pulls `path` back from the guest.
    ///
    /// # Errors
    ///
    /// Returns [`GuestError`] when the transfer fails.
    pub fn pull(&self, path: &Utf8Path) -> Result<(), GuestError> {
        self.guest.pull(path)
    }
}

impl fmt::Debug for GuestProjection<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GuestProjection")
            .field("guest", &self.guest.name())
            .field("role", &self.guest.role())
            .field("stage", &self.stage)
            .finish()
    }
}
