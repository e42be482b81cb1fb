//! Guest backed by the controller host itself.
//!
//! Used for single-host plans where tests run where the tool runs. The plan
//! workdir is already in place, so push and pull do nothing.

use std::ffi::OsString;

use camino::Utf8Path;
use tracing::debug;

use super::{Environment, Guest, GuestError, StageContext};
use crate::transport::remote_command::build_remote_command;
use crate::transport::{CommandOutput, CommandRunner};

const SHELL: &str = "sh";

/// A guest that executes commands on the local machine.
#[derive(Clone, Debug)]
pub struct LocalGuest<R: CommandRunner> {
    name: String,
    role: Option<String>,
    runner: R,
}

impl<R: CommandRunner> LocalGuest<R> {
    /// Creates a local guest named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: R) -> Self {
        Self {
            name: name.into(),
            role: None,
            runner,
        }
    }

    /// Sets the role tag.
    #[must_use]
    pub fn with_role(mut self, role: Option<String>) -> Self {
        self.role = role.filter(|value| !value.trim().is_empty());
        self
    }
}

impl<R: CommandRunner> Guest for LocalGuest<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    fn address(&self) -> Option<&str> {
        None
    }

    fn push(&self) -> Result<(), GuestError> {
        Ok(())
    }

    fn pull(&self, _path: &Utf8Path) -> Result<(), GuestError> {
        Ok(())
    }

    fn execute(
        &self,
        stage: &StageContext,
        command: &str,
        environment: &Environment,
    ) -> Result<CommandOutput, GuestError> {
        debug!(guest = %self.name, stage = %stage.stage(), command, "execute");
        let wrapped = build_remote_command(stage.workdir(), environment, command);
        self.runner
            .run(SHELL, &[OsString::from("-c"), OsString::from(wrapped)])
            .map_err(|source| GuestError::Transport {
                guest: self.name.clone(),
                source,
            })
    }
}
