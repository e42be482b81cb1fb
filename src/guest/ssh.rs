//! Guests reached over SSH, with rsync for workdir transfer.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::{Environment, Guest, GuestError, StageContext};
use crate::transport::{CommandOutput, CommandRunner, RemoteHost, Transport, TransportError};

/// A remote guest reachable over SSH.
#[derive(Clone, Debug)]
pub struct SshGuest<R: CommandRunner> {
    name: String,
    role: Option<String>,
    host: RemoteHost,
    plan_workdir: Utf8PathBuf,
    transport: Transport<R>,
}

impl<R: CommandRunner> SshGuest<R> {
    /// Creates a guest named `name` reachable at `host`. `plan_workdir` is
    /// mirrored to the same path on the guest by [`Guest::push`].
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        host: RemoteHost,
        plan_workdir: impl Into<Utf8PathBuf>,
        transport: Transport<R>,
    ) -> Self {
        Self {
            name: name.into(),
            role: None,
            host,
            plan_workdir: plan_workdir.into(),
            transport,
        }
    }

    /// Sets the role tag.
    #[must_use]
    pub fn with_role(mut self, role: Option<String>) -> Self {
        self.role = role.filter(|value| !value.trim().is_empty());
        self
    }

    fn wrap(&self, source: TransportError) -> GuestError {
        GuestError::Transport {
            guest: self.name.clone(),
            source,
        }
    }
}

impl<R: CommandRunner> Guest for SshGuest<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    fn address(&self) -> Option<&str> {
        Some(self.host.address.as_str())
    }

    fn push(&self) -> Result<(), GuestError> {
        debug!(guest = %self.name, workdir = %self.plan_workdir, "push workdir");
        self.transport
            .push(&self.host, &self.plan_workdir, &self.plan_workdir)
            .map_err(|err| self.wrap(err))
    }

    fn pull(&self, path: &Utf8Path) -> Result<(), GuestError> {
        debug!(guest = %self.name, path = %path, "pull artifacts");
        self.transport
            .pull(&self.host, path, path)
            .map_err(|err| self.wrap(err))
    }

    fn execute(
        &self,
        stage: &StageContext,
        command: &str,
        environment: &Environment,
    ) -> Result<CommandOutput, GuestError> {
        debug!(guest = %self.name, stage = %stage.stage(), command, "execute");
        self.transport
            .execute(&self.host, stage.workdir(), environment, command)
            .map_err(|err| self.wrap(err))
    }
}
