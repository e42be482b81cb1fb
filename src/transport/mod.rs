//! rsync workdir transfer and SSH command execution for remote guests.
//!
//! [`Transport`] shells out to the system `rsync` and `ssh` binaries through
//! an injectable [`CommandRunner`], so guests can be exercised in tests with
//! scripted outputs instead of real hosts.

use std::ffi::OsString;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use shell_escape::unix::escape;

use crate::guest::Environment;

mod config;
pub(crate) mod remote_command;
mod types;
mod util;

pub use config::{DEFAULT_SSH_PORT, SshConfig, SshConfigLoadError, TransportError};
pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, RemoteHost};
pub use util::expand_tilde;

/// Moves the plan workdir to and from guests and runs commands on them.
#[derive(Clone, Debug)]
pub struct Transport<R: CommandRunner> {
    config: SshConfig,
    runner: R,
}

impl Transport<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(config: SshConfig) -> Result<Self, TransportError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> Transport<R> {
    /// Creates a transport using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] when configuration
    /// validation fails.
    pub fn new(config: SshConfig, runner: R) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Mirrors the local `source` directory to the same `destination` on the
    /// guest, creating the remote directory first.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MissingSource`] when `source` is absent, or
    /// [`TransportError::CommandFailure`] if `rsync` exits non-zero.
    pub fn push(
        &self,
        host: &RemoteHost,
        source: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), TransportError> {
        let args = self.build_push_args(host, source, destination)?;
        self.run_rsync(&args)
    }

    /// Copies the remote `source` directory back into the local
    /// `destination`, creating the latter when needed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the local directory cannot be
    /// created, or [`TransportError::CommandFailure`] if `rsync` exits
    /// non-zero.
    pub fn pull(
        &self,
        host: &RemoteHost,
        source: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), TransportError> {
        Dir::create_ambient_dir_all(destination, ambient_authority()).map_err(|err| {
            TransportError::Io {
                path: destination.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        let args = self.build_pull_args(host, source, destination);
        self.run_rsync(&args)
    }

    /// Executes `command` over SSH from `workdir` with `environment`
    /// exported, returning the remote exit status and output.
    ///
    /// # Errors
    ///
    /// Propagates any failure to spawn the SSH client.
    ///
    /// # Security
    ///
    /// `command` is passed to `sh -c` on the guest verbatim; callers must
    /// quote untrusted input themselves.
    pub fn execute(
        &self,
        host: &RemoteHost,
        workdir: &Utf8Path,
        environment: &Environment,
        command: &str,
    ) -> Result<CommandOutput, TransportError> {
        let wrapped = remote_command::build_remote_command(workdir, environment, command);
        let args = self.build_ssh_args(host, &wrapped);
        self.runner.run(&self.config.ssh_bin, &args)
    }

    fn run_rsync(&self, args: &[OsString]) -> Result<(), TransportError> {
        let output = self.runner.run(&self.config.rsync_bin, args)?;
        if output.is_success() {
            return Ok(());
        }

        Err(TransportError::CommandFailure {
            program: self.config.rsync_bin.clone(),
            status: output.code,
            status_text: output.status_text(),
            stderr: output.stderr,
        })
    }

    fn build_push_args(
        &self,
        host: &RemoteHost,
        source: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<Vec<OsString>, TransportError> {
        if !source.is_dir() {
            return Err(TransportError::MissingSource {
                path: source.to_path_buf(),
            });
        }

        let escaped_destination = escape(destination.as_str().into());
        let mut args = self.common_rsync_args(host);
        args.push(OsString::from("--delete"));
        args.push(OsString::from(format!(
            "--rsync-path=mkdir -p {escaped_destination} && rsync"
        )));
        args.push(OsString::from(format!("{source}/")));
        args.push(OsString::from(format!(
            "{}@{}:{destination}",
            self.config.ssh_user, host.address
        )));
        Ok(args)
    }

    fn build_pull_args(
        &self,
        host: &RemoteHost,
        source: &Utf8Path,
        destination: &Utf8Path,
    ) -> Vec<OsString> {
        let mut args = self.common_rsync_args(host);
        args.push(OsString::from(format!(
            "{}@{}:{source}/",
            self.config.ssh_user, host.address
        )));
        args.push(OsString::from(destination.as_str()));
        args
    }

    fn common_rsync_args(&self, host: &RemoteHost) -> Vec<OsString> {
        vec![
            OsString::from("-az"),
            OsString::from("--rsh"),
            OsString::from(self.build_remote_shell(host.port)),
        ]
    }

    fn build_ssh_args(&self, host: &RemoteHost, remote_command: &str) -> Vec<OsString> {
        let mut args = self.common_ssh_options(host.port);
        args.push(OsString::from(format!(
            "{}@{}",
            self.config.ssh_user, host.address
        )));
        args.push(OsString::from(remote_command));
        args
    }

    fn common_ssh_options(&self, port: u16) -> Vec<OsString> {
        let mut args = vec![OsString::from("-p"), OsString::from(port.to_string())];

        if let Some(ref identity_file) = self.config.ssh_identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args
    }

    fn build_remote_shell(&self, port: u16) -> String {
        let opts = self
            .common_ssh_options(port)
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {}", self.config.ssh_bin, opts)
    }
}

#[cfg(test)]
mod tests;
