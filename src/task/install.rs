//! Package installation.
//!
//! The task builds a single install command for the configured package
//! manager. With `missing = skip` the install is best effort: a failed
//! install is logged and ignored, while transport failures still abort.

use std::str::FromStr;

use serde_json::{Map, Value, json};
use shell_escape::unix::escape;
use tracing::{info, warn};

use super::config::{TaskConfig, TaskConfigError};
use super::{Task, TaskError, TaskMethod, run_checked};
use crate::guest::{Environment, GuestProjection};

/// Method name.
pub const METHOD: &str = "install";
/// Key holding the package names.
pub const PACKAGE_KEY: &str = "package";
/// Key selecting the package manager.
pub const PACKAGE_MANAGER_KEY: &str = "package_manager";
/// Key selecting what happens when packages cannot be installed.
pub const MISSING_KEY: &str = "missing";

/// Package managers the install command can be built for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackageManager {
    /// `dnf`.
    Dnf,
    /// `yum`.
    Yum,
    /// `apt-get`.
    Apt,
}

impl PackageManager {
    fn install_command(self, packages: &[String], skip_missing: bool) -> String {
        let mut command = String::from(match self {
            Self::Dnf => "dnf install -y",
            Self::Yum => "yum install -y",
            Self::Apt => "apt-get install -y",
        });
        if skip_missing && matches!(self, Self::Dnf | Self::Yum) {
            command.push_str(" --skip-broken");
        }
        for package in packages {
            command.push(' ');
            command.push_str(escape(package.as_str().into()).as_ref());
        }
        command
    }
}

impl FromStr for PackageManager {
    type Err = TaskConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "dnf" => Ok(Self::Dnf),
            "yum" => Ok(Self::Yum),
            "apt" | "apt-get" => Ok(Self::Apt),
            other => Err(TaskConfigError::new(
                PACKAGE_MANAGER_KEY,
                format!("unsupported package manager '{other}'"),
            )),
        }
    }
}

/// What to do when packages cannot be installed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Missing {
    /// Fail the task.
    Fail,
    /// Log and continue.
    Skip,
}

impl FromStr for Missing {
    type Err = TaskConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "fail" => Ok(Self::Fail),
            "skip" => Ok(Self::Skip),
            other => Err(TaskConfigError::new(
                MISSING_KEY,
                format!("expected 'fail' or 'skip', got '{other}'"),
            )),
        }
    }
}

/// Installs a list of packages on the guest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstallTask {
    packages: Vec<String>,
    manager: PackageManager,
    missing: Missing,
}

impl InstallTask {
    /// Builds the task from a merged record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskConfigError`] for malformed package lists or unknown
    /// option values.
    pub fn from_config(config: &TaskConfig) -> Result<Self, TaskConfigError> {
        let packages = config
            .string_list(PACKAGE_KEY)?
            .into_iter()
            .map(|package| package.trim().to_owned())
            .filter(|package| !package.is_empty())
            .collect();
        let manager = config
            .get_str(PACKAGE_MANAGER_KEY)
            .unwrap_or("dnf")
            .parse()?;
        let missing = config.get_str(MISSING_KEY).unwrap_or("fail").parse()?;
        Ok(Self {
            packages,
            manager,
            missing,
        })
    }

    /// Packages to install, in declaration order.
    #[must_use]
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Command sent to the guest.
    #[must_use]
    pub fn command(&self) -> String {
        self.manager
            .install_command(&self.packages, self.missing == Missing::Skip)
    }
}

impl Task for InstallTask {
    fn apply(
        &self,
        guest: &GuestProjection<'_>,
        environment: &mut Environment,
    ) -> Result<(), TaskError> {
        if self.packages.is_empty() {
            return Ok(());
        }

        info!(guest = guest.name(), packages = %self.packages.join(" "), "install packages");
        match run_checked(guest, &self.command(), environment) {
            Err(TaskError::CommandFailed { stderr, status_text, .. })
                if self.missing == Missing::Skip =>
            {
                warn!(
                    guest = guest.name(),
                    status = %status_text,
                    stderr = %stderr,
                    "some packages could not be installed, skipping"
                );
                Ok(())
            }
            result => result,
        }
    }
}

fn defaults() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert(String::from(PACKAGE_KEY), json!([]));
    defaults.insert(String::from(MISSING_KEY), json!("fail"));
    defaults
}

fn build(config: &TaskConfig) -> Result<Box<dyn Task>, TaskConfigError> {
    Ok(Box::new(InstallTask::from_config(config)?))
}

pub(crate) const fn method() -> TaskMethod {
    TaskMethod::new(METHOD, build).with_defaults(defaults)
}
