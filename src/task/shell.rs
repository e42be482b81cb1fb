//! Arbitrary shell scripts.

use serde_json::{Map, Value, json};
use tracing::info;

use super::config::{TaskConfig, TaskConfigError};
use super::{Task, TaskError, TaskMethod, run_checked};
use crate::guest::{Environment, GuestProjection};

/// Method name.
pub const METHOD: &str = "shell";
/// Key holding the script lines.
pub const SCRIPT_KEY: &str = "script";

/// Runs each configured script on the guest, stopping at the first failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShellTask {
    scripts: Vec<String>,
}

impl ShellTask {
    /// Builds the task from a merged record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskConfigError`] when `script` is not a string or a list
    /// of strings.
    pub fn from_config(config: &TaskConfig) -> Result<Self, TaskConfigError> {
        Ok(Self {
            scripts: config.string_list(SCRIPT_KEY)?,
        })
    }
}

impl Task for ShellTask {
    fn apply(
        &self,
        guest: &GuestProjection<'_>,
        environment: &mut Environment,
    ) -> Result<(), TaskError> {
        for script in &self.scripts {
            info!(guest = guest.name(), script = %script, "run script");
            run_checked(guest, script, environment)?;
        }
        Ok(())
    }
}

fn defaults() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert(String::from(SCRIPT_KEY), json!([]));
    defaults
}

fn build(config: &TaskConfig) -> Result<Box<dyn Task>, TaskConfigError> {
    Ok(Box::new(ShellTask::from_config(config)?))
}

pub(crate) const fn method() -> TaskMethod {
    TaskMethod::new(METHOD, build).with_defaults(defaults)
}
