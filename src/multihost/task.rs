//! The `multihost` task: publishes role membership to the plan environment
//! and teaches every guest the names of its peers.

use serde_json::{Map, Value, json};
use shell_escape::unix::escape;
use tracing::{debug, info};

use super::context::{HostMapping, RoleMapping};
use crate::guest::{Environment, GuestProjection};
use crate::task::{
    NAME_KEY, PRIORITY_KEY, PRIORITY_MULTIHOST, Task, TaskConfig, TaskConfigError, TaskError,
    TaskMethod, run_checked,
};

/// Method name.
pub const METHOD: &str = "multihost";
/// Key holding the role mapping.
pub const ROLES_KEY: &str = "roles";
/// Key holding the host mapping.
pub const HOSTS_KEY: &str = "hosts";

const HOSTS_FILE: &str = "/etc/hosts";

/// Builds the record for a synthesised multihost task.
#[must_use]
pub fn multihost_config(roles: &RoleMapping, hosts: &HostMapping) -> TaskConfig {
    TaskConfig::new(METHOD)
        .with(NAME_KEY, METHOD)
        .with(PRIORITY_KEY, PRIORITY_MULTIHOST)
        .with(ROLES_KEY, json!(roles))
        .with(HOSTS_KEY, json!(hosts))
}

/// Exports roles as plan variables and appends peer addresses to the
/// guest's hosts file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MultihostTask {
    roles: RoleMapping,
    hosts: HostMapping,
}

impl MultihostTask {
    /// Builds the task from a merged record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskConfigError`] when `roles` is not an object of string
    /// lists or `hosts` is not an object of strings.
    pub fn from_config(config: &TaskConfig) -> Result<Self, TaskConfigError> {
        Ok(Self {
            roles: decode(config, ROLES_KEY)?,
            hosts: decode(config, HOSTS_KEY)?,
        })
    }

    /// Bound role mapping.
    #[must_use]
    pub const fn roles(&self) -> &RoleMapping {
        &self.roles
    }

    /// Bound host mapping.
    #[must_use]
    pub const fn hosts(&self) -> &HostMapping {
        &self.hosts
    }
}

fn decode<T>(config: &TaskConfig, key: &str) -> Result<T, TaskConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match config.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|err| TaskConfigError::new(key, err.to_string())),
    }
}

fn hosts_entry_command(address: &str, host: &str) -> String {
    let line = format!("{address} {host}");
    let quoted = escape(line.as_str().into());
    format!("grep -qxF {quoted} {HOSTS_FILE} || echo {quoted} >> {HOSTS_FILE}")
}

impl Task for MultihostTask {
    fn apply(
        &self,
        guest: &GuestProjection<'_>,
        environment: &mut Environment,
    ) -> Result<(), TaskError> {
        for (role, names) in &self.roles {
            environment.insert(role.clone(), names.join(","));
        }
        info!(
            guest = guest.name(),
            roles = self.roles.len(),
            hosts = self.hosts.len(),
            "configure multihost"
        );

        for (host, address) in &self.hosts {
            if address.trim().is_empty() {
                continue;
            }
            debug!(guest = guest.name(), host = %host, address = %address, "add hosts entry");
            run_checked(guest, &hosts_entry_command(address, host), environment)?;
        }
        Ok(())
    }
}

fn defaults() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert(String::from(ROLES_KEY), json!({}));
    defaults.insert(String::from(HOSTS_KEY), json!({}));
    defaults
}

fn build(config: &TaskConfig) -> Result<Box<dyn Task>, TaskConfigError> {
    Ok(Box::new(MultihostTask::from_config(config)?))
}

pub(crate) const fn method() -> TaskMethod {
    TaskMethod::new(METHOD, build)
        .with_priority(PRIORITY_MULTIHOST)
        .with_defaults(defaults)
}
