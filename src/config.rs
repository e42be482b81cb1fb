//! Configuration loading via `ortho-config`.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::task::install::PackageManager;

/// Run-wide preparation settings derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "GUESTPREP",
    discovery(
        app_name = "guestprep",
        env_var = "GUESTPREP_CONFIG_PATH",
        config_file_name = "guestprep.toml",
        dotfile_name = ".guestprep.toml",
        project_file_name = "guestprep.toml"
    )
)]
pub struct PrepareConfig {
    /// Root of the plan workdir. Step state lives below it.
    #[ortho_config(default = "/var/tmp/guestprep/run".to_owned())]
    pub workdir: String,
    /// Plan name used in log output.
    #[ortho_config(default = "default".to_owned())]
    pub plan_name: String,
    /// Package manager used for synthesised installs.
    #[ortho_config(default = "dnf".to_owned())]
    pub package_manager: String,
    /// JSON file holding the explicit task records.
    pub tasks_file: Option<String>,
}

struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [prepare] in guestprep.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const WORKDIR: FieldMetadata = FieldMetadata::new("plan workdir", "GUESTPREP_WORKDIR", "workdir");
const PLAN_NAME: FieldMetadata =
    FieldMetadata::new("plan name", "GUESTPREP_PLAN_NAME", "plan_name");
const PACKAGE_MANAGER: FieldMetadata = FieldMetadata::new(
    "package manager",
    "GUESTPREP_PACKAGE_MANAGER",
    "package_manager",
);

impl PrepareConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(metadata.missing());
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("guestprep")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages say where a missing
    /// value can be provided.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// or [`ConfigError::Invalid`] when the package manager is unsupported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(&self.workdir, &WORKDIR)?;
        Self::require_field(&self.plan_name, &PLAN_NAME)?;
        Self::require_field(&self.package_manager, &PACKAGE_MANAGER)?;
        self.package_manager
            .parse::<PackageManager>()
            .map_err(|err| {
                ConfigError::Invalid(format!("{}: {}", PACKAGE_MANAGER.env_var, err.message))
            })?;
        Ok(())
    }

    /// Plan workdir as a path.
    #[must_use]
    pub fn workdir_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.workdir.trim())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A value is present but not acceptable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> PrepareConfig {
        PrepareConfig {
            workdir: String::from("/var/tmp/guestprep/run"),
            plan_name: String::from("default"),
            package_manager: String::from("dnf"),
            tasks_file: None,
        }
    }

    #[rstest]
    fn defaults_validate(config: PrepareConfig) {
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.workdir_path(), Utf8PathBuf::from("/var/tmp/guestprep/run"));
    }

    #[rstest]
    #[case::workdir("workdir", "GUESTPREP_WORKDIR")]
    #[case::plan_name("plan_name", "GUESTPREP_PLAN_NAME")]
    #[case::package_manager("package_manager", "GUESTPREP_PACKAGE_MANAGER")]
    fn blank_fields_name_their_source(
        mut config: PrepareConfig,
        #[case] field: &str,
        #[case] env_var: &str,
    ) {
        match field {
            "workdir" => config.workdir = String::from("  "),
            "plan_name" => config.plan_name = String::new(),
            _ => config.package_manager = String::new(),
        }

        let message = match config.validate() {
            Err(ConfigError::MissingField(message)) => message,
            other => panic!("unexpected result: {other:?}"),
        };
        assert!(message.contains(env_var), "message: {message}");
        assert!(message.contains(field), "message: {message}");
    }

    #[rstest]
    fn unsupported_package_manager_is_invalid(config: PrepareConfig) {
        let config = PrepareConfig {
            package_manager: String::from("pacman"),
            ..config
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
