//! Raw task-configuration records.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Key selecting the task implementation.
pub const METHOD_KEY: &str = "method";
/// Key holding the ordering priority.
pub const PRIORITY_KEY: &str = "priority";
/// Key holding the optional human label.
pub const NAME_KEY: &str = "name";
/// Key holding the optional one-line description.
pub const SUMMARY_KEY: &str = "summary";
/// Key holding the optional guest selector.
pub const ON_KEY: &str = "on";

/// Priority used when neither the record nor its method sets one.
pub const DEFAULT_PRIORITY: i64 = 50;
/// Priority of the synthesised required-package installation.
pub const PRIORITY_REQUIRES: i64 = 70;
/// Priority of the synthesised recommended-package installation.
pub const PRIORITY_RECOMMENDS: i64 = 75;
/// Priority of the synthesised multihost setup.
pub const PRIORITY_MULTIHOST: i64 = 65;

/// Rejection of a configuration value by a task method.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid value for '{key}': {message}")]
pub struct TaskConfigError {
    /// Offending key.
    pub key: String,
    /// What was wrong with it.
    pub message: String,
}

impl TaskConfigError {
    /// Creates an error for `key`.
    #[must_use]
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while reading task records from disk.
#[derive(Debug, Error)]
pub enum TaskFileError {
    /// The file could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// File path.
        path: String,
        /// Operating system error string.
        message: String,
    },
    /// The file is not a JSON array of objects.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File path.
        path: String,
        /// Parser error message.
        message: String,
    },
}

/// An unordered mapping of keys to values describing one task.
///
/// Key order is preserved so persisted records read back the way they were
/// declared.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskConfig(Map<String, Value>);

impl TaskConfig {
    /// Starts a record for `method`.
    #[must_use]
    pub fn new(method: &str) -> Self {
        let mut map = Map::new();
        map.insert(String::from(METHOD_KEY), Value::from(method));
        Self(map)
    }

    /// Sets `key` to `value`, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_owned(), value.into());
        self
    }

    /// Returns the raw value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `key` when it holds a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Method name, if present.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.get_str(METHOD_KEY)
    }

    /// Optional label.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get_str(NAME_KEY)
    }

    /// Reads the priority, if one is set.
    ///
    /// # Errors
    ///
    /// Returns [`TaskConfigError`] when the value is not an integer.
    pub fn priority(&self) -> Result<Option<i64>, TaskConfigError> {
        match self.0.get(PRIORITY_KEY) {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| TaskConfigError::new(PRIORITY_KEY, "expected an integer")),
        }
    }

    /// Reads `key` as a list of strings. A single string is a one-element
    /// list and an absent key or `null` is an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`TaskConfigError`] for any other shape.
    pub fn string_list(&self, key: &str) -> Result<Vec<String>, TaskConfigError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(single)) => Ok(vec![single.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_owned).ok_or_else(|| {
                        TaskConfigError::new(key, "expected a list of strings")
                    })
                })
                .collect(),
            Some(_) => Err(TaskConfigError::new(
                key,
                "expected a string or a list of strings",
            )),
        }
    }

    /// Returns a copy where every key missing from `self` is taken from
    /// `defaults`. Keys already present keep their values.
    #[must_use]
    pub fn merged_with(&self, defaults: Map<String, Value>) -> Self {
        let mut merged = self.0.clone();
        for (key, value) in defaults {
            merged.entry(key).or_insert(value);
        }
        Self(merged)
    }

    /// Whether the record describes no work: nothing beyond the method,
    /// label, and priority.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0
            .keys()
            .all(|key| matches!(key.as_str(), METHOD_KEY | NAME_KEY | PRIORITY_KEY))
    }
}

impl From<Map<String, Value>> for TaskConfig {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Reads a JSON array of task records from `path`.
///
/// # Errors
///
/// Returns [`TaskFileError`] when the file cannot be read or parsed.
pub fn load_task_file(path: &Utf8Path) -> Result<Vec<TaskConfig>, TaskFileError> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| TaskFileError::Io {
        path: path.to_string(),
        message: String::from("path is missing a filename"),
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| TaskFileError::Io {
        path: parent.to_string(),
        message: err.to_string(),
    })?;
    let contents = dir
        .read_to_string(file_name)
        .map_err(|err| TaskFileError::Io {
            path: path.to_string(),
            message: err.to_string(),
        })?;

    serde_json::from_str(&contents).map_err(|err| TaskFileError::Parse {
        path: path.to_string(),
        message: err.to_string(),
    })
}
