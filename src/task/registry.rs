//! Resolution of task records to implementations.
//!
//! Methods are registered once at start-up; resolution is a plain lookup by
//! name. Built-ins (`install`, `multihost`, `shell`) are always present.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::config::{DEFAULT_PRIORITY, ON_KEY, PRIORITY_KEY, TaskConfig, TaskConfigError};
use super::selector::{self, SelectorError};
use super::{Task, TaskError, install, shell};
use crate::guest::{Environment, GuestProjection};
use crate::multihost;
use crate::step::PrepareError;

/// Builds a task from a record already merged with method defaults.
pub type TaskFactory = fn(&TaskConfig) -> Result<Box<dyn Task>, TaskConfigError>;

/// A registered task implementation.
#[derive(Clone, Copy, Debug)]
pub struct TaskMethod {
    /// Name matched against the record's `method` key.
    pub name: &'static str,
    /// Priority applied when the record does not set one.
    pub priority: i64,
    /// Values filled in for keys the record omits.
    pub defaults: fn() -> Map<String, Value>,
    /// Constructor for the implementation.
    pub build: TaskFactory,
}

impl TaskMethod {
    /// Describes a method with the default priority and no extra defaults.
    #[must_use]
    pub const fn new(name: &'static str, build: TaskFactory) -> Self {
        Self {
            name,
            priority: DEFAULT_PRIORITY,
            defaults: Map::new,
            build,
        }
    }

    /// Overrides the method's default priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Overrides the method's default values.
    #[must_use]
    pub const fn with_defaults(mut self, defaults: fn() -> Map<String, Value>) -> Self {
        self.defaults = defaults;
        self
    }
}

/// Maps method names to implementations.
#[derive(Clone, Debug, Default)]
pub struct TaskRegistry {
    methods: IndexMap<&'static str, TaskMethod>,
}

impl TaskRegistry {
    /// Creates a registry holding only the built-in methods.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(install::method());
        registry.register(multihost::method());
        registry.register(shell::method());
        registry
    }

    /// Registers `method`, replacing an earlier registration of the same
    /// name.
    pub fn register(&mut self, method: TaskMethod) {
        self.methods.insert(method.name, method);
    }

    /// Names of every registered method, in registration order.
    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }

    /// Resolves `config` into an instance. `position` records declaration
    /// order and breaks priority ties.
    ///
    /// # Errors
    ///
    /// Returns [`PrepareError::UnknownMethod`] when no implementation is
    /// registered for the record's method, or [`PrepareError::InvalidTask`]
    /// when the implementation rejects the record.
    pub fn resolve(
        &self,
        config: &TaskConfig,
        position: usize,
    ) -> Result<TaskInstance, PrepareError> {
        let method_name = config.method().unwrap_or_default();
        let method = self
            .methods
            .get(method_name)
            .ok_or_else(|| PrepareError::UnknownMethod {
                method: method_name.to_owned(),
            })?;

        let mut merged = config.merged_with((method.defaults)());
        let invalid = |source: TaskConfigError| PrepareError::InvalidTask {
            task: config.name().unwrap_or(method.name).to_owned(),
            source,
        };
        let priority = merged.priority().map_err(invalid)?.unwrap_or(method.priority);
        merged = merged.with(PRIORITY_KEY, priority);
        let task = (method.build)(&merged).map_err(invalid)?;

        Ok(TaskInstance {
            label: merged.name().unwrap_or(method.name).to_owned(),
            config: merged,
            priority,
            position,
            task,
        })
    }
}

/// A resolved record bound to its implementation.
#[derive(Debug)]
pub struct TaskInstance {
    label: String,
    config: TaskConfig,
    priority: i64,
    position: usize,
    task: Box<dyn Task>,
}

impl TaskInstance {
    /// Record merged with method defaults and the effective priority.
    #[must_use]
    pub const fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Effective priority; lower runs first.
    #[must_use]
    pub const fn priority(&self) -> i64 {
        self.priority
    }

    /// Declaration position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Label used in logs: the record's name, or its method.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Method name.
    #[must_use]
    pub fn method(&self) -> &str {
        self.config.method().unwrap_or_default()
    }

    /// Whether this task applies to `guest`. Evaluated fresh on every call.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] when the `on` key cannot be evaluated.
    pub fn accepts(&self, guest: &GuestProjection<'_>) -> Result<bool, SelectorError> {
        selector::accepts(self.config.get(ON_KEY), guest)
    }

    /// Applies the task to `guest`.
    ///
    /// # Errors
    ///
    /// Propagates the implementation's [`TaskError`].
    pub fn apply(
        &self,
        guest: &GuestProjection<'_>,
        environment: &mut Environment,
    ) -> Result<(), TaskError> {
        self.task.apply(guest, environment)
    }
}
