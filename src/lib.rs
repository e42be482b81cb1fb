//! Core library for guestprep, the preparation step of a multi-host test
//! pipeline.
//!
//! Given connected guests and a list of task records, the crate resolves each
//! record to an implementation, synthesises the implicit tasks (required and
//! recommended packages, multihost wiring), orders everything by priority,
//! and applies each task to every guest it selects. Guests are reached over
//! SSH with rsync for workdir transfer, or run commands locally.

pub mod config;
pub mod guest;
pub mod multihost;
pub mod step;
pub mod task;
pub mod test_support;
pub mod transport;

pub use config::{ConfigError, PrepareConfig};
pub use guest::{
    Environment, Guest, GuestError, GuestProjection, LocalGuest, SshGuest, Stage, StageContext,
};
pub use multihost::{
    HostMapping, MultihostTask, RoleMapping, build_host_mapping, build_role_mapping,
};
pub use step::{
    PackageList, Plan, PrepareError, PrepareStep, PrepareSummary, RequirementSource,
    Requirements, StateStore, StateStoreError, Status, StepState,
};
pub use task::{
    DEFAULT_PRIORITY, METHOD_KEY, NAME_KEY, ON_KEY, PRIORITY_KEY, PRIORITY_MULTIHOST,
    PRIORITY_RECOMMENDS, PRIORITY_REQUIRES, SUMMARY_KEY, Task, TaskConfig, TaskConfigError,
    TaskError, TaskFileError, TaskInstance, TaskMethod, TaskRegistry, load_task_file,
};
pub use transport::{
    CommandOutput, CommandRunner, DEFAULT_SSH_PORT, ProcessCommandRunner, RemoteHost, SshConfig,
    SshConfigLoadError, Transport, TransportError,
};
