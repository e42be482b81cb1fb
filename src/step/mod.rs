//! The preparation step.
//!
//! [`PrepareStep`] owns the explicit task records for a plan, synthesises
//! the implicit ones (required and recommended packages, multihost setup)
//! on every run, orders them by priority, and applies each one to every
//! guest whose selector accepts it. Progress is persisted in the plan
//! workdir so a completed step is not repeated after a restart.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use tracing::{debug, info, warn};

use crate::guest::{Environment, Guest, GuestProjection, Stage, StageContext};
use crate::multihost::{build_host_mapping, build_role_mapping, multihost_config};
use crate::task::install::{self, MISSING_KEY, PACKAGE_KEY, PACKAGE_MANAGER_KEY};
use crate::task::{
    NAME_KEY, PRIORITY_KEY, PRIORITY_RECOMMENDS, PRIORITY_REQUIRES, SUMMARY_KEY, TaskConfig,
    TaskInstance, TaskRegistry,
};

mod error;
mod requirements;
pub mod state;

pub use error::PrepareError;
pub use requirements::{PackageList, RequirementSource, Requirements};
pub use state::{StateStore, StateStoreError, Status, StepState};

const DATA_DIRECTORY: &str = "data";

/// The plan a step belongs to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Plan {
    /// Plan name, used for logging.
    pub name: String,
    /// Root of the plan's durable workdir.
    pub workdir: Utf8PathBuf,
    /// Variables exported to every command run for this plan.
    pub environment: Environment,
}

impl Plan {
    /// Creates a plan rooted at `workdir` with an empty environment.
    #[must_use]
    pub fn new(name: impl Into<String>, workdir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            workdir: workdir.into(),
            environment: Environment::new(),
        }
    }

    /// Directory where tests leave artifacts on the guest.
    #[must_use]
    pub fn data_directory(&self) -> Utf8PathBuf {
        self.workdir.join(DATA_DIRECTORY)
    }
}

/// Outcome reported after a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PrepareSummary {
    /// Number of task applications performed.
    pub applied: usize,
}

impl fmt::Display for PrepareSummary {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.applied == 1 {
            "preparation"
        } else {
            "preparations"
        };
        write!(formatter, "{} {noun} applied", self.applied)
    }
}

/// Orchestrates environment preparation for one plan.
#[derive(Debug)]
pub struct PrepareStep {
    plan_workdir: Utf8PathBuf,
    explicit: Vec<TaskConfig>,
    registry: TaskRegistry,
    package_manager: Option<String>,
    store: StateStore,
    status: Status,
    applied: usize,
    data: Vec<TaskConfig>,
}

impl PrepareStep {
    /// Creates a step for `plan` with its explicit task records.
    #[must_use]
    pub fn new(plan: &Plan, tasks: Vec<TaskConfig>, registry: TaskRegistry) -> Self {
        let directory = StageContext::for_plan(Stage::Prepare, &plan.workdir)
            .workdir()
            .to_path_buf();
        Self {
            plan_workdir: plan.workdir.clone(),
            explicit: tasks,
            registry,
            package_manager: None,
            store: StateStore::new(directory),
            status: Status::NotStarted,
            applied: 0,
            data: Vec::new(),
        }
    }

    /// Package manager written into the synthesised install tasks.
    #[must_use]
    pub fn with_package_manager(mut self, manager: impl Into<String>) -> Self {
        self.package_manager = Some(manager.into());
        self
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Task applications performed by the last successful run.
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.applied
    }

    /// Ordered schedule recorded by the last successful run.
    #[must_use]
    pub fn data(&self) -> &[TaskConfig] {
        &self.data
    }

    /// Explicit records that describe work.
    #[must_use]
    pub fn tasks(&self) -> &[TaskConfig] {
        &self.explicit
    }

    /// Summary of the last successful run.
    #[must_use]
    pub const fn summary(&self) -> PrepareSummary {
        PrepareSummary {
            applied: self.applied,
        }
    }

    /// Location of the persisted state.
    #[must_use]
    pub fn state_path(&self) -> Utf8PathBuf {
        self.store.path()
    }

    /// Validates the explicit records and restores persisted state.
    ///
    /// A step that was completed before keeps its `done` status; anything
    /// else moves to `todo` and is saved.
    ///
    /// # Errors
    ///
    /// Returns [`PrepareError`] when a record cannot be resolved or the
    /// state cannot be read or written.
    pub fn wake(&mut self) -> Result<(), PrepareError> {
        for (position, config) in self.explicit.iter().enumerate() {
            self.registry.resolve(config, position)?;
        }
        let before = self.explicit.len();
        self.explicit.retain(|config| !config.is_placeholder());
        if self.explicit.len() < before {
            debug!(
                dropped = before - self.explicit.len(),
                "ignoring records without task data"
            );
        }

        match self.store.load()? {
            Some(state) if state.status == Status::Done => {
                self.status = Status::Done;
                self.applied = state.applied;
                self.data = state.data;
                debug!(path = %self.store.path(), "prepare wake up complete (already done before)");
            }
            _ => {
                self.status = Status::Todo;
                self.save()?;
            }
        }
        Ok(())
    }

    /// Resolves the explicit records in execution order without running
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`PrepareError`] when a record cannot be resolved.
    pub fn show(&self) -> Result<Vec<TaskInstance>, PrepareError> {
        let mut instances = self
            .explicit
            .iter()
            .filter(|config| !config.is_placeholder())
            .enumerate()
            .map(|(position, config)| self.registry.resolve(config, position))
            .collect::<Result<Vec<_>, _>>()?;
        sort_schedule(&mut instances);
        Ok(instances)
    }

    /// Prepares every guest.
    ///
    /// A step already `done` only reports its summary. Otherwise the
    /// schedule is rebuilt from the explicit records plus tasks synthesised
    /// from `requirements` and `guests`, and applied guest by guest. The
    /// plan environment collects variables exported by the tasks.
    ///
    /// # Errors
    ///
    /// Returns [`PrepareError`] on the first failure; the status stays
    /// `todo` so a retry repeats the whole schedule.
    pub fn run<G: Guest>(
        &mut self,
        plan: &mut Plan,
        guests: &[G],
        requirements: &Requirements<'_>,
    ) -> Result<PrepareSummary, PrepareError> {
        if self.status == Status::NotStarted {
            self.wake()?;
        }
        if self.status == Status::Done {
            info!(plan = %plan.name, status = "done", summary = %self.summary(), "prepare");
            return Ok(self.summary());
        }

        self.applied = 0;
        let schedule = self.schedule(guests, requirements)?;
        let stage = StageContext::for_plan(Stage::Prepare, &plan.workdir);
        let data_directory = plan.data_directory();

        if schedule.is_empty() {
            debug!(plan = %plan.name, "nothing to prepare");
        } else {
            create_data_directory(&data_directory)?;
            for guest in guests {
                self.prepare_guest(
                    guest,
                    &stage,
                    &schedule,
                    &mut plan.environment,
                    &data_directory,
                )?;
            }
        }

        self.status = Status::Done;
        self.data = schedule
            .iter()
            .map(|instance| instance.config().clone())
            .collect();
        self.save()?;
        let summary = self.summary();
        info!(plan = %plan.name, summary = %summary, "prepare");
        Ok(summary)
    }

    fn prepare_guest<G: Guest>(
        &mut self,
        guest: &G,
        stage: &StageContext,
        schedule: &[TaskInstance],
        environment: &mut Environment,
        data_directory: &Utf8Path,
    ) -> Result<(), PrepareError> {
        guest.push()?;
        let projection = GuestProjection::new(guest, stage.clone());
        for instance in schedule {
            let accepted = instance.accepts(&projection).map_err(|source| {
                PrepareError::SelectorEvaluation {
                    task: instance.label().to_owned(),
                    guest: projection.name().to_owned(),
                    source,
                }
            })?;
            if !accepted {
                debug!(guest = projection.name(), task = instance.label(), "not enabled on guest");
                continue;
            }

            info!(
                guest = projection.name(),
                stage = %projection.stage().stage(),
                task = instance.label(),
                method = instance.method(),
                priority = instance.priority(),
                "apply"
            );
            instance
                .apply(&projection, environment)
                .map_err(|source| PrepareError::TaskApplication {
                    task: instance.label().to_owned(),
                    guest: projection.name().to_owned(),
                    source,
                })?;
            self.applied += 1;
        }
        projection.pull(data_directory)?;
        Ok(())
    }

    fn schedule<G: Guest>(
        &self,
        guests: &[G],
        requirements: &Requirements<'_>,
    ) -> Result<Vec<TaskInstance>, PrepareError> {
        let mut configs = self.explicit.clone();

        let requires = requirements.requires();
        if !requires.is_empty() {
            configs.push(
                self.install_config("requires", "Install required packages", requires)
                    .with(PRIORITY_KEY, PRIORITY_REQUIRES),
            );
        }

        let recommends = requirements.recommends();
        if !recommends.is_empty() {
            configs.push(
                self.install_config("recommends", "Install recommended packages", recommends)
                    .with(PRIORITY_KEY, PRIORITY_RECOMMENDS)
                    .with(MISSING_KEY, "skip"),
            );
        }

        if guests.len() > 1 {
            for guest in guests {
                if guest.address().is_none_or(|address| address.trim().is_empty()) {
                    warn!(guest = guest.name(), "guest has no address, omitted from hosts mapping");
                }
            }
            let roles = build_role_mapping(guests);
            let hosts = build_host_mapping(guests);
            configs.push(
                multihost_config(&roles, &hosts)
                    .with(SUMMARY_KEY, "Setup guest for multihost testing"),
            );
        }

        let mut schedule = configs
            .iter()
            .enumerate()
            .map(|(position, config)| self.registry.resolve(config, position))
            .collect::<Result<Vec<_>, _>>()?;
        sort_schedule(&mut schedule);
        Ok(schedule)
    }

    fn install_config(&self, name: &str, summary: &str, packages: Vec<String>) -> TaskConfig {
        let config = TaskConfig::new(install::METHOD)
            .with(NAME_KEY, name)
            .with(SUMMARY_KEY, summary)
            .with(PACKAGE_KEY, packages);
        match &self.package_manager {
            Some(manager) => config.with(PACKAGE_MANAGER_KEY, manager.as_str()),
            None => config,
        }
    }

    fn save(&self) -> Result<(), PrepareError> {
        self.store.save(&StepState {
            status: self.status,
            applied: self.applied,
            data: self.data.clone(),
        })?;
        debug!(plan_workdir = %self.plan_workdir, status = ?self.status, "saved prepare state");
        Ok(())
    }
}

/// Creates the plan data directory so the workdir push carries it to
/// every guest before anything is pulled back from it.
fn create_data_directory(path: &Utf8Path) -> Result<(), PrepareError> {
    Dir::create_ambient_dir_all(path, ambient_authority()).map_err(|source| {
        PrepareError::DataDirectory {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Orders by priority; equal priorities keep declaration order.
fn sort_schedule(schedule: &mut [TaskInstance]) {
    schedule.sort_by_key(|instance| (instance.priority(), instance.position()));
}
