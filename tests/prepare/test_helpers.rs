//! Shared fixture for preparation scenarios.

use std::cell::RefCell;

use camino::Utf8PathBuf;
use guestprep::test_support::RecordingGuest;
use guestprep::{
    Guest, PackageList, Plan, PrepareError, PrepareStep, PrepareSummary, Requirements, TaskConfig,
    TaskRegistry,
};
use rstest::fixture;
use tempfile::TempDir;

/// Everything a scenario builds up before and after running the step.
pub struct PrepareWorld {
    _tmp: TempDir,
    pub plan: RefCell<Plan>,
    pub guests: RefCell<Vec<RecordingGuest>>,
    pub tasks: RefCell<Vec<TaskConfig>>,
    pub requires: RefCell<Vec<String>>,
    pub step: RefCell<Option<PrepareStep>>,
    pub outcome: RefCell<Option<Result<PrepareSummary, PrepareError>>>,
}

impl PrepareWorld {
    /// Runs the step, creating it on first use so repeated runs share
    /// state.
    pub fn run(&self) {
        let mut slot = self.step.borrow_mut();
        let mut plan = self.plan.borrow_mut();
        let step = slot.get_or_insert_with(|| {
            PrepareStep::new(
                &plan,
                self.tasks.borrow().clone(),
                TaskRegistry::with_builtins(),
            )
        });
        let discover = PackageList::requiring(self.requires.borrow().iter().cloned());
        let empty = PackageList::empty();
        let guests = self.guests.borrow();
        let outcome = step.run(
            &mut plan,
            guests.as_slice(),
            &Requirements::new(&discover, &empty, &empty),
        );
        *self.outcome.borrow_mut() = Some(outcome);
    }

    /// Returns a clone of the guest named `name`.
    pub fn guest(&self, name: &str) -> RecordingGuest {
        self.guests
            .borrow()
            .iter()
            .find(|guest| guest.name() == name)
            .cloned()
            .unwrap_or_else(|| panic!("no guest named {name}"))
    }
}

#[fixture]
pub fn world() -> PrepareWorld {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let workdir = Utf8PathBuf::from_path_buf(tmp.path().join("plan"))
        .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
    PrepareWorld {
        _tmp: tmp,
        plan: RefCell::new(Plan::new("/plans/behaviour", workdir)),
        guests: RefCell::new(Vec::new()),
        tasks: RefCell::new(Vec::new()),
        requires: RefCell::new(Vec::new()),
        step: RefCell::new(None),
        outcome: RefCell::new(None),
    }
}
