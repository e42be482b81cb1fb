//! Durable step state kept in the plan workdir.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskConfig;

const STATE_FILE: &str = "step.json";

/// Lifecycle of the preparation step.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// The step has not been woken yet.
    #[default]
    NotStarted,
    /// Woken, with work outstanding.
    Todo,
    /// Every task was applied.
    Done,
}

/// What gets written after a run and read back on wake.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    /// Step status.
    pub status: Status,
    /// Task applications performed by the last successful run.
    #[serde(default)]
    pub applied: usize,
    /// Full ordered schedule, synthesised tasks included.
    #[serde(default)]
    pub data: Vec<TaskConfig>,
}

/// Errors raised while reading or writing step state.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the stored document is not valid state.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Reads and writes `step.json` inside a step directory.
#[derive(Clone, Debug)]
pub struct StateStore {
    directory: Utf8PathBuf,
}

impl StateStore {
    /// Creates a store rooted at `directory`.
    #[must_use]
    pub fn new(directory: impl Into<Utf8PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Location of the state document.
    #[must_use]
    pub fn path(&self) -> Utf8PathBuf {
        self.directory.join(STATE_FILE)
    }

    /// Loads the stored state, or `None` when nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the document exists but cannot be
    /// read or parsed.
    pub fn load(&self) -> Result<Option<StepState>, StateStoreError> {
        let dir = match Dir::open_ambient_dir(&self.directory, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&self.directory, &err)),
        };
        let contents = match dir.read_to_string(STATE_FILE) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&self.path(), &err)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|err| StateStoreError::Parse {
                path: self.path(),
                message: err.to_string(),
            })
    }

    /// Writes `state`, creating the directory when needed.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::Io`] when the directory or file cannot be
    /// written.
    pub fn save(&self, state: &StepState) -> Result<(), StateStoreError> {
        Dir::create_ambient_dir_all(&self.directory, ambient_authority())
            .map_err(|err| io_error(&self.directory, &err))?;
        let dir = Dir::open_ambient_dir(&self.directory, ambient_authority())
            .map_err(|err| io_error(&self.directory, &err))?;
        let rendered = serde_json::to_string_pretty(state).map_err(|err| StateStoreError::Io {
            path: self.path(),
            message: err.to_string(),
        })?;
        dir.write(STATE_FILE, rendered)
            .map_err(|err| io_error(&self.path(), &err))
    }
}

fn io_error(path: &Utf8Path, err: &io::Error) -> StateStoreError {
    StateStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct StoreFixture {
        _tmp: TempDir,
        store: StateStore,
    }

    #[fixture]
    fn store_fixture() -> StoreFixture {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().join("plan/prepare"))
            .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
        StoreFixture {
            _tmp: tmp,
            store: StateStore::new(root),
        }
    }

    #[rstest]
    fn missing_state_loads_as_none(store_fixture: StoreFixture) {
        let loaded = store_fixture
            .store
            .load()
            .unwrap_or_else(|err| panic!("load: {err}"));
        assert_eq!(loaded, None);
    }

    #[rstest]
    fn saved_state_reads_back(store_fixture: StoreFixture) {
        let state = StepState {
            status: Status::Done,
            applied: 3,
            data: vec![TaskConfig::new("shell").with("script", "true")],
        };

        store_fixture
            .store
            .save(&state)
            .unwrap_or_else(|err| panic!("save: {err}"));
        let loaded = store_fixture
            .store
            .load()
            .unwrap_or_else(|err| panic!("load: {err}"));

        assert_eq!(loaded, Some(state));
    }

    #[rstest]
    fn status_is_stored_in_kebab_case(store_fixture: StoreFixture) {
        store_fixture
            .store
            .save(&StepState {
                status: Status::NotStarted,
                ..StepState::default()
            })
            .unwrap_or_else(|err| panic!("save: {err}"));

        let raw = std::fs::read_to_string(store_fixture.store.path().as_std_path())
            .unwrap_or_else(|err| panic!("read: {err}"));
        assert!(raw.contains("\"not-started\""), "unexpected document: {raw}");
    }

    #[rstest]
    fn corrupt_state_is_a_parse_error(store_fixture: StoreFixture) {
        store_fixture
            .store
            .save(&StepState::default())
            .unwrap_or_else(|err| panic!("save: {err}"));
        std::fs::write(store_fixture.store.path().as_std_path(), "{not json")
            .unwrap_or_else(|err| panic!("write: {err}"));

        let err = store_fixture
            .store
            .load()
            .expect_err("corrupt state should fail");
        assert!(matches!(err, StateStoreError::Parse { .. }));
    }
}
