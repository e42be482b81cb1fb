//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::{Mutex, MutexGuard};

use crate::guest::{Environment, Guest, GuestError, Stage, StageContext};
use crate::transport::{CommandOutput, CommandRunner, TransportError};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| TransportError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// An operation observed by [`RecordingGuest`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GuestCall {
    /// Workdir pushed to the guest.
    Push,
    /// Path pulled back from the guest.
    Pull(Utf8PathBuf),
    /// Command executed on the guest.
    Execute {
        /// Stage the calling projection was bound to.
        stage: Stage,
        /// Directory the command ran from.
        workdir: Utf8PathBuf,
        /// Command text.
        command: String,
        /// Variables exported to the command.
        environment: Environment,
    },
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<GuestCall>,
    failing_commands: Vec<String>,
    transport_down: bool,
    push_down: bool,
}

/// In-memory guest that records every operation instead of touching a host.
///
/// Clones share their recording, so a test can hand one clone to the code
/// under test and inspect another.
#[derive(Clone, Debug)]
pub struct RecordingGuest {
    name: String,
    role: Option<String>,
    address: Option<String>,
    state: Rc<RefCell<RecordingState>>,
}

impl RecordingGuest {
    /// Creates a guest named `name` with no role and no address.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            role: None,
            address: None,
            state: Rc::default(),
        }
    }

    /// Sets the role tag.
    #[must_use]
    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_owned());
        self
    }

    /// Sets the reported address.
    #[must_use]
    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_owned());
        self
    }

    /// Makes every command containing `fragment` exit with status 1.
    #[must_use]
    pub fn fail_commands_containing(self, fragment: &str) -> Self {
        self.state
            .borrow_mut()
            .failing_commands
            .push(fragment.to_owned());
        self
    }

    /// Makes every command fail to start.
    #[must_use]
    pub fn fail_transport(self) -> Self {
        self.state.borrow_mut().transport_down = true;
        self
    }

    /// Makes [`Guest::push`] fail.
    #[must_use]
    pub fn fail_push(self) -> Self {
        self.state.borrow_mut().push_down = true;
        self
    }

    /// Returns a snapshot of every recorded operation, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GuestCall> {
        self.state.borrow().calls.clone()
    }

    /// Returns the text of every executed command, in order.
    #[must_use]
    pub fn executed_commands(&self) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                GuestCall::Execute { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of pushes and pulls recorded.
    #[must_use]
    pub fn transfers(&self) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| matches!(call, GuestCall::Push | GuestCall::Pull(_)))
            .count()
    }

    fn transport_error(&self, message: &str) -> GuestError {
        GuestError::Transport {
            guest: self.name.clone(),
            source: TransportError::Spawn {
                program: String::from("ssh"),
                message: message.to_owned(),
            },
        }
    }
}

impl Guest for RecordingGuest {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    fn push(&self) -> Result<(), GuestError> {
        let mut state = self.state.borrow_mut();
        if state.push_down {
            return Err(self.transport_error("simulated push failure"));
        }
        state.calls.push(GuestCall::Push);
        Ok(())
    }

    fn pull(&self, path: &Utf8Path) -> Result<(), GuestError> {
        self.state
            .borrow_mut()
            .calls
            .push(GuestCall::Pull(path.to_path_buf()));
        Ok(())
    }

    fn execute(
        &self,
        stage: &StageContext,
        command: &str,
        environment: &Environment,
    ) -> Result<CommandOutput, GuestError> {
        let mut state = self.state.borrow_mut();
        if state.transport_down {
            return Err(self.transport_error("simulated connection failure"));
        }
        state.calls.push(GuestCall::Execute {
            stage: stage.stage(),
            workdir: stage.workdir().to_path_buf(),
            command: command.to_owned(),
            environment: environment.clone(),
        });
        let failing = state
            .failing_commands
            .iter()
            .any(|fragment| command.contains(fragment.as_str()));
        Ok(if failing {
            CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: String::from("simulated failure"),
            }
        } else {
            CommandOutput {
                code: Some(0),
                ..CommandOutput::default()
            }
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
