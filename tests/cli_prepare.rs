//! End-to-end tests for `guestprep prepare` and `guestprep show` with local
//! guests.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Sandbox {
    tmp: TempDir,
    workdir: PathBuf,
    tasks: PathBuf,
}

impl Sandbox {
    fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("guestprep");
        cmd.current_dir(self.tmp.path())
            .env("HOME", self.tmp.path())
            .env("XDG_CONFIG_HOME", self.tmp.path().join(".config"))
            .env_remove("GUESTPREP_CONFIG_PATH")
            .env_remove("GUESTPREP_WORKDIR")
            .env_remove("GUESTPREP_TASKS_FILE")
            .env("GUESTPREP_LOG", "warn");
        cmd
    }

    fn write_tasks(&self, contents: &str) {
        fs::write(&self.tasks, contents).unwrap_or_else(|err| panic!("write tasks: {err}"));
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[fixture]
fn sandbox() -> Sandbox {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let workdir = tmp.path().join("plan");
    let tasks = tmp.path().join("tasks.json");
    Sandbox {
        tmp,
        workdir,
        tasks,
    }
}

#[rstest]
fn prepare_runs_shell_task_once(sandbox: Sandbox) {
    sandbox.write_tasks(
        r#"[{"method": "shell", "name": "greet", "script": "echo hi > greeting"}]"#,
    );
    let args = [
        String::from("prepare"),
        String::from("--workdir"),
        path_arg(&sandbox.workdir),
        String::from("--tasks"),
        path_arg(&sandbox.tasks),
        String::from("--guest"),
        String::from("name=local"),
    ];

    sandbox
        .command()
        .args(&args)
        .assert()
        .success()
        .stdout(contains("1 preparation applied"));

    let greeting = sandbox.workdir.join("prepare").join("greeting");
    assert_eq!(
        fs::read_to_string(&greeting).unwrap_or_else(|err| panic!("read greeting: {err}")),
        "hi\n"
    );
    let state = fs::read_to_string(sandbox.workdir.join("prepare").join("step.json"))
        .unwrap_or_else(|err| panic!("read state: {err}"));
    assert!(state.contains("\"done\""), "unexpected state: {state}");

    fs::remove_file(&greeting).unwrap_or_else(|err| panic!("remove greeting: {err}"));
    sandbox
        .command()
        .args(&args)
        .assert()
        .success()
        .stdout(contains("1 preparation applied"));
    assert!(!greeting.exists(), "completed step must not run again");
}

#[rstest]
fn prepare_exports_roles_for_multihost_plans(sandbox: Sandbox) {
    sandbox
        .command()
        .args([
            "prepare",
            "--workdir",
            path_arg(&sandbox.workdir).as_str(),
            "--guest",
            "name=a,role=server",
            "--guest",
            "name=b,role=client",
        ])
        .assert()
        .success()
        .stdout(contains("2 preparations applied"))
        .stdout(contains("server=a"))
        .stdout(contains("client=b"));
}

#[rstest]
fn failing_task_exits_non_zero(sandbox: Sandbox) {
    sandbox.write_tasks(r#"[{"method": "shell", "name": "broken", "script": "exit 3"}]"#);

    sandbox
        .command()
        .args([
            "prepare",
            "--workdir",
            path_arg(&sandbox.workdir).as_str(),
            "--tasks",
            path_arg(&sandbox.tasks).as_str(),
            "--guest",
            "name=local",
        ])
        .assert()
        .code(1)
        .stderr(contains("task 'broken' failed on guest local"));

    let state = fs::read_to_string(sandbox.workdir.join("prepare").join("step.json"))
        .unwrap_or_else(|err| panic!("read state: {err}"));
    assert!(state.contains("\"todo\""), "unexpected state: {state}");
}

#[rstest]
fn unknown_method_is_reported(sandbox: Sandbox) {
    sandbox.write_tasks(r#"[{"method": "ansible", "playbook": "site.yml"}]"#);

    sandbox
        .command()
        .args([
            "prepare",
            "--workdir",
            path_arg(&sandbox.workdir).as_str(),
            "--tasks",
            path_arg(&sandbox.tasks).as_str(),
            "--guest",
            "name=local",
        ])
        .assert()
        .code(1)
        .stderr(contains("unknown preparation method 'ansible'"));
}

#[rstest]
fn invalid_guest_spec_is_rejected(sandbox: Sandbox) {
    sandbox
        .command()
        .args([
            "prepare",
            "--workdir",
            path_arg(&sandbox.workdir).as_str(),
            "--guest",
            "role=server",
        ])
        .assert()
        .code(1)
        .stderr(contains("a name is required"));
}

#[rstest]
fn show_lists_tasks_by_priority(sandbox: Sandbox) {
    sandbox.write_tasks(
        r#"[
            {"method": "shell", "name": "late", "priority": 80, "script": "true"},
            {"method": "install", "name": "tools", "package": ["git"], "on": "server"}
        ]"#,
    );

    sandbox
        .command()
        .args(["show", "--tasks", path_arg(&sandbox.tasks).as_str()])
        .assert()
        .success()
        .stdout(contains("50\tinstall\ttools\ton=\"server\"\n80\tshell\tlate"));
}
