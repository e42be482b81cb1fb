//! BDD step definitions for the preparation step.

use guestprep::test_support::{GuestCall, RecordingGuest};
use guestprep::{NAME_KEY, ON_KEY, Status, TaskConfig};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::PrepareWorld;

#[given("a guest \"{name}\" with no role")]
fn plain_guest(world: &PrepareWorld, name: String) {
    world.guests.borrow_mut().push(RecordingGuest::new(&name));
}

#[given("a guest \"{name}\" with role \"{role}\"")]
fn guest_with_role(world: &PrepareWorld, name: String, role: String) {
    world
        .guests
        .borrow_mut()
        .push(RecordingGuest::new(&name).with_role(&role));
}

#[given("a guest \"{name}\" where commands containing \"{fragment}\" fail")]
fn failing_guest(world: &PrepareWorld, name: String, fragment: String) {
    world
        .guests
        .borrow_mut()
        .push(RecordingGuest::new(&name).fail_commands_containing(&fragment));
}

#[given("the plan requires package \"{package}\"")]
fn requires_package(world: &PrepareWorld, package: String) {
    world.requires.borrow_mut().push(package);
}

#[given("a shell task \"{script}\" for every guest")]
fn shell_task(world: &PrepareWorld, script: String) {
    world.tasks.borrow_mut().push(
        TaskConfig::new("shell")
            .with(NAME_KEY, script.as_str())
            .with("script", script.as_str()),
    );
}

#[given("a shell task \"{script}\" on \"{selector}\"")]
fn selective_shell_task(world: &PrepareWorld, script: String, selector: String) {
    world.tasks.borrow_mut().push(
        TaskConfig::new("shell")
            .with("script", script.as_str())
            .with(ON_KEY, selector.as_str()),
    );
}

#[when("the preparation runs")]
fn preparation_runs(world: &PrepareWorld) {
    world.run();
}

#[when("the preparation runs again")]
fn preparation_runs_again(world: &PrepareWorld) {
    world.run();
}

#[then("the applied count is {count}")]
fn applied_count(world: &PrepareWorld, count: usize) {
    match world.outcome.borrow().as_ref() {
        Some(Ok(summary)) => assert_eq!(summary.applied, count),
        other => panic!("expected a successful run, got {other:?}"),
    }
}

#[then("the step is done")]
fn step_is_done(world: &PrepareWorld) {
    assert_eq!(step_status(world), Some(Status::Done));
}

#[then("the step is todo")]
fn step_is_todo(world: &PrepareWorld) {
    assert_eq!(step_status(world), Some(Status::Todo));
}

#[then("guest \"{name}\" saw no transfers")]
fn no_transfers(world: &PrepareWorld, name: String) {
    assert_eq!(world.guest(&name).transfers(), 0);
}

#[then("guest \"{name}\" ran \"{command}\"")]
fn guest_ran(world: &PrepareWorld, name: String, command: String) {
    let commands = world.guest(&name).executed_commands();
    assert!(commands.contains(&command), "commands on {name}: {commands:?}");
}

#[then("guest \"{name}\" did not run \"{command}\"")]
fn guest_did_not_run(world: &PrepareWorld, name: String, command: String) {
    let commands = world.guest(&name).executed_commands();
    assert!(!commands.contains(&command), "commands on {name}: {commands:?}");
}

#[then("guest \"{name}\" ran \"{command}\" exactly once")]
fn guest_ran_once(world: &PrepareWorld, name: String, command: String) {
    let runs = world
        .guest(&name)
        .calls()
        .into_iter()
        .filter(|call| matches!(call, GuestCall::Execute { command: ran, .. } if *ran == command))
        .count();
    assert_eq!(runs, 1);
}

#[then("exactly one multihost task is scheduled")]
fn one_multihost_task(world: &PrepareWorld) {
    assert_eq!(multihost_tasks(world), 1);
}

#[then("no multihost task is scheduled")]
fn no_multihost_task(world: &PrepareWorld) {
    assert_eq!(multihost_tasks(world), 0);
}

#[then("the environment maps \"{key}\" to \"{value}\"")]
fn environment_maps(world: &PrepareWorld, key: String, value: String) {
    let plan = world.plan.borrow();
    assert_eq!(plan.environment.get(&key), Some(&value));
}

#[then("the preparation fails mentioning \"{fragment}\"")]
fn preparation_fails(world: &PrepareWorld, fragment: String) {
    match world.outcome.borrow().as_ref() {
        Some(Err(err)) => {
            let message = err.to_string();
            assert!(message.contains(&fragment), "unexpected error: {message}");
        }
        other => panic!("expected a failed run, got {other:?}"),
    }
}

fn step_status(world: &PrepareWorld) -> Option<Status> {
    world.step.borrow().as_ref().map(guestprep::PrepareStep::status)
}

fn multihost_tasks(world: &PrepareWorld) -> usize {
    world.step.borrow().as_ref().map_or(0, |step| {
        step.data()
            .iter()
            .filter(|config| config.method() == Some("multihost"))
            .count()
    })
}
