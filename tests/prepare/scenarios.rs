//! BDD scenarios for the preparation step.

use rstest_bdd_macros::scenario;

use super::test_helpers::{PrepareWorld, world};

#[scenario(
    path = "tests/features/prepare.feature",
    name = "Nothing to prepare on a single guest"
)]
fn scenario_empty_schedule(world: PrepareWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/prepare.feature",
    name = "Multihost roles are exported to the plan"
)]
fn scenario_multihost_roles(world: PrepareWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/prepare.feature",
    name = "Required packages install once without multihost"
)]
fn scenario_required_packages(world: PrepareWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/prepare.feature",
    name = "A selector limits a task to its role"
)]
fn scenario_selector(world: PrepareWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/prepare.feature",
    name = "A completed step is not repeated"
)]
fn scenario_idempotent(world: PrepareWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/prepare.feature",
    name = "A failing task leaves the step pending"
)]
fn scenario_failure(world: PrepareWorld) {
    drop(world);
}
