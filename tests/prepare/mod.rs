//! Preparation step scenarios: fixtures, step definitions, and bindings to
//! `tests/features/prepare.feature`.

mod bdd_steps;
mod scenarios;
mod test_helpers;
