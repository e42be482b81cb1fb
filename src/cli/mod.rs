//! Command-line interface definitions for the `guestprep` binary.
//!
//! The parser structures live here so both the binary and the build script
//! can use them; the latter renders the manual page from them.

use clap::Parser;

/// Top-level CLI for the `guestprep` binary.
#[derive(Debug, Parser)]
#[command(
    name = "guestprep",
    about = "Prepare test guests: install packages, run scripts, and wire up multihost plans",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Apply the preparation schedule to every guest.
    #[command(name = "prepare", about = "Apply the preparation schedule to every guest")]
    Prepare(PrepareCommand),
    /// Print the explicit tasks in the order they would run.
    #[command(name = "show", about = "Print the explicit tasks in execution order")]
    Show(ShowCommand),
}

/// Arguments for the `guestprep prepare` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct PrepareCommand {
    /// Plan workdir; overrides `GUESTPREP_WORKDIR`.
    #[arg(long, value_name = "PATH")]
    pub(crate) workdir: Option<String>,
    /// JSON file holding an array of task records.
    #[arg(long, value_name = "PATH")]
    pub(crate) tasks: Option<String>,
    /// Guest to prepare, as `name=<n>[,role=<r>][,address=<a>][,port=<p>]`.
    ///
    /// Guests with an address are reached over SSH; guests without one run
    /// commands on this machine. Repeat the flag for multihost plans; guests
    /// are prepared in the order given.
    #[arg(long = "guest", value_name = "SPEC", required = true)]
    pub(crate) guests: Vec<String>,
    /// Package every guest must have installed. May be repeated.
    #[arg(long = "require", value_name = "PACKAGE")]
    pub(crate) requires: Vec<String>,
    /// Package to install when available. May be repeated.
    #[arg(long = "recommend", value_name = "PACKAGE")]
    pub(crate) recommends: Vec<String>,
}

/// Arguments for the `guestprep show` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ShowCommand {
    /// JSON file holding an array of task records.
    #[arg(long, value_name = "PATH")]
    pub(crate) tasks: Option<String>,
}
