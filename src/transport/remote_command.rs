//! Command wrapping for guest execution.
//!
//! Every command runs from the working directory of the stage the guest is
//! bound to. When the plan environment carries variables they are passed via
//! `env` so names that are not valid shell identifiers (role names such as
//! `db-primary`) still reach the command.

use camino::Utf8Path;
use shell_escape::unix::escape;

use crate::guest::Environment;

/// Builds the shell command line executed on a guest.
///
/// The working directory is created if needed, every environment entry is
/// shell-escaped as a whole `KEY=VALUE` word, and the user command is handed
/// to `sh -c` so redirections and operators keep working.
pub(crate) fn build_remote_command(
    workdir: &Utf8Path,
    environment: &Environment,
    command: &str,
) -> String {
    let escaped_workdir = escape(workdir.as_str().into());
    let prefix = format!("mkdir -p {escaped_workdir} && cd {escaped_workdir} && ");
    if environment.is_empty() {
        return format!("{prefix}{command}");
    }

    let mut rendered = prefix;
    rendered.push_str("env");
    for (key, value) in environment {
        let pair = format!("{key}={value}");
        rendered.push(' ');
        rendered.push_str(escape(pair.into()).as_ref());
    }
    rendered.push_str(" sh -c ");
    rendered.push_str(escape(command.into()).as_ref());
    rendered
}
