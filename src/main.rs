//! Binary entry point for the guestprep CLI.

use std::io::{self, Write};
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use guestprep::{
    Guest, LocalGuest, ON_KEY, PackageList, Plan, PrepareConfig, PrepareError, PrepareStep,
    ProcessCommandRunner, RemoteHost, Requirements, SshConfig, SshGuest, TaskConfig, TaskRegistry,
    Transport, load_task_file,
};

mod cli;

use cli::{Cli, PrepareCommand, ShowCommand};

const LOG_ENV: &str = "GUESTPREP_LOG";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("task file error: {0}")]
    Tasks(String),
    #[error("invalid guest '{spec}': {message}")]
    InvalidGuest { spec: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("prepare failed: {0}")]
    Prepare(#[from] PrepareError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Prepare(command) => run_prepare(command),
        Cli::Show(command) => run_show(&command),
    }
}

fn load_config() -> Result<PrepareConfig, CliError> {
    let config =
        PrepareConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    Ok(config)
}

fn load_tasks(flag: Option<&str>, config: &PrepareConfig) -> Result<Vec<TaskConfig>, CliError> {
    match flag.or(config.tasks_file.as_deref()) {
        Some(path) => {
            load_task_file(Utf8Path::new(path)).map_err(|err| CliError::Tasks(err.to_string()))
        }
        None => Ok(Vec::new()),
    }
}

fn run_prepare(command: PrepareCommand) -> Result<(), CliError> {
    let config = load_config()?;
    let workdir = command
        .workdir
        .as_deref()
        .map_or_else(|| config.workdir_path(), Utf8PathBuf::from);
    let tasks = load_tasks(command.tasks.as_deref(), &config)?;
    let specs = command
        .guests
        .iter()
        .map(String::as_str)
        .map(parse_guest_spec)
        .collect::<Result<Vec<_>, _>>()?;

    let mut plan = Plan::new(config.plan_name.clone(), workdir);
    let guests = build_guests(specs, &plan)?;
    let discover = PackageList::requiring(command.requires).recommending(command.recommends);
    let nothing = PackageList::empty();

    let mut step = PrepareStep::new(&plan, tasks, TaskRegistry::with_builtins())
        .with_package_manager(config.package_manager.clone());
    let summary = step.run(
        &mut plan,
        &guests,
        &Requirements::new(&discover, &nothing, &nothing),
    )?;

    let mut stdout = io::stdout();
    writeln!(stdout, "{summary}")?;
    for (key, value) in &plan.environment {
        writeln!(stdout, "{key}={value}")?;
    }
    Ok(())
}

fn run_show(command: &ShowCommand) -> Result<(), CliError> {
    let config = load_config()?;
    let tasks = load_tasks(command.tasks.as_deref(), &config)?;
    let plan = Plan::new(config.plan_name.clone(), config.workdir_path());
    let step = PrepareStep::new(&plan, tasks, TaskRegistry::with_builtins());

    let mut stdout = io::stdout();
    for instance in step.show()? {
        write!(
            stdout,
            "{}\t{}\t{}",
            instance.priority(),
            instance.method(),
            instance.label()
        )?;
        if let Some(selector) = instance.config().get(ON_KEY) {
            write!(stdout, "\ton={selector}")?;
        }
        writeln!(stdout)?;
    }
    Ok(())
}

#[derive(Debug, Default, Eq, PartialEq)]
struct GuestSpec {
    name: String,
    role: Option<String>,
    address: Option<String>,
    port: Option<u16>,
}

fn parse_guest_spec(raw: &str) -> Result<GuestSpec, CliError> {
    let invalid = |message: String| CliError::InvalidGuest {
        spec: raw.to_owned(),
        message,
    };
    let mut spec = GuestSpec::default();
    for field in raw.split(',').filter(|field| !field.trim().is_empty()) {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| invalid(format!("expected key=value, got '{field}'")))?;
        let value = value.trim().to_owned();
        match key.trim() {
            "name" => spec.name = value,
            "role" => spec.role = Some(value).filter(|role| !role.is_empty()),
            "address" => spec.address = Some(value).filter(|address| !address.is_empty()),
            "port" => {
                let port = value
                    .parse::<u16>()
                    .map_err(|err| invalid(format!("port: {err}")))?;
                spec.port = Some(port);
            }
            other => return Err(invalid(format!("unknown key '{other}'"))),
        }
    }
    if spec.name.is_empty() {
        return Err(invalid(String::from("a name is required")));
    }
    Ok(spec)
}

fn build_guests(specs: Vec<GuestSpec>, plan: &Plan) -> Result<Vec<Box<dyn Guest>>, CliError> {
    let mut transport: Option<Transport<ProcessCommandRunner>> = None;
    let mut guests: Vec<Box<dyn Guest>> = Vec::with_capacity(specs.len());
    for spec in specs {
        let Some(address) = spec.address else {
            guests.push(Box::new(
                LocalGuest::new(spec.name, ProcessCommandRunner).with_role(spec.role),
            ));
            continue;
        };

        let shared = match &transport {
            Some(existing) => existing.clone(),
            None => {
                let created = ssh_transport()?;
                transport = Some(created.clone());
                created
            }
        };
        let port = spec.port.unwrap_or_else(|| shared.config().ssh_port);
        let host = RemoteHost::new(address, port);
        guests.push(Box::new(
            SshGuest::new(spec.name, host, plan.workdir.clone(), shared).with_role(spec.role),
        ));
    }
    Ok(guests)
}

fn ssh_transport() -> Result<Transport<ProcessCommandRunner>, CliError> {
    let config =
        SshConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    Transport::with_process_runner(config).map_err(|err| CliError::Transport(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
