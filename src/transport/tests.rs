//! Unit tests for the transport module.

use super::*;
use crate::test_support::{EnvGuard, ScriptedRunner};
use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

/// Asserts validation rejects empty or whitespace values for a given field.
fn assert_validation_rejects_field<F>(mut cfg: SshConfig, field_name: &str, set_field: F)
where
    F: Fn(&mut SshConfig, String),
{
    for invalid in ["", "  "] {
        set_field(&mut cfg, invalid.to_owned());
        let Err(err) = cfg.validate() else {
            panic!("{field_name} '{invalid}' should fail");
        };
        let TransportError::InvalidConfig { ref field } = err else {
            panic!("expected InvalidConfig for {field_name}, got {err:?}");
        };
        assert_eq!(field, field_name, "expected invalid field {field_name}");
    }
}

#[fixture]
fn base_config() -> SshConfig {
    SshConfig {
        rsync_bin: String::from("rsync"),
        ssh_bin: String::from("ssh"),
        ssh_user: String::from("root"),
        ssh_port: DEFAULT_SSH_PORT,
        ssh_batch_mode: true,
        ssh_strict_host_key_checking: false,
        ssh_known_hosts_file: String::from("/dev/null"),
        ssh_identity_file: None,
    }
}

#[fixture]
fn host() -> RemoteHost {
    RemoteHost::new("10.0.0.5", 2222)
}

fn args_as_strings(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

fn temp_source() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .unwrap_or_else(|path| panic!("utf8 path: {}", path.display()));
    (dir, path)
}

#[rstest]
fn ssh_config_validate_accepts_defaults(base_config: SshConfig) {
    assert!(base_config.validate().is_ok());
}

#[rstest]
fn ssh_config_validation_rejects_rsync_bin(base_config: SshConfig) {
    assert_validation_rejects_field(base_config, "rsync_bin", |cfg, val| cfg.rsync_bin = val);
}

#[rstest]
fn ssh_config_validation_rejects_ssh_user(base_config: SshConfig) {
    assert_validation_rejects_field(base_config, "ssh_user", |cfg, val| cfg.ssh_user = val);
}

#[rstest]
fn ssh_config_validation_rejects_blank_identity_file(base_config: SshConfig) {
    assert_validation_rejects_field(base_config, "ssh_identity_file", |cfg, val| {
        cfg.ssh_identity_file = Some(val);
    });
}

#[rstest]
fn ssh_config_validation_rejects_port_zero(base_config: SshConfig) {
    let cfg = SshConfig {
        ssh_port: 0,
        ..base_config
    };
    let err = cfg.validate().expect_err("port zero should be rejected");
    assert!(
        err.to_string().contains("GUESTPREP_SSH_SSH_PORT"),
        "error should name the env var: {err}"
    );
}

#[rstest]
fn push_mirrors_workdir_to_same_remote_path(base_config: SshConfig, host: RemoteHost) {
    let runner = ScriptedRunner::new();
    runner.push_success();
    let transport = Transport::new(base_config, runner.clone()).expect("config should validate");
    let (_tmp, source) = temp_source();

    transport
        .push(&host, &source, &source)
        .expect("push should succeed");

    let invocations = runner.invocations();
    let [invocation] = invocations.as_slice() else {
        panic!("expected a single rsync invocation, got {invocations:?}");
    };
    assert_eq!(invocation.program, "rsync");
    let args = args_as_strings(&invocation.args);
    assert!(args.contains(&String::from("--delete")));
    assert!(args.contains(&format!("{source}/")));
    assert!(args.contains(&format!("root@10.0.0.5:{source}")));
    assert!(
        args.iter()
            .any(|arg| arg.starts_with("--rsync-path=mkdir -p ")),
        "remote directory should be created: {args:?}"
    );
    assert!(
        args.iter().any(|arg| arg.starts_with("ssh -p 2222")),
        "remote shell should carry the port: {args:?}"
    );
}

#[rstest]
fn push_rejects_missing_source(base_config: SshConfig, host: RemoteHost) {
    let transport =
        Transport::new(base_config, ScriptedRunner::new()).expect("config should validate");
    let missing = Utf8PathBuf::from("/definitely/not/here");

    let err = transport
        .push(&host, &missing, &missing)
        .expect_err("missing source should fail");

    assert_eq!(err, TransportError::MissingSource { path: missing });
}

#[rstest]
fn pull_surfaces_rsync_failure(base_config: SshConfig, host: RemoteHost) {
    let runner = ScriptedRunner::new();
    runner.push_failure(23);
    let transport = Transport::new(base_config, runner.clone()).expect("config should validate");
    let (_tmp, destination) = temp_source();
    let target = destination.join("data");

    let err = transport
        .pull(&host, Utf8Path::new("/var/tmp/run/data"), &target)
        .expect_err("rsync failure should surface");

    let TransportError::CommandFailure {
        program, status, ..
    } = err
    else {
        panic!("expected command failure, got {err:?}");
    };
    assert_eq!(program, "rsync");
    assert_eq!(status, Some(23));
    assert!(target.is_dir(), "local destination should be created");
    let args = args_as_strings(&runner.invocations()[0].args);
    assert!(args.contains(&String::from("root@10.0.0.5:/var/tmp/run/data/")));
    assert!(!args.contains(&String::from("--delete")));
}

#[rstest]
fn execute_wraps_command_with_workdir_and_environment(
    base_config: SshConfig,
    host: RemoteHost,
) {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "ok", "");
    let transport = Transport::new(base_config, runner.clone()).expect("config should validate");
    let mut environment = Environment::new();
    environment.insert(String::from("client"), String::from("b"));

    let output = transport
        .execute(&host, Utf8Path::new("/w/prepare"), &environment, "hostname")
        .expect("execute should succeed");

    assert!(output.is_success());
    assert_eq!(output.stdout, "ok");
    let invocation = runner
        .invocations()
        .into_iter()
        .next()
        .expect("ssh invocation");
    assert_eq!(invocation.program, "ssh");
    let args = args_as_strings(&invocation.args);
    assert_eq!(
        args.last().map(String::as_str),
        Some("mkdir -p /w/prepare && cd /w/prepare && env client=b sh -c hostname")
    );
    assert!(args.contains(&String::from("root@10.0.0.5")));
    assert!(args.contains(&String::from("BatchMode=yes")));
}

#[rstest]
#[tokio::test]
async fn identity_file_is_expanded_from_home(base_config: SshConfig, host: RemoteHost) {
    let _guard = EnvGuard::set_vars(&[("HOME", "/home/tester")]).await;
    let cfg = SshConfig {
        ssh_identity_file: Some(String::from("~/.ssh/id_ed25519")),
        ..base_config
    };
    let runner = ScriptedRunner::new();
    runner.push_success();
    let transport = Transport::new(cfg, runner.clone()).expect("config should validate");

    transport
        .execute(&host, Utf8Path::new("/w"), &Environment::new(), "true")
        .expect("execute should succeed");

    let args = args_as_strings(&runner.invocations()[0].args);
    let position = args
        .iter()
        .position(|arg| arg == "-i")
        .expect("identity flag should be present");
    assert_eq!(
        args.get(position + 1).map(String::as_str),
        Some("/home/tester/.ssh/id_ed25519")
    );
}
