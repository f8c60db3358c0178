//! End-to-end runs of the `phaseloop` binary

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};
use std::time::Duration;

use phaseloop_config::{CONFIG_PATH_ENV, FETCH_URL_ENV};
use phaseloop_types::{Tag, TraceLine};

use crate::common::{MockHttp, closed_port, count, parse_trace};

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        "[network]\nrefused_host = \"127.0.0.1\"\nrefused_port = {}",
        closed_port().port()
    )
    .unwrap();
    path
}

fn phaseloop(config: &Path, args: &[&str], fetch_url: Option<&str>) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_phaseloop"));
    command
        .args(args)
        .env(CONFIG_PATH_ENV, config)
        .env_remove("RUST_LOG")
        .env_remove(FETCH_URL_ENV);
    if let Some(url) = fetch_url {
        command.env(FETCH_URL_ENV, url);
    }
    command.output().unwrap()
}

#[test]
fn prints_a_parseable_trace() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = phaseloop(&config, &[], None);
    assert!(output.status.success(), "{output:?}");

    let lines = parse_trace(&String::from_utf8(output.stdout).unwrap());
    assert_eq!(lines.len(), 15, "{lines:#?}");
    assert_eq!(lines[0].label(), "MAIN  : start of script");
    assert_eq!(count(&lines, "fs.readFile callback"), 1);
    assert!(lines.iter().all(|line| line.tag != Tag::Fetch), "{lines:#?}");
    assert_eq!(count(&lines, "starting fetch"), 0);
    assert_eq!(
        count(&lines, "TCP connect error (likely in Pending Callbacks) (ECONNREFUSED)"),
        1
    );
}

#[test]
fn fetch_flag_uses_env_url() {
    let mock = MockHttp::start();
    mock.mount_csrf("ok", Duration::ZERO);
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = phaseloop(&config, &["--fetch"], Some(mock.csrf_url().as_str()));
    assert!(output.status.success(), "{output:?}");

    let lines = parse_trace(&String::from_utf8(output.stdout).unwrap());
    assert_eq!(count(&lines, ".then microtask"), 1);
    assert_eq!(count(&lines, "starting fetch"), 1);
}

#[test]
fn unknown_arguments_warn_on_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = phaseloop(&config, &["--bogus", "extra"], None);
    assert!(output.status.success(), "{output:?}");
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("ignoring unknown argument \"--bogus\""), "{stderr}");
    assert!(stderr.contains("ignoring unknown argument \"extra\""), "{stderr}");
    let lines = parse_trace(&String::from_utf8(output.stdout).unwrap());
    assert_eq!(lines.len(), 15);
    assert_eq!(count(&lines, "starting fetch"), 0);
}

#[test]
fn invalid_fetch_url_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = phaseloop(&config, &[], Some("not a url"));
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("invalid configuration"), "{stderr}");
}

#[test]
fn help_prints_usage_only() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = phaseloop(&config, &["--help"], None);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Usage: phaseloop"), "{stdout}");
    assert!(stdout.contains("--fetch"), "{stdout}");
    assert!(TraceLine::parse(stdout.lines().next().unwrap()).is_err());
}

#[test]
fn malformed_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[network\nrefused_port = ").unwrap();

    let output = phaseloop(&config, &[], None);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("failed to load config"), "{stderr}");
}
