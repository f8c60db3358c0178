//! Phase ordering of the demo's callbacks

use phaseloop_engine::{LoopError, Phase};
use phaseloop_types::Tag;

use crate::common::{count, demo_options, position, run_demo};

#[test]
fn every_line_is_well_formed_and_time_ordered() {
    let source = tempfile::NamedTempFile::new().unwrap();
    let (result, lines) = run_demo(demo_options(source.path()));
    result.unwrap();

    assert_eq!(lines.first().unwrap().label(), "MAIN  : start of script");
    assert!(
        lines
            .windows(2)
            .all(|pair| pair[0].elapsed_ms <= pair[1].elapsed_ms),
        "{lines:#?}"
    );
}

#[test]
fn main_body_finishes_before_any_callback() {
    let source = tempfile::NamedTempFile::new().unwrap();
    let (result, lines) = run_demo(demo_options(source.path()));
    result.unwrap();

    let end = position(&lines, "end of script");
    assert_eq!(end, 2);
    assert!(lines[..=end].iter().all(|line| !line.tag.is_scheduled()));
    assert!(lines[end + 1..].iter().all(|line| line.tag.is_scheduled()));
}

#[test]
fn main_timer_and_immediate_each_run_once() {
    let source = tempfile::NamedTempFile::new().unwrap();
    let (result, lines) = run_demo(demo_options(source.path()));
    result.unwrap();

    assert_eq!(count(&lines, "setTimeout(0) from main"), 1);
    assert_eq!(count(&lines, "setImmediate() from main"), 1);
    assert_eq!(
        lines[position(&lines, "setTimeout(0) from main")].tag.phase(),
        Some(Phase::Timers)
    );
    assert_eq!(
        lines[position(&lines, "setImmediate() from main")].tag.phase(),
        Some(Phase::Check)
    );
}

#[test]
fn io_callback_schedules_run_micro_then_check_then_timers() {
    let source = tempfile::NamedTempFile::new().unwrap();
    let (result, lines) = run_demo(demo_options(source.path()));
    result.unwrap();

    let poll = position(&lines, "fs.readFile callback");
    let micro = position(&lines, "Promise.then after POLL callback");
    let check = position(&lines, "setImmediate scheduled inside POLL callback");
    let timers = position(&lines, "setTimeout(0) scheduled inside POLL callback");

    assert_eq!(micro, poll + 1);
    assert!(micro < check);
    assert!(check < timers);
    assert_eq!(lines[micro].tag, Tag::Micro);
}

#[test]
fn connect_error_lands_in_pending() {
    let source = tempfile::NamedTempFile::new().unwrap();
    let (result, lines) = run_demo(demo_options(source.path()));
    result.unwrap();

    let line = &lines[position(&lines, "TCP connect error")];
    assert_eq!(line.tag.phase(), Some(Phase::Pending));
    assert!(line.message.ends_with("(ECONNREFUSED)"), "{}", line.message);
    assert_eq!(count(&lines, "TCP connect error"), 1);
}

#[test]
fn server_closes_only_after_client() {
    let source = tempfile::NamedTempFile::new().unwrap();
    let (result, lines) = run_demo(demo_options(source.path()));
    result.unwrap();

    let listening = position(&lines, "server listening on port");
    let connect = position(&lines, "client \"connect\"");
    let client_close = position(&lines, "client socket \"close\"");
    let server_close = position(&lines, "server \"close\"");
    let accepted_close = position(&lines, "server socket \"close\" (abrupt destroy)");

    assert!(listening < connect && connect < client_close && client_close < server_close);
    assert!(listening < accepted_close);
    for index in [client_close, server_close, accepted_close] {
        assert_eq!(lines[index].tag.phase(), Some(Phase::Close));
    }
    assert_eq!(lines[connect].tag.phase(), Some(Phase::Poll));
}

#[test]
fn unreadable_source_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing-source");
    let (result, _lines) = run_demo(demo_options(&missing));

    match result {
        Err(LoopError::ReadFile { path, source }) => {
            assert_eq!(path, missing);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected a read error, got {other:?}"),
    }
}
