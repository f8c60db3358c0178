//! The optional HTTP fetch and its `.then` reaction

use std::time::Duration;

use phaseloop_core::{FetchTarget, fetch_text};
use phaseloop_types::Tag;

use crate::common::{MockHttp, closed_port, count, demo_options, position, run_demo};

#[test]
fn fetch_text_reads_the_body() {
    let mock = MockHttp::start();
    mock.mount_csrf("token-123", Duration::ZERO);

    let body = mock.block_on(fetch_text(mock.csrf_url(), None)).unwrap();
    assert_eq!(body, "token-123");
}

#[test]
fn then_reaction_runs_before_its_immediate_and_timer() {
    let mock = MockHttp::start();
    mock.mount_csrf("token", Duration::from_millis(50));
    let source = tempfile::NamedTempFile::new().unwrap();
    let mut options = demo_options(source.path());
    options.fetch = Some(FetchTarget {
        url: mock.csrf_url(),
        timeout: Some(Duration::from_secs(10)),
    });

    let (result, lines) = run_demo(options);
    result.unwrap();

    assert_eq!(lines[1].label(), "INFO  : starting fetch (~1s)…");
    let then = position(&lines, ".then microtask");
    let immediate = position(&lines, "setImmediate inside .then");
    let timer = position(&lines, "setTimeout(0) inside .then");
    assert!(then < immediate && immediate < timer);
    for index in [then, immediate, timer] {
        assert_eq!(lines[index].tag, Tag::Fetch);
    }
    assert_eq!(count(&lines, "error "), 0);
    assert_eq!(lines.len(), 19, "{lines:#?}");
}

#[test]
fn slow_response_times_out_as_error_line() {
    let mock = MockHttp::start();
    mock.mount_csrf("late", Duration::from_secs(5));
    let source = tempfile::NamedTempFile::new().unwrap();
    let mut options = demo_options(source.path());
    options.fetch = Some(FetchTarget {
        url: mock.csrf_url(),
        timeout: Some(Duration::from_millis(200)),
    });

    let (result, lines) = run_demo(options);
    result.unwrap();

    assert_eq!(lines[position(&lines, "error ")].tag, Tag::Fetch);
    assert_eq!(count(&lines, ".then microtask"), 0);
}

#[test]
fn refused_fetch_is_an_error_line_not_a_failure() {
    let source = tempfile::NamedTempFile::new().unwrap();
    let mut options = demo_options(source.path());
    options.fetch = Some(FetchTarget {
        url: url::Url::parse(&format!("http://{}/csrf", closed_port())).unwrap(),
        timeout: None,
    });

    let (result, lines) = run_demo(options);
    result.unwrap();

    assert_eq!(count(&lines, "error "), 1);
    assert_eq!(count(&lines, "end of script"), 1);
}
