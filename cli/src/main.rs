//! phaseloop - prints which event-loop phase runs each callback.
//!
//! ```text
//! phaseloop [--fetch]
//! phaseloop --help
//! ```
//!
//! Trace lines go to stdout. Diagnostics go to stderr through `tracing` and
//! are filtered by `RUST_LOG` (default `warn`).
//!
//! The event loop owns its own current-thread runtime, so `main` is a plain
//! synchronous function.

use std::env;
use std::io;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use phaseloop_config::{PhaseloopConfig, Settings};
use phaseloop_core::{Clock, DemoOptions, FetchTarget, Stamper, demo};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(io::stderr))
        .with(env_filter)
        .init();
}

#[derive(Debug, Parser)]
#[command(name = "phaseloop", version)]
#[command(about = "Prints a timestamped line from each callback, tagged with the event-loop phase it ran in")]
struct Cli {
    /// Also issue an HTTP GET (PHASELOOP_FETCH_URL or [fetch] url)
    #[arg(long)]
    fetch: bool,

    /// Anything else on the command line; ignored with a warning.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    rest: Vec<String>,
}

impl Cli {
    /// Whether a fetch was asked for. `--fetch` after an unknown argument
    /// lands in `rest` and still counts.
    fn fetch_requested(&self) -> bool {
        let mut fetch = self.fetch;
        for arg in &self.rest {
            if arg == "--fetch" {
                fetch = true;
            } else {
                tracing::warn!("ignoring unknown argument {arg:?}");
            }
        }
        fetch
    }
}

fn demo_options(fetch: bool, settings: Settings) -> Result<DemoOptions> {
    let source_path = env::current_exe().context("failed to locate the running executable")?;
    let fetch = fetch.then(|| FetchTarget {
        url: settings.fetch_url,
        timeout: settings.fetch_timeout,
    });

    Ok(DemoOptions {
        fetch,
        refused_addr: settings.refused_addr,
        listen_addr: settings.listen_addr,
        source_path,
    })
}

fn run() -> Result<()> {
    let clock = Clock::start();
    let fetch = Cli::parse().fetch_requested();

    let config = PhaseloopConfig::load().context("failed to load config")?;
    let settings = Settings::resolve(config.as_ref()).context("invalid configuration")?;
    let options = demo_options(fetch, settings)?;
    tracing::debug!(?options, "starting demo");

    let stamper = Rc::new(Stamper::stdout(clock));
    demo::run(options, &stamper).context("event loop failed")?;
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("phaseloop").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_arguments_means_no_fetch() {
        let parsed = cli(&[]);
        assert!(!parsed.fetch);
        assert!(parsed.rest.is_empty());
        assert!(!parsed.fetch_requested());
    }

    #[test]
    fn fetch_flag_is_recognized_anywhere() {
        assert!(cli(&["--fetch"]).fetch_requested());
        assert!(cli(&["--fetch", "extra"]).fetch_requested());

        let late = cli(&["--verbose", "--fetch"]);
        assert_eq!(late.rest, ["--verbose", "--fetch"]);
        assert!(late.fetch_requested());
    }

    #[test]
    fn unknown_arguments_are_ignored() {
        let parsed = cli(&["--fetchx", "extra", "-q"]);
        assert!(!parsed.fetch);
        assert_eq!(parsed.rest, ["--fetchx", "extra", "-q"]);
        assert!(!parsed.fetch_requested());
    }

    #[test]
    fn help_is_generated() {
        let err = Cli::try_parse_from(["phaseloop", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        let help = err.to_string();
        assert!(help.contains("--fetch"), "{help}");
        assert!(!help.contains("rest"), "{help}");
    }

    #[test]
    fn fetch_target_only_with_flag() {
        let settings = Settings::resolve_with_env(None, None).unwrap();
        let options = demo_options(false, settings.clone()).unwrap();
        assert!(options.fetch.is_none());
        assert_eq!(options.refused_addr, settings.refused_addr);

        let options = demo_options(true, settings.clone()).unwrap();
        let target = options.fetch.unwrap();
        assert_eq!(target.url, settings.fetch_url);
        assert!(options.source_path.exists());
    }
}
