//! Logging setup for the `log` facade with an `env_logger` backend.
//!
//! The filter comes from, in priority order:
//!
//! 1. `MAILDEDUP_LOG`, then `RUST_LOG` (env_logger filter syntax)
//! 2. `--quiet` (errors only) or `-v`/`-vv` (debug/trace)
//! 3. info
//!
//! Verbosity flags only raise the level of maildedup itself; the mail parser
//! and the other dependencies stay at warn so `-vv` shows one line per
//! message and nothing else.
//!
//! Stage transitions log at info, rejected mails and sets at warn, and
//! per-message details at debug and trace.

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "MAILDEDUP_LOG";

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Initialize the logging subsystem based on CLI verbosity flags.
///
/// # Arguments
///
/// * `verbose` - Verbosity count from CLI (0=normal, 1=debug, 2+=trace)
/// * `quiet` - If true, only show errors (overridden by the environment)
///
/// # Panics
///
/// Panics if called more than once, as `env_logger` can only be
/// initialized once per process.
pub fn init_logging(verbose: u8, quiet: bool) {
    let env_filter = env_filter();
    let mut builder = Builder::new();

    let (own, dependencies) = levels(verbose, quiet);
    match &env_filter {
        Some((_, spec)) => {
            builder.parse_filters(spec);
        }
        None => {
            builder
                .filter_level(dependencies)
                .filter_module(CRATE_TARGET, own);
        }
    }
    configure_format(&mut builder, verbose);
    builder.init();

    match env_filter {
        Some((var, spec)) => log::debug!("Log filter from {var}: {spec}"),
        None => log::debug!("Logging at {own} for maildedup, {dependencies} for dependencies"),
    }
}

fn env_filter() -> Option<(&'static str, String)> {
    [LOG_ENV, "RUST_LOG"].into_iter().find_map(|var| {
        env::var(var)
            .ok()
            .filter(|spec| !spec.trim().is_empty())
            .map(|spec| (var, spec))
    })
}

/// Levels for maildedup and for its dependencies.
fn levels(verbose: u8, quiet: bool) -> (LevelFilter, LevelFilter) {
    if quiet {
        return (LevelFilter::Error, LevelFilter::Error);
    }
    let own = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    (own, LevelFilter::Warn)
}

/// Module path relative to the crate, `-` for the crate root.
fn short_target(target: &str) -> &str {
    match target.strip_prefix(CRATE_TARGET) {
        Some("") => "-",
        Some(rest) => rest.strip_prefix("::").unwrap_or(rest),
        None => target,
    }
}

fn configure_format(builder: &mut Builder, verbose: u8) {
    builder.format(move |buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);

        if cfg!(debug_assertions) {
            let timestamp = buf.timestamp_seconds();
            write!(buf, "{timestamp} ")?;
        }
        write!(buf, "{style}{level:<5}{style:#} ")?;
        if verbose >= 1 {
            write!(buf, "[{}] ", short_target(record.target()))?;
        }
        writeln!(buf, "{}", record.args())
    });
}
