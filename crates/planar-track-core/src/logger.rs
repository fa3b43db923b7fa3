//! Minimal stderr logger for tracking sessions.
//!
//! Lines look like `[  12.345s  INFO planar_track::engine] message`. Install
//! it once at startup with [`init_with_level`], or let `PLANAR_TRACK_LOG`
//! pick the level through [`init_from_env`].

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable read by [`init_from_env`].
pub const LOG_LEVEL_ENV: &str = "PLANAR_TRACK_LOG";

struct SessionLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:8.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

/// Install the logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| SessionLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install the logger with the level named in `PLANAR_TRACK_LOG`
/// (`error`, `warn`, `info`, `debug`, `trace`, `off`), falling back to
/// `default` when the variable is unset or unparsable.
pub fn init_from_env(default: LevelFilter) -> Result<(), log::SetLoggerError> {
    let raw = std::env::var(LOG_LEVEL_ENV).ok();
    init_with_level(level_from(raw.as_deref(), default))
}

fn level_from(raw: Option<&str>, default: LevelFilter) -> LevelFilter {
    raw.and_then(|raw| LevelFilter::from_str(raw.trim()).ok())
        .unwrap_or(default)
}

#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("planar_track=info,planar_track_core=info"));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_parsed_case_insensitively() {
        assert_eq!(level_from(Some("debug"), LevelFilter::Warn), LevelFilter::Debug);
        assert_eq!(level_from(Some(" TRACE\n"), LevelFilter::Warn), LevelFilter::Trace);
        assert_eq!(level_from(Some("off"), LevelFilter::Info), LevelFilter::Off);
    }

    #[test]
    fn unset_or_unknown_level_falls_back_to_default() {
        assert_eq!(level_from(None, LevelFilter::Info), LevelFilter::Info);
        assert_eq!(level_from(Some("loud"), LevelFilter::Warn), LevelFilter::Warn);
        assert_eq!(level_from(Some(""), LevelFilter::Error), LevelFilter::Error);
    }

    #[test]
    fn second_install_keeps_the_first_level() {
        init_with_level(LevelFilter::Info).unwrap();
        init_with_level(LevelFilter::Trace).unwrap();
        assert_eq!(log::max_level(), LevelFilter::Info);
        log::info!("logger installed");
    }
}
