// Logging bootstrap, SPEC_FULL.md §B. Built on `fern`'s `colored` and
// `date-based` features (declared at the workspace level), the same stack
// the daemon binaries in this workspace use for their own logs.

use std::path::Path;

use fern::colors::{Color, ColoredLevelConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(s)
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Installs the global logger: a colored terminal sink, plus an optional
/// rolling daily file sink under `logs_dir/filename`. Noisy upstream crates
/// (`reqwest`/`hyper`/`tokio_util`) are capped at `warn` regardless of the
/// requested level, matching how the rest of this workspace quiets them.
pub fn init(level: LogLevel, disable_color: bool, log_file: Option<(&Path, &str)>) -> Result<(), fern::InitError> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            if disable_color {
                out.finish(format_args!("[{now}] [{}] [{}] {message}", record.level(), record.target()))
            } else {
                out.finish(format_args!(
                    "[{now}] [{}] [{}] {message}",
                    colors.color(record.level()),
                    record.target()
                ))
            }
        })
        .level(level.into())
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("tokio_util", log::LevelFilter::Warn)
        .chain(std::io::stdout());

    if let Some((dir, filename)) = log_file {
        std::fs::create_dir_all(dir).map_err(|e| fern::InitError::Io(e))?;
        dispatch = dispatch.chain(fern::DateBased::new(dir.join(filename).to_string_lossy(), "-%Y-%m-%d.log"));
    }

    dispatch.apply()?;
    Ok(())
}
