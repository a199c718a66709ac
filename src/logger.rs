//! Tracing subscriber setup.

use std::fs::File;

use anyhow::{anyhow, Context};
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

use crate::configuration::Configuration;

/// Install the global tracing subscriber.
///
/// With `config.log`, everything goes to a timestamped file in the current directory.
/// Otherwise warnings go to stderr, debug events too when verbose.
pub fn init_logger(config: &Configuration) -> anyhow::Result<()> {
    let (writer, level, ansi) = if config.log {
        let file_name = get_log_file_name()?;
        let file = File::create(&file_name)
            .with_context(|| format!("could not create log file '{file_name}'"))?;
        (BoxMakeWriter::new(file), Level::TRACE, false)
    } else {
        let level = if config.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        };
        (BoxMakeWriter::new(std::io::stderr), level, true)
    };

    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(ansi)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).map_err(|e| {
        anyhow!("could not set global default tracing subscriber, one is already set: {e}")
    })
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]_log.txt")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(now.format(&format)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_name_is_timestamped() {
        let name = get_log_file_name().unwrap();
        assert!(name.ends_with("_log.txt"));
        // YYYY-MM-DD_HH:MM:SS_log.txt
        assert_eq!(name.len(), 27);
    }

    #[test]
    fn second_init_is_an_error() {
        let config = Configuration::new().with_verbose(false);
        // another test may have installed one already
        let _ = init_logger(&config);
        assert!(init_logger(&config).is_err());
    }
}
