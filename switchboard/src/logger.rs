//! Logger initialization for the command line

use std::{fmt::Write, io::IsTerminal, str::FromStr};

use jiff::{Zoned, tz::TimeZone};
use logforth::{
    append::{FastraceEvent, Stderr},
    filter::EnvFilter,
    layout::Layout,
};

/// Formats timestamps in UTC, colouring the level on terminals.
#[derive(Debug)]
struct UtcLayout {
    no_color: bool,
}

impl UtcLayout {
    fn new() -> Self {
        Self { no_color: false }
    }

    fn no_color(mut self) -> Self {
        self.no_color = true;
        self
    }
}

impl Layout for UtcLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();
        let now = Zoned::now().with_time_zone(TimeZone::UTC);

        write!(output, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = if self.no_color {
            format!("{:>5}", record.level())
        } else {
            let color = match record.level() {
                log::Level::Error => 31,
                log::Level::Warn => 33,
                log::Level::Info => 32,
                log::Level::Debug => 34,
                log::Level::Trace => 35,
            };

            format!("\x1b[{color}m{:>5}\x1b[0m", record.level())
        };

        write!(output, "{level}  {}", record.args())?;

        Ok(output.into_bytes())
    }
}

fn filter(log_filter: &str) -> EnvFilter {
    EnvFilter::from_str(log_filter).unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter should be valid"))
}

/// Logs go to stderr, so stdout carries only the model output.
/// The filter is a string like "info" or "llm=debug,switchboard=debug".
pub fn init(log_filter: &str) {
    let for_fastrace = log_filter.to_owned();
    let for_stderr = log_filter.to_owned();

    logforth::builder()
        .dispatch(move |d| d.filter(filter(&for_fastrace)).append(FastraceEvent::default()))
        .dispatch(move |d| {
            let layout = if std::io::stderr().is_terminal() {
                UtcLayout::new()
            } else {
                UtcLayout::new().no_color()
            };

            d.filter(filter(&for_stderr)).append(Stderr::default().with_layout(layout))
        })
        .apply();
}
