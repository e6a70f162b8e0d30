use owo_colors::OwoColorize;
use std::fmt;
use time::macros::format_description;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "retone=info";

/// One line per event: `HH:MM:SS LEVEL message key=value`.
///
/// Levels are coloured only when the writer supports ANSI escapes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompactFormatter;

impl CompactFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl<S, N> FormatEvent<S, N> for CompactFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = time::OffsetDateTime::now_local()
            .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();

        let level = *event.metadata().level();
        let label = level_label(level);

        if writer.has_ansi_escapes() {
            write!(writer, "{} ", timestamp.dimmed())?;
            match level {
                Level::ERROR => write!(writer, "{} ", label.red().bold())?,
                Level::WARN => write!(writer, "{} ", label.yellow().bold())?,
                Level::INFO => write!(writer, "{} ", label.green())?,
                Level::DEBUG => write!(writer, "{} ", label.blue())?,
                Level::TRACE => write!(writer, "{} ", label.purple())?,
            }
        } else {
            write!(writer, "{timestamp} {label} ")?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => " WARN",
        Level::INFO => " INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().event_format(CompactFormatter::new()))
        .init();
}
