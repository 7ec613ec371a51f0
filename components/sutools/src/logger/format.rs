//! Line format shared by the file and stream sinks.

// External crates
use chrono::Local;
use serde::Deserialize;
use std::fmt::{self, Write as _};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{FmtContext, FormatEvent, FormatFields, format::Writer},
    registry::LookupSpan,
};

/// Line layout for a file or stream sink.
///
/// The default renders `14:03:59, 412 add INFO message`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogFormat {
    /// chrono `strftime` layout of the timestamp, local time.
    pub time_format: String,
    /// Append `, <milliseconds>` after the timestamp.
    pub millis: bool,
    /// Include the logger name.
    pub name: bool,
    /// Include the level.
    pub level: bool,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self {
            time_format: "%H:%M:%S".to_string(),
            millis: true,
            name: true,
            level: true,
        }
    }
}

impl LogFormat {
    /// Message only, no timestamp, name or level.
    pub fn bare() -> Self {
        Self {
            time_format: String::new(),
            millis: false,
            name: false,
            level: false,
        }
    }

    pub(crate) fn for_logger(&self, logger: &str) -> NamedFormat {
        NamedFormat {
            logger: logger.to_string(),
            format: self.clone(),
        }
    }
}

/// [`FormatEvent`] bound to one named logger.
#[derive(Debug, Clone)]
pub struct NamedFormat {
    logger: String,
    format: LogFormat,
}

impl<S, N> FormatEvent<S, N> for NamedFormat
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
        let mut prefix = Vec::with_capacity(4);

        if !self.format.time_format.is_empty() {
            let now = Local::now();
            let mut stamp = String::new();
            // an invalid strftime layout surfaces as fmt::Error instead of a panic
            write!(stamp, "{}", now.format(&self.format.time_format))?;
            if self.format.millis {
                write!(stamp, ", {}", now.timestamp_subsec_millis())?;
            }
            prefix.push(stamp);
        }
        if self.format.name {
            prefix.push(self.logger.clone());
        }
        if self.format.level {
            prefix.push(event.metadata().level().to_string());
        }

        if !prefix.is_empty() {
            write!(writer, "{} ", prefix.join(" "))?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
