// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic log output of the listener itself.
//!
//! Lines are prefixed with `LA` so they can be told apart from the host
//! application's own output on stderr:
//!
//! ```text
//! LA | WARN | log_analytics_listener::config | Error when reading instance metadata: ...
//! LA | ERROR | trace_event_store::store | Error on uploading logs, dropping 100 events: ...
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::error::IngestionError;

/// Environment variable holding the diagnostic log level.
pub const LOG_LEVEL_ENV: &str = "LA_LOG_LEVEL";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Formats events as `LA | LEVEL | target | [spans:] message fields`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(
            &mut writer,
            "LA | {} | {} | ",
            metadata.level(),
            metadata.target()
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Directive list for `level`, with the HTTP stack silenced.
pub fn env_filter_directives(level: &str) -> String {
    format!("h2=off,hyper=off,rustls=off,{}", level.to_lowercase())
}

/// Reads the level from `LA_LOG_LEVEL`, falling back to `info`.
pub fn log_level_from_env() -> String {
    std::env::var(LOG_LEVEL_ENV)
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

/// Installs the global subscriber writing to stderr.
pub fn init_logging(level: &str) -> Result<(), IngestionError> {
    let filter = EnvFilter::try_new(env_filter_directives(level)).map_err(|e| {
        IngestionError::InvalidConfig(format!("could not parse log level '{level}': {e}"))
    })?;

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| IngestionError::InvalidConfig(format!("setting default subscriber failed: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::{info, info_span, warn};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(captured.clone())
            .event_format(Formatter)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_format_plain_event() {
        let output = capture(|| info!("Trace listener initialized"));
        assert_eq!(
            output,
            "LA | INFO | log_analytics_listener::logger::tests | Trace listener initialized\n"
        );
    }

    #[test]
    fn test_format_with_span_and_fields() {
        let output = capture(|| {
            let span = info_span!("upload", batch = 100);
            let _guard = span.enter();
            warn!(status = 503, "Retrying");
        });
        assert!(output.starts_with("LA | WARN | log_analytics_listener::logger::tests | upload{"));
        assert!(output.contains("}: Retrying"));
        assert!(output.contains("503"));
    }

    #[test]
    fn test_env_filter_directives() {
        assert_eq!(
            env_filter_directives("DEBUG"),
            "h2=off,hyper=off,rustls=off,debug"
        );
        assert!(EnvFilter::try_new(env_filter_directives("warn")).is_ok());
    }
}
