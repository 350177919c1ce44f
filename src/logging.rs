use std::fmt;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::types::LogFormat;
use crate::utils::TIMESTAMP_FORMAT;

/// Custom tracing formatter that prepends colored [ALLOW]/[DENY] prefixes
/// to log events based on message content, and colorizes known field names.
pub struct PrefixedFormatter<E> {
    inner: E,
    ansi: bool,
}

impl<E> PrefixedFormatter<E> {
    pub fn new(inner: E, ansi: bool) -> Self {
        Self { inner, ansi }
    }
}

impl<S, N, E> FormatEvent<S, N> for PrefixedFormatter<E>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    E: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let msg_lower = visitor.message.to_lowercase();

        if is_deny_pattern(&msg_lower) {
            if self.ansi {
                write!(writer, "\x1b[31m[DENY]\x1b[0m ")?;
            } else {
                write!(writer, "[DENY] ")?;
            }
        } else if is_allow_pattern(&msg_lower) {
            if self.ansi {
                write!(writer, "\x1b[34m[ALLOW]\x1b[0m ")?;
            } else {
                write!(writer, "[ALLOW] ")?;
            }
        }

        if self.ansi {
            let mut buf = String::new();
            self.inner.format_event(ctx, Writer::new(&mut buf), event)?;
            write!(writer, "{}", colorize_fields(&buf))
        } else {
            self.inner.format_event(ctx, writer, event)
        }
    }
}

/// Colorize known field names in a log line.
/// Uses ANSI codes: cyan=user, magenta=peer, dim=conn_id, green=bytes,
/// red=error.
fn colorize_fields(line: &str) -> String {
    let mut result = line.to_string();
    for (field, color) in FIELD_COLORS {
        let pattern = format!("{}=", field);
        if result.contains(&pattern) {
            let colored = format!("\x1b[{}m{}=\x1b[0m", color, field);
            result = result.replace(&pattern, &colored);
        }
    }
    result
}

/// Field name to ANSI color code mapping.
const FIELD_COLORS: &[(&str, &str)] = &[
    // cyan (36): user identity
    ("user", "36"),
    ("from", "36"),
    ("to", "36"),
    // magenta (35): network addresses
    ("peer", "35"),
    ("addr", "35"),
    // dim (2): correlation
    ("conn_id", "2"),
    // green (32): data transfer
    ("bytes_in", "32"),
    ("bytes_out", "32"),
    ("relayed", "32"),
    ("size", "32"),
    ("duration_ms", "32"),
    // red (31): errors
    ("error", "31"),
];

/// Visitor that extracts the message field from a tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

fn is_deny_pattern(msg: &str) -> bool {
    msg.contains("rejected")
        || msg.contains("aborted")
        || msg.contains("went away")
        || msg.contains("vanished")
        || msg.contains("failed")
}

fn is_allow_pattern(msg: &str) -> bool {
    msg.contains("logged in") || msg.contains("file relayed") || msg.contains("message delivered")
}

/// Destination for formatted log lines, besides stdout.
pub trait LogSink: Send + Sync {
    fn accept(&self, at: DateTime<Local>, line: &str);
}

/// In-memory copy of everything logged since startup, exported by `/LOG`.
///
/// Appends and snapshots are serialized by one mutex; the lock is never held
/// across I/O.
pub struct LogBuffer {
    lines: Mutex<Vec<String>>,
    max_lines: usize,
}

impl LogBuffer {
    /// `max_lines == 0` keeps everything.
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            max_lines,
        }
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.push(line);
        if self.max_lines > 0 && lines.len() > self.max_lines {
            let excess = lines.len() - self.max_lines;
            lines.drain(..excess);
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a snapshot to `<dir>/log_YYYYMMDD_HHMMSS.txt` and return the path.
    pub async fn export(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let mut content = self.snapshot().join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(export_file_name(Local::now()));
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}

impl LogSink for LogBuffer {
    fn accept(&self, at: DateTime<Local>, line: &str) {
        self.push(format!("[{}] {}", at.format(TIMESTAMP_FORMAT), line));
    }
}

pub fn export_file_name(at: DateTime<Local>) -> String {
    format!("log_{}.txt", at.format("%Y%m%d_%H%M%S"))
}

/// Tracing layer that renders each event as
/// `LEVEL span{key=value}: message key=value ...` and hands it to a
/// [`LogSink`].
pub struct LogBufferLayer {
    sink: Arc<dyn LogSink>,
}

impl LogBufferLayer {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

/// Rendered fields of one span, stored in its extensions.
struct SpanFields(String);

impl<S> Layer<S> for LogBufferLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = LineVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = LineVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            fields.0.push_str(&visitor.fields);
        } else {
            extensions.insert(SpanFields(visitor.fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut scope = String::new();
        if let Some(spans) = ctx.event_scope(event) {
            for span in spans.from_root() {
                scope.push_str(span.name());
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    if !fields.0.is_empty() {
                        scope.push('{');
                        scope.push_str(fields.0.trim_start());
                        scope.push('}');
                    }
                }
                scope.push_str(": ");
            }
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = visitor.render(event.metadata().level(), &scope);
        self.sink.accept(Local::now(), &line);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn render(self, level: &Level, scope: &str) -> String {
        format!("{:<5} {}{}{}", level.as_str(), scope, self.message, self.fields)
    }
}

impl tracing::field::Visit for LineVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push_str(&format!(" {}={}", field.name(), value));
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// In Pretty mode, wraps the default formatter with `PrefixedFormatter`
/// to prepend colored [ALLOW]/[DENY] tags and colorize field names.
/// JSON mode is unchanged. When `sink` is set, every event that passes the
/// filter is also copied into it.
pub fn setup_logging(level: &str, format: LogFormat, sink: Option<Arc<dyn LogSink>>) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(sink.map(LogBufferLayer::new));

    match format {
        LogFormat::Json => {
            subscriber
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            let ansi = std::io::stdout().is_terminal();
            let default_format = tracing_subscriber::fmt::format::Format::default();
            subscriber
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(ansi)
                        .event_format(PrefixedFormatter::new(default_format, ansi)),
                )
                .init();
        }
    }
}
