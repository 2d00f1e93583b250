use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::sync::{Arc, Once, OnceLock};

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

use crate::LoggingConfig;

/// One captured tracing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    /// Structured fields other than the message, as `name=value`.
    pub fields: Vec<String>,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.level, self.target, self.message)?;
        for field in &self.fields {
            write!(f, " {field}")?;
        }
        Ok(())
    }
}

/// Bounded history of recent events, kept for bug reports and for hosts that
/// surface adapter activity.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    records: Mutex<VecDeque<LogRecord>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
        }
    }

    pub fn push(&self, record: LogRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Up to `limit` most recent records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<LogRecord> {
        self.recent_matching(limit, |_| true)
    }

    /// Up to `limit` most recent records whose target is `prefix` or nested
    /// under it (`nova.notebook_dap` matches `nova.notebook_dap.bridge`).
    pub fn recent_for_target(&self, prefix: &str, limit: usize) -> Vec<LogRecord> {
        self.recent_matching(limit, |record| target_matches(&record.target, prefix))
    }

    /// Rendered form of [`LogBuffer::recent`].
    pub fn last_lines(&self, limit: usize) -> Vec<String> {
        self.recent(limit).iter().map(ToString::to_string).collect()
    }

    fn recent_matching(&self, limit: usize, keep: impl Fn(&LogRecord) -> bool) -> Vec<LogRecord> {
        let records = self.records.lock();
        let mut recent: Vec<LogRecord> = records
            .iter()
            .rev()
            .filter(|record| keep(record))
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }
}

fn target_matches(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with("::"))
}

/// Layer feeding every enabled event into a [`LogBuffer`].
struct BufferLayer {
    buffer: Arc<LogBuffer>,
}

impl<S: Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        self.buffer.push(LogRecord {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_owned();
        } else {
            self.fields.push(format!("{}={value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }
}

/// Shares one append-mode log file between writers.
struct FileMakeWriter {
    file: Arc<File>,
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = &'a File;

    fn make_writer(&'a self) -> Self::Writer {
        &self.file
    }
}

fn stderr_writer() -> BoxMakeWriter {
    // Test harnesses only capture output written through `print!`/`eprint!`.
    if cfg!(debug_assertions) {
        BoxMakeWriter::new(tracing_subscriber::fmt::writer::TestWriter::with_stderr)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    }
}

fn text_sink(logging: &LoggingConfig, file: Option<Arc<File>>) -> Option<BoxMakeWriter> {
    match (logging.stderr, file) {
        (true, Some(file)) => Some(BoxMakeWriter::new(
            stderr_writer().and(FileMakeWriter { file }),
        )),
        (true, None) => Some(stderr_writer()),
        (false, Some(file)) => Some(BoxMakeWriter::new(FileMakeWriter { file })),
        (false, None) => None,
    }
}

static TRACING_INIT: Once = Once::new();
static GLOBAL_LOG_BUFFER: OnceLock<Arc<LogBuffer>> = OnceLock::new();

/// The process-wide buffer `init_tracing` records into.
///
/// Exists (empty) even if tracing was never initialized.
pub fn global_log_buffer() -> Arc<LogBuffer> {
    GLOBAL_LOG_BUFFER
        .get_or_init(|| Arc::new(LogBuffer::new(LoggingConfig::default_buffer_lines())))
        .clone()
}

/// Install the global `tracing` subscriber.
///
/// Every event passing `logging`'s filter is kept in the global [`LogBuffer`];
/// it is also written as text or JSON to stderr and/or `logging.file` when
/// those are enabled. Only the first call installs anything; later calls
/// return the same buffer.
pub fn init_tracing(logging: &LoggingConfig) -> Arc<LogBuffer> {
    let buffer = GLOBAL_LOG_BUFFER
        .get_or_init(|| Arc::new(LogBuffer::new(logging.buffer_lines)))
        .clone();

    TRACING_INIT.call_once(|| {
        let file = logging.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
                .map(Arc::new)
        });
        let file_open_failed = logging.file.is_some() && file.is_none();

        let text_layer: Option<Box<dyn Layer<_> + Send + Sync>> =
            text_sink(logging, file).map(|writer| {
                if logging.json {
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false)
                        .boxed()
                } else {
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .boxed()
                }
            });

        let subscriber = tracing_subscriber::registry()
            .with(logging.env_filter())
            .with(BufferLayer {
                buffer: buffer.clone(),
            })
            .with(text_layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_open_failed {
            if let Some(path) = logging.file.as_ref() {
                tracing::warn!(
                    target: "nova.config",
                    path = %path.display(),
                    "failed to open log file; file logging is disabled"
                );
            }
        }
    });

    buffer
}
