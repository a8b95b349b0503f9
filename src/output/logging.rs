//! Session log file
//!
//! Each session owns its own `tracing` dispatcher writing to a single file, so sessions never
//! share handlers through global state. Records look like
//!
//! ```text
//! 2024-03-05 14:02:11,482 INFO     [main.rs:57] Model clin_ct_organs selected
//! ```

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::output::OutputError;

/// Tool name used as the log file prefix
pub const TOOL_NAME: &str = "moosez";

/// Tool version embedded in log file names
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const FILENAME_TIMESTAMP: &str = "%H-%M-%d-%m-%Y";
const RECORD_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// `moosez-v<version>_<HH-MM-DD-MM-YYYY>.log`
pub fn log_file_name(at: &DateTime<Local>) -> String {
    format!(
        "{}-v{}_{}.log",
        TOOL_NAME,
        VERSION,
        at.format(FILENAME_TIMESTAMP)
    )
}

/// Log file receiving the external runtime's own output, next to the session log
pub fn nnunet_log_file_name(at: &DateTime<Local>) -> String {
    format!(
        "{}-v{}_nnUNet_{}.log",
        TOOL_NAME,
        VERSION,
        at.format(FILENAME_TIMESTAMP)
    )
}

/// Line format: timestamp, padded level, `[file:line]`, message
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLineFormat;

#[derive(Default)]
struct RecordVisitor {
    message: String,
    caller_file: Option<String>,
    caller_line: Option<u64>,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "caller_file" => self.caller_file = Some(value.to_string()),
            "message" => self.message = value.to_string(),
            _ => {}
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "caller_line" {
            self.caller_line = Some(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

impl<S, N> FormatEvent<S, N> for LogLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let file = visitor
            .caller_file
            .as_deref()
            .or_else(|| metadata.file())
            .unwrap_or("<unknown>");
        let file = Path::new(file)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(file);
        let line = visitor
            .caller_line
            .or_else(|| metadata.line().map(u64::from))
            .unwrap_or(0);

        writeln!(
            writer,
            "{} {:<8} [{}:{}] {}",
            Local::now().format(RECORD_TIMESTAMP),
            metadata.level().as_str(),
            file,
            line,
            visitor.message
        )
    }
}

/// File-backed logger attached to one session
pub struct SessionLogger {
    dispatch: Dispatch,
    path: PathBuf,
}

impl fmt::Debug for SessionLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLogger")
            .field("path", &self.path)
            .finish()
    }
}

impl SessionLogger {
    /// Create (truncating) the log file at `path` and attach an INFO-level handler to it
    pub fn create(path: PathBuf) -> Result<Self, OutputError> {
        let file = File::create(&path).map_err(|source| OutputError::ResourceUnavailable {
            path: path.clone(),
            source,
        })?;

        let subscriber = tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_max_level(Level::INFO)
            .event_format(LogLineFormat)
            .finish();

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an INFO record attributed to the caller's source location
    #[track_caller]
    pub fn info(&self, text: &str) {
        let caller = std::panic::Location::caller();
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info!(
                caller_file = caller.file(),
                caller_line = caller.line(),
                "{}",
                text
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use regex::Regex;
    use tempfile::TempDir;

    #[test]
    fn test_log_file_names() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 2, 11).unwrap();

        assert_eq!(
            log_file_name(&at),
            format!("moosez-v{}_14-02-05-03-2024.log", VERSION)
        );
        assert_eq!(
            nnunet_log_file_name(&at),
            format!("moosez-v{}_nnUNet_14-02-05-03-2024.log", VERSION)
        );
    }

    #[test]
    fn test_record_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.log");
        let logger = SessionLogger::create(path.clone()).unwrap();

        logger.info("Model clin_ct_organs selected");

        let contents = std::fs::read_to_string(&path).unwrap();
        let pattern = Regex::new(
            r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3} INFO     \[logging\.rs:\d+\] Model clin_ct_organs selected\n$",
        )
        .unwrap();
        assert!(pattern.is_match(&contents), "unexpected record: {:?}", contents);
    }

    #[test]
    fn test_create_in_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("session.log");

        let result = SessionLogger::create(path.clone());

        match result {
            Err(OutputError::ResourceUnavailable { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected ResourceUnavailable, got {:?}", other),
        }
    }
}
