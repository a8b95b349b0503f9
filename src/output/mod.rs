//! Managed output
//!
//! [`OutputManager`] is the single owner of everything a run shows or records: console text,
//! tables, progress displays, the spinner, the optional session log file and the redirect
//! target for the external runtime's own output. Callers never touch a console or logger
//! directly.
//!
//! A session is created once at startup and passed by reference. It is not `Sync`; a
//! multi-threaded host must serialize access or give every worker its own session.

use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;

pub mod banner;
pub mod console;
pub mod logging;
pub mod progress;
pub mod redirect;
pub mod spinner;
pub mod table;

pub use console::{Console, Line, Renderable, Span, Text};
pub use logging::{log_file_name, nnunet_log_file_name, SessionLogger, TOOL_NAME, VERSION};
pub use progress::{Progress, ProgressColumn, TaskId};
pub use redirect::{RedirectGuard, StreamTarget, StreamTargets};
pub use spinner::Spinner;
pub use table::Table;

/// Errors raised by the output layer
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Resource unavailable: {}: {source}", path.display())]
    ResourceUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Console, spinner, log file and redirect state for one run
pub struct OutputManager {
    verbose_console: bool,
    verbose_log: bool,
    console: Console,
    spinner: Spinner,
    logger: Option<SessionLogger>,
    nnunet_log_path: Option<PathBuf>,
    redirect: RefCell<StreamTargets>,
}

impl OutputManager {
    /// Session printing to stdout
    pub fn new(verbose_console: bool, verbose_log: bool) -> Self {
        Self::from_console(
            Console::stdout(!verbose_console),
            verbose_console,
            verbose_log,
        )
    }

    /// Session printing to `writer` instead of stdout
    pub fn with_writer<W: Write + Send + 'static>(
        writer: W,
        verbose_console: bool,
        verbose_log: bool,
    ) -> Self {
        Self::from_console(
            Console::with_writer(writer, !verbose_console),
            verbose_console,
            verbose_log,
        )
    }

    fn from_console(console: Console, verbose_console: bool, verbose_log: bool) -> Self {
        Self {
            verbose_console,
            verbose_log,
            spinner: Spinner::new(console.clone(), verbose_console),
            console,
            logger: None,
            nnunet_log_path: None,
            redirect: RefCell::new(StreamTargets::inherit()),
        }
    }

    pub fn verbose_console(&self) -> bool {
        self.verbose_console
    }

    pub fn verbose_log(&self) -> bool {
        self.verbose_log
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Print text (ANSI styling is re-rendered) or any renderable such as a [`Table`]
    pub fn console_update<R: Renderable + ?Sized>(&self, content: &R) {
        if self.verbose_console {
            self.console.print(content);
        }
    }

    /// Table with the given headers and optional per-column style tags
    pub fn create_table(
        &self,
        headers: &[&str],
        styles: Option<&[&str]>,
    ) -> Result<Table, OutputError> {
        Table::new(headers, styles)
    }

    pub fn create_progress_bar(&self) -> Progress {
        Progress::generic(self.console.clone())
    }

    /// Progress display with size, speed and time-remaining columns for downloads
    pub fn create_file_progress_bar(&self) -> Progress {
        Progress::file_transfer(self.console.clone())
    }

    /// Attach the session log file.
    ///
    /// Does nothing when file logging is off or a logger already exists. The directory
    /// defaults to the current working directory and must already exist.
    pub fn configure_logging(&mut self, directory: Option<&Path>) -> Result<(), OutputError> {
        if !self.verbose_log || self.logger.is_some() {
            return Ok(());
        }

        let directory = match directory {
            Some(directory) => directory.to_path_buf(),
            None => std::env::current_dir().map_err(|source| {
                OutputError::ResourceUnavailable {
                    path: PathBuf::from("."),
                    source,
                }
            })?,
        };

        let now = Local::now();
        let logger = SessionLogger::create(directory.join(log_file_name(&now)))?;
        tracing::info!("Session log: {}", logger.path().display());

        self.nnunet_log_path = Some(directory.join(nnunet_log_file_name(&now)));
        self.logger = Some(logger);
        Ok(())
    }

    pub fn is_logging_configured(&self) -> bool {
        self.logger.is_some()
    }

    pub fn log_file_path(&self) -> Option<&Path> {
        self.logger.as_ref().map(SessionLogger::path)
    }

    /// File receiving the external runtime's output in verbose-log mode
    pub fn nnunet_log_path(&self) -> Option<&Path> {
        self.nnunet_log_path.as_deref()
    }

    /// Append an INFO record; no-op unless logging is enabled and configured
    #[track_caller]
    pub fn log_update(&self, text: &str) {
        if !self.verbose_log {
            return;
        }
        if let Some(logger) = &self.logger {
            logger.info(text);
        }
    }

    pub fn spinner_start(&self, text: Option<&str>) {
        self.spinner.start(text);
    }

    pub fn spinner_update(&self, text: Option<&str>) {
        self.spinner.update(text);
    }

    pub fn spinner_succeed(&self, text: Option<&str>) {
        self.spinner.succeed(text);
    }

    pub fn spinner_stop(&self) {
        self.spinner.stop();
    }

    /// Targets the external runtime's stdout/stderr currently go to
    pub fn stream_targets(&self) -> StreamTargets {
        self.redirect.borrow().clone()
    }

    fn redirect_target(&self) -> StreamTarget {
        match (&self.nnunet_log_path, self.verbose_log) {
            (Some(path), true) => StreamTarget::File {
                path: path.clone(),
                append: true,
            },
            _ => StreamTarget::Null,
        }
    }

    /// Redirect the external runtime's output until the returned guard is dropped.
    ///
    /// Output goes to the nnU-Net log file (appended) when file logging is configured and
    /// to the null sink otherwise.
    pub fn manage_nnunet_output(&self) -> Result<RedirectGuard<'_>, OutputError> {
        RedirectGuard::acquire(&self.redirect, self.redirect_target())
    }

    /// Run `f` inside [`manage_nnunet_output`](Self::manage_nnunet_output). Targets are
    /// restored before `f`'s result, error or panic leaves this call.
    pub fn with_nnunet_output<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut RedirectGuard<'_>) -> Result<T, E>,
        E: From<OutputError>,
    {
        let mut guard = self.manage_nnunet_output()?;
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::console::testing::SharedBuffer;
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use tempfile::TempDir;

    fn quiet_manager(verbose_log: bool) -> (OutputManager, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (
            OutputManager::with_writer(buffer.clone(), false, verbose_log),
            buffer,
        )
    }

    fn log_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[test]
    fn test_console_update_respects_verbosity() {
        let (manager, buffer) = quiet_manager(false);
        manager.console_update("hidden");
        let table = manager.create_table(&["a"], None).unwrap();
        manager.console_update(&table);
        manager.spinner_start(Some("hidden"));
        manager.spinner_succeed(None);
        manager.display_logo();
        assert!(buffer.is_empty());

        let buffer = SharedBuffer::default();
        let manager = OutputManager::with_writer(buffer.clone(), true, false);
        manager.console_update("\x1b[32m shown\x1b[0m");
        assert_eq!(buffer.contents(), " shown\n");
    }

    #[test]
    fn test_create_table_length_mismatch() {
        let (manager, _) = quiet_manager(false);
        let result = manager.create_table(&["a", "b"], Some(&["red"][..]));
        assert!(matches!(result, Err(OutputError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_configure_logging_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let (mut manager, _) = quiet_manager(true);

        manager.configure_logging(Some(temp_dir.path())).unwrap();
        let first = manager.log_file_path().unwrap().to_path_buf();
        manager.configure_logging(Some(temp_dir.path())).unwrap();
        manager.configure_logging(None).unwrap();

        assert_eq!(manager.log_file_path().unwrap(), first.as_path());
        assert_eq!(log_files(temp_dir.path()), vec![first.clone()]);

        manager.log_update("one record");
        let contents = std::fs::read_to_string(&first).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("one record"));
    }

    #[test]
    fn test_configure_logging_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let (mut manager, _) = quiet_manager(false);

        manager.configure_logging(Some(temp_dir.path())).unwrap();
        manager.log_update("dropped");

        assert!(!manager.is_logging_configured());
        assert!(log_files(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_log_update_before_configuration_is_noop() {
        let (manager, _) = quiet_manager(true);
        manager.log_update("nowhere to go");
        assert!(manager.log_file_path().is_none());
    }

    #[test]
    fn test_configure_logging_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let (mut manager, _) = quiet_manager(true);

        let result = manager.configure_logging(Some(temp_dir.path().join("absent").as_path()));

        assert!(matches!(result, Err(OutputError::ResourceUnavailable { .. })));
        assert!(!manager.is_logging_configured());
    }

    #[test]
    fn test_log_file_name_embeds_version() {
        let temp_dir = TempDir::new().unwrap();
        let (mut manager, _) = quiet_manager(true);
        manager.configure_logging(Some(temp_dir.path())).unwrap();

        let name = manager
            .log_file_path()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .unwrap()
            .to_string();
        assert!(name.starts_with(&format!("moosez-v{}_", VERSION)));
        assert!(name.ends_with(".log"));
        assert!(manager
            .nnunet_log_path()
            .unwrap()
            .to_string_lossy()
            .contains("_nnUNet_"));
    }

    #[test]
    fn test_quiet_redirect_goes_to_null() {
        let (manager, _) = quiet_manager(false);
        {
            let guard = manager.manage_nnunet_output().unwrap();
            assert_eq!(guard.targets(), StreamTargets::both(StreamTarget::Null));
            assert_eq!(manager.stream_targets(), StreamTargets::both(StreamTarget::Null));
        }
        assert_eq!(manager.stream_targets(), StreamTargets::inherit());
    }

    #[test]
    fn test_verbose_redirect_appends_to_nnunet_log() {
        let temp_dir = TempDir::new().unwrap();
        let (mut manager, _) = quiet_manager(true);
        manager.configure_logging(Some(temp_dir.path())).unwrap();

        manager
            .with_nnunet_output(|sink| -> Result<(), OutputError> {
                writeln!(sink, "first").unwrap();
                Ok(())
            })
            .unwrap();
        manager
            .with_nnunet_output(|sink| -> Result<(), OutputError> {
                writeln!(sink, "second").unwrap();
                Ok(())
            })
            .unwrap();

        let path = manager.nnunet_log_path().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "first\nsecond\n");
        assert_eq!(manager.stream_targets(), StreamTargets::inherit());
    }

    #[derive(Debug)]
    enum PredictError {
        Output,
        Crashed,
    }

    impl From<OutputError> for PredictError {
        fn from(_: OutputError) -> Self {
            PredictError::Output
        }
    }

    #[test]
    fn test_redirect_restored_after_error() {
        let (manager, _) = quiet_manager(false);

        let result: Result<(), PredictError> = manager.with_nnunet_output(|_| {
            assert_eq!(manager.stream_targets(), StreamTargets::both(StreamTarget::Null));
            Err(PredictError::Crashed)
        });

        assert!(matches!(result, Err(PredictError::Crashed)));
        assert_eq!(manager.stream_targets(), StreamTargets::inherit());
    }

    #[test]
    fn test_redirect_restored_after_panic() {
        let (manager, _) = quiet_manager(false);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _guard = manager.manage_nnunet_output().unwrap();
            panic!("runtime crashed");
        }));

        assert!(outcome.is_err());
        assert_eq!(manager.stream_targets(), StreamTargets::inherit());
    }

    #[test]
    fn test_progress_bars_follow_console_verbosity() {
        let (manager, buffer) = quiet_manager(false);
        let mut progress = manager.create_file_progress_bar();
        let id = progress.add_task("clin_ct_organs", Some(10));
        progress.update(id, 10);
        progress.stop();
        assert!(buffer.is_empty());

        let buffer = SharedBuffer::default();
        let manager = OutputManager::with_writer(buffer.clone(), true, false);
        let mut progress = manager.create_progress_bar();
        progress.add_task("models", Some(1));
        progress.stop();
        assert!(buffer.contents().starts_with("models "));
    }
}
