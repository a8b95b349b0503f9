//! Scoped redirection of the external runtime's output
//!
//! nnU-Net prints a lot. While a [`RedirectGuard`] is alive, the session's stream targets
//! point at the redirect sink and any process launched through the guard writes there.
//! Dropping the guard restores whatever targets were active before, on every exit path.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::output::OutputError;

/// Where one standard stream goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    /// The stream of the parent process
    Inherit,
    /// Discarded
    Null,
    /// A file, appended to or truncated
    File { path: PathBuf, append: bool },
}

/// Current targets of stdout and stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTargets {
    pub stdout: StreamTarget,
    pub stderr: StreamTarget,
}

impl StreamTargets {
    pub fn inherit() -> Self {
        Self::both(StreamTarget::Inherit)
    }

    pub fn both(target: StreamTarget) -> Self {
        Self {
            stdout: target.clone(),
            stderr: target,
        }
    }
}

impl Default for StreamTargets {
    fn default() -> Self {
        Self::inherit()
    }
}

enum Sink {
    Null,
    File(File),
}

/// Active redirection; restores the previous targets when dropped
pub struct RedirectGuard<'a> {
    slot: &'a RefCell<StreamTargets>,
    previous: Option<StreamTargets>,
    sink: Sink,
}

impl<'a> RedirectGuard<'a> {
    /// Open `target` and make it the current destination of both streams
    pub(crate) fn acquire(
        slot: &'a RefCell<StreamTargets>,
        target: StreamTarget,
    ) -> Result<Self, OutputError> {
        let sink = match &target {
            StreamTarget::File { path, append } => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(*append)
                    .truncate(!*append)
                    .open(path)
                    .map_err(|source| OutputError::ResourceUnavailable {
                        path: path.clone(),
                        source,
                    })?;
                Sink::File(file)
            }
            StreamTarget::Null | StreamTarget::Inherit => Sink::Null,
        };

        let previous = slot.replace(StreamTargets::both(target));
        tracing::debug!("Redirected external output to {:?}", slot.borrow().stdout);

        Ok(Self {
            slot,
            previous: Some(previous),
            sink,
        })
    }

    /// The targets in force while this guard is alive
    pub fn targets(&self) -> StreamTargets {
        self.slot.borrow().clone()
    }

    /// Stdio for a child's stdout
    pub fn stdout(&self) -> io::Result<Stdio> {
        self.stdio()
    }

    /// Stdio for a child's stderr
    pub fn stderr(&self) -> io::Result<Stdio> {
        self.stdio()
    }

    /// Point a command's stdout and stderr at the redirect sink
    pub fn attach(&self, command: &mut Command) -> io::Result<()> {
        command.stdout(self.stdout()?).stderr(self.stderr()?);
        Ok(())
    }

    fn stdio(&self) -> io::Result<Stdio> {
        match &self.sink {
            Sink::Null => Ok(Stdio::null()),
            Sink::File(file) => Ok(Stdio::from(file.try_clone()?)),
        }
    }
}

impl Write for RedirectGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Null => Ok(buf.len()),
            Sink::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Null => Ok(()),
            Sink::File(file) => file.flush(),
        }
    }
}

impl Drop for RedirectGuard<'_> {
    fn drop(&mut self) {
        if let Sink::File(file) = &mut self.sink {
            let _ = file.flush();
        }
        if let Some(previous) = self.previous.take() {
            tracing::debug!("Restored external output to {:?}", previous.stdout);
            *self.slot.borrow_mut() = previous;
        }
    }
}
