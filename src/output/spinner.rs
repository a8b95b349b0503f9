//! Transient progress spinner
//!
//! On a terminal the spinner animates on a worker thread that only shares the current text
//! and the console sink. On other sinks nothing animates; `succeed` still leaves its final
//! line behind.

use std::cell::RefCell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::queue;
use crossterm::style::{Color, ContentStyle};
use crossterm::terminal::{Clear, ClearType};

use crate::output::console::{Console, Line, Span};
use crate::truncate_chars;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_INTERVAL: Duration = Duration::from_millis(80);
const SUCCESS_SYMBOL: &str = "✔";

/// A dots spinner bound to a console
pub struct Spinner {
    enabled: bool,
    console: Console,
    text: Arc<Mutex<String>>,
    running: Arc<AtomicBool>,
    worker: RefCell<Option<JoinHandle<()>>>,
}

impl Spinner {
    pub fn new(console: Console, enabled: bool) -> Self {
        Self {
            enabled,
            console,
            text: Arc::new(Mutex::new(String::new())),
            running: Arc::new(AtomicBool::new(false)),
            worker: RefCell::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_spinning(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn text(&self) -> String {
        lock(&self.text).clone()
    }

    pub fn start(&self, text: Option<&str>) {
        if !self.enabled {
            return;
        }
        if let Some(text) = text {
            self.set_text(text);
        }
        if !self.console.is_terminal() || self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let console = self.console.clone();
        let text = Arc::clone(&self.text);
        let running = Arc::clone(&self.running);
        let handle = thread::spawn(move || {
            let mut frame = 0;
            while running.load(Ordering::SeqCst) {
                let current = lock(&text).clone();
                let width = console.width().saturating_sub(3);
                console.with_sink(|sink| {
                    queue!(sink, Clear(ClearType::CurrentLine))?;
                    write!(
                        sink,
                        "\r{} {}",
                        FRAMES[frame % FRAMES.len()],
                        truncate_chars(&current, width)
                    )?;
                    sink.flush()
                });
                frame += 1;
                thread::sleep(FRAME_INTERVAL);
            }
        });
        *self.worker.borrow_mut() = Some(handle);
    }

    pub fn update(&self, text: Option<&str>) {
        if self.enabled {
            self.set_text(text.unwrap_or_default());
        }
    }

    /// Stop and leave a success line behind
    pub fn succeed(&self, text: Option<&str>) {
        if !self.enabled {
            return;
        }
        self.halt();
        let message = match text {
            Some(text) => text.to_string(),
            None => self.text(),
        };

        let mut symbol = ContentStyle::new();
        symbol.foreground_color = Some(Color::Green);
        let mut line = Line::from(Span::styled(SUCCESS_SYMBOL, symbol));
        line.push(Span::plain(format!(" {}", message)));
        self.console.print(&line);
    }

    /// Stop and clear the spinner line
    pub fn stop(&self) {
        if self.enabled {
            self.halt();
        }
    }

    fn set_text(&self, text: &str) {
        *lock(&self.text) = text.to_string();
    }

    fn halt(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.worker.borrow_mut().take() {
            if handle.join().is_err() {
                tracing::warn!("Spinner thread panicked");
            }
        }
        self.console.with_sink(|sink| {
            queue!(sink, Clear(ClearType::CurrentLine))?;
            sink.write_all(b"\r")?;
            sink.flush()
        });
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.halt();
    }
}

fn lock(text: &Mutex<String>) -> std::sync::MutexGuard<'_, String> {
    match text.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
