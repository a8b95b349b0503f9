//! Progress displays
//!
//! A [`Progress`] owns a set of tasks and renders one line per task from a list of columns.
//! On a terminal the lines are redrawn in place; on any other sink only the final state is
//! printed when the display stops, so logs and pipes are not flooded with partial frames.

use std::io::Write;
use std::time::{Duration, Instant};

use crossterm::cursor::MoveToPreviousLine;
use crossterm::queue;
use crossterm::style::{Attribute, Color, ContentStyle};
use crossterm::terminal::{Clear, ClearType};

use crate::output::console::{write_line, Console, Line, Span};

const REFRESH_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_BAR_WIDTH: usize = 40;
const MIN_BAR_WIDTH: usize = 10;

/// Handle to a task inside a [`Progress`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

/// One column of a progress line
#[derive(Debug, Clone)]
pub enum ProgressColumn {
    /// Task description, optionally styled
    Description(Option<ContentStyle>),
    /// Bar of fixed width, or `None` to take the remaining width
    Bar(Option<usize>),
    /// Completion percentage, right aligned
    Percentage,
    /// Static text
    Text(String),
    /// Completed amount as a decimal byte size
    FileSize,
    /// Bytes per second
    TransferSpeed,
    /// Estimated time remaining
    TimeRemaining,
}

/// Progress state of a single task
#[derive(Debug, Clone)]
pub struct Task {
    description: String,
    total: Option<u64>,
    completed: u64,
    started: Instant,
}

impl Task {
    fn new(description: String, total: Option<u64>) -> Self {
        Self {
            description,
            total,
            completed: 0,
            started: Instant::now(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.total, Some(total) if self.completed >= total)
    }

    /// Completion in the range `0.0..=100.0`; zero while the total is unknown
    pub fn percentage(&self) -> f64 {
        match self.total {
            Some(0) => 100.0,
            Some(total) => (self.completed as f64 / total as f64 * 100.0).min(100.0),
            None => 0.0,
        }
    }

    fn speed(&self, elapsed: Duration) -> Option<f64> {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 || self.completed == 0 {
            return None;
        }
        Some(self.completed as f64 / secs)
    }

    fn time_remaining(&self, elapsed: Duration) -> Option<Duration> {
        let total = self.total?;
        if self.completed >= total {
            return Some(Duration::ZERO);
        }
        let speed = self.speed(elapsed)?;
        Duration::try_from_secs_f64((total - self.completed) as f64 / speed).ok()
    }
}

/// Format a byte count with decimal units (`1.5 MB`)
pub fn decimal_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["kB", "MB", "GB", "TB", "PB"];

    if bytes == 1 {
        return "1 byte".to_string();
    }
    if bytes < 1000 {
        return format!("{} bytes", bytes);
    }

    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Rows to move the cursor up, saturating at what crossterm can address
fn cursor_rows(lines: usize) -> u16 {
    u16::try_from(lines).unwrap_or(u16::MAX)
}

fn style_with(color: Color) -> ContentStyle {
    let mut style = ContentStyle::new();
    style.foreground_color = Some(color);
    style
}

impl ProgressColumn {
    /// Render every column except bars, which depend on the space left over
    fn render_fixed(&self, task: &Task, elapsed: Duration) -> Option<Span> {
        let span = match self {
            ProgressColumn::Description(style) => Span::styled(
                task.description.clone(),
                style.unwrap_or_else(ContentStyle::new),
            ),
            ProgressColumn::Bar(_) => return None,
            ProgressColumn::Percentage => Span::styled(
                format!("{:>3.0}%", task.percentage()),
                style_with(Color::Magenta),
            ),
            ProgressColumn::Text(text) => Span::plain(text.clone()),
            ProgressColumn::FileSize => {
                Span::styled(decimal_size(task.completed), style_with(Color::Green))
            }
            ProgressColumn::TransferSpeed => Span::styled(
                match task.speed(elapsed) {
                    Some(speed) => format!("{}/s", decimal_size(speed as u64)),
                    None => "?".to_string(),
                },
                style_with(Color::DarkRed),
            ),
            ProgressColumn::TimeRemaining => Span::styled(
                match task.time_remaining(elapsed) {
                    Some(remaining) => clock(remaining),
                    None => "-:--:--".to_string(),
                },
                style_with(Color::Cyan),
            ),
        };
        Some(span)
    }
}

fn render_bar(task: &Task, width: usize) -> Vec<Span> {
    let filled = match task.total {
        Some(_) => ((task.percentage() / 100.0) * width as f64).round() as usize,
        None => 0,
    }
    .min(width);

    vec![
        Span::styled("█".repeat(filled), style_with(Color::Magenta)),
        Span::styled("░".repeat(width - filled), style_with(Color::DarkGrey)),
    ]
}

/// A live progress display
#[derive(Debug)]
pub struct Progress {
    console: Console,
    columns: Vec<ProgressColumn>,
    tasks: Vec<Task>,
    drawn_lines: usize,
    last_draw: Option<Instant>,
    stopped: bool,
}

impl Progress {
    pub fn new(console: Console, columns: Vec<ProgressColumn>) -> Self {
        Self {
            console,
            columns,
            tasks: Vec::new(),
            drawn_lines: 0,
            last_draw: None,
            stopped: false,
        }
    }

    /// Description, a fixed-width bar and a percentage
    pub fn generic(console: Console) -> Self {
        Self::new(
            console,
            vec![
                ProgressColumn::Description(None),
                ProgressColumn::Bar(Some(DEFAULT_BAR_WIDTH)),
                ProgressColumn::Percentage,
            ],
        )
    }

    /// Layout for byte-stream transfers: size, speed and time remaining after the bar
    pub fn file_transfer(console: Console) -> Self {
        let mut description = style_with(Color::DarkBlue);
        description.attributes.set(Attribute::Bold);

        Self::new(
            console,
            vec![
                ProgressColumn::Description(Some(description)),
                ProgressColumn::Bar(None),
                ProgressColumn::Percentage,
                ProgressColumn::Text("•".to_string()),
                ProgressColumn::FileSize,
                ProgressColumn::TransferSpeed,
                ProgressColumn::TimeRemaining,
            ],
        )
    }

    pub fn columns(&self) -> &[ProgressColumn] {
        &self.columns
    }

    pub fn add_task(&mut self, description: impl Into<String>, total: Option<u64>) -> TaskId {
        self.tasks.push(Task::new(description.into(), total));
        self.refresh(true);
        TaskId(self.tasks.len() - 1)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0)
    }

    /// Add `amount` to the completed count of a task
    pub fn advance(&mut self, id: TaskId, amount: u64) {
        if let Some(task) = self.tasks.get_mut(id.0) {
            task.completed = task.completed.saturating_add(amount);
            self.refresh(false);
        }
    }

    /// Set the completed count of a task
    pub fn update(&mut self, id: TaskId, completed: u64) {
        if let Some(task) = self.tasks.get_mut(id.0) {
            task.completed = completed;
            self.refresh(false);
        }
    }

    pub fn set_total(&mut self, id: TaskId, total: Option<u64>) {
        if let Some(task) = self.tasks.get_mut(id.0) {
            task.total = total;
            self.refresh(true);
        }
    }

    pub fn set_description(&mut self, id: TaskId, description: impl Into<String>) {
        if let Some(task) = self.tasks.get_mut(id.0) {
            task.description = description.into();
            self.refresh(true);
        }
    }

    /// True once every task has reached its total. A task without a total never finishes.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(Task::is_finished)
    }

    /// Draw the final state and release the display. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.draw();
        self.stopped = true;
    }

    fn refresh(&mut self, force: bool) {
        if self.stopped || !self.console.is_terminal() {
            return;
        }
        let due = self
            .last_draw
            .map_or(true, |last| last.elapsed() >= REFRESH_INTERVAL);
        if force || due {
            self.draw();
        }
    }

    fn draw(&mut self) {
        let lines = self.render_lines(self.console.width(), Instant::now());
        let previous = self.drawn_lines;
        let terminal = self.console.is_terminal();

        self.console.with_sink(|sink| {
            if terminal && previous > 0 {
                queue!(sink, MoveToPreviousLine(cursor_rows(previous)))?;
            }
            for line in &lines {
                if terminal {
                    queue!(sink, Clear(ClearType::CurrentLine))?;
                }
                write_line(sink, line, terminal)?;
                sink.write_all(b"\n")?;
            }
            sink.flush()
        });

        self.drawn_lines = lines.len();
        self.last_draw = Some(Instant::now());
    }

    fn render_lines(&self, width: usize, now: Instant) -> Vec<Line> {
        self.tasks
            .iter()
            .map(|task| self.render_task(task, now.saturating_duration_since(task.started), width))
            .collect()
    }

    fn render_task(&self, task: &Task, elapsed: Duration, width: usize) -> Line {
        let rendered: Vec<Option<Span>> = self
            .columns
            .iter()
            .map(|column| column.render_fixed(task, elapsed))
            .collect();

        let fixed_width: usize = rendered.iter().flatten().map(Span::width).sum();
        let gaps = self.columns.len().saturating_sub(1);
        let bars = self
            .columns
            .iter()
            .filter(|c| matches!(c, ProgressColumn::Bar(None)))
            .count()
            .max(1);
        let fixed_bars: usize = self
            .columns
            .iter()
            .filter_map(|c| match c {
                ProgressColumn::Bar(Some(w)) => Some(*w),
                _ => None,
            })
            .sum();
        let expanding = (width.saturating_sub(fixed_width + gaps + fixed_bars) / bars)
            .max(MIN_BAR_WIDTH);

        let mut line = Line::new();
        for (i, (column, span)) in self.columns.iter().zip(rendered).enumerate() {
            if i > 0 {
                line.push(Span::plain(" "));
            }
            match (column, span) {
                (ProgressColumn::Bar(fixed), _) => {
                    for part in render_bar(task, fixed.unwrap_or(expanding)) {
                        line.push(part);
                    }
                }
                (_, Some(span)) => line.push(span),
                (_, None) => {}
            }
        }
        line
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.stop();
    }
}
