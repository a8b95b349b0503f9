//! Console sink and styled text
//!
//! Everything the user sees goes through a [`Console`]. Text is kept as styled spans so that
//! ANSI-coloured strings coming from callers are re-rendered instead of leaking raw escape
//! codes into files or pipes.

use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};

use crossterm::style::{Attribute, Color, ContentStyle, StyledContent};
use once_cell::sync::Lazy;
use regex::Regex;

/// Width used when the sink is not a terminal
pub const DEFAULT_WIDTH: usize = 80;

static SGR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[([0-9;]*)m").expect("valid SGR pattern"));

static OTHER_ESCAPES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b(\[[0-9;?]*[A-Za-ln-z]|\][^\x07]*\x07|[()][A-Za-z0-9])")
        .expect("valid escape pattern")
});

/// A run of text sharing one style
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub content: String,
    pub style: ContentStyle,
}

impl Span {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            style: ContentStyle::new(),
        }
    }

    pub fn styled(content: impl Into<String>, style: ContentStyle) -> Self {
        Self {
            content: content.into(),
            style,
        }
    }

    /// Display width in terminal cells (one per char)
    pub fn width(&self) -> usize {
        self.content.chars().count()
    }
}

/// A single line of styled spans
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line {
    pub spans: Vec<Span>,
}

impl Line {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, span: Span) {
        if !span.content.is_empty() {
            self.spans.push(span);
        }
    }

    pub fn width(&self) -> usize {
        self.spans.iter().map(Span::width).sum()
    }

    /// The line without any styling
    pub fn plain(&self) -> String {
        self.spans.iter().map(|s| s.content.as_str()).collect()
    }
}

impl From<Span> for Line {
    fn from(span: Span) -> Self {
        let mut line = Line::new();
        line.push(span);
        line
    }
}

/// Multi-line styled text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Text {
    lines: Vec<Line>,
}

impl Text {
    /// Parse a string that may contain ANSI escape codes.
    ///
    /// SGR sequences (`ESC[...m`) become span styles; any other escape sequence is dropped.
    pub fn from_ansi(input: &str) -> Self {
        let cleaned = OTHER_ESCAPES.replace_all(input, "");
        let mut text = Text::default();
        let mut current = Line::new();
        let mut style = ContentStyle::new();
        let mut cursor = 0;

        for caps in SGR_PATTERN.captures_iter(&cleaned) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
            push_segment(&mut text, &mut current, &cleaned[cursor..whole.0], style);
            apply_sgr(&mut style, caps.get(1).map_or("", |m| m.as_str()));
            cursor = whole.1;
        }
        push_segment(&mut text, &mut current, &cleaned[cursor..], style);
        text.lines.push(current);
        text
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn plain(&self) -> String {
        self.lines.iter().map(Line::plain).collect::<Vec<_>>().join("\n")
    }
}

impl From<Line> for Text {
    fn from(line: Line) -> Self {
        Self { lines: vec![line] }
    }
}

impl From<Vec<Line>> for Text {
    fn from(lines: Vec<Line>) -> Self {
        Self { lines }
    }
}

fn push_segment(text: &mut Text, current: &mut Line, segment: &str, style: ContentStyle) {
    let mut parts = segment.split('\n');
    if let Some(first) = parts.next() {
        current.push(Span::styled(first, style));
    }
    for part in parts {
        text.lines.push(std::mem::take(current));
        current.push(Span::styled(part, style));
    }
}

fn apply_sgr(style: &mut ContentStyle, params: &str) {
    let codes: Vec<u16> = if params.is_empty() {
        vec![0]
    } else {
        params
            .split(';')
            .map(|p| p.parse::<u16>().unwrap_or(0))
            .collect()
    };

    let mut iter = codes.into_iter();
    while let Some(code) = iter.next() {
        match code {
            0 => *style = ContentStyle::new(),
            1 => style.attributes.set(Attribute::Bold),
            2 => style.attributes.set(Attribute::Dim),
            3 => style.attributes.set(Attribute::Italic),
            4 => style.attributes.set(Attribute::Underlined),
            7 => style.attributes.set(Attribute::Reverse),
            9 => style.attributes.set(Attribute::CrossedOut),
            22 => {
                style.attributes.unset(Attribute::Bold);
                style.attributes.unset(Attribute::Dim);
            }
            23 => style.attributes.unset(Attribute::Italic),
            24 => style.attributes.unset(Attribute::Underlined),
            27 => style.attributes.unset(Attribute::Reverse),
            29 => style.attributes.unset(Attribute::CrossedOut),
            30..=37 => style.foreground_color = Some(base_color(code - 30)),
            38 => style.foreground_color = extended_color(&mut iter),
            39 => style.foreground_color = None,
            40..=47 => style.background_color = Some(base_color(code - 40)),
            48 => style.background_color = extended_color(&mut iter),
            49 => style.background_color = None,
            90..=97 => style.foreground_color = Some(bright_color(code - 90)),
            100..=107 => style.background_color = Some(bright_color(code - 100)),
            _ => {}
        }
    }
}

fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
    match iter.next()? {
        5 => iter.next().map(|v| Color::AnsiValue(v.min(255) as u8)),
        2 => {
            let r = iter.next()?.min(255) as u8;
            let g = iter.next()?.min(255) as u8;
            let b = iter.next()?.min(255) as u8;
            Some(Color::Rgb { r, g, b })
        }
        _ => None,
    }
}

pub(crate) fn base_color(index: u16) -> Color {
    match index {
        0 => Color::Black,
        1 => Color::DarkRed,
        2 => Color::DarkGreen,
        3 => Color::DarkYellow,
        4 => Color::DarkBlue,
        5 => Color::DarkMagenta,
        6 => Color::DarkCyan,
        _ => Color::Grey,
    }
}

pub(crate) fn bright_color(index: u16) -> Color {
    match index {
        0 => Color::DarkGrey,
        1 => Color::Red,
        2 => Color::Green,
        3 => Color::Yellow,
        4 => Color::Blue,
        5 => Color::Magenta,
        6 => Color::Cyan,
        _ => Color::White,
    }
}

/// Anything the console knows how to print
pub trait Renderable {
    /// Lay the content out for a console `width` cells wide
    fn render(&self, width: usize) -> Vec<Line>;
}

impl Renderable for str {
    fn render(&self, _width: usize) -> Vec<Line> {
        Text::from_ansi(self).lines
    }
}

impl Renderable for String {
    fn render(&self, width: usize) -> Vec<Line> {
        self.as_str().render(width)
    }
}

impl Renderable for Text {
    fn render(&self, _width: usize) -> Vec<Line> {
        self.lines.clone()
    }
}

impl Renderable for Line {
    fn render(&self, _width: usize) -> Vec<Line> {
        vec![self.clone()]
    }
}

type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Output sink for user-visible text
///
/// Cloning shares the same underlying writer, which is how the spinner thread and progress
/// displays write to the same place as the session.
#[derive(Clone)]
pub struct Console {
    sink: SharedSink,
    quiet: bool,
    terminal: bool,
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("quiet", &self.quiet)
            .field("terminal", &self.terminal)
            .finish()
    }
}

impl Console {
    /// Console writing to the process stdout
    pub fn stdout(quiet: bool) -> Self {
        let terminal = io::stdout().is_terminal();
        Self {
            sink: Arc::new(Mutex::new(Box::new(io::stdout()))),
            quiet,
            terminal,
        }
    }

    /// Console writing to an arbitrary sink, treated as a non-terminal
    pub fn with_writer<W: Write + Send + 'static>(writer: W, quiet: bool) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
            quiet,
            terminal: false,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Whether the sink is an interactive terminal (styling and in-place redraws allowed)
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Usable width in cells
    pub fn width(&self) -> usize {
        if self.terminal {
            crossterm::terminal::size()
                .map(|(cols, _)| cols as usize)
                .unwrap_or(DEFAULT_WIDTH)
        } else {
            DEFAULT_WIDTH
        }
    }

    /// Render and print anything renderable, one line per rendered line
    pub fn print<R: Renderable + ?Sized>(&self, content: &R) {
        if self.quiet {
            return;
        }
        let lines = content.render(self.width());
        let terminal = self.terminal;
        self.with_sink(|sink| {
            for line in &lines {
                write_line(sink, line, terminal)?;
                sink.write_all(b"\n")?;
            }
            sink.flush()
        });
    }

    /// Run raw writes against the sink. Does nothing when quiet; write errors are dropped
    /// because console output is best effort.
    pub fn with_sink<F>(&self, f: F)
    where
        F: FnOnce(&mut Box<dyn Write + Send>) -> io::Result<()>,
    {
        if self.quiet {
            return;
        }
        let mut sink = match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = f(&mut *sink) {
            tracing::debug!("Console write failed: {}", e);
        }
    }
}

/// Write one line, styled when the target is a terminal
pub(crate) fn write_line(sink: &mut dyn Write, line: &Line, styled: bool) -> io::Result<()> {
    for span in &line.spans {
        if styled && span.style != ContentStyle::new() {
            write!(sink, "{}", StyledContent::new(span.style, span.content.as_str()))?;
        } else {
            sink.write_all(span.content.as_bytes())?;
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::SharedBuffer;
    use super::*;

    #[test]
    fn test_from_ansi_strips_codes() {
        let text = Text::from_ansi("\x1b[38;5;141m MOOSE\x1b[0m ready");
        assert_eq!(text.plain(), " MOOSE ready");

        let spans = &text.lines()[0].spans;
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].style.foreground_color, Some(Color::AnsiValue(141)));
        assert_eq!(spans[1].style, ContentStyle::new());
    }

    #[test]
    fn test_from_ansi_attributes_and_bright_colors() {
        let text = Text::from_ansi("\x1b[1;92mok\x1b[22m done");
        let spans = &text.lines()[0].spans;
        assert!(spans[0].style.attributes.has(Attribute::Bold));
        assert_eq!(spans[0].style.foreground_color, Some(Color::Green));
        assert!(!spans[1].style.attributes.has(Attribute::Bold));
        assert_eq!(spans[1].style.foreground_color, Some(Color::Green));
    }

    #[test]
    fn test_from_ansi_rgb_and_cursor_codes() {
        let text = Text::from_ansi("\x1b[2K\x1b[38;2;10;20;30mrgb");
        assert_eq!(text.plain(), "rgb");
        assert_eq!(
            text.lines()[0].spans[0].style.foreground_color,
            Some(Color::Rgb { r: 10, g: 20, b: 30 })
        );
    }

    #[test]
    fn test_from_ansi_multiline() {
        let text = Text::from_ansi("first\n\x1b[31msecond\nthird");
        assert_eq!(text.lines().len(), 3);
        assert_eq!(text.lines()[1].plain(), "second");
        assert_eq!(
            text.lines()[2].spans[0].style.foreground_color,
            Some(Color::DarkRed)
        );
    }

    #[test]
    fn test_print_plain_sink_has_no_escape_codes() {
        let buffer = SharedBuffer::default();
        let console = Console::with_writer(buffer.clone(), false);

        console.print("\x1b[35m violet\x1b[0m");

        assert_eq!(buffer.contents(), " violet\n");
    }

    #[test]
    fn test_quiet_console_never_writes() {
        let buffer = SharedBuffer::default();
        let console = Console::with_writer(buffer.clone(), true);

        console.print("hello");
        console.with_sink(|sink| sink.write_all(b"raw"));

        assert!(buffer.is_empty());
    }

    #[test]
    fn test_write_line_styled() {
        let mut out = Vec::new();
        let mut style = ContentStyle::new();
        style.foreground_color = Some(Color::DarkRed);
        let line = Line::from(Span::styled("x", style));

        write_line(&mut out, &line, true).unwrap();

        let written = String::from_utf8(out).unwrap();
        assert!(written.contains('\x1b'));
        assert!(written.contains('x'));
    }
}
