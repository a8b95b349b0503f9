//! Console tables
//!
//! Tables are built column-first, filled row by row by the caller and rendered with a
//! heavy header frame:
//!
//! ```text
//! ┏━━━━━━━━━━━━━━━┳━━━━━━━━━━┓
//! ┃ Model         ┃ Modality ┃
//! ┡━━━━━━━━━━━━━━━╇━━━━━━━━━━┩
//! │ clin_ct_lungs │ CT       │
//! └───────────────┴──────────┘
//! ```

use crossterm::style::{Attribute, Color, ContentStyle};

use crate::output::console::{base_color, bright_color, Line, Renderable, Span};
use crate::output::OutputError;

const COLOR_NAMES: [&str; 8] = [
    "black", "red", "green", "yellow", "blue", "magenta", "cyan", "white",
];

/// Parse a style tag such as `"bold blue"`, `"dim"`, `"red on white"` or `"color(141)"`
pub fn parse_style(tag: &str) -> Result<ContentStyle, OutputError> {
    let mut style = ContentStyle::new();
    let mut words = tag.split_whitespace();

    while let Some(word) = words.next() {
        let word = word.to_ascii_lowercase();
        match word.as_str() {
            "bold" | "b" => style.attributes.set(Attribute::Bold),
            "dim" => style.attributes.set(Attribute::Dim),
            "italic" | "i" => style.attributes.set(Attribute::Italic),
            "underline" | "u" => style.attributes.set(Attribute::Underlined),
            "reverse" => style.attributes.set(Attribute::Reverse),
            "strike" | "s" => style.attributes.set(Attribute::CrossedOut),
            "on" => {
                let background = words.next().ok_or_else(|| {
                    OutputError::InvalidConfiguration(format!(
                        "style '{}' is missing a background color",
                        tag
                    ))
                })?;
                style.background_color = Some(parse_color(background).ok_or_else(|| {
                    OutputError::InvalidConfiguration(format!(
                        "unknown background color '{}' in style '{}'",
                        background, tag
                    ))
                })?);
            }
            other => {
                style.foreground_color = Some(parse_color(other).ok_or_else(|| {
                    OutputError::InvalidConfiguration(format!(
                        "unknown style '{}' in '{}'",
                        other, tag
                    ))
                })?);
            }
        }
    }

    Ok(style)
}

fn parse_color(name: &str) -> Option<Color> {
    let name = name.to_ascii_lowercase();

    if let Some(index) = name
        .strip_prefix("color(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return index.parse::<u8>().ok().map(Color::AnsiValue);
    }

    if let Some(hex) = name.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        return Some(Color::Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        });
    }

    if name == "grey" || name == "gray" {
        return Some(Color::DarkGrey);
    }

    let (bright, base) = match name.strip_prefix("bright_") {
        Some(base) => (true, base),
        None => (false, name.as_str()),
    };
    let index = COLOR_NAMES.iter().position(|c| *c == base)? as u16;
    Some(if bright {
        bright_color(index)
    } else {
        base_color(index)
    })
}

#[derive(Debug, Clone)]
struct Column {
    header: String,
    style: Option<ContentStyle>,
}

/// A table with fixed columns and caller-supplied rows
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create a table; `styles`, when given, must have one entry per header
    pub fn new(headers: &[&str], styles: Option<&[&str]>) -> Result<Self, OutputError> {
        let styles: Vec<Option<ContentStyle>> = match styles {
            None => vec![None; headers.len()],
            Some(styles) if styles.len() != headers.len() => {
                return Err(OutputError::InvalidConfiguration(format!(
                    "{} header(s) but {} style(s)",
                    headers.len(),
                    styles.len()
                )));
            }
            Some(styles) => styles
                .iter()
                .map(|tag| parse_style(tag).map(Some))
                .collect::<Result<_, _>>()?,
        };

        let columns = headers
            .iter()
            .zip(styles)
            .map(|(header, style)| Column {
                header: header.to_string(),
                style,
            })
            .collect();

        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Append a row. Missing trailing cells are left blank; extra cells are rejected.
    pub fn add_row<I, S>(&mut self, cells: I) -> Result<(), OutputError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        if row.len() > self.columns.len() {
            return Err(OutputError::InvalidConfiguration(format!(
                "row has {} cell(s) but the table has {} column(s)",
                row.len(),
                self.columns.len()
            )));
        }
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    fn column_widths(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                self.rows
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(column.header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }
}

fn rule(widths: &[usize], left: char, fill: char, mid: char, right: char) -> Line {
    let mut text = String::new();
    text.push(left);
    for (i, width) in widths.iter().enumerate() {
        if i > 0 {
            text.push(mid);
        }
        text.extend(std::iter::repeat(fill).take(width + 2));
    }
    text.push(right);
    Line::from(Span::plain(text))
}

fn pad(content: &str, width: usize) -> String {
    let len = content.chars().count();
    format!(" {}{} ", content, " ".repeat(width.saturating_sub(len)))
}

impl Renderable for Table {
    fn render(&self, _width: usize) -> Vec<Line> {
        if self.columns.is_empty() {
            return Vec::new();
        }

        let widths = self.column_widths();
        let mut header_style = ContentStyle::new();
        header_style.attributes.set(Attribute::Bold);

        let mut lines = vec![rule(&widths, '┏', '━', '┳', '┓')];

        let mut header = Line::new();
        for (column, width) in self.columns.iter().zip(&widths) {
            header.push(Span::plain("┃"));
            header.push(Span::styled(pad(&column.header, *width), header_style));
        }
        header.push(Span::plain("┃"));
        lines.push(header);

        lines.push(rule(&widths, '┡', '━', '╇', '┩'));

        for row in &self.rows {
            let mut line = Line::new();
            for ((cell, column), width) in row.iter().zip(&self.columns).zip(&widths) {
                line.push(Span::plain("│"));
                let padded = pad(cell, *width);
                match column.style {
                    Some(style) => line.push(Span::styled(padded, style)),
                    None => line.push(Span::plain(padded)),
                }
            }
            line.push(Span::plain("│"));
            lines.push(line);
        }

        lines.push(rule(&widths, '└', '─', '┴', '┘'));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_length_mismatch() {
        let result = Table::new(&["a", "b"], Some(&["red"][..]));
        assert!(matches!(result, Err(OutputError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_unknown_style_rejected() {
        let result = Table::new(&["a"], Some(&["sparkly"][..]));
        assert!(matches!(result, Err(OutputError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_parse_style() {
        let style = parse_style("bold blue").unwrap();
        assert!(style.attributes.has(Attribute::Bold));
        assert_eq!(style.foreground_color, Some(Color::DarkBlue));

        let style = parse_style("bright_magenta on black").unwrap();
        assert_eq!(style.foreground_color, Some(Color::Magenta));
        assert_eq!(style.background_color, Some(Color::Black));

        let style = parse_style("color(141)").unwrap();
        assert_eq!(style.foreground_color, Some(Color::AnsiValue(141)));

        let style = parse_style("#ff8000").unwrap();
        assert_eq!(
            style.foreground_color,
            Some(Color::Rgb { r: 255, g: 128, b: 0 })
        );

        assert!(parse_style("red on").is_err());
    }

    #[test]
    fn test_add_row_padding_and_overflow() {
        let mut table = Table::new(&["a", "b"], None).unwrap();
        table.add_row(["only"]).unwrap();
        assert_eq!(table.row_count(), 1);

        let overflow = table.add_row(["1", "2", "3"]);
        assert!(matches!(overflow, Err(OutputError::InvalidConfiguration(_))));
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_render_layout() {
        let mut table = Table::new(&["Model", "Modality"], Some(&["cyan", "magenta"][..])).unwrap();
        table.add_row(["clin_ct_lungs", "CT"]).unwrap();

        let rendered: Vec<String> = table.render(80).iter().map(Line::plain).collect();

        assert_eq!(
            rendered,
            vec![
                "┏━━━━━━━━━━━━━━━┳━━━━━━━━━━┓",
                "┃ Model         ┃ Modality ┃",
                "┡━━━━━━━━━━━━━━━╇━━━━━━━━━━┩",
                "│ clin_ct_lungs │ CT       │",
                "└───────────────┴──────────┘",
            ]
        );
    }

    #[test]
    fn test_render_empty_table() {
        let table = Table::new(&[], None).unwrap();
        assert!(table.render(80).is_empty());
    }
}
