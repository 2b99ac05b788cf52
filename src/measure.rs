//! Terminal text measurement for the CLI's aligned tables.

use unicode_width::UnicodeWidthStr;

/// Columns occupied by `text` in a terminal. Wide characters count 2.
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Left-align `text` in a field `width` columns wide.
pub fn pad_to(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(display_width(text));
    format!("{text}{}", " ".repeat(fill))
}

/// A plain-text table with a header row and a separator.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    gap: usize,
}

impl TextTable {
    pub fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            gap: 2,
        }
    }

    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    fn column_widths(&self) -> Vec<usize> {
        let columns = self
            .rows
            .iter()
            .map(Vec::len)
            .chain([self.header.len()])
            .max()
            .unwrap_or(0);
        (0..columns)
            .map(|i| {
                self.rows
                    .iter()
                    .chain([&self.header])
                    .filter_map(|row| row.get(i))
                    .map(|cell| display_width(cell))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let widths = self.column_widths();
        let gap = " ".repeat(self.gap);
        let line = |cells: &[String]| {
            let padded: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, w)| pad_to(cells.get(i).map(String::as_str).unwrap_or(""), *w))
                .collect();
            padded.join(&gap).trim_end().to_string()
        };

        let mut out = Vec::with_capacity(self.rows.len() + 2);
        out.push(line(&self.header));
        out.push(
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join(&gap),
        );
        out.extend(self.rows.iter().map(|row| line(row)));
        out.join("\n")
    }
}
