use std::fmt::{self, Display, Write as _};

use chrono::{DateTime, TimeZone, Utc};

const BAR_WIDTH: usize = 40;
const LABEL_WIDTH: usize = 28;

/// A left aligned text table; columns marked numeric are right aligned.
#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    numeric: Vec<bool>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Display>(headers: &[S]) -> Self {
        Self {
            headers: headers.iter().map(ToString::to_string).collect(),
            numeric: vec![false; headers.len()],
            rows: vec![],
        }
    }

    pub fn numeric(mut self, column: usize) -> Self {
        if let Some(n) = self.numeric.get_mut(column) {
            *n = true;
        }
        self
    }

    pub fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Display,
    {
        self.rows.push(cells.into_iter().map(|c| c.to_string()).collect());
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = (0..self.headers.len())
            .map(|i| {
                self.rows.iter()
                    .filter_map(|r| r.get(i))
                    .chain(Some(&self.headers[i]))
                    .map(|c| c.chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect::<Vec<_>>();
        let line = |f: &mut fmt::Formatter<'_>, cells: &[String]| -> fmt::Result {
            let mut out = String::new();
            for (i, cell) in cells.iter().enumerate().take(widths.len()) {
                let w = widths[i];
                if i > 0 {
                    out.push_str("  ");
                }
                if self.numeric[i] {
                    write!(out, "{cell:>w$}")?;
                } else {
                    write!(out, "{cell:<w$}")?;
                }
            }
            writeln!(f, "{}", out.trim_end())
        };
        line(f, &self.headers)?;
        let total = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        writeln!(f, "{}", "-".repeat(total))?;
        for row in &self.rows {
            line(f, row)?;
        }
        Ok(())
    }
}

/// Horizontal bars scaled to the largest value.
pub fn bar_chart<L: Display>(rows: &[(L, i64)]) -> String {
    let max = rows.iter().map(|(_, v)| *v).max().unwrap_or(0).max(1);
    let mut out = String::new();
    for (label, value) in rows {
        let len = ((*value).max(0) * BAR_WIDTH as i64 / max) as usize;
        let label = utils::ellipsize(&label.to_string(), LABEL_WIDTH - 3);
        let _ = writeln!(out, "{label:<LABEL_WIDTH$} {:<BAR_WIDTH$} {}", "█".repeat(len), utils::with_commas(value));
    }
    out
}

pub fn heading(title: &str) -> String {
    format!("\n{title}\n{}\n", "=".repeat(title.chars().count()))
}

pub fn metric<V: Display>(label: &str, value: V) -> String {
    format!("  {label:<22} {value}\n")
}

/// RFC 3339 timestamps as `YYYY-MM-DD HH:MM`, anything else unchanged.
pub fn format_timestamp(ts: &str) -> String {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| ts.to_string())
}

/// Index creation dates arrive as epoch milliseconds.
pub fn format_epoch_millis(ms: &str) -> String {
    ms.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// `<mark>` highlight tags as `[` and `]`.
pub fn terminal_highlight(fragment: &str) -> String {
    fragment.replace("<mark>", "[").replace("</mark>", "]").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aligns_columns() {
        let mut table = Table::new(&["word", "count"]).numeric(1);
        table.row(["việt", "1,200"]);
        table.row(["hà nội", "7"]);
        assert_eq!(table.to_string(), "\
word    count
-------------
việt    1,200
hà nội      7
");
    }

    #[test]
    fn bars_scale_to_max() {
        let chart = bar_chart(&[("a", 10), ("b", 5), ("c", 0)]);
        let bars = chart.lines().map(|l| l.matches('█').count()).collect::<Vec<_>>();
        assert_eq!(bars, vec![BAR_WIDTH, BAR_WIDTH / 2, 0]);
    }

    #[test]
    fn timestamps() {
        assert_eq!(format_timestamp("2023-11-05T08:30:00Z"), "2023-11-05 08:30");
        assert_eq!(format_timestamp("N/A"), "N/A");
        assert_eq!(format_epoch_millis("0"), "1970-01-01 00:00:00 UTC");
        assert_eq!(terminal_highlight("Thủ đô <mark>Hà Nội</mark>"), "Thủ đô [Hà Nội]");
    }
}
