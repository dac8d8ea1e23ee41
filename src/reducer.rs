use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::{info, warn};

use crate::misc::*;
use crate::model::Aggregate;

/// Running sum of one key group at a time.
///
/// Input must arrive grouped by key, which the streaming runtime's sort guarantees. The
/// reducer does not check it: a key that shows up in two separate runs is emitted twice.
#[derive(Debug, Default)]
pub struct SumReducer {
    current: Option<Aggregate>,
    saturated: u64,
}

impl SumReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one record. Returns the previous group once `key` differs from it.
    pub fn push(&mut self, key: &str, value: i64) -> Option<Aggregate> {
        match self.current.as_mut() {
            Some(group) if group.key == key => {
                group.sum = match group.sum.checked_add(value) {
                    Some(sum) => sum,
                    None => {
                        self.saturated += 1;
                        warn!("sum for key {:?} overflows i64, clamped", group.key);
                        group.sum.saturating_add(value)
                    }
                };
                None
            }
            _ => self.current.replace(Aggregate { key: key.to_string(), sum: value }),
        }
    }

    /// Additions that overflowed and were clamped to the i64 range.
    pub fn saturated(&self) -> u64 {
        self.saturated
    }

    /// The last open group, if any.
    pub fn finish(&mut self) -> Option<Aggregate> {
        self.current.take()
    }
}

/// `key\tinteger[\t...]` -> `(key, integer)`. Extra fields are ignored.
pub fn parse_record(line: &str) -> Option<(&str, i64)> {
    let tab = memchr::memchr(b'\t', line.as_bytes())?;
    let (key, rest) = (&line[..tab], &line[tab + 1..]);
    let value = match memchr::memchr(b'\t', rest.as_bytes()) {
        Some(end) => &rest[..end],
        None => rest,
    };
    value.trim().parse::<i64>().ok().map(|v| (key, v))
}

pub fn run_reducer<R: BufRead, W: Write>(input: R, out: &mut W) -> Result<LineStats> {
    let mut stats = LineStats::default();
    let mut reducer = SumReducer::new();
    for_each_line(input, |line| {
        stats.read += 1;
        if line.is_empty() {
            return Ok(());
        }
        let Some((key, value)) = parse_record(line) else {
            stats.skip("record", "expected key<TAB>integer");
            return Ok(());
        };
        if let Some(done) = reducer.push(key, value) {
            writeln!(out, "{done}")?;
            stats.emitted += 1;
        }
        Ok(())
    })?;
    if let Some(done) = reducer.finish() {
        writeln!(out, "{done}")?;
        stats.emitted += 1;
    }
    out.flush()?;
    if reducer.saturated() > 0 {
        warn!("{} additions overflowed and were clamped", reducer.saturated());
    }
    info!("reduce done: {} lines, {} keys, {} skipped", stats.read, stats.emitted, stats.skipped);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reduce(input: &str) -> (String, LineStats) {
        let mut out = vec![];
        let stats = run_reducer(Cursor::new(input.to_string()), &mut out).unwrap();
        (String::from_utf8(out).unwrap(), stats)
    }

    #[test]
    fn sums_groups_in_input_order() {
        let (out, stats) = reduce("mạng\t1\nmạng\t2\nbảo\t5\ncó\t1\ncó\t1\ncó\t-1\n");
        assert_eq!(out, "mạng\t3\nbảo\t5\ncó\t1\n");
        assert_eq!(stats.emitted, 3);
    }

    #[test]
    fn skips_malformed_lines() {
        let (out, stats) = reduce("a\t1\nno tab\na\tx\n\na\t 2 \tignored\nb\t\n");
        assert_eq!(out, "a\t3\n");
        assert_eq!(stats.skipped, 3);
    }

    #[test]
    fn empty_key_is_a_key() {
        let (out, _) = reduce("\t4\n\t1\n");
        assert_eq!(out, "\t5\n");
    }

    #[test]
    fn ungrouped_input_is_not_merged() {
        let (out, _) = reduce("a\t1\nb\t1\na\t1\n");
        assert_eq!(out, "a\t1\nb\t1\na\t1\n");
    }

    #[test]
    fn empty_input_writes_nothing() {
        let (out, stats) = reduce("");
        assert!(out.is_empty());
        assert_eq!(stats, LineStats::default());
    }

    #[test]
    fn push_and_finish() {
        let mut r = SumReducer::new();
        assert_eq!(r.push("x", 2), None);
        assert_eq!(r.push("x", 3), None);
        assert_eq!(r.push("y", 1), Some(Aggregate { key: "x".into(), sum: 5 }));
        assert_eq!(r.finish(), Some(Aggregate { key: "y".into(), sum: 1 }));
        assert_eq!(r.finish(), None);
    }

    #[test]
    fn overflow_is_clamped_and_counted() {
        let mut r = SumReducer::new();
        r.push("big", i64::MAX);
        r.push("big", 1);
        r.push("big", 5);
        assert_eq!(r.saturated(), 2);
        assert_eq!(r.finish(), Some(Aggregate { key: "big".into(), sum: i64::MAX }));

        r.push("small", i64::MIN);
        r.push("small", -1);
        assert_eq!(r.saturated(), 3);
        assert_eq!(r.finish(), Some(Aggregate { key: "small".into(), sum: i64::MIN }));
    }
}
