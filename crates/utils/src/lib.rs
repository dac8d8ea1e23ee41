#![allow(dead_code)]

mod defines;

pub use defines::*;

use std::fmt::Display;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use itertools::Itertools;

pub fn walk<P: AsRef<Path>>(dir: P) -> impl Iterator<Item = PathBuf> {
    walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .flatten()
        .map(|entry| entry.into_path())
}

/// `part-*` files directly under `dir`, sorted by name. A plain file is returned as the only part.
pub fn part_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if dir.is_file() {
        return Ok(vec![dir.to_path_buf()]);
    }
    if !dir.is_dir() {
        bail!("{} is neither a file nor a directory", dir.display());
    }
    Ok(walk(dir)
        .filter(|p| p.is_file())
        .filter(|p| p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("part-")))
        .sorted()
        .collect_vec())
}

/// One entry per line. A leading BOM, surrounding whitespace and blank lines are dropped.
pub fn read_list<P: AsRef<Path>>(path: P) -> io::Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect_vec())
}

/// Prompt on stdout and read one line from stdin, `None` at end of input.
pub fn input<S: Display>(prefix: S) -> Result<Option<String>> {
    print!("{prefix}");
    io::stdout().flush()?;
    io::stdin().lines().next().transpose().context("read stdin fail")
}

/// 1234567 -> "1,234,567"
pub fn with_commas<N: Display>(n: N) -> String {
    let raw = n.to_string();
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(d) => ("-", d),
        None => ("", raw.as_str()),
    };
    let grouped = digits.as_bytes()
        .rchunks(3)
        .rev()
        .map(|c| std::str::from_utf8(c).unwrap_or_default())
        .join(",");
    format!("{sign}{grouped}")
}

/// Cut `s` to at most `max` chars, appending `...` when something was dropped.
pub fn ellipsize(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commas() {
        assert_eq!(with_commas(0), "0");
        assert_eq!(with_commas(999), "999");
        assert_eq!(with_commas(1000), "1,000");
        assert_eq!(with_commas(1234567u64), "1,234,567");
        assert_eq!(with_commas(-45000i64), "-45,000");
    }

    #[test]
    fn ellipsize_counts_chars() {
        assert_eq!(ellipsize("Hà Nội", 10), "Hà Nội");
        assert_eq!(ellipsize("Hà Nội", 2), "Hà...");
    }

    #[test]
    fn list_strips_bom_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kw.txt");
        fs::write(&path, "\u{feff}internet\n\n  mạng \r\ngoogle\n").unwrap();
        assert_eq!(read_list(&path).unwrap(), vec!["internet", "mạng", "google"]);
    }

    #[test]
    fn part_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["part-00001", "_SUCCESS", "part-00000", ".part-00000.crc"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let names = part_files(dir.path()).unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect_vec();
        assert_eq!(names, vec!["part-00000", "part-00001"]);

        let single = dir.path().join("_SUCCESS");
        assert_eq!(part_files(&single).unwrap(), vec![single]);
        assert!(part_files(dir.path().join("missing")).is_err());
    }
}
