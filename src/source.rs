use std::io::BufReader;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::SourceMode;
use crate::error::WikiError;
use crate::misc::{for_each_line, open_input};

/// Where the indexer reads job output from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    mode: SourceMode,
    hdfs_bin: String,
}

impl DataSource {
    pub fn new(mode: SourceMode) -> Self {
        Self { mode, hdfs_bin: "hdfs".into() }
    }

    /// Use another `hdfs` executable.
    pub fn with_hdfs_bin(mut self, bin: impl Into<String>) -> Self {
        self.hdfs_bin = bin.into();
        self
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    /// Stream every line under `location`. Returns the number of lines read.
    pub fn lines<F>(&self, location: &str, f: F) -> Result<u64>
    where
        F: FnMut(&str) -> Result<()>,
    {
        match self.mode {
            SourceMode::Local => local_lines(location, f),
            SourceMode::Hdfs => self.hdfs_lines(location, f),
        }
    }

    fn hdfs_lines<F>(&self, location: &str, f: F) -> Result<u64>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let pattern = format!("{}/part-*", location.trim_end_matches('/'));
        info!("{} dfs -cat {pattern}", self.hdfs_bin);
        let mut child = Command::new(&self.hdfs_bin)
            .args(["dfs", "-cat", &pattern])
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| WikiError::Source(pattern.clone(), format!("spawn {}: {e}", self.hdfs_bin)))?;
        let stdout = child.stdout.take().context("child stdout not captured")?;
        let read = for_each_line(BufReader::with_capacity(1 << 20, stdout), f);
        let status = child.wait().context("wait for hdfs")?;
        let read = read?;
        if !status.success() {
            return Err(WikiError::Source(pattern, format!("hdfs exited with {status}")).into());
        }
        Ok(read)
    }
}

fn local_lines<F>(location: &str, mut f: F) -> Result<u64>
where
    F: FnMut(&str) -> Result<()>,
{
    let files = utils::part_files(location)
        .map_err(|e| WikiError::Source(location.to_string(), e.to_string()))?;
    let mut total = 0;
    for file in files {
        debug!("read {}", file.display());
        total += for_each_line(open_input(&file)?, &mut f)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn collect(source: &DataSource, location: &str) -> Result<Vec<String>> {
        let mut lines = vec![];
        source.lines(location, |l| {
            lines.push(l.to_string());
            Ok(())
        })?;
        Ok(lines)
    }

    #[test]
    fn local_reads_part_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("part-00001"), "c\t3\n").unwrap();
        fs::write(dir.path().join("part-00000"), "a\t1\nb\t2\n").unwrap();
        fs::write(dir.path().join("_SUCCESS"), "").unwrap();

        let source = DataSource::new(SourceMode::Local);
        let lines = collect(&source, dir.path().to_str().unwrap()).unwrap();
        assert_eq!(lines, vec!["a\t1", "b\t2", "c\t3"]);
    }

    #[test]
    fn local_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("docs.jsonl");
        fs::write(&file, "{}\n").unwrap();
        let lines = collect(&DataSource::new(SourceMode::Local), file.to_str().unwrap()).unwrap();
        assert_eq!(lines, vec!["{}"]);
    }

    #[test]
    fn missing_location_is_a_source_error() {
        let err = collect(&DataSource::new(SourceMode::Local), "/no/such/dir").unwrap_err();
        assert!(matches!(err.downcast_ref::<WikiError>(), Some(WikiError::Source(..))));
    }

    #[test]
    fn missing_hdfs_binary_is_a_source_error() {
        let source = DataSource::new(SourceMode::Hdfs).with_hdfs_bin("viwiki-no-such-hdfs");
        let err = collect(&source, "/data").unwrap_err();
        assert!(matches!(err.downcast_ref::<WikiError>(), Some(WikiError::Source(..))));
    }
}
