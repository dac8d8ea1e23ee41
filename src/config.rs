use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WikiError;

/// Looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE: &str = "viwiki.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Local,
    Hdfs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetPaths {
    pub docs: String,
    pub wordcount: String,
    pub trend: String,
    pub cat_kwlist: String,
    pub cat_docs: String,
}

impl Default for DatasetPaths {
    fn default() -> Self {
        Self {
            docs: "/data/wiki/clean/docs".into(),
            wordcount: "/data/wiki/mr/wordcount".into(),
            trend: "/data/wiki/mr/trend_kwlist".into(),
            cat_kwlist: "/data/wiki/mr/cat_kwlist".into(),
            cat_docs: "/data/wiki/mr/cat_docs".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub es_url: String,
    pub timeout_secs: u64,
    pub keywords_path: PathBuf,
    pub stopwords_path: PathBuf,
    pub source: SourceMode,
    pub datasets: DatasetPaths,
    pub bulk_chunk: usize,
    pub cache_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            es_url: "http://localhost:9200".into(),
            timeout_secs: 60,
            keywords_path: "mapreduce/keywords.txt".into(),
            stopwords_path: "stopwords_vi.txt".into(),
            source: SourceMode::Hdfs,
            datasets: DatasetPaths::default(),
            bulk_chunk: 500,
            cache_ttl_secs: utils::HOUR.as_secs(),
        }
    }
}

impl Config {
    /// An explicit path must exist; otherwise `viwiki.json` is used when present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None if Path::new(CONFIG_FILE).is_file() => PathBuf::from(CONFIG_FILE),
            None => {
                debug!("no {CONFIG_FILE}, using defaults");
                return Ok(Self::default());
            }
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        debug!("config loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WikiError> {
        if !(self.es_url.starts_with("http://") || self.es_url.starts_with("https://")) {
            return Err(WikiError::Config(format!("es_url must be an http(s) url, got '{}'", self.es_url)));
        }
        if self.bulk_chunk == 0 {
            return Err(WikiError::Config("bulk_chunk must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{"source": "local", "datasets": {"docs": "out/docs"}}"#).unwrap();
        assert_eq!(config.source, SourceMode::Local);
        assert_eq!(config.datasets.docs, "out/docs");
        assert_eq!(config.datasets.wordcount, "/data/wiki/mr/wordcount");
        assert_eq!(config.es_url, "http://localhost:9200");
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_json(r#"{"es_url": "localhost:9200"}"#).is_err());
        assert!(Config::from_json(r#"{"bulk_chunk": 0}"#).is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.json"))).is_err());
    }
}
