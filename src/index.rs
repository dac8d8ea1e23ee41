use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{Config, DatasetPaths};
use crate::constant::*;
use crate::es::{BulkDoc, BulkStats, SearchBackend};
use crate::lexicon::Keywords;
use crate::misc::LineStats;
use crate::model::CleanedDoc;
use crate::source::DataSource;

/// Trend keys written before the separator was introduced: `2025-11website`.
static LEGACY_TREND_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})(.+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Docs,
    WordCount,
    Trend,
    CatKwlist,
    CatDocs,
}

impl Dataset {
    pub const ALL: [Dataset; 5] = [
        Dataset::Docs,
        Dataset::WordCount,
        Dataset::Trend,
        Dataset::CatKwlist,
        Dataset::CatDocs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dataset::Docs => "docs",
            Dataset::WordCount => "wordcount",
            Dataset::Trend => "trend",
            Dataset::CatKwlist => "cat-kwlist",
            Dataset::CatDocs => "cat-docs",
        }
    }

    pub fn index(self) -> &'static str {
        match self {
            Dataset::Docs => IDX_DOCS,
            Dataset::WordCount => IDX_WORDCOUNT,
            Dataset::Trend => IDX_TREND,
            Dataset::CatKwlist => IDX_CAT_KWLIST,
            Dataset::CatDocs => IDX_CAT_DOCS,
        }
    }

    pub fn location(self, paths: &DatasetPaths) -> &str {
        match self {
            Dataset::Docs => &paths.docs,
            Dataset::WordCount => &paths.wordcount,
            Dataset::Trend => &paths.trend,
            Dataset::CatKwlist => &paths.cat_kwlist,
            Dataset::CatDocs => &paths.cat_docs,
        }
    }

    pub fn mappings(self) -> Value {
        let properties = match self {
            Dataset::Docs => json!({
                "page_id": {"type": "keyword"},
                "title": {
                    "type": "text",
                    "analyzer": ANALYZER,
                    "fields": {"keyword": {"type": "keyword"}},
                },
                "timestamp": {"type": "date", "format": "iso8601"},
                "categories": {"type": "keyword"},
                "text": {"type": "text", "analyzer": ANALYZER},
            }),
            Dataset::WordCount => json!({
                "word": {"type": "keyword"},
                "count": {"type": "integer"},
            }),
            Dataset::Trend => json!({
                "year": {"type": "keyword"},
                "month": {"type": "keyword"},
                "keyword": {"type": "keyword"},
                "count": {"type": "integer"},
                "date": {"type": "date", "format": "yyyy-MM"},
            }),
            Dataset::CatKwlist => json!({
                "category": {"type": "keyword"},
                "keyword": {"type": "keyword"},
                "count": {"type": "integer"},
            }),
            Dataset::CatDocs => json!({
                "category": {"type": "keyword"},
                "doc_count": {"type": "integer"},
            }),
        };
        json!({"properties": properties})
    }

    /// Full create-index body: shared settings plus this dataset's mappings.
    pub fn schema(self) -> Value {
        json!({
            "settings": index_settings(),
            "mappings": self.mappings(),
        })
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match Dataset::ALL.into_iter().find(|d| d.name() == s || d.index() == s) {
            Some(d) => Ok(d),
            None => bail!("unknown dataset '{s}'"),
        }
    }
}

pub fn index_settings() -> Value {
    json!({
        "number_of_shards": SHARDS,
        "number_of_replicas": REPLICAS,
        "analysis": {
            "analyzer": {
                ANALYZER: {
                    "type": "custom",
                    "tokenizer": "standard",
                    "filter": ["lowercase", "asciifolding"],
                }
            }
        }
    })
}

/// `key\tcount` with exactly two fields and an integer count.
pub fn aggregate_fields(line: &str) -> Result<(&str, i64), String> {
    let mut parts = line.split('\t');
    let (Some(key), Some(count), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err("expected exactly two tab separated fields".into());
    };
    let count = count.trim().parse::<i64>().map_err(|e| format!("bad count '{count}': {e}"))?;
    Ok((key, count))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendKey<'a> {
    pub year: &'a str,
    pub month: &'a str,
    pub keyword: &'a str,
}

/// `YYYY-MM SEP keyword`, or the legacy form without separator.
pub fn parse_trend_key(key: &str) -> Option<TrendKey<'_>> {
    if let Some((month, keyword)) = key.split_once(SEP) {
        let (year, mm) = month.split_once('-')?;
        let digits = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(year, 4) || !digits(mm, 2) || keyword.is_empty() {
            return None;
        }
        return Some(TrendKey { year, month: mm, keyword });
    }
    let caps = LEGACY_TREND_KEY.captures(key)?;
    Some(TrendKey {
        year: caps.get(1)?.as_str(),
        month: caps.get(2)?.as_str(),
        keyword: caps.get(3)?.as_str(),
    })
}

/// Turns the lines of one dataset into bulk documents.
pub struct RecordParser<'a> {
    dataset: Dataset,
    keywords: &'a Keywords,
    /// Valid documents seen so far, the fallback id of pages without `page_id`.
    ordinal: u64,
}

impl<'a> RecordParser<'a> {
    pub fn new(dataset: Dataset, keywords: &'a Keywords) -> Self {
        Self { dataset, keywords, ordinal: 0 }
    }

    /// `Ok(None)` for blank lines, `Err` with the reason for a malformed one.
    pub fn parse(&mut self, line: &str) -> Result<Option<BulkDoc>, String> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        if self.dataset == Dataset::Docs {
            return self.parse_doc(line).map(Some);
        }
        let (key, count) = aggregate_fields(line)?;
        let source = match self.dataset {
            Dataset::WordCount => json!({"word": key, "count": count}),
            Dataset::Trend => {
                let t = parse_trend_key(key).ok_or_else(|| format!("bad trend key '{key}'"))?;
                json!({
                    "year": t.year,
                    "month": t.month,
                    "keyword": t.keyword,
                    "count": count,
                    "date": format!("{}-{}", t.year, t.month),
                })
            }
            Dataset::CatKwlist => {
                let (category, keyword) = self.keywords.split_key(key)
                    .ok_or_else(|| format!("no keyword suffix in '{key}'"))?;
                json!({"category": category, "keyword": keyword, "count": count})
            }
            Dataset::CatDocs => json!({"category": key, "doc_count": count}),
            Dataset::Docs => unreachable!(),
        };
        Ok(Some(BulkDoc { id: None, source }))
    }

    fn parse_doc(&mut self, line: &str) -> Result<BulkDoc, String> {
        let doc: CleanedDoc = serde_json::from_str(line).map_err(|e| format!("bad json: {e}"))?;
        self.ordinal += 1;
        let id = doc.page_id_str().unwrap_or_else(|| self.ordinal.to_string());
        let source = json!({
            "page_id": doc.page_id_str(),
            "title": doc.title,
            "timestamp": doc.timestamp,
            "categories": doc.categories,
            "text": doc.text,
        });
        Ok(BulkDoc { id: Some(id), source })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub dataset: Dataset,
    pub lines: LineStats,
    pub bulk: BulkStats,
    /// Documents in the index after the refresh.
    pub count: u64,
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<16} {:>12} documents ({} indexed, {} failed, {} lines skipped)",
            self.dataset.index(),
            utils::with_commas(self.count),
            utils::with_commas(self.bulk.success),
            self.bulk.failed,
            self.lines.skipped,
        )
    }
}

pub struct Indexer<'a, B: SearchBackend> {
    backend: &'a B,
    source: &'a DataSource,
    keywords: &'a Keywords,
    paths: &'a DatasetPaths,
    chunk: usize,
}

impl<'a, B: SearchBackend> Indexer<'a, B> {
    pub fn new(backend: &'a B, source: &'a DataSource, keywords: &'a Keywords, config: &'a Config) -> Self {
        Self {
            backend,
            source,
            keywords,
            paths: &config.datasets,
            chunk: config.bulk_chunk.max(1),
        }
    }

    /// Drop and recreate the index of `dataset`, then load its source into it.
    pub fn run(&self, dataset: Dataset) -> Result<IndexReport> {
        let index = dataset.index();
        if self.backend.index_exists(index)? {
            self.backend.delete_index(index)?;
            info!("deleted old index {index}");
        }
        self.backend.create_index(index, &dataset.schema())?;
        info!("created index {index}");

        let location = dataset.location(self.paths);
        let mut parser = RecordParser::new(dataset, self.keywords);
        let mut lines = LineStats::default();
        let mut bulk = BulkStats::default();
        let mut batch = Vec::with_capacity(self.chunk);

        self.source.lines(location, |line| {
            lines.read += 1;
            match parser.parse(line) {
                Ok(Some(doc)) => batch.push(doc),
                Ok(None) => {}
                Err(reason) => lines.skip(dataset.name(), reason),
            }
            if batch.len() >= self.chunk {
                bulk.add(self.backend.bulk(index, &batch)?);
                lines.emitted += batch.len() as u64;
                batch.clear();
                if dataset == Dataset::Docs && lines.emitted % 1000 < self.chunk as u64 {
                    info!("{index}: {} documents sent", utils::with_commas(lines.emitted));
                }
            }
            Ok(())
        })?;
        if !batch.is_empty() {
            bulk.add(self.backend.bulk(index, &batch)?);
            lines.emitted += batch.len() as u64;
        }

        info!("{index}: {} indexed, {} failed, {} skipped", bulk.success, bulk.failed, lines.skipped);
        if bulk.failed > 0 {
            warn!("{index}: {} documents were rejected", bulk.failed);
        }
        self.backend.refresh(index)?;
        let count = self.backend.count(index)?;
        Ok(IndexReport { dataset, lines, bulk, count })
    }

    /// Every dataset in order. Stops at the first failing one.
    pub fn run_all(&self) -> Result<Vec<IndexReport>> {
        Dataset::ALL.iter()
            .enumerate()
            .map(|(i, &dataset)| {
                info!("[{}/{}] indexing {dataset}", i + 1, Dataset::ALL.len());
                self.run(dataset)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_lines_need_two_fields_and_an_integer() {
        assert_eq!(aggregate_fields("việt\t12"), Ok(("việt", 12)));
        assert!(aggregate_fields("việt").is_err());
        assert!(aggregate_fields("việt\t1\t2").is_err());
        assert!(aggregate_fields("việt\tmany").is_err());
    }

    #[test]
    fn trend_keys_with_and_without_separator() {
        let expected = TrendKey { year: "2023", month: "11", keyword: "internet" };
        assert_eq!(parse_trend_key(&format!("2023-11{SEP}internet")), Some(expected.clone()));
        assert_eq!(parse_trend_key("2023-11internet"), Some(expected));
        assert_eq!(parse_trend_key(&format!("2023-1{SEP}internet")), None);
        assert_eq!(parse_trend_key(&format!("2023-11{SEP}")), None);
        assert_eq!(parse_trend_key("internet"), None);
    }

    #[test]
    fn docs_fall_back_to_ordinal_ids() {
        let keywords = Keywords::defaults();
        let mut parser = RecordParser::new(Dataset::Docs, &keywords);
        let a = parser.parse(r#"{"page_id": 7, "title": "A", "text": "x"}"#).unwrap().unwrap();
        assert!(parser.parse("{not json").is_err());
        let b = parser.parse(r#"{"title": "B", "text": "y"}"#).unwrap().unwrap();
        assert_eq!(a.id.as_deref(), Some("7"));
        assert_eq!(a.source["page_id"], "7");
        assert_eq!(b.id.as_deref(), Some("2"));
        assert_eq!(b.source["categories"], json!([]));
    }

    #[test]
    fn category_keyword_records() {
        let keywords = Keywords::new(["google"]);
        let mut parser = RecordParser::new(Dataset::CatKwlist, &keywords);
        let doc = parser.parse("Công nghệgoogle\t4").unwrap().unwrap();
        assert_eq!(doc.id, None);
        assert_eq!(doc.source, json!({"category": "Công nghệ", "keyword": "google", "count": 4}));
        assert!(parser.parse("google\t4").is_err());
        assert_eq!(parser.parse("   "), Ok(None));
    }

    #[test]
    fn every_schema_carries_the_analyzer() {
        for dataset in Dataset::ALL {
            let schema = dataset.schema();
            assert_eq!(schema["settings"]["number_of_shards"], 3);
            assert_eq!(schema["settings"]["analysis"]["analyzer"]["vietnamese"]["tokenizer"], "standard");
            assert!(schema["mappings"]["properties"].is_object());
            assert_eq!(dataset.name().parse::<Dataset>().unwrap(), dataset);
        }
        assert_eq!("wiki_trend".parse::<Dataset>().unwrap(), Dataset::Trend);
    }

    #[test]
    fn date_formats() {
        let docs = Dataset::Docs.mappings();
        assert_eq!(docs["properties"]["timestamp"]["format"], "iso8601");
        let trend = Dataset::Trend.mappings();
        assert_eq!(trend["properties"]["date"]["format"], "yyyy-MM");
    }
}
