//! Read-only views over the indices: one-shot pages or an interactive prompt.

mod analysis;
mod cache;
mod pages;
mod render;

pub use analysis::*;
pub use cache::TtlCache;

use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::constant::*;
use crate::error::WikiError;
use crate::es::SearchBackend;

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Page {
    /// Cluster version and which indices exist
    Status,
    /// Full text search over the articles
    Search(SearchArgs),
    /// Size and top categories of the article index
    Stats,
    /// Most frequent Vietnamese words
    #[command(name = "wordcount")]
    WordCount(WordCountArgs),
    /// Keyword mentions per month
    Trend(TrendArgs),
    /// Documents and keywords per category
    Categories(CategoryArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchField {
    /// Title (boosted) and text
    All,
    Title,
    Text,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct SearchArgs {
    #[arg(required = true)]
    pub query: Vec<String>,
    #[arg(long, value_enum, default_value_t = SearchField::All)]
    pub field: SearchField,
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(5..=100))]
    pub size: u16,
    /// Disable fuzzy matching
    #[arg(long)]
    pub exact: bool,
    #[arg(long)]
    pub no_highlight: bool,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct WordCountArgs {
    #[arg(long, default_value_t = 50)]
    pub top: usize,
    #[arg(long, default_value_t = 1)]
    pub min_count: i64,
    /// Case-insensitive substring filter
    #[arg(long)]
    pub contains: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct TrendArgs {
    /// Keywords to chart, up to five; defaults to the three most frequent
    #[arg(short, long = "keyword")]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct CategoryArgs {
    #[arg(long, default_value_t = 30)]
    pub top: usize,
    #[arg(long, default_value_t = 1)]
    pub min_docs: i64,
    /// Keyword breakdown of one category; defaults to the most active one
    #[arg(long)]
    pub category: Option<String>,
    /// Category breakdown of one keyword; defaults to the most frequent one
    #[arg(long)]
    pub keyword: Option<String>,
    #[arg(long, default_value_t = 15)]
    pub top_keywords: usize,
}

/// Request body of the search page.
pub fn search_body(args: &SearchArgs) -> Value {
    let text = args.query.iter().join(" ");
    let fuzziness = if args.exact { "0" } else { "AUTO" };
    let query = match args.field {
        SearchField::All => json!({"multi_match": {
            "query": text,
            "fields": ["title^3", "text"],
            "fuzziness": fuzziness,
        }}),
        SearchField::Title => json!({"match": {"title": {"query": text, "fuzziness": fuzziness}}}),
        SearchField::Text => json!({"match": {"text": {"query": text, "fuzziness": fuzziness}}}),
    };
    let mut body = json!({"query": query, "size": args.size});
    if !args.no_highlight {
        body["highlight"] = json!({"fields": {
            "title": {"pre_tags": ["<mark>"], "post_tags": ["</mark>"]},
            "text": {
                "fragment_size": 200,
                "number_of_fragments": 3,
                "pre_tags": ["<mark>"],
                "post_tags": ["</mark>"],
            },
        }});
    }
    body
}

/// An error as shown on a page, with a hint on how to fix it.
pub fn error_message(err: &anyhow::Error) -> String {
    let hint = err.downcast_ref::<WikiError>()
        .map(WikiError::hint)
        .unwrap_or("check the log output for details");
    format!("error: {err:#}\nhint: {hint}\n")
}

/// Up to `DASH_FETCH_SIZE` sources of `index`, sorted on one field.
fn fetch_rows<B, T>(backend: &B, index: &str, fields: &[&str], sort: Value) -> Result<Vec<T>>
where
    B: SearchBackend + ?Sized,
    T: DeserializeOwned,
{
    let body = json!({"size": DASH_FETCH_SIZE, "_source": fields, "sort": [sort]});
    let resp = backend.search(index, &body)?;
    let hits = resp["hits"]["hits"].as_array().map(Vec::as_slice).unwrap_or_default();
    let mut bad = 0;
    let rows = hits.iter()
        .filter_map(|hit| match serde_json::from_value(hit["_source"].clone()) {
            Ok(row) => Some(row),
            Err(e) => {
                bad += 1;
                debug!("{index}: unusable hit {}: {e}", hit["_id"]);
                None
            }
        })
        .collect_vec();
    if bad > 0 {
        warn!("{index}: {bad} hits without the expected fields");
    }
    debug!("{index}: {} rows loaded", rows.len());
    Ok(rows)
}

pub struct Dashboard<'a, B: SearchBackend> {
    backend: &'a B,
    words: TtlCache<Vec<WordRow>>,
    trend: TtlCache<Vec<TrendRow>>,
    cat_docs: TtlCache<Vec<CatDocRow>>,
    cat_keywords: TtlCache<Vec<CatKwRow>>,
}

impl<'a, B: SearchBackend> Dashboard<'a, B> {
    pub fn new(backend: &'a B, ttl: Duration) -> Self {
        Self {
            backend,
            words: TtlCache::new(ttl),
            trend: TtlCache::new(ttl),
            cat_docs: TtlCache::new(ttl),
            cat_keywords: TtlCache::new(ttl),
        }
    }

    /// Render `page`. Failures become part of the output.
    pub fn render(&mut self, page: &Page) -> String {
        let result = match page {
            Page::Status => self.status(),
            Page::Search(args) => self.search(args),
            Page::Stats => self.stats(),
            Page::WordCount(args) => self.wordcount(args),
            Page::Trend(args) => self.trend(args),
            Page::Categories(args) => self.categories(args),
        };
        result.unwrap_or_else(|e| error_message(&e))
    }

    /// Drop every cached dataset.
    pub fn reload(&mut self) {
        self.words.invalidate();
        self.trend.invalidate();
        self.cat_docs.invalidate();
        self.cat_keywords.invalidate();
    }

    fn word_rows(&mut self) -> Result<&[WordRow]> {
        let backend = self.backend;
        self.words
            .get_or_load(|| fetch_rows(backend, IDX_WORDCOUNT, &["word", "count"], json!({"count": "desc"})))
            .map(Vec::as_slice)
    }

    fn trend_rows(&mut self) -> Result<&[TrendRow]> {
        let backend = self.backend;
        self.trend
            .get_or_load(|| fetch_rows(backend, IDX_TREND, &["keyword", "count", "date"], json!({"date": "asc"})))
            .map(Vec::as_slice)
    }

    fn cat_doc_rows(&mut self) -> Result<&[CatDocRow]> {
        let backend = self.backend;
        self.cat_docs
            .get_or_load(|| fetch_rows(backend, IDX_CAT_DOCS, &["category", "doc_count"], json!({"doc_count": "desc"})))
            .map(Vec::as_slice)
    }

    fn cat_keyword_rows(&mut self) -> Result<&[CatKwRow]> {
        let backend = self.backend;
        self.cat_keywords
            .get_or_load(|| {
                fetch_rows(backend, IDX_CAT_KWLIST, &["category", "keyword", "count"], json!({"count": "desc"}))
            })
            .map(Vec::as_slice)
    }
}

#[derive(Debug, Parser)]
#[command(no_binary_name = true, name = "viwiki>")]
struct PromptLine {
    #[command(subcommand)]
    page: Page,
}

/// Split a prompt line on whitespace, keeping double-quoted parts together.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = vec![];
    let mut cur = String::new();
    let mut quoted = false;
    let mut pending = false;
    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    args.push(std::mem::take(&mut cur));
                    pending = false;
                }
            }
            c => {
                cur.push(c);
                pending = true;
            }
        }
    }
    if pending {
        args.push(cur);
    }
    args
}

/// Read pages from stdin until `quit` or end of input. The cache lives for the session.
pub fn interactive<B: SearchBackend>(dashboard: &mut Dashboard<B>) -> Result<()> {
    println!("pages: status, search <query>, stats, wordcount, trend, categories");
    println!("`<page> --help` lists options, `reload` clears the cache, `quit` leaves");
    while let Some(line) = utils::input("viwiki> ")? {
        match line.trim() {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "reload" => {
                dashboard.reload();
                println!("cache cleared");
                continue;
            }
            _ => {}
        }
        match PromptLine::try_parse_from(split_args(&line)) {
            Ok(prompt) => print!("{}", dashboard.render(&prompt.page)),
            Err(e) => {
                let _ = e.print();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_body_per_field() {
        let mut args = SearchArgs {
            query: vec!["Hà".into(), "Nội".into()],
            field: SearchField::All,
            size: 10,
            exact: false,
            no_highlight: false,
        };
        let body = search_body(&args);
        assert_eq!(body["query"]["multi_match"]["query"], "Hà Nội");
        assert_eq!(body["query"]["multi_match"]["fields"], json!(["title^3", "text"]));
        assert_eq!(body["query"]["multi_match"]["fuzziness"], "AUTO");
        assert_eq!(body["highlight"]["fields"]["text"]["fragment_size"], 200);

        args.field = SearchField::Title;
        args.exact = true;
        args.no_highlight = true;
        let body = search_body(&args);
        assert_eq!(body["query"]["match"]["title"]["fuzziness"], "0");
        assert!(body.get("highlight").is_none());
    }

    #[test]
    fn prompt_lines_parse_into_pages() {
        assert_eq!(split_args(r#"categories --category "Lịch sử"  --top 5"#),
                   vec!["categories", "--category", "Lịch sử", "--top", "5"]);
        assert_eq!(split_args(r#"search """#), vec!["search", ""]);

        let page = PromptLine::try_parse_from(split_args("trend -k internet -k google")).unwrap().page;
        assert_eq!(page, Page::Trend(TrendArgs { keywords: vec!["internet".into(), "google".into()] }));
        assert!(PromptLine::try_parse_from(split_args("search --size 500 x")).is_err());
        assert!(PromptLine::try_parse_from(split_args("search")).is_err());
    }

    #[test]
    fn error_messages_carry_hints() {
        let err = anyhow::Error::from(WikiError::MissingIndex("wiki_trend".into()));
        let msg = error_message(&err);
        assert!(msg.contains("index 'wiki_trend' does not exist"));
        assert!(msg.contains("viwiki index all"));
    }
}
