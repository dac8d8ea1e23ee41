//! The four streaming mappers. Each reads `CleanedDoc` JSON lines and writes `key\tcount` lines.

use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::info;

use crate::constant::*;
use crate::lexicon::Keywords;
use crate::misc::*;
use crate::model::{CleanedDoc, KeyValue};
use crate::token::{normalize, Tokenizer};

pub trait Mapper {
    fn name(&self) -> &'static str;

    fn map(&self, doc: &CleanedDoc) -> Vec<KeyValue>;
}

/// `(word, 1)` for every qualifying word of the text.
pub struct WordCount<'a> {
    pub tokenizer: &'a Tokenizer,
}

/// `(YYYY-MM SEP keyword, n)` per keyword found in a document.
pub struct Trend<'a> {
    pub tokenizer: &'a Tokenizer,
    pub keywords: &'a Keywords,
}

/// `(category SEP keyword, n)` for every category crossed with every keyword of the document.
pub struct CategoryKeywords<'a> {
    pub tokenizer: &'a Tokenizer,
    pub keywords: &'a Keywords,
}

/// `(category, 1)` per category of a document.
pub struct CategoryDocs;

/// The first seven chars of an ISO timestamp, `None` when it is shorter.
pub fn month_bucket(timestamp: &str) -> Option<&str> {
    let end = match timestamp.char_indices().nth(7) {
        Some((i, _)) => i,
        None if timestamp.chars().count() == 7 => timestamp.len(),
        None => return None,
    };
    Some(&timestamp[..end])
}

pub fn composite_key(a: &str, b: &str) -> String {
    format!("{a}{SEP}{b}")
}

impl Mapper for WordCount<'_> {
    fn name(&self) -> &'static str {
        "wordcount"
    }

    fn map(&self, doc: &CleanedDoc) -> Vec<KeyValue> {
        let text = normalize(&doc.text);
        self.tokenizer.words(&text)
            .map(|w| KeyValue::new(w, 1))
            .collect()
    }
}

impl Mapper for Trend<'_> {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn map(&self, doc: &CleanedDoc) -> Vec<KeyValue> {
        let Some(month) = doc.timestamp.as_deref().and_then(month_bucket) else {
            return vec![];
        };
        let text = normalize(&doc.text);
        self.keywords.count(self.tokenizer.keyword_tokens(&text))
            .into_iter()
            .map(|(kw, n)| KeyValue::new(composite_key(month, kw), n))
            .collect()
    }
}

impl Mapper for CategoryKeywords<'_> {
    fn name(&self) -> &'static str {
        "cat-kwlist"
    }

    fn map(&self, doc: &CleanedDoc) -> Vec<KeyValue> {
        if doc.categories.is_empty() {
            return vec![];
        }
        let text = normalize(&doc.text);
        let counts = self.keywords.count(self.tokenizer.keyword_tokens(&text));
        if counts.is_empty() {
            return vec![];
        }
        doc.categories.iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .flat_map(|c| counts.iter().map(move |(kw, n)| KeyValue::new(composite_key(c, kw), *n)))
            .collect()
    }
}

impl Mapper for CategoryDocs {
    fn name(&self) -> &'static str {
        "cat-docs"
    }

    fn map(&self, doc: &CleanedDoc) -> Vec<KeyValue> {
        doc.categories.iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| KeyValue::new(c, 1))
            .collect()
    }
}

/// Drive `mapper` over a stream of JSON lines. Blank and unparsable lines are skipped.
pub fn run_mapper<M, R, W>(mapper: &M, input: R, out: &mut W) -> Result<LineStats>
where
    M: Mapper + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut stats = LineStats::default();
    for_each_line(input, |line| {
        stats.read += 1;
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        match serde_json::from_str::<CleanedDoc>(line) {
            Ok(doc) => {
                for kv in mapper.map(&doc) {
                    writeln!(out, "{kv}")?;
                    stats.emitted += 1;
                }
            }
            Err(e) => stats.skip("json", e),
        }
        Ok(())
    })?;
    out.flush()?;
    info!(
        "{} mapper done: {} lines, {} pairs, {} skipped",
        mapper.name(), stats.read, stats.emitted, stats.skipped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use itertools::Itertools;

    use super::*;
    use crate::token::is_vietnamese_word;

    fn doc(ts: Option<&str>, categories: &[&str], text: &str) -> CleanedDoc {
        CleanedDoc {
            timestamp: ts.map(str::to_string),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            text: text.into(),
            ..Default::default()
        }
    }

    fn lines(kvs: Vec<KeyValue>) -> Vec<String> {
        kvs.into_iter().map(|kv| kv.to_string()).collect()
    }

    #[test]
    fn month_bucket_needs_seven_chars() {
        assert_eq!(month_bucket("2023-11-05T00:00:00Z"), Some("2023-11"));
        assert_eq!(month_bucket("2023-11"), Some("2023-11"));
        assert_eq!(month_bucket("2023-1"), None);
        assert_eq!(month_bucket(""), None);
    }

    #[test]
    fn wordcount_keys_are_vietnamese_words() {
        let tokenizer = Tokenizer::new(["của"]);
        let mapper = WordCount { tokenizer: &tokenizer };
        let text = "Đà Nẵng là thành phố của VIỆT NAM, có Internet từ 1997. naïve café x2ả";
        let out = mapper.map(&doc(None, &[], text));
        assert!(!out.is_empty());
        for kv in &out {
            assert_eq!(kv.count, 1);
            assert_eq!(kv.key, kv.key.to_lowercase());
            let len = kv.key.chars().count();
            assert!((2..=40).contains(&len));
            assert!(!kv.key.chars().any(|c| c.is_numeric()));
            assert!(is_vietnamese_word(&kv.key));
        }
        assert_eq!(
            out.iter().map(|kv| kv.key.as_str()).collect_vec(),
            vec!["đà", "nẵng", "là", "thành", "phố", "việt", "có", "từ"]
        );
    }

    #[test]
    fn trend_counts_keywords_per_month() {
        let tokenizer = Tokenizer::new(Vec::<String>::new());
        let keywords = Keywords::defaults();
        let mapper = Trend { tokenizer: &tokenizer, keywords: &keywords };

        let out = lines(mapper.map(&doc(Some("2023-11-05T00:00:00Z"), &[], "Internet và INTERNET, Google")));
        assert_eq!(out, vec!["2023-11\u{1}google\t1", "2023-11\u{1}internet\t2"]);

        assert!(mapper.map(&doc(Some("2023"), &[], "internet")).is_empty());
        assert!(mapper.map(&doc(None, &[], "internet")).is_empty());
    }

    #[test]
    fn keyword_jobs_ignore_alphanumeric_tokens() {
        let tokenizer = Tokenizer::new(Vec::<String>::new());
        let keywords = Keywords::defaults();
        let text = "google2023 mạng4G web2internet";
        let trend = Trend { tokenizer: &tokenizer, keywords: &keywords };
        assert!(trend.map(&doc(Some("2023-11-05T00:00:00Z"), &[], text)).is_empty());
        let cat = CategoryKeywords { tokenizer: &tokenizer, keywords: &keywords };
        assert!(cat.map(&doc(None, &["Công nghệ"], text)).is_empty());
    }

    #[test]
    fn category_keywords_cross_product() {
        let tokenizer = Tokenizer::new(Vec::<String>::new());
        let keywords = Keywords::defaults();
        let mapper = CategoryKeywords { tokenizer: &tokenizer, keywords: &keywords };

        let out = lines(mapper.map(&doc(None, &["Công nghệ", " ", "Mạng xã hội"], "google mạng Google")));
        assert_eq!(out, vec![
            "Công nghệ\u{1}google\t2",
            "Công nghệ\u{1}mạng\t1",
            "Mạng xã hội\u{1}google\t2",
            "Mạng xã hội\u{1}mạng\t1",
        ]);
        assert!(mapper.map(&doc(None, &[], "google")).is_empty());
        assert!(mapper.map(&doc(None, &["A"], "không có gì")).is_empty());
    }

    #[test]
    fn category_docs_once_per_category() {
        let out = lines(CategoryDocs.map(&doc(None, &["Lịch sử", "", "Địa lý"], "")));
        assert_eq!(out, vec!["Lịch sử\t1", "Địa lý\t1"]);
    }

    #[test]
    fn run_skips_malformed_lines() {
        let input = concat!(
            r#"{"categories": ["A", "B"]}"#, "\n",
            "{broken\n",
            "   \n",
            r#"{"categories": ["A"], "text": "x"}"#, "\n",
        );
        let mut out = vec![];
        let stats = run_mapper(&CategoryDocs, Cursor::new(input), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "A\t1\nB\t1\nA\t1\n");
        assert_eq!((stats.read, stats.emitted, stats.skipped), (4, 3, 1));
    }
}
