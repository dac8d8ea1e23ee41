//! The Elasticsearch calls the pipeline makes, behind `SearchBackend` so the indexer and
//! dashboard also run against the in-memory backend used by `--dry-run`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{Context, Result};
use itertools::Itertools;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::WikiError;

/// One document of a bulk request. `id: None` lets the backend assign one.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkDoc {
    pub id: Option<String>,
    pub source: Value,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkStats {
    pub success: u64,
    pub failed: u64,
}

impl BulkStats {
    pub fn add(&mut self, other: BulkStats) {
        self.success += other.success;
        self.failed += other.failed;
    }
}

pub trait SearchBackend {
    /// Cluster information (`GET /`).
    fn info(&self) -> Result<Value>;
    fn index_exists(&self, index: &str) -> Result<bool>;
    fn delete_index(&self, index: &str) -> Result<()>;
    fn create_index(&self, index: &str, body: &Value) -> Result<()>;
    /// Write `docs` in one request. Item failures are counted, not raised.
    fn bulk(&self, index: &str, docs: &[BulkDoc]) -> Result<BulkStats>;
    fn refresh(&self, index: &str) -> Result<()>;
    fn count(&self, index: &str) -> Result<u64>;
    fn search(&self, index: &str, body: &Value) -> Result<Value>;
    fn index_stats(&self, index: &str) -> Result<Value>;
    /// The `settings.index` object of `index`.
    fn index_settings(&self, index: &str) -> Result<Value>;
}

pub struct EsClient {
    base: String,
    http: Client,
}

impl EsClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client fail")?;
        Ok(Self {
            base: url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Send and map transport errors and non-2xx answers to `WikiError`.
    fn send(&self, method: &'static str, path: &str, req: RequestBuilder) -> Result<Response> {
        debug!("{method} {path}");
        let resp = req.send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                WikiError::Unreachable { url: self.base.clone(), reason: e.to_string() }
            } else {
                WikiError::Source(format!("{method} {path}"), e.to_string())
            }
        })?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        if status == StatusCode::NOT_FOUND && body.contains("index_not_found_exception") {
            let index = path.trim_start_matches('/').split('/').next().unwrap_or_default();
            return Err(WikiError::MissingIndex(index.to_string()).into());
        }
        Err(WikiError::Backend { method, path: path.to_string(), status: status.as_u16(), body }.into())
    }

    fn get_json(&self, path: &str) -> Result<Value> {
        let resp = self.send("GET", path, self.http.get(self.url(path)))?;
        resp.json().with_context(|| format!("decode json of GET {path}"))
    }
}

/// `{"index": ...}` action line plus source line per document.
pub fn bulk_body(index: &str, docs: &[BulkDoc]) -> Result<String> {
    let mut body = String::with_capacity(docs.len() * 256);
    for doc in docs {
        let action = match &doc.id {
            Some(id) => json!({"index": {"_index": index, "_id": id}}),
            None => json!({"index": {"_index": index}}),
        };
        writeln!(body, "{action}")?;
        writeln!(body, "{}", serde_json::to_string(&doc.source)?)?;
    }
    Ok(body)
}

/// Tally the per-item statuses of a bulk response.
pub fn bulk_outcome(resp: &Value) -> BulkStats {
    let mut stats = BulkStats::default();
    let items = resp["items"].as_array().map(Vec::as_slice).unwrap_or_default();
    for item in items {
        let result = item.as_object().and_then(|o| o.values().next());
        let status = result.and_then(|r| r["status"].as_u64()).unwrap_or(0);
        if (200..300).contains(&status) {
            stats.success += 1;
        } else {
            if stats.failed == 0 {
                let reason = result.map(|r| r["error"].to_string()).unwrap_or_default();
                warn!("bulk item failed with status {status}: {reason}");
            }
            stats.failed += 1;
        }
    }
    stats
}

impl SearchBackend for EsClient {
    fn info(&self) -> Result<Value> {
        self.get_json("/")
    }

    fn index_exists(&self, index: &str) -> Result<bool> {
        let resp = self.http.head(self.url(index)).send().map_err(|e| WikiError::Unreachable {
            url: self.base.clone(),
            reason: e.to_string(),
        })?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(WikiError::Backend {
                method: "HEAD",
                path: index.to_string(),
                status: s.as_u16(),
                body: String::new(),
            }.into()),
        }
    }

    fn delete_index(&self, index: &str) -> Result<()> {
        self.send("DELETE", index, self.http.delete(self.url(index)))?;
        Ok(())
    }

    fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        self.send("PUT", index, self.http.put(self.url(index)).json(body))?;
        Ok(())
    }

    fn bulk(&self, index: &str, docs: &[BulkDoc]) -> Result<BulkStats> {
        if docs.is_empty() {
            return Ok(BulkStats::default());
        }
        let path = "_bulk";
        let req = self.http.post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_body(index, docs)?);
        let resp: Value = self.send("POST", path, req)?
            .json()
            .context("decode bulk response")?;
        Ok(bulk_outcome(&resp))
    }

    fn refresh(&self, index: &str) -> Result<()> {
        let path = format!("{index}/_refresh");
        self.send("POST", &path, self.http.post(self.url(&path)))?;
        Ok(())
    }

    fn count(&self, index: &str) -> Result<u64> {
        let resp = self.get_json(&format!("{index}/_count"))?;
        resp["count"].as_u64().context("count missing in _count response")
    }

    fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let path = format!("{index}/_search");
        self.send("POST", &path, self.http.post(self.url(&path)).json(body))?
            .json()
            .with_context(|| format!("decode search response of {index}"))
    }

    fn index_stats(&self, index: &str) -> Result<Value> {
        self.get_json(&format!("{index}/_stats"))
    }

    fn index_settings(&self, index: &str) -> Result<Value> {
        let resp = self.get_json(index)?;
        Ok(resp[index]["settings"]["index"].clone())
    }
}

#[derive(Debug, Default, Clone)]
struct MemIndex {
    body: Value,
    docs: BTreeMap<String, Value>,
    next_auto: u64,
}

/// Keeps indices in memory. Search returns every document, optionally sorted by one field.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    indices: RefCell<BTreeMap<String, MemIndex>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indices.borrow().keys().cloned().collect_vec()
    }

    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.indices.borrow()
            .get(index)
            .map(|i| i.docs.values().cloned().collect_vec())
            .unwrap_or_default()
    }

    pub fn mapping(&self, index: &str) -> Option<Value> {
        self.indices.borrow().get(index).map(|i| i.body.clone())
    }

    fn missing(index: &str) -> anyhow::Error {
        WikiError::MissingIndex(index.to_string()).into()
    }
}

fn sort_docs(docs: &mut [(String, Value)], sort: &Value) {
    let Some((field, order)) = sort.as_array()
        .and_then(|s| s.first())
        .and_then(Value::as_object)
        .and_then(|o| o.iter().next())
    else {
        return;
    };
    let desc = order.as_str() == Some("desc") || order["order"].as_str() == Some("desc");
    docs.sort_by(|(_, a), (_, b)| {
        let (a, b) = (&a[field], &b[field]);
        let ord = match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => a.as_str().unwrap_or_default().cmp(b.as_str().unwrap_or_default()),
        };
        if desc { ord.reverse() } else { ord }
    });
}

impl SearchBackend for MemoryBackend {
    fn info(&self) -> Result<Value> {
        Ok(json!({"version": {"number": "memory"}}))
    }

    fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indices.borrow().contains_key(index))
    }

    fn delete_index(&self, index: &str) -> Result<()> {
        self.indices.borrow_mut()
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| Self::missing(index))
    }

    fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        let mut indices = self.indices.borrow_mut();
        if indices.contains_key(index) {
            return Err(WikiError::Backend {
                method: "PUT",
                path: index.to_string(),
                status: 400,
                body: "resource_already_exists_exception".into(),
            }.into());
        }
        indices.insert(index.to_string(), MemIndex { body: body.clone(), ..Default::default() });
        Ok(())
    }

    fn bulk(&self, index: &str, docs: &[BulkDoc]) -> Result<BulkStats> {
        let mut indices = self.indices.borrow_mut();
        let target = indices.entry(index.to_string()).or_default();
        for doc in docs {
            let id = match &doc.id {
                Some(id) => id.clone(),
                None => {
                    target.next_auto += 1;
                    format!("auto-{:012}", target.next_auto)
                }
            };
            target.docs.insert(id, doc.source.clone());
        }
        Ok(BulkStats { success: docs.len() as u64, failed: 0 })
    }

    fn refresh(&self, index: &str) -> Result<()> {
        self.index_exists(index)?.then_some(()).ok_or_else(|| Self::missing(index))
    }

    fn count(&self, index: &str) -> Result<u64> {
        self.indices.borrow()
            .get(index)
            .map(|i| i.docs.len() as u64)
            .ok_or_else(|| Self::missing(index))
    }

    fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let indices = self.indices.borrow();
        let target = indices.get(index).ok_or_else(|| Self::missing(index))?;
        let mut hits = target.docs.iter()
            .map(|(id, source)| (id.clone(), source.clone()))
            .collect_vec();
        sort_docs(&mut hits, &body["sort"]);
        let mut docs = hits.into_iter()
            .map(|(id, source)| json!({"_id": id, "_score": 1.0, "_source": source}))
            .collect_vec();
        let total = docs.len();
        let size = body["size"].as_u64().unwrap_or(10) as usize;
        docs.truncate(size);
        Ok(json!({
            "took": 0,
            "hits": {"total": {"value": total}, "hits": docs},
            "aggregations": {},
        }))
    }

    fn index_stats(&self, index: &str) -> Result<Value> {
        let count = self.count(index)?;
        Ok(json!({"_all": {"total": {
            "docs": {"count": count, "deleted": 0},
            "store": {"size_in_bytes": 0},
            "segments": {"count": 0},
        }}}))
    }

    fn index_settings(&self, index: &str) -> Result<Value> {
        let indices = self.indices.borrow();
        let target = indices.get(index).ok_or_else(|| Self::missing(index))?;
        Ok(target.body["settings"].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_body_is_ndjson() {
        let docs = [
            BulkDoc { id: Some("7".into()), source: json!({"title": "Huế"}) },
            BulkDoc { id: None, source: json!({"word": "việt", "count": 3}) },
        ];
        let body = bulk_body("wiki_docs", &docs).unwrap();
        let lines = body.lines().map(|l| serde_json::from_str::<Value>(l).unwrap()).collect_vec();
        assert!(body.ends_with('\n'));
        assert_eq!(lines, vec![
            json!({"index": {"_index": "wiki_docs", "_id": "7"}}),
            json!({"title": "Huế"}),
            json!({"index": {"_index": "wiki_docs"}}),
            json!({"word": "việt", "count": 3}),
        ]);
    }

    #[test]
    fn bulk_outcome_counts_items() {
        let resp = json!({"errors": true, "items": [
            {"index": {"status": 201}},
            {"index": {"status": 200}},
            {"index": {"status": 400, "error": {"type": "mapper_parsing_exception"}}},
        ]});
        assert_eq!(bulk_outcome(&resp), BulkStats { success: 2, failed: 1 });
        assert_eq!(bulk_outcome(&json!({})), BulkStats::default());
    }

    #[test]
    fn memory_backend_lifecycle() {
        let mem = MemoryBackend::new();
        assert!(!mem.index_exists("w").unwrap());
        mem.create_index("w", &json!({"settings": {"number_of_shards": 3}})).unwrap();
        assert!(mem.create_index("w", &json!({})).is_err());

        let docs = [3, 9, 5].map(|c| BulkDoc { id: None, source: json!({"count": c}) });
        assert_eq!(mem.bulk("w", &docs).unwrap().success, 3);
        assert_eq!(mem.count("w").unwrap(), 3);
        assert_eq!(mem.index_settings("w").unwrap()["number_of_shards"], 3);

        let resp = mem.search("w", &json!({"size": 2, "sort": [{"count": "desc"}]})).unwrap();
        let counts = resp["hits"]["hits"].as_array().unwrap()
            .iter()
            .map(|h| h["_source"]["count"].as_i64().unwrap())
            .collect_vec();
        assert_eq!(counts, vec![9, 5]);
        assert_eq!(resp["hits"]["total"]["value"], 3);

        mem.delete_index("w").unwrap();
        let err = mem.count("w").unwrap_err();
        assert!(matches!(err.downcast_ref::<WikiError>(), Some(WikiError::MissingIndex(_))));
    }
}
