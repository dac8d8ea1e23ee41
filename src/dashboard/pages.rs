use std::fmt::Write as _;

use anyhow::Result;
use itertools::Itertools;
use serde_json::{json, Value};
use utils::{ellipsize, with_commas};

use super::analysis::*;
use super::render::*;
use super::{error_message, search_body, CategoryArgs, Dashboard, SearchArgs, TrendArgs, WordCountArgs};
use crate::constant::*;
use crate::es::SearchBackend;

const SNIPPET_CHARS: usize = 300;
const SHOWN_FRAGMENTS: usize = 2;
const SHOWN_CATEGORIES: usize = 8;
const TOP_CATEGORIES: usize = 20;

fn no_data(index: &str) -> String {
    format!("no data in {index}, run `viwiki index all` first\n")
}

impl<'a, B: SearchBackend> Dashboard<'a, B> {
    pub(super) fn status(&mut self) -> Result<String> {
        let mut out = heading("Status");
        match self.backend.info() {
            Ok(info) => {
                let version = info["version"]["number"].as_str().unwrap_or("?");
                out += &metric("Elasticsearch", format!("v{version}"));
            }
            Err(e) => {
                out += &metric("Elasticsearch", "not reachable");
                out += &error_message(&e);
                return Ok(out);
            }
        }
        let docs = match self.backend.count(IDX_DOCS) {
            Ok(n) => format!("{} documents", with_commas(n)),
            Err(_) => "missing".to_string(),
        };
        out += &metric(IDX_DOCS, docs);
        let existing = AGGREGATE_INDICES.iter()
            .filter(|index| self.backend.index_exists(index).unwrap_or(false))
            .count();
        out += &metric("MapReduce indices", format!("{existing}/{}", AGGREGATE_INDICES.len()));
        Ok(out)
    }

    pub(super) fn search(&mut self, args: &SearchArgs) -> Result<String> {
        let resp = self.backend.search(IDX_DOCS, &search_body(args))?;
        let hits = resp["hits"]["hits"].as_array().map(Vec::as_slice).unwrap_or_default();
        let total = resp["hits"]["total"]["value"].as_u64().unwrap_or(hits.len() as u64);
        let mut out = heading(&format!("Search: {}", args.query.iter().join(" ")));
        writeln!(out, "{} results in {}ms", with_commas(total), resp["took"].as_u64().unwrap_or(0))?;
        if hits.is_empty() {
            out += "no matching articles\n";
            return Ok(out);
        }
        for (i, hit) in hits.iter().enumerate() {
            out += &render_hit(i + 1, hit, !args.no_highlight)?;
        }
        Ok(out)
    }

    pub(super) fn stats(&mut self) -> Result<String> {
        let count = self.backend.count(IDX_DOCS)?;
        let stats = self.backend.index_stats(IDX_DOCS)?;
        let total = &stats["_all"]["total"];
        let mut out = heading(&format!("Index {IDX_DOCS}"));
        out += &metric("documents", with_commas(count));
        let size_mb = total["store"]["size_in_bytes"].as_u64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
        out += &metric("store size", format!("{size_mb:.1} MB"));
        out += &metric("segments", total["segments"]["count"].as_u64().unwrap_or(0));
        out += &metric("deleted docs", total["docs"]["deleted"].as_u64().unwrap_or(0));

        let aggs = self.backend.search(IDX_DOCS, &json!({
            "size": 0,
            "aggs": {"top_categories": {"terms": {"field": "categories", "size": TOP_CATEGORIES}}},
        }))?;
        out += &heading(&format!("Top {TOP_CATEGORIES} categories"));
        let buckets = aggs["aggregations"]["top_categories"]["buckets"].as_array().cloned().unwrap_or_default();
        if buckets.is_empty() {
            out += "no category statistics yet\n";
        } else {
            let mut table = Table::new(&["#", "category", "docs"]).numeric(0).numeric(2);
            for (i, b) in buckets.iter().enumerate() {
                table.row([
                    (i + 1).to_string(),
                    b["key"].as_str().unwrap_or_default().to_string(),
                    with_commas(b["doc_count"].as_u64().unwrap_or(0)),
                ]);
            }
            out += &table.to_string();
        }

        let settings = self.backend.index_settings(IDX_DOCS)?;
        let setting = |key: &str| match &settings[key] {
            Value::Null => "N/A".to_string(),
            Value::String(s) => s.clone(),
            v => v.to_string(),
        };
        out += &heading("Settings");
        out += &metric("shards", setting("number_of_shards"));
        out += &metric("replicas", setting("number_of_replicas"));
        out += &metric("created", format_epoch_millis(&setting("creation_date")));
        Ok(out)
    }

    pub(super) fn wordcount(&mut self, args: &WordCountArgs) -> Result<String> {
        let rows = self.word_rows()?;
        if rows.is_empty() {
            return Ok(no_data(IDX_WORDCOUNT));
        }
        let mut out = heading("Word count");
        out += &metric("distinct words", with_commas(rows.len()));
        out += &metric("occurrences", with_commas(rows.iter().map(|r| r.count).sum::<i64>()));
        out += &metric("most frequent", &rows[0].word);

        let shown = filter_words(rows, args.top, args.min_count, args.contains.as_deref());
        out += &heading(&format!("Top {} words", shown.len()));
        if shown.is_empty() {
            out += "no word matches the filters\n";
            return Ok(out);
        }
        let bars = shown.iter().map(|r| (r.word.as_str(), r.count)).collect_vec();
        out += &bar_chart(&bars);
        out += "\n";
        let mut table = Table::new(&["word", "count"]).numeric(1);
        shown.iter().for_each(|r| table.row([r.word.clone(), with_commas(r.count)]));
        out += &table.to_string();
        Ok(out)
    }

    pub(super) fn trend(&mut self, args: &TrendArgs) -> Result<String> {
        let rows = self.trend_rows()?;
        if rows.is_empty() {
            return Ok(no_data(IDX_TREND));
        }
        let overview = trend_overview(rows);
        let mut out = heading("Keyword trend");
        out += &metric("keywords", with_commas(overview.keywords));
        out += &metric("months", overview.months);
        out += &metric("mentions", with_commas(overview.total));
        out += &metric("mean per month", format!("{:.0}", overview.mean_per_month));

        let top = totals_by(rows, |r| r.keyword.as_str(), |r| r.count);
        let top = &top[..top.len().min(TOP_TREND_KEYWORDS)];
        out += &heading(&format!("Top {} keywords", top.len()));
        out += &bar_chart(top);

        let mut data = Table::new(&["keyword", "month", "count"]).numeric(2);
        for keyword in select_keywords(&args.keywords, top) {
            out += &heading(&format!("Keyword: {keyword}"));
            let Some(kt) = keyword_trend(rows, &keyword) else {
                out += "no mentions\n";
                continue;
            };
            kt.series.iter().for_each(|(month, n)| data.row([kt.keyword.clone(), month.clone(), with_commas(n)]));
            out += &metric("total", with_commas(kt.total));
            out += &metric("mean per month", format!("{:.0}", kt.mean));
            out += &metric("peak", format!("{} in {}", with_commas(kt.peak.1), kt.peak.0));
            if let (Some(pct), Some(growth)) = (kt.growth_pct, kt.growth()) {
                let label = match growth {
                    Growth::Rising => "rising",
                    Growth::Falling => "falling",
                    Growth::Stable => "stable",
                };
                out += &metric("growth", format!("{label} {pct:+.1}%"));
            }
            out += &bar_chart(&kt.series);
        }
        if !data.is_empty() {
            out += &heading("Selected keyword data");
            out += &data.to_string();
        }

        let monthly = monthly_totals(rows);
        out += &heading("Mentions per month");
        out += &bar_chart(&monthly);
        out += &heading("Top 5 months");
        for (month, count) in top_months(&monthly, 5) {
            writeln!(out, "  {month}: {}", with_commas(count))?;
        }
        Ok(out)
    }

    pub(super) fn categories(&mut self, args: &CategoryArgs) -> Result<String> {
        let mut out = heading("Documents per category");
        let docs = self.cat_doc_rows()?;
        if docs.is_empty() {
            out += &no_data(IDX_CAT_DOCS);
        } else {
            let total = docs.iter().map(|r| r.doc_count).sum::<i64>();
            out += &metric("categories", with_commas(docs.len()));
            out += &metric("documents", with_commas(total));
            out += &metric("mean per category", format!("{:.0}", total as f64 / docs.len() as f64));
            let shown = filter_cat_docs(docs, args.top, args.min_docs);
            let bars = shown.iter().map(|r| (r.category.as_str(), r.doc_count)).collect_vec();
            out += "\n";
            out += &bar_chart(&bars);
        }

        out += &heading("Keywords per category");
        let kw = self.cat_keyword_rows()?;
        if kw.is_empty() {
            out += &no_data(IDX_CAT_KWLIST);
            return Ok(out);
        }
        out += &metric("categories", with_commas(kw.iter().map(|r| &r.category).unique().count()));
        out += &metric("keywords", kw.iter().map(|r| &r.keyword).unique().count());
        out += &metric("mentions", with_commas(kw.iter().map(|r| r.count).sum::<i64>()));

        let by_keyword = totals_by(kw, |r| r.keyword.as_str(), |r| r.count);
        out += &heading("Top keywords");
        out += &bar_chart(&by_keyword[..by_keyword.len().min(10)]);

        let by_category = totals_by(kw, |r| r.category.as_str(), |r| r.count);
        out += &heading("Most active categories");
        out += &bar_chart(&by_category[..by_category.len().min(TOP_CATEGORIES)]);

        let category = args.category.as_deref().or(by_category.first().map(|(c, _)| *c));
        if let Some(category) = category {
            let rows = category_breakdown(kw, category, args.top_keywords);
            out += &heading(&format!("Category: {category}"));
            out += &metric("keywords found", rows.len());
            out += &metric("mentions", with_commas(rows.iter().map(|r| r.count).sum::<i64>()));
            let bars = rows.iter().map(|r| (r.keyword.as_str(), r.count)).collect_vec();
            out += &bar_chart(&bars);
        }

        let keyword = args.keyword.as_deref().or(by_keyword.first().map(|(k, _)| *k));
        if let Some(keyword) = keyword {
            let rows = keyword_breakdown(kw, keyword, TOP_CATEGORIES);
            out += &heading(&format!("Keyword: {keyword}"));
            let bars = rows.iter().map(|r| (r.category.as_str(), r.count)).collect_vec();
            if bars.is_empty() {
                out += "no category mentions this keyword\n";
            }
            out += &bar_chart(&bars);
        }
        Ok(out)
    }
}

fn render_hit(rank: usize, hit: &Value, highlight: bool) -> Result<String> {
    let source = &hit["_source"];
    let mut out = String::new();
    let title = hit["highlight"]["title"][0].as_str()
        .filter(|_| highlight)
        .map(terminal_highlight)
        .unwrap_or_else(|| source["title"].as_str().unwrap_or("(untitled)").to_string());
    writeln!(out, "\n{rank}. {title}")?;
    let date = source["timestamp"].as_str().map(format_timestamp).unwrap_or_else(|| "N/A".into());
    let categories = source["categories"].as_array().cloned().unwrap_or_default();
    let page_id = source["page_id"].as_str().unwrap_or("N/A");
    writeln!(
        out,
        "   score {:.2} | date {date} | {} categories | id {page_id}",
        hit["_score"].as_f64().unwrap_or(0.0),
        categories.len(),
    )?;

    let fragments = hit["highlight"]["text"].as_array().filter(|_| highlight);
    match fragments {
        Some(fragments) => {
            for fragment in fragments.iter().filter_map(Value::as_str).take(SHOWN_FRAGMENTS) {
                writeln!(out, "   ...{}...", terminal_highlight(fragment))?;
            }
        }
        None => {
            let text = source["text"].as_str().unwrap_or_default();
            if !text.is_empty() {
                writeln!(out, "   {}", ellipsize(text, SNIPPET_CHARS).replace('\n', " "))?;
            }
        }
    }

    if !categories.is_empty() {
        let shown = categories.iter()
            .filter_map(Value::as_str)
            .take(SHOWN_CATEGORIES)
            .join(", ");
        let more = categories.len().saturating_sub(SHOWN_CATEGORIES);
        if more > 0 {
            writeln!(out, "   [{shown}] (+{more} more)")?;
        } else {
            writeln!(out, "   [{shown}]")?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_with_highlight_and_many_categories() {
        let categories = (1..=10).map(|i| format!("C{i}")).collect_vec();
        let hit = json!({
            "_score": 3.14159,
            "_source": {
                "page_id": "12",
                "title": "Hà Nội",
                "timestamp": "2023-11-05T08:30:00Z",
                "categories": categories,
                "text": "Hà Nội là thủ đô",
            },
            "highlight": {"text": ["<mark>Hà Nội</mark> là", "b", "c"]},
        });
        let out = render_hit(1, &hit, true).unwrap();
        assert!(out.contains("1. Hà Nội"));
        assert!(out.contains("score 3.14 | date 2023-11-05 08:30 | 10 categories | id 12"));
        assert!(out.contains("...[Hà Nội] là..."));
        assert_eq!(out.matches("...").count(), 4);
        assert!(out.contains("C8] (+2 more)"));

        let plain = render_hit(2, &hit, false).unwrap();
        assert!(plain.contains("   Hà Nội là thủ đô"));
    }
}
