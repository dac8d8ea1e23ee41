use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Deserialize;

pub const TOP_TREND_KEYWORDS: usize = 20;
pub const MAX_SELECTED_KEYWORDS: usize = 5;
pub const DEFAULT_SELECTED_KEYWORDS: usize = 3;
/// Percent change of the last months over the first ones that counts as a trend.
pub const GROWTH_THRESHOLD: f64 = 10.0;
const GROWTH_WINDOW: usize = 3;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WordRow {
    pub word: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrendRow {
    /// `YYYY-MM`
    pub date: String,
    pub keyword: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatDocRow {
    pub category: String,
    pub doc_count: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatKwRow {
    pub category: String,
    pub keyword: String,
    pub count: i64,
}

/// Sum `value` per `key`, largest total first, ties by key.
pub fn totals_by<'a, T, K, V>(rows: &'a [T], key: K, value: V) -> Vec<(&'a str, i64)>
where
    K: Fn(&'a T) -> &'a str,
    V: Fn(&T) -> i64,
{
    rows.iter()
        .fold(BTreeMap::<&str, i64>::new(), |mut m, row| {
            *m.entry(key(row)).or_insert(0) += value(row);
            m
        })
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)))
        .collect_vec()
}

pub fn filter_words<'a>(rows: &'a [WordRow], top: usize, min_count: i64, contains: Option<&str>) -> Vec<&'a WordRow> {
    let needle = contains.map(str::to_lowercase).filter(|s| !s.is_empty());
    rows.iter()
        .filter(|r| r.count >= min_count)
        .filter(|r| needle.as_ref().map_or(true, |n| r.word.to_lowercase().contains(n.as_str())))
        .take(top)
        .collect_vec()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendOverview {
    pub keywords: usize,
    pub months: usize,
    pub total: i64,
    pub mean_per_month: f64,
}

pub fn trend_overview(rows: &[TrendRow]) -> TrendOverview {
    let monthly = monthly_totals(rows);
    let total = rows.iter().map(|r| r.count).sum::<i64>();
    TrendOverview {
        keywords: rows.iter().map(|r| r.keyword.as_str()).unique().count(),
        months: monthly.len(),
        total,
        mean_per_month: if monthly.is_empty() { 0.0 } else { total as f64 / monthly.len() as f64 },
    }
}

/// Totals per month in calendar order.
pub fn monthly_totals(rows: &[TrendRow]) -> Vec<(&str, i64)> {
    totals_by(rows, |r| r.date.as_str(), |r| r.count)
        .into_iter()
        .sorted_by_key(|(month, _)| *month)
        .collect_vec()
}

pub fn top_months<'a>(monthly: &[(&'a str, i64)], n: usize) -> Vec<(&'a str, i64)> {
    monthly.iter()
        .copied()
        .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)))
        .take(n)
        .collect_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    Rising,
    Falling,
    Stable,
}

pub fn classify_growth(pct: f64) -> Growth {
    if pct > GROWTH_THRESHOLD {
        Growth::Rising
    } else if pct < -GROWTH_THRESHOLD {
        Growth::Falling
    } else {
        Growth::Stable
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordTrend {
    pub keyword: String,
    /// `(month, count)` in calendar order.
    pub series: Vec<(String, i64)>,
    pub total: i64,
    pub mean: f64,
    /// First month with the highest count.
    pub peak: (String, i64),
    /// `None` with fewer than two months of data.
    pub growth_pct: Option<f64>,
}

impl KeywordTrend {
    pub fn growth(&self) -> Option<Growth> {
        self.growth_pct.map(classify_growth)
    }
}

pub fn keyword_trend(rows: &[TrendRow], keyword: &str) -> Option<KeywordTrend> {
    let series = rows.iter()
        .filter(|r| r.keyword == keyword)
        .map(|r| (r.date.clone(), r.count))
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .collect_vec();
    if series.is_empty() {
        return None;
    }
    let total = series.iter().map(|(_, c)| c).sum::<i64>();
    let mean_of = |s: &[(String, i64)]| s.iter().map(|(_, c)| *c as f64).sum::<f64>() / s.len() as f64;
    let peak = series.iter()
        .fold(None::<&(String, i64)>, |best, cur| match best {
            Some(b) if b.1 >= cur.1 => Some(b),
            _ => Some(cur),
        })
        .cloned()?;
    let growth_pct = (series.len() >= 2).then(|| {
        let window = GROWTH_WINDOW.min(series.len());
        let first = mean_of(&series[..window]);
        let last = mean_of(&series[series.len() - window..]);
        if first > 0.0 { (last - first) / first * 100.0 } else { 0.0 }
    });
    Some(KeywordTrend {
        keyword: keyword.to_string(),
        mean: mean_of(&series),
        total,
        peak,
        growth_pct,
        series,
    })
}

/// Requested keywords capped at five, or the top three when none were asked for.
pub fn select_keywords(requested: &[String], top: &[(&str, i64)]) -> Vec<String> {
    if requested.is_empty() {
        return top.iter()
            .take(DEFAULT_SELECTED_KEYWORDS)
            .map(|(k, _)| k.to_string())
            .collect_vec();
    }
    requested.iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .unique()
        .take(MAX_SELECTED_KEYWORDS)
        .collect_vec()
}

pub fn filter_cat_docs(rows: &[CatDocRow], top: usize, min_docs: i64) -> Vec<&CatDocRow> {
    rows.iter()
        .filter(|r| r.doc_count >= min_docs)
        .take(top)
        .collect_vec()
}

/// Rows of one category, largest count first.
pub fn category_breakdown<'a>(rows: &'a [CatKwRow], category: &str, top: usize) -> Vec<&'a CatKwRow> {
    rows.iter()
        .filter(|r| r.category == category)
        .sorted_by(|a, b| b.count.cmp(&a.count))
        .take(top)
        .collect_vec()
}

/// Rows of one keyword, largest count first.
pub fn keyword_breakdown<'a>(rows: &'a [CatKwRow], keyword: &str, top: usize) -> Vec<&'a CatKwRow> {
    rows.iter()
        .filter(|r| r.keyword == keyword)
        .sorted_by(|a, b| b.count.cmp(&a.count))
        .take(top)
        .collect_vec()
}
