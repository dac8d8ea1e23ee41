use std::collections::BTreeMap;
use std::path::Path;

use itertools::Itertools;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::constant::*;
use crate::token::normalize;

/// The keyword list the trend and category mappers count, loaded once per process.
#[derive(Debug, Clone)]
pub struct Keywords {
    set: FxHashSet<String>,
    /// Longest first, ties in load order. Drives suffix splitting.
    by_length: Vec<String>,
}

impl Keywords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let by_length = words.into_iter()
            .map(|w| normalize(w.as_ref().trim()))
            .filter(|w| !w.is_empty())
            .unique()
            .sorted_by_key(|w| std::cmp::Reverse(w.chars().count()))
            .collect_vec();
        Self {
            set: by_length.iter().cloned().collect(),
            by_length,
        }
    }

    pub fn defaults() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }

    /// Keywords from `path`, the built-in list when the file can not be read.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match utils::read_list(path) {
            Ok(words) => {
                debug!("{} keywords from {}", words.len(), path.display());
                Self::new(words)
            }
            Err(e) => {
                warn!("keyword file {} unreadable ({e}), using the built-in list", path.display());
                Self::defaults()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_length.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_length.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.set.contains(token)
    }

    /// Occurrences of each keyword among `tokens`.
    pub fn count<'a, I>(&self, tokens: I) -> BTreeMap<&'a str, u64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        tokens.into_iter()
            .filter(|tok| self.contains(tok))
            .fold(BTreeMap::new(), |mut m, tok| {
                *m.entry(tok).or_insert(0) += 1;
                m
            })
    }

    /// Split a `category SEP keyword` key into its parts.
    ///
    /// Keys written without the separator fall back to the longest keyword that is a suffix
    /// of the key. That is ambiguous when the category itself ends in a keyword; the longest
    /// match wins, and a key that is nothing but a keyword yields `None`.
    pub fn split_key<'k>(&'k self, key: &'k str) -> Option<(&'k str, &'k str)> {
        if let Some((category, keyword)) = key.split_once(SEP) {
            return (!category.is_empty() && !keyword.is_empty()).then_some((category, keyword));
        }
        let keyword = self.by_length.iter().find(|kw| key.ends_with(kw.as_str()))?;
        let category = &key[..key.len() - keyword.len()];
        (!category.is_empty()).then_some((category, keyword.as_str()))
    }
}
