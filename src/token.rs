use std::path::Path;

use regex::Regex;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::constant::*;

/// NFKC then lower case, the form every token and list entry is compared in.
pub fn normalize(s: &str) -> String {
    s.nfkc().collect::<String>().to_lowercase()
}

/// Heuristic for "this token is a Vietnamese word".
///
/// Decomposed, the token may only hold Vietnamese base letters, `đ` and the Vietnamese
/// tone/vowel marks, and it must carry at least one such mark or an `đ`. Unaccented words
/// are therefore rejected along with most foreign names.
pub fn is_vietnamese_word(token: &str) -> bool {
    let len = token.chars().count();
    if !(MIN_WORD_LEN..=MAX_WORD_LEN).contains(&len) {
        return false;
    }
    if token.chars().any(char::is_numeric) {
        return false;
    }

    let mut has_mark = false;
    let mut has_dd = false;
    for ch in token.nfd() {
        if is_combining_mark(ch) {
            if !VN_MARKS.contains(&ch) {
                return false;
            }
            has_mark = true;
        } else if ch == VN_DD {
            has_dd = true;
        } else if !(ch.is_alphabetic() && VN_BASE.contains(ch)) {
            return false;
        }
    }
    has_mark || has_dd
}

pub struct Tokenizer {
    token_re: Regex,
    keyword_re: Regex,
    stopwords: FxHashSet<String>,
}

impl Tokenizer {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            token_re: Regex::new(r"[^\W\d_]+").expect("token pattern"),
            keyword_re: Regex::new(r"[^\W_]+").expect("keyword token pattern"),
            stopwords: stopwords.into_iter()
                .map(|w| normalize(w.as_ref().trim()))
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Stop-words from `path`; a missing or unreadable file means no stop-words.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match utils::read_list(path) {
            Ok(words) => {
                debug!("{} stop-words from {}", words.len(), path.display());
                Self::new(words)
            }
            Err(e) => {
                warn!("no stop-words loaded from {}: {e}", path.display());
                Self::new(Vec::<String>::new())
            }
        }
    }

    /// Letter runs of already normalized text.
    pub fn tokens<'a>(&'a self, normalized: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.token_re.find_iter(normalized).map(|m| m.as_str())
    }

    /// Alphanumeric runs for keyword matching; digits stay inside the token.
    pub fn keyword_tokens<'a>(&'a self, normalized: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.keyword_re.find_iter(normalized).map(|m| m.as_str())
    }

    /// Tokens that count as words: not a stop-word and Vietnamese by the heuristic.
    pub fn words<'a>(&'a self, normalized: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tokens(normalized)
            .filter(|tok| !self.stopwords.contains(*tok))
            .filter(|tok| is_vietnamese_word(tok))
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }
}
