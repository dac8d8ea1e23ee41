/// Joins the parts of a composite mapper key. Never appears in cleaned article text.
pub const SEP: char = '\u{1}';

pub const MIN_WORD_LEN: usize = 2;
pub const MAX_WORD_LEN: usize = 40;

/// Tone and vowel marks allowed in a Vietnamese word once decomposed (NFD).
pub const VN_MARKS: [char; 8] = [
    '\u{0300}', // grave
    '\u{0301}', // acute
    '\u{0303}', // tilde
    '\u{0309}', // hook above
    '\u{0323}', // dot below
    '\u{0302}', // circumflex
    '\u{0306}', // breve
    '\u{031B}', // horn
];

/// Latin base letters of the Vietnamese alphabet, f j w z excluded.
pub const VN_BASE: &str = "abcdeghiklmnopqrstuvxy";
pub const VN_DD: char = 'đ';

pub const DEFAULT_KEYWORDS: [&str; 11] = [
    "internet", "mạng", "website", "google", "facebook",
    "phần", "mềm", "dữ", "liệu", "bảo", "mật",
];

pub const TEMPLATE_PASSES: usize = 5;
pub const MALFORMED_LOG_LIMIT: u64 = 5;

pub const IDX_DOCS: &str = "wiki_docs";
pub const IDX_WORDCOUNT: &str = "wiki_wordcount";
pub const IDX_TREND: &str = "wiki_trend";
pub const IDX_CAT_KWLIST: &str = "wiki_cat_kwlist";
pub const IDX_CAT_DOCS: &str = "wiki_cat_docs";

pub const AGGREGATE_INDICES: [&str; 4] = [IDX_WORDCOUNT, IDX_TREND, IDX_CAT_KWLIST, IDX_CAT_DOCS];

pub const SHARDS: u32 = 3;
pub const REPLICAS: u32 = 1;
pub const ANALYZER: &str = "vietnamese";

/// Upper bound of hits a dashboard page loads in one search.
pub const DASH_FETCH_SIZE: usize = 10_000;
