use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// `null` and missing both read as the type's default.
fn null_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// One article revision as extracted from the dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub page_id: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub wikitext: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanedDoc {
    #[serde(default)]
    pub page_id: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub categories: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub text: String,
}

impl CleanedDoc {
    /// `page_id` as a document id, whether the dump wrote it as a string or a number.
    pub fn page_id_str(&self) -> Option<String> {
        match self.page_id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A mapper output record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeyValue {
    pub key: String,
    pub count: u64,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self { key: key.into(), count }
    }
}

impl Display for KeyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}", self.key, self.count)
    }
}

/// A reducer output record: the total of every count seen for `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub key: String,
    pub sum: i64,
}

impl Display for Aggregate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}", self.key, self.sum)
    }
}
