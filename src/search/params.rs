//! Raw request parameters: ordered key/value pairs with repeated keys allowed.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Key carrying a JSON search document, expanded into ordinary pairs.
pub const JSON_QUERY_KEY: &str = "query";
/// Present when a search form was submitted.
pub const SUBMIT_KEY: &str = "submit";
/// Comparator value meaning "use the field kind's default operator".
pub const DEFAULT_COMPARATOR: &str = "default";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawParams {
    pairs: Vec<(String, String)>,
}

impl RawParams {
    pub fn new() -> Self {
        RawParams::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        RawParams {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn extend(&mut self, other: RawParams) {
        self.pairs.extend(other.pairs);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// All pairs in submission order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> BTreeSet<&str> {
        self.pairs.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn is_submitted(&self) -> bool {
        self.contains(SUBMIT_KEY)
    }

    /// Replace a `query` JSON document with the equivalent pairs:
    /// `{"criterions": [{"attr", "comparator", "value"}], "order_by", "direction", "intersect", "start", "limit"}`.
    pub fn expand_json_query(mut self) -> Result<Self, String> {
        let Some(idx) = self.pairs.iter().position(|(k, _)| k == JSON_QUERY_KEY) else {
            return Ok(self);
        };
        let (_, doc) = self.pairs.remove(idx);
        let query: JsonQuery = serde_json::from_str(&doc).map_err(|e| format!("invalid JSON search document: {}", e))?;
        for c in query.criterions {
            // Every criterion carries a comparator so repeated attrs stay paired by position.
            self.push(format!("{}.value", c.attr), json_to_param(&c.value));
            self.push(
                format!("{}.comparator", c.attr),
                c.comparator.unwrap_or_else(|| DEFAULT_COMPARATOR.to_string()),
            );
        }
        if let Some(order_by) = query.order_by {
            self.push("order_by", order_by);
        }
        if let Some(direction) = query.direction {
            self.push("direction", direction);
        }
        if let Some(intersect) = query.intersect {
            self.push("intersect", intersect.to_string());
        }
        if let Some(start) = query.start {
            self.push("start", start.to_string());
        }
        if let Some(limit) = query.limit {
            self.push("limit", limit.to_string());
        }
        Ok(self)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RawParams::from_pairs(iter)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonQuery {
    #[serde(default)]
    criterions: Vec<JsonCriterion>,
    #[serde(default)]
    order_by: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    intersect: Option<bool>,
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    limit: Option<u64>,
}

#[derive(Deserialize)]
struct JsonCriterion {
    attr: String,
    #[serde(default)]
    comparator: Option<String>,
    #[serde(default)]
    value: Value,
}

fn json_to_param(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(json_to_param).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
