//! Typed criterion values and the per-kind decoders that produce them.

use crate::search::field::{Cardinality, FieldKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    List(Vec<String>),
}

impl FieldValue {
    /// Decode a raw request string. Blank input decodes to `None`: the caller asked for the
    /// field but gave nothing to filter on.
    pub fn decode(kind: FieldKind, raw: &str) -> Result<Option<FieldValue>, String> {
        let s = raw.trim();
        if s.is_empty() {
            return Ok(None);
        }
        let value = match kind {
            FieldKind::Boolean => FieldValue::Bool(parse_bool(s).ok_or("must be a boolean")?),
            FieldKind::Numeric => parse_number(s).ok_or("must be a number")?,
            FieldKind::Date => FieldValue::Date(parse_date(s).ok_or("must be a date (YYYY-MM-DD)")?),
            // A bare date on a datetime field matches the whole day.
            FieldKind::DateTime => match parse_date(s) {
                Some(d) => FieldValue::Date(d),
                None => FieldValue::DateTime(parse_datetime(s).ok_or("must be a date or datetime")?),
            },
            FieldKind::Time => FieldValue::Time(parse_time(s).ok_or("must be a time (HH:MM[:SS])")?),
            FieldKind::String | FieldKind::Enum | FieldKind::Relation(Cardinality::One) => {
                FieldValue::Text(s.to_string())
            }
            FieldKind::Relation(Cardinality::Many) => {
                let ids: Vec<String> = s
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect();
                if ids.is_empty() {
                    return Ok(None);
                }
                FieldValue::List(ids)
            }
        };
        Ok(Some(value))
    }

    /// Decode a JSON value (request bodies and JSON search documents).
    pub fn from_json(kind: FieldKind, v: &Value) -> Result<Option<FieldValue>, String> {
        match (kind, v) {
            (_, Value::Null) => Ok(None),
            (_, Value::String(s)) => FieldValue::decode(kind, s),
            (FieldKind::Boolean, Value::Bool(b)) => Ok(Some(FieldValue::Bool(*b))),
            (FieldKind::Numeric, Value::Number(n)) => Ok(Some(match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().ok_or("must be a number")?),
            })),
            (FieldKind::Relation(Cardinality::One), Value::Number(n)) => Ok(Some(FieldValue::Text(n.to_string()))),
            (FieldKind::Relation(Cardinality::Many), Value::Array(items)) => {
                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) if !s.trim().is_empty() => ids.push(s.trim().to_string()),
                        Value::Number(n) => ids.push(n.to_string()),
                        _ => return Err("must be a list of ids".into()),
                    }
                }
                Ok(if ids.is_empty() { None } else { Some(FieldValue::List(ids)) })
            }
            _ => Err(format!("must be a {} value", kind.key())),
        }
    }

    /// Text form bound as a query parameter and cast server-side.
    pub fn to_sql_text(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            FieldValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            FieldValue::List(items) => items.join(","),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<FieldValue> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(FieldValue::Int(i));
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite()).map(FieldValue::Float)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}
