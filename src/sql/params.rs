//! Bind values. Every parameter travels as text and is cast server-side (`$n::type`).

use crate::search::FieldValue;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Text(String),
    /// Sent as an array literal (`{"a","b"}`) and cast to `text[]`.
    TextArray(Vec<String>),
}

impl PgBindValue {
    pub fn from_field_value(v: &FieldValue) -> Self {
        match v {
            FieldValue::List(items) => PgBindValue::TextArray(items.clone()),
            other => PgBindValue::Text(other.to_sql_text()),
        }
    }

    /// Text form of a JSON body value. Objects and arrays are sent as JSON text.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::String(s) => PgBindValue::Text(s.clone()),
            Value::Bool(b) => PgBindValue::Text(b.to_string()),
            Value::Number(n) => PgBindValue::Text(n.to_string()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Text(v.to_string()),
        }
    }

    fn array_literal(items: &[String]) -> String {
        let quoted: Vec<String> = items
            .iter()
            .map(|s| format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect();
        format!("{{{}}}", quoted.join(","))
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => IsNull::Yes,
            PgBindValue::Text(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf)?,
            PgBindValue::TextArray(items) => {
                let literal = PgBindValue::array_literal(items);
                <&str as Encode<Postgres>>::encode_by_ref(&literal.as_str(), buf)?
            }
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
