use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One scraped product: field name -> value, in insertion order. The fixed
/// listing fields come first, detail-page fields follow as observed. Order
/// matters: it drives JSON key order and the schema reconciliation scan.
pub type ProductRecord = IndexMap<String, FieldValue>;

/// A single field value. Untagged, so numeric fields serialize as JSON
/// numbers, text as strings, and absent/unparseable values as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}
