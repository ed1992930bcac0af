//! Records as read from the source collection.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Parse the id from the trailing path segment of a resource URL.
///
/// `https://host/api/planets/7/` and `https://host/api/planets/7` both give 7.
pub fn parse_trailing_id(url: &str) -> Option<u64> {
    url.trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}

/// One item of a source collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub id: u64,
    pub fields: Map<String, Value>,
}

impl RemoteRecord {
    pub fn new(id: u64, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }

    /// Build a record from a JSON object.
    ///
    /// The id comes from the object's `url` when it has one, falling back to
    /// `requested_id`. Returns `None` for non-objects or when no id is known.
    pub fn from_value(requested_id: Option<u64>, value: Value) -> Option<Self> {
        let Value::Object(fields) = value else {
            return None;
        };
        let id = fields
            .get("url")
            .and_then(Value::as_str)
            .and_then(parse_trailing_id)
            .or(requested_id)?;
        Some(Self { id, fields })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// A field's value when it is a string.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Source id of the record a relational link points to.
    ///
    /// Links are URLs; an array of links yields its first parseable entry.
    pub fn parent_reference(&self, field: &str) -> Option<u64> {
        match self.fields.get(field)? {
            Value::String(url) => parse_trailing_id(url),
            Value::Number(n) => n.as_u64(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .find_map(parse_trailing_id),
            _ => None,
        }
    }
}

/// One page of a collection listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionPage {
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<Value>,
}

/// Outcome of fetching every id of a collection, keyed by source id.
#[derive(Debug, Clone, Default)]
pub struct FetchedCollection {
    /// Ids declared by the source.
    pub declared: u64,
    pub records: BTreeMap<u64, RemoteRecord>,
    /// Ids the source reported as not found.
    pub missing: Vec<u64>,
    /// Ids whose fetch failed, with the error message.
    pub failed: BTreeMap<u64, String>,
}

impl FetchedCollection {
    /// Ids accounted for (fetched, missing or failed).
    pub fn accounted(&self) -> usize {
        self.records.len() + self.missing.len() + self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_trailing_id() {
        assert_eq!(parse_trailing_id("https://swapi.test/api/planets/7/"), Some(7));
        assert_eq!(parse_trailing_id("https://swapi.test/api/planets/12"), Some(12));
        assert_eq!(parse_trailing_id("https://swapi.test/api/planets/"), None);
        assert_eq!(parse_trailing_id(""), None);
    }

    #[test]
    fn test_from_value_prefers_url_id() {
        let record = RemoteRecord::from_value(
            Some(3),
            json!({"name": "Hoth", "url": "https://swapi.test/api/planets/4/"}),
        )
        .expect("record");
        assert_eq!(record.id, 4);
        assert_eq!(record.str_field("name"), Some("Hoth"));
    }

    #[test]
    fn test_from_value_falls_back_to_requested_id() {
        let record = RemoteRecord::from_value(Some(9), json!({"name": "Dagobah"})).expect("record");
        assert_eq!(record.id, 9);

        assert!(RemoteRecord::from_value(None, json!({"name": "Nowhere"})).is_none());
        assert!(RemoteRecord::from_value(Some(1), json!(["not", "an", "object"])).is_none());
    }

    #[test]
    fn test_parent_reference_shapes() {
        let record = RemoteRecord::from_value(
            Some(1),
            json!({
                "homeworld": "https://swapi.test/api/planets/1/",
                "films": ["https://swapi.test/api/films/2/", "https://swapi.test/api/films/6/"],
                "species": [],
                "numeric": 5,
                "broken": "n/a"
            }),
        )
        .expect("record");

        assert_eq!(record.parent_reference("homeworld"), Some(1));
        assert_eq!(record.parent_reference("films"), Some(2));
        assert_eq!(record.parent_reference("species"), None);
        assert_eq!(record.parent_reference("numeric"), Some(5));
        assert_eq!(record.parent_reference("broken"), None);
        assert_eq!(record.parent_reference("absent"), None);
    }

    #[test]
    fn test_collection_page_defaults() {
        let page: CollectionPage = serde_json::from_value(json!({"count": 60})).expect("page");
        assert_eq!(page.count, Some(60));
        assert!(page.next.is_none());
        assert!(page.results.is_empty());
    }
}
