//! Which source fields land in which sink fields.
//!
//! The defaults describe the planets → `res.planet` and people →
//! `res.partner` migration; both plans can be replaced from configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sink::FieldMap;
use crate::sink::normalize::{FieldKind, normalize_value};
use crate::source::RemoteRecord;

/// One source field copied to one sink field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FieldMapping {
    pub fn new(source: &str, target: &str, kind: FieldKind) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            kind,
        }
    }

    fn same(name: &str, kind: FieldKind) -> Self {
        Self::new(name, name, kind)
    }
}

/// Normalize every mapped field of `record`, omitting unusable values.
pub fn build_fields(record: &RemoteRecord, mappings: &[FieldMapping]) -> FieldMap {
    let mut fields = FieldMap::new();
    for mapping in mappings {
        if let Some(value) = record
            .get(&mapping.source)
            .and_then(|raw| normalize_value(raw, mapping.kind))
        {
            fields.insert(mapping.target.clone(), value);
        }
    }
    fields
}

/// The natural key of an outgoing record: a non-blank string in `key_field`.
///
/// The trimmed key is written back into `fields`, so the value stored in the
/// sink is the same string later runs search for.
pub fn natural_key(fields: &mut FieldMap, key_field: &str) -> Option<String> {
    let key = fields
        .get(key_field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();
    fields.insert(key_field.to_string(), Value::String(key.clone()));
    Some(key)
}

/// Parent resource: migrated first, feeds the identifier map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentPlan {
    /// Source collection name.
    pub resource: String,
    /// Sink model name.
    pub model: String,
    /// Sink field holding the natural key.
    pub key_field: String,
    pub fields: Vec<FieldMapping>,
}

impl Default for ParentPlan {
    fn default() -> Self {
        Self {
            resource: "planets".to_string(),
            model: "res.planet".to_string(),
            key_field: "name".to_string(),
            fields: vec![
                FieldMapping::same("name", FieldKind::Text),
                FieldMapping::same("diameter", FieldKind::Integer),
                FieldMapping::same("population", FieldKind::Float),
                FieldMapping::same("rotation_period", FieldKind::Integer),
                FieldMapping::same("orbital_period", FieldKind::Integer),
            ],
        }
    }
}

/// Child resource: references a parent and optionally carries an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildPlan {
    pub resource: String,
    pub model: String,
    pub key_field: String,
    pub fields: Vec<FieldMapping>,
    /// Source field linking to the parent record.
    pub parent_link: String,
    /// Sink field receiving the parent's sink id.
    pub parent_target: String,
    /// Sink field receiving the base64 image; `None` disables asset fetching.
    pub asset_target: Option<String>,
}

impl Default for ChildPlan {
    fn default() -> Self {
        Self {
            resource: "people".to_string(),
            model: "res.partner".to_string(),
            key_field: "name".to_string(),
            fields: vec![FieldMapping::same("name", FieldKind::Text)],
            parent_link: "homeworld".to_string(),
            parent_target: "planet".to_string(),
            asset_target: Some("image_1920".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tatooine() -> RemoteRecord {
        RemoteRecord::from_value(
            None,
            json!({
                "name": "Tatooine",
                "diameter": "10465",
                "population": "200000",
                "rotation_period": "23",
                "orbital_period": "unknown",
                "climate": "arid",
                "url": "https://swapi.test/api/planets/1/"
            }),
        )
        .expect("record")
    }

    #[test]
    fn build_fields_normalizes_and_omits_unknown() {
        let fields = build_fields(&tatooine(), &ParentPlan::default().fields);

        assert_eq!(fields["name"], json!("Tatooine"));
        assert_eq!(fields["diameter"], json!(10465));
        assert_eq!(fields["population"], json!(200000.0));
        assert_eq!(fields["rotation_period"], json!(23));
        assert!(!fields.contains_key("orbital_period"));
        assert!(!fields.contains_key("climate"));
    }

    #[test]
    fn natural_key_requires_non_blank_string() {
        let mut fields = FieldMap::new();
        assert_eq!(natural_key(&mut fields, "name"), None);

        fields.insert("name".to_string(), json!("   "));
        assert_eq!(natural_key(&mut fields, "name"), None);
        assert_eq!(fields["name"], json!("   "));

        fields.insert("name".to_string(), json!(" Luke Skywalker "));
        assert_eq!(natural_key(&mut fields, "name").as_deref(), Some("Luke Skywalker"));
        assert_eq!(fields["name"], json!("Luke Skywalker"));
    }

    #[test]
    fn child_plan_defaults() {
        let plan = ChildPlan::default();
        assert_eq!(plan.resource, "people");
        assert_eq!(plan.model, "res.partner");
        assert_eq!(plan.parent_link, "homeworld");
        assert_eq!(plan.parent_target, "planet");
        assert_eq!(plan.asset_target.as_deref(), Some("image_1920"));
    }

    #[test]
    fn plans_deserialize_with_partial_overrides() {
        let plan: ParentPlan = serde_json::from_value(json!({
            "resource": "starships",
            "model": "x.starship",
            "fields": [{"source": "name", "target": "name"}, {"source": "length", "target": "length_m", "kind": "float"}]
        }))
        .expect("plan");

        assert_eq!(plan.resource, "starships");
        assert_eq!(plan.key_field, "name");
        assert_eq!(plan.fields[0].kind, FieldKind::Text);
        assert_eq!(plan.fields[1], FieldMapping::new("length", "length_m", FieldKind::Float));
    }
}
