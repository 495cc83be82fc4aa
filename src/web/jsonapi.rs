//! JSON:API 1.0 document assembly. Resources carry their natural key as
//! the id, the owner links as relationships, and the eager-loaded children
//! in the document's `included` section.

use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Serialize)]
pub struct Document {
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Value>,
    pub meta: Meta,
}

#[derive(Debug, Default, Serialize)]
pub struct Meta {
    pub total: i64,
}

impl Document {
    pub fn many(resources: Vec<Value>, total: i64) -> Document {
        Document {
            data: Value::Array(resources),
            included: Vec::new(),
            meta: Meta { total },
        }
    }

    pub fn one(resource: Value) -> Document {
        Document {
            data: resource,
            included: Vec::new(),
            meta: Meta::default(),
        }
    }

    pub fn with_included(mut self, included: Vec<Value>) -> Document {
        self.included = included;
        self
    }
}

/// Builds one resource object. The id field is dropped from the
/// attributes, relationships are attached when non-empty.
pub fn resource<T: Serialize>(
    kind: &str,
    id: &str,
    id_field: &str,
    entity: &T,
    relationships: Value,
) -> Value {
    let mut attributes = serde_json::to_value(entity).unwrap_or(Value::Object(Map::new()));
    if let Value::Object(map) = &mut attributes {
        map.remove(id_field);
    }

    let mut object = Map::new();
    object.insert("type".to_string(), json!(kind));
    object.insert("id".to_string(), json!(id));
    object.insert("attributes".to_string(), attributes);
    if relationships
        .as_object()
        .map(|map| !map.is_empty())
        .unwrap_or(false)
    {
        object.insert("relationships".to_string(), relationships);
    }
    Value::Object(object)
}

pub fn to_one(name: &str, kind: &str, id: Option<&str>) -> Value {
    match id {
        Some(id) => json!({ name: { "data": { "type": kind, "id": id } } }),
        None => json!({}),
    }
}

pub fn to_many(name: &str, kind: &str, ids: &[String]) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "type": kind, "id": id }))
        .collect();
    json!({ name: { "data": data } })
}

/// Merges relationship objects produced by `to_one`/`to_many`.
pub fn relationships(parts: Vec<Value>) -> Value {
    let mut merged = Map::new();
    for part in parts {
        if let Value::Object(map) = part {
            merged.extend(map);
        }
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Nic;

    #[test]
    fn resource_drops_the_id_field_from_attributes() {
        let nic = Nic {
            mac_address: "aa:bb:cc:dd:ee:ff".into(),
            name: "eth0".into(),
            ..Nic::default()
        };
        let rels = to_one("blades", "blades", Some("alpha"));
        let value = resource("nics", &nic.mac_address, "mac_address", &nic, rels);

        assert_eq!(value["type"], "nics");
        assert_eq!(value["id"], "aa:bb:cc:dd:ee:ff");
        assert!(value["attributes"].get("mac_address").is_none());
        assert_eq!(value["attributes"]["name"], "eth0");
        assert_eq!(
            value["relationships"]["blades"]["data"]["id"],
            "alpha"
        );
    }

    #[test]
    fn empty_relationships_are_omitted() {
        let nic = Nic::default();
        let value = resource("nics", "x", "mac_address", &nic, relationships(vec![]));
        assert!(value.get("relationships").is_none());
    }

    #[test]
    fn many_document_carries_the_total() {
        let doc = Document::many(vec![json!({"type": "blades", "id": "a"})], 42);
        assert_eq!(doc.meta.total, 42);
    }
}
