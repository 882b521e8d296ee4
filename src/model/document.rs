use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// The wire-format output of a traversal.
///
/// `data` maps each payload type name to the entity objects of that type, in
/// the order the traversal discovered them; `value` names the root entity.
/// Cross-references inside the entity objects are identifier strings under
/// `<name>Uuid` keys, never inline nested objects.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub data: IndexMap<String, Vec<Value>>,
    pub value: Uuid,
}

impl Document {
    pub fn new(value: Uuid) -> Self {
        Self {
            data: IndexMap::new(),
            value,
        }
    }

    pub fn push(&mut self, type_name: &str, entity: Value) {
        self.data
            .entry(type_name.to_string())
            .or_default()
            .push(entity);
    }

    pub fn category(&self, type_name: &str) -> &[Value] {
        self.data.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Locate an emitted entity object by its identifier, in any category.
    pub fn find(&self, uuid: &Uuid) -> Option<&Value> {
        let needle = uuid.as_hyphenated().to_string();
        self.data.values().flatten().find(|entity| {
            entity
                .get("uuid")
                .and_then(Value::as_str)
                .is_some_and(|id| id == needle)
        })
    }

    /// Every identifier present in the data table.
    pub fn emitted_uuids(&self) -> Vec<Uuid> {
        self.data
            .values()
            .flatten()
            .filter_map(|entity| entity.get("uuid"))
            .filter_map(Value::as_str)
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}
