use crate::model::JsonKind;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A live instance value handed to the traversal engine.
///
/// The shape of the instance is governed entirely by its entity descriptor;
/// the value itself is just an identifier plus a bag of named fields. Field
/// lookup is by property name, and emission order comes from the descriptor's
/// declared property order, so the map needs no ordering of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityValue {
    pub uuid: Uuid,
    /// The descriptor this instance conforms to.
    pub entity_uuid: Uuid,
    pub fields: HashMap<String, FieldValue>,
}

impl EntityValue {
    /// A fresh instance with a random identifier, for stores that mint new
    /// records.
    pub fn new(entity_uuid: Uuid) -> Self {
        Self::with_uuid(Uuid::new_v4(), entity_uuid)
    }

    pub fn with_uuid(uuid: Uuid, entity_uuid: Uuid) -> Self {
        Self {
            uuid,
            entity_uuid,
            fields: HashMap::new(),
        }
    }

    pub fn set(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// One field of an [`EntityValue`].
///
/// References point at other entity values by identifier; the traversal
/// engine decides whether the target is expanded into the document or left as
/// a bare identifier, depending on the traversal mode.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A plain JSON scalar (string, number, boolean or null).
    Scalar(Value),
    /// A reference to another entity value.
    Reference(Uuid),
    /// An ordered collection; elements preserve source ordering.
    List(Vec<FieldValue>),
    /// String-keyed entries, order-stable by insertion. Keys may themselves
    /// be entity identifiers when the property's map key type is an entity
    /// reference.
    Map(Vec<(String, FieldValue)>),
}

impl FieldValue {
    pub fn string(value: &str) -> Self {
        FieldValue::Scalar(Value::String(value.to_string()))
    }

    pub fn integer(value: i64) -> Self {
        FieldValue::Scalar(Value::from(value))
    }

    pub fn double(value: f64) -> Self {
        FieldValue::Scalar(Value::from(value))
    }

    pub fn boolean(value: bool) -> Self {
        FieldValue::Scalar(Value::Bool(value))
    }

    pub fn references(uuids: &[Uuid]) -> Self {
        FieldValue::List(uuids.iter().copied().map(FieldValue::Reference).collect())
    }

    /// True when the value (or any nested element) refers to another entity.
    /// Reference-bearing fields are emitted under a `<name>Uuid` key.
    pub fn contains_reference(&self) -> bool {
        match self {
            FieldValue::Scalar(_) => false,
            FieldValue::Reference(_) => true,
            FieldValue::List(items) => items.iter().any(FieldValue::contains_reference),
            FieldValue::Map(entries) => entries
                .iter()
                .any(|(_, value)| value.contains_reference()),
        }
    }

    /// True when the value equals the zero value for the given type kind,
    /// used by `suppressDefaultValue` handling.
    pub fn is_default_for(&self, kind: JsonKind) -> bool {
        match (kind, self) {
            (JsonKind::Boolean, FieldValue::Scalar(Value::Bool(b))) => !b,
            (JsonKind::Integer, FieldValue::Scalar(Value::Number(n))) => {
                n.as_i64() == Some(0)
            }
            (JsonKind::Double, FieldValue::Scalar(Value::Number(n))) => {
                n.as_f64() == Some(0.0)
            }
            (JsonKind::String, FieldValue::Scalar(Value::String(s))) => s.is_empty(),
            (JsonKind::List, FieldValue::List(items)) => items.is_empty(),
            (JsonKind::Map, FieldValue::Map(entries)) => entries.is_empty(),
            (_, FieldValue::Scalar(Value::Null)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_detection_recurses_into_collections() {
        let scalar = FieldValue::string("hello");
        assert!(!scalar.contains_reference());

        let nested = FieldValue::List(vec![FieldValue::List(vec![FieldValue::Reference(
            Uuid::new_v4(),
        )])]);
        assert!(nested.contains_reference());

        let map = FieldValue::Map(vec![("k".to_string(), FieldValue::integer(3))]);
        assert!(!map.contains_reference());
    }

    #[test]
    fn default_detection_follows_the_type_kind() {
        assert!(FieldValue::boolean(false).is_default_for(JsonKind::Boolean));
        assert!(!FieldValue::boolean(true).is_default_for(JsonKind::Boolean));
        assert!(FieldValue::integer(0).is_default_for(JsonKind::Integer));
        assert!(FieldValue::double(0.0).is_default_for(JsonKind::Double));
        assert!(!FieldValue::double(12.5).is_default_for(JsonKind::Double));
        assert!(FieldValue::string("").is_default_for(JsonKind::String));
        assert!(FieldValue::List(Vec::new()).is_default_for(JsonKind::List));
        assert!(FieldValue::Scalar(Value::Null).is_default_for(JsonKind::String));
    }
}
