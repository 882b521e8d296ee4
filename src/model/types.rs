use crate::logic::digest::IdentityDigest;
use crate::model::JsonKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A simplified description of a JSON value shape.
///
/// Entity references are modeled as named `STRING` types without enum values
/// (entities serialize as identifier strings on the wire), so a `LIST` of
/// `product` reuses the same machinery as a `LIST` of `STRING`. Types are
/// immutable once interned in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Type {
    pub uuid: Uuid,
    pub json_kind: JsonKind,
    /// Nominal alias; for entity-reference types this is the entity's payload
    /// name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_element_uuid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_key_uuid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_value_uuid: Option<Uuid>,
    /// Ordered literal values for enum-like string types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Opaque hint for host-language binding; ignored by the core logic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
}

impl Type {
    fn build(
        json_kind: JsonKind,
        name: Option<String>,
        list_element_uuid: Option<Uuid>,
        map_key_uuid: Option<Uuid>,
        map_value_uuid: Option<Uuid>,
        enum_values: Option<Vec<String>>,
        type_hint: Option<String>,
    ) -> Self {
        let mut digest = IdentityDigest::new("type").str(json_kind.wire_name());
        digest = digest.opt_str(name.as_deref());
        digest = digest.opt_uuid(list_element_uuid.as_ref());
        digest = digest.opt_uuid(map_key_uuid.as_ref());
        digest = digest.opt_uuid(map_value_uuid.as_ref());
        if let Some(values) = &enum_values {
            digest = digest.strs(values);
        }
        digest = digest.opt_str(type_hint.as_deref());

        Self {
            uuid: digest.finish(),
            json_kind,
            name,
            list_element_uuid,
            map_key_uuid,
            map_value_uuid,
            enum_values,
            type_hint,
        }
    }

    pub fn primitive(json_kind: JsonKind) -> Self {
        Self::build(json_kind, None, None, None, None, None, None)
    }

    /// A reference to the entity with the given payload name.
    pub fn entity(name: &str) -> Self {
        Self::build(
            JsonKind::String,
            Some(name.to_string()),
            None,
            None,
            None,
            None,
            None,
        )
    }

    /// An enum-like string type with an ordered set of literal values.
    pub fn string_enum(name: Option<&str>, values: Vec<String>) -> Self {
        Self::build(
            JsonKind::String,
            name.map(str::to_string),
            None,
            None,
            None,
            Some(values),
            None,
        )
    }

    pub fn list_of(element: Uuid) -> Self {
        Self::build(JsonKind::List, None, Some(element), None, None, None, None)
    }

    pub fn map_of(key: Uuid, value: Uuid) -> Self {
        Self::build(
            JsonKind::Map,
            None,
            None,
            Some(key),
            Some(value),
            None,
            None,
        )
    }

    /// The hint participates in identity, so the type is rebuilt.
    pub fn with_type_hint(self, hint: &str) -> Self {
        Self::build(
            self.json_kind,
            self.name,
            self.list_element_uuid,
            self.map_key_uuid,
            self.map_value_uuid,
            self.enum_values,
            Some(hint.to_string()),
        )
    }

    /// True if this type denotes an entity reference rather than a plain
    /// value: a named string type with no enum values.
    pub fn is_entity_reference(&self) -> bool {
        self.json_kind == JsonKind::String && self.name.is_some() && self.enum_values.is_none()
    }

    /// The referenced entity's payload name, if this is an entity reference.
    pub fn entity_name(&self) -> Option<&str> {
        if self.is_entity_reference() {
            self.name.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structurally_equal_types_share_an_identifier() {
        let a = Type::list_of(Type::primitive(JsonKind::String).uuid);
        let b = Type::list_of(Type::primitive(JsonKind::String).uuid);
        assert_eq!(a.uuid, b.uuid);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_structures_get_distinct_identifiers() {
        let strings = Type::list_of(Type::primitive(JsonKind::String).uuid);
        let doubles = Type::list_of(Type::primitive(JsonKind::Double).uuid);
        assert_ne!(strings.uuid, doubles.uuid);

        let named = Type::entity("product");
        let other = Type::entity("merchant");
        assert_ne!(named.uuid, other.uuid);
    }

    #[test]
    fn entity_reference_detection() {
        assert!(Type::entity("product").is_entity_reference());
        assert!(!Type::primitive(JsonKind::String).is_entity_reference());
        // Enum-like strings are values, not references, even when named.
        let status = Type::string_enum(Some("status"), vec!["OPEN".into(), "CLOSED".into()]);
        assert!(!status.is_entity_reference());
    }

    #[test]
    fn type_hint_changes_identity() {
        let plain = Type::entity("product");
        let hinted = Type::entity("product").with_type_hint("com.example.Product");
        assert_ne!(plain.uuid, hinted.uuid);
        assert_eq!(hinted.type_hint.as_deref(), Some("com.example.Product"));
    }
}
