use crate::logic::digest::IdentityDigest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named, optionally-persistent record type.
///
/// The property list enumerates only the properties this descriptor declares
/// itself; inherited properties stay resolvable through the `supertype` chain
/// and it is the traversal engine's choice whether to walk it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescriptor {
    pub uuid: Uuid,
    /// Payload name of the entity, e.g. `product`.
    pub type_name: String,
    /// Hint that instances may be persisted by the server, allowing clients
    /// to transmit only mutated properties.
    pub persistent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
    /// Declared properties, in insertion order. The order defines the default
    /// serialization order of instances.
    pub property_uuids: Vec<Uuid>,
    /// Single-inheritance link; never cyclic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supertype_uuid: Option<Uuid>,
    /// Entity-level permission set; properties without their own permission
    /// set fall back to this one.
    pub group_permissions_uuid: Uuid,
}

impl EntityDescriptor {
    /// Identity is derived from the payload name, so a rebuilt schema yields
    /// the same identifier for the same entity regardless of build order.
    pub fn identify(type_name: &str) -> Uuid {
        IdentityDigest::new("entityDescription").str(type_name).finish()
    }
}

/// An immutable view of a single serializable property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub uuid: Uuid,
    /// The payload name of the property within its enclosing entity's JSON
    /// object.
    pub name: String,
    /// Payload name of the entity that declares the property.
    pub enclosing_type_name: String,
    /// The property's value shape.
    pub type_uuid: Uuid,
    /// Only emitted when the traversal mode is DEEP.
    #[serde(default)]
    pub deep_traversal_only: bool,
    /// The referenced entity's own properties are spliced into the enclosing
    /// object instead of being nested. Only meaningful for entity-typed
    /// properties; the builder rejects anything else.
    #[serde(default)]
    pub embedded: bool,
    /// Omit the property when its value equals the type's zero value.
    #[serde(default)]
    pub suppress_default_value: bool,
    /// When a new value is assigned to this property, the implied property of
    /// the assigned value should also be updated to point back at the
    /// assigning instance. Enforcement of that rule belongs to the instance
    /// mutation layer, not the descriptor model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_property_uuid: Option<Uuid>,
    /// Back-reference counterpart of `implied_property_uuid` on the other
    /// side of the link. Either side may stand alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_uuid: Option<Uuid>,
    /// Property-level permission set; `None` falls back to the enclosing
    /// entity's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_permissions_uuid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
}

impl PropertyDescriptor {
    /// Identity is derived from `enclosingTypeName.name`, which lets the
    /// builder wire mutually-referential implied properties before either
    /// side's content is complete.
    pub fn identify(enclosing_type_name: &str, name: &str) -> Uuid {
        IdentityDigest::new("property")
            .str(&format!("{}.{}", enclosing_type_name, name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_identity_is_scoped_to_the_enclosing_entity() {
        let on_product = PropertyDescriptor::identify("product", "name");
        let on_merchant = PropertyDescriptor::identify("merchant", "name");
        assert_ne!(on_product, on_merchant);
        assert_eq!(on_product, PropertyDescriptor::identify("product", "name"));
    }

    #[test]
    fn entity_identity_is_stable() {
        assert_eq!(
            EntityDescriptor::identify("product"),
            EntityDescriptor::identify("product")
        );
        assert_ne!(
            EntityDescriptor::identify("product"),
            EntityDescriptor::identify("merchant")
        );
    }
}
