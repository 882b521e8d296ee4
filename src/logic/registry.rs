use crate::model::{
    ApiDescription, EndpointDescription, EntityDescriptor, GroupPermissions, ParameterDescription,
    PropertyDescriptor, PropertyPath, SecurityAction, SecurityGroup, Type, TypeDescription,
};
use log::trace;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Raised when the registry is asked to resolve an identifier it never
/// interned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown identifier: {0}")]
pub struct UnknownIdentifier(pub Uuid);

/// The canonical store of every descriptor in the frozen graph.
///
/// Identifiers are content-derived, so interning is a plain keyed insert:
/// two structurally-equal descriptors collide to the same identifier and the
/// graph never holds duplicate nodes. The registry is populated during the
/// single-threaded schema build phase and is read-only afterwards; traversal
/// never mutates it.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<Uuid, Type>,
    entities: HashMap<Uuid, EntityDescriptor>,
    entities_by_name: HashMap<String, Uuid>,
    properties: HashMap<Uuid, PropertyDescriptor>,
    groups: HashMap<Uuid, SecurityGroup>,
    actions: HashMap<Uuid, SecurityAction>,
    permissions: HashMap<Uuid, GroupPermissions>,
    paths: HashMap<Uuid, PropertyPath>,
    endpoints: HashMap<Uuid, EndpointDescription>,
    parameters: HashMap<Uuid, ParameterDescription>,
    type_descriptions: HashMap<Uuid, TypeDescription>,
    apis: HashMap<Uuid, ApiDescription>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identifier of a structurally-equal stored type if one
    /// exists, otherwise stores the given type. At most one node per distinct
    /// structure is ever kept.
    pub fn intern_type(&mut self, ty: Type) -> Uuid {
        let uuid = ty.uuid;
        if self.types.insert(uuid, ty).is_none() {
            trace!("interned type {}", uuid);
        }
        uuid
    }

    pub fn insert_entity(&mut self, entity: EntityDescriptor) -> Uuid {
        let uuid = entity.uuid;
        self.entities_by_name
            .insert(entity.type_name.clone(), uuid);
        self.entities.insert(uuid, entity);
        uuid
    }

    pub fn insert_property(&mut self, property: PropertyDescriptor) -> Uuid {
        let uuid = property.uuid;
        self.properties.insert(uuid, property);
        uuid
    }

    pub fn insert_group(&mut self, group: SecurityGroup) -> Uuid {
        let uuid = group.uuid;
        self.groups.insert(uuid, group);
        uuid
    }

    pub fn insert_action(&mut self, action: SecurityAction) -> Uuid {
        let uuid = action.uuid;
        self.actions.insert(uuid, action);
        uuid
    }

    pub fn insert_permissions(&mut self, permissions: GroupPermissions) -> Uuid {
        let uuid = permissions.uuid;
        self.permissions.insert(uuid, permissions);
        uuid
    }

    pub fn insert_path(&mut self, path: PropertyPath) -> Uuid {
        let uuid = path.uuid;
        self.paths.insert(uuid, path);
        uuid
    }

    pub fn insert_endpoint(&mut self, endpoint: EndpointDescription) -> Uuid {
        let uuid = endpoint.uuid;
        self.endpoints.insert(uuid, endpoint);
        uuid
    }

    pub fn insert_parameter(&mut self, parameter: ParameterDescription) -> Uuid {
        let uuid = parameter.uuid;
        self.parameters.insert(uuid, parameter);
        uuid
    }

    pub fn insert_type_description(&mut self, description: TypeDescription) -> Uuid {
        let uuid = description.uuid;
        self.type_descriptions.insert(uuid, description);
        uuid
    }

    pub fn insert_api(&mut self, api: ApiDescription) -> Uuid {
        let uuid = api.uuid;
        self.apis.insert(uuid, api);
        uuid
    }

    pub fn resolve_type(&self, uuid: &Uuid) -> Result<&Type, UnknownIdentifier> {
        self.types.get(uuid).ok_or(UnknownIdentifier(*uuid))
    }

    pub fn resolve_entity(&self, uuid: &Uuid) -> Result<&EntityDescriptor, UnknownIdentifier> {
        self.entities.get(uuid).ok_or(UnknownIdentifier(*uuid))
    }

    pub fn resolve_property(&self, uuid: &Uuid) -> Result<&PropertyDescriptor, UnknownIdentifier> {
        self.properties.get(uuid).ok_or(UnknownIdentifier(*uuid))
    }

    pub fn resolve_group(&self, uuid: &Uuid) -> Result<&SecurityGroup, UnknownIdentifier> {
        self.groups.get(uuid).ok_or(UnknownIdentifier(*uuid))
    }

    pub fn resolve_action(&self, uuid: &Uuid) -> Result<&SecurityAction, UnknownIdentifier> {
        self.actions.get(uuid).ok_or(UnknownIdentifier(*uuid))
    }

    pub fn resolve_permissions(
        &self,
        uuid: &Uuid,
    ) -> Result<&GroupPermissions, UnknownIdentifier> {
        self.permissions.get(uuid).ok_or(UnknownIdentifier(*uuid))
    }

    pub fn resolve_path(&self, uuid: &Uuid) -> Result<&PropertyPath, UnknownIdentifier> {
        self.paths.get(uuid).ok_or(UnknownIdentifier(*uuid))
    }

    pub fn resolve_endpoint(
        &self,
        uuid: &Uuid,
    ) -> Result<&EndpointDescription, UnknownIdentifier> {
        self.endpoints.get(uuid).ok_or(UnknownIdentifier(*uuid))
    }

    pub fn resolve_parameter(
        &self,
        uuid: &Uuid,
    ) -> Result<&ParameterDescription, UnknownIdentifier> {
        self.parameters.get(uuid).ok_or(UnknownIdentifier(*uuid))
    }

    pub fn resolve_type_description(
        &self,
        uuid: &Uuid,
    ) -> Result<&TypeDescription, UnknownIdentifier> {
        self.type_descriptions
            .get(uuid)
            .ok_or(UnknownIdentifier(*uuid))
    }

    pub fn resolve_api(&self, uuid: &Uuid) -> Result<&ApiDescription, UnknownIdentifier> {
        self.apis.get(uuid).ok_or(UnknownIdentifier(*uuid))
    }

    pub fn entity_by_name(&self, type_name: &str) -> Option<&EntityDescriptor> {
        self.entities_by_name
            .get(type_name)
            .and_then(|uuid| self.entities.get(uuid))
    }

    pub fn group_by_name(&self, name: &str) -> Option<&SecurityGroup> {
        self.groups.values().find(|group| group.name == name)
    }

    /// Direct subtypes of the given entity, ordered by payload name so
    /// closure discovery is deterministic.
    pub fn subtypes_of(&self, entity_uuid: &Uuid) -> Vec<&EntityDescriptor> {
        let mut subtypes: Vec<&EntityDescriptor> = self
            .entities
            .values()
            .filter(|entity| entity.supertype_uuid.as_ref() == Some(entity_uuid))
            .collect();
        subtypes.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        subtypes
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.types.values()
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &SecurityGroup> {
        self.groups.values()
    }

    pub fn actions(&self) -> impl Iterator<Item = &SecurityAction> {
        self.actions.values()
    }

    pub fn permission_sets(&self) -> impl Iterator<Item = &GroupPermissions> {
        self.permissions.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PropertyPath> {
        self.paths.values()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointDescription> {
        self.endpoints.values()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &ParameterDescription> {
        self.parameters.values()
    }

    pub fn type_descriptions(&self) -> impl Iterator<Item = &TypeDescription> {
        self.type_descriptions.values()
    }

    /// True if any descriptor kind holds the identifier.
    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.types.contains_key(uuid)
            || self.entities.contains_key(uuid)
            || self.properties.contains_key(uuid)
            || self.groups.contains_key(uuid)
            || self.actions.contains_key(uuid)
            || self.permissions.contains_key(uuid)
            || self.paths.contains_key(uuid)
            || self.endpoints.contains_key(uuid)
            || self.parameters.contains_key(uuid)
            || self.type_descriptions.contains_key(uuid)
            || self.apis.contains_key(uuid)
    }

    pub fn descriptor_count(&self) -> usize {
        self.types.len()
            + self.entities.len()
            + self.properties.len()
            + self.groups.len()
            + self.actions.len()
            + self.permissions.len()
            + self.paths.len()
            + self.endpoints.len()
            + self.parameters.len()
            + self.type_descriptions.len()
            + self.apis.len()
    }

    /// A hex-encoded digest over every interned identifier, insensitive to
    /// build order. Two registries built from the same declarations produce
    /// the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut ids: Vec<&Uuid> = Vec::with_capacity(self.descriptor_count());
        ids.extend(self.types.keys());
        ids.extend(self.entities.keys());
        ids.extend(self.properties.keys());
        ids.extend(self.groups.keys());
        ids.extend(self.actions.keys());
        ids.extend(self.permissions.keys());
        ids.extend(self.paths.keys());
        ids.extend(self.endpoints.keys());
        ids.extend(self.parameters.keys());
        ids.extend(self.type_descriptions.keys());
        ids.extend(self.apis.keys());
        ids.sort_unstable();

        let mut hasher = Sha256::new();
        for id in ids {
            hasher.update(id.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JsonKind;

    #[test]
    fn intern_deduplicates_structurally_equal_types() {
        let mut registry = TypeRegistry::new();
        let a = registry.intern_type(Type::primitive(JsonKind::String));
        let b = registry.intern_type(Type::primitive(JsonKind::String));
        assert_eq!(a, b);
        assert_eq!(registry.descriptor_count(), 1);

        let c = registry.intern_type(Type::primitive(JsonKind::Integer));
        assert_ne!(a, c);
        assert_eq!(registry.descriptor_count(), 2);
    }

    #[test]
    fn resolve_unknown_identifier_fails() {
        let registry = TypeRegistry::new();
        let missing = Uuid::new_v4();
        let err = registry.resolve_type(&missing).unwrap_err();
        assert_eq!(err, UnknownIdentifier(missing));
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let string_type = Type::primitive(JsonKind::String);
        let double_type = Type::primitive(JsonKind::Double);

        let mut forward = TypeRegistry::new();
        forward.intern_type(string_type.clone());
        forward.intern_type(double_type.clone());

        let mut reverse = TypeRegistry::new();
        reverse.intern_type(double_type);
        reverse.intern_type(string_type);

        assert_eq!(forward.fingerprint(), reverse.fingerprint());
    }
}
