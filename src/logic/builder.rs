use crate::logic::registry::TypeRegistry;
use crate::model::{
    EntityDecl, EntityDescriptor, GroupGrant, GroupPermissions, JsonKind, PropertyDescriptor,
    PropertyPath, SchemaDecl, SecurityAction, SecurityGroup, Type, TypeSpec,
};
use itertools::Itertools;
use log::debug;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

/// Fatal build-time schema errors. Any of these aborts startup; none of them
/// can surface at traversal time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaDefinitionError {
    #[error("duplicate entity name '{0}'")]
    DuplicateEntity(String),

    #[error("entity '{entity}' declares unresolved supertype '{supertype}'")]
    UnresolvedSupertype { entity: String, supertype: String },

    #[error("supertype chain starting at entity '{0}' forms a cycle")]
    SupertypeCycle(String),

    #[error("duplicate property name '{property}' in entity '{entity}'")]
    DuplicateProperty { entity: String, property: String },

    #[error("embedded property '{entity}.{property}' is not an entity-typed property")]
    EmbeddedScalar { entity: String, property: String },

    #[error("reference to undeclared entity '{0}'")]
    UnresolvedEntity(String),

    #[error("grant names unknown security group '{0}'")]
    UnresolvedGroup(String),

    #[error("duplicate security group name '{0}'")]
    DuplicateGroup(String),

    #[error("malformed action pattern '{0}', expected 'type.action'")]
    MalformedAction(String),

    #[error("security group '{group}' path segment '{segment}' does not resolve on entity '{entity}'")]
    UnresolvedPathSegment {
        group: String,
        entity: String,
        segment: String,
    },

    #[error("implied property '{entity}.{property}' references unresolved '{target_entity}.{target_property}'")]
    UnresolvedImplied {
        entity: String,
        property: String,
        target_entity: String,
        target_property: String,
    },

    #[error("dangling descriptor reference: {0}")]
    DanglingReference(Uuid),
}

/// Intern the type a `TypeSpec` describes against an already-built registry.
/// Entity references must name entities the registry knows; this is what the
/// API surface assembler uses for endpoint and parameter types.
pub fn intern_type_spec(
    registry: &mut TypeRegistry,
    spec: &TypeSpec,
) -> Result<Uuid, SchemaDefinitionError> {
    let ty = match spec {
        TypeSpec::Any => Type::primitive(JsonKind::Any),
        TypeSpec::Boolean => Type::primitive(JsonKind::Boolean),
        TypeSpec::Integer => Type::primitive(JsonKind::Integer),
        TypeSpec::Double => Type::primitive(JsonKind::Double),
        TypeSpec::String => Type::primitive(JsonKind::String),
        TypeSpec::Null => Type::primitive(JsonKind::Null),
        TypeSpec::Enum { name, values } => Type::string_enum(name.as_deref(), values.clone()),
        TypeSpec::List(element) => {
            let element_uuid = intern_type_spec(registry, element)?;
            Type::list_of(element_uuid)
        }
        TypeSpec::Map(key, value) => {
            let key_uuid = intern_type_spec(registry, key)?;
            let value_uuid = intern_type_spec(registry, value)?;
            Type::map_of(key_uuid, value_uuid)
        }
        TypeSpec::Entity(name) => {
            if registry.entity_by_name(name).is_none() {
                return Err(SchemaDefinitionError::UnresolvedEntity(name.clone()));
            }
            Type::entity(name)
        }
    };
    Ok(registry.intern_type(ty))
}

/// Derives interned `EntityDescriptor` / `PropertyDescriptor` graphs from
/// declared entity shapes.
///
/// All validation happens here, before anything reaches the registry; the
/// traversal engine can assume a consistent frozen graph.
pub struct EntityModelBuilder;

impl EntityModelBuilder {
    pub fn build(registry: &mut TypeRegistry, schema: &SchemaDecl) -> Result<(), SchemaDefinitionError> {
        let builder = BuildPass::prepare(registry, schema)?;
        builder.run(registry, schema)
    }
}

/// Name-resolution state shared by the build passes.
struct BuildPass {
    /// Entity payload name -> declaration index.
    declared: HashMap<String, usize>,
    /// Security group name -> descriptor identifier.
    groups_by_name: HashMap<String, Uuid>,
    /// (entity name, property name) -> property identifier.
    property_ids: HashMap<(String, String), Uuid>,
}

impl BuildPass {
    fn prepare(
        registry: &mut TypeRegistry,
        schema: &SchemaDecl,
    ) -> Result<Self, SchemaDefinitionError> {
        let mut declared = HashMap::new();
        for (index, entity) in schema.entities.iter().enumerate() {
            if declared.insert(entity.name.clone(), index).is_some() {
                return Err(SchemaDefinitionError::DuplicateEntity(entity.name.clone()));
            }
            // Entities already frozen into the registry (e.g. the descriptor
            // meta-schema) also count as resolvable supertypes/targets.
        }

        // Supertype references and acyclicity, checked on names before any
        // descriptor exists.
        for entity in &schema.entities {
            let mut seen = HashSet::new();
            seen.insert(entity.name.as_str());
            let mut current = entity.supertype.as_deref();
            while let Some(supertype) = current {
                if !seen.insert(supertype) {
                    return Err(SchemaDefinitionError::SupertypeCycle(entity.name.clone()));
                }
                current = if let Some(&index) = declared.get(supertype) {
                    schema.entities[index].supertype.as_deref()
                } else if registry.entity_by_name(supertype).is_some() {
                    // Frozen descriptors are already acyclic.
                    None
                } else {
                    return Err(SchemaDefinitionError::UnresolvedSupertype {
                        entity: entity.name.clone(),
                        supertype: supertype.to_string(),
                    });
                };
            }
        }

        // Well-known groups exist in every schema.
        let mut groups_by_name = HashMap::new();
        for group in [
            SecurityGroup::all(),
            SecurityGroup::nobody(),
            SecurityGroup::reflexive(),
        ] {
            groups_by_name.insert(group.name.clone(), group.uuid);
            registry.insert_group(group);
        }
        for decl in &schema.global_groups {
            let group = SecurityGroup::new(&decl.name, decl.description.as_deref(), true, Vec::new());
            if groups_by_name.insert(group.name.clone(), group.uuid).is_some() {
                return Err(SchemaDefinitionError::DuplicateGroup(decl.name.clone()));
            }
            registry.insert_group(group);
        }

        // Pre-compute every property identifier; identities are name-derived,
        // which is what lets paths and implied links resolve before the
        // descriptors themselves exist.
        let mut property_ids = HashMap::new();
        for entity in &schema.entities {
            if let Some(duplicate) = entity
                .properties
                .iter()
                .map(|property| property.name.as_str())
                .duplicates()
                .next()
            {
                return Err(SchemaDefinitionError::DuplicateProperty {
                    entity: entity.name.clone(),
                    property: duplicate.to_string(),
                });
            }
            for property in &entity.properties {
                property_ids.insert(
                    (entity.name.clone(), property.name.clone()),
                    PropertyDescriptor::identify(&entity.name, &property.name),
                );
            }
        }

        Ok(Self {
            declared,
            groups_by_name,
            property_ids,
        })
    }

    fn run(
        mut self,
        registry: &mut TypeRegistry,
        schema: &SchemaDecl,
    ) -> Result<(), SchemaDefinitionError> {
        // Entity-declared, path-derived groups.
        for entity in &schema.entities {
            for group_decl in &entity.security_groups {
                let mut path_uuids = Vec::with_capacity(group_decl.paths.len());
                for segments in &group_decl.paths {
                    let path = self.resolve_path(schema, entity, &group_decl.name, segments)?;
                    path_uuids.push(registry.insert_path(path));
                }
                let group = SecurityGroup::new(
                    &group_decl.name,
                    group_decl.description.as_deref(),
                    false,
                    path_uuids,
                );
                if self
                    .groups_by_name
                    .insert(group.name.clone(), group.uuid)
                    .is_some()
                {
                    return Err(SchemaDefinitionError::DuplicateGroup(group_decl.name.clone()));
                }
                registry.insert_group(group);
            }
        }

        // Properties and entities. Descriptors are collected first so the
        // implied back-references can be fixed up before anything is frozen.
        let mut properties: HashMap<Uuid, PropertyDescriptor> = HashMap::new();
        let mut entities: Vec<EntityDescriptor> = Vec::with_capacity(schema.entities.len());

        for entity in &schema.entities {
            let entity_permissions =
                self.build_permissions(registry, &entity.permissions)?;

            let mut property_uuids = Vec::with_capacity(entity.properties.len());
            for property in &entity.properties {
                let type_uuid = self.intern_spec(registry, &property.type_spec)?;
                if property.embedded
                    && !registry
                        .resolve_type(&type_uuid)
                        .map(Type::is_entity_reference)
                        .unwrap_or(false)
                {
                    return Err(SchemaDefinitionError::EmbeddedScalar {
                        entity: entity.name.clone(),
                        property: property.name.clone(),
                    });
                }

                let permissions_uuid = property
                    .permissions
                    .as_ref()
                    .map(|decl| self.build_permissions(registry, decl))
                    .transpose()?;

                let uuid = self.property_ids[&(entity.name.clone(), property.name.clone())];
                property_uuids.push(uuid);
                properties.insert(
                    uuid,
                    PropertyDescriptor {
                        uuid,
                        name: property.name.clone(),
                        enclosing_type_name: entity.name.clone(),
                        type_uuid,
                        deep_traversal_only: property.deep_traversal_only,
                        embedded: property.embedded,
                        suppress_default_value: property.suppress_default_value,
                        implied_property_uuid: None,
                        implied_uuid: None,
                        group_permissions_uuid: permissions_uuid,
                        doc_string: property.doc_string.clone(),
                    },
                );
            }

            entities.push(EntityDescriptor {
                uuid: EntityDescriptor::identify(&entity.name),
                type_name: entity.name.clone(),
                persistent: entity.persistent,
                doc_string: entity.doc_string.clone(),
                property_uuids,
                supertype_uuid: entity
                    .supertype
                    .as_deref()
                    .map(EntityDescriptor::identify),
                group_permissions_uuid: entity_permissions,
            });
        }

        // Implied-property links. The declared side gets its forward
        // reference; the referent gets a back-reference. When both sides
        // declare each other the links come out mutually consistent.
        for entity in &schema.entities {
            for property in &entity.properties {
                let Some(target) = &property.implied_property else {
                    continue;
                };
                let source_uuid =
                    self.property_ids[&(entity.name.clone(), property.name.clone())];
                let target_key = (target.entity.clone(), target.property.clone());
                let Some(&target_uuid) = self.property_ids.get(&target_key) else {
                    return Err(SchemaDefinitionError::UnresolvedImplied {
                        entity: entity.name.clone(),
                        property: property.name.clone(),
                        target_entity: target.entity.clone(),
                        target_property: target.property.clone(),
                    });
                };
                if let Some(source) = properties.get_mut(&source_uuid) {
                    source.implied_property_uuid = Some(target_uuid);
                }
                if let Some(back) = properties.get_mut(&target_uuid) {
                    back.implied_uuid = Some(source_uuid);
                }
            }
        }

        for (_, property) in properties {
            registry.insert_property(property);
        }
        for entity in entities {
            debug!(
                "built entity descriptor '{}' ({} properties)",
                entity.type_name,
                entity.property_uuids.len()
            );
            registry.insert_entity(entity);
        }
        Ok(())
    }

    /// Intern the type a `TypeSpec` describes, recursively.
    fn intern_spec(
        &self,
        registry: &mut TypeRegistry,
        spec: &TypeSpec,
    ) -> Result<Uuid, SchemaDefinitionError> {
        let ty = match spec {
            TypeSpec::Any => Type::primitive(JsonKind::Any),
            TypeSpec::Boolean => Type::primitive(JsonKind::Boolean),
            TypeSpec::Integer => Type::primitive(JsonKind::Integer),
            TypeSpec::Double => Type::primitive(JsonKind::Double),
            TypeSpec::String => Type::primitive(JsonKind::String),
            TypeSpec::Null => Type::primitive(JsonKind::Null),
            TypeSpec::Enum { name, values } => {
                Type::string_enum(name.as_deref(), values.clone())
            }
            TypeSpec::List(element) => {
                let element_uuid = self.intern_spec(registry, element)?;
                Type::list_of(element_uuid)
            }
            TypeSpec::Map(key, value) => {
                let key_uuid = self.intern_spec(registry, key)?;
                let value_uuid = self.intern_spec(registry, value)?;
                Type::map_of(key_uuid, value_uuid)
            }
            TypeSpec::Entity(name) => {
                if !self.declared.contains_key(name) && registry.entity_by_name(name).is_none() {
                    return Err(SchemaDefinitionError::UnresolvedEntity(name.clone()));
                }
                Type::entity(name)
            }
        };
        Ok(registry.intern_type(ty))
    }

    /// Parse grant declarations into an interned, name-sorted permission set.
    fn build_permissions(
        &self,
        registry: &mut TypeRegistry,
        grants: &[crate::model::GrantDecl],
    ) -> Result<Uuid, SchemaDefinitionError> {
        let mut named: Vec<(String, GroupGrant)> = Vec::with_capacity(grants.len());
        for grant in grants {
            // Well-known groups are pre-registered, so any miss is a real
            // unresolved name.
            let group_uuid = *self
                .groups_by_name
                .get(&grant.group)
                .ok_or_else(|| SchemaDefinitionError::UnresolvedGroup(grant.group.clone()))?;
            let mut action_uuids = Vec::with_capacity(grant.actions.len());
            for pattern in &grant.actions {
                let (action_type, verb) = pattern
                    .split_once('.')
                    .ok_or_else(|| SchemaDefinitionError::MalformedAction(pattern.clone()))?;
                if action_type.is_empty() || verb.is_empty() {
                    return Err(SchemaDefinitionError::MalformedAction(pattern.clone()));
                }
                let action = SecurityAction::of(action_type, verb);
                action_uuids.push(registry.insert_action(action));
            }
            named.push((
                grant.group.clone(),
                GroupGrant {
                    security_group_uuid: group_uuid,
                    security_action_uuids: action_uuids,
                },
            ));
        }
        // Sorted by group name so the set's identity ignores declaration
        // order.
        named.sort_by(|(a, _), (b, _)| a.cmp(b));
        let permissions =
            GroupPermissions::new(named.into_iter().map(|(_, grant)| grant).collect());
        Ok(registry.insert_permissions(permissions))
    }

    /// Resolve a declared segment path (`["owner"]`, `["owner", "parent"]`)
    /// into a chain of property identifiers, following entity-typed
    /// properties from the declaring entity.
    fn resolve_path(
        &self,
        schema: &SchemaDecl,
        root: &EntityDecl,
        group: &str,
        segments: &[String],
    ) -> Result<PropertyPath, SchemaDefinitionError> {
        let mut current = root.name.clone();
        let mut property_uuids = Vec::with_capacity(segments.len());
        for segment in segments {
            let Some((entity_name, property)) = self.find_property(schema, &current, segment)
            else {
                return Err(SchemaDefinitionError::UnresolvedPathSegment {
                    group: group.to_string(),
                    entity: current,
                    segment: segment.clone(),
                });
            };
            property_uuids.push(PropertyDescriptor::identify(&entity_name, segment));

            // The next hop must be entity-typed (directly or as a list
            // element) to keep walking.
            let next = match &property.type_spec {
                TypeSpec::Entity(name) => Some(name.clone()),
                TypeSpec::List(element) => match element.as_ref() {
                    TypeSpec::Entity(name) => Some(name.clone()),
                    _ => None,
                },
                _ => None,
            };
            match next {
                Some(name) => current = name,
                None => {
                    return Err(SchemaDefinitionError::UnresolvedPathSegment {
                        group: group.to_string(),
                        entity: current,
                        segment: segment.clone(),
                    })
                }
            }
        }
        Ok(PropertyPath::new(property_uuids))
    }

    /// Find a property declaration by name on an entity or its supertype
    /// chain, returning the declaring entity's name.
    fn find_property<'a>(
        &self,
        schema: &'a SchemaDecl,
        entity_name: &str,
        property_name: &str,
    ) -> Option<(String, &'a crate::model::PropertyDecl)> {
        let mut current = entity_name.to_string();
        loop {
            let index = *self.declared.get(&current)?;
            let entity = &schema.entities[index];
            if let Some(property) = entity
                .properties
                .iter()
                .find(|property| property.name == property_name)
            {
                return Some((current, property));
            }
            current = entity.supertype.clone()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GrantDecl, GlobalGroupDecl, PropertyDecl, SecurityGroupDecl, GROUP_ALL};

    fn permit_all() -> Vec<GrantDecl> {
        vec![GrantDecl::new(GROUP_ALL, &["*.*"])]
    }

    fn product_schema() -> SchemaDecl {
        SchemaDecl {
            global_groups: vec![GlobalGroupDecl::new("admin", "Administrators")],
            entities: vec![
                EntityDecl::new("merchant", permit_all())
                    .persistent()
                    .property(PropertyDecl::new("name", TypeSpec::String))
                    .property(
                        PropertyDecl::new("products", TypeSpec::list_of(TypeSpec::entity("product")))
                            .implied("product", "owner"),
                    ),
                EntityDecl::new("product", permit_all())
                    .persistent()
                    .group(SecurityGroupDecl {
                        name: "productOwner".to_string(),
                        description: None,
                        paths: vec![vec!["owner".to_string()]],
                    })
                    .property(PropertyDecl::new("name", TypeSpec::String))
                    .property(
                        PropertyDecl::new("owner", TypeSpec::entity("merchant"))
                            .implied("merchant", "products"),
                    ),
            ],
        }
    }

    #[test]
    fn builds_a_consistent_graph() {
        let mut registry = TypeRegistry::new();
        EntityModelBuilder::build(&mut registry, &product_schema()).unwrap();

        let product = registry.entity_by_name("product").unwrap();
        assert_eq!(product.property_uuids.len(), 2);
        for uuid in &product.property_uuids {
            registry.resolve_property(uuid).unwrap();
        }
        registry
            .resolve_permissions(&product.group_permissions_uuid)
            .unwrap();

        let owner_group = registry.group_by_name("productOwner").unwrap();
        assert!(!owner_group.global_security_group);
        assert_eq!(owner_group.path_uuids.len(), 1);
        let path = registry.resolve_path(&owner_group.path_uuids[0]).unwrap();
        assert_eq!(
            path.property_uuids,
            vec![PropertyDescriptor::identify("product", "owner")]
        );
    }

    #[test]
    fn rebuilding_yields_identical_identifiers() {
        let mut first = TypeRegistry::new();
        EntityModelBuilder::build(&mut first, &product_schema()).unwrap();

        // Same declarations with the entity order flipped.
        let mut reordered = product_schema();
        reordered.entities.reverse();
        let mut second = TypeRegistry::new();
        EntityModelBuilder::build(&mut second, &reordered).unwrap();

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn implied_links_are_mutually_consistent() {
        let mut registry = TypeRegistry::new();
        EntityModelBuilder::build(&mut registry, &product_schema()).unwrap();

        let owner_uuid = PropertyDescriptor::identify("product", "owner");
        let products_uuid = PropertyDescriptor::identify("merchant", "products");
        let owner = registry.resolve_property(&owner_uuid).unwrap();
        let products = registry.resolve_property(&products_uuid).unwrap();

        assert_eq!(owner.implied_property_uuid, Some(products_uuid));
        assert_eq!(owner.implied_uuid, Some(products_uuid));
        assert_eq!(products.implied_property_uuid, Some(owner_uuid));
        assert_eq!(products.implied_uuid, Some(owner_uuid));
    }

    #[test]
    fn rejects_unresolved_supertypes() {
        let mut schema = product_schema();
        schema.entities[1].supertype = Some("ghost".to_string());
        let mut registry = TypeRegistry::new();
        let err = EntityModelBuilder::build(&mut registry, &schema).unwrap_err();
        assert_eq!(
            err,
            SchemaDefinitionError::UnresolvedSupertype {
                entity: "product".to_string(),
                supertype: "ghost".to_string()
            }
        );
    }

    #[test]
    fn rejects_supertype_cycles() {
        let mut schema = SchemaDecl::default();
        schema.entities = vec![
            EntityDecl::new("a", permit_all()).supertype("b"),
            EntityDecl::new("b", permit_all()).supertype("a"),
        ];
        let mut registry = TypeRegistry::new();
        let err = EntityModelBuilder::build(&mut registry, &schema).unwrap_err();
        assert_eq!(err, SchemaDefinitionError::SupertypeCycle("a".to_string()));
    }

    #[test]
    fn rejects_duplicate_property_names() {
        let mut schema = product_schema();
        schema.entities[1] = schema.entities[1]
            .clone()
            .property(PropertyDecl::new("name", TypeSpec::Integer));
        let mut registry = TypeRegistry::new();
        let err = EntityModelBuilder::build(&mut registry, &schema).unwrap_err();
        assert_eq!(
            err,
            SchemaDefinitionError::DuplicateProperty {
                entity: "product".to_string(),
                property: "name".to_string()
            }
        );
    }

    #[test]
    fn rejects_embedded_scalars() {
        let mut schema = product_schema();
        schema.entities[1] = schema.entities[1]
            .clone()
            .property(PropertyDecl::new("weight", TypeSpec::Double).embedded());
        let mut registry = TypeRegistry::new();
        let err = EntityModelBuilder::build(&mut registry, &schema).unwrap_err();
        assert_eq!(
            err,
            SchemaDefinitionError::EmbeddedScalar {
                entity: "product".to_string(),
                property: "weight".to_string()
            }
        );
    }

    #[test]
    fn rejects_unknown_permission_groups() {
        let mut schema = product_schema();
        schema.entities[1].permissions = vec![GrantDecl::new("phantoms", &["crud.read"])];
        let mut registry = TypeRegistry::new();
        let err = EntityModelBuilder::build(&mut registry, &schema).unwrap_err();
        assert_eq!(
            err,
            SchemaDefinitionError::UnresolvedGroup("phantoms".to_string())
        );
    }
}
