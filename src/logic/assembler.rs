use crate::config::DescriberConfig;
use crate::logic::builder::{intern_type_spec, EntityModelBuilder, SchemaDefinitionError};
use crate::logic::registry::TypeRegistry;
use crate::logic::security::{Principal, SecurityResolver};
use crate::logic::traversal::{TraversalEngine, TraversalError};
use crate::model::{
    uuid_string, ApiDescription, Document, EndpointDecl, EndpointDescription, EntityDecl,
    EntityDescriptor, EntityValue, FieldValue, GrantDecl, GroupPermissions, ParameterDescription,
    PropertyDecl, PropertyDescriptor, SchemaDecl, SecurityAction, SecurityGroup, TraversalMode,
    Type, TypeDescription, TypeSpec, GROUP_ALL, GROUP_REFLEXIVE,
};
use crate::store::memory::MemoryStore;
use log::debug;
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

/// Composes endpoint, parameter and API descriptors, computes the closure of
/// entities reachable from the declared endpoint set, and produces the final
/// describe document by handing the closure to the traversal engine.
///
/// Descriptors are entities like any others: the assembler maintains a
/// meta-schema describing the descriptor kinds themselves, projects every
/// descriptor into an [`EntityValue`], and serializes the projection with the
/// same machinery that serializes domain instances.
pub struct ApiAssembler<'a> {
    config: &'a DescriberConfig,
}

impl<'a> ApiAssembler<'a> {
    pub fn new(config: &'a DescriberConfig) -> Self {
        Self { config }
    }

    /// Build the API surface from declared endpoints. Returns the
    /// `ApiDescription` identifier; every referenced descriptor is interned
    /// and verified resolvable before this returns.
    pub fn assemble(
        &self,
        registry: &mut TypeRegistry,
        endpoints: &[EndpointDecl],
    ) -> Result<Uuid, SchemaDefinitionError> {
        Self::ensure_meta_schema(registry)?;

        let mut endpoint_uuids = Vec::with_capacity(endpoints.len());
        let mut seed_types = Vec::new();

        for decl in endpoints {
            let endpoint_uuid = EndpointDescription::identify(&decl.method, &decl.path);

            let entity_uuid = decl
                .entity
                .as_ref()
                .map(|spec| intern_type_spec(registry, spec))
                .transpose()?;
            let return_type_uuid = decl
                .return_type
                .as_ref()
                .map(|spec| intern_type_spec(registry, spec))
                .transpose()?;
            seed_types.extend(entity_uuid);
            seed_types.extend(return_type_uuid);

            let mut path_parameter_uuids = Vec::with_capacity(decl.path_parameters.len());
            let mut query_parameter_uuids = Vec::with_capacity(decl.query_parameters.len());
            for (params, uuids) in [
                (&decl.path_parameters, &mut path_parameter_uuids),
                (&decl.query_parameters, &mut query_parameter_uuids),
            ] {
                for param in params.iter() {
                    let type_uuid = intern_type_spec(registry, &param.type_spec)?;
                    seed_types.push(type_uuid);
                    let parameter = ParameterDescription {
                        uuid: ParameterDescription::identify(&endpoint_uuid, &param.name, &type_uuid),
                        endpoint_uuid,
                        name: param.name.clone(),
                        type_uuid,
                        doc_string: param.doc_string.clone(),
                    };
                    uuids.push(registry.insert_parameter(parameter));
                }
            }

            let mut extra_return_data_uuids = Vec::with_capacity(decl.extra_return_data.len());
            for extra in &decl.extra_return_data {
                let type_uuid = intern_type_spec(registry, &extra.type_spec)?;
                seed_types.push(type_uuid);
                let description = TypeDescription::new(type_uuid, extra.doc_string.as_deref());
                extra_return_data_uuids.push(registry.insert_type_description(description));
            }

            let endpoint = EndpointDescription {
                uuid: endpoint_uuid,
                method: decl.method.clone(),
                path: decl.path.clone(),
                doc_string: decl.doc_string.clone(),
                return_doc_string: decl.return_doc_string.clone(),
                entity_uuid,
                return_type_uuid,
                traversal_mode: decl.traversal_mode,
                path_parameter_uuids,
                query_parameter_uuids,
                role_names: decl.role_names.clone(),
                extra_return_data_uuids,
            };
            endpoint_uuids.push(registry.insert_endpoint(endpoint));
        }

        let entity_uuids = Self::collect_entities(registry, &seed_types)?;
        Self::verify_closure(registry, &entity_uuids)?;
        debug!(
            "assembled '{}': {} endpoints, {} reachable entities",
            self.config.api_name,
            endpoint_uuids.len(),
            entity_uuids.len()
        );

        let api = ApiDescription::new(&self.config.api_name, entity_uuids, endpoint_uuids);
        Ok(registry.insert_api(api))
    }

    /// Produce the wire document for an assembled API: project the closure
    /// into entity values and run a DEEP traversal from the
    /// `ApiDescription` root.
    pub fn describe(
        &self,
        registry: &TypeRegistry,
        api_uuid: Uuid,
        principal: &Principal,
    ) -> Result<Document, TraversalError> {
        let api = registry.resolve_api(&api_uuid)?;

        let limit: Option<HashSet<&str>> = self
            .config
            .limit_group_names
            .as_ref()
            .map(|names| names.iter().map(String::as_str).collect());

        // Property-level filtering for group-limited descriptions. A
        // property is kept when its effective permissions grant something to
        // a limited group (or to the well-known all/reflexive groups), or
        // when its implied counterpart is kept; that lets collection
        // properties survive when only the back-referencing side is visible.
        let kept_property = |property: &PropertyDescriptor| -> bool {
            if Self::permissions_qualify(
                registry,
                self.effective_permissions(registry, property),
                limit.as_ref(),
            ) {
                return true;
            }
            property
                .implied_property_uuid
                .and_then(|uuid| registry.resolve_property(&uuid).ok())
                .is_some_and(|implied| {
                    Self::permissions_qualify(
                        registry,
                        self.effective_permissions(registry, implied),
                        limit.as_ref(),
                    )
                })
        };

        let store = MemoryStore::new();
        let mut kept_entities: Vec<Uuid> = Vec::with_capacity(api.entity_uuids.len());
        for entity_uuid in &api.entity_uuids {
            let entity = registry.resolve_entity(entity_uuid)?;
            let kept_properties: Vec<Uuid> = entity
                .property_uuids
                .iter()
                .filter(|uuid| {
                    registry
                        .resolve_property(uuid)
                        .map(&kept_property)
                        .unwrap_or(false)
                })
                .copied()
                .collect();
            if limit.is_some() && kept_properties.is_empty() {
                debug!(
                    "dropping entity '{}' from description: no visible properties",
                    entity.type_name
                );
                continue;
            }
            kept_entities.push(*entity_uuid);
            store.insert(Self::project_entity(entity, &kept_properties));
        }

        // Project the remaining descriptor kinds wholesale; the traversal
        // only emits what stays reachable from the root.
        for ty in registry.types() {
            store.insert(Self::project_type(ty));
        }
        for property in registry.properties() {
            store.insert(Self::project_property(property));
        }
        for group in registry.groups() {
            store.insert(Self::project_group(registry, group));
        }
        for action in registry.actions() {
            store.insert(Self::project_action(action));
        }
        for permissions in registry.permission_sets() {
            store.insert(Self::project_permissions(permissions));
        }
        for endpoint in registry.endpoints() {
            store.insert(Self::project_endpoint(endpoint));
        }
        for parameter in registry.parameters() {
            store.insert(Self::project_parameter(parameter));
        }
        for description in registry.type_descriptions() {
            store.insert(Self::project_type_description(description));
        }
        store.insert(Self::project_api(api, kept_entities));

        let resolver = SecurityResolver::new(registry);
        TraversalEngine::new(registry, resolver, &store).serialize(
            api_uuid,
            TraversalMode::Deep,
            principal,
        )
    }

    fn effective_permissions(
        &self,
        registry: &TypeRegistry,
        property: &PropertyDescriptor,
    ) -> Option<Uuid> {
        property.group_permissions_uuid.or_else(|| {
            registry
                .entity_by_name(&property.enclosing_type_name)
                .map(|entity| entity.group_permissions_uuid)
        })
    }

    fn permissions_qualify(
        registry: &TypeRegistry,
        permissions_uuid: Option<Uuid>,
        limit: Option<&HashSet<&str>>,
    ) -> bool {
        let Some(limit) = limit else {
            return true;
        };
        let Some(permissions_uuid) = permissions_uuid else {
            return true;
        };
        let Ok(permissions) = registry.resolve_permissions(&permissions_uuid) else {
            return true;
        };
        for grant in &permissions.operations {
            // A group granted no actions cannot make anything visible.
            if grant.security_action_uuids.is_empty() {
                continue;
            }
            if let Ok(group) = registry.resolve_group(&grant.security_group_uuid) {
                if group.name == GROUP_ALL
                    || group.name == GROUP_REFLEXIVE
                    || limit.contains(group.name.as_str())
                {
                    return true;
                }
            }
        }
        false
    }

    /// Breadth-first discovery of every entity reachable from the seed
    /// types: through list/map element types, property types, supertypes and
    /// declared subtypes (a reference to a base type includes its subtypes).
    fn collect_entities(
        registry: &TypeRegistry,
        seed_types: &[Uuid],
    ) -> Result<Vec<Uuid>, SchemaDefinitionError> {
        let mut ordered = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut type_queue: VecDeque<Uuid> = seed_types.iter().copied().collect();
        let mut entity_queue: VecDeque<Uuid> = VecDeque::new();

        loop {
            while let Some(type_uuid) = type_queue.pop_front() {
                let ty = registry
                    .resolve_type(&type_uuid)
                    .map_err(|err| SchemaDefinitionError::DanglingReference(err.0))?;
                if let Some(name) = ty.entity_name() {
                    let entity = registry
                        .entity_by_name(name)
                        .ok_or_else(|| SchemaDefinitionError::UnresolvedEntity(name.to_string()))?;
                    entity_queue.push_back(entity.uuid);
                }
                type_queue.extend(ty.list_element_uuid);
                type_queue.extend(ty.map_key_uuid);
                type_queue.extend(ty.map_value_uuid);
            }

            let Some(entity_uuid) = entity_queue.pop_front() else {
                break;
            };
            if !seen.insert(entity_uuid) {
                continue;
            }
            ordered.push(entity_uuid);
            let entity = registry
                .resolve_entity(&entity_uuid)
                .map_err(|err| SchemaDefinitionError::DanglingReference(err.0))?;
            entity_queue.extend(entity.supertype_uuid);
            for subtype in registry.subtypes_of(&entity_uuid) {
                entity_queue.push_back(subtype.uuid);
            }
            for property_uuid in &entity.property_uuids {
                let property = registry
                    .resolve_property(property_uuid)
                    .map_err(|err| SchemaDefinitionError::DanglingReference(err.0))?;
                type_queue.push_back(property.type_uuid);
            }
        }
        Ok(ordered)
    }

    /// Every descriptor reachable from the closure must resolve; a dangling
    /// reference is a construction error, caught here rather than at
    /// traversal time.
    fn verify_closure(
        registry: &TypeRegistry,
        entity_uuids: &[Uuid],
    ) -> Result<(), SchemaDefinitionError> {
        let dangling = SchemaDefinitionError::DanglingReference;
        for entity_uuid in entity_uuids {
            let entity = registry
                .resolve_entity(entity_uuid)
                .map_err(|err| dangling(err.0))?;
            let mut permission_uuids = vec![entity.group_permissions_uuid];
            for property_uuid in &entity.property_uuids {
                let property = registry
                    .resolve_property(property_uuid)
                    .map_err(|err| dangling(err.0))?;
                permission_uuids.extend(property.group_permissions_uuid);
                for implied in [property.implied_property_uuid, property.implied_uuid]
                    .into_iter()
                    .flatten()
                {
                    registry
                        .resolve_property(&implied)
                        .map_err(|err| dangling(err.0))?;
                }
            }
            for permissions_uuid in permission_uuids {
                let permissions = registry
                    .resolve_permissions(&permissions_uuid)
                    .map_err(|err| dangling(err.0))?;
                for grant in &permissions.operations {
                    let group = registry
                        .resolve_group(&grant.security_group_uuid)
                        .map_err(|err| dangling(err.0))?;
                    for action_uuid in &grant.security_action_uuids {
                        registry
                            .resolve_action(action_uuid)
                            .map_err(|err| dangling(err.0))?;
                    }
                    for path_uuid in &group.path_uuids {
                        let path = registry
                            .resolve_path(path_uuid)
                            .map_err(|err| dangling(err.0))?;
                        for property_uuid in &path.property_uuids {
                            registry
                                .resolve_property(property_uuid)
                                .map_err(|err| dangling(err.0))?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Build the descriptor meta-schema once per registry. Descriptor kinds
    /// are ordinary entities, which is what lets the traversal engine emit
    /// them. Safe to call repeatedly; schemas whose entities inherit from
    /// `baseHasUuid` must build after this.
    pub fn ensure_meta_schema(registry: &mut TypeRegistry) -> Result<(), SchemaDefinitionError> {
        if registry.entity_by_name("apiDescription").is_some() {
            return Ok(());
        }
        EntityModelBuilder::build(registry, &Self::meta_schema())
    }

    fn meta_schema() -> SchemaDecl {
        let permit_all = || vec![GrantDecl::new(GROUP_ALL, &["*.*"])];
        let kind_values: Vec<String> =
            ["ANY", "BOOLEAN", "DOUBLE", "INTEGER", "LIST", "MAP", "NULL", "STRING"]
                .iter()
                .map(|v| v.to_string())
                .collect();
        let mode_values: Vec<String> = ["SIMPLE", "SPARSE", "DEEP"]
            .iter()
            .map(|v| v.to_string())
            .collect();

        SchemaDecl {
            global_groups: Vec::new(),
            entities: vec![
                EntityDecl::new("baseHasUuid", permit_all())
                    .doc("Root supertype of every payload entity")
                    .property(PropertyDecl::new("uuid", TypeSpec::String)),
                EntityDecl::new("type", permit_all())
                    .supertype("baseHasUuid")
                    .doc("A simplified description of a JSON value shape")
                    .property(PropertyDecl::new("name", TypeSpec::String))
                    .property(PropertyDecl::new(
                        "jsonKind",
                        TypeSpec::Enum {
                            name: Some("jsonKind".to_string()),
                            values: kind_values,
                        },
                    ))
                    .property(PropertyDecl::new("listElement", TypeSpec::entity("type")))
                    .property(PropertyDecl::new("mapKey", TypeSpec::entity("type")))
                    .property(PropertyDecl::new("mapValue", TypeSpec::entity("type")))
                    .property(PropertyDecl::new(
                        "enumValues",
                        TypeSpec::list_of(TypeSpec::String),
                    ))
                    .property(PropertyDecl::new("typeHint", TypeSpec::String)),
                EntityDecl::new("property", permit_all())
                    .supertype("baseHasUuid")
                    .property(PropertyDecl::new("name", TypeSpec::String))
                    .property(PropertyDecl::new("enclosingTypeName", TypeSpec::String))
                    .property(PropertyDecl::new("type", TypeSpec::entity("type")))
                    .property(
                        PropertyDecl::new("deepTraversalOnly", TypeSpec::Boolean)
                            .suppress_default_value(),
                    )
                    .property(
                        PropertyDecl::new("embedded", TypeSpec::Boolean).suppress_default_value(),
                    )
                    .property(
                        PropertyDecl::new("suppressDefaultValue", TypeSpec::Boolean)
                            .suppress_default_value(),
                    )
                    .property(PropertyDecl::new(
                        "impliedProperty",
                        TypeSpec::entity("property"),
                    ))
                    .property(PropertyDecl::new("implied", TypeSpec::entity("property")))
                    .property(PropertyDecl::new(
                        "groupPermissions",
                        TypeSpec::entity("groupPermissions"),
                    ))
                    .property(PropertyDecl::new("docString", TypeSpec::String)),
                EntityDecl::new("entityDescription", permit_all())
                    .supertype("baseHasUuid")
                    .property(PropertyDecl::new("typeName", TypeSpec::String))
                    .property(
                        PropertyDecl::new("persistent", TypeSpec::Boolean).suppress_default_value(),
                    )
                    .property(PropertyDecl::new("docString", TypeSpec::String))
                    .property(PropertyDecl::new(
                        "properties",
                        TypeSpec::list_of(TypeSpec::entity("property")),
                    ))
                    .property(PropertyDecl::new(
                        "supertype",
                        TypeSpec::entity("entityDescription"),
                    ))
                    .property(PropertyDecl::new(
                        "groupPermissions",
                        TypeSpec::entity("groupPermissions"),
                    )),
                EntityDecl::new("groupPermissions", permit_all())
                    .supertype("baseHasUuid")
                    .property(PropertyDecl::new(
                        "operations",
                        TypeSpec::map_of(
                            TypeSpec::entity("securityGroup"),
                            TypeSpec::list_of(TypeSpec::entity("securityAction")),
                        ),
                    )),
                EntityDecl::new("securityGroup", permit_all())
                    .supertype("baseHasUuid")
                    .property(PropertyDecl::new("name", TypeSpec::String))
                    .property(PropertyDecl::new("description", TypeSpec::String))
                    .property(
                        PropertyDecl::new("globalSecurityGroup", TypeSpec::Boolean)
                            .suppress_default_value(),
                    )
                    .property(PropertyDecl::new(
                        "paths",
                        TypeSpec::list_of(TypeSpec::list_of(TypeSpec::entity("property"))),
                    )),
                EntityDecl::new("securityAction", permit_all())
                    .supertype("baseHasUuid")
                    .property(PropertyDecl::new("type", TypeSpec::String))
                    .property(PropertyDecl::new("action", TypeSpec::String))
                    .property(
                        PropertyDecl::new("actionWildcard", TypeSpec::Boolean)
                            .suppress_default_value(),
                    )
                    .property(
                        PropertyDecl::new("verbWildcard", TypeSpec::Boolean)
                            .suppress_default_value(),
                    ),
                EntityDecl::new("endpointDescription", permit_all())
                    .supertype("baseHasUuid")
                    .property(PropertyDecl::new("method", TypeSpec::String))
                    .property(PropertyDecl::new("path", TypeSpec::String))
                    .property(PropertyDecl::new("docString", TypeSpec::String))
                    .property(PropertyDecl::new("returnDocString", TypeSpec::String))
                    .property(PropertyDecl::new("entity", TypeSpec::entity("type")))
                    .property(PropertyDecl::new("returnType", TypeSpec::entity("type")))
                    .property(PropertyDecl::new(
                        "traversalMode",
                        TypeSpec::Enum {
                            name: Some("traversalMode".to_string()),
                            values: mode_values,
                        },
                    ))
                    .property(PropertyDecl::new(
                        "pathParameters",
                        TypeSpec::list_of(TypeSpec::entity("parameterDescription")),
                    ))
                    .property(PropertyDecl::new(
                        "queryParameters",
                        TypeSpec::list_of(TypeSpec::entity("parameterDescription")),
                    ))
                    .property(PropertyDecl::new(
                        "roleNames",
                        TypeSpec::list_of(TypeSpec::String),
                    ))
                    .property(PropertyDecl::new(
                        "extraReturnData",
                        TypeSpec::list_of(TypeSpec::entity("typeDescription")),
                    )),
                EntityDecl::new("parameterDescription", permit_all())
                    .supertype("baseHasUuid")
                    .property(PropertyDecl::new("name", TypeSpec::String))
                    .property(PropertyDecl::new("docString", TypeSpec::String))
                    .property(PropertyDecl::new(
                        "endpoint",
                        TypeSpec::entity("endpointDescription"),
                    ))
                    .property(PropertyDecl::new("type", TypeSpec::entity("type"))),
                EntityDecl::new("typeDescription", permit_all())
                    .supertype("baseHasUuid")
                    .property(PropertyDecl::new("docString", TypeSpec::String))
                    .property(PropertyDecl::new("type", TypeSpec::entity("type"))),
                EntityDecl::new("apiDescription", permit_all())
                    .supertype("baseHasUuid")
                    .property(PropertyDecl::new("apiName", TypeSpec::String))
                    .property(PropertyDecl::new(
                        "entities",
                        TypeSpec::list_of(TypeSpec::entity("entityDescription")),
                    ))
                    .property(PropertyDecl::new(
                        "endpoints",
                        TypeSpec::list_of(TypeSpec::entity("endpointDescription")),
                    )),
            ],
        }
    }

    fn meta(type_name: &str) -> Uuid {
        EntityDescriptor::identify(type_name)
    }

    fn project_type(ty: &Type) -> EntityValue {
        let mut value = EntityValue::with_uuid(ty.uuid, Self::meta("type"))
            .set("jsonKind", FieldValue::string(ty.json_kind.wire_name()));
        if let Some(name) = &ty.name {
            value = value.set("name", FieldValue::string(name));
        }
        if let Some(element) = ty.list_element_uuid {
            value = value.set("listElement", FieldValue::Reference(element));
        }
        if let Some(key) = ty.map_key_uuid {
            value = value.set("mapKey", FieldValue::Reference(key));
        }
        if let Some(map_value) = ty.map_value_uuid {
            value = value.set("mapValue", FieldValue::Reference(map_value));
        }
        if let Some(values) = &ty.enum_values {
            value = value.set(
                "enumValues",
                FieldValue::List(values.iter().map(|v| FieldValue::string(v)).collect()),
            );
        }
        if let Some(hint) = &ty.type_hint {
            value = value.set("typeHint", FieldValue::string(hint));
        }
        value
    }

    fn project_property(property: &PropertyDescriptor) -> EntityValue {
        let mut value = EntityValue::with_uuid(property.uuid, Self::meta("property"))
            .set("name", FieldValue::string(&property.name))
            .set(
                "enclosingTypeName",
                FieldValue::string(&property.enclosing_type_name),
            )
            .set("type", FieldValue::Reference(property.type_uuid))
            .set(
                "deepTraversalOnly",
                FieldValue::boolean(property.deep_traversal_only),
            )
            .set("embedded", FieldValue::boolean(property.embedded))
            .set(
                "suppressDefaultValue",
                FieldValue::boolean(property.suppress_default_value),
            );
        if let Some(implied_property) = property.implied_property_uuid {
            value = value.set("impliedProperty", FieldValue::Reference(implied_property));
        }
        if let Some(implied) = property.implied_uuid {
            value = value.set("implied", FieldValue::Reference(implied));
        }
        if let Some(permissions) = property.group_permissions_uuid {
            value = value.set("groupPermissions", FieldValue::Reference(permissions));
        }
        if let Some(doc) = &property.doc_string {
            value = value.set("docString", FieldValue::string(doc));
        }
        value
    }

    fn project_entity(entity: &EntityDescriptor, kept_properties: &[Uuid]) -> EntityValue {
        let mut value = EntityValue::with_uuid(entity.uuid, Self::meta("entityDescription"))
            .set("typeName", FieldValue::string(&entity.type_name))
            .set("persistent", FieldValue::boolean(entity.persistent))
            .set("properties", FieldValue::references(kept_properties))
            .set(
                "groupPermissions",
                FieldValue::Reference(entity.group_permissions_uuid),
            );
        if let Some(supertype) = entity.supertype_uuid {
            value = value.set("supertype", FieldValue::Reference(supertype));
        }
        if let Some(doc) = &entity.doc_string {
            value = value.set("docString", FieldValue::string(doc));
        }
        value
    }

    fn project_permissions(permissions: &GroupPermissions) -> EntityValue {
        let operations = permissions
            .operations
            .iter()
            .map(|grant| {
                (
                    uuid_string(&grant.security_group_uuid),
                    FieldValue::references(&grant.security_action_uuids),
                )
            })
            .collect();
        EntityValue::with_uuid(permissions.uuid, Self::meta("groupPermissions"))
            .set("operations", FieldValue::Map(operations))
    }

    fn project_group(registry: &TypeRegistry, group: &SecurityGroup) -> EntityValue {
        let paths = group
            .path_uuids
            .iter()
            .filter_map(|path_uuid| registry.resolve_path(path_uuid).ok())
            .map(|path| FieldValue::references(&path.property_uuids))
            .collect();
        let mut value = EntityValue::with_uuid(group.uuid, Self::meta("securityGroup"))
            .set("name", FieldValue::string(&group.name))
            .set(
                "globalSecurityGroup",
                FieldValue::boolean(group.global_security_group),
            )
            .set("paths", FieldValue::List(paths));
        if let Some(description) = &group.description {
            value = value.set("description", FieldValue::string(description));
        }
        value
    }

    fn project_action(action: &SecurityAction) -> EntityValue {
        EntityValue::with_uuid(action.uuid, Self::meta("securityAction"))
            .set("type", FieldValue::string(&action.action_type))
            .set("action", FieldValue::string(&action.action))
            .set(
                "actionWildcard",
                FieldValue::boolean(action.is_action_wildcard()),
            )
            .set(
                "verbWildcard",
                FieldValue::boolean(action.is_verb_wildcard()),
            )
    }

    fn project_endpoint(endpoint: &EndpointDescription) -> EntityValue {
        let mut value = EntityValue::with_uuid(endpoint.uuid, Self::meta("endpointDescription"))
            .set("method", FieldValue::string(&endpoint.method))
            .set("path", FieldValue::string(&endpoint.path))
            .set(
                "pathParameters",
                FieldValue::references(&endpoint.path_parameter_uuids),
            )
            .set(
                "queryParameters",
                FieldValue::references(&endpoint.query_parameter_uuids),
            )
            .set(
                "extraReturnData",
                FieldValue::references(&endpoint.extra_return_data_uuids),
            );
        if let Some(doc) = &endpoint.doc_string {
            value = value.set("docString", FieldValue::string(doc));
        }
        if let Some(doc) = &endpoint.return_doc_string {
            value = value.set("returnDocString", FieldValue::string(doc));
        }
        if let Some(entity) = endpoint.entity_uuid {
            value = value.set("entity", FieldValue::Reference(entity));
        }
        if let Some(return_type) = endpoint.return_type_uuid {
            value = value.set("returnType", FieldValue::Reference(return_type));
        }
        if let Some(mode) = endpoint.traversal_mode {
            value = value.set("traversalMode", FieldValue::string(mode.wire_name()));
        }
        if let Some(roles) = &endpoint.role_names {
            value = value.set(
                "roleNames",
                FieldValue::List(roles.iter().map(|r| FieldValue::string(r)).collect()),
            );
        }
        value
    }

    fn project_parameter(parameter: &ParameterDescription) -> EntityValue {
        let mut value = EntityValue::with_uuid(parameter.uuid, Self::meta("parameterDescription"))
            .set("name", FieldValue::string(&parameter.name))
            .set("endpoint", FieldValue::Reference(parameter.endpoint_uuid))
            .set("type", FieldValue::Reference(parameter.type_uuid));
        if let Some(doc) = &parameter.doc_string {
            value = value.set("docString", FieldValue::string(doc));
        }
        value
    }

    fn project_type_description(description: &TypeDescription) -> EntityValue {
        let mut value = EntityValue::with_uuid(description.uuid, Self::meta("typeDescription"))
            .set("type", FieldValue::Reference(description.type_uuid));
        if let Some(doc) = &description.doc_string {
            value = value.set("docString", FieldValue::string(doc));
        }
        value
    }

    fn project_api(api: &ApiDescription, kept_entities: Vec<Uuid>) -> EntityValue {
        EntityValue::with_uuid(api.uuid, Self::meta("apiDescription"))
            .set("apiName", FieldValue::string(&api.api_name))
            .set("entities", FieldValue::references(&kept_entities))
            .set("endpoints", FieldValue::references(&api.endpoint_uuids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GlobalGroupDecl, ParameterDecl};

    fn domain_schema() -> SchemaDecl {
        SchemaDecl {
            global_groups: vec![GlobalGroupDecl::new("admin", "Administrators")],
            entities: vec![
                EntityDecl::new("widget", vec![GrantDecl::new(GROUP_ALL, &["crud.read"])])
                    .persistent()
                    .property(PropertyDecl::new("name", TypeSpec::String))
                    .property(
                        PropertyDecl::new("secret", TypeSpec::String)
                            .permissions(vec![GrantDecl::new("admin", &["crud.read"])]),
                    ),
            ],
        }
    }

    fn endpoints() -> Vec<EndpointDecl> {
        vec![
            EndpointDecl::new("GET", "/widgets")
                .returns(
                    TypeSpec::list_of(TypeSpec::entity("widget")),
                    TraversalMode::Simple,
                )
                .query_parameter(ParameterDecl::new("limit", TypeSpec::Integer)),
            EndpointDecl::new("GET", "/describe")
                .returns(TypeSpec::entity("apiDescription"), TraversalMode::Simple),
        ]
    }

    fn assembled() -> (TypeRegistry, DescriberConfig, Uuid) {
        let mut registry = TypeRegistry::new();
        let config = DescriberConfig::default().with_api_name("Widget API");
        EntityModelBuilder::build(&mut registry, &domain_schema()).unwrap();
        let api_uuid = ApiAssembler::new(&config)
            .assemble(&mut registry, &endpoints())
            .unwrap();
        (registry, config, api_uuid)
    }

    #[test]
    fn closure_includes_meta_entities_when_describe_endpoint_is_declared() {
        let (registry, _, api_uuid) = assembled();
        let api = registry.resolve_api(&api_uuid).unwrap();
        let names: Vec<&str> = api
            .entity_uuids
            .iter()
            .map(|uuid| registry.resolve_entity(uuid).unwrap().type_name.as_str())
            .collect();
        assert!(names.contains(&"widget"));
        assert!(names.contains(&"apiDescription"));
        assert!(names.contains(&"entityDescription"));
        assert!(names.contains(&"baseHasUuid"));
        assert!(names.contains(&"typeDescription"));
        assert_eq!(api.endpoint_uuids.len(), 2);
    }

    #[test]
    fn describe_emits_a_closed_document() {
        let (registry, config, api_uuid) = assembled();
        let document = ApiAssembler::new(&config)
            .describe(&registry, api_uuid, &Principal::new("anyone"))
            .unwrap();

        assert_eq!(document.value, api_uuid);
        assert_eq!(document.category("apiDescription").len(), 1);
        assert!(!document.category("endpointDescription").is_empty());
        assert!(!document.category("property").is_empty());
        assert!(!document.category("type").is_empty());
        assert!(!document.category("securityGroup").is_empty());

        // No reference in the document may dangle: every `<name>Uuid` value
        // resolves inside the document itself.
        let emitted: HashSet<Uuid> = document.emitted_uuids().into_iter().collect();
        let mut referenced: Vec<Uuid> = Vec::new();
        for objects in document.data.values() {
            for object in objects {
                collect_refs(object, &mut referenced);
            }
        }
        for uuid in referenced {
            assert!(emitted.contains(&uuid), "dangling reference {}", uuid);
        }
    }

    fn collect_refs(value: &serde_json::Value, into: &mut Vec<Uuid>) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, entry) in map {
                    if key.ends_with("Uuid") && key != "uuid" {
                        collect_uuid_strings(entry, into);
                    }
                    collect_refs(entry, into);
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    collect_refs(item, into);
                }
            }
            _ => {}
        }
    }

    fn collect_uuid_strings(value: &serde_json::Value, into: &mut Vec<Uuid>) {
        match value {
            serde_json::Value::String(s) => {
                if let Ok(uuid) = Uuid::parse_str(s) {
                    into.push(uuid);
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    collect_uuid_strings(item, into);
                }
            }
            serde_json::Value::Object(map) => {
                for entry in map.values() {
                    collect_uuid_strings(entry, into);
                }
            }
            _ => {}
        }
    }

    #[test]
    fn group_limited_descriptions_drop_unreachable_properties() {
        let (registry, _, api_uuid) = assembled();

        // Limit to a group that exists but has no grant on 'secret'.
        let limited = DescriberConfig::default()
            .with_api_name("Widget API")
            .with_limit_groups(&["support"]);
        let document = ApiAssembler::new(&limited)
            .describe(&registry, api_uuid, &Principal::new("anyone"))
            .unwrap();

        let property_names: Vec<&str> = document
            .category("property")
            .iter()
            .filter_map(|p| p.get("name").and_then(serde_json::Value::as_str))
            .collect();
        assert!(property_names.contains(&"name"));
        assert!(
            !property_names.contains(&"secret"),
            "admin-only property must be filtered"
        );
    }
}
