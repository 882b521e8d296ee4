use crate::logic::registry::{TypeRegistry, UnknownIdentifier};
use crate::logic::security::{Principal, SecurityResolver, SecurityTarget};
use crate::model::{
    uuid_string, CrudOperation, Document, EntityDescriptor, EntityValue, FieldValue, JsonKind,
    PropertyDescriptor, SecurityAction, TraversalMode, Type,
};
use crate::store::traits::InstanceSource;
use log::trace;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use uuid::Uuid;

/// Fatal traversal-time failures. These indicate an inconsistency between
/// the frozen graph and the instance data; no partial document is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraversalError {
    #[error("broken graph: {0}")]
    BrokenGraph(#[from] UnknownIdentifier),

    #[error("broken graph: instance {0} is unresolvable")]
    UnresolvableInstance(Uuid),

    #[error("broken graph: embedded property '{property}' on {instance} does not reference a resolvable entity")]
    UnresolvableEmbedded { property: String, instance: Uuid },
}

/// Lifecycle of a node within one traversal invocation. Nodes absent from
/// the state table are pending; a node found in any later state when dequeued
/// has already been handled and is cycle-skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Visiting,
    Emitting,
    Done,
}

/// Walks an entity graph, emitting each reachable node at most once under
/// the governing traversal mode, with every property filtered through the
/// security resolver.
///
/// The engine only reads shared frozen state; all mutable bookkeeping lives
/// in a per-invocation [`Walk`], so concurrent serializations need no
/// locking.
pub struct TraversalEngine<'a> {
    registry: &'a TypeRegistry,
    resolver: SecurityResolver<'a>,
    source: &'a dyn InstanceSource,
}

/// Per-invocation state: the requesting principal, discovery queue, node
/// states and the output document under construction. Allocated fresh per
/// serialization and discarded at its end.
struct Walk<'p> {
    mode: TraversalMode,
    principal: &'p Principal,
    read: SecurityAction,
    states: HashMap<Uuid, NodeState>,
    queue: VecDeque<(Uuid, usize)>,
    document: Document,
}

impl Walk<'_> {
    /// Queue a discovered reference if the mode expands references found at
    /// `depth` and the node has not been seen before.
    fn discover(&mut self, uuid: Uuid, depth: usize) {
        let expand = match self.mode {
            TraversalMode::Deep => true,
            TraversalMode::Simple => depth == 0,
            TraversalMode::Sparse => false,
        };
        if expand && !self.states.contains_key(&uuid) {
            self.states.insert(uuid, NodeState::Pending);
            self.queue.push_back((uuid, depth + 1));
        }
    }
}

impl<'a> TraversalEngine<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        resolver: SecurityResolver<'a>,
        source: &'a dyn InstanceSource,
    ) -> Self {
        Self {
            registry,
            resolver,
            source,
        }
    }

    /// Serialize the graph reachable from `root` into a wire document.
    pub fn serialize(
        &self,
        root: Uuid,
        mode: TraversalMode,
        principal: &Principal,
    ) -> Result<Document, TraversalError> {
        let mut walk = Walk {
            mode,
            principal,
            read: CrudOperation::Read.as_action(),
            states: HashMap::new(),
            queue: VecDeque::new(),
            document: Document::new(root),
        };
        walk.states.insert(root, NodeState::Pending);
        walk.queue.push_back((root, 0));

        while let Some((uuid, depth)) = walk.queue.pop_front() {
            match walk.states.get(&uuid) {
                None | Some(NodeState::Pending) => {}
                // Reached through more than one path; already fully emitted.
                _ => {
                    trace!("cycle-skipped {}", uuid);
                    continue;
                }
            }
            walk.states.insert(uuid, NodeState::Visiting);

            let value = self
                .source
                .get(&uuid)
                .ok_or(TraversalError::UnresolvableInstance(uuid))?;
            let entity = self.registry.resolve_entity(&value.entity_uuid)?;

            walk.states.insert(uuid, NodeState::Emitting);
            let object = self.emit_object(&value, entity, depth, &mut walk)?;
            let type_name = entity.type_name.clone();
            walk.document.push(&type_name, Value::Object(object));
            walk.states.insert(uuid, NodeState::Done);
        }

        Ok(walk.document)
    }

    fn emit_object(
        &self,
        value: &EntityValue,
        entity: &EntityDescriptor,
        depth: usize,
        walk: &mut Walk<'_>,
    ) -> Result<Map<String, Value>, TraversalError> {
        let mut object = Map::new();
        object.insert("uuid".to_string(), Value::String(uuid_string(&value.uuid)));
        for property in self.property_chain(entity)? {
            self.emit_property(property, value, depth, &mut object, walk)?;
        }
        Ok(object)
    }

    /// The full property set of an entity: supertype properties first (in
    /// their declared order), then the entity's own. A subtype mirroring an
    /// inherited name replaces the supertype's descriptor in place.
    fn property_chain(
        &self,
        entity: &EntityDescriptor,
    ) -> Result<Vec<&PropertyDescriptor>, TraversalError> {
        let mut lineage = vec![entity];
        let mut current = entity;
        while let Some(supertype_uuid) = &current.supertype_uuid {
            current = self.registry.resolve_entity(supertype_uuid)?;
            lineage.push(current);
        }
        lineage.reverse();

        let mut chain: Vec<&PropertyDescriptor> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for ancestor in lineage {
            for property_uuid in &ancestor.property_uuids {
                let property = self.registry.resolve_property(property_uuid)?;
                match positions.get(property.name.as_str()) {
                    Some(&index) => chain[index] = property,
                    None => {
                        positions.insert(property.name.as_str(), chain.len());
                        chain.push(property);
                    }
                }
            }
        }
        Ok(chain)
    }

    fn emit_property(
        &self,
        property: &PropertyDescriptor,
        value: &EntityValue,
        depth: usize,
        object: &mut Map<String, Value>,
        walk: &mut Walk<'_>,
    ) -> Result<(), TraversalError> {
        if property.deep_traversal_only && walk.mode != TraversalMode::Deep {
            return Ok(());
        }
        // A denied read is an omission, not an error.
        if !self.resolver.may(
            walk.principal,
            SecurityTarget::Property(property),
            &walk.read,
            Some(value),
            self.source,
        ) {
            trace!(
                "omitting '{}' on {}: read denied",
                property.name,
                value.uuid
            );
            return Ok(());
        }
        let Some(field) = value.field(&property.name) else {
            return Ok(());
        };

        let ty = self.registry.resolve_type(&property.type_uuid)?;
        if property.suppress_default_value && field.is_default_for(ty.json_kind) {
            return Ok(());
        }

        if property.embedded {
            return self.emit_embedded(property, field, value, depth, object, walk);
        }

        let rendered = self.render(field, Some(ty), depth, walk)?;
        let key = if self.reference_bearing(ty)? {
            format!("{}Uuid", property.name)
        } else {
            property.name.clone()
        };
        object.insert(key, rendered);
        Ok(())
    }

    /// Splice an embedded entity's own (security-filtered) properties into
    /// the enclosing object instead of nesting it. The embedded value never
    /// enters the data table.
    fn emit_embedded(
        &self,
        property: &PropertyDescriptor,
        field: &FieldValue,
        value: &EntityValue,
        depth: usize,
        object: &mut Map<String, Value>,
        walk: &mut Walk<'_>,
    ) -> Result<(), TraversalError> {
        let FieldValue::Reference(target_uuid) = field else {
            return Err(TraversalError::UnresolvableEmbedded {
                property: property.name.clone(),
                instance: value.uuid,
            });
        };
        let target = self
            .source
            .get(target_uuid)
            .ok_or(TraversalError::UnresolvableEmbedded {
                property: property.name.clone(),
                instance: value.uuid,
            })?;
        let target_entity = self.registry.resolve_entity(&target.entity_uuid)?;
        for sub_property in self.property_chain(target_entity)? {
            self.emit_property(sub_property, &target, depth, object, walk)?;
        }
        Ok(())
    }

    /// Render a field into wire JSON, recording discovered entity references
    /// with the walk so the mode can decide whether to expand them.
    fn render(
        &self,
        field: &FieldValue,
        ty: Option<&Type>,
        depth: usize,
        walk: &mut Walk<'_>,
    ) -> Result<Value, TraversalError> {
        match field {
            FieldValue::Scalar(value) => Ok(value.clone()),
            FieldValue::Reference(uuid) => {
                walk.discover(*uuid, depth);
                Ok(Value::String(uuid_string(uuid)))
            }
            FieldValue::List(items) => {
                let element_ty = match ty {
                    Some(ty) if ty.json_kind == JsonKind::List => ty
                        .list_element_uuid
                        .as_ref()
                        .map(|uuid| self.registry.resolve_type(uuid))
                        .transpose()?,
                    _ => None,
                };
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(self.render(item, element_ty, depth, walk)?);
                }
                Ok(Value::Array(rendered))
            }
            FieldValue::Map(entries) => {
                let (key_ty, value_ty) = match ty {
                    Some(ty) if ty.json_kind == JsonKind::Map => {
                        let key = ty
                            .map_key_uuid
                            .as_ref()
                            .map(|uuid| self.registry.resolve_type(uuid))
                            .transpose()?;
                        let value = ty
                            .map_value_uuid
                            .as_ref()
                            .map(|uuid| self.registry.resolve_type(uuid))
                            .transpose()?;
                        (key, value)
                    }
                    _ => (None, None),
                };
                let keys_reference_entities =
                    key_ty.map(Type::is_entity_reference).unwrap_or(false);

                let mut rendered = Map::new();
                for (key, entry) in entries {
                    // Entity-keyed maps use identifier strings as keys; the
                    // targets are still part of the reachable graph.
                    if keys_reference_entities {
                        if let Ok(key_uuid) = Uuid::parse_str(key) {
                            walk.discover(key_uuid, depth);
                        }
                    }
                    rendered.insert(key.clone(), self.render(entry, value_ty, depth, walk)?);
                }
                Ok(Value::Object(rendered))
            }
        }
    }

    /// True when values of this type carry entity references, which decides
    /// whether the property emits under `<name>Uuid`.
    fn reference_bearing(&self, ty: &Type) -> Result<bool, TraversalError> {
        if ty.is_entity_reference() {
            return Ok(true);
        }
        match ty.json_kind {
            JsonKind::List => match &ty.list_element_uuid {
                Some(uuid) => self.reference_bearing(self.registry.resolve_type(uuid)?),
                None => Ok(false),
            },
            JsonKind::Map => {
                for uuid in [&ty.map_key_uuid, &ty.map_value_uuid].into_iter().flatten() {
                    if self.reference_bearing(self.registry.resolve_type(uuid)?)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::builder::EntityModelBuilder;
    use crate::model::{
        EntityDecl, GrantDecl, PropertyDecl, SchemaDecl, TypeSpec, GROUP_ALL, GROUP_NOBODY,
    };
    use crate::store::memory::MemoryStore;

    fn permit_all() -> Vec<GrantDecl> {
        vec![GrantDecl::new(GROUP_ALL, &["*.*"])]
    }

    fn schema() -> SchemaDecl {
        SchemaDecl {
            global_groups: Vec::new(),
            entities: vec![
                EntityDecl::new("dimensions", permit_all())
                    .property(PropertyDecl::new("width", TypeSpec::Double))
                    .property(PropertyDecl::new("height", TypeSpec::Double)),
                EntityDecl::new("category", permit_all())
                    .property(PropertyDecl::new("label", TypeSpec::String))
                    .property(
                        PropertyDecl::new("related", TypeSpec::list_of(TypeSpec::entity("category"))),
                    ),
                EntityDecl::new("product", permit_all())
                    .property(PropertyDecl::new("name", TypeSpec::String))
                    .property(
                        PropertyDecl::new("price", TypeSpec::Double).suppress_default_value(),
                    )
                    .property(
                        PropertyDecl::new("audit", TypeSpec::String).deep_traversal_only(),
                    )
                    .property(
                        PropertyDecl::new("hidden", TypeSpec::String)
                            .permissions(vec![GrantDecl::new(GROUP_NOBODY, &["*.*"])]),
                    )
                    .property(PropertyDecl::new("size", TypeSpec::entity("dimensions")).embedded())
                    .property(PropertyDecl::new("category", TypeSpec::entity("category"))),
            ],
        }
    }

    struct Fixture {
        registry: TypeRegistry,
        store: MemoryStore,
        product_uuid: Uuid,
        category_uuid: Uuid,
    }

    fn fixture() -> Fixture {
        let mut registry = TypeRegistry::new();
        EntityModelBuilder::build(&mut registry, &schema()).unwrap();
        let store = MemoryStore::new();

        let dimensions_entity = registry.entity_by_name("dimensions").unwrap().uuid;
        let category_entity = registry.entity_by_name("category").unwrap().uuid;
        let product_entity = registry.entity_by_name("product").unwrap().uuid;

        let size = EntityValue::new(dimensions_entity)
            .set("width", FieldValue::double(2.0))
            .set("height", FieldValue::double(1.5));
        let size_uuid = size.uuid;

        // Two categories referencing each other: a cycle.
        let hardware = EntityValue::new(category_entity);
        let tools = EntityValue::new(category_entity);
        let hardware_uuid = hardware.uuid;
        let tools_uuid = tools.uuid;
        let hardware = hardware
            .set("label", FieldValue::string("hardware"))
            .set("related", FieldValue::references(&[tools_uuid]));
        let tools = tools
            .set("label", FieldValue::string("tools"))
            .set("related", FieldValue::references(&[hardware_uuid]));

        let product = EntityValue::new(product_entity)
            .set("name", FieldValue::string("hammer"))
            .set("price", FieldValue::double(12.5))
            .set("audit", FieldValue::string("created by import"))
            .set("hidden", FieldValue::string("classified"))
            .set("size", FieldValue::Reference(size_uuid))
            .set("category", FieldValue::Reference(hardware_uuid));
        let product_uuid = product.uuid;

        store.extend([size, hardware, tools, product]);
        Fixture {
            registry,
            store,
            product_uuid,
            category_uuid: hardware_uuid,
        }
    }

    fn engine<'a>(fixture: &'a Fixture) -> TraversalEngine<'a> {
        TraversalEngine::new(
            &fixture.registry,
            SecurityResolver::new(&fixture.registry),
            &fixture.store,
        )
    }

    fn serialize(fixture: &Fixture, mode: TraversalMode) -> Document {
        engine(fixture)
            .serialize(fixture.product_uuid, mode, &Principal::new("visitor"))
            .unwrap()
    }

    #[test]
    fn simple_mode_expands_one_level_and_skips_deep_properties() {
        let fixture = fixture();
        let doc = serialize(&fixture, TraversalMode::Simple);

        let product = &doc.category("product")[0];
        assert_eq!(product["name"], "hammer");
        assert!(product.get("audit").is_none());
        // Embedded entity properties are spliced into the product object.
        assert_eq!(product["width"], 2.0);
        assert_eq!(product["height"], 1.5);
        assert!(product.get("size").is_none());
        // Entity references are identifier strings under a Uuid key.
        assert_eq!(
            product["categoryUuid"],
            uuid_string(&fixture.category_uuid)
        );

        // One level expanded: the referenced category is present, but the
        // category it references in turn is only an identifier.
        assert_eq!(doc.category("category").len(), 1);
        // The embedded dimensions entity never enters the data table.
        assert!(doc.category("dimensions").is_empty());
    }

    #[test]
    fn sparse_mode_emits_only_the_root() {
        let fixture = fixture();
        let doc = serialize(&fixture, TraversalMode::Sparse);
        assert_eq!(doc.category("product").len(), 1);
        assert!(doc.category("category").is_empty());
        let product = &doc.category("product")[0];
        assert_eq!(
            product["categoryUuid"],
            uuid_string(&fixture.category_uuid)
        );
    }

    #[test]
    fn deep_mode_is_a_superset_of_simple_and_terminates_on_cycles() {
        let fixture = fixture();
        let simple = serialize(&fixture, TraversalMode::Simple);
        let deep = serialize(&fixture, TraversalMode::Deep);

        // Both categories appear exactly once despite the reference cycle.
        assert_eq!(deep.category("category").len(), 2);

        let simple_product = simple.category("product")[0].as_object().unwrap();
        let deep_product = deep.category("product")[0].as_object().unwrap();
        for key in simple_product.keys() {
            assert!(deep_product.contains_key(key), "missing {} in DEEP", key);
        }
        // Deep-traversal-only properties appear only in DEEP.
        assert!(deep_product.contains_key("audit"));
        assert!(!simple_product.contains_key("audit"));
    }

    #[test]
    fn denied_properties_are_omitted_silently() {
        let fixture = fixture();
        let doc = serialize(&fixture, TraversalMode::Deep);
        let product = doc.category("product")[0].as_object().unwrap();
        assert!(!product.contains_key("hidden"));
    }

    #[test]
    fn default_values_are_suppressed_when_flagged() {
        let fixture = fixture();
        let mut zero_priced = fixture.store.get(&fixture.product_uuid).unwrap();
        zero_priced
            .fields
            .insert("price".to_string(), FieldValue::double(0.0));
        fixture.store.insert(zero_priced);

        let doc = serialize(&fixture, TraversalMode::Simple);
        let product = doc.category("product")[0].as_object().unwrap();
        assert!(!product.contains_key("price"));

        let mut priced = fixture.store.get(&fixture.product_uuid).unwrap();
        priced
            .fields
            .insert("price".to_string(), FieldValue::double(9.75));
        fixture.store.insert(priced);
        let doc = serialize(&fixture, TraversalMode::Simple);
        assert_eq!(doc.category("product")[0]["price"], 9.75);
    }

    #[test]
    fn properties_emit_in_declared_order() {
        let fixture = fixture();
        let doc = serialize(&fixture, TraversalMode::Deep);
        let product = doc.category("product")[0].as_object().unwrap();
        let keys: Vec<&String> = product.keys().collect();
        // uuid first, then declared order with the embedded splice in the
        // size property's position.
        assert_eq!(
            keys,
            [
                "uuid",
                "name",
                "price",
                "audit",
                "width",
                "height",
                "categoryUuid"
            ]
        );
    }

    #[test]
    fn unresolvable_roots_are_broken_graph_errors() {
        let fixture = fixture();
        let missing = Uuid::new_v4();
        let err = engine(&fixture)
            .serialize(missing, TraversalMode::Simple, &Principal::new("visitor"))
            .unwrap_err();
        assert_eq!(err, TraversalError::UnresolvableInstance(missing));
    }
}
