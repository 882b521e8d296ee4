use crate::logic::registry::TypeRegistry;
use crate::model::{
    EntityDescriptor, EntityValue, FieldValue, PropertyDescriptor, PropertyPath, SecurityAction,
    SecurityGroup, GROUP_ALL, GROUP_NOBODY, GROUP_REFLEXIVE,
};
use crate::store::traits::{InstanceSource, PrincipalMapper};
use log::{trace, warn};
use uuid::Uuid;

/// The authenticated actor a traversal runs on behalf of.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub name: String,
    /// Global security groups this principal belongs to, a static property
    /// of its role (e.g. `admin`).
    pub global_groups: Vec<String>,
    /// The entity value representing this principal, when principals are
    /// modeled as entities. Required for reflexive and path-derived group
    /// membership.
    pub entity_uuid: Option<Uuid>,
}

impl Principal {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            global_groups: Vec::new(),
            entity_uuid: None,
        }
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.global_groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn with_entity(mut self, uuid: Uuid) -> Self {
        self.entity_uuid = Some(uuid);
        self
    }
}

/// What an access check is aimed at.
#[derive(Debug, Clone, Copy)]
pub enum SecurityTarget<'a> {
    Entity(&'a EntityDescriptor),
    Property(&'a PropertyDescriptor),
}

static ENFORCE_ALL: crate::store::traits::EnforceAll = crate::store::traits::EnforceAll;

/// Decides, per property or entity, whether a principal may perform an
/// action.
///
/// Deny-by-default: the absence of a permitting rule is a denial. Reads only
/// the frozen descriptor graph plus request-scoped principal data, so any
/// number of resolutions may run concurrently.
pub struct SecurityResolver<'a> {
    registry: &'a TypeRegistry,
    mapper: &'a dyn PrincipalMapper,
}

impl<'a> SecurityResolver<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            mapper: &ENFORCE_ALL,
        }
    }

    pub fn with_mapper(registry: &'a TypeRegistry, mapper: &'a dyn PrincipalMapper) -> Self {
        Self { registry, mapper }
    }

    /// Whether `principal` may perform `action` on `target`. `instance` is
    /// the value currently being serialized; instance-dependent groups can
    /// only match when it is present.
    pub fn may(
        &self,
        principal: &Principal,
        target: SecurityTarget<'_>,
        action: &SecurityAction,
        instance: Option<&EntityValue>,
        source: &dyn InstanceSource,
    ) -> bool {
        if !self.mapper.is_access_enforced(principal) {
            return true;
        }

        let Some(permissions_uuid) = self.effective_permissions(target) else {
            // No permission set anywhere on the chain: deny.
            return false;
        };
        let Ok(permissions) = self.registry.resolve_permissions(&permissions_uuid) else {
            warn!("permission set {} missing from registry", permissions_uuid);
            return false;
        };

        for grant in &permissions.operations {
            let allows_action = grant.security_action_uuids.iter().any(|uuid| {
                self.registry
                    .resolve_action(uuid)
                    .map(|granted| granted.permits(action))
                    .unwrap_or(false)
            });
            if !allows_action {
                continue;
            }
            let Ok(group) = self.registry.resolve_group(&grant.security_group_uuid) else {
                warn!(
                    "security group {} missing from registry",
                    grant.security_group_uuid
                );
                continue;
            };
            if self.is_member(principal, group, instance, source) {
                return true;
            }
        }
        false
    }

    /// The permission set governing a target: a property's own, or its
    /// enclosing entity's when the property declares none.
    fn effective_permissions(&self, target: SecurityTarget<'_>) -> Option<Uuid> {
        match target {
            SecurityTarget::Entity(entity) => Some(entity.group_permissions_uuid),
            SecurityTarget::Property(property) => property.group_permissions_uuid.or_else(|| {
                self.registry
                    .entity_by_name(&property.enclosing_type_name)
                    .map(|entity| entity.group_permissions_uuid)
            }),
        }
    }

    fn is_member(
        &self,
        principal: &Principal,
        group: &SecurityGroup,
        instance: Option<&EntityValue>,
        source: &dyn InstanceSource,
    ) -> bool {
        match group.name.as_str() {
            GROUP_ALL => true,
            GROUP_NOBODY => false,
            GROUP_REFLEXIVE => match (instance, principal.entity_uuid) {
                (Some(instance), Some(principal_uuid)) => instance.uuid == principal_uuid,
                _ => false,
            },
            name if group.global_security_group => {
                principal.global_groups.iter().any(|role| role == name)
            }
            _ => {
                // Path-derived membership is instance-dependent.
                let (Some(instance), Some(principal_uuid)) = (instance, principal.entity_uuid)
                else {
                    return false;
                };
                group.path_uuids.iter().any(|path_uuid| {
                    match self.registry.resolve_path(path_uuid) {
                        Ok(path) => self.path_matches(principal_uuid, instance, path, source),
                        Err(_) => {
                            warn!("property path {} missing from registry", path_uuid);
                            false
                        }
                    }
                })
            }
        }
    }

    /// Walk a property path from `instance` and check whether it reaches the
    /// principal's entity. A path that cannot be evaluated (missing field,
    /// unresolvable reference) simply does not match; it is never fatal.
    fn path_matches(
        &self,
        principal_uuid: Uuid,
        instance: &EntityValue,
        path: &PropertyPath,
        source: &dyn InstanceSource,
    ) -> bool {
        let mut currents = vec![instance.clone()];
        for (index, property_uuid) in path.property_uuids.iter().enumerate() {
            let Ok(property) = self.registry.resolve_property(property_uuid) else {
                warn!("path property {} missing from registry", property_uuid);
                return false;
            };
            let terminal = index + 1 == path.property_uuids.len();

            let mut referenced = Vec::new();
            for value in &currents {
                if let Some(field) = value.field(&property.name) {
                    collect_references(field, &mut referenced);
                }
            }
            if referenced.is_empty() {
                trace!(
                    "path segment '{}' unresolvable on {}; group not matched",
                    property.name,
                    instance.uuid
                );
                return false;
            }
            if terminal {
                return referenced.contains(&principal_uuid);
            }
            currents = referenced
                .iter()
                .filter_map(|uuid| source.get(uuid))
                .collect();
            if currents.is_empty() {
                return false;
            }
        }
        false
    }
}

fn collect_references(field: &FieldValue, into: &mut Vec<Uuid>) {
    match field {
        FieldValue::Reference(uuid) => into.push(*uuid),
        FieldValue::List(items) => {
            for item in items {
                collect_references(item, into);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::builder::EntityModelBuilder;
    use crate::model::{
        CrudOperation, EntityDecl, GlobalGroupDecl, GrantDecl, PropertyDecl, SchemaDecl,
        SecurityGroupDecl, TypeSpec,
    };
    use crate::store::memory::MemoryStore;
    use crate::store::traits::EmptySource;

    fn schema() -> SchemaDecl {
        SchemaDecl {
            global_groups: vec![GlobalGroupDecl::new("admin", "Administrators")],
            entities: vec![
                EntityDecl::new("merchant", vec![GrantDecl::new(GROUP_ALL, &["*.*"])])
                    .property(PropertyDecl::new("name", TypeSpec::String)),
                EntityDecl::new("product", vec![GrantDecl::new(GROUP_ALL, &["crud.read"])])
                    .group(SecurityGroupDecl {
                        name: "productOwner".to_string(),
                        description: None,
                        paths: vec![vec!["owner".to_string()]],
                    })
                    .property(PropertyDecl::new("name", TypeSpec::String))
                    .property(
                        PropertyDecl::new("price", TypeSpec::Double).permissions(vec![
                            GrantDecl::new(GROUP_ALL, &["crud.read"]),
                            GrantDecl::new("admin", &["crud.*"]),
                        ]),
                    )
                    .property(
                        PropertyDecl::new("costBasis", TypeSpec::Double)
                            .permissions(vec![GrantDecl::new(GROUP_NOBODY, &["*.*"])]),
                    )
                    .property(
                        PropertyDecl::new("secretMargin", TypeSpec::Double)
                            .permissions(vec![GrantDecl::new("productOwner", &["crud.read"])]),
                    )
                    .property(PropertyDecl::new("owner", TypeSpec::entity("merchant"))),
            ],
        }
    }

    fn built_registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        EntityModelBuilder::build(&mut registry, &schema()).unwrap();
        registry
    }

    fn property<'r>(registry: &'r TypeRegistry, entity: &str, name: &str) -> &'r PropertyDescriptor {
        registry
            .resolve_property(&PropertyDescriptor::identify(entity, name))
            .unwrap()
    }

    #[test]
    fn read_falls_back_to_entity_permissions() {
        let registry = built_registry();
        let resolver = SecurityResolver::new(&registry);
        let anyone = Principal::new("visitor");
        let read = CrudOperation::Read.as_action();
        let update = CrudOperation::Update.as_action();

        let name = property(&registry, "product", "name");
        assert!(resolver.may(&anyone, SecurityTarget::Property(name), &read, None, &EmptySource));
        // The entity grant is read-only, so writes are denied by default.
        assert!(!resolver.may(&anyone, SecurityTarget::Property(name), &update, None, &EmptySource));
    }

    #[test]
    fn wildcard_grants_widen_but_never_narrow() {
        let registry = built_registry();
        let resolver = SecurityResolver::new(&registry);
        let read = CrudOperation::Read.as_action();
        let update = CrudOperation::Update.as_action();
        let price = property(&registry, "product", "price");

        let visitor = Principal::new("visitor");
        let admin = Principal::new("root").with_groups(&["admin"]);

        assert!(resolver.may(&visitor, SecurityTarget::Property(price), &read, None, &EmptySource));
        assert!(!resolver.may(&visitor, SecurityTarget::Property(price), &update, None, &EmptySource));
        // Granting membership in a matching group can only flip deny to
        // permit, never the reverse.
        assert!(resolver.may(&admin, SecurityTarget::Property(price), &read, None, &EmptySource));
        assert!(resolver.may(&admin, SecurityTarget::Property(price), &update, None, &EmptySource));
    }

    #[test]
    fn nobody_only_permission_sets_always_deny() {
        let registry = built_registry();
        let resolver = SecurityResolver::new(&registry);
        let read = CrudOperation::Read.as_action();
        let cost = property(&registry, "product", "costBasis");

        for principal in [
            Principal::new("visitor"),
            Principal::new("root").with_groups(&["admin"]),
        ] {
            assert!(!resolver.may(
                &principal,
                SecurityTarget::Property(cost),
                &read,
                None,
                &EmptySource
            ));
        }
    }

    #[test]
    fn path_derived_membership_is_instance_dependent() {
        let registry = built_registry();
        let resolver = SecurityResolver::new(&registry);
        let read = CrudOperation::Read.as_action();
        let margin = property(&registry, "product", "secretMargin");

        let merchant_entity = registry.entity_by_name("merchant").unwrap();
        let product_entity = registry.entity_by_name("product").unwrap();

        let store = MemoryStore::new();
        let merchant = EntityValue::new(merchant_entity.uuid);
        let merchant_uuid = merchant.uuid;
        store.insert(merchant);

        let owned = EntityValue::new(product_entity.uuid)
            .set("owner", FieldValue::Reference(merchant_uuid));
        let unowned = EntityValue::new(product_entity.uuid);

        let owner = Principal::new("shopkeeper").with_entity(merchant_uuid);
        assert!(resolver.may(
            &owner,
            SecurityTarget::Property(margin),
            &read,
            Some(&owned),
            &store
        ));
        // Same principal, different instance: the owner path does not reach
        // the principal, so the group is not matched. Not an error.
        assert!(!resolver.may(
            &owner,
            SecurityTarget::Property(margin),
            &read,
            Some(&unowned),
            &store
        ));
        // A principal with no entity representation can never match.
        let visitor = Principal::new("visitor");
        assert!(!resolver.may(
            &visitor,
            SecurityTarget::Property(margin),
            &read,
            Some(&owned),
            &store
        ));
    }

    #[test]
    fn mapper_can_exempt_principals_from_enforcement() {
        struct ExemptAdmins;
        impl PrincipalMapper for ExemptAdmins {
            fn is_access_enforced(&self, principal: &Principal) -> bool {
                !principal.global_groups.iter().any(|g| g == "admin")
            }
        }

        let registry = built_registry();
        let resolver = SecurityResolver::with_mapper(&registry, &ExemptAdmins);
        let read = CrudOperation::Read.as_action();
        let cost = property(&registry, "product", "costBasis");

        let admin = Principal::new("root").with_groups(&["admin"]);
        let visitor = Principal::new("visitor");
        // Even a NOBODY-only set passes when enforcement is off for the
        // principal.
        assert!(resolver.may(&admin, SecurityTarget::Property(cost), &read, None, &EmptySource));
        assert!(!resolver.may(&visitor, SecurityTarget::Property(cost), &read, None, &EmptySource));
    }

    #[test]
    fn reflexive_group_matches_the_instance_itself() {
        let mut registry = TypeRegistry::new();
        let schema = SchemaDecl {
            global_groups: Vec::new(),
            entities: vec![EntityDecl::new(
                "account",
                vec![GrantDecl::new(GROUP_REFLEXIVE, &["crud.*"])],
            )
            .property(PropertyDecl::new("name", TypeSpec::String))],
        };
        EntityModelBuilder::build(&mut registry, &schema).unwrap();
        let resolver = SecurityResolver::new(&registry);
        let read = CrudOperation::Read.as_action();

        let account_entity = registry.entity_by_name("account").unwrap();
        let account = EntityValue::new(account_entity.uuid);
        let name = property(&registry, "account", "name");

        let owner = Principal::new("self").with_entity(account.uuid);
        let other = Principal::new("other").with_entity(Uuid::new_v4());
        assert!(resolver.may(
            &owner,
            SecurityTarget::Property(name),
            &read,
            Some(&account),
            &EmptySource
        ));
        assert!(!resolver.may(
            &other,
            SecurityTarget::Property(name),
            &read,
            Some(&account),
            &EmptySource
        ));
    }
}
