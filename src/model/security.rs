use crate::logic::digest::IdentityDigest;
use crate::model::{GROUP_ALL, GROUP_NOBODY, GROUP_REFLEXIVE};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named class of principals.
///
/// Global groups are resolvable from the principal's role set alone
/// (e.g. `admin`). Non-global groups are defined by property paths evaluated
/// against the instance being accessed, which makes membership
/// instance-dependent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    pub uuid: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub global_security_group: bool,
    /// Property paths that define a non-global group; empty for global ones.
    pub path_uuids: Vec<Uuid>,
}

impl SecurityGroup {
    pub fn new(
        name: &str,
        description: Option<&str>,
        global_security_group: bool,
        path_uuids: Vec<Uuid>,
    ) -> Self {
        let uuid = IdentityDigest::new("securityGroup")
            .str(name)
            .flag(global_security_group)
            .uuids(&path_uuids)
            .finish();
        Self {
            uuid,
            name: name.to_string(),
            description: description.map(str::to_string),
            global_security_group,
            path_uuids,
        }
    }

    /// The group containing every principal.
    pub fn all() -> Self {
        Self::new(GROUP_ALL, Some("All principals"), true, Vec::new())
    }

    /// The group containing no principals.
    pub fn nobody() -> Self {
        Self::new(GROUP_NOBODY, Some("No principals"), true, Vec::new())
    }

    /// The reflexive group: the principal that the accessed instance itself
    /// represents.
    pub fn reflexive() -> Self {
        Self::new(
            GROUP_REFLEXIVE,
            Some("The principal that represents the entity"),
            true,
            Vec::new(),
        )
    }
}

/// A single permission unit: a `(type, action)` pair where either half may be
/// the wildcard `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAction {
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub action_type: String,
    pub action: String,
}

impl SecurityAction {
    pub fn of(action_type: &str, action: &str) -> Self {
        let action_type = action_type.to_string();
        let action = action.to_lowercase();
        let uuid = IdentityDigest::new("securityAction")
            .str(&format!("{}::{}", action_type, action))
            .finish();
        Self {
            uuid,
            action_type,
            action,
        }
    }

    /// Grants every action of every type.
    pub fn all() -> Self {
        Self::of("*", "*")
    }

    pub fn is_action_wildcard(&self) -> bool {
        self.action == "*"
    }

    pub fn is_verb_wildcard(&self) -> bool {
        self.action_type == "*"
    }

    /// Returns `true` if a principal who possesses this action would also be
    /// allowed to perform `desired`.
    pub fn permits(&self, desired: &SecurityAction) -> bool {
        if self == desired {
            return true;
        }
        // Allow-all action
        if self.action_type == "*" {
            return true;
        }
        // Allow all actions of a specific type
        if self.action_type == desired.action_type && self.action == "*" {
            return true;
        }
        false
    }
}

/// Standard CRUD verbs in the `crud` action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudOperation {
    Create,
    Read,
    Update,
    Delete,
}

impl CrudOperation {
    pub fn as_action(&self) -> SecurityAction {
        let verb = match self {
            CrudOperation::Create => "create",
            CrudOperation::Read => "read",
            CrudOperation::Update => "update",
            CrudOperation::Delete => "delete",
        };
        SecurityAction::of("crud", verb)
    }
}

/// One entry in a [`GroupPermissions`] set: the actions granted to a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupGrant {
    pub security_group_uuid: Uuid,
    pub security_action_uuids: Vec<Uuid>,
}

/// Associates security groups with their permitted actions.
///
/// Grants are kept sorted by group name at build time so the permission set's
/// identity is insensitive to declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPermissions {
    pub uuid: Uuid,
    pub operations: Vec<GroupGrant>,
}

impl GroupPermissions {
    /// `operations` must already be sorted by group name; the builder owns
    /// that ordering because the names live in the registry.
    pub fn new(operations: Vec<GroupGrant>) -> Self {
        let mut digest = IdentityDigest::new("groupPermissions");
        for grant in &operations {
            digest = digest
                .uuid(&grant.security_group_uuid)
                .uuids(&grant.security_action_uuids);
        }
        Self {
            uuid: digest.finish(),
            operations,
        }
    }

    /// A set granting nothing to anyone.
    pub fn deny_all() -> Self {
        Self::new(Vec::new())
    }

    pub fn grant_for(&self, group_uuid: &Uuid) -> Option<&GroupGrant> {
        self.operations
            .iter()
            .find(|grant| &grant.security_group_uuid == group_uuid)
    }
}

/// An ordered chain of property accesses (`a.b.c`), used for implied-property
/// bookkeeping and for resolving non-global security groups against an
/// instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPath {
    pub uuid: Uuid,
    pub property_uuids: Vec<Uuid>,
}

impl PropertyPath {
    pub fn new(property_uuids: Vec<Uuid>) -> Self {
        let uuid = IdentityDigest::new("propertyPath")
            .uuids(&property_uuids)
            .finish();
        Self {
            uuid,
            property_uuids,
        }
    }
}
