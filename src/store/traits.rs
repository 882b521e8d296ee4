use crate::logic::security::Principal;
use crate::model::EntityValue;
use uuid::Uuid;

/// Supplies live instance values to the traversal engine and security
/// resolver. The core never issues queries of its own; whatever backs this
/// trait (the demo store, a database adapter, a projection of descriptors)
/// decides what an identifier resolves to.
pub trait InstanceSource: Send + Sync {
    fn get(&self, uuid: &Uuid) -> Option<EntityValue>;
}

/// A source with nothing in it, for traversals over self-contained values.
pub struct EmptySource;

impl InstanceSource for EmptySource {
    fn get(&self, _uuid: &Uuid) -> Option<EntityValue> {
        None
    }
}

/// Maps request principals onto the security machinery.
///
/// The default implementation enforces access checks for everyone; a
/// deployment can exempt principal classes (the usual example is an
/// application super-user role) by overriding `is_access_enforced`.
pub trait PrincipalMapper: Send + Sync {
    /// `false` means every access check passes for this principal.
    fn is_access_enforced(&self, _principal: &Principal) -> bool {
        true
    }
}

/// The default mapper: checks apply to every principal.
pub struct EnforceAll;

impl PrincipalMapper for EnforceAll {}
