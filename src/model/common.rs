use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The JSON shape kinds a [`Type`](crate::model::Type) can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JsonKind {
    Any,
    Boolean,
    Double,
    Integer,
    List,
    Map,
    Null,
    String,
}

impl JsonKind {
    /// The wire name of the kind, as it appears in `jsonKind` fields.
    pub fn wire_name(&self) -> &'static str {
        match self {
            JsonKind::Any => "ANY",
            JsonKind::Boolean => "BOOLEAN",
            JsonKind::Double => "DOUBLE",
            JsonKind::Integer => "INTEGER",
            JsonKind::List => "LIST",
            JsonKind::Map => "MAP",
            JsonKind::Null => "NULL",
            JsonKind::String => "STRING",
        }
    }
}

/// Controls how deep the traversal engine walks an entity graph and how
/// referenced entities are represented in the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraversalMode {
    /// Emit regular properties only; entities referenced from the root are
    /// expanded once, anything further is a bare identifier reference.
    Simple,
    /// Emit the root only; every referenced entity is a bare identifier
    /// reference the consumer resolves against a side table.
    Sparse,
    /// Emit every property (including deep-traversal-only ones) and expand
    /// every reachable entity exactly once.
    Deep,
}

impl TraversalMode {
    pub fn wire_name(&self) -> &'static str {
        match self {
            TraversalMode::Simple => "SIMPLE",
            TraversalMode::Sparse => "SPARSE",
            TraversalMode::Deep => "DEEP",
        }
    }
}

/// Name of the well-known group containing every principal.
pub const GROUP_ALL: &str = "*";

/// Name of the well-known group containing no principals. A permission set
/// granting only to this group denies every request.
pub const GROUP_NOBODY: &str = "";

/// Name of the well-known reflexive group: the principal that the accessed
/// instance itself represents.
pub const GROUP_REFLEXIVE: &str = "this";

pub fn is_well_known_group(name: &str) -> bool {
    name == GROUP_ALL || name == GROUP_NOBODY || name == GROUP_REFLEXIVE
}

/// Format an identifier the way it appears on the wire.
pub fn uuid_string(uuid: &Uuid) -> String {
    uuid.as_hyphenated().to_string()
}
