pub mod config;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export configuration
pub use config::DescriberConfig;

// Export the engines
pub use logic::{
    intern_type_spec, ApiAssembler, EntityModelBuilder, IdentityDigest, Principal,
    SchemaDefinitionError, SecurityResolver, SecurityTarget, TraversalEngine, TraversalError,
    TypeRegistry, UnknownIdentifier,
};

// Export all model types
pub use model::*;

// Export the demo fixture
pub use seed::*;

// Export store types
pub use store::{EmptySource, EnforceAll, InstanceSource, MemoryStore, PrincipalMapper};
