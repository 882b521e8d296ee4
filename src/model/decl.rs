use crate::model::TraversalMode;
use serde::{Deserialize, Serialize};

/// The declared shape of a property's type, resolved and interned by the
/// entity model builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeSpec {
    Any,
    Boolean,
    Integer,
    Double,
    String,
    Null,
    Enum {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        values: Vec<String>,
    },
    List(Box<TypeSpec>),
    Map(Box<TypeSpec>, Box<TypeSpec>),
    /// A reference to a declared entity by payload name.
    Entity(String),
}

impl TypeSpec {
    pub fn list_of(element: TypeSpec) -> Self {
        TypeSpec::List(Box::new(element))
    }

    pub fn map_of(key: TypeSpec, value: TypeSpec) -> Self {
        TypeSpec::Map(Box::new(key), Box::new(value))
    }

    pub fn entity(name: &str) -> Self {
        TypeSpec::Entity(name.to_string())
    }
}

/// Grants a set of action patterns (`"crud.read"`, `"crud.*"`, `"*.*"`) to a
/// named security group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantDecl {
    pub group: String,
    pub actions: Vec<String>,
}

impl GrantDecl {
    pub fn new(group: &str, actions: &[&str]) -> Self {
        Self {
            group: group.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// A declared permission policy: one grant per group.
pub type PermissionsDecl = Vec<GrantDecl>;

/// A globally-resolvable group, a static property of the principal's role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalGroupDecl {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GlobalGroupDecl {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
        }
    }
}

/// A non-global group declared on an entity, defined by property paths
/// evaluated against the instance being accessed. Path segments are property
/// names starting at the declaring entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupDecl {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub paths: Vec<Vec<String>>,
}

/// Points at a property on some entity, used to declare implied-property
/// links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRef {
    pub entity: String,
    pub property: String,
}

impl PropertyRef {
    pub fn new(entity: &str, property: &str) -> Self {
        Self {
            entity: entity.to_string(),
            property: property.to_string(),
        }
    }
}

/// A declared property of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    pub type_spec: TypeSpec,
    #[serde(default)]
    pub deep_traversal_only: bool,
    #[serde(default)]
    pub embedded: bool,
    #[serde(default)]
    pub suppress_default_value: bool,
    /// Setting this property on an instance also sets the referenced
    /// property on the assigned value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_property: Option<PropertyRef>,
    /// Property-level permissions; absent means the enclosing entity's
    /// permissions govern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionsDecl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
}

impl PropertyDecl {
    pub fn new(name: &str, type_spec: TypeSpec) -> Self {
        Self {
            name: name.to_string(),
            type_spec,
            deep_traversal_only: false,
            embedded: false,
            suppress_default_value: false,
            implied_property: None,
            permissions: None,
            doc_string: None,
        }
    }

    pub fn deep_traversal_only(mut self) -> Self {
        self.deep_traversal_only = true;
        self
    }

    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn suppress_default_value(mut self) -> Self {
        self.suppress_default_value = true;
        self
    }

    pub fn implied(mut self, entity: &str, property: &str) -> Self {
        self.implied_property = Some(PropertyRef::new(entity, property));
        self
    }

    pub fn permissions(mut self, permissions: PermissionsDecl) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn doc(mut self, doc_string: &str) -> Self {
        self.doc_string = Some(doc_string.to_string());
        self
    }
}

/// A declared entity shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDecl {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supertype: Option<String>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
    /// Entity-level permission policy; the fallback for properties without
    /// their own.
    pub permissions: PermissionsDecl,
    /// Non-global groups whose paths are rooted at this entity.
    #[serde(default)]
    pub security_groups: Vec<SecurityGroupDecl>,
    pub properties: Vec<PropertyDecl>,
}

impl EntityDecl {
    pub fn new(name: &str, permissions: PermissionsDecl) -> Self {
        Self {
            name: name.to_string(),
            supertype: None,
            persistent: false,
            doc_string: None,
            permissions,
            security_groups: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn supertype(mut self, name: &str) -> Self {
        self.supertype = Some(name.to_string());
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn doc(mut self, doc_string: &str) -> Self {
        self.doc_string = Some(doc_string.to_string());
        self
    }

    pub fn group(mut self, decl: SecurityGroupDecl) -> Self {
        self.security_groups.push(decl);
        self
    }

    pub fn property(mut self, decl: PropertyDecl) -> Self {
        self.properties.push(decl);
        self
    }
}

/// The full set of declared entity shapes handed to the entity model
/// builder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaDecl {
    #[serde(default)]
    pub global_groups: Vec<GlobalGroupDecl>,
    pub entities: Vec<EntityDecl>,
}

/// A declared path or query parameter of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: String,
    pub type_spec: TypeSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
}

impl ParameterDecl {
    pub fn new(name: &str, type_spec: TypeSpec) -> Self {
        Self {
            name: name.to_string(),
            type_spec,
            doc_string: None,
        }
    }

    pub fn doc(mut self, doc_string: &str) -> Self {
        self.doc_string = Some(doc_string.to_string());
        self
    }
}

/// An extra payload type an endpoint may return beyond its declared value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraReturnDecl {
    pub type_spec: TypeSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
}

/// A declared endpoint handed to the API surface assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDecl {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_doc_string: Option<String>,
    /// The request body's entity type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<TypeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traversal_mode: Option<TraversalMode>,
    #[serde(default)]
    pub path_parameters: Vec<ParameterDecl>,
    #[serde(default)]
    pub query_parameters: Vec<ParameterDecl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_names: Option<Vec<String>>,
    #[serde(default)]
    pub extra_return_data: Vec<ExtraReturnDecl>,
}

impl EndpointDecl {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            doc_string: None,
            return_doc_string: None,
            entity: None,
            return_type: None,
            traversal_mode: None,
            path_parameters: Vec::new(),
            query_parameters: Vec::new(),
            role_names: None,
            extra_return_data: Vec::new(),
        }
    }

    pub fn doc(mut self, doc_string: &str) -> Self {
        self.doc_string = Some(doc_string.to_string());
        self
    }

    pub fn returns(mut self, type_spec: TypeSpec, mode: TraversalMode) -> Self {
        self.return_type = Some(type_spec);
        self.traversal_mode = Some(mode);
        self
    }

    pub fn entity(mut self, type_spec: TypeSpec) -> Self {
        self.entity = Some(type_spec);
        self
    }

    pub fn path_parameter(mut self, decl: ParameterDecl) -> Self {
        self.path_parameters.push(decl);
        self
    }

    pub fn query_parameter(mut self, decl: ParameterDecl) -> Self {
        self.query_parameters.push(decl);
        self
    }
}
