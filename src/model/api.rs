use crate::logic::digest::IdentityDigest;
use crate::model::TraversalMode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Describes a single HTTP request endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescription {
    pub uuid: Uuid,
    /// The HTTP method used to access the endpoint.
    pub method: String,
    /// The path used to access the endpoint.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
    /// Additional information about the return value, analogous to a doc
    /// comment's return clause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_doc_string: Option<String>,
    /// The expected entity type of the request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_uuid: Option<Uuid>,
    /// The expected contents of the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type_uuid: Option<Uuid>,
    /// The default traversal mode for data returned from the endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traversal_mode: Option<TraversalMode>,
    pub path_parameter_uuids: Vec<Uuid>,
    pub query_parameter_uuids: Vec<Uuid>,
    /// Roles allowed to access the endpoint. `None` allows every role; an
    /// empty list allows none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_names: Option<Vec<String>>,
    /// Describes entities that may ride along in a bag-style payload beyond
    /// those reachable from the payload's value.
    pub extra_return_data_uuids: Vec<Uuid>,
}

impl EndpointDescription {
    /// Identity is the `method:path` pair.
    pub fn identify(method: &str, path: &str) -> Uuid {
        IdentityDigest::new("endpointDescription")
            .str(&format!("{}:{}", method, path))
            .finish()
    }
}

/// Describes one path or query parameter of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescription {
    pub uuid: Uuid,
    pub endpoint_uuid: Uuid,
    pub name: String,
    pub type_uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
}

impl ParameterDescription {
    pub fn identify(endpoint_uuid: &Uuid, name: &str, type_uuid: &Uuid) -> Uuid {
        IdentityDigest::new("parameterDescription")
            .uuid(endpoint_uuid)
            .str(name)
            .uuid(type_uuid)
            .finish()
    }
}

/// A documented reference to a type, used for an endpoint's extra return
/// data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescription {
    pub uuid: Uuid,
    pub type_uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
}

impl TypeDescription {
    pub fn new(type_uuid: Uuid, doc_string: Option<&str>) -> Self {
        let uuid = IdentityDigest::new("typeDescription")
            .uuid(&type_uuid)
            .opt_str(doc_string)
            .finish();
        Self {
            uuid,
            type_uuid,
            doc_string: doc_string.map(str::to_string),
        }
    }
}

/// The assembled API surface: every endpoint plus the closure of entity
/// descriptors reachable from them. This is the root of the describe
/// document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDescription {
    pub uuid: Uuid,
    pub api_name: String,
    /// Reachable entity descriptors, in discovery order.
    pub entity_uuids: Vec<Uuid>,
    pub endpoint_uuids: Vec<Uuid>,
}

impl ApiDescription {
    pub fn new(api_name: &str, entity_uuids: Vec<Uuid>, endpoint_uuids: Vec<Uuid>) -> Self {
        let uuid = IdentityDigest::new("apiDescription")
            .str(api_name)
            .uuids(&endpoint_uuids)
            .finish();
        Self {
            uuid,
            api_name: api_name.to_string(),
            entity_uuids,
            endpoint_uuids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_identity_is_the_method_path_pair() {
        let get = EndpointDescription::identify("GET", "/products");
        let post = EndpointDescription::identify("POST", "/products");
        assert_ne!(get, post);
        assert_eq!(get, EndpointDescription::identify("GET", "/products"));
    }

    #[test]
    fn parameter_identity_includes_the_owning_endpoint() {
        let endpoint_a = EndpointDescription::identify("GET", "/products");
        let endpoint_b = EndpointDescription::identify("GET", "/merchants");
        let ty = Uuid::nil();
        assert_ne!(
            ParameterDescription::identify(&endpoint_a, "limit", &ty),
            ParameterDescription::identify(&endpoint_b, "limit", &ty)
        );
    }
}
