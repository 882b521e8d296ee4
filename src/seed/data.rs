use crate::config::DescriberConfig;
use crate::logic::assembler::ApiAssembler;
use crate::logic::builder::EntityModelBuilder;
use crate::logic::digest::IdentityDigest;
use crate::logic::registry::TypeRegistry;
use crate::logic::security::Principal;
use crate::model::{
    EndpointDecl, EntityDecl, EntityValue, FieldValue, GlobalGroupDecl, GrantDecl, ParameterDecl,
    PropertyDecl, SchemaDecl, SecurityGroupDecl, TraversalMode, TypeSpec, GROUP_ALL, GROUP_NOBODY,
};
use crate::store::memory::MemoryStore;
use crate::store::traits::PrincipalMapper;
use anyhow::{anyhow, Result};
use uuid::Uuid;

/// The demo product catalog: schema, endpoints and seeded instances used by
/// the integration tests and as a worked example of the declaration API.
pub struct DemoFixture {
    pub registry: TypeRegistry,
    pub store: MemoryStore,
    pub config: DescriberConfig,
    pub api_uuid: Uuid,
    pub northwind: Uuid,
    pub acme: Uuid,
    pub hammer: Uuid,
    pub anvil: Uuid,
    pub lantern: Uuid,
}

/// The demo deployment's principal mapping: access checks are not enforced
/// for the application super-user role.
pub struct DemoPrincipalMapper;

impl PrincipalMapper for DemoPrincipalMapper {
    fn is_access_enforced(&self, principal: &Principal) -> bool {
        !principal.global_groups.iter().any(|group| group == "admin")
    }
}

/// Deterministic instance identifiers so seeded data is stable across runs.
fn demo_uuid(key: &str) -> Uuid {
    IdentityDigest::new("demoInstance").str(key).finish()
}

pub fn demo_schema() -> SchemaDecl {
    let readable = || {
        vec![
            GrantDecl::new(GROUP_ALL, &["crud.read"]),
            GrantDecl::new("admin", &["crud.*"]),
        ]
    };

    SchemaDecl {
        global_groups: vec![GlobalGroupDecl::new("admin", "Application administrators")],
        entities: vec![
            EntityDecl::new("merchant", readable())
                .supertype("baseHasUuid")
                .persistent()
                .doc("A seller offering products in the catalog")
                .property(PropertyDecl::new("name", TypeSpec::String))
                .property(
                    PropertyDecl::new("products", TypeSpec::list_of(TypeSpec::entity("product")))
                        .implied("product", "owner"),
                ),
            EntityDecl::new("product", readable())
                .supertype("baseHasUuid")
                .persistent()
                .doc("A product offered for sale")
                .group(SecurityGroupDecl {
                    name: "productOwner".to_string(),
                    description: Some("The merchant that owns the product".to_string()),
                    paths: vec![vec!["owner".to_string()]],
                })
                .property(PropertyDecl::new("name", TypeSpec::String))
                .property(
                    PropertyDecl::new("price", TypeSpec::Double)
                        .suppress_default_value()
                        .permissions(vec![
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
                .property(
                    PropertyDecl::new("owner", TypeSpec::entity("merchant"))
                        .implied("merchant", "products"),
                )
                .property(
                    PropertyDecl::new("notes", TypeSpec::list_of(TypeSpec::entity("productNote")))
                        .deep_traversal_only(),
                ),
            EntityDecl::new("productNote", readable())
                .supertype("baseHasUuid")
                .persistent()
                .property(PropertyDecl::new("text", TypeSpec::String).suppress_default_value()),
        ],
    }
}

pub fn demo_endpoints() -> Vec<EndpointDecl> {
    vec![
        EndpointDecl::new("GET", "/products")
            .doc("List the products in the catalog")
            .returns(
                TypeSpec::list_of(TypeSpec::entity("product")),
                TraversalMode::Simple,
            )
            .query_parameter(
                ParameterDecl::new("limit", TypeSpec::Integer)
                    .doc("Maximum number of products to return"),
            ),
        EndpointDecl::new("POST", "/products")
            .doc("Store a product")
            .entity(TypeSpec::entity("product"))
            .returns(TypeSpec::entity("product"), TraversalMode::Simple),
        EndpointDecl::new("GET", "/hello").returns(TypeSpec::String, TraversalMode::Simple),
        EndpointDecl::new("POST", "/reset").doc("Restore the demo data set"),
        EndpointDecl::new("GET", "/describe")
            .doc("Describe the API surface")
            .returns(TypeSpec::entity("apiDescription"), TraversalMode::Simple),
    ]
}

/// Seed the in-memory store with the demo instance graph. Instances use
/// content-derived identifiers so tests can rely on them.
pub fn seed_demo_store(registry: &TypeRegistry, store: &MemoryStore) -> Result<()> {
    let entity = |name: &str| -> Result<Uuid> {
        registry
            .entity_by_name(name)
            .map(|e| e.uuid)
            .ok_or_else(|| anyhow!("demo schema is missing entity '{}'", name))
    };
    let merchant_entity = entity("merchant")?;
    let product_entity = entity("product")?;
    let note_entity = entity("productNote")?;

    let northwind = demo_uuid("merchant:northwind");
    let acme = demo_uuid("merchant:acme");
    let hammer = demo_uuid("product:hammer");
    let anvil = demo_uuid("product:anvil");
    let lantern = demo_uuid("product:lantern");
    let note_weight = demo_uuid("note:hammer-weight");
    let note_stock = demo_uuid("note:hammer-stock");

    store.insert(
        EntityValue::with_uuid(northwind, merchant_entity)
            .set("name", FieldValue::string("Northwind Traders"))
            .set("products", FieldValue::references(&[hammer, anvil])),
    );
    store.insert(
        EntityValue::with_uuid(acme, merchant_entity)
            .set("name", FieldValue::string("Acme Corp"))
            .set("products", FieldValue::references(&[lantern])),
    );

    store.insert(
        EntityValue::with_uuid(hammer, product_entity)
            .set("name", FieldValue::string("Claw hammer"))
            .set("price", FieldValue::double(12.5))
            .set("costBasis", FieldValue::double(4.75))
            .set("secretMargin", FieldValue::double(7.75))
            .set("owner", FieldValue::Reference(northwind))
            .set("notes", FieldValue::references(&[note_weight, note_stock])),
    );
    // Zero-priced: the suppress-default flag keeps the price off the wire.
    store.insert(
        EntityValue::with_uuid(anvil, product_entity)
            .set("name", FieldValue::string("Anvil"))
            .set("price", FieldValue::double(0.0))
            .set("costBasis", FieldValue::double(55.0))
            .set("secretMargin", FieldValue::double(0.0))
            .set("owner", FieldValue::Reference(northwind))
            .set("notes", FieldValue::List(Vec::new())),
    );
    store.insert(
        EntityValue::with_uuid(lantern, product_entity)
            .set("name", FieldValue::string("Storm lantern"))
            .set("price", FieldValue::double(23.0))
            .set("costBasis", FieldValue::double(9.5))
            .set("secretMargin", FieldValue::double(13.5))
            .set("owner", FieldValue::Reference(acme))
            .set("notes", FieldValue::List(Vec::new())),
    );

    store.insert(
        EntityValue::with_uuid(note_weight, note_entity)
            .set("text", FieldValue::string("Heavier than the catalog photo suggests")),
    );
    store.insert(
        EntityValue::with_uuid(note_stock, note_entity)
            .set("text", FieldValue::string("Restock every six weeks")),
    );
    Ok(())
}

/// Build the whole demo: meta-schema, demo schema, assembled endpoints and
/// seeded instance data.
pub fn build_demo() -> Result<DemoFixture> {
    let mut registry = TypeRegistry::new();
    ApiAssembler::ensure_meta_schema(&mut registry)?;
    EntityModelBuilder::build(&mut registry, &demo_schema())?;

    let config = DescriberConfig::default().with_api_name("Demo API");
    let api_uuid = ApiAssembler::new(&config).assemble(&mut registry, &demo_endpoints())?;

    let store = MemoryStore::new();
    seed_demo_store(&registry, &store)?;

    Ok(DemoFixture {
        registry,
        store,
        config,
        api_uuid,
        northwind: demo_uuid("merchant:northwind"),
        acme: demo_uuid("merchant:acme"),
        hammer: demo_uuid("product:hammer"),
        anvil: demo_uuid("product:anvil"),
        lantern: demo_uuid("product:lantern"),
    })
}
