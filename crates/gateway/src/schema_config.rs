//! Loads a [`CompiledSchema`] from a small JSON description of the merged
//! federated schema.
//!
//! Real schema composition — fetching each subgraph's SDL and merging them —
//! is the `SchemaSource` external collaborator's job and stays out of scope
//! (§1 Non-goals); this is the file-based stand-in the binary uses to get a
//! schema to boot with, grounded in the same builder methods the core's own
//! tests use to construct fixtures.

use gateway_core::{CompiledSchema, GatewayError};
use gateway_core::schema::{BoundaryFieldInfo, BoundaryMap, FieldDefinition, FieldLocationMap, InterfaceOrUnionType, ObjectType, Schema, TypeDefinition, TypeRef};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct SchemaConfigFile {
    query_type: String,
    #[serde(default)]
    mutation_type: Option<String>,
    types: Vec<TypeConfig>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TypeConfig {
    Object {
        name: String,
        #[serde(default)]
        implements: Vec<String>,
        #[serde(default)]
        is_namespace: bool,
        #[serde(default)]
        boundary: bool,
        #[serde(default)]
        fields: Vec<FieldConfig>,
    },
    InterfaceOrUnion {
        name: String,
        #[serde(default)]
        possible_types: Vec<String>,
        #[serde(default)]
        fields: Vec<FieldConfig>,
    },
    Scalar {
        name: String,
    },
    Enum {
        name: String,
    },
}

#[derive(Deserialize)]
struct FieldConfig {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    /// Owning service for this field on this type; absent for namespace
    /// types, whose fields fan out per-service via the planner's own
    /// per-field location lookup.
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    boundary_lookup: Option<BoundaryLookupConfig>,
}

#[derive(Deserialize)]
struct BoundaryLookupConfig {
    argument_name: String,
    #[serde(default)]
    array_argument: bool,
}

pub fn compile(config: SchemaConfigFile) -> Result<CompiledSchema, GatewayError> {
    let mut schema = Schema { query_type: config.query_type, mutation_type: config.mutation_type, ..Default::default() };
    let mut locations = FieldLocationMap::default();
    let mut boundaries = BoundaryMap::default();

    for type_config in config.types {
        match type_config {
            TypeConfig::Object { name, implements, is_namespace, boundary, fields } => {
                if boundary {
                    boundaries.mark_boundary(&name);
                }
                let mut object = ObjectType { name: name.clone(), implements, is_namespace, ..Default::default() };
                for field in fields {
                    let field_type = parse_type_ref(&field.field_type)?;
                    if let Some(service) = &field.service {
                        locations.insert(&name, &field.name, service.clone());
                    }
                    if let (Some(service), Some(lookup)) = (&field.service, &field.boundary_lookup) {
                        boundaries.insert_lookup(
                            service.clone(),
                            &name,
                            BoundaryFieldInfo { field_name: field.name.clone(), argument_name: lookup.argument_name.clone(), array_argument: lookup.array_argument },
                        );
                    }
                    object.fields.insert(field.name.clone(), FieldDefinition { name: field.name, arguments: Vec::new(), field_type });
                }
                schema.types.insert(name, TypeDefinition::Object(object));
            }
            TypeConfig::InterfaceOrUnion { name, possible_types, fields } => {
                let mut union_type = InterfaceOrUnionType { name: name.clone(), possible_types, ..Default::default() };
                for field in fields {
                    let field_type = parse_type_ref(&field.field_type)?;
                    union_type.fields.insert(field.name.clone(), FieldDefinition { name: field.name, arguments: Vec::new(), field_type });
                }
                schema.types.insert(name, TypeDefinition::InterfaceOrUnion(union_type));
            }
            TypeConfig::Scalar { name } => {
                schema.types.insert(name.clone(), TypeDefinition::Scalar(name));
            }
            TypeConfig::Enum { name } => {
                schema.types.insert(name.clone(), TypeDefinition::Enum(name));
            }
        }
    }

    Ok(CompiledSchema { schema, locations, boundaries })
}

/// Parses a GraphQL-style type reference (`String!`, `[Gizmo!]!`) into a
/// [`TypeRef`].
fn parse_type_ref(raw: &str) -> Result<TypeRef, GatewayError> {
    let raw = raw.trim();
    let (body, non_null) = match raw.strip_suffix('!') {
        Some(rest) => (rest, true),
        None => (raw, false),
    };
    if let Some(inner) = body.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return Ok(TypeRef::list_of(parse_type_ref(inner)?, non_null));
    }
    if body.is_empty() {
        return Err(GatewayError::Planner(format!("malformed type reference `{raw}`")));
    }
    Ok(TypeRef::named(body, non_null))
}
