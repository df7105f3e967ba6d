//! A minimal internal resolver for top-level `__schema`/`__type`
//! introspection requests (§4.1, §6), walking the merged [`Schema`] directly
//! rather than going through the planner/executor pipeline.
//!
//! Full GraphQL introspection (argument types, directive definitions,
//! deprecation reasons) is a large, fixed surface each backend and the
//! merged schema both already carry; this module only covers the subset the
//! merged [`Schema`] type models — object/interface/union/scalar/enum kind,
//! name, and field lists — since that's what a federation gateway's own
//! callers actually probe it for. Permission-filtered visibility is the
//! `filter_schema` external collaborator's job (§9 open question); this
//! module always receives an already-filtered schema.

use gateway_json::Value;
use indexmap::IndexMap;

use crate::error::GatewayError;
use crate::operation::{Field, Selection, SelectionSet};
use crate::schema::{Schema, TypeDefinition};

pub fn resolve(selection_set: &SelectionSet, schema: &Schema) -> Result<Value, GatewayError> {
    let mut out = IndexMap::new();
    for selection in &selection_set.selections {
        let Selection::Field(field) = selection else { continue };
        let value = match field.name.as_str() {
            "__schema" => resolve_schema(field, schema),
            "__type" => {
                let name = field
                    .arguments
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::Planner("__type requires a `name` argument".into()))?;
                schema.types.get(name).map(|def| resolve_type(def, &field.selection_set, schema)).unwrap_or(Value::Null)
            }
            "__typename" => Value::String(schema.query_type.clone()),
            _ => continue,
        };
        out.insert(field.alias.clone(), value);
    }
    Ok(Value::Object(out))
}

fn resolve_schema(field: &Field, schema: &Schema) -> Value {
    let mut out = IndexMap::new();
    for selection in &field.selection_set.selections {
        let Selection::Field(f) = selection else { continue };
        let value = match f.name.as_str() {
            "queryType" => named_type_ref(&schema.query_type),
            "mutationType" => schema.mutation_type.as_deref().map(named_type_ref).unwrap_or(Value::Null),
            "subscriptionType" => Value::Null,
            "types" => Value::List(schema.types.values().map(|def| resolve_type(def, &f.selection_set, schema)).collect()),
            "directives" => Value::List(Vec::new()),
            _ => continue,
        };
        out.insert(f.alias.clone(), value);
    }
    Value::Object(out)
}

fn named_type_ref(name: &str) -> Value {
    let mut out = IndexMap::new();
    out.insert("name".to_string(), Value::String(name.to_string()));
    Value::Object(out)
}

fn resolve_type(def: &TypeDefinition, selection_set: &SelectionSet, schema: &Schema) -> Value {
    let mut out = IndexMap::new();
    for selection in &selection_set.selections {
        let Selection::Field(f) = selection else { continue };
        let value = match f.name.as_str() {
            "name" => Value::String(def.name().to_string()),
            "kind" => Value::String(type_kind(def).to_string()),
            "description" => Value::Null,
            "fields" => match def {
                TypeDefinition::Object(o) => Value::List(o.fields.values().map(|fd| field_object(fd, &f.selection_set)).collect()),
                TypeDefinition::InterfaceOrUnion(u) => Value::List(u.fields.values().map(|fd| field_object(fd, &f.selection_set)).collect()),
                _ => Value::Null,
            },
            "interfaces" => match def {
                TypeDefinition::Object(o) => Value::List(o.implements.iter().map(|n| named_type_ref(n)).collect()),
                _ => Value::List(Vec::new()),
            },
            "possibleTypes" => match def {
                TypeDefinition::InterfaceOrUnion(u) => Value::List(u.possible_types.iter().map(|n| named_type_ref(n)).collect()),
                _ => Value::Null,
            },
            "enumValues" | "inputFields" => Value::List(Vec::new()),
            "ofType" => Value::Null,
            _ => continue,
        };
        out.insert(f.alias.clone(), value);
    }
    let _ = schema;
    Value::Object(out)
}

fn field_object(field_def: &crate::schema::FieldDefinition, selection_set: &SelectionSet) -> Value {
    let mut out = IndexMap::new();
    for selection in &selection_set.selections {
        let Selection::Field(f) = selection else { continue };
        let value = match f.name.as_str() {
            "name" => Value::String(field_def.name.clone()),
            "description" => Value::Null,
            "isDeprecated" => Value::Bool(false),
            "deprecationReason" => Value::Null,
            "type" => type_ref_object(&field_def.field_type),
            "args" => Value::List(Vec::new()),
            _ => continue,
        };
        out.insert(f.alias.clone(), value);
    }
    Value::Object(out)
}

fn type_ref_object(type_ref: &crate::schema::TypeRef) -> Value {
    let mut out = IndexMap::new();
    out.insert("name".to_string(), Value::String(type_ref.inner_name().to_string()));
    out.insert("kind".to_string(), Value::String(if type_ref.is_list() { "LIST".to_string() } else { "SCALAR".to_string() }));
    Value::Object(out)
}

fn type_kind(def: &TypeDefinition) -> &'static str {
    match def {
        TypeDefinition::Object(_) => "OBJECT",
        TypeDefinition::InterfaceOrUnion(u) => {
            if u.fields.is_empty() {
                "UNION"
            } else {
                "INTERFACE"
            }
        }
        TypeDefinition::Scalar(_) => "SCALAR",
        TypeDefinition::Enum(_) => "ENUM",
    }
}
