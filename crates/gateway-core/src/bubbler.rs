//! The null bubbler (§4.7): walks the merged data against the original
//! selection set and the schema's declared nullability, promoting
//! unexpected nulls upward until a nullable ancestor absorbs them.

use std::collections::HashMap;

use gateway_json::{Path, Value};

use crate::error::TypedError;
use crate::operation::{FragmentDefinition, Selection, SelectionSet};
use crate::schema::{Schema, TypeRef, BOUNDARY_TYPENAME_ALIAS};

/// Bubbles `data` against `selection_set` rooted at `type_name`. Returns the
/// surviving data (`None` if the violation reached the root) and every
/// collected error, in the order encountered.
pub fn bubble(
    mut data: Value,
    selection_set: &SelectionSet,
    type_name: &str,
    schema: &Schema,
    fragments: &HashMap<String, FragmentDefinition>,
) -> (Option<Value>, Vec<TypedError>) {
    let mut errors = Vec::new();
    let discarded = bubble_into(&mut data, selection_set, type_name, &Path::empty(), schema, fragments, &mut errors);
    (if discarded { None } else { Some(data) }, errors)
}

/// Checks every field selected on `value` (assumed an object). Returns
/// whether a non-nullable violation surfaced that the caller must propagate
/// past `value` itself.
fn bubble_into(
    value: &mut Value,
    selection_set: &SelectionSet,
    type_name: &str,
    path: &Path,
    schema: &Schema,
    fragments: &HashMap<String, FragmentDefinition>,
    errors: &mut Vec<TypedError>,
) -> bool {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                if field.name.starts_with("__") {
                    continue;
                }
                let Some(field_def) = schema.field(type_name, &field.name).cloned() else {
                    continue;
                };
                let field_path = path.join(field.alias.clone());
                let Some(obj) = value.as_object_mut() else {
                    continue;
                };
                match obj.get_mut(&field.alias) {
                    None => {
                        if field_def.field_type.is_non_null() {
                            errors.push(
                                TypedError::new(format!("Cannot return null for non-nullable field at `{field_path}`"))
                                    .with_path(field_path),
                            );
                            return true;
                        }
                    }
                    Some(child) => {
                        if bubble_field(child, &field.selection_set, &field_def.field_type, &field_path, schema, fragments, errors) {
                            if field_def.field_type.is_non_null() {
                                return true;
                            }
                            *child = Value::Null;
                        }
                    }
                }
            }
            Selection::InlineFragment(frag) => {
                if !applies_to_observed(value, schema, frag.type_condition.as_deref()) {
                    continue;
                }
                let frag_type = frag.type_condition.clone().unwrap_or_else(|| type_name.to_string());
                if bubble_into(value, &frag.selection_set, &frag_type, path, schema, fragments, errors) {
                    return true;
                }
            }
            Selection::FragmentSpread(spread) => {
                if let Some(def) = fragments.get(&spread.fragment_name) {
                    if !applies_to_observed(value, schema, Some(&def.type_condition)) {
                        continue;
                    }
                    if bubble_into(value, &def.selection_set, &def.type_condition, path, schema, fragments, errors) {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Checks one field's value against its declared type. Returns whether the
/// value itself must be discarded by the caller (set to null, or propagated
/// further if the caller's own slot is non-nullable).
fn bubble_field(
    value: &mut Value,
    selection_set: &SelectionSet,
    field_type: &TypeRef,
    path: &Path,
    schema: &Schema,
    fragments: &HashMap<String, FragmentDefinition>,
    errors: &mut Vec<TypedError>,
) -> bool {
    if value.is_null() {
        if field_type.is_non_null() {
            errors.push(TypedError::new(format!("Cannot return null for non-nullable field at `{path}`")).with_path(path.clone()));
            return true;
        }
        return false;
    }
    if selection_set.is_empty() {
        return false;
    }
    match field_type {
        TypeRef::List { of, .. } => {
            let _ = value.materialize();
            let Some(items) = value.as_list_mut() else { return false };
            let mut list_bubbled = false;
            for (i, item) in items.iter_mut().enumerate() {
                let elem_path = path.join(i);
                if bubble_field(item, selection_set, of, &elem_path, schema, fragments, errors) {
                    if of.is_non_null() {
                        list_bubbled = true;
                        break;
                    }
                    *item = Value::Null;
                }
            }
            list_bubbled
        }
        TypeRef::Named { name, .. } => bubble_into(value, selection_set, name, path, schema, fragments, errors),
    }
}

/// A non-applicable fragment must never drive null-bubbling: its subtree may
/// name fields (and non-null types) that simply don't exist on the object
/// actually observed at runtime. Reads `value`'s own `_bramble__typename`
/// probe and defers to the same applicability rule the serializer's
/// union-and-trim uses, so a fragment survives bubbling exactly when it
/// would also survive serialization.
fn applies_to_observed(value: &Value, schema: &Schema, type_condition: Option<&str>) -> bool {
    let observed = value.as_object().and_then(|obj| obj.get(BOUNDARY_TYPENAME_ALIAS)).and_then(Value::as_str);
    schema.fragment_applies(type_condition, observed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Field;
    use crate::schema::{FieldDefinition, ObjectType, TypeDefinition};
    use std::collections::HashMap as Map;

    fn schema_with_non_null_color() -> Schema {
        let mut schema = Schema { query_type: "Query".into(), ..Default::default() };
        let mut gizmo = ObjectType { name: "Gizmo".into(), ..Default::default() };
        gizmo.fields.insert("color".into(), FieldDefinition { name: "color".into(), arguments: vec![], field_type: TypeRef::named("String", true) });
        schema.types.insert("Gizmo".into(), TypeDefinition::Object(gizmo));
        schema
    }

    fn color_field() -> SelectionSet {
        SelectionSet {
            selections: vec![Selection::Field(Field {
                alias: "color".into(),
                name: "color".into(),
                arguments: Map::new(),
                directives: vec![],
                selection_set: SelectionSet::default(),
            })],
        }
    }

    #[test]
    fn non_nullable_element_violation_promotes_the_whole_list_to_null() {
        // Mirrors the concrete scenario in which `gizmos: [Gizmo!]` is a
        // nullable list of non-null elements, and one element's non-nullable
        // `color` field resolves to null: the single violation discards the
        // whole list, not just the offending element.
        let mut schema = schema_with_non_null_color();
        let mut query = ObjectType { name: "Query".into(), ..Default::default() };
        query.fields.insert(
            "gizmos".into(),
            FieldDefinition { name: "gizmos".into(), arguments: vec![], field_type: TypeRef::list_of(TypeRef::named("Gizmo", true), false) },
        );
        schema.types.insert("Query".into(), TypeDefinition::Object(query));

        let set = SelectionSet {
            selections: vec![Selection::Field(Field {
                alias: "gizmos".into(),
                name: "gizmos".into(),
                arguments: Map::new(),
                directives: vec![],
                selection_set: color_field(),
            })],
        };
        let data = Value::from(serde_json::json!({"gizmos": [
            {"color": "red"},
            {"color": "blue"},
            {"color": null},
        ]}));
        let (result, errors) = bubble(data, &set, "Query", &schema, &Map::new());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path.to_string(), "gizmos.2.color");
        let result = result.unwrap();
        assert_eq!(result.as_object().unwrap().get("gizmos").unwrap(), &Value::Null);
    }

    #[test]
    fn root_violation_discards_all_data() {
        let schema = schema_with_non_null_color();
        let set = SelectionSet {
            selections: vec![Selection::Field(Field {
                alias: "color".into(),
                name: "color".into(),
                arguments: Map::new(),
                directives: vec![],
                selection_set: SelectionSet::default(),
            })],
        };
        let data = Value::from(serde_json::json!({"color": null}));
        let (result, errors) = bubble(data, &set, "Gizmo", &schema, &Map::new());
        assert!(result.is_none());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn bubbling_twice_is_idempotent() {
        let schema = schema_with_non_null_color();
        let set = SelectionSet {
            selections: vec![Selection::Field(Field {
                alias: "gizmo".into(),
                name: "gizmo".into(),
                arguments: Map::new(),
                directives: vec![],
                selection_set: color_field(),
            })],
        };
        let mut root = ObjectType { name: "Query".into(), ..Default::default() };
        root.fields.insert("gizmo".into(), FieldDefinition { name: "gizmo".into(), arguments: vec![], field_type: TypeRef::named("Gizmo", false) });
        let mut schema = schema;
        schema.types.insert("Query".into(), TypeDefinition::Object(root));
        let data = Value::from(serde_json::json!({"gizmo": {"color": null}}));
        let (once, _) = bubble(data, &set, "Query", &schema, &Map::new());
        let (twice, _) = bubble(once.clone().unwrap(), &set, "Query", &schema, &Map::new());
        assert_eq!(once, twice);
    }

    /// A fragment whose type condition doesn't match the observed typename
    /// must never drive null-bubbling, even when its own subtree declares a
    /// non-null field absent from the actual object: `... on Square { side }`
    /// against an observed `Circle` must not sink the whole (valid) result.
    #[test]
    fn non_applicable_fragment_does_not_bubble_on_its_missing_non_null_field() {
        let mut schema = Schema { query_type: "Query".into(), ..Default::default() };
        let mut circle = ObjectType { name: "Circle".into(), ..Default::default() };
        circle.fields.insert("radius".into(), FieldDefinition { name: "radius".into(), arguments: vec![], field_type: TypeRef::named("Float", false) });
        schema.types.insert("Circle".into(), TypeDefinition::Object(circle));
        let mut square = ObjectType { name: "Square".into(), ..Default::default() };
        square.fields.insert("side".into(), FieldDefinition { name: "side".into(), arguments: vec![], field_type: TypeRef::named("Float", true) });
        schema.types.insert("Square".into(), TypeDefinition::Object(square));
        let mut query = ObjectType { name: "Query".into(), ..Default::default() };
        query.fields.insert("shape".into(), FieldDefinition { name: "shape".into(), arguments: vec![], field_type: TypeRef::named("Shape", false) });
        schema.types.insert("Query".into(), TypeDefinition::Object(query));

        let set = SelectionSet {
            selections: vec![Selection::Field(Field {
                alias: "shape".into(),
                name: "shape".into(),
                arguments: Map::new(),
                directives: vec![],
                selection_set: SelectionSet {
                    selections: vec![
                        Selection::InlineFragment(crate::operation::InlineFragment {
                            type_condition: Some("Circle".into()),
                            directives: vec![],
                            selection_set: SelectionSet {
                                selections: vec![Selection::Field(Field {
                                    alias: "radius".into(),
                                    name: "radius".into(),
                                    arguments: Map::new(),
                                    directives: vec![],
                                    selection_set: SelectionSet::default(),
                                })],
                            },
                        }),
                        Selection::InlineFragment(crate::operation::InlineFragment {
                            type_condition: Some("Square".into()),
                            directives: vec![],
                            selection_set: SelectionSet {
                                selections: vec![Selection::Field(Field {
                                    alias: "side".into(),
                                    name: "side".into(),
                                    arguments: Map::new(),
                                    directives: vec![],
                                    selection_set: SelectionSet::default(),
                                })],
                            },
                        }),
                    ],
                },
            })],
        };

        let data = Value::from(serde_json::json!({"shape": {BOUNDARY_TYPENAME_ALIAS: "Circle", "radius": 5}}));
        let (result, errors) = bubble(data, &set, "Query", &schema, &Map::new());
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        let result = result.unwrap();
        let shape = result.as_object().unwrap().get("shape").unwrap().as_object().unwrap();
        assert_eq!(shape.get("radius").unwrap(), &Value::from(serde_json::json!(5)));
    }
}
