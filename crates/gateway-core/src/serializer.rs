//! The serializer (§4.8): recursively re-emits the (merged, bubbled) result
//! against the client's original selection set, performing a union-and-trim
//! pass over fragments along the way.

use std::collections::{HashMap, HashSet};

use gateway_json::Value;

use crate::operation::{Field, FragmentDefinition, Selection, SelectionSet};
use crate::schema::{Schema, BOUNDARY_TYPENAME_ALIAS};

/// Re-emits `data` in the shape `selection_set` requests.
pub fn serialize(data: &Value, selection_set: &SelectionSet, fragments: &HashMap<String, FragmentDefinition>, schema: &Schema) -> Value {
    serialize_value(Some(data), selection_set, fragments, schema)
}

fn serialize_value(value: Option<&Value>, selection_set: &SelectionSet, fragments: &HashMap<String, FragmentDefinition>, schema: &Schema) -> Value {
    let Some(value) = value else { return Value::Null };
    let mut value = value.clone();
    let _ = value.materialize();

    if selection_set.is_empty() {
        return value;
    }

    match value {
        Value::Null => Value::Null,
        Value::List(items) => {
            Value::List(items.iter().map(|item| serialize_value(Some(item), selection_set, fragments, schema)).collect())
        }
        Value::Object(map) => {
            let observed_typename = map.get(BOUNDARY_TYPENAME_ALIAS).and_then(Value::as_str);
            let fields = resolve_fields(selection_set, observed_typename, fragments, schema);
            let mut out = indexmap::IndexMap::with_capacity(fields.len());
            for field in fields {
                let child = serialize_value(map.get(field.response_key()), &field.selection_set, fragments, schema);
                out.insert(field.alias.clone(), child);
            }
            Value::Object(out)
        }
        scalar => scalar,
    }
}

/// Union-and-trim (§4.8): flattens inline fragments and fragment spreads
/// whose type condition matches `observed_typename` (or that carry no type
/// condition) into one field list, keeping only the first occurrence of
/// each alias so every key appears exactly once in the emitted output, in
/// original selection order.
fn resolve_fields(
    selection_set: &SelectionSet,
    observed_typename: Option<&str>,
    fragments: &HashMap<String, FragmentDefinition>,
    schema: &Schema,
) -> Vec<Field> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    walk_fields(&selection_set.selections, observed_typename, fragments, schema, &mut out, &mut seen);
    out
}

fn walk_fields(
    selections: &[Selection],
    observed_typename: Option<&str>,
    fragments: &HashMap<String, FragmentDefinition>,
    schema: &Schema,
    out: &mut Vec<Field>,
    seen: &mut HashSet<String>,
) {
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                if seen.insert(field.alias.clone()) {
                    out.push(field.clone());
                }
            }
            Selection::InlineFragment(frag) => {
                if schema.fragment_applies(frag.type_condition.as_deref(), observed_typename) {
                    walk_fields(&frag.selection_set.selections, observed_typename, fragments, schema, out, seen);
                }
            }
            Selection::FragmentSpread(spread) => {
                if let Some(def) = fragments.get(&spread.fragment_name) {
                    if schema.fragment_applies(Some(&def.type_condition), observed_typename) {
                        walk_fields(&def.selection_set.selections, observed_typename, fragments, schema, out, seen);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::InlineFragment;
    use crate::schema::{InterfaceOrUnionType, ObjectType, TypeDefinition};
    use std::collections::HashMap as Map;

    fn field(alias: &str, name: &str, sub: Vec<Selection>) -> Selection {
        Selection::Field(Field { alias: alias.into(), name: name.into(), arguments: Map::new(), directives: vec![], selection_set: SelectionSet { selections: sub } })
    }

    #[test]
    fn absent_field_serializes_as_null() {
        let data = Value::from(serde_json::json!({}));
        let set = SelectionSet { selections: vec![field("name", "name", vec![])] };
        let result = serialize(&data, &set, &Map::new(), &Schema::default());
        assert_eq!(result.as_object().unwrap().get("name").unwrap(), &Value::Null);
    }

    #[test]
    fn list_values_serialize_element_wise() {
        let data = Value::from(serde_json::json!({"gizmos": [{"id": "1"}, {"id": "2"}]}));
        let set = SelectionSet { selections: vec![field("gizmos", "gizmos", vec![field("id", "id", vec![])])] };
        let result = serialize(&data, &set, &Map::new(), &Schema::default());
        let gizmos = result.as_object().unwrap().get("gizmos").unwrap().as_list().unwrap();
        assert_eq!(gizmos.len(), 2);
        assert_eq!(gizmos[0].as_object().unwrap().get("id").unwrap().as_str(), Some("1"));
    }

    #[test]
    fn non_matching_fragment_is_dropped_and_matching_fragment_fields_are_deduped() {
        let data = Value::from(serde_json::json!({
            BOUNDARY_TYPENAME_ALIAS: "Dog",
            "id": "1",
            "name": "Rex",
            "bark": "woof",
        }));
        let set = SelectionSet {
            selections: vec![
                field("id", "id", vec![]),
                Selection::InlineFragment(InlineFragment {
                    type_condition: Some("Dog".into()),
                    directives: vec![],
                    selection_set: SelectionSet { selections: vec![field("id", "id", vec![]), field("bark", "bark", vec![])] },
                }),
                Selection::InlineFragment(InlineFragment {
                    type_condition: Some("Cat".into()),
                    directives: vec![],
                    selection_set: SelectionSet { selections: vec![field("meow", "meow", vec![])] },
                }),
            ],
        };
        let result = serialize(&data, &set, &Map::new(), &Schema::default());
        let map = result.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("id").unwrap().as_str(), Some("1"));
        assert_eq!(map.get("bark").unwrap().as_str(), Some("woof"));
        assert!(!map.contains_key("meow"));
    }

    #[test]
    fn fragment_spread_resolves_through_fragment_definitions() {
        let data = Value::from(serde_json::json!({BOUNDARY_TYPENAME_ALIAS: "Dog", "bark": "woof"}));
        let mut fragments = Map::new();
        fragments.insert(
            "DogFields".to_string(),
            FragmentDefinition { name: "DogFields".into(), type_condition: "Dog".into(), selection_set: SelectionSet { selections: vec![field("bark", "bark", vec![])] } },
        );
        let set = SelectionSet { selections: vec![Selection::FragmentSpread(crate::operation::FragmentSpread { fragment_name: "DogFields".into(), directives: vec![] })] };
        let result = serialize(&data, &set, &fragments, &Schema::default());
        assert_eq!(result.as_object().unwrap().get("bark").unwrap().as_str(), Some("woof"));
    }

    /// A fragment on the *interface* itself (`... on Shape`) alongside one on
    /// a concrete member (`... on Circle`) must both contribute fields when
    /// the observed object is a `Circle` — raw string equality against the
    /// type condition would drop the interface fragment entirely.
    #[test]
    fn fragment_on_interface_applies_to_its_observed_concrete_member() {
        let mut schema = Schema::default();
        schema.types.insert(
            "Shape".into(),
            TypeDefinition::InterfaceOrUnion(InterfaceOrUnionType { name: "Shape".into(), possible_types: vec!["Circle".into(), "Square".into()], fields: Default::default() }),
        );
        schema.types.insert("Circle".into(), TypeDefinition::Object(ObjectType { name: "Circle".into(), ..Default::default() }));

        let data = Value::from(serde_json::json!({BOUNDARY_TYPENAME_ALIAS: "Circle", "radius": 5, "perimeter": 31}));
        let set = SelectionSet {
            selections: vec![
                Selection::InlineFragment(InlineFragment {
                    type_condition: Some("Shape".into()),
                    directives: vec![],
                    selection_set: SelectionSet { selections: vec![field("perimeter", "perimeter", vec![])] },
                }),
                Selection::InlineFragment(InlineFragment {
                    type_condition: Some("Circle".into()),
                    directives: vec![],
                    selection_set: SelectionSet { selections: vec![field("radius", "radius", vec![])] },
                }),
                Selection::InlineFragment(InlineFragment {
                    type_condition: Some("Square".into()),
                    directives: vec![],
                    selection_set: SelectionSet { selections: vec![field("side", "side", vec![])] },
                }),
            ],
        };
        let result = serialize(&data, &set, &Map::new(), &schema);
        let map = result.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("perimeter").unwrap(), &Value::from(serde_json::json!(31)));
        assert_eq!(map.get("radius").unwrap(), &Value::from(serde_json::json!(5)));
        assert!(!map.contains_key("side"));
    }
}
