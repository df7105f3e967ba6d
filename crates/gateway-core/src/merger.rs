//! The result merger (§4.6): folds an ordered list of step results into one
//! aggregate data tree.

use std::collections::HashMap;

use gateway_json::{Path, Value};
use indexmap::IndexMap;

use crate::error::GatewayError;
use crate::schema::{BOUNDARY_ID_ALIAS, BOUNDARY_TYPENAME_ALIAS};

/// One step's contribution to the aggregate: where it grafts and what it
/// produced. Root steps carry an empty `insertion_point`; child (boundary)
/// steps carry the non-empty path their parent crossed at, and `data` is the
/// ordered list of resolved boundary objects (still tagged with their probe
/// fields) rather than a tree rooted at the response root.
#[derive(Clone, Debug)]
pub struct MergeInput {
    pub insertion_point: Path,
    pub data: Value,
}

/// Folds `inputs` in order into one aggregate value (§4.6 rule 1).
pub fn merge(inputs: Vec<MergeInput>) -> Result<Value, GatewayError> {
    let mut base = Value::Null;
    for input in inputs {
        merge_one(&mut base, input)?;
    }
    Ok(base)
}

fn merge_one(base: &mut Value, input: MergeInput) -> Result<(), GatewayError> {
    if input.insertion_point.is_empty() {
        if base.is_null() {
            *base = input.data;
        } else {
            base.deep_merge(input.data)?;
        }
        return Ok(());
    }
    graft(base, input.insertion_point.as_slice(), input.data)
}

/// Grafts `source` (a list of resolved boundary objects) onto every node `base`
/// reaches along `path`, matching each target's `_bramble__typename`/
/// `_bramble_id` against the source entry carrying the same pair (§4.6 rule
/// 3). Targets under a null ancestor are skipped entirely (rule 4); deferred
/// fragments along the path are materialized on descent (rule 5, handled by
/// [`Value::for_each_at_path`]).
fn graft(base: &mut Value, path: &[gateway_json::PathElement], source: Value) -> Result<(), GatewayError> {
    let index = boundary_index(source)?;
    base.for_each_at_path(path, &mut |node| {
        let Some(obj) = node.as_object_mut() else {
            return Ok(());
        };
        let key = match (obj.get(BOUNDARY_TYPENAME_ALIAS), obj.get(BOUNDARY_ID_ALIAS)) {
            (Some(Value::String(typename)), Some(Value::String(id))) => (typename.clone(), id.clone()),
            _ => return Ok(()),
        };
        if let Some(source_obj) = index.get(&key) {
            for (field_name, value) in source_obj {
                if field_name != BOUNDARY_ID_ALIAS && field_name != BOUNDARY_TYPENAME_ALIAS {
                    obj.insert(field_name.clone(), value.clone());
                }
            }
        }
        Ok(())
    })?;
    Ok(())
}

/// Indexes a boundary lookup's resolved objects by `(typename, id)` so
/// [`graft`] can match each target node without caring which alias (`_0`,
/// `_result[2]`, …) originally carried it.
fn boundary_index(source: Value) -> Result<HashMap<(String, String), IndexMap<String, Value>>, GatewayError> {
    let mut source = source;
    source.materialize()?;
    let objects: Vec<Value> = match source {
        Value::List(items) => items,
        Value::Object(_) => vec![source],
        Value::Null => Vec::new(),
        other => return Err(GatewayError::Planner(format!("boundary lookup result must be a list or object, got {}", other.type_name()))),
    };
    let mut index = HashMap::with_capacity(objects.len());
    for mut object in objects {
        object.materialize()?;
        let Value::Object(map) = object else { continue };
        let typename = map.get(BOUNDARY_TYPENAME_ALIAS).and_then(Value::as_str).map(str::to_string);
        let id = map.get(BOUNDARY_ID_ALIAS).and_then(Value::as_str).map(str::to_string);
        if let (Some(typename), Some(id)) = (typename, id) {
            index.insert((typename, id), map);
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_json::PathElement;

    fn obj(pairs: Vec<(&str, Value)>) -> Value {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn single_empty_path_result_is_identity() {
        let data = obj(vec![("gizmos", Value::List(vec![]))]);
        let merged = merge(vec![MergeInput { insertion_point: Path::empty(), data: data.clone() }]).unwrap();
        assert_eq!(merged, data);
    }

    #[test]
    fn disjoint_top_level_keys_from_two_root_steps_both_survive() {
        let a = obj(vec![("gizmos", Value::List(vec![]))]);
        let b = obj(vec![("widgets", Value::List(vec![]))]);
        let merged = merge(vec![
            MergeInput { insertion_point: Path::empty(), data: a },
            MergeInput { insertion_point: Path::empty(), data: b },
        ])
        .unwrap();
        let map = merged.as_object().unwrap();
        assert!(map.contains_key("gizmos"));
        assert!(map.contains_key("widgets"));
    }

    #[test]
    fn boundary_result_grafts_by_typename_and_id_regardless_of_alias() {
        let base = obj(vec![(
            "gizmos",
            Value::List(vec![
                obj(vec![("owner", obj(vec![(BOUNDARY_TYPENAME_ALIAS, "Owner".into()), (BOUNDARY_ID_ALIAS, "1".into())]))]),
                obj(vec![("owner", obj(vec![(BOUNDARY_TYPENAME_ALIAS, "Owner".into()), (BOUNDARY_ID_ALIAS, "2".into())]))]),
            ]),
        )]);
        let boundary_data = Value::List(vec![
            obj(vec![(BOUNDARY_TYPENAME_ALIAS, "Owner".into()), (BOUNDARY_ID_ALIAS, "2".into()), ("name", "Bob".into())]),
            obj(vec![(BOUNDARY_TYPENAME_ALIAS, "Owner".into()), (BOUNDARY_ID_ALIAS, "1".into()), ("name", "Alice".into())]),
        ]);
        let path = Path(vec![PathElement::Field("gizmos".into()), PathElement::Field("owner".into())]);
        let merged = merge(vec![
            MergeInput { insertion_point: Path::empty(), data: base },
            MergeInput { insertion_point: path, data: boundary_data },
        ])
        .unwrap();
        let gizmos = merged.as_object().unwrap().get("gizmos").unwrap().as_list().unwrap();
        let owner0 = gizmos[0].as_object().unwrap().get("owner").unwrap().as_object().unwrap();
        assert_eq!(owner0.get("name").unwrap().as_str(), Some("Alice"));
        let owner1 = gizmos[1].as_object().unwrap().get("owner").unwrap().as_object().unwrap();
        assert_eq!(owner1.get("name").unwrap().as_str(), Some("Bob"));
    }

    #[test]
    fn null_ancestor_short_circuits_the_graft() {
        let base = obj(vec![("gizmos", Value::Null)]);
        let path = Path(vec![PathElement::Field("gizmos".into()), PathElement::Field("owner".into())]);
        let boundary_data = Value::List(vec![obj(vec![(BOUNDARY_TYPENAME_ALIAS, "Owner".into()), (BOUNDARY_ID_ALIAS, "1".into())])]);
        let merged = merge(vec![
            MergeInput { insertion_point: Path::empty(), data: base },
            MergeInput { insertion_point: path, data: boundary_data },
        ])
        .unwrap();
        assert_eq!(merged.as_object().unwrap().get("gizmos").unwrap(), &Value::Null);
    }
}
