//! The selection rewriter (§4.1): resolves `@skip`/`@include` against
//! variables and strips the directives from what's retained, recognizes a
//! top-level introspection request, and otherwise leaves the operation's
//! shape untouched so later stages can still pattern-match on fragments.

use gateway_json::Value;

use crate::error::GatewayError;
use crate::operation::{Directive, Field, Operation, Selection, SelectionSet};

/// Fields whose presence at the operation root routes to the internal
/// introspection resolver instead of the planner (§4.1).
pub const INTROSPECTION_ROOT_FIELDS: [&str; 2] = ["__schema", "__type"];

pub fn rewrite(operation: &Operation) -> Result<Operation, GatewayError> {
    let mut rewritten = operation.clone();
    rewritten.selection_set = rewrite_selection_set(&operation.selection_set, &operation.variables)?;
    for fragment in rewritten.fragments.values_mut() {
        fragment.selection_set = rewrite_selection_set(&fragment.selection_set, &operation.variables)?;
    }
    Ok(rewritten)
}

/// Whether the (already-rewritten) operation is a bare introspection
/// request: every top-level selection is `__schema`, `__type`, or
/// `__typename`.
pub fn is_introspection_only(selection_set: &SelectionSet) -> bool {
    !selection_set.is_empty()
        && selection_set.selections.iter().all(|s| match s {
            Selection::Field(f) => INTROSPECTION_ROOT_FIELDS.contains(&f.name.as_str()) || f.name == "__typename",
            _ => false,
        })
}

fn rewrite_selection_set(set: &SelectionSet, variables: &std::collections::HashMap<String, Value>) -> Result<SelectionSet, GatewayError> {
    let mut out = Vec::with_capacity(set.selections.len());
    for selection in &set.selections {
        if let Some(rewritten) = rewrite_selection(selection, variables)? {
            out.push(rewritten);
        }
    }
    Ok(SelectionSet { selections: out })
}

fn rewrite_selection(
    selection: &Selection,
    variables: &std::collections::HashMap<String, Value>,
) -> Result<Option<Selection>, GatewayError> {
    let (directives, included) = match selection {
        Selection::Field(f) => (&f.directives, true),
        Selection::InlineFragment(f) => (&f.directives, true),
        Selection::FragmentSpread(f) => (&f.directives, true),
    };
    let _ = included;
    if !resolve_directives(directives, variables)? {
        return Ok(None);
    }

    Ok(Some(match selection {
        Selection::Field(f) => Selection::Field(Field {
            alias: f.alias.clone(),
            name: f.name.clone(),
            arguments: resolve_arguments(&f.arguments, variables),
            directives: Vec::new(),
            selection_set: rewrite_selection_set(&f.selection_set, variables)?,
        }),
        Selection::InlineFragment(f) => Selection::InlineFragment(crate::operation::InlineFragment {
            type_condition: f.type_condition.clone(),
            directives: Vec::new(),
            selection_set: rewrite_selection_set(&f.selection_set, variables)?,
        }),
        Selection::FragmentSpread(f) => Selection::FragmentSpread(crate::operation::FragmentSpread {
            fragment_name: f.fragment_name.clone(),
            directives: Vec::new(),
        }),
    }))
}

/// Evaluates `@skip(if:)`/`@include(if:)` against `variables`. Returns
/// whether the selection is retained.
fn resolve_directives(directives: &[Directive], variables: &std::collections::HashMap<String, Value>) -> Result<bool, GatewayError> {
    let mut retained = true;
    for directive in directives {
        let retained_by_this = match directive.name.as_str() {
            "skip" => !resolve_if_argument(directive, variables)?,
            "include" => resolve_if_argument(directive, variables)?,
            _ => true,
        };
        retained &= retained_by_this;
    }
    Ok(retained)
}

fn resolve_if_argument(directive: &Directive, variables: &std::collections::HashMap<String, Value>) -> Result<bool, GatewayError> {
    let raw = directive.arguments.get("if").ok_or_else(|| {
        GatewayError::Planner(format!("@{} is missing its required `if` argument", directive.name))
    })?;
    match resolve_value(raw, variables) {
        Value::Bool(b) => Ok(b),
        other => Err(GatewayError::Planner(format!(
            "@{} `if` argument must be a boolean, got {}",
            directive.name,
            other.type_name()
        ))),
    }
}

/// Variable references are represented in `arguments` maps as
/// `Value::String` values prefixed with `$`, matching how the planner's
/// document formatter re-emits literal argument values (§4.3, §4.4). This
/// substitution happens once here, so every later stage — planner, boundary
/// resolver, document formatter — only ever sees concrete literals.
fn resolve_value(value: &Value, variables: &std::collections::HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => match s.strip_prefix('$') {
            Some(var_name) => variables.get(var_name).cloned().unwrap_or(Value::Null),
            None => value.clone(),
        },
        Value::List(items) => Value::List(items.iter().map(|v| resolve_value(v, variables)).collect()),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), resolve_value(v, variables))).collect()),
        other => other.clone(),
    }
}

fn resolve_arguments(
    arguments: &std::collections::HashMap<String, Value>,
    variables: &std::collections::HashMap<String, Value>,
) -> std::collections::HashMap<String, Value> {
    arguments.iter().map(|(k, v)| (k.clone(), resolve_value(v, variables))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Directive, Field};
    use std::collections::HashMap;

    fn field(name: &str, directives: Vec<Directive>) -> Selection {
        Selection::Field(Field {
            alias: name.to_string(),
            name: name.to_string(),
            arguments: HashMap::new(),
            directives,
            selection_set: SelectionSet::default(),
        })
    }

    #[test]
    fn skip_true_drops_the_field() {
        let mut args = HashMap::new();
        args.insert("if".to_string(), Value::Bool(true));
        let set = SelectionSet {
            selections: vec![field("a", vec![Directive { name: "skip".into(), arguments: args }])],
        };
        let out = rewrite_selection_set(&set, &HashMap::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn include_false_drops_the_field() {
        let mut args = HashMap::new();
        args.insert("if".to_string(), Value::Bool(false));
        let set = SelectionSet {
            selections: vec![field("a", vec![Directive { name: "include".into(), arguments: args }])],
        };
        let out = rewrite_selection_set(&set, &HashMap::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn missing_if_argument_is_a_planner_error() {
        let set = SelectionSet {
            selections: vec![field("a", vec![Directive { name: "skip".into(), arguments: HashMap::new() }])],
        };
        let err = rewrite_selection_set(&set, &HashMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::Planner(_)));
    }

    #[test]
    fn directives_are_stripped_from_retained_selections() {
        let mut args = HashMap::new();
        args.insert("if".to_string(), Value::Bool(false));
        let set = SelectionSet {
            selections: vec![field("a", vec![Directive { name: "skip".into(), arguments: args }])],
        };
        let out = rewrite_selection_set(&set, &HashMap::new()).unwrap();
        let Selection::Field(f) = &out.selections[0] else { panic!() };
        assert!(f.directives.is_empty());
    }

    #[test]
    fn variable_driven_skip() {
        let mut args = HashMap::new();
        args.insert("if".to_string(), Value::String("$shouldSkip".to_string()));
        let set = SelectionSet {
            selections: vec![field("a", vec![Directive { name: "skip".into(), arguments: args }])],
        };
        let mut variables = HashMap::new();
        variables.insert("shouldSkip".to_string(), Value::Bool(true));
        let out = rewrite_selection_set(&set, &variables).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn field_arguments_substitute_variable_references() {
        let mut args = HashMap::new();
        args.insert("id".to_string(), Value::String("$gizmoId".to_string()));
        let set = SelectionSet {
            selections: vec![Selection::Field(Field {
                alias: "gizmo".into(),
                name: "gizmo".into(),
                arguments: args,
                directives: Vec::new(),
                selection_set: SelectionSet::default(),
            })],
        };
        let mut variables = HashMap::new();
        variables.insert("gizmoId".to_string(), Value::String("abc".to_string()));
        let out = rewrite_selection_set(&set, &variables).unwrap();
        let Selection::Field(f) = &out.selections[0] else { panic!() };
        assert_eq!(f.arguments.get("id"), Some(&Value::String("abc".to_string())));
    }

    #[test]
    fn introspection_root_is_recognized() {
        let set = SelectionSet { selections: vec![field("__schema", vec![])] };
        assert!(is_introspection_only(&set));
        let set2 = SelectionSet { selections: vec![field("gizmos", vec![])] };
        assert!(!is_introspection_only(&set2));
    }
}
