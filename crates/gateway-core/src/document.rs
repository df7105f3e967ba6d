//! Formats a (sub-)selection set back into GraphQL query text for an
//! outbound subgraph request. Used by the executor to build a root step's
//! document (§4.4 step 1) and by the boundary resolver to build the inner
//! selection of a boundary lookup call (§4.5).

use gateway_json::Value;

use crate::operation::{Field, Selection, SelectionSet};

pub fn format_operation_document(keyword: &str, selection_set: &SelectionSet) -> String {
    format!("{keyword} {{ {} }}", format_selection_set(selection_set))
}

pub fn format_selection_set(selection_set: &SelectionSet) -> String {
    selection_set.selections.iter().map(format_selection).collect::<Vec<_>>().join(" ")
}

fn format_selection(selection: &Selection) -> String {
    match selection {
        Selection::Field(field) => format_field(field),
        Selection::InlineFragment(frag) => match &frag.type_condition {
            Some(condition) => format!("... on {condition} {{ {} }}", format_selection_set(&frag.selection_set)),
            None => format!("... {{ {} }}", format_selection_set(&frag.selection_set)),
        },
        Selection::FragmentSpread(spread) => format!("...{}", spread.fragment_name),
    }
}

fn format_field(field: &Field) -> String {
    let args = format_arguments(field);
    let alias = if field.alias == field.name { String::new() } else { format!("{}: ", field.alias) };
    if field.selection_set.is_empty() {
        format!("{alias}{}{args}", field.name)
    } else {
        format!("{alias}{}{args} {{ {} }}", field.name, format_selection_set(&field.selection_set))
    }
}

fn format_arguments(field: &Field) -> String {
    if field.arguments.is_empty() {
        return String::new();
    }
    // IndexMap is not in use on arguments (they're a plain HashMap), but
    // argument order doesn't affect subgraph semantics — only the literal
    // values do.
    let mut pairs: Vec<_> = field.arguments.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let body = pairs.iter().map(|(name, value)| format!("{name}: {}", format_value(value))).collect::<Vec<_>>().join(", ");
    format!("({body})")
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if let Some(var_name) = s.strip_prefix('$') {
                format!("${var_name}")
            } else {
                format!("{s:?}")
            }
        }
        Value::List(items) => format!("[{}]", items.iter().map(format_value).collect::<Vec<_>>().join(", ")),
        Value::Object(map) => {
            let body = map.iter().map(|(k, v)| format!("{k}: {}", format_value(v))).collect::<Vec<_>>().join(", ");
            format!("{{{body}}}")
        }
        Value::Deferred(_) => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn formats_alias_and_nested_selection() {
        let field = Field {
            alias: "o".into(),
            name: "owner".into(),
            arguments: HashMap::new(),
            directives: Vec::new(),
            selection_set: SelectionSet {
                selections: vec![Selection::Field(Field {
                    alias: "name".into(),
                    name: "name".into(),
                    arguments: HashMap::new(),
                    directives: Vec::new(),
                    selection_set: SelectionSet::default(),
                })],
            },
        };
        assert_eq!(format_field(&field), "o: owner { name }");
    }

    #[test]
    fn formats_string_argument_as_quoted_literal() {
        let mut args = HashMap::new();
        args.insert("id".to_string(), Value::String("X".to_string()));
        let field = Field { alias: "getOwner".into(), name: "getOwner".into(), arguments: args, directives: Vec::new(), selection_set: SelectionSet::default() };
        assert_eq!(format_field(&field), r#"getOwner(id: "X")"#);
    }

    #[test]
    fn formats_variable_reference_without_quoting() {
        let mut args = HashMap::new();
        args.insert("id".to_string(), Value::String("$gizmoId".to_string()));
        let field = Field { alias: "gizmo".into(), name: "gizmo".into(), arguments: args, directives: Vec::new(), selection_set: SelectionSet::default() };
        assert_eq!(format_field(&field), "gizmo(id: $gizmoId)");
    }
}
