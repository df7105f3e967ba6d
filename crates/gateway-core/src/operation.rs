//! The validated operation tree the planner compiles: fields, inline
//! fragments, and named fragment spreads. The operation is assumed
//! pre-validated against the merged schema (query validation is out of
//! scope, §1 Non-goals).

use std::collections::HashMap;

use gateway_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn keyword(self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Directive {
    pub name: String,
    pub arguments: HashMap<String, Value>,
}

#[derive(Clone, Debug, Default)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
}

impl SelectionSet {
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

#[derive(Clone, Debug)]
pub enum Selection {
    Field(Field),
    InlineFragment(InlineFragment),
    FragmentSpread(FragmentSpread),
}

#[derive(Clone, Debug)]
pub struct Field {
    pub alias: String,
    pub name: String,
    pub arguments: HashMap<String, Value>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

impl Field {
    pub fn response_key(&self) -> &str {
        &self.alias
    }

    pub fn is_typename(&self) -> bool {
        self.name == "__typename"
    }
}

#[derive(Clone, Debug)]
pub struct InlineFragment {
    /// `None` for a fragment with no type condition (applies to the
    /// enclosing type as-is).
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Clone, Debug)]
pub struct FragmentSpread {
    pub fragment_name: String,
    pub directives: Vec<Directive>,
}

#[derive(Clone, Debug)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub selection_set: SelectionSet,
}

#[derive(Clone, Debug)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub selection_set: SelectionSet,
    pub fragments: HashMap<String, FragmentDefinition>,
    pub variables: HashMap<String, Value>,
}

impl Operation {
    pub fn root_type_name<'a>(&self, query_type: &'a str, mutation_type: Option<&'a str>) -> &'a str {
        match self.kind {
            OperationKind::Query => query_type,
            OperationKind::Mutation => mutation_type.unwrap_or(query_type),
        }
    }
}
