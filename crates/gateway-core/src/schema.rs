//! The federated schema and the two derived lookup tables the planner and
//! boundary resolver consume: the field-location map and the boundary map.
//!
//! Schema construction (fetching, merging, validating subgraph SDLs) is an
//! external collaborator's job; this module only holds the already-merged,
//! immutable result and the indices built over it.

use std::collections::HashMap;

use indexmap::IndexMap;

/// A type's declared shape: nullability and list nesting, down to a named
/// leaf type. Mirrors how the original operation's fields are typed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Named { name: String, non_null: bool },
    List { of: Box<TypeRef>, non_null: bool },
}

impl TypeRef {
    pub fn named(name: impl Into<String>, non_null: bool) -> Self {
        TypeRef::Named { name: name.into(), non_null }
    }

    pub fn list_of(inner: TypeRef, non_null: bool) -> Self {
        TypeRef::List { of: Box::new(inner), non_null }
    }

    pub fn is_non_null(&self) -> bool {
        match self {
            TypeRef::Named { non_null, .. } => *non_null,
            TypeRef::List { non_null, .. } => *non_null,
        }
    }

    pub fn inner_name(&self) -> &str {
        match self {
            TypeRef::Named { name, .. } => name,
            TypeRef::List { of, .. } => of.inner_name(),
        }
    }

    /// Peels one list layer off, for descending into a single element.
    pub fn element_type(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::List { of, .. } => Some(of),
            TypeRef::Named { .. } => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, TypeRef::List { .. })
    }
}

#[derive(Clone, Debug)]
pub struct FieldDefinition {
    pub name: String,
    pub arguments: Vec<String>,
    pub field_type: TypeRef,
}

#[derive(Clone, Debug, Default)]
pub struct ObjectType {
    pub name: String,
    pub fields: IndexMap<String, FieldDefinition>,
    /// Types this object implements, for interface/union recursion (§4.3.5).
    pub implements: Vec<String>,
    /// Set for `Query`/`Mutation`/namespace types: fields here are never
    /// owned by a single service directly, they fan out per-service.
    pub is_namespace: bool,
}

#[derive(Clone, Debug, Default)]
pub struct InterfaceOrUnionType {
    pub name: String,
    pub possible_types: Vec<String>,
    /// Empty for unions; populated for interfaces (fields common to all
    /// implementors, used when a selection is made directly on the
    /// interface rather than through an inline fragment).
    pub fields: IndexMap<String, FieldDefinition>,
}

#[derive(Clone, Debug)]
pub enum TypeDefinition {
    Object(ObjectType),
    InterfaceOrUnion(InterfaceOrUnionType),
    Scalar(String),
    Enum(String),
}

impl TypeDefinition {
    pub fn name(&self) -> &str {
        match self {
            TypeDefinition::Object(o) => &o.name,
            TypeDefinition::InterfaceOrUnion(u) => &u.name,
            TypeDefinition::Scalar(n) | TypeDefinition::Enum(n) => n,
        }
    }
}

/// The merged, federation-wide schema.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    pub types: IndexMap<String, TypeDefinition>,
    pub query_type: String,
    pub mutation_type: Option<String>,
}

impl Schema {
    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        match self.types.get(name) {
            Some(TypeDefinition::Object(o)) => Some(o),
            _ => None,
        }
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        if field_name == "__typename" {
            return None;
        }
        match self.types.get(type_name) {
            Some(TypeDefinition::Object(o)) => o.fields.get(field_name),
            Some(TypeDefinition::InterfaceOrUnion(u)) => u.fields.get(field_name),
            _ => None,
        }
    }

    /// Possible concrete object types a selection on `type_name` could
    /// observe at runtime (itself, for an object type).
    pub fn possible_types(&self, type_name: &str) -> Vec<String> {
        match self.types.get(type_name) {
            Some(TypeDefinition::Object(o)) => vec![o.name.clone()],
            Some(TypeDefinition::InterfaceOrUnion(u)) => u.possible_types.clone(),
            _ => vec![],
        }
    }

    /// Whether a fragment's type condition applies against an observed
    /// runtime typename: equal outright, or either side is an
    /// interface/union whose `possible_types` names the other (a fragment on
    /// a concrete member, or on the interface/union itself). Shared by the
    /// planner's fragment flattening and the serializer/bubbler's own
    /// typename-gated fragment walks, so all three agree on applicability.
    pub fn fragment_applies(&self, type_condition: Option<&str>, observed_typename: Option<&str>) -> bool {
        match (type_condition, observed_typename) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(condition), Some(observed)) if condition == observed => true,
            (Some(condition), Some(observed)) => {
                self.possible_types(condition).iter().any(|t| t == observed) || self.possible_types(observed).iter().any(|t| t == condition)
            }
        }
    }
}

/// Sentinel service URL for steps resolved purely locally (namespace
/// scaffolding, `__typename` under a namespace with no owning service).
pub const INTERNAL_SERVICE: &str = "__internal__";

/// type name + field name → owning service URL, or `None` when the field is
/// a namespace synthetic with no single owner.
#[derive(Clone, Debug, Default)]
pub struct FieldLocationMap {
    locations: HashMap<(String, String), Vec<String>>,
}

impl FieldLocationMap {
    pub fn insert(&mut self, type_name: impl Into<String>, field_name: impl Into<String>, service_url: impl Into<String>) {
        self.locations
            .entry((type_name.into(), field_name.into()))
            .or_default()
            .push(service_url.into());
    }

    /// All services that can resolve this field. Empty means "no single
    /// owner" (namespace synthetic).
    pub fn services_for(&self, type_name: &str, field_name: &str) -> &[String] {
        self.locations
            .get(&(type_name.to_string(), field_name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// The lookup field a backend exposes for a boundary type: its name, its
/// argument name, and whether that argument takes a list of ids.
#[derive(Clone, Debug)]
pub struct BoundaryFieldInfo {
    pub field_name: String,
    pub argument_name: String,
    pub array_argument: bool,
}

/// type name → whether it's a boundary object, plus per-(service, type) the
/// lookup field to use.
#[derive(Clone, Debug, Default)]
pub struct BoundaryMap {
    boundary_types: std::collections::HashSet<String>,
    fields: HashMap<(String, String), BoundaryFieldInfo>,
}

impl BoundaryMap {
    pub fn mark_boundary(&mut self, type_name: impl Into<String>) {
        self.boundary_types.insert(type_name.into());
    }

    pub fn is_boundary(&self, type_name: &str) -> bool {
        self.boundary_types.contains(type_name)
    }

    pub fn insert_lookup(
        &mut self,
        service_url: impl Into<String>,
        type_name: impl Into<String>,
        info: BoundaryFieldInfo,
    ) {
        self.fields.insert((service_url.into(), type_name.into()), info);
    }

    pub fn lookup(&self, service_url: &str, type_name: &str) -> Option<&BoundaryFieldInfo> {
        self.fields.get(&(service_url.to_string(), type_name.to_string()))
    }
}

/// The boundary probe aliases injected into every boundary-object selection
/// (§3, §4.3 step 3).
pub const BOUNDARY_ID_ALIAS: &str = "_bramble_id";
pub const BOUNDARY_TYPENAME_ALIAS: &str = "_bramble__typename";
