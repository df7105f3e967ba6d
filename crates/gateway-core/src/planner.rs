//! The planner (§4.3): compiles a rewritten operation into a tree of
//! per-service [`Step`]s.
//!
//! Grounded on this codebase's query-plan fetch node (`service_name`,
//! `operation`, `operation_kind` on a `FetchNode`) generalized here to a
//! field-location-map driven split rather than a full query-graph search,
//! since the federated schema this gateway serves declares ownership
//! directly rather than needing satisfiability analysis.

use std::collections::HashMap;

use gateway_json::Path;

use crate::error::GatewayError;
use crate::operation::{Field, FragmentDefinition, Operation, OperationKind, Selection, SelectionSet};
use crate::schema::{BoundaryFieldInfo, BoundaryMap, FieldLocationMap, Schema, BOUNDARY_ID_ALIAS, BOUNDARY_TYPENAME_ALIAS, INTERNAL_SERVICE};

/// One node of the query plan: a selection to run against a single service.
#[derive(Clone, Debug)]
pub struct Step {
    pub service_url: String,
    pub parent_type: String,
    pub selection_set: SelectionSet,
    pub insertion_point: Path,
    pub then: Vec<Step>,
    /// Present on every non-root step: how to address `parent_type` as a
    /// boundary lookup on `service_url` (§4.5).
    pub boundary_lookup: Option<BoundaryFieldInfo>,
}

impl Step {
    pub fn is_root(&self) -> bool {
        self.insertion_point.is_empty()
    }

    pub fn is_internal(&self) -> bool {
        self.service_url == INTERNAL_SERVICE
    }
}

#[derive(Clone, Debug)]
pub struct Plan {
    pub kind: OperationKind,
    pub root_type: String,
    pub root_steps: Vec<Step>,
}

struct PlanCtx<'a> {
    schema: &'a Schema,
    locations: &'a FieldLocationMap,
    boundaries: &'a BoundaryMap,
    fragments: &'a HashMap<String, FragmentDefinition>,
}

pub fn plan(operation: &Operation, schema: &Schema, locations: &FieldLocationMap, boundaries: &BoundaryMap) -> Result<Plan, GatewayError> {
    let root_type = match operation.kind {
        OperationKind::Query => schema.query_type.clone(),
        OperationKind::Mutation => schema
            .mutation_type
            .clone()
            .ok_or_else(|| GatewayError::Planner("operation is a mutation but the schema has no Mutation type".into()))?,
    };
    let ctx = PlanCtx { schema, locations, boundaries, fragments: &operation.fragments };
    let sequential = operation.kind == OperationKind::Mutation;
    let root_steps = plan_root(&ctx, &root_type, &operation.selection_set, &Path::empty(), sequential)?;
    Ok(Plan { kind: operation.kind, root_type, root_steps })
}

/// Partitions a type's top-level selection by owning service, building one
/// step per service (§4.3 steps 1, 2, 6).
///
/// `base` is the insertion point these steps graft at: empty for the true
/// operation root, or `[namespace_alias]` when recursing into a namespace
/// field's own selection (step 6).
///
/// `sequential` is set for mutations: top-level fields must keep their
/// textual order and must not interleave (§4.3 step 4, §5). Rather than
/// grouping same-service fields into one batched step regardless of
/// position — which would let a later field race ahead of an
/// intervening different-service field — each field gets its own step,
/// emitted in encounter order; the executor then runs `root_steps` one at a
/// time. For queries, fields are grouped by service (order across services
/// is unconstrained) to minimize the number of outbound requests.
fn plan_root(
    ctx: &PlanCtx,
    type_name: &str,
    selection_set: &SelectionSet,
    base: &Path,
    sequential: bool,
) -> Result<Vec<Step>, GatewayError> {
    let flattened = flatten_selections(ctx, type_name, selection_set)?;

    if sequential {
        return plan_root_sequential(ctx, type_name, flattened, base);
    }

    let mut internal_fields: Vec<Field> = Vec::new();
    let mut by_service: indexmap::IndexMap<String, Vec<Field>> = indexmap::IndexMap::new();
    let mut namespace_steps: Vec<Step> = Vec::new();

    for field in flattened {
        if field.is_typename() {
            internal_fields.push(field);
            continue;
        }
        if let Some(namespace_object) = namespace_target(ctx, type_name, &field)? {
            let inner_base = base.join(field.alias.clone());
            let mut inner_steps = plan_root(ctx, &namespace_object, &field.selection_set, &inner_base, false)?;
            namespace_steps.append(&mut inner_steps);
            continue;
        }
        let owners = resolve_services(ctx, type_name, &field.name);
        if owners.is_empty() {
            return Err(GatewayError::Planner(format!(
                "field `{}` on type `{}` has no owning service",
                field.name, type_name
            )));
        }
        let chosen = owners[0].clone();
        by_service.entry(chosen).or_default().push(field);
    }

    let mut steps = Vec::new();
    for (service, fields) in by_service {
        let selection_set = SelectionSet { selections: fields.into_iter().map(Selection::Field).collect() };
        let mut children = Vec::new();
        let own_selection = build_step_selection(ctx, &service, type_name, &selection_set, base, &Path::empty(), &mut children)?;
        steps.push(Step {
            service_url: service,
            parent_type: type_name.to_string(),
            selection_set: own_selection,
            insertion_point: base.clone(),
            then: children,
            boundary_lookup: None,
        });
    }
    if !internal_fields.is_empty() {
        steps.push(Step {
            service_url: INTERNAL_SERVICE.to_string(),
            parent_type: type_name.to_string(),
            selection_set: SelectionSet { selections: internal_fields.into_iter().map(Selection::Field).collect() },
            insertion_point: base.clone(),
            then: Vec::new(),
            boundary_lookup: None,
        });
    }
    steps.extend(namespace_steps);
    Ok(steps)
}

fn plan_root_sequential(ctx: &PlanCtx, type_name: &str, fields: Vec<Field>, base: &Path) -> Result<Vec<Step>, GatewayError> {
    let mut steps = Vec::new();
    for field in fields {
        if field.is_typename() {
            steps.push(Step {
                service_url: INTERNAL_SERVICE.to_string(),
                parent_type: type_name.to_string(),
                selection_set: SelectionSet { selections: vec![Selection::Field(field)] },
                insertion_point: base.clone(),
                then: Vec::new(),
                boundary_lookup: None,
            });
            continue;
        }
        if let Some(namespace_object) = namespace_target(ctx, type_name, &field)? {
            let inner_base = base.join(field.alias.clone());
            let inner_flattened = flatten_selections(ctx, &namespace_object, &field.selection_set)?;
            steps.extend(plan_root_sequential(ctx, &namespace_object, inner_flattened, &inner_base)?);
            continue;
        }
        let owners = resolve_services(ctx, type_name, &field.name);
        if owners.is_empty() {
            return Err(GatewayError::Planner(format!(
                "field `{}` on type `{}` has no owning service",
                field.name, type_name
            )));
        }
        let service = owners[0].clone();
        let selection_set = SelectionSet { selections: vec![Selection::Field(field)] };
        let mut children = Vec::new();
        let own_selection = build_step_selection(ctx, &service, type_name, &selection_set, base, &Path::empty(), &mut children)?;
        steps.push(Step {
            service_url: service,
            parent_type: type_name.to_string(),
            selection_set: own_selection,
            insertion_point: base.clone(),
            then: children,
            boundary_lookup: None,
        });
    }
    Ok(steps)
}

/// Returns the namespace object type a root field targets, if any (§4.3
/// step 6): a field with no single owning service whose return type is
/// itself marked as a namespace.
fn namespace_target(ctx: &PlanCtx, type_name: &str, field: &Field) -> Result<Option<String>, GatewayError> {
    let return_type_name = field_return_type_name(ctx, type_name, &field.name)?;
    Ok(ctx
        .schema
        .object(&return_type_name)
        .filter(|o| o.is_namespace)
        .map(|o| o.name.clone()))
}

/// Builds the selection to keep on `service` for `parent_type`, recursing
/// through fields that remain on `service` and terminating at boundary
/// crossings with a new child [`Step`] pushed into `children` (§4.3 step 3).
fn build_step_selection(
    ctx: &PlanCtx,
    service: &str,
    parent_type: &str,
    selection_set: &SelectionSet,
    base_insertion_point: &Path,
    local_path: &Path,
    children: &mut Vec<Step>,
) -> Result<SelectionSet, GatewayError> {
    let flattened = flatten_selections(ctx, parent_type, selection_set)?;
    let mut out = Vec::with_capacity(flattened.len());

    for field in flattened {
        if field.is_typename() {
            out.push(Selection::Field(field));
            continue;
        }

        let (owning_type, field_def) = resolve_field(ctx, parent_type, &field.name)
            .ok_or_else(|| GatewayError::Planner(format!("unknown field `{}` on type `{}`", field.name, parent_type)))?;
        let field_def = field_def.clone();
        let return_type_name = field_def.field_type.inner_name().to_string();
        let owners = resolve_services(ctx, &owning_type, &field.name);
        if owners.is_empty() {
            return Err(GatewayError::Planner(format!(
                "field `{}` on type `{}` has no owning service",
                field.name, parent_type
            )));
        }
        // Prefer the service already serving the enclosing step, to
        // minimize boundary crossings (§4.3 "Ordering and tie-breaks").
        let chosen = owners.iter().find(|s| s.as_str() == service).cloned().unwrap_or_else(|| owners[0].clone());

        if chosen == service {
            let next_local_path = local_path.join(field.alias.clone());
            let child_selection_set = if field.selection_set.is_empty() {
                field.selection_set.clone()
            } else {
                build_step_selection(
                    ctx,
                    service,
                    &return_type_name,
                    &field.selection_set,
                    base_insertion_point,
                    &next_local_path,
                    children,
                )?
            };
            out.push(Selection::Field(Field { selection_set: child_selection_set, ..field }));
            continue;
        }

        // Boundary crossing: the field's return type must be a declared
        // boundary object (§4.3 step 3).
        if !ctx.boundaries.is_boundary(&return_type_name) {
            return Err(GatewayError::Planner(format!(
                "field `{}` on type `{}` is owned by `{}`, a different service than its parent (`{}`), but `{}` is not a boundary type",
                field.name, parent_type, chosen, service, return_type_name
            )));
        }
        let lookup = ctx
            .boundaries
            .lookup(&chosen, &return_type_name)
            .cloned()
            .ok_or_else(|| GatewayError::Planner(format!("no boundary lookup field declared for `{return_type_name}` on `{chosen}`")))?;

        let probe_selection = SelectionSet {
            selections: vec![
                Selection::Field(id_probe_field()),
                Selection::Field(typename_probe_field()),
            ],
        };
        out.push(Selection::Field(Field {
            selection_set: probe_selection,
            arguments: field.arguments.clone(),
            directives: Vec::new(),
            alias: field.alias.clone(),
            name: field.name.clone(),
        }));

        let child_insertion_point = base_insertion_point.extend(local_path).join(field.alias.clone());
        let mut grandchildren = Vec::new();
        let mut child_own_selection = build_step_selection(
            ctx,
            &chosen,
            &return_type_name,
            &field.selection_set,
            &child_insertion_point,
            &Path::empty(),
            &mut grandchildren,
        )?;
        // The merger matches a boundary lookup's resolved objects back onto
        // the base tree by `(_bramble__typename, _bramble_id)` rather than
        // by response position (§4.6 rule 3, §9 open question ii), so the
        // lookup's own document needs these probes on itself too, not just
        // on the crossing field's stub in the parent step.
        child_own_selection.selections.push(Selection::Field(id_probe_field()));
        child_own_selection.selections.push(Selection::Field(typename_probe_field()));
        children.push(Step {
            service_url: chosen,
            parent_type: return_type_name,
            selection_set: child_own_selection,
            insertion_point: child_insertion_point,
            then: grandchildren,
            boundary_lookup: Some(lookup),
        });
    }

    // When the pre-flattened selection carried a fragment with a type
    // condition, the serializer's union-and-trim pass (§4.8) needs the
    // object's concrete type to decide which fragment applies. Request it
    // under the same probe alias used for boundary joins, rather than
    // introducing a second typename convention.
    if contains_fragment(selection_set) && !out.iter().any(|s| matches!(s, Selection::Field(f) if f.alias == BOUNDARY_TYPENAME_ALIAS)) {
        out.push(Selection::Field(typename_probe_field()));
    }

    Ok(SelectionSet { selections: out })
}

fn contains_fragment(selection_set: &SelectionSet) -> bool {
    selection_set.selections.iter().any(|s| matches!(s, Selection::InlineFragment(_) | Selection::FragmentSpread(_)))
}

/// Flattens inline fragments and named-fragment spreads whose type
/// condition matches `type_name` (or an interface/union `type_name`
/// implements) into a single list of fields (§4.3 step 5). Inline fragments
/// on a *different*, non-boundary type owned entirely by one service are
/// still recursed into as if selecting at the fragment's own type — callers
/// that need fragment-shape preserved for cross-service interface/union
/// selections should consult [`Selection::InlineFragment`] directly; the
/// planner only ever needs the flattened field list to decide ownership.
fn flatten_selections(ctx: &PlanCtx, type_name: &str, selection_set: &SelectionSet) -> Result<Vec<Field>, GatewayError> {
    let mut out = Vec::new();
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(f) => out.push(f.clone()),
            Selection::InlineFragment(frag) => {
                if applies_to(ctx, type_name, frag.type_condition.as_deref()) {
                    out.extend(flatten_selections(ctx, type_name, &frag.selection_set)?);
                }
            }
            Selection::FragmentSpread(spread) => {
                let def = ctx
                    .fragments
                    .get(&spread.fragment_name)
                    .ok_or_else(|| GatewayError::Planner(format!("unknown fragment `{}`", spread.fragment_name)))?;
                if applies_to(ctx, type_name, Some(def.type_condition.as_str())) {
                    out.extend(flatten_selections(ctx, type_name, &def.selection_set)?);
                }
            }
        }
    }
    Ok(out)
}

fn applies_to(ctx: &PlanCtx, type_name: &str, type_condition: Option<&str>) -> bool {
    match type_condition {
        None => true,
        Some(condition) if condition == type_name => true,
        // Two directions both apply: `type_name` implements the fragment's
        // interface/union condition (selecting on a concrete type with a
        // fragment on its interface), or `type_name` is itself the
        // interface/union and `condition` is one of its concrete members
        // (selecting on the abstract type with a fragment narrowing down).
        Some(condition) => {
            ctx.schema.possible_types(condition).iter().any(|t| t == type_name)
                || ctx.schema.possible_types(type_name).iter().any(|t| t == condition)
        }
    }
}

/// Looks up a field's definition and owning type, falling back to each of
/// `type_name`'s concrete member types when `type_name` is itself an
/// interface/union with no field of its own by that name — the shape a
/// flattened fragment on a concrete member leaves behind (§4.3 step 5).
fn resolve_field<'a>(ctx: &'a PlanCtx, type_name: &str, field_name: &str) -> Option<(String, &'a crate::schema::FieldDefinition)> {
    if let Some(def) = ctx.schema.field(type_name, field_name) {
        return Some((type_name.to_string(), def));
    }
    for possible in ctx.schema.possible_types(type_name) {
        if let Some(def) = ctx.schema.field(&possible, field_name) {
            return Some((possible, def));
        }
    }
    None
}

fn field_return_type_name(ctx: &PlanCtx, type_name: &str, field_name: &str) -> Result<String, GatewayError> {
    Ok(resolve_field(ctx, type_name, field_name)
        .ok_or_else(|| GatewayError::Planner(format!("unknown field `{field_name}` on type `{type_name}`")))?
        .1
        .field_type
        .inner_name()
        .to_string())
}

/// Looks up the services owning a field, falling back to each of
/// `type_name`'s concrete member types the same way [`resolve_field`] does.
fn resolve_services<'a>(ctx: &'a PlanCtx, type_name: &str, field_name: &str) -> &'a [String] {
    let direct = ctx.locations.services_for(type_name, field_name);
    if !direct.is_empty() {
        return direct;
    }
    for possible in ctx.schema.possible_types(type_name) {
        let services = ctx.locations.services_for(&possible, field_name);
        if !services.is_empty() {
            return services;
        }
    }
    direct
}

fn id_probe_field() -> Field {
    Field {
        alias: BOUNDARY_ID_ALIAS.to_string(),
        name: "id".to_string(),
        arguments: HashMap::new(),
        directives: Vec::new(),
        selection_set: SelectionSet::default(),
    }
}

fn typename_probe_field() -> Field {
    Field {
        alias: BOUNDARY_TYPENAME_ALIAS.to_string(),
        name: "__typename".to_string(),
        arguments: HashMap::new(),
        directives: Vec::new(),
        selection_set: SelectionSet::default(),
    }
}
