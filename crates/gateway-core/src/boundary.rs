//! The boundary resolver (§4.5): builds batched boundary lookup documents
//! for a child step, and extracts/dedupes boundary ids out of a parent
//! step's data.

use gateway_json::{PathElement, Value};

use crate::document::format_selection_set;
use crate::error::GatewayError;
use crate::planner::Step;
use crate::schema::{BoundaryFieldInfo, BOUNDARY_ID_ALIAS};

/// One document to send to a boundary field, with the alias → id(s) it was
/// built from so the executor can reassociate the response.
pub struct BoundaryDocument {
    pub query: String,
    /// For the array-argument shape, the full ordered id list (single
    /// document, single `_result` alias). For the scalar-argument shape,
    /// the ids batched into *this* document, in `_N` alias order.
    pub ids: Vec<String>,
    pub array_argument: bool,
    /// The alias counter value of this document's first id (0 for the
    /// array-argument shape's `_result`), so the executor can read back
    /// `_{alias_offset}..` without recomputing the batching.
    pub alias_offset: usize,
}

/// Walks `data` at `insertion_path`, collecting every boundary object's
/// `_bramble_id`, then dedupes preserving first-seen order (§4.5, §9 open
/// question iii: dedupe keeps first-seen order rather than sorting).
pub fn extract_boundary_ids(data: &mut Value, insertion_path: &[PathElement]) -> Result<Vec<String>, GatewayError> {
    let mut ids = Vec::new();
    data.for_each_at_path(insertion_path, &mut |node| {
        if let Some(obj) = node.as_object() {
            if let Some(Value::String(id)) = obj.get(BOUNDARY_ID_ALIAS) {
                ids.push(id.clone());
            }
        }
        Ok(())
    })?;
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
    Ok(ids)
}

/// Builds the boundary lookup document(s) for `step` given the deduped ids
/// extracted from its parent's data (§4.5).
pub fn build_documents(step: &Step, ids: &[String], batch_size: usize) -> Result<Vec<BoundaryDocument>, GatewayError> {
    let lookup = step
        .boundary_lookup
        .as_ref()
        .ok_or_else(|| GatewayError::Planner("boundary document requested for a step with no boundary lookup".into()))?;

    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let inner = format_selection_set(&step.selection_set);

    if lookup.array_argument {
        let args = quote_ids(ids);
        let query = format!(
            "query {{ _result: {field}({arg}: [{args}]) {{ {inner} }} }}",
            field = lookup.field_name,
            arg = lookup.argument_name,
        );
        return Ok(vec![BoundaryDocument { query, ids: ids.to_vec(), array_argument: true, alias_offset: 0 }]);
    }

    let batch_size = batch_size.max(1);
    let mut documents = Vec::new();
    for (batch_index, chunk) in ids.chunks(batch_size).enumerate() {
        let base_alias_index = batch_index * batch_size;
        let mut calls = String::new();
        for (i, id) in chunk.iter().enumerate() {
            if i > 0 {
                calls.push(' ');
            }
            calls.push_str(&format!(
                "_{alias}: {field}({arg}: {id:?}) {{ {inner} }}",
                alias = base_alias_index + i,
                field = lookup.field_name,
                arg = lookup.argument_name,
                id = id,
                inner = inner,
            ));
        }
        documents.push(BoundaryDocument {
            query: format!("query {{ {calls} }}"),
            ids: chunk.to_vec(),
            array_argument: false,
            alias_offset: base_alias_index,
        });
    }
    Ok(documents)
}

fn quote_ids(ids: &[String]) -> String {
    ids.iter().map(|id| format!("{id:?}")).collect::<Vec<_>>().join(", ")
}
