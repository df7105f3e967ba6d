//! The executor (§4.4): runs a [`Plan`]'s step tree under structured
//! concurrency, dispatching child steps as their parent's data becomes
//! available, and folds everything into the merger's input list.
//!
//! Grounded on this codebase's per-request task-group execution model
//! (fan out root fetch nodes, cancel siblings on a fatal error), generalized
//! here to a recursive step tree driven by a field-location/boundary map
//! rather than a pre-resolved fetch-node DAG.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use gateway_json::{Path, PathElement, Value};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::boundary::{self, BoundaryDocument};
use crate::client::{ServiceClient, ServiceRequest};
use crate::config::ExecutorConfig;
use crate::document::format_operation_document;
use crate::error::{GatewayError, TypedError};
use crate::merger::MergeInput;
use crate::operation::OperationKind;
use crate::planner::{Plan, Step};

/// Per-request ambient state: identity, deadline, and debug gating.
/// Schema/service credentials live outside the core (§1 Non-goals); this
/// only carries what the executor itself consults.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub trace_id: uuid::Uuid,
    pub deadline: Option<Duration>,
    pub debug: bool,
}

impl Default for RequestContext {
    fn default() -> Self {
        RequestContext { trace_id: uuid::Uuid::new_v4(), deadline: None, debug: false }
    }
}

/// The executor's final output before serialization: the merged data (if
/// any survived) and every error collected along the way.
pub struct ExecutionOutcome {
    pub data: Option<Value>,
    pub errors: Vec<TypedError>,
}

struct StepOutcome {
    insertion_point: Path,
    data: Value,
    errors: Vec<TypedError>,
}

/// Runs `plan` to completion and merges the results (§4.4, §4.6). A
/// configured deadline races the whole dispatch: on expiry, every in-flight
/// task is dropped (the `JoinSet`'s own `Drop` aborts its members) and
/// whatever partial results already reached `tx` are discarded in favor of a
/// single request-level cancellation error, per §5/§7 class 8.
#[tracing::instrument(name = "request", skip_all, fields(trace_id = %ctx.trace_id))]
pub async fn execute(plan: Plan, ctx: &RequestContext, client: Arc<dyn ServiceClient>, config: ExecutorConfig) -> ExecutionOutcome {
    let budget = Arc::new(AtomicU32::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel::<StepOutcome>();
    let keyword = plan.kind.keyword();

    let dispatch = async {
        let mut request_level_error: Option<GatewayError> = None;
        match plan.kind {
            OperationKind::Mutation => {
                // Mutations must not interleave (§4.3 step 4, §5): run each root
                // step to completion, children included, before starting the next.
                for step in plan.root_steps {
                    match execute_step_tree(step, keyword, None, client.clone(), budget.clone(), config.clone(), tx.clone()).await {
                        Ok(()) => {}
                        Err(e) if e.is_request_level() => {
                            request_level_error = Some(e);
                            break;
                        }
                        Err(_) => {}
                    }
                }
            }
            OperationKind::Query => {
                let mut join_set: JoinSet<Result<(), GatewayError>> = JoinSet::new();
                for step in plan.root_steps {
                    let client = client.clone();
                    let budget = budget.clone();
                    let config = config.clone();
                    let tx = tx.clone();
                    join_set.spawn(execute_step_tree(step, keyword, None, client, budget, config, tx));
                }
                while let Some(joined) = join_set.join_next().await {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) if e.is_request_level() => {
                            request_level_error = Some(e);
                            join_set.abort_all();
                        }
                        Ok(Err(_)) => {}
                        Err(join_error) if join_error.is_panic() => {
                            request_level_error = Some(GatewayError::Panicked(join_error.to_string()));
                        }
                        Err(_) => {}
                    }
                }
            }
        }
        request_level_error
    };

    let request_level_error = match ctx.deadline {
        Some(deadline) => match tokio::time::timeout(deadline, dispatch).await {
            Ok(outcome) => outcome,
            Err(_) => {
                drop(tx);
                return ExecutionOutcome { data: None, errors: vec![GatewayError::Cancelled.into_typed_error(&Path::empty())] };
            }
        },
        None => dispatch.await,
    };
    drop(tx);

    let mut errors = Vec::new();
    let mut inputs = Vec::new();
    while let Some(outcome) = rx.recv().await {
        errors.extend(outcome.errors);
        inputs.push(MergeInput { insertion_point: outcome.insertion_point, data: outcome.data });
    }

    if let Some(e) = request_level_error {
        errors.insert(0, e.into_typed_error(&Path::empty()));
        return ExecutionOutcome { data: None, errors };
    }

    match crate::merger::merge(inputs) {
        Ok(data) => ExecutionOutcome { data: Some(data), errors },
        Err(e) => {
            errors.insert(0, e.into_typed_error(&Path::empty()));
            ExecutionOutcome { data: None, errors }
        }
    }
}

/// Executes one step and, once its data is available, every child step
/// whose boundary ids can be extracted from it. `own_ids` is `None` for a
/// root step (whose document is the step's full selection) and `Some` for a
/// boundary-resolved step (whose document(s) come from §4.5).
fn execute_step_tree(
    step: Step,
    keyword: &'static str,
    own_ids: Option<Vec<String>>,
    client: Arc<dyn ServiceClient>,
    budget: Arc<AtomicU32>,
    config: ExecutorConfig,
    tx: mpsc::UnboundedSender<StepOutcome>,
) -> BoxFuture<'static, Result<(), GatewayError>> {
    Box::pin(async move {
        if step.is_internal() {
            let data = resolve_internal(&step);
            let _ = tx.send(StepOutcome { insertion_point: step.insertion_point.clone(), data: data.clone(), errors: Vec::new() });
            return dispatch_children(step, data, keyword, client, budget, config, tx).await;
        }

        let result = std::panic::AssertUnwindSafe(fetch_step_data(&step, own_ids, &*client, &budget, &config, keyword))
            .catch_unwind()
            .await;
        let (data, mut errors) = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let is_request_level = e.is_request_level();
                let _ = tx.send(StepOutcome {
                    insertion_point: step.insertion_point.clone(),
                    data: Value::Null,
                    errors: vec![e.clone_typed(&step.insertion_point)],
                });
                if is_request_level {
                    return Err(e);
                }
                (Value::Null, Vec::new())
            }
            Err(panic) => {
                let message = panic_message(panic);
                let err = GatewayError::Panicked(message);
                let _ = tx.send(StepOutcome {
                    insertion_point: step.insertion_point.clone(),
                    data: Value::Null,
                    errors: vec![err.into_typed_error(&step.insertion_point)],
                });
                return Ok(());
            }
        };

        let _ = tx.send(StepOutcome { insertion_point: step.insertion_point.clone(), data: data.clone(), errors: std::mem::take(&mut errors) });
        dispatch_children(step, data, keyword, client, budget, config, tx).await
    })
}

/// Issues the outbound request(s) for one non-internal step: a single
/// document for a root step, or one-or-more boundary lookup documents for a
/// child step (§4.4 steps 1-4, §4.5).
async fn fetch_step_data(
    step: &Step,
    own_ids: Option<Vec<String>>,
    client: &dyn ServiceClient,
    budget: &AtomicU32,
    config: &ExecutorConfig,
    keyword: &'static str,
) -> Result<(Value, Vec<TypedError>), GatewayError> {
    match own_ids {
        None => {
            if take_budget(budget, config).is_err() {
                let err = GatewayError::BudgetExceeded { max: config.max_requests }.into_typed_error(&step.insertion_point);
                return Ok((Value::Null, vec![err]));
            }
            let document = format_operation_document(keyword, &step.selection_set);
            let response = client
                .request(ServiceRequest { url: &step.service_url, document: &document, operation_name: None, variables: None, uploads: vec![] })
                .await
                .map_err(|source| GatewayError::Transport { service: step.service_url.clone(), source })?;
            let errors = remote_errors(&response, &step.service_url, &step.insertion_point);
            Ok((response.data.unwrap_or(Value::Null), errors))
        }
        Some(ids) => {
            if ids.is_empty() {
                return Ok((Value::List(Vec::new()), Vec::new()));
            }
            let documents = boundary::build_documents(step, &ids, config.boundary_batch_size)?;
            let mut resolved = Vec::new();
            let mut errors = Vec::new();
            for document in documents {
                if take_budget(budget, config).is_err() {
                    errors.push(GatewayError::BudgetExceeded { max: config.max_requests }.into_typed_error(&Path::empty()));
                    break;
                }
                let response = client
                    .request(ServiceRequest { url: &step.service_url, document: &document.query, operation_name: None, variables: None, uploads: vec![] })
                    .await
                    .map_err(|source| GatewayError::Transport { service: step.service_url.clone(), source })?;
                errors.extend(remote_errors(&response, &step.service_url, &step.insertion_point));
                resolved.extend(extract_resolved_objects(&response.data, &document));
            }
            Ok((Value::List(resolved), errors))
        }
    }
}

fn take_budget(budget: &AtomicU32, config: &ExecutorConfig) -> Result<(), GatewayError> {
    let used = budget.fetch_add(1, Ordering::SeqCst) + 1;
    if used > config.max_requests {
        Err(GatewayError::BudgetExceeded { max: config.max_requests })
    } else {
        Ok(())
    }
}

fn extract_resolved_objects(data: &Option<Value>, document: &BoundaryDocument) -> Vec<Value> {
    let Some(data) = data else { return Vec::new() };
    let Some(obj) = data.as_object() else { return Vec::new() };
    if document.array_argument {
        return obj.get("_result").and_then(Value::as_list).map(<[Value]>::to_vec).unwrap_or_default();
    }
    (0..document.ids.len())
        .filter_map(|i| obj.get(&format!("_{}", document.alias_offset + i)).cloned())
        .collect()
}

fn remote_errors(response: &crate::client::SubgraphResponse, service: &str, insertion_point: &Path) -> Vec<TypedError> {
    response
        .errors
        .iter()
        .map(|e| {
            GatewayError::Subgraph { service: service.to_string(), message: e.message.clone() }
                .into_typed_error(insertion_point)
                .with_extension("serviceUrl", service.to_string())
        })
        .collect()
}

/// Dispatches every step in `step.then`, extracting each child's boundary
/// ids from `data` relative to `step`'s own insertion point (§4.4 step 5).
async fn dispatch_children(
    step: Step,
    mut data: Value,
    keyword: &'static str,
    client: Arc<dyn ServiceClient>,
    budget: Arc<AtomicU32>,
    config: ExecutorConfig,
    tx: mpsc::UnboundedSender<StepOutcome>,
) -> Result<(), GatewayError> {
    if step.then.is_empty() {
        return Ok(());
    }
    let own_len = step.insertion_point.len();
    let mut join_set: JoinSet<Result<(), GatewayError>> = JoinSet::new();
    for child in step.then {
        let relative: Vec<PathElement> = child.insertion_point.as_slice()[own_len..].to_vec();
        let ids = boundary::extract_boundary_ids(&mut data, &relative).unwrap_or_default();
        let client = client.clone();
        let budget = budget.clone();
        let config = config.clone();
        let tx = tx.clone();
        join_set.spawn(execute_step_tree(child, keyword, Some(ids), client, budget, config, tx));
    }
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Err(e)) if e.is_request_level() => {
                join_set.abort_all();
                return Err(e);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Resolves a purely-local (`__internal__`) step: `__typename` under a
/// namespace, or any selection that needed no outbound request.
fn resolve_internal(step: &Step) -> Value {
    use crate::operation::Selection;
    let mut map = indexmap::IndexMap::new();
    for selection in &step.selection_set.selections {
        if let Selection::Field(field) = selection {
            if field.is_typename() {
                map.insert(field.alias.clone(), Value::String(step.parent_type.clone()));
            } else {
                map.insert(field.alias.clone(), Value::Null);
            }
        }
    }
    Value::Object(map)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "step task panicked".to_string()
    }
}

trait ClientErrorExt {
    fn clone_typed(&self, path_prefix: &Path) -> TypedError;
}

impl ClientErrorExt for GatewayError {
    fn clone_typed(&self, path_prefix: &Path) -> TypedError {
        // GatewayError isn't Clone (ClientError wraps a reqwest-derived
        // string, cheaply reconstructible); render directly instead of
        // cloning the error value itself.
        match self {
            GatewayError::Transport { service, source } => TypedError::new(source.to_string())
                .with_path(path_prefix.clone())
                .with_extension("serviceName", service.clone()),
            GatewayError::Subgraph { service, message } => {
                TypedError::new(message.clone()).with_path(path_prefix.clone()).with_extension("serviceName", service.clone())
            }
            GatewayError::BudgetExceeded { max } => TypedError::new(format!("request budget of {max} outbound requests exceeded")),
            GatewayError::Planner(message) => TypedError::new(message.clone()),
            GatewayError::NullBubbled { path } => {
                TypedError::new(format!("Cannot return null for non-nullable field at `{path}`")).with_path(path.clone())
            }
            GatewayError::Panicked(message) => TypedError::new(message.clone()).with_path(path_prefix.clone()),
            GatewayError::Cancelled => TypedError::new("the request was cancelled"),
            GatewayError::Value(e) => TypedError::new(e.to_string()).with_path(path_prefix.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SubgraphResponse;
    use crate::error::ClientError;
    use crate::operation::{Field, Selection, SelectionSet};
    use crate::schema::{BoundaryFieldInfo, BOUNDARY_ID_ALIAS, BOUNDARY_TYPENAME_ALIAS};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct ScriptedClient {
        responses: StdMutex<std::collections::VecDeque<Result<SubgraphResponse, ClientError>>>,
        requests_seen: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ServiceClient for ScriptedClient {
        async fn request(&self, _request: ServiceRequest<'_>) -> Result<SubgraphResponse, ClientError> {
            self.requests_seen.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(SubgraphResponse::default()))
        }
    }

    fn field(alias: &str, name: &str) -> Field {
        Field { alias: alias.into(), name: name.into(), arguments: HashMap::new(), directives: vec![], selection_set: SelectionSet::default() }
    }

    #[tokio::test]
    async fn cross_service_join_merges_boundary_response_onto_root_data() {
        let root = Step {
            service_url: "http://a".into(),
            parent_type: "Query".into(),
            selection_set: SelectionSet {
                selections: vec![Selection::Field(Field {
                    alias: "gizmos".into(),
                    name: "gizmos".into(),
                    arguments: HashMap::new(),
                    directives: vec![],
                    selection_set: SelectionSet {
                        selections: vec![
                            Selection::Field(field("id", "id")),
                            Selection::Field(Field {
                                alias: "owner".into(),
                                name: "owner".into(),
                                arguments: HashMap::new(),
                                directives: vec![],
                                selection_set: SelectionSet {
                                    selections: vec![
                                        Selection::Field(field(BOUNDARY_ID_ALIAS, "id")),
                                        Selection::Field(field(BOUNDARY_TYPENAME_ALIAS, "__typename")),
                                    ],
                                },
                            }),
                        ],
                    },
                })],
            },
            insertion_point: Path::empty(),
            then: vec![Step {
                service_url: "http://b".into(),
                parent_type: "Owner".into(),
                selection_set: SelectionSet { selections: vec![Selection::Field(field("name", "name"))] },
                insertion_point: Path::empty().join("gizmos").join("owner"),
                then: Vec::new(),
                boundary_lookup: Some(BoundaryFieldInfo { field_name: "getOwner".into(), argument_name: "id".into(), array_argument: false }),
            }],
            boundary_lookup: None,
        };

        let root_response = SubgraphResponse {
            data: Some(Value::from(serde_json::json!({
                "gizmos": [{"id": "1", "owner": {BOUNDARY_ID_ALIAS: "10", BOUNDARY_TYPENAME_ALIAS: "Owner"}}]
            }))),
            errors: vec![],
        };
        let boundary_response = SubgraphResponse {
            data: Some(Value::from(
                serde_json::json!({"_0": {"name": "Alice", BOUNDARY_ID_ALIAS: "10", BOUNDARY_TYPENAME_ALIAS: "Owner"}}),
            )),
            errors: vec![],
        };
        let client = Arc::new(ScriptedClient {
            responses: StdMutex::new(vec![Ok(root_response), Ok(boundary_response)].into()),
            requests_seen: Arc::new(AtomicU32::new(0)),
        });

        let plan = Plan { kind: OperationKind::Query, root_type: "Query".into(), root_steps: vec![root] };
        let outcome = execute(plan, &RequestContext::default(), client, ExecutorConfig::default()).await;
        assert!(outcome.errors.is_empty());
        let data = outcome.data.unwrap();
        let gizmos = data.as_object().unwrap().get("gizmos").unwrap().as_list().unwrap();
        let owner = gizmos[0].as_object().unwrap().get("owner").unwrap().as_object().unwrap();
        assert_eq!(owner.get("name").unwrap().as_str(), Some("Alice"));
    }

    #[tokio::test]
    async fn deadline_expiry_yields_a_single_cancellation_error_with_no_data() {
        struct SlowClient;
        #[async_trait]
        impl ServiceClient for SlowClient {
            async fn request(&self, _request: ServiceRequest<'_>) -> Result<SubgraphResponse, ClientError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(SubgraphResponse::default())
            }
        }

        let root = Step {
            service_url: "http://a".into(),
            parent_type: "Query".into(),
            selection_set: SelectionSet::default(),
            insertion_point: Path::empty(),
            then: Vec::new(),
            boundary_lookup: None,
        };
        let plan = Plan { kind: OperationKind::Query, root_type: "Query".into(), root_steps: vec![root] };
        let ctx = RequestContext { deadline: Some(Duration::from_millis(20)), ..RequestContext::default() };
        let outcome = execute(plan, &ctx, Arc::new(SlowClient), ExecutorConfig::default()).await;

        assert!(outcome.data.is_none());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].message.contains("cancelled"));
    }

    #[tokio::test]
    async fn budget_exhaustion_stops_issuing_further_requests() {
        let children: Vec<Step> = (0..5)
            .map(|i| Step {
                service_url: "http://b".into(),
                parent_type: "Owner".into(),
                selection_set: SelectionSet { selections: vec![Selection::Field(field("name", "name"))] },
                insertion_point: Path::empty().join("gizmos").join(i).join("owner"),
                then: Vec::new(),
                boundary_lookup: Some(BoundaryFieldInfo { field_name: "getOwner".into(), argument_name: "id".into(), array_argument: false }),
            })
            .collect();

        let root = Step {
            service_url: "http://a".into(),
            parent_type: "Query".into(),
            selection_set: SelectionSet::default(),
            insertion_point: Path::empty(),
            then: children,
            boundary_lookup: None,
        };

        let gizmos: Vec<_> = (0..5)
            .map(|i| serde_json::json!({"owner": {BOUNDARY_ID_ALIAS: i.to_string(), BOUNDARY_TYPENAME_ALIAS: "Owner"}}))
            .collect();
        let root_response = SubgraphResponse { data: Some(Value::from(serde_json::json!({"gizmos": gizmos}))), errors: vec![] };
        let client = Arc::new(ScriptedClient {
            responses: StdMutex::new(vec![Ok(root_response)].into()),
            requests_seen: Arc::new(AtomicU32::new(0)),
        });
        let requests_seen = client.requests_seen.clone();

        let mut config = ExecutorConfig::default();
        config.max_requests = 2;
        let plan = Plan { kind: OperationKind::Query, root_type: "Query".into(), root_steps: vec![root] };
        let outcome = execute(plan, &RequestContext::default(), client, config).await;

        assert!(requests_seen.load(Ordering::SeqCst) <= 3);
        assert!(outcome.errors.iter().any(|e| e.message.contains("budget")));
    }
}
