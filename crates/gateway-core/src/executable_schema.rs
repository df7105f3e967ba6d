//! The executable schema shell (§4.12): owns the hot-swappable compiled
//! schema tables and wires the whole request pipeline (rewrite → plan →
//! execute → bubble → serialize) behind one `execute` entry point.
//!
//! Grounded on this codebase's `ArcSwap`-backed hot-reloadable router state:
//! readers take a cheap `Guard` for the duration of one request, a rebuild
//! swaps one pointer, and in-flight requests keep running against the
//! snapshot they started with.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use gateway_json::{Path, Value};

use crate::client::ServiceClient;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, TypedError};
use crate::executor::{self, ExecutionOutcome, RequestContext};
use crate::operation::{Operation, OperationKind};
use crate::planner;
use crate::rewriter;
use crate::schema::{BoundaryMap, FieldLocationMap, Schema};
use crate::{bubbler, introspection, serializer};

/// The schema plus the two indices derived from it, published as one atomic
/// unit so a reader never observes a schema paired with a stale location map.
#[derive(Clone, Debug, Default)]
pub struct CompiledSchema {
    pub schema: Schema,
    pub locations: FieldLocationMap,
    pub boundaries: BoundaryMap,
}

/// The external collaborator that fetches each service's SDL and merges them
/// into one [`CompiledSchema`]. Polling cadence, retries, and the merge
/// algorithm itself are out of scope here (§1 Non-goals); this crate only
/// depends on the narrow async boundary.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn build(&self, service_urls: &[String]) -> Result<CompiledSchema, GatewayError>;
}

/// The response shape returned to the caller (§6): `data` may be absent
/// entirely (a request-level error), `errors` is ordered, and `extensions`
/// carries whatever debug information the request asked for.
pub struct GatewayResponse {
    pub data: Option<Value>,
    pub errors: Vec<TypedError>,
    pub extensions: BTreeMap<String, Value>,
}

pub struct ExecutableSchema {
    compiled: ArcSwap<CompiledSchema>,
    service_urls: ArcSwap<Vec<String>>,
    source: Arc<dyn SchemaSource>,
    client: Arc<dyn ServiceClient>,
    config: GatewayConfig,
}

impl ExecutableSchema {
    pub fn new(initial: CompiledSchema, source: Arc<dyn SchemaSource>, client: Arc<dyn ServiceClient>, config: GatewayConfig) -> Self {
        ExecutableSchema {
            compiled: ArcSwap::from_pointee(initial),
            service_urls: ArcSwap::from_pointee(Vec::new()),
            source,
            client,
            config,
        }
    }

    /// Replaces the known service list and rebuilds the merged schema from
    /// it (§6). The previous tables remain live for any request already in
    /// flight until this call's rebuild succeeds and swaps the pointer.
    pub async fn update_service_list(&self, service_urls: Vec<String>) -> Result<(), GatewayError> {
        let compiled = self.source.build(&service_urls).await?;
        self.compiled.store(Arc::new(compiled));
        self.service_urls.store(Arc::new(service_urls));
        Ok(())
    }

    /// Re-fetches each known service's schema and rebuilds (§6). Unlike
    /// [`Self::update_service_list`], this keeps the existing service list;
    /// a source that can't reach every backend should still return its best
    /// merge (carrying forward any service's last-known-good schema) rather
    /// than fail outright — that retry/staleness policy lives in the
    /// `SchemaSource` implementation, not here.
    pub async fn update_schema(&self, force_rebuild: bool) -> Result<(), GatewayError> {
        let urls = self.service_urls.load();
        if urls.is_empty() && !force_rebuild {
            return Ok(());
        }
        let compiled = self.source.build(&urls).await?;
        self.compiled.store(Arc::new(compiled));
        Ok(())
    }

    /// Runs one operation through the full pipeline and renders the
    /// response (§6, §3 data flow: rewriter → planner → executor → merger →
    /// bubbler → serializer).
    #[tracing::instrument(name = "execute", skip_all, fields(trace_id = %ctx.trace_id))]
    pub async fn execute(&self, operation: Operation, ctx: RequestContext) -> GatewayResponse {
        let started = Instant::now();
        let compiled = self.compiled.load_full();

        let rewritten = match rewriter::rewrite(&operation) {
            Ok(op) => op,
            Err(e) => return request_level_response(e),
        };

        if rewriter::is_introspection_only(&rewritten.selection_set) {
            return match introspection::resolve(&rewritten.selection_set, &compiled.schema) {
                Ok(data) => GatewayResponse { data: Some(data), errors: Vec::new(), extensions: BTreeMap::new() },
                Err(e) => request_level_response(e),
            };
        }

        let plan = match planner::plan(&rewritten, &compiled.schema, &compiled.locations, &compiled.boundaries) {
            Ok(plan) => plan,
            Err(e) => return request_level_response(e),
        };
        let plan_debug = ctx.debug.then(|| format!("{plan:#?}"));

        let execution_started = Instant::now();
        let ExecutionOutcome { data, mut errors } = executor::execute(plan, &ctx, self.client.clone(), self.config.executor.clone()).await;
        let execution_elapsed = execution_started.elapsed();

        let merge_started = Instant::now();
        let (data, bubble_errors) = match data {
            Some(data) => {
                let root_type = if rewritten.kind == OperationKind::Query {
                    compiled.schema.query_type.clone()
                } else {
                    // The planner already rejected a mutation against a
                    // schema with no Mutation type, so this always matches.
                    compiled.schema.mutation_type.clone().unwrap_or_default()
                };
                bubbler::bubble(data, &rewritten.selection_set, &root_type, &compiled.schema, &rewritten.fragments)
            }
            None => (None, Vec::new()),
        };
        errors.extend(bubble_errors);
        let merge_elapsed = merge_started.elapsed();

        let format_started = Instant::now();
        let data = data.map(|data| serializer::serialize(&data, &rewritten.selection_set, &rewritten.fragments, &compiled.schema));
        let format_elapsed = format_started.elapsed();

        let mut extensions = BTreeMap::new();
        if ctx.debug {
            extensions.insert("query".to_string(), Value::String(format!("{:?}", rewritten.selection_set)));
            let variables = rewritten.variables.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            extensions.insert("variables".to_string(), Value::Object(variables));
            if let Some(plan_debug) = plan_debug {
                extensions.insert("plan".to_string(), Value::String(plan_debug));
            }
            extensions.insert(
                "timing".to_string(),
                Value::Object(
                    [
                        ("execution".to_string(), Value::String(format!("{execution_elapsed:?}"))),
                        ("merge".to_string(), Value::String(format!("{merge_elapsed:?}"))),
                        ("format".to_string(), Value::String(format!("{format_elapsed:?}"))),
                        ("total".to_string(), Value::String(format!("{:?}", started.elapsed()))),
                    ]
                    .into_iter()
                    .collect(),
                ),
            );
            extensions.insert("traceId".to_string(), Value::String(ctx.trace_id.to_string()));
        }

        GatewayResponse { data, errors, extensions }
    }
}

fn request_level_response(error: GatewayError) -> GatewayResponse {
    GatewayResponse { data: None, errors: vec![error.into_typed_error(&Path::empty())], extensions: BTreeMap::new() }
}
