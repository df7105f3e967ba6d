//! Thin runnable entry point (§4.13): one `axum` POST route translating a
//! typed-graph request envelope into a `gateway_core::ExecutableSchema`
//! execution. None of the gateway's middleware chain — auth, CORS,
//! persisted queries, coprocessors, health checks — lives here; this binary
//! exists only so the crate is a runnable artifact exercising the core
//! end to end.

mod schema_config;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::{http::StatusCode, Router};
use clap::Parser;
use gateway_core::client::HttpServiceClient;
use gateway_core::config::GatewayConfig;
use gateway_core::{parser, CompiledSchema, ExecutableSchema, GatewayError, GatewayResponse, RequestContext, SchemaSource};
use gateway_json::Value;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Federated query gateway")]
struct Args {
    /// Path to the JSON-described merged schema to boot with.
    #[arg(long, env = "GATEWAY_SCHEMA")]
    schema: PathBuf,

    /// Address the HTTP front door listens on.
    #[arg(long, env = "GATEWAY_LISTEN", default_value = "0.0.0.0:4000")]
    listen: SocketAddr,

    /// Overrides the per-operation outbound request budget.
    #[arg(long, env = "GATEWAY_MAX_REQUESTS")]
    max_requests: Option<u32>,

    /// Always populate debug extensions, regardless of the per-request flag.
    #[arg(long, env = "GATEWAY_DEBUG")]
    debug: bool,
}

struct FileSchemaSource {
    path: PathBuf,
}

#[async_trait]
impl SchemaSource for FileSchemaSource {
    async fn build(&self, _service_urls: &[String]) -> Result<CompiledSchema, GatewayError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| GatewayError::Planner(format!("reading schema file {}: {e}", self.path.display())))?;
        let config = serde_json::from_str(&text).map_err(|e| GatewayError::Planner(format!("parsing schema file {}: {e}", self.path.display())))?;
        schema_config::compile(config)
    }
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default, rename = "operationName")]
    operation_name: Option<String>,
    #[serde(default)]
    variables: HashMap<String, Value>,
}

#[derive(Serialize)]
struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<gateway_core::TypedError>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    extensions: serde_json::Map<String, serde_json::Value>,
}

struct AppState {
    shell: ExecutableSchema,
    force_debug: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let source: Arc<dyn SchemaSource> = Arc::new(FileSchemaSource { path: args.schema.clone() });
    let initial = match source.build(&[]).await {
        Ok(compiled) => compiled,
        Err(e) => {
            tracing::error!(error = %e, "failed to load initial schema");
            std::process::exit(1);
        }
    };

    let mut config = GatewayConfig::default();
    if let Some(max_requests) = args.max_requests {
        config.executor.max_requests = max_requests;
    }

    let client = match HttpServiceClient::new(config.client.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "failed to build the subgraph HTTP client");
            std::process::exit(1);
        }
    };

    let shell = ExecutableSchema::new(initial, source, client, config);
    let state = Arc::new(AppState { shell, force_debug: args.debug });

    let app = Router::new().route("/query", post(handle_query)).with_state(state);

    tracing::info!(%args.listen, "starting gateway");
    let listener = match tokio::net::TcpListener::bind(args.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind listen address");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "gateway server exited with an error");
        std::process::exit(1);
    }
}

#[tracing::instrument(skip_all)]
async fn handle_query(State(state): State<Arc<AppState>>, Json(request): Json<QueryRequest>) -> impl IntoResponse {
    let operation = match parser::parse(&request.query, request.operation_name.as_deref(), request.variables) {
        Ok(operation) => operation,
        Err(e) => {
            let response = QueryResponse { data: None, errors: vec![e.into_typed_error(&gateway_json::Path::empty())], extensions: serde_json::Map::new() };
            return (StatusCode::BAD_REQUEST, Json(response));
        }
    };

    let mut ctx = RequestContext::default();
    ctx.debug = ctx.debug || state.force_debug;

    let GatewayResponse { data, errors, extensions } = state.shell.execute(operation, ctx).await;
    let extensions = extensions
        .into_iter()
        .map(|(k, v)| (k, serde_json::to_value(&v).unwrap_or(serde_json::Value::Null)))
        .collect();
    let response = QueryResponse { data, errors, extensions };
    (StatusCode::OK, Json(response))
}
