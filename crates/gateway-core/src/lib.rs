//! Query planning, execution, and result assembly for a federated graph
//! gateway: rewrite a client operation, split it into per-service steps,
//! dispatch them under structured concurrency, and reassemble one response
//! from whatever came back.

pub mod boundary;
pub mod bubbler;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod executable_schema;
pub mod executor;
pub mod introspection;
pub mod merger;
pub mod operation;
pub mod parser;
pub mod planner;
pub mod rewriter;
pub mod schema;
pub mod serializer;

pub use error::{GatewayError, TypedError};
pub use executable_schema::{CompiledSchema, ExecutableSchema, GatewayResponse, SchemaSource};
pub use executor::RequestContext;
