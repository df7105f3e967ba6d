//! The dynamic value type shared by the client, merger, null bubbler, and
//! serializer.
//!
//! Intermediate data flowing through the gateway is shape-unknown JSON. This
//! crate represents it as a tagged variant rather than paying the cost of a
//! full parse on every subgraph response: [`Value::Deferred`] carries a raw
//! byte fragment that is materialized lazily, only when a consumer actually
//! needs to look inside it.

mod path;
mod value;

pub use path::{Path, PathElement};
pub use value::{Value, ValueError};
