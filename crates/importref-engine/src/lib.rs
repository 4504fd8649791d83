//! reference resolution engine: batched name/uuid -> id lookups for imports.

mod batch;
mod resolver;
mod slot;
mod store;


pub use resolver::Resolver;
pub use store::{DataStore, ExpressionResolver, VerbatimExpressions};
