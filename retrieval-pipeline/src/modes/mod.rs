pub mod graph;
pub mod hierarchical;
pub mod hybrid;
pub mod keyword;
pub mod semantic;

use std::collections::HashMap;

use common::error::AppError;
use common::storage::db::SurrealDbClient;
use serde_json::Value;

/// Shared request shape every mode's candidate-collection function takes.
/// `embedding` is only required by modes that rank on vector distance.
pub struct ModeInput<'a> {
    pub db: &'a SurrealDbClient,
    pub owner: &'a str,
    pub collection: Option<&'a str>,
    pub query: &'a str,
    pub embedding: Option<&'a [f32]>,
    pub top_k: usize,
    pub metadata_filter: &'a HashMap<String, Value>,
}

pub use crate::scoring::FusedChunk;

/// §4.2: graph mode "fails gracefully to semantic if the graph index is
/// disabled for the collection" — expressed here as a shared guard so both
/// the single-collection and cross-collection call sites apply it the same
/// way.
pub async fn graph_enabled(db: &SurrealDbClient, owner: &str, collection: &str) -> Result<bool, AppError> {
    use common::storage::types::collection::Collection;
    match db.get_item::<Collection>(collection).await? {
        Some(collection) if collection.owner == owner => Ok(collection.graph_enabled()),
        _ => Ok(false),
    }
}
