use serde::{Deserialize, Serialize};

/// What an ingestion job needs to drive a document through the pipeline,
/// snapshotted at enqueue time so a worker never has to re-derive it from
/// the document row under race.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionPayload {
    pub document_id: String,
    pub owner: String,
    pub collection_id: String,
    pub blob_key: String,
    pub mime_type: String,
}
