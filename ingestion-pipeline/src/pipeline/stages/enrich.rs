use std::collections::{HashMap, HashSet};

use common::error::AppError;
use common::storage::types::collection::Collection;
use common::storage::types::knowledge_entity::KnowledgeEntity;
use common::storage::types::knowledge_relationship::KnowledgeRelationship;
use tracing::instrument;

use super::map_guard_error;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::extraction;
use crate::pipeline::state::{Deduplicated, Enriched, IngestionMachine};

/// §4.2 graph mode / §9 open question: entity/relationship extraction runs
/// only for collections that opt into graph search. Disabled collections
/// skip straight through with empty entity/relationship sets, so the state
/// machine still advances uniformly.
#[instrument(skip_all, fields(document_id = %ctx.payload.document_id))]
pub async fn run(
    machine: IngestionMachine<(), Deduplicated>,
    ctx: &mut PipelineContext,
) -> Result<IngestionMachine<(), Enriched>, AppError> {
    let collection = ctx
        .services
        .db
        .get_item::<Collection>(&ctx.payload.collection_id)
        .await?;
    let graph_enabled = collection.map(|c| c.graph_enabled()).unwrap_or(false);

    if graph_enabled {
        let text = ctx.parsed()?.text.clone();
        let extracted = extraction::extract(&ctx.services.openai_client, &ctx.tuning.llm_model, &text).await?;

        let mut by_key: HashMap<String, KnowledgeEntity> = HashMap::new();
        for entity in &extracted.entities {
            let embedding = ctx
                .services
                .embedding
                .embed_one(format!("{}: {}", entity.name, entity.description))
                .await?;
            let row = KnowledgeEntity::new(
                ctx.payload.owner.clone(),
                ctx.payload.collection_id.clone(),
                ctx.payload.document_id.clone(),
                entity.name.clone(),
                entity.entity_type.clone(),
                entity.description.clone(),
                embedding,
                HashMap::new(),
            );
            by_key.insert(entity.key.clone(), row);
        }

        let known_keys: HashSet<&String> = by_key.keys().collect();
        let relationships = extracted
            .relationships
            .into_iter()
            .filter(|r| known_keys.contains(&r.source) && known_keys.contains(&r.target))
            .filter_map(|r| {
                let source_id = by_key.get(&r.source)?.id.clone();
                let target_id = by_key.get(&r.target)?.id.clone();
                Some(KnowledgeRelationship::new(
                    ctx.payload.owner.clone(),
                    ctx.payload.collection_id.clone(),
                    ctx.payload.document_id.clone(),
                    source_id,
                    target_id,
                    r.relationship_type,
                ))
            })
            .collect();

        ctx.entities = by_key.into_values().collect();
        ctx.relationships = relationships;
    }

    machine
        .enrich()
        .map_err(|(_, guard)| map_guard_error("enrich", &guard))
}
