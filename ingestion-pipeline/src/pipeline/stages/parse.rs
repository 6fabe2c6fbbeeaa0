use bytes::Bytes;
use common::error::AppError;
use tracing::instrument;

use super::map_guard_error;
use crate::parsers;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::state::{Fetched, IngestionMachine, Parsed};

/// §4.1 stage 2: deterministic MIME-keyed parser selection, producing
/// canonical UTF-8 text plus structured metadata.
#[instrument(skip_all, fields(document_id = %ctx.payload.document_id, mime = %ctx.payload.mime_type))]
pub async fn run(
    machine: IngestionMachine<(), Fetched>,
    ctx: &mut PipelineContext,
    bytes: Bytes,
) -> Result<IngestionMachine<(), Parsed>, AppError> {
    let parser = parsers::select(&ctx.payload.mime_type);
    let parsed = parser.parse(&bytes).await?;
    ctx.parsed = Some(parsed);

    machine
        .parse()
        .map_err(|(_, guard)| map_guard_error("parse", &guard))
}
