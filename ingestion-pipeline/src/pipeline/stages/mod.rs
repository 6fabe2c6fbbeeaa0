pub mod chunk;
pub mod dedupe;
pub mod embed;
pub mod enrich;
pub mod fetch;
pub mod parse;
pub mod persist;

use state_machines::core::GuardError;

use common::error::AppError;

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}
