use state_machines::state_machine;

/// The compile-time-checked stage progression a single ingestion attempt
/// drives through (§4.1 "each stage is a pure function of the previous
/// stage's output"). This is distinct from `Document::status` (§4.1's
/// CAS-guarded state machine persisted to the store): this one only lives
/// for the duration of one attempt and is never itself persisted.
state_machine! {
    name: IngestionMachine,
    state: IngestionStage,
    initial: Fetched,
    states: [Fetched, Parsed, Deduplicated, Enriched, Chunked, Embedded, Persisted, Failed],
    events {
        parse { transition: { from: Fetched, to: Parsed } }
        dedupe { transition: { from: Parsed, to: Deduplicated } }
        enrich { transition: { from: Deduplicated, to: Enriched } }
        chunk { transition: { from: Enriched, to: Chunked } }
        embed { transition: { from: Chunked, to: Embedded } }
        persist { transition: { from: Embedded, to: Persisted } }
        abort {
            transition: { from: Fetched, to: Failed }
            transition: { from: Parsed, to: Failed }
            transition: { from: Deduplicated, to: Failed }
            transition: { from: Enriched, to: Failed }
            transition: { from: Chunked, to: Failed }
            transition: { from: Embedded, to: Failed }
            transition: { from: Persisted, to: Failed }
        }
    }
}

pub fn fetched() -> IngestionMachine<(), Fetched> {
    IngestionMachine::new(())
}
