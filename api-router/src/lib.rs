use api_state::ApiState;
use axum::extract::{DefaultBodyLimit, FromRef};
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;

use middleware_auth::bearer_auth;
use routes::auth::register;
use routes::chat::{chat, delete_session, list_sessions, session_messages};
use routes::collections::{
    create as create_collection, delete as delete_collection, get as get_collection,
    list as list_collections, patch as patch_collection,
};
use routes::documents::{
    cancel as cancel_document, delete as delete_document, get as get_document,
    list as list_documents, patch as patch_document, signed_url, status, upload,
};
use routes::liveness::live;
use routes::readiness::ready;
use routes::retrievals::create as create_retrieval;

pub mod api_state;
pub mod chat_support;
pub mod error;
mod middleware_auth;
mod routes;

/// Router for the core HTTP surface (§6). Probes are unauthenticated for
/// k8s/systemd; everything else requires a bearer API key.
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    let public = Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready))
        .route("/auth/register", post(register));

    let protected = Router::new()
        .route("/collections", post(create_collection).get(list_collections))
        .route(
            "/collections/{id}",
            get(get_collection).patch(patch_collection).delete(delete_collection),
        )
        .route(
            "/documents",
            post(upload)
                .layer(DefaultBodyLimit::max(app_state.config.ingest_max_body_bytes))
                .get(list_documents),
        )
        .route(
            "/documents/{id}",
            get(get_document).patch(patch_document).delete(delete_document),
        )
        .route("/documents/{id}/status", get(status))
        .route("/documents/{id}/url", get(signed_url))
        .route("/documents/{id}/cancel", post(cancel_document))
        .route("/retrievals", post(create_retrieval))
        .route("/chat", post(chat))
        .route("/chat/sessions", get(list_sessions))
        .route("/chat/sessions/{id}/messages", get(session_messages))
        .route("/chat/sessions/{id}", delete(delete_session))
        .route_layer(from_fn_with_state(app_state.clone(), bearer_auth));

    public.merge(protected)
}
