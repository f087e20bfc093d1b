use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Multipart framing and text fields on top of the file payloads
const FORM_OVERHEAD: usize = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let uploads = &state.config.uploads;
    let upload_limit = (uploads.max_upload_size as usize)
        .saturating_mul(uploads.max_files_per_request)
        .saturating_add(FORM_OVERHEAD);

    Router::new()
        // Study sets
        .route(
            "/api/study-set",
            post(handlers::create_study_set).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/study-sets", get(handlers::list_study_sets))
        .route(
            "/api/study-set/:id",
            get(handlers::get_study_set)
                .put(handlers::update_study_set)
                .layer(DefaultBodyLimit::max(upload_limit))
                .delete(handlers::delete_study_set),
        )
        .route("/api/study-set/:id/files", get(handlers::list_study_set_files))
        .route(
            "/api/study-set/file/:file_id",
            delete(handlers::delete_file_from_study_set),
        )
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
