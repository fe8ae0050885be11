pub mod rest;
pub mod state;

pub use rest::{
    analyze_transcript_handler, get_meeting_handler, list_follow_ups_handler,
    list_recurring_issues_handler, update_follow_up_status_handler,
};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use state::AppState;

/// Browsers may call the API from any origin; preflights are answered by the layer.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            CONTENT_TYPE,
        ])
}

/// Builds the API router (without the Swagger UI).
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analyze-transcript", post(analyze_transcript_handler))
        .route("/meetings/{id}", get(get_meeting_handler))
        .route("/follow-ups", get(list_follow_ups_handler))
        .route("/follow-ups/{id}/status", patch(update_follow_up_status_handler))
        .route("/companies/{id}/recurring-issues", get(list_recurring_issues_handler))
        .layer(cors_layer())
        .with_state(app_state)
}
