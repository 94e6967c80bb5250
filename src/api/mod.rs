//! HTTP surface: handlers and the route table.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::{self as h, AppState};

pub mod handlers {
    pub use crate::handlers::*;
}

/// Authenticated API routes, without middleware.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/enrich", post(h::enrich))
        .route(
            "/api/v1/prospects",
            get(h::list_prospects).post(h::create_prospect),
        )
        .route("/api/v1/prospects/:id", get(h::get_prospect))
        .route("/api/v1/prospects/:id/cnes", post(h::refresh_cnes))
        .route("/api/v1/prospects/:id/briefing", post(h::generate_briefing))
        .route("/api/v1/prospects/:id/messages", post(h::generate_messages))
        .route("/api/v1/interactions", post(h::create_interaction))
}
