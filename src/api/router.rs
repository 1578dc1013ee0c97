//! HTTP router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`, every request is traced.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::coordinator::ExerciseService;

/// Build the API router around a shared service.
pub fn api_router(service: Arc<ExerciseService>) -> Router {
    build_router(ApiContext::new(service))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/exercises",
            post(endpoints::exercises::create).get(endpoints::exercises::list),
        )
        .route(
            "/exercises/:id",
            get(endpoints::exercises::detail)
                .patch(endpoints::exercises::update)
                .delete(endpoints::exercises::remove),
        )
        .route("/exercises/:id/stats", get(endpoints::exercises::stats))
        .route(
            "/assignments",
            post(endpoints::assignments::create).get(endpoints::assignments::list),
        )
        .route(
            "/assignments/:id",
            get(endpoints::assignments::detail).delete(endpoints::assignments::remove),
        )
        .route(
            "/assignments/:id/complete-set",
            post(endpoints::assignments::complete_set),
        )
        .route("/patients", post(endpoints::patients::register))
        .route("/patients/:id/daily", get(endpoints::patients::daily))
        .route("/patients/:id/adherence", get(endpoints::patients::adherence))
        .route("/patients/:id/plan", get(endpoints::patients::plan))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}
