use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::middleware::{auth_middleware, metrics_middleware};
use super::{audit, handlers, histories, reports};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Authenticated API routes
    let protected_routes = Router::new()
        .route("/config", get(handlers::get_config))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Histories
        .route(
            "/histories",
            post(histories::create_history).get(histories::list_histories),
        )
        .route("/histories/summary", get(histories::summary))
        .route(
            "/histories/parent/{parent_id}",
            get(histories::list_for_parent),
        )
        .route("/histories/user/{user_id}", get(histories::list_for_user))
        .route(
            "/histories/{id}",
            get(histories::get_history)
                .put(histories::edit_history)
                .delete(histories::delete_history),
        )
        .route("/histories/{id}/image", put(histories::upload_image))
        // Reports
        .route("/reports/period", get(reports::period_report))
        .route("/reports/monthly", get(reports::monthly_report))
        .route("/reports/vendor", get(reports::vendor_report))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
