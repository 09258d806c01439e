// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, exam, submission},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the application router.
///
/// * Public: auth and share-link routes.
/// * Authenticated: taking and submitting a test.
/// * Admin: authoring, share links and result review.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let share_routes = Router::new()
        .route("/{token}", get(exam::get_shared_test))
        .route("/{token}/submit", post(submission::submit_shared));

    let test_routes = Router::new()
        .route("/{id}", get(exam::get_test))
        .route("/{id}/submit", post(submission::submit_direct))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/tests", post(admin::create_test))
        .route("/tests/{id}/share", post(admin::issue_share_link))
        .route("/tests/{id}/results", get(admin::list_test_results))
        .route("/tests/{id}/score-check", get(admin::score_check))
        .route("/results/{id}", get(admin::get_result))
        // Auth runs first (outermost), then the admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/share", share_routes)
        .nest("/api/tests", test_routes)
        .nest("/api/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
