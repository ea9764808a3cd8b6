pub mod account;
pub mod admin;
pub mod auth;
pub mod dto;
pub mod lectures;
pub mod middleware;
pub mod quiz;
pub mod rest;
pub mod state;
pub mod teacher;

pub use middleware::require_auth;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::web::rest::ApiDoc;
use crate::web::state::AppState;

/// Builds the complete application: public auth routes, the cookie-protected
/// API, and the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    let config = app_state.config.clone();

    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
    let cors = match config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!("Ignoring invalid CORS_ORIGIN '{}': {}", config.cors_origin, e);
            cors
        }
    };

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(account::me_handler).put(account::update_me_handler))
        .route("/me/grades", get(account::my_grades_handler))
        .route("/lectures", get(lectures::list_lectures_handler))
        .route("/lectures/{id}", get(lectures::lecture_detail_handler))
        .route("/lectures/{id}/attendance", post(lectures::attendance_handler))
        .route("/lectures/{id}/notes", put(lectures::save_note_handler))
        .route(
            "/lectures/{id}/quiz",
            get(quiz::quiz_handler).post(quiz::submit_quiz_handler),
        )
        .route("/attempts/{id}/result", get(quiz::quiz_result_handler))
        .route(
            "/teacher/lectures",
            get(teacher::dashboard_handler).post(teacher::create_lecture_handler),
        )
        .route(
            "/teacher/lectures/{id}",
            put(teacher::update_lecture_handler).delete(teacher::delete_lecture_handler),
        )
        .route(
            "/teacher/lectures/{id}/document",
            put(teacher::upload_document_handler),
        )
        .route(
            "/teacher/lectures/{id}/questions/import",
            post(teacher::import_questions_handler),
        )
        .route("/teacher/categories", post(teacher::create_category_handler))
        .route("/teacher/results", get(teacher::results_handler))
        .route("/teacher/attendance", get(teacher::attendance_report_handler))
        .route("/teacher/reports/email", post(teacher::email_report_handler))
        .route(
            "/admin/users",
            get(admin::list_users_handler).post(admin::create_user_handler),
        )
        .route(
            "/admin/users/{id}",
            put(admin::update_user_handler).delete(admin::delete_user_handler),
        )
        .route("/admin/users/{id}/password", post(admin::set_password_handler))
        .route(
            "/admin/departments",
            get(admin::list_departments_handler).post(admin::create_department_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
