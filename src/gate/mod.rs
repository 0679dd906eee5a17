#![allow(clippy::needless_for_each)]

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware::from_fn,
    response::Json,
    routing::{get, patch, post},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;

pub(crate) mod handlers;
pub mod middleware;
pub mod state;

pub use middleware::CurrentSession;
pub use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::login,
        handlers::auth::session,
        handlers::auth::access_token,
        handlers::auth::logout,
        handlers::admin::list_users,
        handlers::admin::create_user,
        handlers::admin::update_user,
    ),
    components(schemas(
        handlers::health::Health,
        handlers::auth::LoginRequest,
        handlers::auth::AccessToken,
        handlers::admin::UserView,
        handlers::admin::CreateUser,
        handlers::admin::PatchUser,
        crate::session::Session,
        crate::session::TokenError,
        crate::directory::UserStatus,
    )),
    tags(
        (name = "trakgate", description = "FastTrak sign-in and session API")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the application router.
///
/// `allowed_origin` is the frontend origin allowed to make credentialed
/// cross-origin calls; without it no CORS headers are emitted.
pub fn router(state: Arc<AppState>, allowed_origin: Option<HeaderValue>) -> Router {
    let cors = match allowed_origin {
        Some(origin) => CorsLayer::new()
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .allow_methods([Method::GET, Method::POST, Method::PATCH])
            .allow_origin(origin)
            .allow_credentials(true),
        None => CorsLayer::new(),
    };

    let api = Router::new()
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/session", get(handlers::session))
        .route("/api/auth/access-token", get(handlers::access_token))
        .route("/api/auth/logout", post(handlers::logout))
        .route(
            "/api/admin/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/api/admin/users/:id", patch(handlers::update_user))
        .route_layer(from_fn(middleware::resolve_session));

    Router::new()
        .merge(api)
        .route("/openapi.json", get(|| async { Json(openapi()) }))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        )
        .route("/health", get(handlers::health).options(handlers::health))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    state: Arc<AppState>,
    allowed_origin: Option<HeaderValue>,
) -> Result<()> {
    let app = router(state, allowed_origin);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/api/auth/login",
            "/api/auth/session",
            "/api/auth/access-token",
            "/api/auth/logout",
            "/api/admin/users",
            "/api/admin/users/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
