//! HTTP router.
//!
//! Returns a composable `Router` mounted under `/api/`. Everything except
//! the health probe and the identity hand-off endpoints requires a bearer
//! session.
//!
//! Middleware uses `Extension<ApiContext>` (injected as the outermost
//! layer); endpoint handlers use `State<ApiContext>` via `with_state`.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints::{auth, cases, files, health, messages};
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::config::MAX_UPLOAD_BODY_BYTES;

pub fn api_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/cases", get(cases::list).post(cases::create))
        .route(
            "/cases/:id",
            get(cases::detail).put(cases::update).delete(cases::delete),
        )
        .route("/cases/:id/submit", post(cases::submit))
        .route("/cases/:id/confirm-payment", post(cases::confirm_payment))
        .route("/cases/:id/claim", post(cases::claim))
        .route("/cases/:id/phase1", post(cases::phase1))
        .route("/cases/:id/diagnostics", post(cases::diagnostics))
        .route("/cases/:id/phase2", post(cases::phase2))
        .route("/cases/:id/bundle", post(cases::bundle))
        // The default 2 MiB body cap would reject any real radiograph; the
        // upload route gets a ceiling sized for a full batch instead.
        .route(
            "/cases/:id/files",
            post(files::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES)),
        )
        .route(
            "/cases/:id/messages",
            get(messages::list).post(messages::post),
        )
        .route("/files/:id", get(files::download).delete(files::remove))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext.
        .layer(axum::Extension(ctx.clone()));

    let unprotected = Router::new()
        .route("/health", get(health::check))
        .route("/auth/provision", post(auth::provision))
        .route("/auth/session", post(auth::session))
        .with_state(ctx);

    Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
