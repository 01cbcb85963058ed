use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};
use axum_extra::extract::cookie::Key;
use tower::Layer;
use tower::util::{MapRequest, MapRequestLayer};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::config::Config;
use crate::db::Database;
use crate::handlers::{auth, authors, books, health, index};
use crate::middleware::auth::{attach_auth_state, attach_view_locals};
use crate::middleware::compression::{compression_layer, mark_opt_out};
use crate::middleware::method_override::method_override;
use crate::oidc::OidcClient;
use crate::views::Views;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub oidc: OidcClient,
    pub views: Arc<Views>,
}

impl AppState {
    pub fn new(config: Config, db: Database, oidc: OidcClient, views: Views) -> Self {
        Self {
            config: Arc::new(config),
            db,
            oidc,
            views: Arc::new(views),
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.oidc.cookie_key()
    }
}

/// The application service: [`app_router`] behind the `_method` rewrite.
pub type App = MapRequest<Router, fn(Request) -> Request>;

/// Routes and middleware. Outermost first: trace, auth state, compression,
/// compression opt-out, view locals, then routes with static files as fallback.
pub fn app_router(state: AppState) -> Router {
    let public_dir = state.config.public_dir.clone();

    Router::new()
        .route("/test", get(health::app_running))
        .merge(auth::router())
        .merge(index::router())
        .nest("/authors", authors::router())
        .nest("/books", books::router())
        .fallback_service(ServeDir::new(public_dir))
        .layer(from_fn_with_state(state.clone(), attach_view_locals))
        .layer(from_fn(mark_opt_out))
        .layer(compression_layer())
        .layer(from_fn_with_state(state.clone(), attach_auth_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Method override has to run before routing, so it wraps the whole router
/// instead of being one of its layers.
pub fn build_app(state: AppState) -> App {
    MapRequestLayer::new(method_override as fn(Request) -> Request).layer(app_router(state))
}
