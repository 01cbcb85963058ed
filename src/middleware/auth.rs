use std::convert::Infallible;

use axum::extract::{FromRef, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Key, PrivateCookieJar};
use tracing::debug;

use crate::oidc::session::{UserProfile, load_session};
use crate::router::AppState;
use crate::views::ViewLocals;

/// Login routes and the liveness probe; never redirected to `/login`.
const PUBLIC_PATHS: &[&str] = &["/login", "/logout", "/callback", "/test"];

/// Per-request authentication state derived from the session cookie.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    user: Option<UserProfile>,
}

impl AuthState {
    pub fn from_jar(jar: &PrivateCookieJar) -> Self {
        Self {
            user: load_session(jar).map(|s| s.user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }
}

impl<S> FromRequestParts<S> for AuthState
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<AuthState>() {
            return Ok(auth.clone());
        }
        let jar = PrivateCookieJar::<Key>::from_request_parts(parts, state).await?;
        Ok(Self::from_jar(&jar))
    }
}

/// Attach [`AuthState`] to the request. With `auth_required`, anonymous
/// requests outside the login routes are sent to `/login` first.
pub async fn attach_auth_state(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let auth = AuthState::from_jar(&jar);

    if state.oidc.settings().auth_required
        && !auth.is_authenticated()
        && !PUBLIC_PATHS.contains(&req.uri().path())
    {
        let return_to = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = format!(
            "/login?{}",
            url::form_urlencoded::Serializer::new(String::new())
                .append_pair("returnTo", return_to)
                .finish()
        );
        debug!(path = %req.uri().path(), "anonymous request redirected to login");
        return Redirect::to(&target).into_response();
    }

    req.extensions_mut().insert(auth);
    next.run(req).await
}

/// Copy the auth state into the values every rendered view receives.
pub async fn attach_view_locals(auth: AuthState, mut req: Request, next: Next) -> Response {
    let locals = ViewLocals {
        is_authenticated: auth.is_authenticated(),
        user: auth.user().cloned(),
    };
    req.extensions_mut().insert(locals);
    next.run(req).await
}

impl<S> FromRequestParts<S> for ViewLocals
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ViewLocals>()
            .cloned()
            .unwrap_or_default())
    }
}
