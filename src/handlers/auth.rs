use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use oauth2::{AuthorizationCode, PkceCodeChallenge, PkceCodeVerifier};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::error::AppError;
use crate::oidc::endpoints::{authorize_url, build_oauth2_client, exchange_code, logout_url};
use crate::oidc::session::{
    AppSession, LoginFlow, clear_session, sanitize_return_to, store_login_flow, store_session,
    take_login_flow,
};
use crate::router::AppState;

/// Routes attached at the base URL: `/login`, `/callback`, `/logout`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /login -> redirects to the provider's authorization endpoint.
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
    jar: PrivateCookieJar,
) -> Result<Response, AppError> {
    let settings = state.oidc.settings();
    let metadata = state.oidc.metadata().await?;
    let client = build_oauth2_client(settings, metadata)?;

    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let (auth_url, csrf_token) = authorize_url(&client, challenge);
    let return_to = sanitize_return_to(query.return_to.as_deref());

    let jar = store_login_flow(
        jar,
        &csrf_token,
        verifier.secret(),
        &return_to,
        settings.secure_cookies(),
    );

    info!("Dispatching login redirect");
    Ok((jar, Redirect::to(auth_url.as_str())).into_response())
}

/// GET /callback -> exchanges the authorization code and starts a session.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: PrivateCookieJar,
) -> Response {
    let (flow, jar) = match take_login_flow(jar) {
        Ok(data) => data,
        Err((jar, err)) => return respond_with_error(jar, err),
    };
    let return_to = flow.return_to.clone();

    let session = match complete_login(&state, query, flow).await {
        Ok(session) => session,
        Err(err) => return respond_with_error(jar, err),
    };

    let jar = match store_session(jar, &session, state.oidc.settings().secure_cookies()) {
        Ok(jar) => jar,
        Err((jar, err)) => return respond_with_error(jar, err),
    };

    info!(sub = %session.user.sub, "user signed in");
    (jar, Redirect::to(&return_to)).into_response()
}

async fn complete_login(
    state: &AppState,
    query: CallbackQuery,
    flow: LoginFlow,
) -> Result<AppSession, AppError> {
    if let Some(error) = query.error {
        warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or(""),
            "identity provider returned an error"
        );
        return Err(AppError::Oauth2Server { error });
    }

    let state_param = query
        .state
        .ok_or_else(|| AppError::OidcFlow("missing `state` in callback".to_string()))?;
    if !bool::from(state_param.as_bytes().ct_eq(flow.csrf_state.as_bytes())) {
        return Err(AppError::OidcFlow("CSRF state mismatch".to_string()));
    }

    let code = query
        .code
        .ok_or_else(|| AppError::OidcFlow("missing `code` in callback".to_string()))?;

    let metadata = state.oidc.metadata().await?;
    let client = build_oauth2_client(state.oidc.settings(), metadata)?;
    let profile = exchange_code(
        &client,
        state.oidc.http(),
        metadata,
        AuthorizationCode::new(code),
        PkceCodeVerifier::new(flow.pkce_verifier),
    )
    .await?;

    Ok(AppSession::new(profile))
}

/// GET /logout -> clears the session and hands off to the provider's logout.
pub async fn logout(State(state): State<AppState>, jar: PrivateCookieJar) -> Response {
    let jar = clear_session(jar);
    let settings = state.oidc.settings();

    let metadata = if settings.auth0_logout {
        None
    } else {
        state
            .oidc
            .metadata()
            .await
            .inspect_err(|e| warn!(error = %e, "discovery failed during logout"))
            .ok()
    };

    match logout_url(settings, metadata) {
        Ok(target) => {
            info!("user signed out");
            (jar, Redirect::to(target.as_str())).into_response()
        }
        Err(err) => respond_with_error(jar, err),
    }
}

fn respond_with_error(jar: PrivateCookieJar, err: AppError) -> Response {
    (jar, err.into_response()).into_response()
}
