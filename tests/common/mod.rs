#![allow(dead_code)]

use std::path::{Path, PathBuf};

use axum::{
    body::{Body, to_bytes},
    http::{Request, Response, header},
    response::IntoResponse,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use bookshelf::config::Config;
use bookshelf::db::Database;
use bookshelf::oidc::session::{AppSession, UserProfile, store_login_flow, store_session};
use bookshelf::oidc::{OidcClient, OidcSettings};
use bookshelf::views::Views;
use oauth2::CsrfToken;
use bookshelf::{AppState, build_app};
use bookshelf::router::App;
use tempfile::TempDir;

pub const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-key-derivation";

pub struct TestApp {
    pub app: App,
    pub state: AppState,
    /// Keeps the temporary public dir and database alive.
    pub dir: TempDir,
}

pub fn settings() -> OidcSettings {
    settings_for_issuer("https://tenant.example.com")
}

pub fn settings_for_issuer(issuer: &str) -> OidcSettings {
    OidcSettings::new(TEST_SECRET, "http://localhost:5000", "test-client", issuer)
        .expect("valid settings")
}

pub fn views_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("views")
}

/// App with a disconnected database and an empty temporary public dir.
pub fn spawn_app() -> TestApp {
    spawn_with_settings(settings())
}

/// App with a disconnected database and the given provider settings.
pub fn spawn_with_settings(settings: OidcSettings) -> TestApp {
    spawn_with(Database::disconnected(), settings)
}

/// App backed by a fresh sqlite file.
pub async fn spawn_app_with_db() -> TestApp {
    let test = spawn_app();
    let url = format!("sqlite:{}", test.dir.path().join("library.sqlite").display());
    test.state.db.connect(&url).await.expect("connect test database");
    test
}

fn spawn_with(db: Database, settings: OidcSettings) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let public_dir = dir.path().join("public");
    std::fs::create_dir_all(&public_dir).expect("public dir");

    let config = Config {
        public_dir,
        views_dir: views_dir(),
        ..Config::default()
    };
    let views = Views::load(&config.views_dir).expect("views");
    let oidc = OidcClient::new(settings).expect("oidc client");
    let state = AppState::new(config, db, oidc, views);

    TestApp {
        app: build_app(state.clone()),
        state,
        dir,
    }
}

pub fn profile() -> UserProfile {
    UserProfile {
        sub: "auth0|42".to_string(),
        name: Some("Ada Lovelace".to_string()),
        nickname: Some("ada".to_string()),
        email: Some("ada@example.com".to_string()),
        picture: None,
    }
}

/// `Cookie` header value carrying a valid encrypted session.
pub fn session_cookie(state: &AppState) -> String {
    let jar = PrivateCookieJar::new(state.oidc.cookie_key());
    let Ok(jar) = store_session(jar, &AppSession::new(profile()), false) else {
        panic!("failed to store session");
    };
    cookie_header(jar)
}

/// `Cookie` header value carrying the cookies `/login` sets before the redirect.
pub fn login_flow_cookie(state: &AppState, csrf_state: &str) -> String {
    let jar = PrivateCookieJar::new(state.oidc.cookie_key());
    let jar = store_login_flow(
        jar,
        &CsrfToken::new(csrf_state.to_string()),
        "test-pkce-verifier",
        "/authors",
        false,
    );
    cookie_header(jar)
}

fn cookie_header(jar: PrivateCookieJar) -> String {
    let res = (jar, ()).into_response();
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("failed to build request")
}

pub fn post_form(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .expect("failed to build request")
}

pub async fn body_bytes(resp: Response<Body>) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body")
        .to_vec()
}

pub async fn body_string(resp: Response<Body>) -> String {
    String::from_utf8(body_bytes(resp).await).expect("response body was not utf-8")
}

pub fn location(resp: &Response<Body>) -> &str {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("missing location header")
}
