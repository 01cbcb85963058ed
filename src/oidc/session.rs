use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use oauth2::CsrfToken;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::error::AppError;

pub const SESSION_COOKIE: &str = "appSession";
const CSRF_COOKIE: &str = "oidc_csrf_state";
const PKCE_COOKIE: &str = "oidc_pkce_verifier";
const RETURN_TO_COOKIE: &str = "oidc_return_to";

const SESSION_TTL_HOURS: i64 = 24;
const LOGIN_FLOW_TTL_MINUTES: i64 = 15;

/// Profile of the signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.nickname.as_deref())
            .or(self.email.as_deref())
            .unwrap_or(&self.sub)
    }
}

/// Contents of the encrypted `appSession` cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSession {
    pub user: UserProfile,
    pub expires_at: DateTime<Utc>,
}

impl AppSession {
    pub fn new(user: UserProfile) -> Self {
        Self {
            user,
            expires_at: Utc::now() + ChronoDuration::hours(SESSION_TTL_HOURS),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Read the current session. Missing, undecryptable, malformed or expired
/// cookies all count as anonymous.
pub fn load_session(jar: &PrivateCookieJar) -> Option<AppSession> {
    let cookie = jar.get(SESSION_COOKIE)?;
    serde_json::from_str::<AppSession>(cookie.value())
        .ok()
        .filter(|s| !s.is_expired())
}

/// Write the session cookie. On failure the jar is handed back unchanged.
pub fn store_session(
    jar: PrivateCookieJar,
    session: &AppSession,
    secure: bool,
) -> Result<PrivateCookieJar, (PrivateCookieJar, AppError)> {
    let value = match serde_json::to_string(session) {
        Ok(value) => value,
        Err(e) => return Err((jar, e.into())),
    };
    Ok(jar.add(build_cookie(
        SESSION_COOKIE,
        value,
        Duration::hours(SESSION_TTL_HOURS),
        secure,
    )))
}

pub fn clear_session(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(clear_cookie(SESSION_COOKIE))
}

/// Values carried from `/login` to `/callback`.
#[derive(Debug)]
pub struct LoginFlow {
    pub csrf_state: String,
    pub pkce_verifier: String,
    pub return_to: String,
}

pub fn store_login_flow(
    jar: PrivateCookieJar,
    csrf: &CsrfToken,
    pkce_verifier: &str,
    return_to: &str,
    secure: bool,
) -> PrivateCookieJar {
    let ttl = Duration::minutes(LOGIN_FLOW_TTL_MINUTES);
    jar.add(build_cookie(CSRF_COOKIE, csrf.secret().to_string(), ttl, secure))
        .add(build_cookie(PKCE_COOKIE, pkce_verifier.to_string(), ttl, secure))
        .add(build_cookie(RETURN_TO_COOKIE, return_to.to_string(), ttl, secure))
}

/// Read and clear the login-flow cookies. The returned jar always has them removed.
pub fn take_login_flow(
    jar: PrivateCookieJar,
) -> Result<(LoginFlow, PrivateCookieJar), (PrivateCookieJar, AppError)> {
    let csrf_state = jar.get(CSRF_COOKIE).map(|c| c.value().to_owned());
    let pkce_verifier = jar.get(PKCE_COOKIE).map(|c| c.value().to_owned());
    let return_to = jar
        .get(RETURN_TO_COOKIE)
        .map(|c| c.value().to_owned())
        .unwrap_or_else(|| "/".to_string());
    let jar = clear_login_flow(jar);

    let Some(csrf_state) = csrf_state else {
        return Err((
            jar,
            AppError::OidcFlow("missing login state cookie".to_string()),
        ));
    };
    let Some(pkce_verifier) = pkce_verifier else {
        return Err((
            jar,
            AppError::OidcFlow("missing PKCE verifier cookie".to_string()),
        ));
    };

    Ok((
        LoginFlow {
            csrf_state,
            pkce_verifier,
            return_to,
        },
        jar,
    ))
}

fn clear_login_flow(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(clear_cookie(CSRF_COOKIE))
        .remove(clear_cookie(PKCE_COOKIE))
        .remove(clear_cookie(RETURN_TO_COOKIE))
}

/// Only same-site absolute paths are accepted as post-login targets.
/// Browsers drop tabs and newlines from URLs, so control characters could
/// turn `/\t/host` into `//host`; they are rejected outright.
pub fn sanitize_return_to(candidate: Option<&str>) -> String {
    match candidate {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

fn build_cookie(name: &str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

fn clear_cookie(name: &str) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), ""))
        .path("/")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Key;

    fn profile() -> UserProfile {
        UserProfile {
            sub: "auth0|42".to_string(),
            name: None,
            nickname: Some("ada".to_string()),
            email: Some("ada@example.com".to_string()),
            picture: None,
        }
    }

    #[test]
    fn session_round_trips_through_private_jar() {
        let jar = PrivateCookieJar::new(Key::generate());
        let session = AppSession::new(profile());
        let Ok(jar) = store_session(jar, &session, false) else {
            panic!("session should serialize");
        };
        assert_eq!(load_session(&jar), Some(session));

        let jar = clear_session(jar);
        assert_eq!(load_session(&jar), None);
    }

    #[test]
    fn expired_session_is_anonymous() {
        let jar = PrivateCookieJar::new(Key::generate());
        let session = AppSession {
            user: profile(),
            expires_at: Utc::now() - ChronoDuration::minutes(1),
        };
        let Ok(jar) = store_session(jar, &session, false) else {
            panic!("session should serialize");
        };
        assert_eq!(load_session(&jar), None);
    }

    #[test]
    fn login_flow_is_consumed_once() {
        let jar = PrivateCookieJar::new(Key::generate());
        let csrf = CsrfToken::new("state-1".to_string());
        let jar = store_login_flow(jar, &csrf, "verifier", "/books", false);

        let Ok((flow, jar)) = take_login_flow(jar) else {
            panic!("login flow cookies should be present");
        };
        assert_eq!(flow.csrf_state, "state-1");
        assert_eq!(flow.pkce_verifier, "verifier");
        assert_eq!(flow.return_to, "/books");

        let Err((_, err)) = take_login_flow(jar) else {
            panic!("login flow cookies should have been cleared");
        };
        assert!(matches!(err, AppError::OidcFlow(_)));
    }

    #[test]
    fn return_to_rejects_foreign_targets() {
        assert_eq!(sanitize_return_to(Some("/authors/3")), "/authors/3");
        assert_eq!(sanitize_return_to(Some("//evil.example")), "/");
        assert_eq!(sanitize_return_to(Some("https://evil.example")), "/");
        assert_eq!(sanitize_return_to(Some("/\t/evil.example")), "/");
        assert_eq!(sanitize_return_to(Some("/\r\n/evil.example")), "/");
        assert_eq!(sanitize_return_to(None), "/");
    }

    #[test]
    fn display_name_prefers_name_then_nickname() {
        assert_eq!(profile().display_name(), "ada");
    }
}
