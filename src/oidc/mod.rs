//! OpenID Connect login for the web UI.
//!
//! Layout:
//! - `endpoints.rs`: provider discovery, authorization URL, code exchange, userinfo, logout URL
//! - `session.rs`: encrypted session and login-flow cookies

pub mod endpoints;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::cookie::Key;
use tokio::sync::OnceCell;
use url::Url;

use crate::error::AppError;
use endpoints::ProviderMetadata;

/// Minimum secret length accepted for deriving the cookie key.
const MIN_SECRET_LEN: usize = 32;

/// Identity-provider configuration.
#[derive(Debug, Clone)]
pub struct OidcSettings {
    pub secret: String,
    pub base_url: Url,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub issuer_base_url: Url,
    /// Redirect anonymous requests to `/login`.
    pub auth_required: bool,
    /// Log out at the provider's `/v2/logout` endpoint too.
    pub auth0_logout: bool,
}

impl OidcSettings {
    pub fn new(
        secret: &str,
        base_url: &str,
        client_id: &str,
        issuer_base_url: &str,
    ) -> Result<Self, AppError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Config(format!(
                "AUTH_SECRET must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(Self {
            secret: secret.to_string(),
            base_url: Url::parse(base_url)?,
            client_id: client_id.to_string(),
            client_secret: None,
            issuer_base_url: Url::parse(issuer_base_url)?,
            auth_required: false,
            auth0_logout: true,
        })
    }

    pub fn with_client_secret(mut self, client_secret: Option<String>) -> Self {
        self.client_secret = client_secret.filter(|s| !s.is_empty());
        self
    }

    /// `{BASE_URL}/callback`
    pub fn redirect_url(&self) -> Result<Url, AppError> {
        Ok(join_path(&self.base_url, "callback")?)
    }

    /// Session cookies are marked `Secure` when the app is served over https.
    pub fn secure_cookies(&self) -> bool {
        self.base_url.scheme() == "https"
    }
}

/// Append a path segment to a base URL without discarding its own path.
pub(crate) fn join_path(base: &Url, segment: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(segment)
}

/// Process-wide identity-provider client shared by the login routes and the
/// session extractor.
#[derive(Clone)]
pub struct OidcClient {
    settings: Arc<OidcSettings>,
    key: Key,
    http: reqwest::Client,
    metadata: Arc<OnceCell<ProviderMetadata>>,
}

impl OidcClient {
    pub fn new(settings: OidcSettings) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bookshelf/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        let key = Key::derive_from(settings.secret.as_bytes());

        Ok(Self {
            settings: Arc::new(settings),
            key,
            http,
            metadata: Arc::new(OnceCell::new()),
        })
    }

    pub fn settings(&self) -> &OidcSettings {
        &self.settings
    }

    /// Key for the private (encrypted) cookie jar.
    pub fn cookie_key(&self) -> Key {
        self.key.clone()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Provider metadata, discovered on first use and cached afterwards.
    /// A failed discovery is not cached.
    pub async fn metadata(&self) -> Result<&ProviderMetadata, AppError> {
        self.metadata
            .get_or_try_init(|| endpoints::discover(&self.http, &self.settings.issuer_base_url))
            .await
    }
}
