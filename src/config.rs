use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::oidc::OidcSettings;

/// Environment variables read at startup. Names are matched case-insensitively.
const ENV_KEYS: &[&str] = &[
    "node_env",
    "auth_secret",
    "base_url",
    "client_id",
    "client_secret",
    "issuer_base_url",
    "database_url",
    "port",
    "loglevel",
    "public_dir",
    "views_dir",
];

/// Process configuration, read once at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node_env: Option<String>,
    pub auth_secret: Option<String>,
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub issuer_base_url: Option<String>,
    pub database_url: String,
    pub port: u16,
    pub loglevel: String,
    pub public_dir: PathBuf,
    pub views_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_env: None,
            auth_secret: None,
            base_url: None,
            client_id: None,
            client_secret: None,
            issuer_base_url: None,
            database_url: "sqlite:bookshelf.db".to_string(),
            port: 5000,
            loglevel: "info".to_string(),
            public_dir: PathBuf::from("public"),
            views_dir: PathBuf::from("views"),
        }
    }
}

impl Config {
    /// Merge built-in defaults with the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        let cfg = Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::raw().only(ENV_KEYS))
            .extract()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(cfg)
    }

    /// Identity-provider settings. `authRequired` is off and provider logout is on.
    pub fn identity(&self) -> Result<OidcSettings, AppError> {
        let secret = required(&self.auth_secret, "AUTH_SECRET")?;
        let base_url = required(&self.base_url, "BASE_URL")?;
        let client_id = required(&self.client_id, "CLIENT_ID")?;
        let issuer = required(&self.issuer_base_url, "ISSUER_BASE_URL")?;

        OidcSettings::new(secret, base_url, client_id, issuer)
            .map(|s| s.with_client_secret(self.client_secret.clone()))
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Config(format!("missing required environment variable {name}")))
}
