use base64::Engine;
use oauth2::{
    AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, ExtraTokenFields, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, Scope, StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::session::UserProfile;
use super::{OidcSettings, join_path};
use crate::error::AppError;

const SCOPES: &[&str] = &["openid", "profile", "email"];

/// Subset of the provider's `.well-known/openid-configuration` document.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    #[serde(default)]
    pub issuer: Option<String>,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
}

/// Fetch the provider metadata document below the issuer URL.
pub async fn discover(http: &reqwest::Client, issuer: &Url) -> Result<ProviderMetadata, AppError> {
    let url = join_path(issuer, ".well-known/openid-configuration")?;
    let metadata: ProviderMetadata = http
        .get(url.as_str())
        .header("Accept", "application/json")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    info!(issuer = %issuer, "identity provider discovered");
    Ok(metadata)
}

/// Build the OAuth2 client for the discovered endpoints.
pub fn build_oauth2_client(
    settings: &OidcSettings,
    metadata: &ProviderMetadata,
) -> Result<OidcOauth2Client, AppError> {
    let mut client = OAuth2Client::new(ClientId::new(settings.client_id.clone()))
        .set_auth_uri(AuthUrl::from_url(metadata.authorization_endpoint.clone()))
        .set_token_uri(TokenUrl::from_url(metadata.token_endpoint.clone()))
        .set_redirect_uri(RedirectUrl::from_url(settings.redirect_url()?));
    if let Some(secret) = settings.client_secret.as_ref() {
        client = client.set_client_secret(ClientSecret::new(secret.clone()));
    }
    Ok(client)
}

/// Authorization URL carrying a fresh CSRF state and the PKCE challenge.
pub fn authorize_url(client: &OidcOauth2Client, challenge: PkceCodeChallenge) -> (Url, CsrfToken) {
    SCOPES
        .iter()
        .fold(client.authorize_url(CsrfToken::new_random), |req, scope| {
            req.add_scope(Scope::new((*scope).to_string()))
        })
        .set_pkce_challenge(challenge)
        .url()
}

/// Exchange the authorization code and resolve the signed-in user's profile.
pub async fn exchange_code(
    client: &OidcOauth2Client,
    http: &reqwest::Client,
    metadata: &ProviderMetadata,
    code: AuthorizationCode,
    verifier: PkceCodeVerifier,
) -> Result<UserProfile, AppError> {
    let token: OidcTokenResponse = client
        .exchange_code(code)
        .set_pkce_verifier(verifier)
        .request_async(http)
        .await?;
    debug!("authorization code exchanged");

    if let Some(userinfo) = metadata.userinfo_endpoint.as_ref() {
        match fetch_userinfo(http, userinfo, token.access_token().secret()).await {
            Ok(profile) => return Ok(profile),
            Err(e) => warn!(error = %e, "userinfo request failed; falling back to id_token"),
        }
    }

    let claims = token
        .extra_fields()
        .id_token
        .as_deref()
        .and_then(claims_from_id_token)
        .ok_or_else(|| AppError::OidcFlow("no user profile in token response".to_string()))?;
    Ok(serde_json::from_value(claims)?)
}

async fn fetch_userinfo(
    http: &reqwest::Client,
    endpoint: &Url,
    access_token: &str,
) -> Result<UserProfile, AppError> {
    let profile = http
        .get(endpoint.as_str())
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .send()
        .await?
        .error_for_status()?
        .json::<UserProfile>()
        .await?;
    Ok(profile)
}

/// Decode the (unverified) claims segment of an id_token. The token comes
/// straight from the token endpoint over TLS, so signature checks are skipped.
pub fn claims_from_id_token(id_token: &str) -> Option<Value> {
    let payload_b64 = id_token.split('.').nth(1)?;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64.trim_end_matches('='))
        .ok()?;
    let claims = serde_json::from_slice::<Value>(&decoded).ok()?;
    claims.is_object().then_some(claims)
}

/// Where to send the browser after the local session is cleared.
pub fn logout_url(settings: &OidcSettings, metadata: Option<&ProviderMetadata>) -> Result<Url, AppError> {
    if settings.auth0_logout {
        let mut url = join_path(&settings.issuer_base_url, "v2/logout")?;
        url.query_pairs_mut()
            .append_pair("client_id", &settings.client_id)
            .append_pair("returnTo", settings.base_url.as_str());
        return Ok(url);
    }

    if let Some(end_session) = metadata.and_then(|m| m.end_session_endpoint.as_ref()) {
        let mut url = end_session.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &settings.client_id)
            .append_pair("post_logout_redirect_uri", settings.base_url.as_str());
        return Ok(url);
    }

    Ok(settings.base_url.clone())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OidcTokenField {
    #[serde(rename = "id_token")]
    pub id_token: Option<String>,
}
impl ExtraTokenFields for OidcTokenField {}

pub type OidcTokenResponse = StandardTokenResponse<OidcTokenField, BasicTokenType>;

pub type OidcOauth2Client = OAuth2Client<
    BasicErrorResponse,
    OidcTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;
