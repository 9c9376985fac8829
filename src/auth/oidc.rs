//! OpenID Connect authentication.
//!
//! Each configured provider is discovered once at startup and kept as
//! read-only runtime state: issuer metadata, a client bound to the
//! configured client ID, and the resolved login and callback endpoint
//! paths. Requests then flow through three entry points: the login
//! endpoint (hand the browser to the identity provider), the callback
//! endpoint (exchange the authorization code and set the session cookie),
//! and per-request authentication (verify the bearer token or cookie).

use std::collections::HashMap;
use std::str::FromStr;

use http::header::{AUTHORIZATION, SET_COOKIE};
use http::request::Parts;
use http::{HeaderValue, StatusCode};
use openidconnect::core::{
    CoreAuthDisplay, CoreAuthPrompt, CoreAuthenticationFlow, CoreErrorResponseType,
    CoreGenderClaim, CoreJsonWebKey, CoreJweContentEncryptionAlgorithm, CoreJwsSigningAlgorithm,
    CoreProviderMetadata, CoreRevocableToken, CoreRevocationErrorResponse, CoreTokenIntrospectionResponse,
    CoreTokenType,
};
use openidconnect::{
    AccessToken, AdditionalClaims, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken,
    EmptyAdditionalClaims, EndpointMaybeSet, EndpointNotSet, EndpointSet, ExtraTokenFields,
    IdToken, IssuerUrl, Nonce, OAuth2TokenResponse, RedirectUrl, RefreshToken, Scope,
    StandardErrorResponse, StandardTokenResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use crate::config::OidcProviderConfig;
use crate::constants::{BEARER_SCHEME, REDIRECT_QUERY_KEY};
use crate::error::SandbarError;
use crate::metrics::MetricsRecorder;
use crate::responder::{self, ProxyResponse};
use crate::users::User;
use crate::utils::{cookie_value, query_escape, query_param, query_unescape, request_host, request_uri};

const METRIC_KIND: &str = "oidc";
const OPENID_SCOPE: &str = "openid";

/// Token response keeping the raw `id_token` string, which is what goes
/// into the session cookie.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct RawIdTokenFields {
    id_token: Option<String>,
}

impl ExtraTokenFields for RawIdTokenFields {}

type RawTokenResponse = StandardTokenResponse<RawIdTokenFields, CoreTokenType>;

/// Local wrapper so the orphan rule allows implementing the
/// `openidconnect::TokenResponse` bound that `openidconnect::Client`
/// requires of its token response type.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
struct OidcTokenResponse(RawTokenResponse);

impl std::ops::Deref for OidcTokenResponse {
    type Target = RawTokenResponse;

    fn deref(&self) -> &RawTokenResponse {
        &self.0
    }
}

impl OAuth2TokenResponse for OidcTokenResponse {
    type TokenType = CoreTokenType;

    fn access_token(&self) -> &AccessToken {
        self.0.access_token()
    }

    fn token_type(&self) -> &CoreTokenType {
        self.0.token_type()
    }

    fn expires_in(&self) -> Option<std::time::Duration> {
        self.0.expires_in()
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        self.0.refresh_token()
    }

    fn scopes(&self) -> Option<&Vec<Scope>> {
        self.0.scopes()
    }
}

// The typed accessor cannot be derived from the raw `id_token` string, and
// nothing calls it: the callback handler reads the raw field through
// `extra_fields()` instead.
impl
    openidconnect::TokenResponse<
        EmptyAdditionalClaims,
        CoreGenderClaim,
        CoreJweContentEncryptionAlgorithm,
        CoreJwsSigningAlgorithm,
    > for OidcTokenResponse
{
    fn id_token(
        &self,
    ) -> Option<
        &IdToken<
            EmptyAdditionalClaims,
            CoreGenderClaim,
            CoreJweContentEncryptionAlgorithm,
            CoreJwsSigningAlgorithm,
        >,
    > {
        None
    }
}

type OidcClient = Client<
    EmptyAdditionalClaims,
    CoreAuthDisplay,
    CoreGenderClaim,
    CoreJweContentEncryptionAlgorithm,
    CoreJsonWebKey,
    CoreAuthPrompt,
    StandardErrorResponse<CoreErrorResponseType>,
    OidcTokenResponse,
    CoreTokenIntrospectionResponse,
    CoreRevocableToken,
    CoreRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

/// Captures every non-standard claim so group memberships survive the
/// typed claim parsing.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
struct FlatClaims(serde_json::Map<String, Value>);

impl AdditionalClaims for FlatClaims {}

type ProviderIdToken =
    IdToken<FlatClaims, CoreGenderClaim, CoreJweContentEncryptionAlgorithm, CoreJwsSigningAlgorithm>;

/// Which OIDC endpoint a request path addresses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OidcEndpoint {
    Login,
    Callback,
}

/// All discovered providers, looked up by provider key or endpoint path.
#[derive(Default)]
pub struct OidcRegistry {
    providers: HashMap<String, OidcProvider>,
}

impl OidcRegistry {
    /// Discover every configured provider. Fails startup when any issuer
    /// is unreachable, which beats serving requests that can never be
    /// authenticated.
    pub async fn build(
        configs: &HashMap<String, OidcProviderConfig>,
        http_client: &reqwest::Client,
    ) -> Result<Self, SandbarError> {
        let mut providers = HashMap::new();
        for (key, cfg) in configs {
            let provider = OidcProvider::build(key, cfg, http_client.clone()).await?;
            info!(
                provider = %key,
                login = %provider.login_path,
                callback = %provider.callback_path,
                "OIDC provider registered"
            );
            providers.insert(key.clone(), provider);
        }
        Ok(OidcRegistry { providers })
    }

    pub fn provider(&self, key: &str) -> Option<&OidcProvider> {
        self.providers.get(key)
    }

    /// Match a request path against the registered login/callback paths.
    pub fn match_endpoint(&self, path: &str) -> Option<(&OidcProvider, OidcEndpoint)> {
        self.providers.values().find_map(|provider| {
            if provider.login_path == path {
                Some((provider, OidcEndpoint::Login))
            } else if provider.callback_path == path {
                Some((provider, OidcEndpoint::Callback))
            } else {
                None
            }
        })
    }
}

/// Runtime state of one discovered provider.
pub struct OidcProvider {
    key: String,
    config: OidcProviderConfig,
    client: OidcClient,
    http_client: reqwest::Client,
    login_path: String,
    callback_path: String,
}

impl OidcProvider {
    async fn build(
        key: &str,
        cfg: &OidcProviderConfig,
        http_client: reqwest::Client,
    ) -> Result<Self, SandbarError> {
        let issuer = IssuerUrl::new(cfg.issuer_url.clone())
            .map_err(|err| SandbarError::OidcDiscovery(format!("invalid issuer URL: {err}")))?;
        let metadata = CoreProviderMetadata::discover_async(issuer, &http_client)
            .await
            .map_err(|err| {
                SandbarError::OidcDiscovery(format!("failed to discover provider {key}: {err}"))
            })?;

        let client_id = ClientId::new(cfg.client_id.clone());
        let client_secret = cfg
            .client_secret
            .as_ref()
            .map(|secret| ClientSecret::new(secret.value().to_string()));
        let mut client = OidcClient::from_provider_metadata(metadata, client_id, client_secret);

        // The callback endpoint lives under the fixed redirect URL when one
        // is configured, otherwise at the bare callback path.
        let callback_path = match &cfg.redirect_url {
            Some(redirect_url) => {
                let mut url = Url::parse(redirect_url)?;
                let joined = join_paths(url.path(), &cfg.callback_path);
                url.set_path(&joined);
                client = client.set_redirect_uri(RedirectUrl::from_url(url));
                joined
            }
            None => cfg.callback_path.clone(),
        };

        Ok(OidcProvider {
            key: key.to_string(),
            config: cfg.clone(),
            client,
            http_client,
            login_path: cfg.login_path.clone(),
            callback_path,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    /// Login endpoint: bind the post-login target into the CSRF state and
    /// hand the browser to the identity provider.
    pub fn handle_login(&self, parts: &Parts) -> ProxyResponse {
        let rd = query_param(parts, REDIRECT_QUERY_KEY).unwrap_or_default();
        let state = format!("{}:{}", self.config.state, query_escape(&rd));

        let mut request = self.client.authorize_url(
            CoreAuthenticationFlow::AuthorizationCode,
            move || CsrfToken::new(state),
            Nonce::new_random,
        );
        for scope in &self.config.scopes {
            // The openid scope is always added by the client itself.
            if scope != OPENID_SCOPE {
                request = request.add_scope(Scope::new(scope.clone()));
            }
        }
        let (auth_url, _csrf, _nonce) = request.url();

        responder::found_redirect(auth_url.as_str())
    }

    /// Callback endpoint: validate state and redirect target, exchange the
    /// authorization code, verify the ID token, then set the session cookie
    /// and send the browser back where it wanted to go.
    pub async fn handle_callback(&self, parts: &Parts) -> ProxyResponse {
        let path = &self.callback_path;

        let Some(state) = query_param(parts, "state") else {
            return responder::bad_request("state not found in query params", path);
        };
        let redirect_target = match parse_state(&state, &self.config.state) {
            Ok(target) => target,
            Err(message) => return responder::bad_request(&message, path),
        };

        if let Some(target) = &redirect_target {
            let Some(host) = request_host(parts) else {
                let err =
                    SandbarError::Other("cannot determine request host".to_string());
                return responder::internal_server_error(&err, path);
            };
            if !is_valid_redirect(target, &host) {
                return responder::bad_request("redirect url is invalid", path);
            }
        }

        let code = query_param(parts, "code").unwrap_or_default();
        let token_response = match self.exchange_code(code).await {
            Ok(response) => response,
            Err(err) => return responder::unauthorized(&err.to_string(), path),
        };

        let Some(raw_id_token) = token_response.extra_fields().id_token.clone() else {
            return responder::unauthorized("no id_token field in token", path);
        };

        let claims = match self.verify_token(&raw_id_token) {
            Ok(claims) => claims,
            Err(err) => return responder::unauthorized(&err.to_string(), path),
        };

        let expiry = token_response
            .expires_in()
            .map(|lifetime| chrono::Utc::now().timestamp() + lifetime.as_secs() as i64)
            .or_else(|| claims.get("exp").and_then(Value::as_i64));

        let cookie = self.session_cookie(&raw_id_token, request_host(parts).as_deref(), expiry);
        let target = redirect_target.as_deref().unwrap_or("/");

        info!(provider = %self.key, "Successful authentication detected");
        let mut response = responder::temporary_redirect(target);
        if response.status() != StatusCode::TEMPORARY_REDIRECT {
            return response;
        }
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
                response
            }
            Err(err) => responder::internal_server_error(&err, path),
        }
    }

    async fn exchange_code(&self, code: String) -> Result<OidcTokenResponse, SandbarError> {
        self.client
            .exchange_code(AuthorizationCode::new(code))
            .map_err(|err| {
                SandbarError::TokenExchange(format!("failed to exchange token: {err}"))
            })?
            .request_async(&self.http_client)
            .await
            .map_err(|err| {
                SandbarError::TokenExchange(format!("failed to exchange token: {err}"))
            })
    }

    fn session_cookie(&self, id_token: &str, host: Option<&str>, expiry: Option<i64>) -> String {
        let mut builder = cookie::Cookie::build((self.config.cookie_name.clone(), id_token))
            .http_only(true)
            .secure(self.config.cookie_secure)
            .path("/");
        if let Some(domain) = host.and_then(|host| cookie_domain_for_host(&self.config.cookie_domains, host))
        {
            builder = builder.domain(domain.to_string());
        }
        if let Some(expires) =
            expiry.and_then(|ts| cookie::time::OffsetDateTime::from_unix_timestamp(ts).ok())
        {
            builder = builder.expires(expires);
        }
        builder.build().to_string()
    }

    /// Authenticate a proxied request from its bearer token or session
    /// cookie.
    ///
    /// No token at all sends the browser through the login flow; a token
    /// that is present but fails verification is answered with an error
    /// page instead, so a broken or forged token never loops through the
    /// identity provider.
    pub fn authenticate_request(
        &self,
        parts: &Parts,
        metrics: &dyn MetricsRecorder,
    ) -> Result<User, ProxyResponse> {
        let path = request_uri(parts);

        let token = match get_jwt_token(parts, &self.config.cookie_name) {
            Ok(token) => token,
            Err(err) => return Err(responder::internal_server_error(&err, path)),
        };

        if token.is_empty() {
            debug!(path = %path, "no auth header or cookie detected, redirecting to oidc login");
            return Err(self.login_redirect(parts));
        }

        let claims = match self.verify_token(&token) {
            Ok(claims) => claims,
            Err(err) => return Err(responder::internal_server_error(&err, path)),
        };

        let user = build_user(&claims, &self.config.group_claim, self.config.email_verified);

        info!(provider = %self.key, user = %user.identifier(), "OIDC user authenticated");
        metrics.inc_authenticated(METRIC_KIND, &self.key);

        if self.config.email_verified && !user.email().is_empty() && !user.email_verified() {
            error!(user = %user.identifier(), "email not verified");
            return Err(responder::forbidden(user.identifier(), path));
        }

        Ok(user)
    }

    fn login_redirect(&self, parts: &Parts) -> ProxyResponse {
        let current_uri = request_uri(parts);
        if current_uri == self.login_path {
            responder::temporary_redirect(&self.login_path)
        } else {
            let target = format!(
                "{}?{}={}",
                self.login_path,
                REDIRECT_QUERY_KEY,
                query_escape(current_uri)
            );
            responder::temporary_redirect(&target)
        }
    }

    /// Verify an ID token against the cached verifier and return its claims
    /// as a flat map.
    fn verify_token(&self, raw: &str) -> Result<serde_json::Map<String, Value>, SandbarError> {
        let id_token = ProviderIdToken::from_str(raw).map_err(|err| {
            SandbarError::TokenVerification(format!("cannot parse ID token: {err}"))
        })?;
        let verifier = self.client.id_token_verifier();
        // The nonce is not round-tripped through the session cookie, so
        // accept whatever the token carries.
        let claims = id_token
            .claims(&verifier, |_: Option<&Nonce>| Ok(()))
            .map_err(|err| {
                SandbarError::TokenVerification(format!("failed to verify ID Token: {err}"))
            })?;

        match serde_json::to_value(claims)? {
            Value::Object(map) => Ok(map),
            _ => Err(SandbarError::TokenVerification(
                "token claims are not an object".to_string(),
            )),
        }
    }
}

/// Extract the token to verify: `Authorization: Bearer` wins over the
/// session cookie. A missing token is an empty string, not an error;
/// a malformed header or unreadable cookie is an error.
fn get_jwt_token(parts: &Parts, cookie_name: &str) -> Result<String, String> {
    if let Some(header) = parts.headers.get(AUTHORIZATION) {
        let value = header
            .to_str()
            .map_err(|err| format!("unreadable authorization header: {err}"))?;
        if !value.is_empty() {
            let split: Vec<&str> = value.split(' ').collect();
            if split.len() != 2 || split[0] != BEARER_SCHEME {
                return Err("authorization header doesn't follow bearer format".to_string());
            }
            if !split[1].is_empty() {
                return Ok(split[1].to_string());
            }
        }
    }

    Ok(cookie_value(parts, cookie_name)?.unwrap_or_default())
}

/// Split a callback `state` value into the CSRF check and the redirect
/// target it carries.
fn parse_state(state: &str, configured: &str) -> Result<Option<String>, String> {
    let (token, rd) = state.split_once(':').unwrap_or((state, ""));
    if token != configured {
        return Err("state did not match".to_string());
    }
    let rd = query_unescape(rd);
    if rd.is_empty() { Ok(None) } else { Ok(Some(rd)) }
}

/// A redirect target is only followed when it is an absolute http(s) URL
/// pointing back at the host the request came in on. Everything else,
/// including values that fail to parse, is rejected.
fn is_valid_redirect(candidate: &str, request_host: &str) -> bool {
    if !candidate.starts_with("http://") && !candidate.starts_with("https://") {
        return false;
    }
    let Ok(parsed) = Url::parse(candidate) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    authority == request_host
}

/// First configured cookie domain the request host falls under.
fn cookie_domain_for_host<'a>(domains: &'a [String], host: &str) -> Option<&'a str> {
    domains
        .iter()
        .find(|domain| host.ends_with(domain.as_str()))
        .map(String::as_str)
}

fn join_paths(base: &str, tail: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        tail.trim_start_matches('/')
    )
}

fn claim_str(claims: &serde_json::Map<String, Value>, key: &str) -> String {
    claims
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Build the user from verified token claims.
///
/// `email_verified` is only read from the token when the provider requires
/// verification and an email claim is present; group claim entries that are
/// not strings are stringified rather than dropped.
fn build_user(
    claims: &serde_json::Map<String, Value>,
    group_claim: &str,
    require_email_verified: bool,
) -> User {
    let email = claim_str(claims, "email");
    let email_verified = if require_email_verified && !email.is_empty() {
        claims
            .get("email_verified")
            .and_then(Value::as_bool)
            .unwrap_or_default()
    } else {
        false
    };

    let groups = claims
        .get(group_claim)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(group) => group.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    User::Oidc {
        preferred_username: claim_str(claims, "preferred_username"),
        name: claim_str(claims, "name"),
        given_name: claim_str(claims, "given_name"),
        family_name: claim_str(claims, "family_name"),
        email,
        email_verified,
        groups,
    }
}
