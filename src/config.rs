//! Configuration snapshot consumed by the pipeline.
//!
//! A snapshot is loaded once, validated, and then shared read-only for its
//! whole lifetime; requests never mutate it. Validation turns the loosely
//! typed YAML shape (where whitelist/basic/oidc/header are all optional
//! fields) into a [`AuthScheme`] sum type so the dispatcher has no
//! "no case matched" branch left to defend.

use std::collections::HashMap;
use std::path::Path;

use glob::Pattern;
use http::Method;
use masked_string::MaskedString;
use regex::Regex;
use serde::Deserialize;

use crate::error::SandbarError;

pub const DEFAULT_OIDC_SCOPES: [&str; 3] = ["openid", "email", "profile"];
pub const DEFAULT_OIDC_GROUP_CLAIM: &str = "groups";
pub const DEFAULT_OIDC_COOKIE_NAME: &str = "oidc";
pub const DEFAULT_EMAIL_HEADER: &str = "x-forwarded-email";
pub const DEFAULT_USERNAME_HEADER: &str = "x-forwarded-preferred-username";
pub const DEFAULT_GROUPS_HEADER: &str = "x-forwarded-groups";

/// Methods a resource policy may declare.
const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::PUT, Method::DELETE, Method::HEAD];

/// Validated configuration snapshot.
#[derive(Debug, Clone)]
pub struct Config {
    pub resources: Vec<Resource>,
    pub auth_providers: AuthProviders,
}

/// A resource policy: path pattern + methods bound to exactly one
/// authentication requirement.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Glob pattern matched against the literal request-URI string.
    pub path: String,
    pub methods: Vec<Method>,
    /// Provider key, empty for whitelisted resources.
    pub provider: String,
    pub scheme: AuthScheme,
}

/// The single active authentication requirement of a resource.
#[derive(Debug, Clone)]
pub enum AuthScheme {
    Whitelist,
    Basic(BasicResourceConfig),
    Oidc(AclResourceConfig),
    Header(AclResourceConfig),
}

impl AuthScheme {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthScheme::Whitelist => "whitelist",
            AuthScheme::Basic(_) => "basic",
            AuthScheme::Oidc(_) => "oidc",
            AuthScheme::Header(_) => "header",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicResourceConfig {
    pub credentials: Vec<BasicUserCredentials>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicUserCredentials {
    pub user: String,
    #[serde(default)]
    pub password: MaskedString,
}

/// Authorization settings shared by the OIDC and Header schemes: either an
/// ordered ACL or delegation to an external policy server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AclResourceConfig {
    #[serde(default)]
    pub authorization_accesses: Vec<AccessControlEntry>,
    #[serde(default)]
    pub authorization_opa_server: Option<OpaServerConfig>,
}

/// One ordered ACL rule. At least one of group/email must be set; regex
/// entries are compiled during config validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlEntry {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub regexp: bool,
    #[serde(default)]
    pub forbidden: bool,
    #[serde(skip)]
    pub group_regexp: Option<Regex>,
    #[serde(skip)]
    pub email_regexp: Option<Regex>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpaServerConfig {
    pub url: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProviders {
    #[serde(default)]
    pub basic: HashMap<String, BasicProviderConfig>,
    #[serde(default)]
    pub oidc: HashMap<String, OidcProviderConfig>,
    #[serde(default)]
    pub header: HashMap<String, HeaderProviderConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicProviderConfig {
    /// Realm sent in the `WWW-Authenticate` challenge. Defaults to the
    /// provider key.
    #[serde(default)]
    pub realm: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderProviderConfig {
    #[serde(default = "default_username_header")]
    pub username_header: String,
    #[serde(default = "default_email_header")]
    pub email_header: String,
    #[serde(default = "default_groups_header")]
    pub groups_header: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcProviderConfig {
    #[serde(rename = "clientID", default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<MaskedString>,
    #[serde(default)]
    pub issuer_url: String,
    /// Fixed redirect URL registered with the identity provider. When unset
    /// the provider must have a single registered redirect URI of its own.
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default = "default_oidc_scopes")]
    pub scopes: Vec<String>,
    /// CSRF state secret, prepended to every `state` query parameter.
    #[serde(default)]
    pub state: String,
    #[serde(default = "default_group_claim")]
    pub group_claim: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Require the identity provider to report the email as verified.
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub cookie_secure: bool,
    /// Defaults to `/auth/<provider-key>`.
    #[serde(default)]
    pub login_path: String,
    /// Defaults to `/auth/<provider-key>/callback`.
    #[serde(default)]
    pub callback_path: String,
    /// Allowed cookie domains, matched by suffix against the request host.
    #[serde(default)]
    pub cookie_domains: Vec<String>,
}

fn default_oidc_scopes() -> Vec<String> {
    DEFAULT_OIDC_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_group_claim() -> String {
    DEFAULT_OIDC_GROUP_CLAIM.to_string()
}

fn default_cookie_name() -> String {
    DEFAULT_OIDC_COOKIE_NAME.to_string()
}

fn default_username_header() -> String {
    DEFAULT_USERNAME_HEADER.to_string()
}

fn default_email_header() -> String {
    DEFAULT_EMAIL_HEADER.to_string()
}

fn default_groups_header() -> String {
    DEFAULT_GROUPS_HEADER.to_string()
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

/// YAML shape before validation: the scheme fields are all optional here and
/// reduced to [`AuthScheme`] by [`Config::from_raw`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    resources: Vec<RawResource>,
    #[serde(default)]
    auth_providers: AuthProviders,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResource {
    path: String,
    #[serde(default = "default_methods")]
    methods: Vec<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    white_list: Option<bool>,
    #[serde(default)]
    basic: Option<BasicResourceConfig>,
    #[serde(default)]
    oidc: Option<AclResourceConfig>,
    #[serde(default)]
    header: Option<AclResourceConfig>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, SandbarError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, SandbarError> {
        let raw: RawConfig = serde_yaml::from_str(contents)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, SandbarError> {
        let mut auth_providers = raw.auth_providers;

        for (key, basic) in auth_providers.basic.iter_mut() {
            if basic.realm.is_empty() {
                basic.realm = key.clone();
            }
        }

        for (key, oidc) in auth_providers.oidc.iter_mut() {
            if oidc.client_id.is_empty() {
                return Err(SandbarError::Configuration(format!(
                    "oidc provider {key} has no clientID"
                )));
            }
            if oidc.issuer_url.is_empty() {
                return Err(SandbarError::Configuration(format!(
                    "oidc provider {key} has no issuerUrl"
                )));
            }
            if oidc.state.is_empty() {
                return Err(SandbarError::Configuration(format!(
                    "oidc provider {key} has no state"
                )));
            }
            if oidc.login_path.is_empty() {
                oidc.login_path = format!("/auth/{key}");
            }
            if oidc.callback_path.is_empty() {
                oidc.callback_path = format!("/auth/{key}/callback");
            }
        }

        let mut resources = Vec::with_capacity(raw.resources.len());
        for res in raw.resources {
            resources.push(validate_resource(res, &auth_providers)?);
        }

        Ok(Config {
            resources,
            auth_providers,
        })
    }
}

fn validate_resource(
    raw: RawResource,
    providers: &AuthProviders,
) -> Result<Resource, SandbarError> {
    if raw.path.is_empty() {
        return Err(SandbarError::Configuration(
            "resource with empty path".to_string(),
        ));
    }
    // Reject patterns up front so the resolver never sees one it can't
    // compile.
    Pattern::new(&raw.path)?;

    let mut methods = Vec::with_capacity(raw.methods.len());
    for method in &raw.methods {
        let parsed = Method::from_bytes(method.as_bytes()).map_err(|_| {
            SandbarError::Configuration(format!(
                "resource {}: invalid method {method}",
                raw.path
            ))
        })?;
        if !ALLOWED_METHODS.contains(&parsed) {
            return Err(SandbarError::Configuration(format!(
                "resource {}: method {method} not supported, must be one of GET, PUT, DELETE, HEAD",
                raw.path
            )));
        }
        methods.push(parsed);
    }
    if methods.is_empty() {
        return Err(SandbarError::Configuration(format!(
            "resource {} has no methods",
            raw.path
        )));
    }

    let whitelisted = raw.white_list.unwrap_or(false);
    let declared = [
        whitelisted,
        raw.basic.is_some(),
        raw.oidc.is_some(),
        raw.header.is_some(),
    ]
    .iter()
    .filter(|active| **active)
    .count();
    if declared != 1 {
        return Err(SandbarError::Configuration(format!(
            "resource {} must declare exactly one of whiteList, basic, oidc or header",
            raw.path
        )));
    }

    if whitelisted {
        return Ok(Resource {
            path: raw.path,
            methods,
            provider: String::new(),
            scheme: AuthScheme::Whitelist,
        });
    }

    let provider = raw.provider.unwrap_or_default();
    if provider.is_empty() {
        return Err(SandbarError::Configuration(format!(
            "resource {} has no provider",
            raw.path
        )));
    }

    let scheme = if let Some(basic) = raw.basic {
        if !providers.basic.contains_key(&provider) {
            return Err(SandbarError::Configuration(format!(
                "resource {}: unknown basic provider {provider}",
                raw.path
            )));
        }
        if basic.credentials.is_empty() {
            return Err(SandbarError::Configuration(format!(
                "resource {} has no basic credentials",
                raw.path
            )));
        }
        AuthScheme::Basic(basic)
    } else if let Some(oidc) = raw.oidc {
        if !providers.oidc.contains_key(&provider) {
            return Err(SandbarError::Configuration(format!(
                "resource {}: unknown oidc provider {provider}",
                raw.path
            )));
        }
        AuthScheme::Oidc(compile_acl(oidc, &raw.path)?)
    } else if let Some(header) = raw.header {
        if !providers.header.contains_key(&provider) {
            return Err(SandbarError::Configuration(format!(
                "resource {}: unknown header provider {provider}",
                raw.path
            )));
        }
        AuthScheme::Header(compile_acl(header, &raw.path)?)
    } else {
        // Unreachable after the exactly-one check above.
        return Err(SandbarError::Configuration(format!(
            "resource {} has no recognized authentication scheme",
            raw.path
        )));
    };

    Ok(Resource {
        path: raw.path,
        methods,
        provider,
        scheme,
    })
}

fn compile_acl(mut acl: AclResourceConfig, path: &str) -> Result<AclResourceConfig, SandbarError> {
    for entry in acl.authorization_accesses.iter_mut() {
        if entry.group.is_empty() && entry.email.is_empty() {
            return Err(SandbarError::Configuration(format!(
                "resource {path}: access entry must set group or email"
            )));
        }
        if entry.regexp {
            if !entry.group.is_empty() {
                entry.group_regexp = Some(Regex::new(&entry.group)?);
            }
            if !entry.email.is_empty() {
                entry.email_regexp = Some(Regex::new(&entry.email)?);
            }
        }
    }
    Ok(acl)
}
