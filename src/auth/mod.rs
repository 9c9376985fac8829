//! Authentication stage: resolve the governing resource and run its scheme.

pub mod basic;
pub mod header;
pub mod oidc;

use http::request::Parts;
use tracing::{debug, error};

use crate::config::{AuthScheme, Config, Resource};
use crate::error::SandbarError;
use crate::metrics::MetricsRecorder;
use crate::resource::resolve_resource;
use crate::responder::{self, ProxyResponse};
use crate::users::User;
use crate::utils::request_uri;

use self::oidc::OidcRegistry;

/// Outcome of the authentication stage for one request.
pub enum AuthDecision<'a> {
    /// Continue to authorization and the upstream with this context.
    Pass(RequestAuth<'a>),
    /// Stop here and send this response.
    Reply(ProxyResponse),
}

/// Request-scoped context carried from authentication to authorization.
#[derive(Default)]
pub struct RequestAuth<'a> {
    pub resource: Option<&'a Resource>,
    pub user: Option<User>,
}

/// Run the authentication stage for one request.
///
/// With no resources configured every request passes through untouched.
/// Once any resource exists, a request matching none of them is denied:
/// unlisted paths under a protected mount must not fall open.
pub fn authenticate<'a>(
    config: &'a Config,
    registry: &OidcRegistry,
    metrics: &dyn MetricsRecorder,
    parts: &Parts,
) -> AuthDecision<'a> {
    if config.resources.is_empty() {
        debug!("no resource declared, skipping authentication");
        return AuthDecision::Pass(RequestAuth::default());
    }

    let path = request_uri(parts);

    let resource = match resolve_resource(&config.resources, path, &parts.method) {
        Ok(resource) => resource,
        Err(err) => return AuthDecision::Reply(responder::internal_server_error(&err, path)),
    };
    let Some(resource) = resource else {
        error!(path = %path, method = %parts.method, "no resource found for request, denying access");
        return AuthDecision::Reply(responder::forbidden("anonymous", path));
    };

    debug!(path = %path, resource = %resource.path, scheme = resource.scheme.kind(), "resource matched");

    let outcome = match &resource.scheme {
        AuthScheme::Whitelist => {
            debug!(path = %path, "resource is whitelisted, skipping authentication");
            return AuthDecision::Pass(RequestAuth {
                resource: Some(resource),
                user: None,
            });
        }
        AuthScheme::Basic(basic_cfg) => {
            match config.auth_providers.basic.get(&resource.provider) {
                Some(provider_cfg) => basic::authenticate(
                    parts,
                    &provider_cfg.realm,
                    &basic_cfg.credentials,
                    &resource.provider,
                    metrics,
                ),
                None => Err(unknown_provider(&resource.provider, path)),
            }
        }
        AuthScheme::Header(_) => match config.auth_providers.header.get(&resource.provider) {
            Some(provider_cfg) => {
                header::authenticate(parts, provider_cfg, &resource.provider, metrics)
            }
            None => Err(unknown_provider(&resource.provider, path)),
        },
        AuthScheme::Oidc(_) => match registry.provider(&resource.provider) {
            Some(provider) => provider.authenticate_request(parts, metrics),
            None => Err(unknown_provider(&resource.provider, path)),
        },
    };

    match outcome {
        Ok(user) => AuthDecision::Pass(RequestAuth {
            resource: Some(resource),
            user: Some(user),
        }),
        Err(response) => AuthDecision::Reply(response),
    }
}

fn unknown_provider(provider: &str, path: &str) -> ProxyResponse {
    // Config validation rejects unknown providers, so reaching this means
    // the snapshot and the registry disagree.
    let err = SandbarError::Configuration(format!("provider {provider} is not configured"));
    responder::internal_server_error(&err, path)
}
