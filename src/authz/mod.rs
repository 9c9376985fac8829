//! Authorization stage: decide whether the authenticated caller may reach
//! the matched resource.

pub mod acl;
pub mod opa;

use http::request::Parts;
use tracing::{debug, info};

use crate::auth::RequestAuth;
use crate::config::{AclResourceConfig, AuthScheme};
use crate::error::SandbarError;
use crate::metrics::MetricsRecorder;
use crate::responder::{self, ProxyResponse};
use crate::users::User;
use crate::utils::request_uri;

/// Outcome of the authorization stage.
pub enum AuthzDecision {
    Allow,
    Reply(ProxyResponse),
}

/// Authorize one request against its resolved resource.
///
/// Basic-authenticated resources carry no authorization rules of their own;
/// OIDC and Header resources evaluate their ACL or delegate to the
/// configured policy server.
pub async fn authorize(
    auth: &RequestAuth<'_>,
    parts: &Parts,
    remote_addr: &str,
    http_client: &reqwest::Client,
    metrics: &dyn MetricsRecorder,
) -> AuthzDecision {
    let Some(resource) = auth.resource else {
        debug!("no resource found, authentication was skipped, skipping authorization too");
        return AuthzDecision::Allow;
    };

    let path = request_uri(parts);

    match &resource.scheme {
        AuthScheme::Whitelist => {
            debug!(path = %path, "authorization skipped because resource is whitelisted");
            AuthzDecision::Allow
        }
        AuthScheme::Basic(_) => {
            let Some(user) = &auth.user else {
                return AuthzDecision::Reply(missing_user(path));
            };
            info!(user = %user.identifier(), "Basic auth user authorized");
            metrics.inc_authorized("basic-auth", &resource.provider);
            AuthzDecision::Allow
        }
        AuthScheme::Oidc(acl) => {
            let Some(user) = &auth.user else {
                return AuthzDecision::Reply(missing_user(path));
            };
            let (kind, authorized) = if acl.authorization_opa_server.is_some() {
                ("oidc-opa", delegate(acl, user, parts, remote_addr, http_client).await)
            } else {
                (
                    "oidc-basic",
                    Ok(acl::is_oidc_authorized(
                        user.groups(),
                        user.email(),
                        &acl.authorization_accesses,
                    )),
                )
            };
            finish(kind, authorized, user, &resource.provider, path, metrics)
        }
        AuthScheme::Header(acl) => {
            let Some(user) = &auth.user else {
                return AuthzDecision::Reply(missing_user(path));
            };
            let (kind, authorized) = if acl.authorization_opa_server.is_some() {
                (
                    "header-oidc-opa",
                    delegate(acl, user, parts, remote_addr, http_client).await,
                )
            } else {
                (
                    "header-oidc-basic",
                    Ok(acl::is_header_authorized(
                        user.groups(),
                        user.email(),
                        &acl.authorization_accesses,
                    )),
                )
            };
            finish(kind, authorized, user, &resource.provider, path, metrics)
        }
    }
}

async fn delegate(
    acl: &AclResourceConfig,
    user: &User,
    parts: &Parts,
    remote_addr: &str,
    http_client: &reqwest::Client,
) -> Result<bool, SandbarError> {
    // Presence was checked by the caller.
    let Some(opa) = &acl.authorization_opa_server else {
        return Err(SandbarError::Configuration(
            "no OPA server configured".to_string(),
        ));
    };
    opa::is_opa_authorized(http_client, opa, user, parts, remote_addr).await
}

fn finish(
    kind: &str,
    authorized: Result<bool, SandbarError>,
    user: &User,
    provider: &str,
    path: &str,
    metrics: &dyn MetricsRecorder,
) -> AuthzDecision {
    match authorized {
        Err(err) => AuthzDecision::Reply(responder::internal_server_error(&err, path)),
        Ok(false) => AuthzDecision::Reply(responder::forbidden(user.identifier(), path)),
        Ok(true) => {
            info!(user = %user.identifier(), kind = %kind, "user authorized");
            metrics.inc_authorized(kind, provider);
            AuthzDecision::Allow
        }
    }
}

fn missing_user(path: &str) -> ProxyResponse {
    let err = SandbarError::Other("no authenticated user for protected resource".to_string());
    responder::internal_server_error(&err, path)
}
