//! Basic authentication against statically configured credentials.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::header::AUTHORIZATION;
use http::request::Parts;
use tracing::info;

use crate::config::BasicUserCredentials;
use crate::metrics::MetricsRecorder;
use crate::responder::{self, ProxyResponse};
use crate::users::User;
use crate::utils::request_uri;

const METRIC_KIND: &str = "basic-auth";

/// Decode the `Authorization: Basic` header into a username/password pair.
fn parse_basic_auth(parts: &Parts) -> Option<(String, String)> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    if value.len() < 6 || !value[..6].eq_ignore_ascii_case("basic ") {
        return None;
    }
    let decoded = BASE64.decode(value[6..].trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Authenticate a request against the resource's credential list.
///
/// Every failure path answers 401 with a `WWW-Authenticate` challenge for
/// the provider's realm so browsers prompt for credentials.
pub(super) fn authenticate(
    parts: &Parts,
    realm: &str,
    credentials: &[BasicUserCredentials],
    provider: &str,
    metrics: &dyn MetricsRecorder,
) -> Result<User, ProxyResponse> {
    let path = request_uri(parts);

    let Some((username, password)) = parse_basic_auth(parts) else {
        return Err(responder::basic_auth_challenge(
            realm,
            "no basic auth detected in request",
            path,
        ));
    };

    let Some(cred) = credentials.iter().find(|cred| cred.user == username) else {
        return Err(responder::basic_auth_challenge(
            realm,
            &format!("username {username} not found in authorized users"),
            path,
        ));
    };

    // An empty configured password never matches, whatever was supplied.
    if cred.password.is_empty() || cred.password.value() != password {
        return Err(responder::basic_auth_challenge(
            realm,
            &format!("username {username} not authorized"),
            path,
        ));
    }

    info!(user = %username, "Basic auth user authenticated");
    metrics.inc_authenticated(METRIC_KIND, provider);

    Ok(User::Basic { username })
}
