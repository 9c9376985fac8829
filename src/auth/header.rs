//! Header authentication: trust identity headers stamped by a fronting
//! authenticating proxy.

use http::request::Parts;
use tracing::info;

use crate::config::HeaderProviderConfig;
use crate::error::SandbarError;
use crate::metrics::MetricsRecorder;
use crate::responder::{self, ProxyResponse};
use crate::users::User;
use crate::utils::request_uri;

const METRIC_KIND: &str = "header-auth";

fn header_value(parts: &Parts, name: &str) -> String {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Build a user from the configured identity headers.
///
/// This scheme only runs behind a proxy that has already authenticated the
/// caller, so a missing username or email header is a deployment fault and
/// answers 500, not 401.
pub(super) fn authenticate(
    parts: &Parts,
    cfg: &HeaderProviderConfig,
    provider: &str,
    metrics: &dyn MetricsRecorder,
) -> Result<User, ProxyResponse> {
    let path = request_uri(parts);

    let email = header_value(parts, &cfg.email_header);
    let username = header_value(parts, &cfg.username_header);

    if email.is_empty() {
        let err = SandbarError::Other("cannot find email value from header".to_string());
        return Err(responder::internal_server_error(&err, path));
    }
    if username.is_empty() {
        let err = SandbarError::Other("cannot find username value from header".to_string());
        return Err(responder::internal_server_error(&err, path));
    }

    let groups_value = header_value(parts, &cfg.groups_header);
    let groups = if groups_value.is_empty() {
        Vec::new()
    } else {
        groups_value.split(',').map(str::to_string).collect()
    };

    let user = User::Header {
        username,
        email,
        groups,
    };

    info!(user = %user.identifier(), "Header auth user authenticated");
    metrics.inc_authenticated(METRIC_KIND, provider);

    Ok(user)
}
