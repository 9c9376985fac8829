//! Request-level helpers shared across the pipeline stages.

use http::header::{COOKIE, HOST};
use http::request::Parts;

use crate::constants::{X_FORWARDED_HOST, X_FORWARDED_PROTO};

/// The literal request-URI string (path plus query), which is what resource
/// glob patterns are matched against.
pub fn request_uri(parts: &Parts) -> &str {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path())
}

/// Host of the incoming request, preferring `X-Forwarded-Host` set by a
/// fronting load balancer over the `Host` header.
pub fn request_host(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(X_FORWARDED_HOST)
        && let Ok(host) = value.to_str()
        && !host.is_empty()
    {
        return Some(host.to_string());
    }
    if let Some(host) = parts.uri.host() {
        return Some(host.to_string());
    }
    parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .map(|host| host.to_string())
}

/// Scheme of the incoming request. TLS termination happens upstream, so
/// `X-Forwarded-Proto` wins over the plaintext default.
pub fn request_scheme(parts: &Parts) -> &str {
    parts
        .headers
        .get(X_FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .filter(|scheme| !scheme.is_empty())
        .unwrap_or("http")
}

/// First value of a query parameter, percent-decoded.
pub fn query_param(parts: &Parts, key: &str) -> Option<String> {
    let query = parts.uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// URL-encode a single query value.
pub fn query_escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Decode a single URL-encoded query value.
pub fn query_unescape(value: &str) -> String {
    form_urlencoded::parse(value.as_bytes())
        .next()
        .map(|(k, _)| k.into_owned())
        .unwrap_or_default()
}

/// Read a cookie value from the request headers.
///
/// Returns `Ok(None)` when the cookie is simply absent; any unreadable or
/// unparseable cookie header is an error.
pub fn cookie_value(parts: &Parts, name: &str) -> Result<Option<String>, String> {
    for header in parts.headers.get_all(COOKIE) {
        let raw = header
            .to_str()
            .map_err(|err| format!("unreadable cookie header: {err}"))?;
        for parsed in cookie::Cookie::split_parse(raw) {
            let parsed = parsed.map_err(|err| format!("malformed cookie: {err}"))?;
            if parsed.name() == name {
                return Ok(Some(parsed.value().to_string()));
            }
        }
    }
    Ok(None)
}
