//! Resource resolution: map a request to the policy that governs it.

use glob::Pattern;
use http::Method;

use crate::config::Resource;
use crate::error::SandbarError;

/// Find the first resource whose method set and path pattern match the
/// request, in declaration order.
///
/// The pattern is matched against the literal request-URI string, query
/// string included. Returns `Ok(None)` when no resource matches, which the
/// dispatcher treats as an implicit deny once any resource is configured.
pub fn resolve_resource<'a>(
    resources: &'a [Resource],
    request_uri: &str,
    method: &Method,
) -> Result<Option<&'a Resource>, SandbarError> {
    for resource in resources {
        if !resource.methods.contains(method) {
            continue;
        }
        let pattern = Pattern::new(&resource.path)?;
        if pattern.matches(request_uri) {
            return Ok(Some(resource));
        }
    }
    Ok(None)
}
