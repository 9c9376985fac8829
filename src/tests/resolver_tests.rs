use http::Method;

use crate::config::{AuthScheme, Resource};
use crate::resource::resolve_resource;

fn whitelist(path: &str, methods: Vec<Method>) -> Resource {
    Resource {
        path: path.to_string(),
        methods,
        provider: String::new(),
        scheme: AuthScheme::Whitelist,
    }
}

#[test]
fn first_declared_match_wins() {
    let resources = vec![
        whitelist("/v1/special/*", vec![Method::GET]),
        whitelist("/v1/*", vec![Method::GET]),
    ];

    let matched = resolve_resource(&resources, "/v1/special/file.txt", &Method::GET)
        .expect("resolver should not fail")
        .expect("resource should match");
    assert_eq!(matched.path, "/v1/special/*");

    let matched = resolve_resource(&resources, "/v1/other.txt", &Method::GET)
        .expect("resolver should not fail")
        .expect("resource should match");
    assert_eq!(matched.path, "/v1/*");
}

#[test]
fn method_gate_applies_before_pattern() {
    let resources = vec![
        whitelist("/v1/*", vec![Method::GET]),
        whitelist("/v1/*", vec![Method::PUT]),
    ];

    let matched = resolve_resource(&resources, "/v1/file.txt", &Method::PUT)
        .expect("resolver should not fail")
        .expect("resource should match");
    assert_eq!(matched.methods, vec![Method::PUT]);

    assert!(
        resolve_resource(&resources, "/v1/file.txt", &Method::DELETE)
            .expect("resolver should not fail")
            .is_none()
    );
}

#[test]
fn pattern_matches_literal_uri_with_query() {
    let resources = vec![whitelist("/v1/*", vec![Method::GET])];

    assert!(
        resolve_resource(&resources, "/v1/file.txt?version=2", &Method::GET)
            .expect("resolver should not fail")
            .is_some()
    );
}

#[test]
fn no_match_returns_none() {
    let resources = vec![whitelist("/v1/*", vec![Method::GET])];

    assert!(
        resolve_resource(&resources, "/v2/file.txt", &Method::GET)
            .expect("resolver should not fail")
            .is_none()
    );
}

#[test]
fn invalid_pattern_is_an_error() {
    let resources = vec![whitelist("/v1/[broken", vec![Method::GET])];

    assert!(resolve_resource(&resources, "/v1/file.txt", &Method::GET).is_err());
}
