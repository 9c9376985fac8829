pub(crate) mod config_tests;
pub(crate) mod oidc_tests;
pub(crate) mod resolver_tests;

use http::Request;
use http::request::Parts;

/// Build request parts for pipeline-stage tests.
pub(crate) fn parts_for(method: &str, uri: &str, headers: &[(&str, &str)]) -> Parts {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let (parts, ()) = builder.body(()).expect("failed to build request").into_parts();
    parts
}
