//! Delegation to an Open Policy Agent server.

use std::collections::HashMap;

use http::Version;
use http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::config::OpaServerConfig;
use crate::error::SandbarError;
use crate::users::User;
use crate::utils::{request_host, request_scheme, request_uri};

#[derive(Debug, Serialize)]
struct OpaInput<'a> {
    input: OpaInputData<'a>,
}

#[derive(Debug, Serialize)]
struct OpaInputData<'a> {
    user: &'a User,
    request: OpaRequest<'a>,
    tags: &'a HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct OpaRequest<'a> {
    method: String,
    protocol: &'a str,
    headers: HashMap<String, String>,
    #[serde(rename = "remoteAddr")]
    remote_addr: &'a str,
    scheme: &'a str,
    host: String,
    parsed_path: Vec<&'a str>,
    path: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpaAnswer {
    result: bool,
}

fn protocol(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Build the policy input document for one request.
fn build_input<'a>(
    opa: &'a OpaServerConfig,
    user: &'a User,
    parts: &'a Parts,
    remote_addr: &'a str,
) -> OpaInput<'a> {
    // First value wins for repeated headers, names lower-cased.
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            headers
                .entry(name.as_str().to_lowercase())
                .or_insert_with(|| value.to_string());
        }
    }

    let path = request_uri(parts);
    let parsed_path = path.split('/').filter(|segment| !segment.is_empty()).collect();

    OpaInput {
        input: OpaInputData {
            user,
            tags: &opa.tags,
            request: OpaRequest {
                method: parts.method.to_string(),
                protocol: protocol(parts.version),
                headers,
                remote_addr,
                scheme: request_scheme(parts),
                host: request_host(parts).unwrap_or_default(),
                parsed_path,
                path,
            },
        },
    }
}

/// Ask the configured OPA server for a verdict. Any transport or decoding
/// failure is surfaced as an error, never as a deny.
pub async fn is_opa_authorized(
    http_client: &reqwest::Client,
    opa: &OpaServerConfig,
    user: &User,
    parts: &Parts,
    remote_addr: &str,
) -> Result<bool, SandbarError> {
    let input = build_input(opa, user, parts, remote_addr);
    let answer: OpaAnswer = http_client
        .post(&opa.url)
        .json(&input)
        .send()
        .await?
        .json()
        .await?;
    Ok(answer.result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    #[test]
    fn input_document_shape() {
        let (parts, _) = Request::builder()
            .method("GET")
            .uri("/v1/test/file.txt?a=b")
            .header("Host", "proxy.example.com")
            .header("X-Custom", "one")
            .header("X-Custom", "two")
            .body(())
            .unwrap()
            .into_parts();

        let opa = OpaServerConfig {
            url: "http://opa:8181/v1/data/authz/allowed".to_string(),
            tags: HashMap::from([("env".to_string(), "test".to_string())]),
        };
        let user = User::Oidc {
            preferred_username: "jdoe".to_string(),
            name: String::new(),
            given_name: String::new(),
            family_name: String::new(),
            email: "jdoe@example.com".to_string(),
            email_verified: true,
            groups: vec!["admins".to_string()],
        };

        let input = build_input(&opa, &user, &parts, "10.0.0.1:4242");
        let value = serde_json::to_value(&input).unwrap();

        assert_eq!(value["input"]["user"]["email"], "jdoe@example.com");
        assert_eq!(value["input"]["user"]["preferredUsername"], "jdoe");
        assert_eq!(value["input"]["request"]["method"], "GET");
        assert_eq!(value["input"]["request"]["path"], "/v1/test/file.txt?a=b");
        assert_eq!(
            value["input"]["request"]["parsed_path"],
            serde_json::json!(["v1", "test", "file.txt?a=b"])
        );
        assert_eq!(value["input"]["request"]["remoteAddr"], "10.0.0.1:4242");
        assert_eq!(value["input"]["request"]["host"], "proxy.example.com");
        // Repeated headers keep their first value only.
        assert_eq!(value["input"]["request"]["headers"]["x-custom"], "one");
        assert_eq!(value["input"]["tags"]["env"], "test");
    }
}
