use std::convert::Infallible;
use std::sync::Arc;

use http::header::LOCATION;
use http::{Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use url::Url;

use crate::auth::oidc::{OidcEndpoint, OidcRegistry};
use crate::auth::{AuthDecision, authenticate};
use crate::config::Config;
use crate::logging::setup_test_logging;
use crate::metrics::TracingMetrics;
use crate::server::build_http_client;
use crate::tests::parts_for;
use crate::utils::query_escape;

/// Minimal identity provider: discovery document, an empty key set, and a
/// token endpoint that refuses every exchange.
async fn spawn_stub_idp() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind stub IdP");
    let addr = listener.local_addr().expect("stub IdP has no address");
    let issuer = format!("http://{addr}");
    let issuer_for_server = Arc::new(issuer.clone());

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let issuer = issuer_for_server.clone();
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(
                        TokioIo::new(stream),
                        service_fn(move |req| {
                            let issuer = issuer.clone();
                            async move {
                                let (status, body) = match req.uri().path() {
                                    "/.well-known/openid-configuration" => (
                                        StatusCode::OK,
                                        serde_json::json!({
                                            "issuer": *issuer,
                                            "authorization_endpoint": format!("{issuer}/authorize"),
                                            "token_endpoint": format!("{issuer}/token"),
                                            "jwks_uri": format!("{issuer}/keys"),
                                            "response_types_supported": ["code"],
                                            "subject_types_supported": ["public"],
                                            "id_token_signing_alg_values_supported": ["RS256"],
                                        })
                                        .to_string(),
                                    ),
                                    "/keys" => (StatusCode::OK, r#"{"keys":[]}"#.to_string()),
                                    "/token" => (
                                        StatusCode::BAD_REQUEST,
                                        r#"{"error":"invalid_grant"}"#.to_string(),
                                    ),
                                    _ => (StatusCode::NOT_FOUND, "{}".to_string()),
                                };
                                let response = Response::builder()
                                    .status(status)
                                    .header("content-type", "application/json")
                                    .body(Full::new(Bytes::from(body)))
                                    .expect("failed to build stub response");
                                Ok::<_, Infallible>(response)
                            }
                        }),
                    )
                    .await;
            });
        }
    });

    issuer
}

fn config_yaml(issuer: &str) -> String {
    format!(
        r#"
resources:
  - path: "/v1/*"
    provider: sso
    oidc: {{}}
authProviders:
  oidc:
    sso:
      clientID: client-1
      issuerUrl: {issuer}
      state: my-secret-state
"#
    )
}

async fn setup() -> (&'static Config, OidcRegistry) {
    setup_test_logging();
    let issuer = spawn_stub_idp().await;
    let config = Box::leak(Box::new(
        Config::from_yaml(&config_yaml(&issuer)).expect("config should load"),
    ));
    let client = build_http_client().expect("client should build");
    let registry = OidcRegistry::build(&config.auth_providers.oidc, &client)
        .await
        .expect("discovery against the stub IdP should succeed");
    (config, registry)
}

#[tokio::test]
async fn registry_matches_login_and_callback_paths() {
    let (_config, registry) = setup().await;

    let (provider, endpoint) = registry
        .match_endpoint("/auth/sso")
        .expect("login path should match");
    assert_eq!(provider.key(), "sso");
    assert_eq!(endpoint, OidcEndpoint::Login);

    let (_, endpoint) = registry
        .match_endpoint("/auth/sso/callback")
        .expect("callback path should match");
    assert_eq!(endpoint, OidcEndpoint::Callback);

    assert!(registry.match_endpoint("/auth/other").is_none());
}

#[tokio::test]
async fn login_redirects_to_idp_with_bound_state() {
    let (_config, registry) = setup().await;
    let provider = registry.provider("sso").expect("provider should exist");

    let parts = parts_for("GET", "/auth/sso?rd=%2Fv1%2Ftest%2Ffile.txt", &[]);
    let response = provider.handle_login(&parts);
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response.headers()[LOCATION]
        .to_str()
        .expect("location should be readable");
    let url = Url::parse(location).expect("location should be a URL");
    assert_eq!(url.path(), "/authorize");

    let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], "client-1");
    assert_eq!(query["response_type"], "code");
    // The redirect target rides inside the state, URL-encoded.
    assert_eq!(query["state"], "my-secret-state:%2Fv1%2Ftest%2Ffile.txt");
    assert!(query["scope"].contains("openid"));
    assert!(query["scope"].contains("email"));
    assert!(query["scope"].contains("profile"));
}

#[tokio::test]
async fn request_without_token_redirects_to_login() {
    let (config, registry) = setup().await;

    let parts = parts_for("GET", "/v1/test/file.txt", &[]);
    let AuthDecision::Reply(response) = authenticate(config, &registry, &TracingMetrics, &parts)
    else {
        panic!("expected reply");
    };
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()[LOCATION],
        "/auth/sso?rd=%2Fv1%2Ftest%2Ffile.txt"
    );
}

#[tokio::test]
async fn malformed_bearer_header_is_a_server_error() {
    let (config, registry) = setup().await;

    let parts = parts_for(
        "GET",
        "/v1/test/file.txt",
        &[("Authorization", "Bearer too many parts")],
    );
    let AuthDecision::Reply(response) = authenticate(config, &registry, &TracingMetrics, &parts)
    else {
        panic!("expected reply");
    };
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// A token that is present but does not verify is a system error, not a
// fresh trip through the login flow.
#[tokio::test]
async fn invalid_token_is_a_server_error_not_a_redirect() {
    let (config, registry) = setup().await;

    let parts = parts_for("GET", "/v1/test/file.txt", &[("Cookie", "oidc=garbage")]);
    let AuthDecision::Reply(response) = authenticate(config, &registry, &TracingMetrics, &parts)
    else {
        panic!("expected reply");
    };
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn callback_without_state_is_bad_request() {
    let (_config, registry) = setup().await;
    let provider = registry.provider("sso").expect("provider should exist");

    let parts = parts_for("GET", "/auth/sso/callback?code=abc", &[]);
    let response = provider.handle_callback(&parts).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_with_tampered_state_is_bad_request() {
    let (_config, registry) = setup().await;
    let provider = registry.provider("sso").expect("provider should exist");

    let uri = format!(
        "/auth/sso/callback?code=abc&state={}",
        query_escape("wrong-state:")
    );
    let parts = parts_for("GET", &uri, &[]);
    let response = provider.handle_callback(&parts).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_rejects_foreign_redirect_target() {
    let (_config, registry) = setup().await;
    let provider = registry.provider("sso").expect("provider should exist");

    let state = format!("my-secret-state:{}", query_escape("http://evil.com/loot"));
    let uri = format!(
        "/auth/sso/callback?code=abc&state={}",
        query_escape(&state)
    );
    let parts = parts_for("GET", &uri, &[("Host", "localhost:8080")]);
    let response = provider.handle_callback(&parts).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_failed_exchange_is_unauthorized() {
    let (_config, registry) = setup().await;
    let provider = registry.provider("sso").expect("provider should exist");

    let state = format!(
        "my-secret-state:{}",
        query_escape("http://localhost:8080/v1/x")
    );
    let uri = format!(
        "/auth/sso/callback?code=abc&state={}",
        query_escape(&state)
    );
    let parts = parts_for("GET", &uri, &[("Host", "localhost:8080")]);
    let response = provider.handle_callback(&parts).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
