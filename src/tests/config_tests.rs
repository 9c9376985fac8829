use crate::config::{AuthScheme, Config};
use crate::logging::setup_test_logging;

const FULL_CONFIG: &str = r#"
resources:
  - path: "/public/*"
    whiteList: true
  - path: "/basic/*"
    methods: ["GET", "PUT"]
    provider: corp
    basic:
      credentials:
        - user: alice
          password: hunter2
  - path: "/oidc/*"
    provider: sso
    oidc:
      authorizationAccesses:
        - group: admins
        - email: ".*@example.com"
          regexp: true
  - path: "/header/*"
    provider: edge
    header:
      authorizationOpaServer:
        url: http://opa:8181/v1/data/authz/allowed
        tags:
          env: test
authProviders:
  basic:
    corp: {}
  oidc:
    sso:
      clientID: client-1
      issuerUrl: https://issuer.example.com
      state: my-secret-state
  header:
    edge: {}
"#;

#[test]
fn full_config_loads_with_defaults() {
    setup_test_logging();
    let config = Config::from_yaml(FULL_CONFIG).expect("config should load");

    assert_eq!(config.resources.len(), 4);
    assert!(matches!(config.resources[0].scheme, AuthScheme::Whitelist));
    assert!(matches!(config.resources[1].scheme, AuthScheme::Basic(_)));

    // Methods default to GET only.
    assert_eq!(config.resources[0].methods, vec![http::Method::GET]);
    assert_eq!(
        config.resources[1].methods,
        vec![http::Method::GET, http::Method::PUT]
    );

    // Basic realm defaults to the provider key.
    assert_eq!(config.auth_providers.basic["corp"].realm, "corp");

    // OIDC paths and scopes get their defaults from the provider key.
    let sso = &config.auth_providers.oidc["sso"];
    assert_eq!(sso.login_path, "/auth/sso");
    assert_eq!(sso.callback_path, "/auth/sso/callback");
    assert_eq!(sso.scopes, ["openid", "email", "profile"]);
    assert_eq!(sso.group_claim, "groups");
    assert_eq!(sso.cookie_name, "oidc");

    // Header names get their defaults.
    let edge = &config.auth_providers.header["edge"];
    assert_eq!(edge.username_header, "x-forwarded-preferred-username");
    assert_eq!(edge.email_header, "x-forwarded-email");
    assert_eq!(edge.groups_header, "x-forwarded-groups");

    // Regex ACL entries are compiled at load time.
    let AuthScheme::Oidc(acl) = &config.resources[2].scheme else {
        panic!("expected oidc scheme");
    };
    assert!(acl.authorization_accesses[1].email_regexp.is_some());
    assert!(acl.authorization_accesses[0].group_regexp.is_none());
}

#[test]
fn resource_must_declare_exactly_one_scheme() {
    let none = r#"
resources:
  - path: "/x/*"
    provider: corp
authProviders:
  basic:
    corp: {}
"#;
    assert!(Config::from_yaml(none).is_err());

    let two = r#"
resources:
  - path: "/x/*"
    whiteList: true
    provider: corp
    basic:
      credentials:
        - user: alice
          password: pw
authProviders:
  basic:
    corp: {}
"#;
    assert!(Config::from_yaml(two).is_err());
}

#[test]
fn unknown_provider_is_rejected() {
    let config = r#"
resources:
  - path: "/x/*"
    provider: nope
    basic:
      credentials:
        - user: alice
          password: pw
authProviders:
  basic:
    corp: {}
"#;
    assert!(Config::from_yaml(config).is_err());
}

#[test]
fn unsupported_method_is_rejected() {
    let config = r#"
resources:
  - path: "/x/*"
    methods: ["POST"]
    whiteList: true
"#;
    assert!(Config::from_yaml(config).is_err());
}

#[test]
fn acl_entry_needs_group_or_email() {
    let config = r#"
resources:
  - path: "/x/*"
    provider: sso
    oidc:
      authorizationAccesses:
        - regexp: true
authProviders:
  oidc:
    sso:
      clientID: client-1
      issuerUrl: https://issuer.example.com
      state: my-secret-state
"#;
    assert!(Config::from_yaml(config).is_err());
}

#[test]
fn oidc_provider_requires_state() {
    let config = r#"
authProviders:
  oidc:
    sso:
      clientID: client-1
      issuerUrl: https://issuer.example.com
"#;
    assert!(Config::from_yaml(config).is_err());
}

#[test]
fn invalid_glob_pattern_is_rejected() {
    let config = r#"
resources:
  - path: "/x/[invalid"
    whiteList: true
"#;
    assert!(Config::from_yaml(config).is_err());
}

#[test]
fn empty_config_is_valid() {
    let config = Config::from_yaml("{}").expect("empty config should load");
    assert!(config.resources.is_empty());
}
