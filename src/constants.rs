//! Shared constants for the authentication pipeline.

/// Query parameter carrying the post-login redirect target.
pub const REDIRECT_QUERY_KEY: &str = "rd";

/// Authorization header scheme for bearer tokens.
pub const BEARER_SCHEME: &str = "Bearer";

/// Header consulted before `Host` when deriving the request host behind a
/// fronting load balancer.
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Header consulted when deriving the request scheme behind a fronting
/// load balancer.
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
