//! Authenticated principal model.
//!
//! One value is built per request by whichever authenticator handled it and
//! is carried on the request-scoped pipeline state until the response is
//! written. The accessors return empty defaults for fields a scheme does not
//! supply, so downstream code never needs to match on the variant for simple
//! reads.

use serde::Serialize;

pub const BASIC_USER_KIND: &str = "BASIC";
pub const HEADER_USER_KIND: &str = "HEADER";
pub const OIDC_USER_KIND: &str = "OIDC";

/// An authenticated caller.
///
/// The OIDC variant serializes to the field names the external policy
/// server expects in its `input.user` document.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum User {
    Basic {
        username: String,
    },
    Header {
        username: String,
        email: String,
        groups: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Oidc {
        preferred_username: String,
        name: String,
        given_name: String,
        family_name: String,
        email: String,
        email_verified: bool,
        groups: Vec<String>,
    },
}

impl User {
    /// Scheme tag for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            User::Basic { .. } => BASIC_USER_KIND,
            User::Header { .. } => HEADER_USER_KIND,
            User::Oidc { .. } => OIDC_USER_KIND,
        }
    }

    /// Best identifier for this caller, used in logs and denial messages.
    ///
    /// Header users prefer the username over the email; OIDC users prefer
    /// the email over the preferred username. The asymmetry is inherited
    /// behavior and deliberate.
    pub fn identifier(&self) -> &str {
        match self {
            User::Basic { username } => username,
            User::Header {
                username, email, ..
            } => {
                if !username.is_empty() {
                    username
                } else {
                    email
                }
            }
            User::Oidc {
                preferred_username,
                email,
                ..
            } => {
                if !email.is_empty() {
                    email
                } else {
                    preferred_username
                }
            }
        }
    }

    pub fn username(&self) -> &str {
        match self {
            User::Basic { username } => username,
            User::Header { username, .. } => username,
            User::Oidc {
                preferred_username, ..
            } => preferred_username,
        }
    }

    /// Display name, only populated for OIDC users.
    pub fn name(&self) -> &str {
        match self {
            User::Oidc { name, .. } => name,
            _ => "",
        }
    }

    pub fn given_name(&self) -> &str {
        match self {
            User::Oidc { given_name, .. } => given_name,
            _ => "",
        }
    }

    pub fn family_name(&self) -> &str {
        match self {
            User::Oidc { family_name, .. } => family_name,
            _ => "",
        }
    }

    /// Email address, only populated for Header and OIDC users.
    pub fn email(&self) -> &str {
        match self {
            User::Basic { .. } => "",
            User::Header { email, .. } => email,
            User::Oidc { email, .. } => email,
        }
    }

    /// Group memberships, empty for Basic users.
    pub fn groups(&self) -> &[String] {
        match self {
            User::Basic { .. } => &[],
            User::Header { groups, .. } => groups,
            User::Oidc { groups, .. } => groups,
        }
    }

    /// Whether the identity provider reported the email as verified.
    /// Always false outside the OIDC scheme.
    pub fn email_verified(&self) -> bool {
        match self {
            User::Oidc { email_verified, .. } => *email_verified,
            _ => false,
        }
    }
}
