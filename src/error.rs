//! Centralized error types for the sandbar proxy.

use std::net::AddrParseError;

use askama::Template;
use http::{
    HeaderValue, Response, StatusCode,
    header::{CONTENT_TYPE, InvalidHeaderValue},
};
use http_body_util::Full;
use hyper::body::Bytes;
use mime_guess::mime::TEXT_HTML_UTF_8;

use crate::responder::ErrorTemplate;

#[derive(Debug)]
pub enum SandbarError {
    Configuration(String),
    Glob(String),
    HttpResponse(String),
    Hyper(String),
    Io(std::io::Error),
    OidcDiscovery(String),
    Other(String),
    Reqwest(String),
    SerdeJson(serde_json::Error),
    SerdeYaml(serde_yaml::Error),
    TemplateRendering(String),
    TokenExchange(String),
    TokenVerification(String),
    UrlParse(String),
}

impl std::fmt::Display for SandbarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandbarError::Configuration(msg) => write!(f, "Configuration Error: {}", msg),
            SandbarError::Glob(msg) => write!(f, "Glob Pattern Error: {}", msg),
            SandbarError::HttpResponse(msg) => write!(f, "HTTP Response Error: {}", msg),
            SandbarError::Hyper(msg) => write!(f, "Hyper HTTP Error: {}", msg),
            SandbarError::Io(e) => write!(f, "IO Error: {:?}", e),
            SandbarError::OidcDiscovery(msg) => write!(f, "OIDC Discovery Error: {}", msg),
            SandbarError::Other(msg) => write!(f, "Error: {}", msg),
            SandbarError::Reqwest(msg) => write!(f, "Reqwest HTTP Error: {}", msg),
            SandbarError::SerdeJson(e) => write!(f, "Serde-JSON Error: {}", e),
            SandbarError::SerdeYaml(e) => write!(f, "Serde-YAML Error: {}", e),
            SandbarError::TemplateRendering(msg) => {
                write!(f, "Template Rendering Error: {}", msg)
            }
            SandbarError::TokenExchange(msg) => {
                write!(f, "Token Exchange Error: {}", msg)
            }
            SandbarError::TokenVerification(msg) => {
                write!(f, "Token Verification Error: {}", msg)
            }
            SandbarError::UrlParse(msg) => write!(f, "URL Parse Error: {}", msg),
        }
    }
}

impl SandbarError {
    pub fn other(error: &impl ToString) -> Self {
        SandbarError::Other(error.to_string())
    }
}

impl From<InvalidHeaderValue> for SandbarError {
    fn from(err: InvalidHeaderValue) -> Self {
        SandbarError::Other(err.to_string())
    }
}

impl From<askama::Error> for SandbarError {
    fn from(err: askama::Error) -> Self {
        SandbarError::TemplateRendering(err.to_string())
    }
}

impl From<glob::PatternError> for SandbarError {
    fn from(err: glob::PatternError) -> Self {
        SandbarError::Glob(err.to_string())
    }
}

impl From<regex::Error> for SandbarError {
    fn from(err: regex::Error) -> Self {
        SandbarError::Configuration(format!("invalid regex: {}", err))
    }
}

impl From<reqwest::Error> for SandbarError {
    fn from(err: reqwest::Error) -> Self {
        SandbarError::Reqwest(err.to_string())
    }
}

impl From<hyper::Error> for SandbarError {
    fn from(err: hyper::Error) -> Self {
        SandbarError::Hyper(err.to_string())
    }
}

impl From<http::Error> for SandbarError {
    fn from(err: http::Error) -> Self {
        SandbarError::HttpResponse(err.to_string())
    }
}

impl From<serde_json::Error> for SandbarError {
    fn from(err: serde_json::Error) -> Self {
        SandbarError::SerdeJson(err)
    }
}

impl From<serde_yaml::Error> for SandbarError {
    fn from(err: serde_yaml::Error) -> Self {
        SandbarError::SerdeYaml(err)
    }
}

impl From<std::io::Error> for SandbarError {
    fn from(err: std::io::Error) -> Self {
        SandbarError::Io(err)
    }
}

impl From<url::ParseError> for SandbarError {
    fn from(err: url::ParseError) -> Self {
        SandbarError::UrlParse(err.to_string())
    }
}

impl From<AddrParseError> for SandbarError {
    fn from(err: AddrParseError) -> Self {
        SandbarError::Other(err.to_string())
    }
}

impl From<SandbarError> for Box<dyn std::error::Error + Send + Sync> {
    fn from(val: SandbarError) -> Self {
        Box::new(std::io::Error::other(val.to_string()))
    }
}

impl From<SandbarError> for Response<Full<Bytes>> {
    fn from(err: SandbarError) -> Response<Full<Bytes>> {
        let template = ErrorTemplate {
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            error_message: err.to_string(),
        };

        let html = match template.render() {
            Ok(html) => html,
            Err(e) => {
                #[allow(clippy::panic)]
                {
                    #[cfg(any(test, debug_assertions))]
                    panic!("Failed to render error template! {}", e);
                }
                #[cfg(not(any(test, debug_assertions)))]
                format!(
                    "<html><body><h1>Error</h1><p>Failed to render error template: {}</p><p>Original error: {}</p></body></html>",
                    e, err
                )
            }
        };

        let mut res = Response::new(Full::new(Bytes::from(html)));
        *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        (*res.headers_mut()).append(
            CONTENT_TYPE,
            HeaderValue::from_static(TEXT_HTML_UTF_8.as_ref()),
        );
        res
    }
}
