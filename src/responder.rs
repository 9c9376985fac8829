//! Response emission for the authentication pipeline.
//!
//! Every denial, challenge, and redirect the pipeline produces goes through
//! these helpers so error pages render consistently and every outcome is
//! logged with the request path and, where known, the offending identifier.

use askama::Template;
use http::{
    HeaderValue, Response, StatusCode,
    header::{CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE},
};
use http_body_util::Full;
use hyper::body::Bytes;
use mime_guess::mime::TEXT_HTML_UTF_8;
use tracing::{error, info, warn};

pub type ProxyResponse = Response<Full<Bytes>>;

/// Error page template
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub status: u16,
    pub error_message: String,
}

fn error_page(status: StatusCode, message: &str) -> ProxyResponse {
    let template = ErrorTemplate {
        status: status.as_u16(),
        error_message: message.to_string(),
    };
    let html = template.render().unwrap_or_else(|err| {
        error!(error = %err, "Failed to render error template");
        format!(
            "<html><body><h1>{}</h1><p>{}</p></body></html>",
            status.as_u16(),
            message
        )
    });

    let mut res = Response::new(Full::new(Bytes::from(html)));
    *res.status_mut() = status;
    res.headers_mut().append(
        CONTENT_TYPE,
        HeaderValue::from_static(TEXT_HTML_UTF_8.as_ref()),
    );
    res
}

pub fn internal_server_error(err: &impl ToString, path: &str) -> ProxyResponse {
    error!(path = %path, error = %err.to_string(), "Internal server error");
    error_page(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}

pub fn bad_request(message: &str, path: &str) -> ProxyResponse {
    warn!(path = %path, error = %message, "Bad request");
    error_page(StatusCode::BAD_REQUEST, message)
}

pub fn unauthorized(message: &str, path: &str) -> ProxyResponse {
    warn!(path = %path, error = %message, "Unauthorized");
    error_page(StatusCode::UNAUTHORIZED, message)
}

/// 401 with a browser-triggerable basic auth prompt.
pub fn basic_auth_challenge(realm: &str, message: &str, path: &str) -> ProxyResponse {
    warn!(path = %path, realm = %realm, error = %message, "Unauthorized, sending basic auth challenge");
    let mut res = error_page(StatusCode::UNAUTHORIZED, message);
    match HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")) {
        Ok(value) => {
            res.headers_mut().append(WWW_AUTHENTICATE, value);
            res
        }
        // A realm that can't be a header value is a configuration problem.
        Err(err) => internal_server_error(&err, path),
    }
}

pub fn forbidden(identifier: &str, path: &str) -> ProxyResponse {
    warn!(path = %path, user = %identifier, "Forbidden");
    error_page(StatusCode::FORBIDDEN, "Forbidden")
}

fn redirect(status: StatusCode, location: &str) -> ProxyResponse {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            info!(location = %location, status = status.as_u16(), "Redirecting");
            let mut res = Response::new(Full::new(Bytes::new()));
            *res.status_mut() = status;
            res.headers_mut().append(LOCATION, value);
            res
        }
        Err(err) => internal_server_error(&err, location),
    }
}

/// 302, used when handing the browser off to the identity provider.
pub fn found_redirect(location: &str) -> ProxyResponse {
    redirect(StatusCode::FOUND, location)
}

/// 307, used for login redirects and the post-callback hop so the original
/// method is preserved.
pub fn temporary_redirect(location: &str) -> ProxyResponse {
    redirect(StatusCode::TEMPORARY_REDIRECT, location)
}
