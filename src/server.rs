//! HTTP server setup and per-request orchestration.
//!
//! Requests flow through three stages: the OIDC login/callback endpoints
//! (matched first, they exist outside any resource policy), then
//! authentication, then authorization. Only a request that clears all three
//! reaches the upstream.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::num::NonZeroU16;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::auth::oidc::{OidcEndpoint, OidcRegistry};
use crate::auth::{self, AuthDecision, RequestAuth};
use crate::authz::{self, AuthzDecision};
use crate::cli::Cli;
use crate::config::Config;
use crate::error::SandbarError;
use crate::metrics::{MetricsRecorder, TracingMetrics};
use crate::responder::ProxyResponse;

/// Where an authenticated and authorized request is sent.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(
        &self,
        req: Request<Incoming>,
        auth: RequestAuth<'_>,
    ) -> Result<ProxyResponse, SandbarError>;
}

/// Stand-in upstream used until a storage backend is wired in. Answers 200
/// with an empty body so the pipeline can be exercised end to end.
pub struct OkUpstream;

#[async_trait]
impl Upstream for OkUpstream {
    async fn forward(
        &self,
        req: Request<Incoming>,
        auth: RequestAuth<'_>,
    ) -> Result<ProxyResponse, SandbarError> {
        debug!(
            path = %req.uri(),
            user = auth.user.as_ref().map(|user| user.identifier()).unwrap_or("anonymous"),
            "forwarding request to upstream"
        );
        let mut res = Response::new(Full::new(Bytes::new()));
        *res.status_mut() = StatusCode::OK;
        Ok(res)
    }
}

/// Shared per-request state: the config snapshot, discovered OIDC
/// providers, and the collaborators every stage needs.
pub struct ProxyService {
    config: Arc<Config>,
    registry: Arc<OidcRegistry>,
    metrics: Arc<dyn MetricsRecorder>,
    upstream: Arc<dyn Upstream>,
    http_client: reqwest::Client,
}

impl ProxyService {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<OidcRegistry>,
        metrics: Arc<dyn MetricsRecorder>,
        upstream: Arc<dyn Upstream>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            registry,
            metrics,
            upstream,
            http_client,
        }
    }

    pub async fn handle_request(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> ProxyResponse {
        let (parts, body) = req.into_parts();

        if let Some((provider, endpoint)) = self.registry.match_endpoint(parts.uri.path()) {
            return match endpoint {
                OidcEndpoint::Login => provider.handle_login(&parts),
                OidcEndpoint::Callback => provider.handle_callback(&parts).await,
            };
        }

        let auth = match auth::authenticate(
            &self.config,
            &self.registry,
            self.metrics.as_ref(),
            &parts,
        ) {
            AuthDecision::Pass(auth) => auth,
            AuthDecision::Reply(response) => return response,
        };

        match authz::authorize(
            &auth,
            &parts,
            &remote_addr.to_string(),
            &self.http_client,
            self.metrics.as_ref(),
        )
        .await
        {
            AuthzDecision::Allow => {}
            AuthzDecision::Reply(response) => return response,
        }

        let req = Request::from_parts(parts, body);
        match self.upstream.forward(req, auth).await {
            Ok(response) => response,
            Err(err) => err.into(),
        }
    }
}

/// Builds an outbound HTTP client for OIDC exchanges and policy-server
/// calls. Redirects are never followed so identity-provider responses are
/// seen as-is.
pub fn build_http_client() -> Result<reqwest::Client, SandbarError> {
    Ok(reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

/// Main server struct holding startup configuration.
pub struct Server {
    bind_address: String,
    port: NonZeroU16,
    config_file: PathBuf,
}

impl Server {
    pub fn new(cli: Cli) -> Self {
        Self {
            bind_address: cli.host,
            port: cli.port,
            config_file: cli.config_file,
        }
    }

    #[cfg(test)]
    /// Create a server instance for testing that binds to a random available port
    pub(crate) async fn test_mode(config_file: PathBuf) -> Result<(Self, u16), SandbarError> {
        let host = "127.0.0.1".to_string();
        let addr = format!("{host}:0");
        if let Ok(listener) = TcpListener::bind(&addr).await {
            let port = listener.local_addr()?.port();
            let server = Server::new(Cli {
                host,
                port: NonZeroU16::try_from(port)
                    .map_err(|_| SandbarError::Other(format!("invalid test port {port}")))?,
                config_file,
            });
            return Ok((server, port));
        }

        Err(SandbarError::Other(
            "Could not find an available port for testing".to_string(),
        ))
    }

    pub async fn run(self) -> Result<(), SandbarError> {
        let addr = format!("{}:{}", self.bind_address, self.port);
        let addr: SocketAddr = addr.parse().map_err(|err| {
            SandbarError::Configuration(format!("Failed to parse address '{addr}': {err}"))
        })?;

        let config = Arc::new(Config::from_file(&self.config_file)?);
        let http_client = build_http_client()?;
        let registry =
            Arc::new(OidcRegistry::build(&config.auth_providers.oidc, &http_client).await?);

        let service = Arc::new(ProxyService::new(
            config,
            registry,
            Arc::new(TracingMetrics),
            Arc::new(OkUpstream),
            http_client,
        ));

        info!(
            config_file = ?self.config_file,
            address = %addr,
            "Starting sandbar..."
        );

        let listener = TcpListener::bind(addr).await?;

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            debug!(remote_addr = %remote_addr, "Accepted new connection");

            let io = TokioIo::new(stream);
            let service = service.clone();

            tokio::task::spawn(async move {
                if let Err(err) = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req| {
                            let service = Arc::clone(&service);
                            async move {
                                Ok::<_, Infallible>(service.handle_request(req, remote_addr).await)
                            }
                        }),
                    )
                    .await
                {
                    debug!(error = %err, remote_addr = %remote_addr, "Error serving connection");
                }
            });
        }
    }
}
