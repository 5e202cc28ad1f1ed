//! HTTP surface: liveness probe and the validation endpoint.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    body::Body,
    extract::{Query, Request, State},
    http::{
        HeaderMap, HeaderValue, Method, StatusCode,
        header::{ACCEPT, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, HOST},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
};
use http_body_util::LengthLimitError;
use thiserror::Error;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use valigator::{
    LintError, LintInvocation, LintOutcome, OutputFormat, RulesetCatalog, Spectral, StageError,
    ValigatorConfig, negotiate, stage_document,
};

use crate::logging::LoggingMiddleware;

/// Content type used when no report format applies.
const FALLBACK_CONTENT_TYPE: &str = "text/plain";

/// Host names treated as a local development origin.
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];

/// Immutable state shared by every request.
#[derive(Debug)]
pub struct AppState {
    config: ValigatorConfig,
    catalog: RulesetCatalog,
    spectral: Spectral,
    lint_permits: Option<Semaphore>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ValigatorConfig, catalog: RulesetCatalog) -> Self {
        let spectral = Spectral::from_config(&config);
        // A zero limit would block every request; it means unbounded.
        let lint_permits = config
            .max_concurrent_lints
            .filter(|&n| n > 0)
            .map(Semaphore::new);
        Self {
            config,
            catalog,
            spectral,
            lint_permits,
        }
    }

    /// Replace the engine handle built from the configuration.
    #[must_use]
    pub fn with_spectral(mut self, spectral: Spectral) -> Self {
        self.spectral = spectral;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ValigatorConfig {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &RulesetCatalog {
        &self.catalog
    }

    async fn lint(&self, invocation: &LintInvocation) -> Result<LintOutcome, LintError> {
        // The semaphore is never closed, so acquiring only fails if it is; run unbounded then.
        let _permit = if let Some(permits) = &self.lint_permits {
            permits.acquire().await.ok()
        } else {
            None
        };
        self.spectral.lint(invocation).await
    }
}

/// Why a validation request did not produce a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("only POST requests are supported, got {0}")]
    MethodNotAllowed(Method),
    #[error("unsupported Accept header '{0}'")]
    UnsupportedFormat(String),
    #[error("invalid query string: {0}")]
    InvalidQuery(String),
    #[error("unknown ruleset '{0}'")]
    UnknownRuleset(String),
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    BodyUnreadable(#[source] axum::Error),
    #[error(transparent)]
    Staging(#[from] StageError),
    #[error(transparent)]
    Engine(#[from] LintError),
    #[error("failed to assemble response: {0}")]
    Response(#[from] axum::http::Error),
}

impl RequestError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_)
            | Self::UnsupportedFormat(_)
            | Self::InvalidQuery(_)
            | Self::UnknownRuleset(_)
            | Self::BodyUnreadable(_) => StatusCode::BAD_REQUEST,
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Staging(_) | Self::Engine(_) | Self::Response(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Validation request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "Validation request rejected");
        }
        status.into_response()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ValidateParams {
    ruleset: Option<String>,
    errors_only: Option<String>,
}

impl ValidateParams {
    /// Pick the recognised parameters out of decoded query pairs. The first
    /// occurrence of a repeated key wins and unknown keys are ignored.
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "ruleset" => &mut params.ruleset,
                "errors-only" => &mut params.errors_only,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }
}

/// Build the router. `/health` is always mounted at the root; the validate
/// route lives under the configured base path.
#[must_use]
pub fn router(state: AppState) -> Router {
    let validate_path = format!("{}/api/validate", state.config.normalized_base_path());
    Router::new()
        .route("/health", any(health))
        .route(&validate_path, any(validate))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind the configured address and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState, verbose: u8) -> anyhow::Result<()> {
    let address = state.config.bind_address();
    let logger = LoggingMiddleware::new(verbose);
    let app = router(state).layer(middleware::from_fn(move |request: Request, next: Next| {
        let logger = logger.clone();
        async move { logger.handle(request, next).await }
    }));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(%address, "Serving valigator");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn health(method: Method) -> StatusCode {
    let status = if method == Method::GET {
        StatusCode::OK
    } else {
        StatusCode::METHOD_NOT_ALLOWED
    };
    let code = status.as_u16();
    tracing::info!("[{code}] {method} /health");
    status
}

async fn validate(State(state): State<Arc<AppState>>, request: Request) -> Response {
    match handle_validate(&state, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn handle_validate(state: &AppState, request: Request) -> Result<Response, RequestError> {
    if request.method() != Method::POST {
        return Err(RequestError::MethodNotAllowed(request.method().clone()));
    }

    let headers = request.headers();
    let accept = header_str(headers, ACCEPT.as_str());
    let format = negotiate(accept).ok_or_else(|| RequestError::UnsupportedFormat(accept.to_owned()))?;

    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(request.uri())
        .map_err(|e| RequestError::InvalidQuery(e.body_text()))?;
    let params = ValidateParams::from_pairs(pairs);
    let requested = params.ruleset.unwrap_or_default();
    let ruleset = state
        .catalog
        .resolve(&requested)
        .ok_or(RequestError::UnknownRuleset(requested))?;

    let display_only_failures = parse_errors_only(
        params.errors_only.as_deref(),
        state.config.display_only_failures,
    );
    let local_origin = is_local_host(header_str(headers, HOST.as_str()));

    let limit = state.config.max_body_bytes;
    let body = axum::body::to_bytes(request.into_body(), limit)
        .await
        .map_err(|e| body_error(e, limit))?;

    let staged = stage_document(&state.config.staging_dir, &body).await?;
    tracing::info!(ruleset = %ruleset.name, document = %staged.path().display(), %format, "Validating document");

    let invocation = LintInvocation {
        document: staged.path().to_path_buf(),
        ruleset: ruleset.location.clone(),
        format,
        skip_rules: state.config.skip_rules.clone(),
        display_only_failures,
    };
    let outcome = state.lint(&invocation).await;
    staged.remove().await;

    let report = outcome?.into_report();
    assemble(Some(format), report, local_origin)
}

/// Build the success response for a report.
///
/// # Errors
///
/// Returns [`RequestError::Response`] if the response cannot be built.
pub fn assemble(
    format: Option<OutputFormat>,
    report: String,
    local_origin: bool,
) -> Result<Response, RequestError> {
    let content_type = format.map_or(FALLBACK_CONTENT_TYPE, OutputFormat::content_type);
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type);
    if local_origin {
        builder = builder.header(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }
    Ok(builder.body(Body::from(report))?)
}

/// Separate an exceeded body limit from a body stream that broke while reading.
fn body_error(error: axum::Error, limit: usize) -> RequestError {
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return RequestError::BodyTooLarge { limit };
        }
        source = std::error::Error::source(cause);
    }
    RequestError::BodyUnreadable(error)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Interpret the `errors-only` query value, accepting the usual boolean
/// spellings. Anything else falls back to `default` with a warning.
fn parse_errors_only(raw: Option<&str>, default: bool) -> bool {
    match raw {
        None => default,
        Some("1" | "t" | "T" | "TRUE" | "true" | "True") => true,
        Some("0" | "f" | "F" | "FALSE" | "false" | "False") => false,
        Some(other) => {
            tracing::warn!(value = other, default, "Unable to parse errors-only, using default");
            default
        }
    }
}

/// Whether a `Host` header value names the local machine, with or without port.
fn is_local_host(host: &str) -> bool {
    let host = host.trim();
    let name = if host.starts_with('[') {
        host.find(']').map_or(host, |end| &host[..=end])
    } else {
        host.split_once(':').map_or(host, |(name, _)| name)
    };
    LOCAL_HOSTS.iter().any(|local| local.eq_ignore_ascii_case(name))
}
