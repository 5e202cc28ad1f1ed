use std::io::IsTerminal;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{StatusCode, header::ACCEPT},
    middleware::Next,
    response::Response,
};
use chrono::Local;

/// Bodies longer than this are cut in DEBUG output; specification documents
/// and HTML reports are routinely hundreds of kilobytes.
const MAX_LOGGED_BODY: usize = 4096;

// ANSI color codes
struct Colors {
    reset: &'static str,
    dim: &'static str,
    green: &'static str,
    yellow: &'static str,
    red: &'static str,
    cyan: &'static str,
    blue: &'static str,
    magenta: &'static str,
    gray: &'static str,
}

impl Colors {
    fn new() -> Self {
        if std::io::stderr().is_terminal() {
            Self {
                reset: "\x1b[0m",
                dim: "\x1b[2m",
                green: "\x1b[92m",   // 2xx success
                yellow: "\x1b[93m",  // 4xx client errors
                red: "\x1b[91m",     // 5xx server errors
                cyan: "\x1b[96m",    // Method
                blue: "\x1b[94m",    // Path
                magenta: "\x1b[95m", // Duration
                gray: "\x1b[90m",    // DEBUG content
            }
        } else {
            Self {
                reset: "",
                dim: "",
                green: "",
                yellow: "",
                red: "",
                cyan: "",
                blue: "",
                magenta: "",
                gray: "",
            }
        }
    }

    fn status_color(&self, status: StatusCode) -> &'static str {
        if status.is_success() {
            self.green
        } else if status.is_client_error() {
            self.yellow
        } else {
            self.red
        }
    }
}

fn timestamp() -> impl std::fmt::Display {
    Local::now().format("%Y-%m-%d %H:%M:%S,%3f")
}

/// Bounded, lossy rendering of a body for DEBUG lines.
fn preview(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_LOGGED_BODY {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    format!(
        "{}... ({} bytes total)",
        String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY]),
        bytes.len()
    )
}

/// Per-request access log written to stderr.
///
/// - `verbose == 0`: disabled.
/// - `verbose == 1`: one summary line per request.
/// - `verbose >= 2`: request and response bodies as well.
#[derive(Clone)]
pub struct LoggingMiddleware {
    pub verbose: u8,
}

impl LoggingMiddleware {
    #[must_use]
    pub fn new(verbose: u8) -> Self {
        Self { verbose }
    }

    pub async fn handle(&self, request: Request, next: Next) -> Response {
        if self.verbose == 0 {
            return next.run(request).await;
        }

        let colors = Colors::new();
        let method = request.method().clone();
        let uri = request.uri().clone();
        let accept = request
            .headers()
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_owned();
        let start = Instant::now();

        let response = if self.verbose >= 2 {
            // Buffer the request body so it can be logged and handed on.
            let (parts, body) = request.into_parts();
            let bytes = axum::body::to_bytes(body, usize::MAX)
                .await
                .unwrap_or_default();
            self.log_body(&colors, "Request body", &bytes);
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        } else {
            next.run(request).await
        };

        let status = response.status();
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let query = uri.query().map(|q| format!("?{q}")).unwrap_or_default();

        // eprintln! rather than tracing so ANSI codes are not escaped.
        eprintln!(
            "{} - INFO - {}{}{} {}{}{}{} [{}] -> {}{}{} in {}{:.1}ms{}",
            timestamp(),
            colors.cyan,
            method,
            colors.reset,
            colors.blue,
            uri.path(),
            query,
            colors.reset,
            accept,
            colors.status_color(status),
            status.as_u16(),
            colors.reset,
            colors.magenta,
            duration_ms,
            colors.reset
        );

        if self.verbose < 2 {
            return response;
        }

        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .unwrap_or_default();
        self.log_body(&colors, "Response body", &bytes);
        Response::from_parts(parts, Body::from(bytes))
    }

    fn log_body(&self, colors: &Colors, label: &str, bytes: &Bytes) {
        if self.verbose < 2 || bytes.is_empty() {
            return;
        }
        eprintln!(
            "{} - DEBUG - {}{label}:{}\n{}{}{}",
            timestamp(),
            colors.dim,
            colors.reset,
            colors.gray,
            preview(bytes),
            colors.reset
        );
    }
}
