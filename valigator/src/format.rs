//! Content negotiation between the `Accept` header and the engine's report formats.

use std::fmt;

/// Report format requested from the engine and returned to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Html,
    Json,
}

impl OutputFormat {
    /// Value passed to the engine's `--format` flag.
    #[must_use]
    pub const fn engine_name(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
        }
    }

    /// Media type of the response body.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Json => "application/json",
        }
    }

    /// File extension for engine output files.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        self.engine_name()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.engine_name())
    }
}

/// `Accept` values understood by the negotiator, in no particular order.
pub const SUPPORTED_MEDIA_TYPES: &[(&str, OutputFormat)] = &[
    ("*/*", OutputFormat::Html),
    ("application/json", OutputFormat::Json),
    ("text/html", OutputFormat::Html),
];

/// Map an `Accept` header value to a report format.
///
/// Matching is exact after trimming surrounding whitespace; quality values and
/// comma-separated lists are not interpreted.
#[must_use]
pub fn negotiate(accept: &str) -> Option<OutputFormat> {
    let accept = accept.trim();
    SUPPORTED_MEDIA_TYPES
        .iter()
        .find(|(media_type, _)| *media_type == accept)
        .map(|(_, format)| *format)
}
