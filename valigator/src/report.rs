//! Post-processing of the engine's report text.

/// Informational banner the engine prints inline with its report when it
/// detects a Swagger 2.0 document.
pub const LEGACY_FORMAT_BANNER: &str = "OpenAPI 2.0 (Swagger) detected";

/// Remove banner lines from the engine's output.
///
/// Remaining lines keep their order and are concatenated as-is: line
/// terminators are not re-inserted.
#[must_use]
pub fn strip_banner(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.contains(LEGACY_FORMAT_BANNER))
        .collect()
}
