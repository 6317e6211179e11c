//! Accept-Language selection
//!
//! Terminology servers read `Accept-Language` as an ordered list of
//! language/dialect preferences. Dialects are addressed through private-use
//! tags carrying the language reference set ID.

/// US English dialect, then GB English dialect, then plain English
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-X-900000000000509007,en-X-900000000000508004,en";

/// Pick the header value for a call: the caller's choice when given and
/// non-blank, otherwise the configured default
pub fn accept_language<'a>(requested: Option<&'a str>, default: &'a str) -> &'a str {
    match requested.map(str::trim) {
        Some(language) if !language.is_empty() => language,
        _ => default,
    }
}
