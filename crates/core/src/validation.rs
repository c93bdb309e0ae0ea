//! Input validation for request submission, edits and interwiki assignment.
//!
//! Every check here runs before any mutation; failures are
//! [`CoreError::Validation`].

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Maximum length of the source URL.
pub const MAX_SOURCE_LENGTH: usize = 2048;

/// Maximum length of the free-text reason.
pub const MAX_REASON_LENGTH: usize = 10_000;

/// Maximum length of a comment body.
pub const MAX_COMMENT_LENGTH: usize = 10_000;

/// Interwiki prefixes: 1-32 lowercase letters, digits, `-` or `_`.
pub const INTERWIKI_PREFIX_PATTERN: &str = r"^[a-z0-9_-]{1,32}$";

/// Site identifiers are database names.
pub const TARGET_PATTERN: &str = r"^[a-z0-9_]{1,64}$";

static INTERWIKI_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(INTERWIKI_PREFIX_PATTERN).expect("valid regex"));

static TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TARGET_PATTERN).expect("valid regex"));

/// The reason must contain something other than whitespace.
pub fn validate_reason(reason: &str) -> Result<(), CoreError> {
    if reason.trim().is_empty() {
        return Err(CoreError::Validation("Reason must not be empty".to_string()));
    }
    if reason.len() > MAX_REASON_LENGTH {
        return Err(CoreError::Validation(format!(
            "Reason exceeds maximum length of {MAX_REASON_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// The source is free text and may be empty; only its length is bounded.
pub fn validate_source(source: &str) -> Result<(), CoreError> {
    if source.len() > MAX_SOURCE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Source exceeds maximum length of {MAX_SOURCE_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Target site identifiers are database names: lowercase alphanumerics and
/// underscores. Membership in the set of known sites is checked separately.
pub fn validate_target_format(target: &str) -> Result<(), CoreError> {
    if TARGET_RE.is_match(target) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("Invalid target site name: '{target}'")))
    }
}

pub fn validate_comment(body: &str) -> Result<(), CoreError> {
    if body.trim().is_empty() {
        return Err(CoreError::Validation("Comment must not be empty".to_string()));
    }
    if body.len() > MAX_COMMENT_LENGTH {
        return Err(CoreError::Validation(format!(
            "Comment exceeds maximum length of {MAX_COMMENT_LENGTH} bytes"
        )));
    }
    Ok(())
}

pub fn validate_interwiki_prefix(prefix: &str) -> Result<(), CoreError> {
    if INTERWIKI_PREFIX_RE.is_match(prefix) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid interwiki prefix: '{prefix}'. Use 1-32 lowercase letters, digits, '-' or '_'"
        )))
    }
}

/// Interwiki URLs must be absolute http(s) URLs with a host.
pub fn validate_interwiki_url(url: &str) -> Result<(), CoreError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') && !url.contains(char::is_whitespace) => {
            Ok(())
        }
        _ => Err(CoreError::Validation(format!("Malformed interwiki URL: '{url}'"))),
    }
}
