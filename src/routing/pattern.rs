//! Route pattern parsing.
//!
//! # Syntax
//! - `users` literal segment, matched exactly (case-sensitive)
//! - `:id` named parameter, matches any single segment
//! - `:id(\d+)` named regex segment, the regex must match the whole segment
//!
//! Empty segments are ignored, so `/users/` and `/users` are the same path.
//! Request segments are percent-decoded before matching; literals and regexes
//! are written in decoded form (`/café`, not `/caf%C3%A9`).

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::routing::RouteError;

/// One parsed segment of a route pattern.
#[derive(Debug, Clone)]
pub enum SegmentSpec {
    Literal(String),
    Param(String),
    Pattern { name: String, regex: Regex },
}

impl SegmentSpec {
    /// Capture name for parameter and regex segments.
    pub fn name(&self) -> Option<&str> {
        match self {
            SegmentSpec::Literal(_) => None,
            SegmentSpec::Param(name) | SegmentSpec::Pattern { name, .. } => Some(name),
        }
    }
}

/// Split a request path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Percent-decode one request segment. Invalid UTF-8 keeps the raw text.
pub fn decode_segment(segment: &str) -> Cow<'_, str> {
    percent_decode_str(segment).decode_utf8().unwrap_or(Cow::Borrowed(segment))
}

/// Parse a route pattern into segment specs.
pub fn parse_pattern(pattern: &str) -> Result<Vec<SegmentSpec>, RouteError> {
    let invalid = |reason: &str| RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let mut specs = Vec::new();
    for segment in split_path(pattern) {
        let Some(rest) = segment.strip_prefix(':') else {
            if segment.contains('(') || segment.contains(')') {
                return Err(invalid("parentheses are only allowed in `:name(regex)` segments"));
            }
            specs.push(SegmentSpec::Literal(segment.to_string()));
            continue;
        };

        let spec = match rest.find('(') {
            None => SegmentSpec::Param(valid_name(rest).ok_or_else(|| invalid("bad parameter name"))?),
            Some(open) => {
                let body = rest[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("unbalanced parentheses"))?;
                let name = valid_name(&rest[..open]).ok_or_else(|| invalid("bad parameter name"))?;
                let regex = Regex::new(&format!("^(?:{body})$"))
                    .map_err(|e| invalid(&e.to_string()))?;
                SegmentSpec::Pattern { name, regex }
            }
        };

        if specs.iter().any(|s: &SegmentSpec| s.name() == spec.name()) {
            return Err(invalid("parameter name used twice"));
        }
        specs.push(spec);
    }
    Ok(specs)
}

fn valid_name(name: &str) -> Option<String> {
    let ok = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    ok.then(|| name.to_string())
}
