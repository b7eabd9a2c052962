//! Line validity predicates

use serde::de::IgnoredAny;
use std::sync::Arc;

/// Decides whether a non-empty line is a well-formed record
pub type LineValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A line holding one complete JSON object or array
pub fn is_json_record(line: &str) -> bool {
    let trimmed = line.trim();
    let delimited = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    delimited && serde_json::from_str::<IgnoredAny>(trimmed).is_ok()
}

pub fn json_records() -> LineValidator {
    Arc::new(is_json_record)
}
