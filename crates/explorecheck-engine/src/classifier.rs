//! Error classifier for probe payloads
//!
//! Decides from the raw text a query run returned whether the backend
//! reported an error. Pure and total: every input maps to a verdict.

use regex::Regex;
use std::sync::OnceLock;

/// Classification of one probe payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The payload is data
    Success,

    /// The payload is a backend error message
    Error,

    /// There was no payload at all
    Fatal,
}

fn error_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:sql\s+)?error\b").expect("static regex"))
}

/// JSON keys Looker uses for error bodies
const JSON_ERROR_KEYS: [&str; 3] = ["looker_error", "errors", "message"];

/// Classify a probe payload
///
/// - `None` is `Fatal`: an absent payload is never treated as data.
/// - Text whose trimmed, lower-cased form starts with `sql error` or the
///   word `error` is `Error`.
/// - Text that opens like a JSON object but does not parse, or a JSON
///   object carrying an error key and no `data`, is `Error`.
/// - Anything else, including empty text, is `Success`.
pub fn classify(payload: Option<&str>) -> Verdict {
    let Some(text) = payload else {
        return Verdict::Fatal;
    };

    let normalized = text.trim().to_lowercase();
    if error_prefix().is_match(&normalized) {
        return Verdict::Error;
    }

    if normalized.starts_with('{') {
        return match serde_json::from_str::<serde_json::Value>(text.trim()) {
            Ok(serde_json::Value::Object(map)) => {
                let has_error_key = JSON_ERROR_KEYS.iter().any(|key| map.contains_key(*key));
                if has_error_key && !map.contains_key("data") {
                    Verdict::Error
                } else {
                    Verdict::Success
                }
            }
            Ok(_) => Verdict::Success,
            Err(_) => Verdict::Error,
        };
    }

    Verdict::Success
}

/// One-line summary of an error payload
///
/// BigQuery's "The query is too large" errors carry the useful part on the
/// last line; everything else leads with it.
pub fn headline(message: &str) -> String {
    let mut lines = message.lines().map(str::trim).filter(|line| !line.is_empty());

    let line = if message.contains("The query is too large") {
        lines.last()
    } else {
        lines.next()
    };

    line.unwrap_or_default().to_string()
}

/// Data rows in a CSV probe payload (every non-empty line after the header)
pub fn count_probe_rows(payload: &str) -> usize {
    payload
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count()
        .saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_payload_is_fatal() {
        assert_eq!(classify(None), Verdict::Fatal);
    }

    #[test]
    fn sql_error_prefix() {
        assert_eq!(classify(Some("SQL Error: Unrecognized name: age_tier at [5:5]")), Verdict::Error);
        assert_eq!(classify(Some("   \n sql error: boom")), Verdict::Error);
        assert_eq!(classify(Some("Error running query: timeout")), Verdict::Error);
    }

    #[test]
    fn error_word_must_lead() {
        assert_eq!(classify(Some("users.error_count,users.id\n1,2\n")), Verdict::Success);
        assert_eq!(classify(Some("errors.id\n1\n")), Verdict::Success);
        assert_eq!(classify(Some("terror.id\n1\n")), Verdict::Success);
    }

    #[test]
    fn csv_and_empty_payloads_succeed() {
        assert_eq!(classify(Some("users.id,users.name\n1,Ada\n")), Verdict::Success);
        assert_eq!(classify(Some("")), Verdict::Success);
    }

    #[test]
    fn json_payloads() {
        assert_eq!(classify(Some(r#"{"looker_error": "bad field"}"#)), Verdict::Error);
        assert_eq!(classify(Some(r#"{"message": "Not found", "documentation_url": "x"}"#)), Verdict::Error);
        assert_eq!(classify(Some(r#"{"data": [], "errors": []}"#)), Verdict::Success);
        assert_eq!(classify(Some(r#"[{"users.id": 1}]"#)), Verdict::Success);
        assert_eq!(classify(Some("{not json")), Verdict::Error);
    }

    #[test]
    fn classification_is_deterministic() {
        let payloads = ["SQL Error: x", "users.id\n1\n", "{oops"];
        let first: Vec<Verdict> = payloads.iter().map(|p| classify(Some(*p))).collect();
        let second: Vec<Verdict> = payloads.iter().rev().map(|p| classify(Some(*p))).collect();
        assert_eq!(first, second.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn headline_picks_useful_line() {
        assert_eq!(headline("SQL Error: first line\ncontext\n"), "SQL Error: first line");
        assert_eq!(
            headline("SQL Error: Failed to run\nThe query is too large.\nThe maximum standard SQL query length is 1024k"),
            "The maximum standard SQL query length is 1024k"
        );
        assert_eq!(headline(""), "");
    }

    #[test]
    fn probe_row_count() {
        assert_eq!(count_probe_rows("users.id\n1\n"), 1);
        assert_eq!(count_probe_rows("users.id\n"), 0);
        assert_eq!(count_probe_rows(""), 0);
    }
}
