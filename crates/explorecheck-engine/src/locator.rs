//! Culprit locators
//!
//! A locator maps a backend error message and the field set that produced it
//! to the fields the message points at. Locators are textual heuristics, not
//! SQL parsers: they never understand the query, they only look for names.
//!
//! - [`SubstringLocator`]: the unqualified field name occurs in the error
//! - [`SqlLineLocator`]: the error's `at [line:col]` position lands on a line
//!   of the generated SQL that aliases the field
//! - [`ChainLocator`]: first non-empty answer of several locators

use explorecheck_core::{FieldRef, FieldSet, LocatorKind};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// What a locator gets to look at
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    /// Raw error payload
    pub message: &'a str,

    /// Generated SQL of the failing query, when it was fetched
    pub sql: Option<&'a str>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(message: &'a str) -> Self {
        Self { message, sql: None }
    }

    pub fn with_sql(mut self, sql: Option<&'a str>) -> Self {
        self.sql = sql;
        self
    }
}

/// Maps an error to candidate culprit fields
///
/// Results must preserve `candidates` order and may be empty.
pub trait CulpritLocator: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Whether the isolator should fetch the generated SQL before calling `locate`
    fn needs_sql(&self) -> bool {
        false
    }

    fn locate(&self, error: &ErrorContext<'_>, candidates: &FieldSet) -> Vec<FieldRef>;
}

/// Matches fields whose unqualified name occurs in the error text
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringLocator;

impl CulpritLocator for SubstringLocator {
    fn name(&self) -> &'static str {
        "substring"
    }

    fn locate(&self, error: &ErrorContext<'_>, candidates: &FieldSet) -> Vec<FieldRef> {
        candidates
            .iter()
            .filter(|field| {
                let name = field.unqualified();
                !name.is_empty() && error.message.contains(name)
            })
            .cloned()
            .collect()
    }
}

fn position_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\bat \[(\d+):(\d+)\]").expect("static regex"))
}

fn alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(?i)\bAS\s+[`"]?(\w+)[`"]?"#).expect("static regex"))
}

/// Reads the SQL line an error position points at and maps its aliases to fields
///
/// Looker prefixes the SQL it sends to the warehouse with a context comment
/// that the SQL returned by a `sql` run does not contain, so error line `N`
/// is line `N - line_offset` of the fetched SQL.
#[derive(Debug, Clone, Copy)]
pub struct SqlLineLocator {
    line_offset: usize,
}

impl SqlLineLocator {
    pub fn new(line_offset: usize) -> Self {
        Self { line_offset }
    }

    /// `(line, column)` of the first `at [line:col]` in the message
    pub fn error_position(message: &str) -> Option<(usize, usize)> {
        let captures = position_pattern().captures(message)?;
        let line = captures.get(1)?.as_str().parse().ok()?;
        let column = captures.get(2)?.as_str().parse().ok()?;
        Some((line, column))
    }

    /// Line of `sql` the error line refers to
    pub fn error_line<'s>(&self, sql: &'s str, error_line: usize) -> Option<&'s str> {
        let index = error_line.checked_sub(1 + self.line_offset)?;
        sql.lines().nth(index)
    }

    /// Lower-cased aliases declared on a SQL line
    pub fn aliases(line: &str) -> Vec<String> {
        alias_pattern()
            .captures_iter(line)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .collect()
    }
}

impl Default for SqlLineLocator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl CulpritLocator for SqlLineLocator {
    fn name(&self) -> &'static str {
        "sql-line"
    }

    fn needs_sql(&self) -> bool {
        true
    }

    fn locate(&self, error: &ErrorContext<'_>, candidates: &FieldSet) -> Vec<FieldRef> {
        let Some(sql) = error.sql else {
            return Vec::new();
        };
        let Some((line, _)) = Self::error_position(error.message) else {
            return Vec::new();
        };
        let Some(text) = self.error_line(sql, line) else {
            tracing::debug!(line, "error position is outside the generated SQL");
            return Vec::new();
        };

        let aliases: HashSet<String> = Self::aliases(text).into_iter().collect();
        candidates
            .iter()
            .filter(|field| aliases.contains(&field.sql_alias().to_lowercase()))
            .cloned()
            .collect()
    }
}

/// Tries locators in order and returns the first non-empty answer
pub struct ChainLocator {
    locators: Vec<Box<dyn CulpritLocator>>,
}

impl ChainLocator {
    pub fn new(locators: Vec<Box<dyn CulpritLocator>>) -> Self {
        Self { locators }
    }
}

impl CulpritLocator for ChainLocator {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn needs_sql(&self) -> bool {
        self.locators.iter().any(|l| l.needs_sql())
    }

    fn locate(&self, error: &ErrorContext<'_>, candidates: &FieldSet) -> Vec<FieldRef> {
        for locator in &self.locators {
            let found = locator.locate(error, candidates);
            if !found.is_empty() {
                tracing::debug!(locator = locator.name(), matches = found.len(), "culprits located");
                return found;
            }
        }
        Vec::new()
    }
}

/// Build the locator a configuration asks for
pub fn locator_for(kind: LocatorKind) -> Box<dyn CulpritLocator> {
    match kind {
        LocatorKind::Substring => Box::new(SubstringLocator),
        LocatorKind::SqlLine => Box::new(SqlLineLocator::default()),
        LocatorKind::Chain => Box::new(ChainLocator::new(vec![
            Box::new(SqlLineLocator::default()),
            Box::new(SubstringLocator),
        ])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(names: &[&str]) -> FieldSet {
        names.iter().map(|n| FieldRef::new(*n)).collect()
    }

    const SQL: &str = "SELECT\n    users.id  AS users_id,\n    users.age_tier  AS users_age_tier,\n    users.city  AS users_city\nFROM users AS users\n";

    #[test]
    fn substring_matches_unqualified_names_in_candidate_order() {
        let candidates = set(&["a.dim2", "a.dim1", "a.dim3"]);
        let error = ErrorContext::new("SQL Error: dim1 and dim2 are incompatible");

        let found = SubstringLocator.locate(&error, &candidates);
        assert_eq!(found, vec![FieldRef::new("a.dim2"), FieldRef::new("a.dim1")]);
    }

    #[test]
    fn substring_without_match_is_empty() {
        let candidates = set(&["a.dim1"]);
        let error = ErrorContext::new("SQL Error: division by zero");
        assert!(SubstringLocator.locate(&error, &candidates).is_empty());
    }

    #[test]
    fn error_position_parsing() {
        assert_eq!(SqlLineLocator::error_position("Unrecognized name: x at [12:7]"), Some((12, 7)));
        assert_eq!(SqlLineLocator::error_position("no position here"), None);
    }

    #[test]
    fn aliases_on_a_line() {
        assert_eq!(
            SqlLineLocator::aliases("  CAST(x AS INT64) AS Users_Age_Tier,"),
            vec!["int64", "users_age_tier"]
        );
        assert_eq!(SqlLineLocator::aliases("  users.id AS `users_id`"), vec!["users_id"]);
    }

    #[test]
    fn sql_line_maps_alias_back_to_field() {
        let candidates = set(&["users.id", "users.age_tier", "users.city"]);
        // line 4 of the executed SQL is line 3 of the fetched SQL
        let error = ErrorContext::new("SQL Error: Unrecognized name: tier at [4:5]").with_sql(Some(SQL));

        let found = SqlLineLocator::default().locate(&error, &candidates);
        assert_eq!(found, vec![FieldRef::new("users.age_tier")]);
    }

    #[test]
    fn sql_line_needs_sql_and_position() {
        let candidates = set(&["users.id"]);
        let locator = SqlLineLocator::default();

        assert!(locator.locate(&ErrorContext::new("SQL Error: x at [2:1]"), &candidates).is_empty());
        assert!(locator
            .locate(&ErrorContext::new("SQL Error: x").with_sql(Some(SQL)), &candidates)
            .is_empty());
        assert!(locator
            .locate(&ErrorContext::new("SQL Error: x at [99:1]").with_sql(Some(SQL)), &candidates)
            .is_empty());
        assert!(locator
            .locate(&ErrorContext::new("SQL Error: x at [1:1]").with_sql(Some(SQL)), &candidates)
            .is_empty());
    }

    #[test]
    fn chain_falls_back_to_substring() {
        let candidates = set(&["users.id", "users.city"]);
        let chain = locator_for(LocatorKind::Chain);
        assert!(chain.needs_sql());

        let error = ErrorContext::new("SQL Error: bad city").with_sql(Some(SQL));
        assert_eq!(chain.locate(&error, &candidates), vec![FieldRef::new("users.city")]);
    }

    #[test]
    fn chain_prefers_sql_line() {
        let candidates = set(&["users.id", "users.age_tier"]);
        let chain = locator_for(LocatorKind::Chain);

        // substring alone would pick users.id
        let error = ErrorContext::new("SQL Error: id mismatch at [4:5]").with_sql(Some(SQL));
        assert_eq!(chain.locate(&error, &candidates), vec![FieldRef::new("users.age_tier")]);
    }

    #[test]
    fn substring_locator_does_not_need_sql() {
        assert!(!locator_for(LocatorKind::Substring).needs_sql());
        assert!(locator_for(LocatorKind::SqlLine).needs_sql());
    }
}
