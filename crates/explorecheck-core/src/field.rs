//! Field identifiers and the field/exclusion sets the isolation engine works on

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::config::glob_match;

/// A fully-qualified field identifier, conventionally `<view>.<field>`
///
/// Equality is exact string equality; no case folding is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldRef(String);

impl FieldRef {
    /// Create a new field reference
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The full `view.field` name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The view prefix, if the name is qualified
    pub fn view(&self) -> Option<&str> {
        self.0.split_once('.').map(|(view, _)| view)
    }

    /// The portion after the view prefix (the whole name if unqualified)
    pub fn unqualified(&self) -> &str {
        self.0.split_once('.').map(|(_, field)| field).unwrap_or(&self.0)
    }

    /// The SQL alias Looker generates for this field (`view_field`)
    pub fn sql_alias(&self) -> String {
        self.0.replace('.', "_")
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FieldRef {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Ordered sequence of unique fields included in a probe query
///
/// Order is the metadata order: dimensions first, then measures.
/// Duplicates are dropped on insertion, keeping the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<FieldRef>", into = "Vec<FieldRef>")]
pub struct FieldSet {
    fields: Vec<FieldRef>,
}

impl FieldSet {
    /// Create an empty field set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a field set from dimensions followed by measures
    pub fn from_parts(dimensions: Vec<FieldRef>, measures: Vec<FieldRef>) -> Self {
        dimensions.into_iter().chain(measures).collect()
    }

    /// Append a field, ignoring it if already present.
    /// Returns true if the field was added.
    pub fn push(&mut self, field: FieldRef) -> bool {
        if self.contains(&field) {
            return false;
        }
        self.fields.push(field);
        true
    }

    pub fn contains(&self, field: &FieldRef) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldRef> {
        self.fields.iter()
    }

    pub fn as_slice(&self) -> &[FieldRef] {
        &self.fields
    }

    /// Fields as plain strings, in order (the shape query bodies need)
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.as_str().to_string()).collect()
    }

    /// This set minus every field in the exclusion set, order preserved
    pub fn without(&self, excluded: &ExclusionSet) -> FieldSet {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|f| !excluded.contains(f))
                .cloned()
                .collect(),
        }
    }
}

impl FromIterator<FieldRef> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldRef>>(iter: I) -> Self {
        let mut set = FieldSet::new();
        for field in iter {
            set.push(field);
        }
        set
    }
}

impl From<Vec<FieldRef>> for FieldSet {
    fn from(fields: Vec<FieldRef>) -> Self {
        fields.into_iter().collect()
    }
}

impl From<FieldSet> for Vec<FieldRef> {
    fn from(set: FieldSet) -> Self {
        set.fields
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a FieldRef;
    type IntoIter = std::slice::Iter<'a, FieldRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Why a field ended up in an exclusion set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExclusionOrigin {
    /// Supplied up front by configuration or the command line
    Seeded,

    /// Identified as a culprit during an isolation run
    Discovered,
}

/// One excluded field and where it came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Exclusion {
    pub field: FieldRef,
    pub origin: ExclusionOrigin,
}

/// Fields determined to break a given explore
///
/// Grows monotonically: there is no removal API. Insertion order is kept so
/// reports show culprits in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Exclusion>", into = "Vec<Exclusion>")]
pub struct ExclusionSet {
    entries: Vec<Exclusion>,
    index: HashSet<FieldRef>,
}

impl ExclusionSet {
    /// Create an empty exclusion set
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an exclusion set for one explore
    ///
    /// Each pattern is either an exact `view.field` name or a glob
    /// (`users.*_raw`). Only fields present in `fields` are seeded, so the
    /// result never names a field the explore does not have.
    pub fn seeded(fields: &FieldSet, patterns: &[String]) -> Self {
        let mut set = Self::new();
        for field in fields {
            let matched = patterns.iter().any(|pattern| {
                if pattern.contains('*') {
                    glob_match(pattern, field.as_str())
                } else {
                    pattern == field.as_str()
                }
            });
            if matched {
                set.insert(field.clone(), ExclusionOrigin::Seeded);
            }
        }
        set
    }

    /// Add a field. Returns false if it was already excluded.
    pub fn insert(&mut self, field: FieldRef, origin: ExclusionOrigin) -> bool {
        if !self.index.insert(field.clone()) {
            return false;
        }
        self.entries.push(Exclusion { field, origin });
        true
    }

    pub fn contains(&self, field: &FieldRef) -> bool {
        self.index.contains(field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Exclusion> {
        self.entries.iter()
    }

    /// Every excluded field, in insertion order
    pub fn fields(&self) -> Vec<FieldRef> {
        self.entries.iter().map(|e| e.field.clone()).collect()
    }

    /// Fields found during isolation, sorted for display
    pub fn discovered_sorted(&self) -> Vec<FieldRef> {
        let mut fields: Vec<FieldRef> = self
            .entries
            .iter()
            .filter(|e| e.origin == ExclusionOrigin::Discovered)
            .map(|e| e.field.clone())
            .collect();
        fields.sort();
        fields
    }
}

impl From<Vec<Exclusion>> for ExclusionSet {
    fn from(entries: Vec<Exclusion>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            set.insert(entry.field, entry.origin);
        }
        set
    }
}

impl From<ExclusionSet> for Vec<Exclusion> {
    fn from(set: ExclusionSet) -> Self {
        set.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> FieldSet {
        names.iter().map(|n| FieldRef::from(*n)).collect()
    }

    #[test]
    fn field_ref_parts() {
        let field = FieldRef::new("users.created_date");
        assert_eq!(field.view(), Some("users"));
        assert_eq!(field.unqualified(), "created_date");
        assert_eq!(field.sql_alias(), "users_created_date");

        let bare = FieldRef::new("count");
        assert_eq!(bare.view(), None);
        assert_eq!(bare.unqualified(), "count");
    }

    #[test]
    fn field_set_drops_duplicates_and_keeps_order() {
        let fields = FieldSet::from_parts(
            vec!["a.dim2".into(), "a.dim1".into(), "a.dim2".into()],
            vec!["a.count".into(), "a.dim1".into()],
        );
        assert_eq!(fields.names(), vec!["a.dim2", "a.dim1", "a.count"]);
    }

    #[test]
    fn without_removes_excluded_fields() {
        let fields = set(&["a.dim1", "a.dim2", "a.count"]);
        let mut excluded = ExclusionSet::new();
        excluded.insert("a.dim2".into(), ExclusionOrigin::Discovered);

        let live = fields.without(&excluded);
        assert_eq!(live.names(), vec!["a.dim1", "a.count"]);
        assert!(live.iter().all(|f| !excluded.contains(f)));
    }

    #[test]
    fn exclusion_set_ignores_repeats() {
        let mut excluded = ExclusionSet::new();
        assert!(excluded.insert("a.dim1".into(), ExclusionOrigin::Discovered));
        assert!(!excluded.insert("a.dim1".into(), ExclusionOrigin::Seeded));
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded.iter().next().map(|e| e.origin), Some(ExclusionOrigin::Discovered));
    }

    #[test]
    fn seeding_supports_exact_names_and_globs() {
        let fields = set(&["users.id", "users.email_raw", "users.name_raw", "orders.id"]);
        let patterns = vec!["orders.id".to_string(), "users.*_raw".to_string(), "missing.field".to_string()];

        let excluded = ExclusionSet::seeded(&fields, &patterns);
        assert_eq!(
            excluded.fields(),
            vec![FieldRef::new("users.email_raw"), FieldRef::new("users.name_raw"), FieldRef::new("orders.id")]
        );
        assert!(excluded.discovered_sorted().is_empty());
    }

    #[test]
    fn discovered_are_sorted() {
        let mut excluded = ExclusionSet::new();
        excluded.insert("a.zeta".into(), ExclusionOrigin::Discovered);
        excluded.insert("a.seed".into(), ExclusionOrigin::Seeded);
        excluded.insert("a.alpha".into(), ExclusionOrigin::Discovered);

        assert_eq!(excluded.discovered_sorted(), vec![FieldRef::new("a.alpha"), FieldRef::new("a.zeta")]);
    }

    #[test]
    fn deserialized_exclusion_set_answers_membership() {
        let json = r#"[{"field": "a.dim1", "origin": "discovered"}, {"field": "a.dim1", "origin": "seeded"}]"#;
        let parsed: ExclusionSet = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains(&FieldRef::new("a.dim1")));
    }

    #[test]
    fn deserialized_field_set_drops_duplicates() {
        let parsed: FieldSet = serde_json::from_str(r#"["a.x", "a.x", "a.y"]"#).unwrap();
        assert_eq!(parsed.names(), vec!["a.x", "a.y"]);

        let json = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, r#"["a.x","a.y"]"#);
    }
}
