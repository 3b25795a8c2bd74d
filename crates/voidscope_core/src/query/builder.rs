//! Chainable query, update and option values.

use crate::query::filter::Filter;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Parses a whitespace separated sort spec such as `"-void name"`.
///
/// A leading `-` sorts descending, an optional leading `+` ascending.
pub fn parse_sort(spec: &str) -> Vec<SortKey> {
    spec.split_whitespace()
        .filter_map(|token| {
            if let Some(field) = token.strip_prefix('-') {
                (!field.is_empty()).then(|| SortKey::descending(field))
            } else {
                let field = token.strip_prefix('+').unwrap_or(token);
                (!field.is_empty()).then(|| SortKey::ascending(field))
            }
        })
        .collect()
}

/// Per-query execution options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Skips default void exclusion for this query only.
    pub include_void: bool,
    /// Applied before the insertion-order tiebreaker.
    pub sort: Vec<SortKey>,
    pub limit: Option<u32>,
    pub skip: u32,
}

/// In-progress read: a filter plus its options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filter: Filter,
    options: QueryOptions,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            options: QueryOptions::default(),
        }
    }

    /// Matches every document in the collection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut Filter {
        &mut self.filter
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut QueryOptions {
        &mut self.options
    }

    /// Merges additional conditions into the current filter.
    pub fn where_filter(mut self, filter: Filter) -> Self {
        self.filter.merge(filter);
        self
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.merge(Filter::new().eq(field, value));
        self
    }

    /// Replaces every option at once.
    pub fn set_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn include_void(mut self, include: bool) -> Self {
        self.options.include_void = include;
        self
    }

    pub fn sort(mut self, spec: &str) -> Self {
        self.options.sort = parse_sort(spec);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.options.skip = skip;
        self
    }

    pub fn into_parts(self) -> (Filter, QueryOptions) {
        (self.filter, self.options)
    }
}

impl From<Filter> for Query {
    fn from(value: Filter) -> Self {
        Self::new(value)
    }
}

/// `$set`-style update: every assignment overwrites one field path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    assignments: BTreeMap<String, Value>,
}

impl Update {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and_set(field, value)
    }

    pub fn and_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.insert(field.into(), value.into());
        self
    }

    pub fn assignments(&self) -> &BTreeMap<String, Value> {
        &self.assignments
    }
}

/// Which image `find_one_and_update` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The matched document as it was before the update.
    #[default]
    Before,
    After,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOneAndUpdateOptions {
    pub return_document: ReturnDocument,
    /// Picks which document is updated when several match.
    pub sort: Vec<SortKey>,
}

#[cfg(test)]
mod tests {
    use super::{parse_sort, Query, QueryOptions, SortKey, Update};
    use crate::query::filter::{Filter, VoidConstraint};
    use serde_json::json;

    #[test]
    fn parse_sort_reads_direction_prefixes() {
        assert_eq!(
            parse_sort("-void  +name age"),
            vec![
                SortKey::descending("void"),
                SortKey::ascending("name"),
                SortKey::ascending("age"),
            ]
        );
        assert!(parse_sort(" - + ").is_empty());
    }

    #[test]
    fn chained_query_keeps_filter_and_options_apart() {
        let query = Query::all()
            .where_eq("name", "ABC")
            .sort("name")
            .limit(5)
            .skip(2)
            .include_void(true);

        assert_eq!(query.filter().conditions()["name"], json!("ABC"));
        assert_eq!(
            query.filter().void_constraint(),
            &VoidConstraint::Unconstrained
        );
        assert!(query.options().include_void);
        assert_eq!(query.options().limit, Some(5));
        assert_eq!(query.options().skip, 2);
        assert_eq!(query.options().sort, vec![SortKey::ascending("name")]);
    }

    #[test]
    fn where_filter_merges_and_set_options_replaces() {
        let query = Query::new(Filter::new().eq("name", "ABC"))
            .limit(3)
            .where_filter(Filter::new().eq("void", true).eq("age", 4))
            .set_options(QueryOptions {
                include_void: true,
                ..QueryOptions::default()
            });

        let (filter, options) = query.into_parts();
        assert_eq!(filter.conditions()["name"], json!("ABC"));
        assert_eq!(filter.conditions()["age"], json!(4));
        assert_eq!(filter.void_constraint(), &VoidConstraint::Equals(true));
        assert!(options.include_void);
        assert_eq!(options.limit, None);
    }

    #[test]
    fn update_collects_assignments() {
        let update = Update::set("void", true).and_set("name", "x");
        assert_eq!(update.assignments().len(), 2);
        assert_eq!(update.assignments()["void"], json!(true));
    }
}
