//! Soft-delete ("void") plugin.
//!
//! # Responsibility
//! - Declare the `void: Boolean = false` field on a collection schema.
//! - Scope every read to visible documents unless the query opts out.
//! - Replace deletes with "find one and set `void = true`".
//!
//! # Invariants
//! - Default scoping only ever injects `void == false`; an explicit void
//!   constraint (other than `null`) always wins.
//! - Scoping is idempotent: after one application the filter is either
//!   explicitly constrained or the query bypasses scoping.
//! - The plugin never removes documents and never rewrites host errors.

use crate::model::document::{Document, DocumentId, VOID_FIELD};
use crate::model::schema::{FieldDef, FieldKind, Schema};
use crate::query::builder::{
    FindOneAndUpdateOptions, Query, QueryOptions, ReturnDocument, SortKey, Update,
};
use crate::query::filter::{Filter, VoidConstraint};
use crate::repo::document_repo::{DocumentRepository, RepoError, RepoResult};
use log::{debug, info};
use serde_json::{Map, Value};

/// Declares the void flag on `schema`. Applying it twice is a no-op.
pub fn apply_void_plugin(schema: &mut Schema) {
    schema.add(FieldDef::new(VOID_FIELD, FieldKind::Boolean).with_default(false));
}

/// Returns whether `schema` declares the void flag as a Boolean field.
pub fn has_void_field(schema: &Schema) -> bool {
    schema
        .get(VOID_FIELD)
        .is_some_and(|def| def.kind == FieldKind::Boolean)
}

/// Query helpers contributed by the plugin.
pub trait VoidQueryExt: Sized {
    /// Restricts the query to voided documents, dropping any earlier void
    /// constraint.
    fn only_voids(self) -> Self;

    /// Lets voided documents through alongside visible ones.
    fn with_voids(self) -> Self;
}

impl VoidQueryExt for Query {
    fn only_voids(mut self) -> Self {
        self.filter_mut()
            .set_void_constraint(VoidConstraint::Equals(true));
        self
    }

    fn with_voids(self) -> Self {
        self.include_void(true)
    }
}

/// Operations that run through default scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOp {
    Count,
    CountDocuments,
    Find,
    FindOne,
    FindOneAndVoid,
}

impl ReadOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::CountDocuments => "count_documents",
            Self::Find => "find",
            Self::FindOne => "find_one",
            Self::FindOneAndVoid => "find_one_and_void",
        }
    }
}

/// Outcome of one default-scope application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeDecision {
    /// `include_void` was set; the filter is untouched.
    Bypassed,
    /// `void == false` was added to the filter.
    Injected,
    /// The filter already constrained the flag; it is untouched.
    ExplicitConstraint,
}

/// Applies default void exclusion to `filter` in place.
///
/// A `null` void constraint is treated like "not set" and gets replaced by
/// `void == false`.
pub fn apply_default_scope(
    op: ReadOp,
    filter: &mut Filter,
    options: &QueryOptions,
) -> ScopeDecision {
    let decision = if options.include_void {
        ScopeDecision::Bypassed
    } else if filter.void_constraint().is_unconstrained() {
        filter.set_void_constraint(VoidConstraint::Equals(false));
        ScopeDecision::Injected
    } else {
        ScopeDecision::ExplicitConstraint
    };

    debug!(
        "event=default_scope module=void op={} decision={:?}",
        op.as_str(),
        decision
    );
    decision
}

/// Options for `find_one_and_void`/`find_by_id_and_void`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoidOptions {
    /// Allows an already voided document to be matched.
    pub include_void: bool,
    /// `Before` (default) returns the visible image, `After` the voided one.
    pub return_document: ReturnDocument,
    /// Picks which document is voided when several match.
    pub sort: Vec<SortKey>,
}

impl VoidOptions {
    pub fn returning_after() -> Self {
        Self {
            return_document: ReturnDocument::After,
            ..Self::default()
        }
    }
}

/// Collection wrapper that scopes reads and voids instead of deleting.
pub struct VoidCollection<R: DocumentRepository> {
    repo: R,
}

impl<R: DocumentRepository> VoidCollection<R> {
    /// Wraps a repository whose schema carries the void flag.
    ///
    /// # Errors
    /// - `RepoError::MissingVoidField` when `apply_void_plugin` was not
    ///   applied to the repository schema.
    pub fn try_new(repo: R) -> RepoResult<Self> {
        if !has_void_field(repo.schema()) {
            return Err(RepoError::MissingVoidField);
        }
        Ok(Self { repo })
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn into_inner(self) -> R {
        self.repo
    }

    /// Creates a document; the schema default makes it visible.
    pub fn create(&self, fields: Map<String, Value>) -> RepoResult<Document> {
        self.repo.create(fields)
    }

    pub fn create_many(&self, documents: Vec<Map<String, Value>>) -> RepoResult<Vec<Document>> {
        self.repo.create_many(documents)
    }

    pub fn find(&self, query: Query) -> RepoResult<Vec<Document>> {
        let query = scoped(ReadOp::Find, query);
        self.repo.find(&query)
    }

    pub fn find_one(&self, query: Query) -> RepoResult<Option<Document>> {
        let query = scoped(ReadOp::FindOne, query);
        self.repo.find_one(&query)
    }

    /// Looks a document up by id, hiding it when voided unless `include_void`.
    pub fn find_by_id(&self, id: DocumentId, include_void: bool) -> RepoResult<Option<Document>> {
        self.find_one(Query::new(Filter::by_id(id)).include_void(include_void))
    }

    /// Legacy alias of `count_documents`.
    pub fn count(&self, query: Query) -> RepoResult<u64> {
        let query = scoped(ReadOp::Count, query);
        self.repo.count_documents(&query)
    }

    pub fn count_documents(&self, query: Query) -> RepoResult<u64> {
        let query = scoped(ReadOp::CountDocuments, query);
        self.repo.count_documents(&query)
    }

    /// Flags the first matching document as voided.
    ///
    /// Returns `Ok(None)` when nothing matches. Matching follows default
    /// scoping, so an already voided document is only found with
    /// `include_void` or an explicit void condition.
    pub fn find_one_and_void(
        &self,
        conditions: Filter,
        options: VoidOptions,
    ) -> RepoResult<Option<Document>> {
        let mut filter = conditions;
        let scope_options = QueryOptions {
            include_void: options.include_void,
            ..QueryOptions::default()
        };
        apply_default_scope(ReadOp::FindOneAndVoid, &mut filter, &scope_options);

        let update_options = FindOneAndUpdateOptions {
            return_document: options.return_document,
            sort: options.sort,
        };
        let result = self.repo.find_one_and_update(
            &filter,
            &Update::set(VOID_FIELD, true),
            &update_options,
        )?;

        match &result {
            Some(document) => info!(
                "event=void_document module=void status=ok id={}",
                document.id
            ),
            None => debug!("event=void_document module=void status=no_match"),
        }
        Ok(result)
    }

    /// `find_one_and_void` keyed by primary id.
    pub fn find_by_id_and_void(
        &self,
        id: DocumentId,
        options: VoidOptions,
    ) -> RepoResult<Option<Document>> {
        self.find_one_and_void(Filter::by_id(id), options)
    }
}

fn scoped(op: ReadOp, mut query: Query) -> Query {
    let options = query.options().clone();
    apply_default_scope(op, query.filter_mut(), &options);
    query
}

#[cfg(test)]
mod tests {
    use super::{
        apply_default_scope, apply_void_plugin, has_void_field, ReadOp, ScopeDecision,
        VoidQueryExt,
    };
    use crate::model::schema::{FieldKind, Schema};
    use crate::query::builder::{Query, QueryOptions};
    use crate::query::filter::{Filter, VoidConstraint};
    use serde_json::Value;

    #[test]
    fn plugin_declares_boolean_flag_once() {
        let mut schema = Schema::new().field("name", FieldKind::String);
        assert!(!has_void_field(&schema));

        apply_void_plugin(&mut schema);
        apply_void_plugin(&mut schema);

        assert!(has_void_field(&schema));
        assert_eq!(schema.fields().count(), 2);
        assert_eq!(schema.get("void").unwrap().default, Some(Value::Bool(false)));
    }

    #[test]
    fn with_voids_sets_option_without_touching_filter() {
        let query = Query::all().where_eq("name", "ABC").sort("name").with_voids();
        assert!(query.options().include_void);
        assert_eq!(
            query.filter().void_constraint(),
            &VoidConstraint::Unconstrained
        );
    }

    #[test]
    fn only_voids_overrides_prior_constraint() {
        let query = Query::all().where_eq("void", false).only_voids();
        assert_eq!(query.filter().void_constraint(), &VoidConstraint::Equals(true));
        assert!(!query.options().include_void);
    }

    #[test]
    fn default_scope_injects_visible_only() {
        let mut filter = Filter::new().eq("name", "ABC");
        let decision = apply_default_scope(ReadOp::Find, &mut filter, &QueryOptions::default());
        assert_eq!(decision, ScopeDecision::Injected);
        assert_eq!(filter.void_constraint(), &VoidConstraint::Equals(false));
    }

    #[test]
    fn default_scope_treats_null_as_unset() {
        let mut filter = Filter::new().eq("void", Value::Null);
        let decision = apply_default_scope(ReadOp::FindOne, &mut filter, &QueryOptions::default());
        assert_eq!(decision, ScopeDecision::Injected);
        assert_eq!(filter.void_constraint(), &VoidConstraint::Equals(false));
    }

    #[test]
    fn explicit_constraint_wins_even_when_false() {
        for flag in [false, true] {
            let mut filter = Filter::new().eq("void", flag);
            let before = filter.clone();
            let decision =
                apply_default_scope(ReadOp::Count, &mut filter, &QueryOptions::default());
            assert_eq!(decision, ScopeDecision::ExplicitConstraint);
            assert_eq!(filter, before);
        }
    }

    #[test]
    fn include_void_bypasses_scope() {
        let options = QueryOptions {
            include_void: true,
            ..QueryOptions::default()
        };
        let mut filter = Filter::new().eq("name", "ABC");
        let before = filter.clone();
        let decision = apply_default_scope(ReadOp::CountDocuments, &mut filter, &options);
        assert_eq!(decision, ScopeDecision::Bypassed);
        assert_eq!(filter, before);
    }

    #[test]
    fn default_scope_is_idempotent() {
        let options = QueryOptions::default();
        let mut once = Filter::new().eq("name", "ABC");
        apply_default_scope(ReadOp::Find, &mut once, &options);

        let mut twice = once.clone();
        let decision = apply_default_scope(ReadOp::Find, &mut twice, &options);
        assert_eq!(decision, ScopeDecision::ExplicitConstraint);
        assert_eq!(once, twice);
    }
}
