//! Soft-delete ("void") scoping for JSON document collections.
//!
//! Documents are flagged with `void = true` instead of being removed, and
//! reads through `VoidCollection` skip flagged documents unless a query
//! opts in with `with_voids()` or constrains the flag itself.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod plugin;
pub mod query;
pub mod repo;

pub use config::{load_config, open_store, ConfigError, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::document::{Document, DocumentId, ID_FIELD, VOID_FIELD};
pub use model::schema::{FieldDef, FieldKind, Schema, SchemaError};
pub use plugin::void::{
    apply_default_scope, apply_void_plugin, ReadOp, ScopeDecision, VoidCollection, VoidOptions,
    VoidQueryExt,
};
pub use query::builder::{
    FindOneAndUpdateOptions, Query, QueryOptions, ReturnDocument, SortDirection, SortKey, Update,
};
pub use query::filter::{Filter, VoidConstraint};
pub use repo::document_repo::{DocumentRepository, RepoError, RepoResult, SqliteDocumentRepository};
