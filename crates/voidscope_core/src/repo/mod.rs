//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the document-store primitives plugins build on.
//! - Isolate SQLite query details from plugin logic.
//!
//! # Invariants
//! - Repository writes cast input through the collection `Schema`.
//! - Repository APIs return semantic errors (`Cast`, `Validation`) in
//!   addition to DB transport errors.

pub mod document_repo;
