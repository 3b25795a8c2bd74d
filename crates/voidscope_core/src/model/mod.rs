//! Document model and schema declarations.
//!
//! # Responsibility
//! - Define the stored document shape shared by every collection.
//! - Declare typed fields, defaults and casting rules per collection.
//!
//! # Invariants
//! - Every document is identified by a stable `DocumentId`.
//! - Documents are flagged, never physically removed, by the void plugin.

pub mod document;
pub mod schema;
