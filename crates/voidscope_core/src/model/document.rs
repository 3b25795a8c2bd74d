//! Stored document model.
//!
//! # Invariants
//! - `_id` is the only reserved key and never appears inside `fields`.
//! - `fields` keeps the exact JSON persisted in `documents.body`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Stable identifier of one document inside a collection.
pub type DocumentId = Uuid;

/// Reserved primary-key field name.
pub const ID_FIELD: &str = "_id";

/// Soft-delete flag field installed by the void plugin.
pub const VOID_FIELD: &str = "void";

/// One JSON document as returned by repository reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: DocumentId, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Looks up a field by dotted path (`address.city`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns whether this document is flagged as voided.
    ///
    /// A missing or non-boolean flag reads as visible.
    pub fn is_void(&self) -> bool {
        self.get(VOID_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
