//! Typed equality filters.
//!
//! # Invariants
//! - The void flag is never stored in `conditions`; it always lives in
//!   `VoidConstraint` so "not set" and "set" stay distinguishable.
//! - `VoidConstraint::Null` is deliberately equivalent to `Unconstrained`
//!   for default scoping (see `VoidConstraint::is_unconstrained`).

use crate::model::document::{DocumentId, ID_FIELD, VOID_FIELD};
use crate::model::schema::cast_boolean;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Constraint carried by a filter on the void flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum VoidConstraint {
    /// Caller said nothing about the flag.
    #[default]
    Unconstrained,
    /// Caller wrote the flag as `null`.
    Null,
    /// Caller asked for one flag value.
    Equals(bool),
    /// Caller wrote a value that does not cast to a boolean. Reads fail
    /// with a cast error when this reaches the repository.
    Uncastable(Value),
}

impl VoidConstraint {
    pub fn from_value(value: Value) -> Self {
        if value.is_null() {
            return Self::Null;
        }
        match cast_boolean(&value) {
            Some(flag) => Self::Equals(flag),
            None => Self::Uncastable(value),
        }
    }

    /// Returns `true` when default scoping may inject `void == false`.
    ///
    /// An explicit `null` counts as "not set".
    pub fn is_unconstrained(&self) -> bool {
        matches!(self, Self::Unconstrained | Self::Null)
    }
}

/// Conjunction of field equality conditions plus the void constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, Value>,
    void: VoidConstraint,
}

impl Filter {
    /// Matches every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches the document whose primary key equals `id`.
    pub fn by_id(id: DocumentId) -> Self {
        Self::new().eq(ID_FIELD, id.to_string())
    }

    /// Adds `field == value`, replacing an earlier condition on `field`.
    ///
    /// The void field is routed to the typed constraint.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field.into(), value.into());
        self
    }

    /// Merges every condition of `other` into `self`; `other` wins on overlap.
    pub fn merge(&mut self, other: Filter) {
        self.conditions.extend(other.conditions);
        if other.void != VoidConstraint::Unconstrained {
            self.void = other.void;
        }
    }

    pub fn void_constraint(&self) -> &VoidConstraint {
        &self.void
    }

    pub fn set_void_constraint(&mut self, constraint: VoidConstraint) {
        self.void = constraint;
    }

    /// Non-void conditions in field order.
    pub fn conditions(&self) -> &BTreeMap<String, Value> {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.void == VoidConstraint::Unconstrained
    }

    fn insert(&mut self, field: String, value: Value) {
        if field == VOID_FIELD {
            self.void = VoidConstraint::from_value(value);
        } else {
            self.conditions.insert(field, value);
        }
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(value: Map<String, Value>) -> Self {
        let mut filter = Self::new();
        for (field, condition) in value {
            filter.insert(field, condition);
        }
        filter
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, VoidConstraint};
    use serde_json::{json, Map, Value};
    use uuid::Uuid;

    #[test]
    fn void_field_is_routed_to_typed_constraint() {
        let filter = Filter::new().eq("name", "ABC").eq("void", true);
        assert_eq!(filter.void_constraint(), &VoidConstraint::Equals(true));
        assert!(!filter.conditions().contains_key("void"));
        assert_eq!(filter.conditions()["name"], json!("ABC"));
    }

    #[test]
    fn void_values_are_cast_or_kept_as_uncastable() {
        assert_eq!(
            VoidConstraint::from_value(json!("no")),
            VoidConstraint::Equals(false)
        );
        assert_eq!(VoidConstraint::from_value(Value::Null), VoidConstraint::Null);
        assert_eq!(
            VoidConstraint::from_value(json!("sometimes")),
            VoidConstraint::Uncastable(json!("sometimes"))
        );
    }

    #[test]
    fn null_counts_as_unconstrained() {
        assert!(VoidConstraint::Unconstrained.is_unconstrained());
        assert!(VoidConstraint::Null.is_unconstrained());
        assert!(!VoidConstraint::Equals(false).is_unconstrained());
        assert!(!VoidConstraint::Uncastable(json!(3)).is_unconstrained());
    }

    #[test]
    fn from_object_and_merge() {
        let object: Map<String, Value> =
            serde_json::from_value(json!({"name": "ABC", "void": false})).unwrap();
        let mut filter = Filter::from(object);
        assert_eq!(filter.void_constraint(), &VoidConstraint::Equals(false));

        filter.merge(Filter::new().eq("name", "XYZ"));
        assert_eq!(filter.conditions()["name"], json!("XYZ"));
        assert_eq!(filter.void_constraint(), &VoidConstraint::Equals(false));

        filter.merge(Filter::new().eq("void", true));
        assert_eq!(filter.void_constraint(), &VoidConstraint::Equals(true));
    }

    #[test]
    fn by_id_uses_reserved_key() {
        let id = Uuid::new_v4();
        let filter = Filter::by_id(id);
        assert_eq!(filter.conditions()["_id"], json!(id.to_string()));
        assert!(!filter.is_empty());
        assert!(Filter::new().is_empty());
    }
}
