//! Collection schema declarations and value casting.
//!
//! # Responsibility
//! - Declare typed top-level fields with optional defaults.
//! - Cast caller input (documents, filters, updates) to declared types.
//!
//! # Invariants
//! - Declared fields are always present after `prepare_document` when they
//!   carry a default.
//! - Undeclared fields pass through untouched.
//! - `null` is accepted for every kind unless the field is required.

use crate::model::document::ID_FIELD;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static FIELD_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid field regex")
});

/// Returns whether `path` is a legal (optionally dotted) field path.
pub fn is_valid_field_path(path: &str) -> bool {
    FIELD_PATH_RE.is_match(path)
}

/// Declared storage type of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// No casting; any JSON value is accepted.
    Any,
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Any => "Any",
        };
        f.write_str(name)
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Value used when the caller omits the field on create.
    pub default: Option<Value>,
    /// Rejects missing or `null` values on create.
    pub required: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            required: false,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Casting/validation failure raised while preparing caller input.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    Cast {
        field: String,
        expected: FieldKind,
        value: Value,
    },
    Required(String),
    InvalidId(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cast {
                field,
                expected,
                value,
            } => write!(f, "cast to {expected} failed for value `{value}` at path `{field}`"),
            Self::Required(field) => write!(f, "path `{field}` is required"),
            Self::InvalidId(value) => write!(f, "invalid document id `{value}`"),
        }
    }
}

impl Error for SchemaError {}

/// Typed field declarations for one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: BTreeMap<String, FieldDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style shorthand for `add(FieldDef::new(name, kind))`.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.add(FieldDef::new(name, kind));
        self
    }

    /// Declares a field, replacing any previous declaration with the same name.
    pub fn add(&mut self, def: FieldDef) {
        self.fields.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    /// Casts a value destined for `path` (filter or update operand).
    ///
    /// Only top-level declared fields are cast; nested and undeclared paths
    /// are returned unchanged.
    pub fn cast_value(&self, path: &str, value: &Value) -> Result<Value, SchemaError> {
        match self.fields.get(path) {
            Some(def) => cast_to_kind(path, def.kind, value),
            None => Ok(value.clone()),
        }
    }

    /// Casts declared fields, fills defaults and enforces `required`.
    pub fn prepare_document(
        &self,
        mut fields: Map<String, Value>,
    ) -> Result<Map<String, Value>, SchemaError> {
        for def in self.fields.values() {
            let prepared = match fields.get(def.name.as_str()) {
                Some(value) => Some(cast_to_kind(&def.name, def.kind, value)?),
                None => def.default.clone(),
            };

            if def.required && prepared.as_ref().map_or(true, Value::is_null) {
                return Err(SchemaError::Required(def.name.clone()));
            }
            if let Some(value) = prepared {
                fields.insert(def.name.clone(), value);
            }
        }

        if fields.contains_key(ID_FIELD) {
            return Err(SchemaError::InvalidId(
                "`_id` cannot be stored as a document field".to_string(),
            ));
        }
        Ok(fields)
    }
}

/// Casts loosely typed input to a boolean.
///
/// Accepts `true/false`, `1/0` and the strings `"true"`, `"false"`,
/// `"1"`, `"0"`, `"yes"`, `"no"`.
pub fn cast_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_f64() {
            Some(v) if v == 1.0 => Some(true),
            Some(v) if v == 0.0 => Some(false),
            _ => None,
        },
        Value::String(text) => match text.as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn cast_to_kind(field: &str, kind: FieldKind, value: &Value) -> Result<Value, SchemaError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let cast = match kind {
        FieldKind::Any => Some(value.clone()),
        FieldKind::Boolean => cast_boolean(value).map(Value::Bool),
        FieldKind::String => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(number) => Some(Value::String(number.to_string())),
            Value::Bool(flag) => Some(Value::String(flag.to_string())),
            _ => None,
        },
        FieldKind::Number => match value {
            Value::Number(_) => Some(value.clone()),
            Value::Bool(flag) => Some(Value::from(i64::from(*flag))),
            Value::String(text) => cast_number_text(text),
            _ => None,
        },
    };

    cast.ok_or_else(|| SchemaError::Cast {
        field: field.to_string(),
        expected: kind,
        value: value.clone(),
    })
}

fn cast_number_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(Value::Null);
    }
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Some(Value::from(integer));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
