//! Document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the host primitives (create, find, count, find-and-update)
//!   that the void plugin wraps.
//! - Compile typed filters into parameterized SQL over JSON bodies.
//!
//! # Invariants
//! - Every statement is scoped to the repository's collection.
//! - Field paths are validated before they reach SQL; values are always bound.
//! - Filter and update operands are cast through the collection schema.
//! - `find_one_and_update` reads and writes inside one IMMEDIATE transaction.
//! - "No match" is `Ok(None)`, never an error.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::document::{Document, DocumentId, ID_FIELD, VOID_FIELD};
use crate::model::schema::{is_valid_field_path, Schema, SchemaError};
use crate::query::builder::{
    FindOneAndUpdateOptions, Query, ReturnDocument, SortDirection, SortKey, Update,
};
use crate::query::filter::{Filter, VoidConstraint};
use log::debug;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use serde_json::{Map, Number, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DOCUMENT_SELECT_SQL: &str = "SELECT seq, id, body FROM documents";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for document persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Caller input rejected by the collection schema.
    Validation(SchemaError),
    /// Filter operand cannot be cast to the declared field type.
    Cast {
        field: String,
        value: Value,
    },
    InvalidField(String),
    InvalidCollection(String),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    /// Schema of a wrapped collection does not declare a Boolean void flag.
    MissingVoidField,
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Cast { field, value } => {
                write!(f, "cannot cast filter value `{value}` for path `{field}`")
            }
            Self::InvalidField(path) => write!(f, "invalid field path `{path}`"),
            Self::InvalidCollection(name) => write!(f, "invalid collection name `{name}`"),
            Self::InvalidData(message) => write!(f, "invalid persisted document data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; open it with open_db"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
            Self::MissingVoidField => write!(
                f,
                "schema has no Boolean `{VOID_FIELD}` field; apply the void plugin first"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SchemaError> for RepoError {
    fn from(value: SchemaError) -> Self {
        Self::Validation(value)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(format!("document body is not a JSON object: {value}"))
    }
}

/// Host primitives of one document collection.
pub trait DocumentRepository {
    /// Declared fields of the collection.
    fn schema(&self) -> &Schema;

    /// Inserts one document; a missing `_id` is generated.
    fn create(&self, fields: Map<String, Value>) -> RepoResult<Document>;

    /// Inserts documents one by one, stopping at the first failure.
    fn create_many(&self, documents: Vec<Map<String, Value>>) -> RepoResult<Vec<Document>> {
        documents
            .into_iter()
            .map(|fields| self.create(fields))
            .collect()
    }

    fn find(&self, query: &Query) -> RepoResult<Vec<Document>>;

    fn find_one(&self, query: &Query) -> RepoResult<Option<Document>>;

    /// Counts matches, honoring the query's `limit` and `skip`.
    fn count_documents(&self, query: &Query) -> RepoResult<u64>;

    /// Atomically applies `update` to the first document matching `filter`.
    fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        options: &FindOneAndUpdateOptions,
    ) -> RepoResult<Option<Document>>;
}

/// SQLite-backed repository for one named collection.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn Connection,
    collection: String,
    schema: Schema,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `InvalidCollection` for names that are not plain identifiers.
    /// - `UninitializedConnection`/`MissingRequiredTable` when the
    ///   connection was not opened through `open_db`/`open_db_in_memory`.
    pub fn try_new(
        conn: &'conn Connection,
        collection: impl Into<String>,
        schema: Schema,
    ) -> RepoResult<Self> {
        let collection = collection.into();
        if collection.contains('.') || !is_valid_field_path(&collection) {
            return Err(RepoError::InvalidCollection(collection));
        }
        ensure_connection_ready(conn)?;
        Ok(Self {
            conn,
            collection,
            schema,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn compile_select(
        &self,
        filter: &Filter,
        sort: &[SortKey],
        limit: Option<u32>,
        skip: u32,
    ) -> RepoResult<(String, Vec<SqlValue>)> {
        let mut sql = String::from(DOCUMENT_SELECT_SQL);
        let mut binds = Vec::new();
        push_where(&mut sql, &mut binds, &self.collection, &self.schema, filter)?;
        push_order_by(&mut sql, &mut binds, sort)?;

        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            binds.push(SqlValue::Integer(i64::from(limit)));
            if skip > 0 {
                sql.push_str(" OFFSET ?");
                binds.push(SqlValue::Integer(i64::from(skip)));
            }
        } else if skip > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(SqlValue::Integer(i64::from(skip)));
        }

        Ok((sql, binds))
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn create(&self, mut fields: Map<String, Value>) -> RepoResult<Document> {
        let id = match fields.remove(ID_FIELD) {
            None => Uuid::new_v4(),
            Some(Value::String(text)) => Uuid::parse_str(&text)
                .map_err(|_| SchemaError::InvalidId(text.clone()))?,
            Some(other) => return Err(SchemaError::InvalidId(other.to_string()).into()),
        };

        if let Some(key) = fields
            .keys()
            .find(|key| key.contains('.') || !is_valid_field_path(key))
        {
            return Err(RepoError::InvalidField(key.clone()));
        }

        let fields = self.schema.prepare_document(fields)?;
        let body = serde_json::to_string(&fields)?;
        self.conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3);",
            params![self.collection, id.to_string(), body],
        )?;

        Ok(Document::new(id, fields))
    }

    fn find(&self, query: &Query) -> RepoResult<Vec<Document>> {
        let options = query.options();
        let (sql, binds) =
            self.compile_select(query.filter(), &options.sort, options.limit, options.skip)?;

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let (_, document) = parse_document_row(row)?;
            documents.push(document);
        }

        Ok(documents)
    }

    fn find_one(&self, query: &Query) -> RepoResult<Option<Document>> {
        let mut single = query.clone();
        single.options_mut().limit = Some(1);
        Ok(self.find(&single)?.into_iter().next())
    }

    fn count_documents(&self, query: &Query) -> RepoResult<u64> {
        let options = query.options();
        let (sql, binds) = if options.limit.is_none() && options.skip == 0 {
            let mut sql = String::from("SELECT COUNT(*) FROM documents");
            let mut binds = Vec::new();
            push_where(&mut sql, &mut binds, &self.collection, &self.schema, query.filter())?;
            (sql, binds)
        } else {
            let (page, binds) =
                self.compile_select(query.filter(), &[], options.limit, options.skip)?;
            (format!("SELECT COUNT(*) FROM ({page})"), binds)
        };

        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        u64::try_from(count).map_err(|_| RepoError::InvalidData(format!("negative count {count}")))
    }

    fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        options: &FindOneAndUpdateOptions,
    ) -> RepoResult<Option<Document>> {
        let (sql, binds) = self.compile_select(filter, &options.sort, Some(1), 0)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let matched = {
            let mut stmt = tx.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(binds))?;
            match rows.next()? {
                Some(row) => Some(parse_document_row(row)?),
                None => None,
            }
        };

        let Some((seq, before)) = matched else {
            tx.commit()?;
            debug!(
                "event=find_one_and_update module=repo status=ok collection={} matched=0",
                self.collection
            );
            return Ok(None);
        };

        let fields = apply_update(&self.schema, before.fields.clone(), update)?;
        let body = serde_json::to_string(&fields)?;
        tx.execute(
            "UPDATE documents
             SET
                body = ?1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE seq = ?2;",
            params![body, seq],
        )?;
        tx.commit()?;

        debug!(
            "event=find_one_and_update module=repo status=ok collection={} matched=1 id={}",
            self.collection, before.id
        );

        Ok(Some(match options.return_document {
            ReturnDocument::Before => before,
            ReturnDocument::After => Document::new(before.id, fields),
        }))
    }
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'documents'
        );",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(RepoError::MissingRequiredTable("documents"));
    }

    Ok(())
}

fn push_where(
    sql: &mut String,
    binds: &mut Vec<SqlValue>,
    collection: &str,
    schema: &Schema,
    filter: &Filter,
) -> RepoResult<()> {
    sql.push_str(" WHERE collection = ?");
    binds.push(SqlValue::Text(collection.to_string()));

    for (field, value) in filter.conditions() {
        if field == ID_FIELD {
            push_id_condition(sql, binds, value)?;
            continue;
        }

        ensure_field_path(field)?;
        let cast = schema.cast_value(field, value).map_err(|_| RepoError::Cast {
            field: field.clone(),
            value: value.clone(),
        })?;
        push_equality(sql, binds, field, &cast);
    }

    match filter.void_constraint() {
        VoidConstraint::Unconstrained => {}
        VoidConstraint::Null => push_equality(sql, binds, VOID_FIELD, &Value::Null),
        VoidConstraint::Equals(flag) => push_equality(sql, binds, VOID_FIELD, &Value::Bool(*flag)),
        VoidConstraint::Uncastable(value) => {
            return Err(RepoError::Cast {
                field: VOID_FIELD.to_string(),
                value: value.clone(),
            });
        }
    }

    Ok(())
}

fn push_id_condition(sql: &mut String, binds: &mut Vec<SqlValue>, value: &Value) -> RepoResult<()> {
    let id: DocumentId = match value {
        // Every stored document has an id, so `_id: null` matches nothing.
        Value::Null => {
            sql.push_str(" AND 0");
            return Ok(());
        }
        Value::String(text) => Uuid::parse_str(text).map_err(|_| RepoError::Cast {
            field: ID_FIELD.to_string(),
            value: value.clone(),
        })?,
        _ => {
            return Err(RepoError::Cast {
                field: ID_FIELD.to_string(),
                value: value.clone(),
            });
        }
    };

    sql.push_str(" AND id = ?");
    binds.push(SqlValue::Text(id.to_string()));
    Ok(())
}

fn push_equality(sql: &mut String, binds: &mut Vec<SqlValue>, field: &str, value: &Value) {
    let path = json_path(field);
    match value {
        Value::Null => {
            sql.push_str(" AND coalesce(json_type(body, ?), 'null') = 'null'");
            binds.push(SqlValue::Text(path));
        }
        Value::Bool(flag) => {
            sql.push_str(" AND json_type(body, ?) = ?");
            binds.push(SqlValue::Text(path));
            binds.push(SqlValue::Text(flag.to_string()));
        }
        Value::Number(number) => {
            sql.push_str(
                " AND json_type(body, ?) IN ('integer', 'real') AND json_extract(body, ?) = ?",
            );
            binds.push(SqlValue::Text(path.clone()));
            binds.push(SqlValue::Text(path));
            binds.push(number_to_sql(number));
        }
        Value::String(text) => {
            sql.push_str(" AND json_type(body, ?) = 'text' AND json_extract(body, ?) = ?");
            binds.push(SqlValue::Text(path.clone()));
            binds.push(SqlValue::Text(path));
            binds.push(SqlValue::Text(text.clone()));
        }
        Value::Array(_) | Value::Object(_) => {
            sql.push_str(
                " AND json_type(body, ?) IN ('array', 'object') AND json_extract(body, ?) = json(?)",
            );
            binds.push(SqlValue::Text(path.clone()));
            binds.push(SqlValue::Text(path));
            binds.push(SqlValue::Text(value.to_string()));
        }
    }
}

fn push_order_by(sql: &mut String, binds: &mut Vec<SqlValue>, sort: &[SortKey]) -> RepoResult<()> {
    let mut terms = Vec::with_capacity(sort.len() + 1);
    for key in sort {
        let direction = match key.direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        if key.field == ID_FIELD {
            terms.push(format!("id {direction}"));
            continue;
        }
        ensure_field_path(&key.field)?;
        terms.push(format!("json_extract(body, ?) {direction}"));
        binds.push(SqlValue::Text(json_path(&key.field)));
    }
    // Insertion order breaks ties so results are stable.
    terms.push("seq ASC".to_string());

    sql.push_str(" ORDER BY ");
    sql.push_str(&terms.join(", "));
    Ok(())
}

fn apply_update(
    schema: &Schema,
    mut fields: Map<String, Value>,
    update: &Update,
) -> RepoResult<Map<String, Value>> {
    for (path, value) in update.assignments() {
        if path == ID_FIELD {
            return Err(RepoError::InvalidField(format!("{ID_FIELD} is immutable")));
        }
        ensure_field_path(path)?;
        let cast = schema.cast_value(path, value)?;
        set_path(&mut fields, path, cast);
    }
    Ok(fields)
}

/// Writes `value` at a dotted path, replacing non-object intermediates.
fn set_path(fields: &mut Map<String, Value>, path: &str, value: Value) {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };

    let mut current = fields;
    for segment in parents.into_iter().flat_map(|parents| parents.split('.')) {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            unreachable!("intermediate path segment was just made an object");
        };
        current = next;
    }
    current.insert(leaf.to_string(), value);
}

fn ensure_field_path(path: &str) -> RepoResult<()> {
    if is_valid_field_path(path) {
        Ok(())
    } else {
        Err(RepoError::InvalidField(path.to_string()))
    }
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn number_to_sql(number: &Number) -> SqlValue {
    match number.as_i64() {
        Some(integer) => SqlValue::Integer(integer),
        None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
    }
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<(i64, Document)> {
    let seq: i64 = row.get("seq")?;
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in documents.id"))
    })?;

    let body: String = row.get("body")?;
    let fields: Map<String, Value> = serde_json::from_str(&body)?;
    Ok((seq, Document::new(id, fields)))
}

#[cfg(test)]
mod tests {
    use super::{push_order_by, push_where, set_path};
    use crate::model::schema::{FieldKind, Schema};
    use crate::query::builder::parse_sort;
    use crate::query::filter::Filter;
    use serde_json::{json, Map, Value};

    #[test]
    fn set_path_creates_and_replaces_intermediates() {
        let mut fields: Map<String, Value> =
            serde_json::from_value(json!({"a": 1, "b": {"keep": true}})).unwrap();
        set_path(&mut fields, "a.x", json!(2));
        set_path(&mut fields, "b.c.d", json!("deep"));
        set_path(&mut fields, "top", json!(null));

        assert_eq!(
            Value::Object(fields),
            json!({"a": {"x": 2}, "b": {"keep": true, "c": {"d": "deep"}}, "top": null})
        );
    }

    #[test]
    fn where_clause_binds_every_operand() {
        let schema = Schema::new().field("age", FieldKind::Number);
        let filter = Filter::new().eq("age", "7").eq("void", false);
        let mut sql = String::new();
        let mut binds = Vec::new();
        push_where(&mut sql, &mut binds, "users", &schema, &filter).unwrap();

        assert_eq!(sql.matches('?').count(), binds.len());
        assert!(!sql.contains("users"));
        assert!(sql.contains("json_type(body, ?) = ?"));
    }

    #[test]
    fn order_by_rejects_illegal_paths() {
        let mut sql = String::new();
        let mut binds = Vec::new();
        assert!(push_order_by(&mut sql, &mut binds, &parse_sort("name; DROP")).is_err());

        let mut sql = String::new();
        let mut binds = Vec::new();
        push_order_by(&mut sql, &mut binds, &parse_sort("-void _id")).unwrap();
        assert_eq!(
            sql,
            " ORDER BY json_extract(body, ?) DESC, id ASC, seq ASC"
        );
        assert_eq!(binds.len(), 1);
    }
}
