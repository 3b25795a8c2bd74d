//! CLI smoke entry point.
//!
//! # Responsibility
//! - Seed one visible and one voided document, then print what each read
//!   mode returns.
//! - Keep output deterministic (`key=value` lines) for quick sanity checks.
//!
//! Usage: `voidscope_cli [config.json]`. Without a config the store is
//! in-memory and logging stays off.

use log::info;
use serde_json::{json, Map, Value};
use std::error::Error;
use voidscope_core::{
    apply_void_plugin, load_config, open_store, FieldKind, Filter, Query, Schema,
    SqliteDocumentRepository, StoreConfig, VoidCollection, VoidOptions, VoidQueryExt,
};

fn main() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args_os().nth(1) {
        Some(path) => load_config(path)?,
        None => StoreConfig::default(),
    };
    config.init_logging()?;

    let conn = open_store(&config)?;
    let mut schema = Schema::new().field("name", FieldKind::String);
    apply_void_plugin(&mut schema);
    let users = VoidCollection::try_new(SqliteDocumentRepository::try_new(
        &conn, "users", schema,
    )?)?;

    users.create_many(vec![
        object(json!({"name": "ABC"})),
        object(json!({"name": "ABC", "void": true})),
    ])?;
    info!("event=cli_seed module=cli status=ok documents=2");

    let by_name = || Query::new(Filter::new().eq("name", "ABC"));
    println!("find={}", users.find(by_name())?.len());
    println!("find_with_voids={}", users.find(by_name().with_voids())?.len());
    println!("find_only_voids={}", users.find(by_name().only_voids())?.len());
    println!("count_documents={}", users.count_documents(by_name())?);

    let voided = users.find_one_and_void(
        Filter::new().eq("void", false),
        VoidOptions::returning_after(),
    )?;
    println!(
        "find_one_and_void={}",
        voided.map_or(false, |document| document.is_void())
    );
    println!("find_after_void={}", users.find(by_name())?.len());

    Ok(())
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
