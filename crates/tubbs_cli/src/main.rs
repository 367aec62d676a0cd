//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise one model type end to end: define, save, find, query, delete.
//! - Keep output deterministic apart from generated keys.
//!
//! Usage: `tubbs_cli [DB_PATH]`. Without a path the in-memory store is used.
//! Logging starts when `TUBBS_LOG_DIR` is set (`TUBBS_LOG_LEVEL` optional).

use log::{info, warn};
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;
use tubbs_core::{
    events, DataStore, FieldDescriptor, LoggingConfig, MemoryStore, Model, SqliteStore,
    StoreResult,
};

fn main() -> ExitCode {
    if let Some(config) = LoggingConfig::from_env() {
        if let Err(err) = config.init() {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(db_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let store: Rc<dyn DataStore> = match &db_path {
        Some(path) => Rc::new(SqliteStore::open(path)?),
        None => Rc::new(MemoryStore::new()),
    };
    info!(
        "event=cli_start module=cli store={}",
        if db_path.is_some() { "sqlite" } else { "memory" }
    );

    let users = Model::builder()
        .class_name("user")
        .primary_key("id")
        .basic_properties(["username", "email"])
        .field(
            FieldDescriptor::new("age")
                .default(json!(1))
                .coerce(|value| coerce_age(&value).unwrap_or(json!(1))),
        )
        .field(FieldDescriptor::computed("label", |user| {
            let username = user.get("username")?;
            Some(json!(format!("{}@{}", username.as_str()?, user.read("age")?)))
        }))
        .data_store(store)
        .build()?;

    users.on(events::SAVE, |notification| {
        if let Some(user) = &notification.instance {
            println!("saved {}", user.id());
        }
    });

    let user = users.create_with(object(json!({"username": "ada", "age": "36"})));
    println!("label={}", user.read("label").unwrap_or(Value::Null));

    let saved = capture(|cb| user.save(cb))?;
    let found = capture(|cb| users.find(saved.id(), cb))?;
    println!("found={}", serde_json::to_string(&found)?);

    let matches = capture(|cb| {
        users.find_where(
            json!({"username": "ada"}),
            |user, args| user.get("username").as_ref() == args.get("username"),
            cb,
        )
    })?;
    println!("matches={}", matches.len());

    capture(|cb| users.delete(saved.id(), cb))?;
    match capture(|cb| users.find(saved.id(), cb)) {
        Ok(_) => warn!("event=cli_delete module=cli status=unexpected_survivor"),
        Err(err) => println!("after delete: {err}"),
    }
    Ok(())
}

fn coerce_age(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(raw) => raw.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Runs one callback-style operation against the synchronous bundled stores.
fn capture<T: 'static>(
    op: impl FnOnce(Box<dyn FnOnce(StoreResult<T>)>),
) -> Result<T, Box<dyn std::error::Error>> {
    let slot: Rc<RefCell<Option<StoreResult<T>>>> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&slot);
    op(Box::new(move |result| *sink.borrow_mut() = Some(result)));
    let result = slot.borrow_mut().take();
    match result {
        Some(result) => Ok(result?),
        None => Err("store did not complete the operation".into()),
    }
}
