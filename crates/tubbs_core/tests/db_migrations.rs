use rusqlite::Connection;
use tubbs_core::db::migrations::{current_user_version, latest_version};
use tubbs_core::db::{open_db, open_db_in_memory, DbError};
use tubbs_core::{SqliteStore, StoreError};

#[test]
fn open_db_in_memory_creates_the_records_table() {
    let conn = open_db_in_memory().expect("in-memory db should open");

    assert_eq!(
        current_user_version(&conn).expect("user_version should be readable"),
        latest_version()
    );
    assert_eq!(
        columns(&conn, "records"),
        vec!["seq", "collection", "record_key", "body", "updated_at"]
    );
}

#[test]
fn reopening_a_migrated_file_keeps_rows() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("tubbs.db");

    let conn = open_db(&path).expect("db file should open and migrate");
    conn.execute(
        "INSERT INTO records (collection, record_key, body) VALUES ('Users', 'u1', '{}');",
        [],
    )
    .expect("insert should succeed");
    drop(conn);

    let conn = open_db(&path).expect("db file should open and migrate");
    assert_eq!(
        current_user_version(&conn).expect("user_version should be readable"),
        latest_version()
    );
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM records;", [], |row| row.get(0))
        .expect("count query should succeed");
    assert_eq!(rows, 1);
}

#[test]
fn records_are_unique_per_collection_and_key() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let insert = "INSERT INTO records (collection, record_key, body) VALUES (?1, ?2, '{}');";

    conn.execute(insert, ["Users", "1"]).expect("insert should succeed");
    conn.execute(insert, ["Posts", "1"]).expect("insert should succeed");
    assert!(conn.execute(insert, ["Users", "1"]).is_err());
}

#[test]
fn newer_schema_versions_are_rejected() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).expect("raw connection should open");
    conn.execute_batch("PRAGMA user_version = 999;").expect("sql batch should run");
    drop(conn);

    match open_db(&path).expect_err("open must fail") {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failed_migration_reports_its_version_and_rolls_back() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("conflict.db");

    let conn = Connection::open(&path).expect("raw connection should open");
    conn.execute_batch("CREATE VIEW records AS SELECT 1 AS seq;").expect("sql batch should run");
    drop(conn);

    match open_db(&path).expect_err("open must fail") {
        DbError::Migration { version, .. } => assert_eq!(version, 1),
        other => panic!("unexpected error: {other}"),
    }
    let conn = Connection::open(&path).expect("raw connection should open");
    assert_eq!(current_user_version(&conn).expect("user_version should be readable"), 0);
}

#[test]
fn stores_refuse_connections_that_skipped_migrations() {
    let conn = Connection::open_in_memory().expect("raw connection should open");

    match SqliteStore::try_new(conn).expect_err("unmigrated connection must be rejected") {
        StoreError::Db(DbError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(expected_version, latest_version());
            assert_eq!(actual_version, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn columns(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table});"))
        .expect("pragma should prepare");
    stmt.query_map([], |row| row.get::<_, String>(1))
        .expect("pragma should run")
        .collect::<Result<_, _>>()
        .expect("column names should decode")
}
