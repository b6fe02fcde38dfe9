///
/// # Integration Tests for collations
///
/// Covers name resolution, comparisons over length-bounded buffers,
/// replacement and unregistration, and the built-in Unicode collations.
///

use std::cmp::Ordering;

use sqlext::builtins::{unicode_compare, unicode_nocase};
use sqlext::{Database, DatabaseCollation, DatabaseValue, ResultCode};

fn ascii_nocase(name: &str) -> DatabaseCollation {
    DatabaseCollation::new(name, |a, b| {
        a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
    })
}

fn close(db: Database) {
    db.close().map_err(|(_, e)| e).expect("Failed to close database");
}

fn column(db: &Database, sql: &str) -> Vec<String> {
    db.fetch_rows(sql, &[])
        .expect("Query failed")
        .into_iter()
        .map(|row| row[0].get::<String>().expect("Expected text"))
        .collect()
}

#[test]
fn test_case_insensitive_comparator_and_name() {
    let db = Database::open_in_memory().unwrap();
    db.register_collation(&ascii_nocase("NAME")).unwrap();

    assert_eq!(
        db.fetch_value("SELECT 'a' = 'A' COLLATE name", &[]).unwrap(),
        Some(DatabaseValue::Integer(1))
    );
    assert_eq!(
        db.fetch_value("SELECT 'a' = 'A' COLLATE NaMe", &[]).unwrap(),
        Some(DatabaseValue::Integer(1))
    );
    assert_eq!(
        db.fetch_value("SELECT 'a' = 'A'", &[]).unwrap(),
        Some(DatabaseValue::Integer(0))
    );
    close(db);
}

#[test]
fn test_comparison_uses_exact_lengths() {
    let db = Database::open_in_memory().unwrap();
    db.register_collation(&DatabaseCollation::new("reverse", |a, b| b.cmp(a)))
        .unwrap();
    db.execute("CREATE TABLE words(w TEXT); INSERT INTO words VALUES ('ab'), ('abc'), ('b'), ('a');")
        .unwrap();

    assert_eq!(
        column(&db, "SELECT w FROM words ORDER BY w COLLATE reverse"),
        vec!["b", "abc", "ab", "a"]
    );
    close(db);
}

#[test]
fn test_collation_in_column_definition_and_index() {
    let db = Database::open_in_memory().unwrap();
    db.register_collation(&unicode_nocase()).unwrap();
    db.execute(
        "CREATE TABLE cities(name TEXT COLLATE unicode_nocase);
         CREATE UNIQUE INDEX cities_name ON cities(name);
         INSERT INTO cities VALUES ('Zürich');",
    )
    .unwrap();

    let err = db.execute("INSERT INTO cities VALUES ('ZÜRICH')").unwrap_err();
    assert_eq!(err.result_code, ResultCode::CONSTRAINT_UNIQUE);
    assert_eq!(
        db.fetch_one::<i64>("SELECT count(*) FROM cities WHERE name = 'zürich'", &[])
            .unwrap(),
        Some(1)
    );
    close(db);
}

#[test]
fn test_replace_and_unregister_release_handles() {
    let db = Database::open_in_memory().unwrap();
    let forward = DatabaseCollation::new("custom", |a, b| a.cmp(b));
    let backward = DatabaseCollation::new("CUSTOM", |a, b| b.cmp(a));

    db.register_collation(&forward).unwrap();
    db.register_collation(&backward).unwrap();
    assert_eq!(db.live_extension_handles(), 1);
    assert_eq!(
        column(&db, "SELECT column1 FROM (VALUES ('a'), ('c'), ('b')) ORDER BY column1 COLLATE custom"),
        vec!["c", "b", "a"]
    );

    db.unregister_collation(&forward).unwrap();
    assert_eq!(db.live_extension_handles(), 0);
    let err = db
        .fetch_value("SELECT 'a' < 'b' COLLATE custom", &[])
        .unwrap_err();
    assert!(err.message.unwrap().contains("no such collation sequence"));
    close(db);
}

#[test]
fn test_builtin_collations() {
    let db = Database::open_in_memory().unwrap();
    db.register_collation(&unicode_compare()).unwrap();
    db.register_collation(&unicode_nocase()).unwrap();
    db.execute("CREATE TABLE t(s TEXT); INSERT INTO t VALUES ('éclair'), ('Zèbre'), ('apple'), ('Écran');")
        .unwrap();

    assert_eq!(
        column(&db, "SELECT s FROM t ORDER BY s COLLATE unicode"),
        vec!["Zèbre", "apple", "Écran", "éclair"]
    );
    assert_eq!(
        column(&db, "SELECT s FROM t ORDER BY s COLLATE unicode_nocase"),
        vec!["apple", "Zèbre", "éclair", "Écran"]
    );
    close(db);
}

#[test]
fn test_collation_value_compare() {
    let collation = unicode_nocase();
    assert_eq!(collation.compare("Ä", "ä"), Ordering::Equal);
    assert_eq!(collation.name(), "unicode_nocase");
    assert_eq!(ascii_nocase("x"), ascii_nocase("X"));
}
