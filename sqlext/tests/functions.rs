///
/// # Integration Tests for SQL functions
///
/// Registers scalar and aggregate functions on in-memory connections and
/// checks invocation, result conversion, error translation, and that every
/// handle is released when a function is replaced, unregistered, or the
/// connection closes.
///

use thiserror::Error;

use sqlext::{
    Aggregate, Arity, BoxError, Database, DatabaseError, DatabaseFunction, DatabaseValue,
    ExtensionError, ResultCode,
};

fn upper() -> DatabaseFunction {
    DatabaseFunction::new("f", Arity::Fixed(1), |args| {
        Ok::<_, BoxError>(args[0].get::<String>().map(|s| s.to_uppercase()))
    })
}

fn close(db: Database) {
    db.close().map_err(|(_, e)| e).expect("Failed to close database");
}

#[test]
fn test_upper_scenario() {
    let db = Database::open_in_memory().expect("Failed to open database");
    db.register_function(&upper()).expect("Failed to register f");

    assert_eq!(
        db.fetch_one::<String>("SELECT f('Roué')", &[]).unwrap(),
        Some("ROUÉ".to_string())
    );

    let err = db.fetch_value("SELECT f()", &[]).unwrap_err();
    assert_eq!(err.result_code.primary(), ResultCode::ERROR);
    assert_eq!(
        err.message.as_deref(),
        Some("wrong number of arguments to function f()")
    );
    close(db);
}

#[test]
fn test_nil_result_is_null() {
    let db = Database::open_in_memory().unwrap();
    let f = DatabaseFunction::new("f", Arity::Fixed(0), |_| Ok::<Option<i64>, BoxError>(None));
    db.register_function(&f).unwrap();

    assert_eq!(db.fetch_value("SELECT f()", &[]).unwrap(), Some(DatabaseValue::Null));
    assert_eq!(
        db.fetch_value("SELECT f() IS NULL", &[]).unwrap(),
        Some(DatabaseValue::Integer(1))
    );
    close(db);
}

#[test]
fn test_result_storage_classes() {
    let db = Database::open_in_memory().unwrap();
    db.register_function(&DatabaseFunction::new("i", Arity::Fixed(0), |_| {
        Ok::<_, BoxError>(42i64)
    }))
    .unwrap();
    db.register_function(&DatabaseFunction::new("r", Arity::Fixed(0), |_| {
        Ok::<_, BoxError>(0.5f64)
    }))
    .unwrap();
    db.register_function(&DatabaseFunction::new("t", Arity::Fixed(0), |_| {
        Ok::<_, BoxError>("text".to_string())
    }))
    .unwrap();
    db.register_function(&DatabaseFunction::new("b", Arity::Fixed(0), |_| {
        Ok::<_, BoxError>(vec![1u8, 2, 3])
    }))
    .unwrap();

    let row = db
        .fetch_rows("SELECT typeof(i()), typeof(r()), typeof(t()), typeof(b())", &[])
        .unwrap();
    assert_eq!(
        row[0],
        vec![
            DatabaseValue::Text("integer".into()),
            DatabaseValue::Text("real".into()),
            DatabaseValue::Text("text".into()),
            DatabaseValue::Text("blob".into()),
        ]
    );
    assert_eq!(
        db.fetch_value("SELECT b()", &[]).unwrap(),
        Some(DatabaseValue::Blob(vec![1, 2, 3]))
    );
    close(db);
}

#[derive(Debug, Error)]
#[error("lookup failed")]
struct LookupFailed {
    #[source]
    cause: DatabaseError,
}

#[test]
fn test_database_error_is_reported_verbatim() {
    let db = Database::open_in_memory().unwrap();
    db.register_function(&DatabaseFunction::new("fail_check", Arity::Fixed(0), |_| {
        Err::<i64, BoxError>(Box::new(
            DatabaseError::new(ResultCode::CONSTRAINT_CHECK).with_message("custom check failed"),
        ))
    }))
    .unwrap();
    db.register_function(&DatabaseFunction::new("wrapped", Arity::Fixed(0), |_| {
        Err::<i64, BoxError>(Box::new(LookupFailed {
            cause: DatabaseError::new(ResultCode::BUSY).with_message("try later"),
        }))
    }))
    .unwrap();

    let err = db.fetch_value("SELECT fail_check()", &[]).unwrap_err();
    assert_eq!(err.result_code, ResultCode::CONSTRAINT_CHECK);
    assert_eq!(err.message.as_deref(), Some("custom check failed"));
    assert_eq!(err.sql.as_deref(), Some("SELECT fail_check()"));

    let err = db.fetch_value("SELECT wrapped()", &[]).unwrap_err();
    assert_eq!(err.result_code, ResultCode::BUSY);
    assert_eq!(err.message.as_deref(), Some("try later"));
    close(db);
}

#[test]
fn test_other_errors_are_generic() {
    let db = Database::open_in_memory().unwrap();
    db.register_function(&DatabaseFunction::new("boom", Arity::Fixed(0), |_| {
        Err::<i64, BoxError>("boom".into())
    }))
    .unwrap();

    let err = db.fetch_value("SELECT boom()", &[]).unwrap_err();
    assert_eq!(err.result_code, ResultCode::ERROR);
    assert_eq!(err.message.as_deref(), Some("boom"));
    close(db);
}

#[test]
fn test_variadic_function() {
    let db = Database::open_in_memory().unwrap();
    let count = DatabaseFunction::new("argc", Arity::Variadic, |args| {
        Ok::<_, BoxError>(args.len() as i64)
    });
    db.register_function(&count).unwrap();

    assert_eq!(db.fetch_one::<i64>("SELECT argc()", &[]).unwrap(), Some(0));
    assert_eq!(db.fetch_one::<i64>("SELECT argc(1, 'a', NULL)", &[]).unwrap(), Some(3));
    assert_eq!(
        db.fetch_one::<i64>("SELECT argc(?1, ?2)", &[1i64.into(), "x".into()])
            .unwrap(),
        Some(2)
    );
    close(db);
}

#[test]
fn test_arities_are_separate_registrations() {
    let db = Database::open_in_memory().unwrap();
    db.register_function(&DatabaseFunction::new("g", Arity::Fixed(0), |_| {
        Ok::<_, BoxError>("zero".to_string())
    }))
    .unwrap();
    db.register_function(&DatabaseFunction::new("g", Arity::Fixed(1), |_| {
        Ok::<_, BoxError>("one".to_string())
    }))
    .unwrap();
    assert_eq!(db.live_extension_handles(), 2);

    assert_eq!(db.fetch_one::<String>("SELECT g()", &[]).unwrap(), Some("zero".into()));
    assert_eq!(db.fetch_one::<String>("SELECT G(1)", &[]).unwrap(), Some("one".into()));
    close(db);
}

#[test]
fn test_replace_and_unregister_release_handles() {
    let db = Database::open_in_memory().unwrap();
    let first = DatabaseFunction::new("h", Arity::Fixed(0), |_| Ok::<_, BoxError>(1i64));
    let second = DatabaseFunction::new("h", Arity::Fixed(0), |_| Ok::<_, BoxError>(2i64));

    db.register_function(&first).unwrap();
    assert_eq!(db.live_extension_handles(), 1);
    db.register_function(&second).unwrap();
    assert_eq!(db.live_extension_handles(), 1);
    assert_eq!(db.fetch_one::<i64>("SELECT h()", &[]).unwrap(), Some(2));

    db.unregister_function(&second).unwrap();
    assert_eq!(db.live_extension_handles(), 0);
    let err = db.fetch_value("SELECT h()", &[]).unwrap_err();
    assert!(err.message.unwrap().contains("no such function"));
    close(db);
}

#[test]
fn test_function_value_is_reusable_across_connections() {
    let f = upper();
    let a = Database::open_in_memory().unwrap();
    let b = Database::open_in_memory().unwrap();
    a.register_function(&f).unwrap();
    b.register_function(&f).unwrap();

    assert_eq!(a.fetch_one::<String>("SELECT f('a')", &[]).unwrap(), Some("A".into()));
    close(a);
    assert_eq!(b.fetch_one::<String>("SELECT f('b')", &[]).unwrap(), Some("B".into()));
    close(b);
}

#[test]
fn test_registration_errors() {
    let db = Database::open_in_memory().unwrap();

    let err = db
        .register_function(&DatabaseFunction::new("", Arity::Fixed(0), |_| Ok::<_, BoxError>(1i64)))
        .unwrap_err();
    assert!(matches!(err, ExtensionError::InvalidName { .. }));

    let err = db
        .register_function(&DatabaseFunction::new("f", Arity::Fixed(200), |_| {
            Ok::<_, BoxError>(1i64)
        }))
        .unwrap_err();
    assert!(matches!(err, ExtensionError::InvalidArity { arity: 200, .. }));

    // SQLite refuses function names longer than 255 bytes
    let long_name = "x".repeat(300);
    let err = db
        .register_function(&DatabaseFunction::new(long_name, Arity::Fixed(0), |_| {
            Ok::<_, BoxError>(1i64)
        }))
        .unwrap_err();
    match err {
        ExtensionError::Rejected { source, .. } => {
            assert_eq!(source.result_code, ResultCode::MISUSE)
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(db.live_extension_handles(), 0);
    close(db);
}

#[test]
fn test_deterministic_functions_in_index() {
    let db = Database::open_in_memory().unwrap();
    let plain = DatabaseFunction::new("norm", Arity::Fixed(1), |args| {
        Ok::<_, BoxError>(args[0].get::<String>().map(|s| s.to_lowercase()))
    });
    db.register_function(&plain).unwrap();
    db.execute("CREATE TABLE people(name TEXT)").unwrap();

    let err = db.execute("CREATE INDEX people_norm ON people(norm(name))").unwrap_err();
    assert!(err.message.unwrap().contains("non-deterministic"));

    db.register_function(&plain.clone().deterministic()).unwrap();
    db.execute("CREATE INDEX people_norm ON people(norm(name))").unwrap();
    db.execute_with("INSERT INTO people VALUES (?1)", &["Zoë".into()])
        .unwrap();
    assert_eq!(
        db.fetch_one::<String>("SELECT name FROM people WHERE norm(name) = 'zoë'", &[])
            .unwrap(),
        Some("Zoë".into())
    );
    close(db);
}

#[derive(Default)]
struct Total {
    sum: i64,
}

impl Aggregate for Total {
    fn step(&mut self, args: &[DatabaseValue]) -> Result<(), BoxError> {
        match args[0].get::<i64>() {
            Some(value) if value < 0 => Err(Box::new(
                DatabaseError::new(ResultCode::RANGE).with_message("negative amount"),
            )),
            Some(value) => {
                self.sum += value;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn finalize(&mut self) -> Result<DatabaseValue, BoxError> {
        Ok(DatabaseValue::Integer(self.sum))
    }
}

#[test]
fn test_aggregate_function() {
    let db = Database::open_in_memory().unwrap();
    db.register_function(&DatabaseFunction::aggregate("total_of", Arity::Fixed(1), Total::default))
        .unwrap();
    db.execute(
        "CREATE TABLE ledger(account TEXT, amount INTEGER);
         INSERT INTO ledger VALUES ('a', 10), ('b', 1), ('a', 5), ('b', NULL), ('c', 7);",
    )
    .unwrap();

    let rows = db
        .fetch_rows(
            "SELECT account, total_of(amount) FROM ledger GROUP BY account ORDER BY account",
            &[],
        )
        .unwrap();
    assert_eq!(
        rows,
        vec![
            vec![DatabaseValue::Text("a".into()), DatabaseValue::Integer(15)],
            vec![DatabaseValue::Text("b".into()), DatabaseValue::Integer(1)],
            vec![DatabaseValue::Text("c".into()), DatabaseValue::Integer(7)],
        ]
    );
    // per-group accumulators are gone once the query is done
    assert_eq!(db.live_extension_handles(), 1);

    assert_eq!(
        db.fetch_value("SELECT total_of(amount) FROM ledger WHERE 0", &[])
            .unwrap(),
        Some(DatabaseValue::Integer(0))
    );
    close(db);
}

#[test]
fn test_aggregate_error_releases_accumulator() {
    let db = Database::open_in_memory().unwrap();
    db.register_function(&DatabaseFunction::aggregate("total_of", Arity::Fixed(1), Total::default))
        .unwrap();
    db.execute("CREATE TABLE ledger(amount); INSERT INTO ledger VALUES (3), (-1), (4);")
        .unwrap();

    let err = db.fetch_value("SELECT total_of(amount) FROM ledger", &[]).unwrap_err();
    assert_eq!(err.result_code, ResultCode::RANGE);
    assert_eq!(err.message.as_deref(), Some("negative amount"));
    assert_eq!(db.live_extension_handles(), 1);
    close(db);
}

#[test]
fn test_builtin_text_functions() {
    let db = Database::open_in_memory().unwrap();
    for function in [
        sqlext::builtins::unicode_upper(),
        sqlext::builtins::unicode_lower(),
        sqlext::builtins::unicode_capitalize(),
    ] {
        db.register_function(&function).unwrap();
    }

    let row = db
        .fetch_rows(
            "SELECT unicode_upper('straße'), unicode_lower('ÀÉÎ'), unicode_capitalize('élan VITAL'), unicode_upper(NULL), unicode_upper(12)",
            &[],
        )
        .unwrap()
        .remove(0);
    assert_eq!(
        row,
        vec![
            DatabaseValue::Text("STRASSE".into()),
            DatabaseValue::Text("àéî".into()),
            DatabaseValue::Text("Élan Vital".into()),
            DatabaseValue::Null,
            DatabaseValue::Integer(12),
        ]
    );
    close(db);
}
