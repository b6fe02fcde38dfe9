///
/// Result codes and error types.
///
/// SQLite reports failures as integer result codes. The low byte is the
/// primary code (SQLITE_ERROR, SQLITE_CONSTRAINT, ...) and the remaining bits
/// select an extended code layered on it (SQLITE_CONSTRAINT_CHECK, ...).
///
/// - `ResultCode` wraps a primary or extended code
/// - `DatabaseError` is a result code with the engine message and SQL text
/// - `ExtensionError` reports misuse of the registration entry points
/// - `translate_error` turns an error returned by a native callback into the
///   code and message reported back to SQLite
///

use std::error::Error as StdError;
use std::ffi::CStr;
use std::fmt;

use rusqlite::ffi;
use thiserror::Error;

/// Error type returned by native callbacks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(i32);

impl ResultCode {
    pub const OK: ResultCode = ResultCode(ffi::SQLITE_OK);
    pub const ERROR: ResultCode = ResultCode(ffi::SQLITE_ERROR);
    pub const INTERNAL: ResultCode = ResultCode(ffi::SQLITE_INTERNAL);
    pub const PERM: ResultCode = ResultCode(ffi::SQLITE_PERM);
    pub const ABORT: ResultCode = ResultCode(ffi::SQLITE_ABORT);
    pub const BUSY: ResultCode = ResultCode(ffi::SQLITE_BUSY);
    pub const LOCKED: ResultCode = ResultCode(ffi::SQLITE_LOCKED);
    pub const NOMEM: ResultCode = ResultCode(ffi::SQLITE_NOMEM);
    pub const READONLY: ResultCode = ResultCode(ffi::SQLITE_READONLY);
    pub const INTERRUPT: ResultCode = ResultCode(ffi::SQLITE_INTERRUPT);
    pub const IOERR: ResultCode = ResultCode(ffi::SQLITE_IOERR);
    pub const CORRUPT: ResultCode = ResultCode(ffi::SQLITE_CORRUPT);
    pub const NOTFOUND: ResultCode = ResultCode(ffi::SQLITE_NOTFOUND);
    pub const FULL: ResultCode = ResultCode(ffi::SQLITE_FULL);
    pub const CANTOPEN: ResultCode = ResultCode(ffi::SQLITE_CANTOPEN);
    pub const PROTOCOL: ResultCode = ResultCode(ffi::SQLITE_PROTOCOL);
    pub const EMPTY: ResultCode = ResultCode(ffi::SQLITE_EMPTY);
    pub const SCHEMA: ResultCode = ResultCode(ffi::SQLITE_SCHEMA);
    pub const TOOBIG: ResultCode = ResultCode(ffi::SQLITE_TOOBIG);
    pub const CONSTRAINT: ResultCode = ResultCode(ffi::SQLITE_CONSTRAINT);
    pub const MISMATCH: ResultCode = ResultCode(ffi::SQLITE_MISMATCH);
    pub const MISUSE: ResultCode = ResultCode(ffi::SQLITE_MISUSE);
    pub const NOLFS: ResultCode = ResultCode(ffi::SQLITE_NOLFS);
    pub const AUTH: ResultCode = ResultCode(ffi::SQLITE_AUTH);
    pub const FORMAT: ResultCode = ResultCode(ffi::SQLITE_FORMAT);
    pub const RANGE: ResultCode = ResultCode(ffi::SQLITE_RANGE);
    pub const NOTADB: ResultCode = ResultCode(ffi::SQLITE_NOTADB);
    pub const NOTICE: ResultCode = ResultCode(ffi::SQLITE_NOTICE);
    pub const WARNING: ResultCode = ResultCode(ffi::SQLITE_WARNING);
    pub const ROW: ResultCode = ResultCode(ffi::SQLITE_ROW);
    pub const DONE: ResultCode = ResultCode(ffi::SQLITE_DONE);

    pub const CONSTRAINT_CHECK: ResultCode = ResultCode(ffi::SQLITE_CONSTRAINT_CHECK);
    pub const CONSTRAINT_FOREIGNKEY: ResultCode = ResultCode(ffi::SQLITE_CONSTRAINT_FOREIGNKEY);
    pub const CONSTRAINT_FUNCTION: ResultCode = ResultCode(ffi::SQLITE_CONSTRAINT_FUNCTION);
    pub const CONSTRAINT_NOTNULL: ResultCode = ResultCode(ffi::SQLITE_CONSTRAINT_NOTNULL);
    pub const CONSTRAINT_PRIMARYKEY: ResultCode = ResultCode(ffi::SQLITE_CONSTRAINT_PRIMARYKEY);
    pub const CONSTRAINT_UNIQUE: ResultCode = ResultCode(ffi::SQLITE_CONSTRAINT_UNIQUE);
    pub const ERROR_MISSING_COLLSEQ: ResultCode = ResultCode(ffi::SQLITE_ERROR_MISSING_COLLSEQ);
    pub const IOERR_READ: ResultCode = ResultCode(ffi::SQLITE_IOERR_READ);
    pub const BUSY_TIMEOUT: ResultCode = ResultCode(ffi::SQLITE_BUSY_TIMEOUT);

    pub const fn new(raw: i32) -> Self {
        ResultCode(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// The primary code this code is layered on. Primary codes return themselves.
    pub const fn primary(self) -> ResultCode {
        ResultCode(self.0 & 0xFF)
    }

    pub const fn is_extended(self) -> bool {
        self.0 != self.0 & 0xFF
    }

    /// Pattern matching: a primary pattern matches itself and all of its
    /// extended codes, an extended pattern only matches exactly.
    pub fn matches(self, pattern: ResultCode) -> bool {
        if pattern.is_extended() {
            self == pattern
        } else {
            self.primary() == pattern
        }
    }

    /// The engine's English description of this code.
    pub fn description(self) -> String {
        unsafe {
            let text = ffi::sqlite3_errstr(self.0);
            if text.is_null() {
                return format!("unknown result code {}", self.0);
            }
            CStr::from_ptr(text).to_string_lossy().into_owned()
        }
    }
}

impl fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultCode({})", self.0)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.description())
    }
}

impl From<i32> for ResultCode {
    fn from(raw: i32) -> Self {
        ResultCode(raw)
    }
}

/// A result code produced by SQLite, or by a native callback that wants a
/// specific code reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", format_database_error(self))]
pub struct DatabaseError {
    pub result_code: ResultCode,
    pub message: Option<String>,
    pub sql: Option<String>,
}

impl DatabaseError {
    pub fn new(result_code: ResultCode) -> Self {
        Self {
            result_code,
            message: None,
            sql: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub(crate) fn from_rusqlite(error: rusqlite::Error, sql: Option<&str>) -> Self {
        let mut db_error = match error {
            rusqlite::Error::SqliteFailure(failure, message) => DatabaseError {
                result_code: ResultCode(failure.extended_code),
                message: message.or_else(|| Some(ResultCode(failure.extended_code).description())),
                sql: None,
            },
            rusqlite::Error::SqlInputError { error, msg, sql, .. } => DatabaseError {
                result_code: ResultCode(error.extended_code),
                message: Some(msg),
                sql: Some(sql),
            },
            other => DatabaseError::new(ResultCode::MISUSE).with_message(other.to_string()),
        };
        if db_error.sql.is_none() {
            db_error.sql = sql.map(str::to_string);
        }
        db_error
    }

    /// Reads the last error recorded on a raw connection handle.
    pub(crate) unsafe fn last_error(db: *mut ffi::sqlite3, code: i32) -> Self {
        let message = unsafe {
            let text = ffi::sqlite3_errmsg(db);
            if text.is_null() {
                None
            } else {
                Some(CStr::from_ptr(text).to_string_lossy().into_owned())
            }
        };
        DatabaseError {
            result_code: ResultCode(code),
            message,
            sql: None,
        }
    }
}

fn format_database_error(error: &DatabaseError) -> String {
    let mut text = format!("SQLite error {}", error.result_code.raw());
    if let Some(message) = &error.message {
        text.push_str(": ");
        text.push_str(message);
    }
    if let Some(sql) = &error.sql {
        text.push_str(" - while executing `");
        text.push_str(sql);
        text.push('`');
    }
    text
}

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Invalid extension name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid arity {arity} for function '{name}': expected 0..=127 or variadic")]
    InvalidArity { name: String, arity: i32 },

    #[error("SQLite rejected registration of '{name}': {source}")]
    Rejected {
        name: String,
        #[source]
        source: DatabaseError,
    },

    #[error("FTS5 is not available on this connection: {0}")]
    Fts5Unavailable(DatabaseError),

    #[error("No FTS5 tokenizer named '{0}'")]
    TokenizerNotFound(String),

    #[error("Tokenizer '{name}' could not be created: {source}")]
    TokenizerCreation {
        name: String,
        #[source]
        source: DatabaseError,
    },
}

/// Maps an error returned by a native callback to the code and message
/// reported to SQLite. A `DatabaseError` anywhere in the source chain is
/// reported verbatim; anything else becomes SQLITE_ERROR. The result is
/// never SQLITE_OK: an error carrying OK still reports a failure.
pub(crate) fn translate_error(error: &(dyn StdError + 'static)) -> (ResultCode, Option<String>) {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(db_error) = err.downcast_ref::<DatabaseError>() {
            let code = if db_error.result_code == ResultCode::OK {
                ResultCode::ERROR
            } else {
                db_error.result_code
            };
            return (code, db_error.message.clone());
        }
        current = err.source();
    }
    (ResultCode::ERROR, Some(error.to_string()))
}
