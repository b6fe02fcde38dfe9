///
/// Database Connection
///
/// `Database` owns a SQLite connection and the extension handle table of
/// that connection. Every registration goes through it, so every native
/// object SQLite can call back into is tracked in exactly one table, and the
/// table outlives the connection.
///
/// Queries are thin wrappers over rusqlite that exchange `DatabaseValue`s and
/// report `DatabaseError`s carrying the extended result code, the engine
/// message, and the SQL text.
///

use std::cell::OnceCell;
use std::path::Path;

use rusqlite::{ffi, params_from_iter, Connection};

use crate::collation::DatabaseCollation;
use crate::error::{BoxError, DatabaseError, ExtensionError};
use crate::fts5::{
    find_tokenizer, register_tokenizer, CustomTokenizer, Fts5ApiPtr, Fts5Tokenizer, Tokenizer, TokenizerDescriptor,
    TokenizerFactory, TokenizerHost,
};
use crate::function::DatabaseFunction;
use crate::registry::ExtensionRegistry;
use crate::value::{DatabaseValue, DatabaseValueConvertible};

pub struct Database {
    conn: Connection,
    extensions: ExtensionRegistry,
    fts5: OnceCell<Fts5ApiPtr>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| DatabaseError::from_rusqlite(e, None))?;
        tracing::debug!("opened database {}", path.display());
        Ok(Self::with_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::from_rusqlite(e, None))?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn,
            extensions: ExtensionRegistry::new(),
            fts5: OnceCell::new(),
        }
    }

    /// The underlying rusqlite connection, for everything this type does not
    /// wrap.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn raw(&self) -> *mut ffi::sqlite3 {
        unsafe { self.conn.handle() }
    }

    /// Runs one or more statements separated by semicolons.
    pub fn execute(&self, sql: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| DatabaseError::from_rusqlite(e, Some(sql)))
    }

    /// Runs one statement with positional parameters and returns the number
    /// of changed rows.
    pub fn execute_with(&self, sql: &str, params: &[DatabaseValue]) -> Result<usize, DatabaseError> {
        self.conn
            .execute(sql, params_from_iter(params.iter()))
            .map_err(|e| DatabaseError::from_rusqlite(e, Some(sql)))
    }

    pub fn fetch_rows(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> Result<Vec<Vec<DatabaseValue>>, DatabaseError> {
        let map_err = |e| DatabaseError::from_rusqlite(e, Some(sql));
        let mut stmt = self.conn.prepare(sql).map_err(map_err)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter())).map_err(map_err)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(map_err)? {
            let mut values = Vec::with_capacity(columns);
            for index in 0..columns {
                values.push(row.get::<_, DatabaseValue>(index).map_err(map_err)?);
            }
            result.push(values);
        }
        Ok(result)
    }

    /// First column of the first row, or `None` when there is no row.
    pub fn fetch_value(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> Result<Option<DatabaseValue>, DatabaseError> {
        let map_err = |e| DatabaseError::from_rusqlite(e, Some(sql));
        let mut stmt = self.conn.prepare(sql).map_err(map_err)?;
        let mut rows = stmt.query(params_from_iter(params.iter())).map_err(map_err)?;
        match rows.next().map_err(map_err)? {
            Some(row) => Ok(Some(row.get::<_, DatabaseValue>(0).map_err(map_err)?)),
            None => Ok(None),
        }
    }

    /// Like `fetch_value`, converted to `T`. `None` covers both "no row" and
    /// "not convertible".
    pub fn fetch_one<T: DatabaseValueConvertible>(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> Result<Option<T>, DatabaseError> {
        Ok(self
            .fetch_value(sql, params)?
            .and_then(|value| T::from_database_value(&value)))
    }

    /// Registers a function. A previous registration with the same name and
    /// arity is replaced and its handle released.
    pub fn register_function(&self, function: &DatabaseFunction) -> Result<(), ExtensionError> {
        function.register(self.raw(), &self.extensions)
    }

    pub fn unregister_function(&self, function: &DatabaseFunction) -> Result<(), ExtensionError> {
        function.unregister(self.raw())
    }

    pub fn register_collation(&self, collation: &DatabaseCollation) -> Result<(), ExtensionError> {
        collation.register(self.raw(), &self.extensions)
    }

    pub fn unregister_collation(&self, collation: &DatabaseCollation) -> Result<(), ExtensionError> {
        collation.unregister(self.raw())
    }

    fn fts5_api(&self) -> Result<Fts5ApiPtr, ExtensionError> {
        if let Some(api) = self.fts5.get() {
            return Ok(*api);
        }
        let api = unsafe { Fts5ApiPtr::lookup(self.raw()) }?;
        let _ = self.fts5.set(api);
        Ok(api)
    }

    /// Registers `T` under `T::NAME`, usable as `tokenize='name args...'`.
    pub fn register_tokenizer<T: CustomTokenizer>(&self) -> Result<(), ExtensionError> {
        self.register_tokenizer_factory(T::NAME, |host, arguments| T::new(host, arguments))
    }

    /// Registers a tokenizer built by a factory closure. The factory runs
    /// once per FTS5 table using the tokenizer.
    pub fn register_tokenizer_factory<F, T>(&self, name: &str, factory: F) -> Result<(), ExtensionError>
    where
        F: Fn(&TokenizerHost, &[String]) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Tokenizer + 'static,
    {
        let api = self.fts5_api()?;
        let factory: Box<TokenizerFactory> = Box::new(move |host: &TokenizerHost, arguments: &[String]| {
            factory(host, arguments).map(|tokenizer| Box::new(tokenizer) as Box<dyn Tokenizer>)
        });
        register_tokenizer(api, &self.extensions, name, factory)
    }

    /// Creates an instance of any tokenizer FTS5 knows on this connection.
    pub fn make_tokenizer(
        &self,
        descriptor: &TokenizerDescriptor,
    ) -> Result<Fts5Tokenizer<'_>, ExtensionError> {
        let api = self.fts5_api()?;
        unsafe { find_tokenizer(api, descriptor) }
    }

    /// Number of native objects SQLite currently holds on this connection.
    pub fn live_extension_handles(&self) -> usize {
        self.extensions.len()
    }

    /// Closes the connection. SQLite calls the delete callback of every
    /// registered extension while closing, so the handle table must be empty
    /// afterwards. On failure the database is handed back, still open.
    pub fn close(self) -> Result<(), (Database, DatabaseError)> {
        let Database {
            conn,
            extensions,
            fts5,
        } = self;
        if let Err((conn, err)) = conn.close() {
            let error = DatabaseError::from_rusqlite(err, None);
            return Err((
                Database {
                    conn,
                    extensions,
                    fts5,
                },
                error,
            ));
        }
        let live = extensions.len();
        assert!(live == 0, "{} extension handles still live after close", live);
        tracing::debug!("closed database");
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .field("live_extension_handles", &self.extensions.len())
            .finish()
    }
}
