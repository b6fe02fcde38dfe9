///
/// sqlext - Native Extensions for SQLite
///
/// Extends a SQLite connection with native code through the engine's C
/// callback API:
///
/// ## Functions
/// - `DatabaseFunction::new(name, arity, f)` - scalar function, fixed arity or
///   variadic
/// - `DatabaseFunction::aggregate(name, arity, factory)` - one `Aggregate`
///   per group
///
/// ## Collations
/// - `DatabaseCollation::new(name, compare)` - named string order
///
/// ## FTS5 Tokenizers
/// - `Database::register_tokenizer::<T: CustomTokenizer>()` - native
///   tokenizer usable in `tokenize='name args...'`
/// - `Database::make_tokenizer(descriptor)` - instance of any registered
///   tokenizer, built-in or custom
///
/// ## Values
/// - `DatabaseValue` - the five storage classes
/// - `DatabaseValueConvertible` - conversions between Rust types and values
/// - `Number` - any Rust number, with the engine's numeric boundaries
///
/// Every native object handed to SQLite lives in the connection's handle
/// table until SQLite calls its delete callback. Callback errors are
/// translated to result codes: a `DatabaseError` is reported with its own
/// code and message, anything else as SQLITE_ERROR.
///

pub mod aggregate;
pub mod builtins;
pub mod collation;
pub mod database;
pub mod error;
pub mod fts5;
pub mod function;
pub mod number;
mod registry;
pub mod value;

pub use aggregate::Aggregate;
pub use collation::DatabaseCollation;
pub use database::Database;
pub use error::{BoxError, DatabaseError, ExtensionError, ResultCode};
pub use fts5::{
    CustomTokenizer, Fts5Tokenizer, Token, TokenFlags, TokenSink, TokenizeFlags, TokenizeReason,
    Tokenizer, TokenizerDescriptor, TokenizerHost,
};
pub use function::{Arity, DatabaseFunction, MAX_FUNCTION_ARITY};
pub use number::Number;
pub use value::{DatabaseValue, DatabaseValueConvertible, StorageClass};
