///
/// Dynamic SQL Values
///
/// `DatabaseValue` holds one of SQLite's five storage classes. Values cross the
/// C boundary in two directions:
/// - `from_raw` copies an engine-owned `sqlite3_value` (text and blob are read
///   from a pointer and an explicit byte length, never a terminator)
/// - `set_result` reports a value as the result of a function call
///
/// `DatabaseValueConvertible` maps native types to and from `DatabaseValue`.
/// Conversion from a value fails with `None` when the storage class does not
/// fit the requested type. Integers and reals coerce into each other, and
/// booleans decode from integers.
///

use std::ffi::{c_char, c_void};

use rusqlite::ffi;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};

#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Storage class of a `DatabaseValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl DatabaseValue {
    pub fn storage_class(&self) -> StorageClass {
        match self {
            DatabaseValue::Null => StorageClass::Null,
            DatabaseValue::Integer(_) => StorageClass::Integer,
            DatabaseValue::Real(_) => StorageClass::Real,
            DatabaseValue::Text(_) => StorageClass::Text,
            DatabaseValue::Blob(_) => StorageClass::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Converts this value to a native type.
    pub fn get<T: DatabaseValueConvertible>(&self) -> Option<T> {
        T::from_database_value(self)
    }

    /// Copies an engine-provided value.
    ///
    /// # Safety
    ///
    /// `value` must be a valid `sqlite3_value` for the duration of the call.
    pub(crate) unsafe fn from_raw(value: *mut ffi::sqlite3_value) -> DatabaseValue {
        unsafe {
            match ffi::sqlite3_value_type(value) {
                ffi::SQLITE_INTEGER => DatabaseValue::Integer(ffi::sqlite3_value_int64(value)),
                ffi::SQLITE_FLOAT => DatabaseValue::Real(ffi::sqlite3_value_double(value)),
                ffi::SQLITE_TEXT => {
                    // text before bytes: the length must describe the UTF-8 form
                    let text = ffi::sqlite3_value_text(value);
                    let len = ffi::sqlite3_value_bytes(value);
                    let bytes = raw_bytes(text as *const u8, len);
                    DatabaseValue::Text(String::from_utf8_lossy(bytes).into_owned())
                }
                ffi::SQLITE_BLOB => {
                    let blob = ffi::sqlite3_value_blob(value);
                    let len = ffi::sqlite3_value_bytes(value);
                    DatabaseValue::Blob(raw_bytes(blob as *const u8, len).to_vec())
                }
                _ => DatabaseValue::Null,
            }
        }
    }

    /// Decodes the `argc` arguments of a function call.
    ///
    /// # Safety
    ///
    /// `argv` must point to `argc` valid `sqlite3_value` pointers.
    pub(crate) unsafe fn from_raw_args(
        argc: i32,
        argv: *mut *mut ffi::sqlite3_value,
    ) -> Vec<DatabaseValue> {
        if argv.is_null() || argc <= 0 {
            return Vec::new();
        }
        let raw = unsafe { std::slice::from_raw_parts(argv, argc as usize) };
        raw.iter()
            .map(|value| unsafe { DatabaseValue::from_raw(*value) })
            .collect()
    }

    /// Reports this value as the result of the current function call.
    ///
    /// # Safety
    ///
    /// `context` must be the live context of a function invocation.
    pub(crate) unsafe fn set_result(&self, context: *mut ffi::sqlite3_context) {
        unsafe {
            match self {
                DatabaseValue::Null => ffi::sqlite3_result_null(context),
                DatabaseValue::Integer(i) => ffi::sqlite3_result_int64(context, *i),
                DatabaseValue::Real(f) => ffi::sqlite3_result_double(context, *f),
                DatabaseValue::Text(s) => ffi::sqlite3_result_text64(
                    context,
                    s.as_ptr() as *const c_char,
                    s.len() as u64,
                    ffi::SQLITE_TRANSIENT(),
                    ffi::SQLITE_UTF8 as u8,
                ),
                DatabaseValue::Blob(b) => ffi::sqlite3_result_blob64(
                    context,
                    b.as_ptr() as *const c_void,
                    b.len() as u64,
                    ffi::SQLITE_TRANSIENT(),
                ),
            }
        }
    }
}

/// Borrows `len` bytes at `ptr`. A null pointer or a non-positive length is
/// an empty slice.
///
/// # Safety
///
/// When non-null, `ptr` must be valid for `len` bytes for the returned lifetime.
pub(crate) unsafe fn raw_bytes<'a>(ptr: *const u8, len: i32) -> &'a [u8] {
    if ptr.is_null() || len <= 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(ptr, len as usize) }
    }
}

/// Bidirectional mapping between a native type and `DatabaseValue`.
pub trait DatabaseValueConvertible {
    fn database_value(&self) -> DatabaseValue;

    fn from_database_value(value: &DatabaseValue) -> Option<Self>
    where
        Self: Sized;
}

impl DatabaseValueConvertible for DatabaseValue {
    fn database_value(&self) -> DatabaseValue {
        self.clone()
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: DatabaseValueConvertible> DatabaseValueConvertible for Option<T> {
    fn database_value(&self) -> DatabaseValue {
        match self {
            Some(value) => value.database_value(),
            None => DatabaseValue::Null,
        }
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Null => Some(None),
            other => T::from_database_value(other).map(Some),
        }
    }
}

impl DatabaseValueConvertible for i64 {
    fn database_value(&self) -> DatabaseValue {
        DatabaseValue::Integer(*self)
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Integer(i) => Some(*i),
            DatabaseValue::Real(f) => real_to_i64(*f),
            _ => None,
        }
    }
}

/// Truncates toward zero like `sqlite3_value_int64`, but refuses values that
/// do not fit instead of saturating.
fn real_to_i64(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; i64::MAX is not
    if f.is_nan() || f < -9_223_372_036_854_775_808.0 || f >= 9_223_372_036_854_775_808.0 {
        None
    } else {
        Some(f.trunc() as i64)
    }
}

macro_rules! impl_narrow_integer {
    ($($ty:ty),*) => {
        $(
            impl DatabaseValueConvertible for $ty {
                fn database_value(&self) -> DatabaseValue {
                    DatabaseValue::Integer(i64::from(*self))
                }

                fn from_database_value(value: &DatabaseValue) -> Option<Self> {
                    i64::from_database_value(value).and_then(|i| <$ty>::try_from(i).ok())
                }
            }
        )*
    };
}

impl_narrow_integer!(i8, i16, i32, u8, u16, u32);

impl DatabaseValueConvertible for isize {
    fn database_value(&self) -> DatabaseValue {
        DatabaseValue::Integer(*self as i64)
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        i64::from_database_value(value).and_then(|i| isize::try_from(i).ok())
    }
}

impl DatabaseValueConvertible for u64 {
    /// SQLite has no unsigned 64-bit storage class: values above `i64::MAX`
    /// are a caller bug.
    fn database_value(&self) -> DatabaseValue {
        assert!(
            *self <= i64::MAX as u64,
            "{} exceeds i64::MAX and cannot be stored in SQLite",
            self
        );
        DatabaseValue::Integer(*self as i64)
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        i64::from_database_value(value).and_then(|i| u64::try_from(i).ok())
    }
}

impl DatabaseValueConvertible for usize {
    fn database_value(&self) -> DatabaseValue {
        (*self as u64).database_value()
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        i64::from_database_value(value).and_then(|i| usize::try_from(i).ok())
    }
}

impl DatabaseValueConvertible for f64 {
    fn database_value(&self) -> DatabaseValue {
        DatabaseValue::Real(*self)
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Integer(i) => Some(*i as f64),
            DatabaseValue::Real(f) => Some(*f),
            _ => None,
        }
    }
}

impl DatabaseValueConvertible for f32 {
    fn database_value(&self) -> DatabaseValue {
        DatabaseValue::Real(f64::from(*self))
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        f64::from_database_value(value).map(|f| f as f32)
    }
}

impl DatabaseValueConvertible for bool {
    fn database_value(&self) -> DatabaseValue {
        DatabaseValue::Integer(if *self { 1 } else { 0 })
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Integer(i) => Some(*i != 0),
            DatabaseValue::Real(f) => Some(*f != 0.0),
            _ => None,
        }
    }
}

impl DatabaseValueConvertible for String {
    fn database_value(&self) -> DatabaseValue {
        DatabaseValue::Text(self.clone())
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl DatabaseValueConvertible for Vec<u8> {
    fn database_value(&self) -> DatabaseValue {
        DatabaseValue::Blob(self.clone())
    }

    fn from_database_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Blob(b) => Some(b.clone()),
            DatabaseValue::Text(s) => Some(s.as_bytes().to_vec()),
            _ => None,
        }
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Integer(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Real(value)
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        value.database_value()
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::Text(value.to_string())
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::Text(value)
    }
}

impl From<&[u8]> for DatabaseValue {
    fn from(value: &[u8]) -> Self {
        DatabaseValue::Blob(value.to_vec())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Blob(value)
    }
}

impl ToSql for DatabaseValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            DatabaseValue::Null => ToSqlOutput::Owned(Value::Null),
            DatabaseValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            DatabaseValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            DatabaseValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            DatabaseValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl FromSql for DatabaseValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => DatabaseValue::Null,
            ValueRef::Integer(i) => DatabaseValue::Integer(i),
            ValueRef::Real(f) => DatabaseValue::Real(f),
            ValueRef::Text(t) => DatabaseValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => DatabaseValue::Blob(b.to_vec()),
        })
    }
}
