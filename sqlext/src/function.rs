///
/// SQL Functions
///
/// `DatabaseFunction` is a reusable function definition: a name, a declared
/// arity, and either a scalar callback or an aggregate factory. Registering it
/// on a connection retains its callback in the connection's handle table and
/// hands SQLite a pointer to that handle. SQLite releases it through the
/// shared delete callback when the function is replaced, unregistered, or the
/// connection closes.
///
/// Each call decodes the arguments into `DatabaseValue`s, runs the callback,
/// and reports either the converted result or a translated error:
/// - `DatabaseError` -> its result code and message, verbatim
/// - any other error -> SQLITE_ERROR with the error's text
///
/// Argument count checks for fixed arities are done by SQLite itself before
/// the callback runs.
///

use std::error::Error as StdError;
use std::ffi::{c_char, c_int, CString};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rusqlite::ffi;

use crate::aggregate::{self, Aggregate, AggregateFactory};
use crate::error::{translate_error, BoxError, DatabaseError, ExtensionError};
use crate::registry::{release_handle, Extension, ExtensionRegistry};
use crate::value::{DatabaseValue, DatabaseValueConvertible};

pub(crate) type ScalarCallback =
    dyn Fn(&[DatabaseValue]) -> Result<DatabaseValue, BoxError> + Send + Sync;

/// Highest fixed arity SQLite accepts (SQLITE_MAX_FUNCTION_ARG).
pub const MAX_FUNCTION_ARITY: u32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Fixed(u32),
    Variadic,
}

impl Arity {
    fn raw(self) -> c_int {
        match self {
            Arity::Fixed(n) => n as c_int,
            Arity::Variadic => -1,
        }
    }
}

#[derive(Clone)]
enum FunctionKind {
    Scalar(Arc<ScalarCallback>),
    Aggregate(Arc<AggregateFactory>),
}

#[derive(Clone)]
pub struct DatabaseFunction {
    name: String,
    arity: Arity,
    deterministic: bool,
    kind: FunctionKind,
}

impl DatabaseFunction {
    /// A scalar function. Returning `None` (through an `Option` result)
    /// yields SQL NULL.
    pub fn new<F, R>(name: impl Into<String>, arity: Arity, function: F) -> Self
    where
        F: Fn(&[DatabaseValue]) -> Result<R, BoxError> + Send + Sync + 'static,
        R: DatabaseValueConvertible,
    {
        let callback: Arc<ScalarCallback> = Arc::new(move |args: &[DatabaseValue]| {
            function(args).map(|value| value.database_value())
        });
        Self {
            name: name.into(),
            arity,
            deterministic: false,
            kind: FunctionKind::Scalar(callback),
        }
    }

    /// An aggregate function. `factory` makes one accumulator per group.
    pub fn aggregate<F, A>(name: impl Into<String>, arity: Arity, factory: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
        A: Aggregate + 'static,
    {
        let factory: Arc<AggregateFactory> =
            Arc::new(move || Box::new(factory()) as Box<dyn Aggregate>);
        Self {
            name: name.into(),
            arity,
            deterministic: false,
            kind: FunctionKind::Aggregate(factory),
        }
    }

    /// Marks the function as returning the same result for the same
    /// arguments, which allows it in indexes and CHECK constraints.
    pub fn deterministic(mut self) -> Self {
        self.deterministic = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, FunctionKind::Aggregate(_))
    }

    fn validate(&self) -> Result<CString, ExtensionError> {
        if let Arity::Fixed(n) = self.arity {
            if n > MAX_FUNCTION_ARITY {
                return Err(ExtensionError::InvalidArity {
                    name: self.name.clone(),
                    arity: n as i32,
                });
            }
        }
        extension_name(&self.name)
    }

    fn text_rep(&self) -> c_int {
        if self.deterministic {
            ffi::SQLITE_UTF8 | ffi::SQLITE_DETERMINISTIC
        } else {
            ffi::SQLITE_UTF8
        }
    }

    pub(crate) fn register(
        &self,
        db: *mut ffi::sqlite3,
        registry: &ExtensionRegistry,
    ) -> Result<(), ExtensionError> {
        let name = self.validate()?;
        let code = match &self.kind {
            FunctionKind::Scalar(callback) => {
                let user_data = registry.retain(Extension::ScalarFunction(callback.clone()));
                // on failure SQLite invokes the delete callback itself
                unsafe {
                    ffi::sqlite3_create_function_v2(
                        db,
                        name.as_ptr(),
                        self.arity.raw(),
                        self.text_rep(),
                        user_data,
                        Some(call_scalar),
                        None,
                        None,
                        Some(release_handle),
                    )
                }
            }
            FunctionKind::Aggregate(factory) => {
                let user_data = registry.retain(Extension::AggregateFunction(factory.clone()));
                unsafe {
                    ffi::sqlite3_create_function_v2(
                        db,
                        name.as_ptr(),
                        self.arity.raw(),
                        self.text_rep(),
                        user_data,
                        None,
                        Some(aggregate::step_aggregate),
                        Some(aggregate::finalize_aggregate),
                        Some(release_handle),
                    )
                }
            }
        };
        if code != ffi::SQLITE_OK {
            return Err(ExtensionError::Rejected {
                name: self.name.clone(),
                source: unsafe { DatabaseError::last_error(db, code) },
            });
        }
        tracing::debug!("registered function {}({:?})", self.name, self.arity);
        Ok(())
    }

    /// Removes the (name, arity) registration. SQLite calls the delete
    /// callback of the registered handle.
    pub(crate) fn unregister(&self, db: *mut ffi::sqlite3) -> Result<(), ExtensionError> {
        let name = self.validate()?;
        let code = unsafe {
            ffi::sqlite3_create_function_v2(
                db,
                name.as_ptr(),
                self.arity.raw(),
                self.text_rep(),
                std::ptr::null_mut(),
                None,
                None,
                None,
                None,
            )
        };
        if code != ffi::SQLITE_OK {
            return Err(ExtensionError::Rejected {
                name: self.name.clone(),
                source: unsafe { DatabaseError::last_error(db, code) },
            });
        }
        tracing::debug!("unregistered function {}({:?})", self.name, self.arity);
        Ok(())
    }
}

impl fmt::Debug for DatabaseFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("deterministic", &self.deterministic)
            .field("aggregate", &self.is_aggregate())
            .finish()
    }
}

/// Same identity rule as SQLite: (case-insensitive name, arity).
impl PartialEq for DatabaseFunction {
    fn eq(&self, other: &Self) -> bool {
        self.arity == other.arity && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for DatabaseFunction {}

impl Hash for DatabaseFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.arity.hash(state);
    }
}

/// Checks a function or collation name and converts it for the C API.
pub(crate) fn extension_name(name: &str) -> Result<CString, ExtensionError> {
    if name.is_empty() {
        return Err(ExtensionError::InvalidName {
            name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }
    CString::new(name).map_err(|_| ExtensionError::InvalidName {
        name: name.to_string(),
        reason: "name contains a NUL byte".to_string(),
    })
}

/// Reports a callback error as the result of the current call.
pub(crate) unsafe fn report_error(
    context: *mut ffi::sqlite3_context,
    error: &(dyn StdError + 'static),
) {
    let (code, message) = translate_error(error);
    unsafe {
        if let Some(message) = message {
            ffi::sqlite3_result_error(
                context,
                message.as_ptr() as *const c_char,
                message.len() as c_int,
            );
        }
        ffi::sqlite3_result_error_code(context, code.raw());
    }
}

unsafe extern "C" fn call_scalar(
    context: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    let slot = unsafe { ExtensionRegistry::slot(ffi::sqlite3_user_data(context)) };
    let callback = match slot.extension() {
        Extension::ScalarFunction(callback) => callback,
        other => panic!("handle {} is a {}, expected a scalar function", slot.id(), other.kind()),
    };
    let args = unsafe { DatabaseValue::from_raw_args(argc, argv) };
    match callback(&args) {
        Ok(value) => unsafe { value.set_result(context) },
        Err(error) => unsafe { report_error(context, error.as_ref()) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn constant(name: &str, arity: Arity) -> DatabaseFunction {
        DatabaseFunction::new(name, arity, |_| Ok::<_, BoxError>(1i64))
    }

    #[test]
    fn test_identity_is_name_and_arity() {
        assert_eq!(constant("f", Arity::Fixed(1)), constant("F", Arity::Fixed(1)));
        assert_ne!(constant("f", Arity::Fixed(1)), constant("f", Arity::Fixed(2)));
        assert_ne!(constant("f", Arity::Fixed(1)), constant("f", Arity::Variadic));
        assert_ne!(constant("f", Arity::Fixed(1)), constant("g", Arity::Fixed(1)));

        let mut set = HashSet::new();
        set.insert(constant("upper2", Arity::Fixed(1)));
        set.insert(constant("UPPER2", Arity::Fixed(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            constant("", Arity::Fixed(0)).validate(),
            Err(ExtensionError::InvalidName { .. })
        ));
        assert!(matches!(
            constant("a\0b", Arity::Fixed(0)).validate(),
            Err(ExtensionError::InvalidName { .. })
        ));
        assert!(matches!(
            constant("f", Arity::Fixed(128)).validate(),
            Err(ExtensionError::InvalidArity { arity: 128, .. })
        ));
        assert!(constant("f", Arity::Fixed(127)).validate().is_ok());
        assert!(constant("f", Arity::Variadic).validate().is_ok());
    }

    #[test]
    fn test_builder_flags() {
        let function = constant("f", Arity::Fixed(0)).deterministic();
        assert!(function.is_deterministic());
        assert!(!function.is_aggregate());
        assert_eq!(function.name(), "f");
        assert_eq!(function.arity(), Arity::Fixed(0));
        assert_eq!(function.text_rep(), ffi::SQLITE_UTF8 | ffi::SQLITE_DETERMINISTIC);
        assert_eq!(Arity::Variadic.raw(), -1);
    }
}
