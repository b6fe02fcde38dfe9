///
/// String collations.
///
/// A collation is a named comparison of two strings, usable in ORDER BY,
/// indexes and `COLLATE` clauses. SQLite hands the comparison two
/// (length, buffer) pairs that are not NUL-terminated.
///
/// Two `DatabaseCollation` values are equal when their names are equal
/// according to `sqlite3_stricmp`, the comparison SQLite itself uses to
/// resolve collation names. Every collation hashes to the same bucket:
/// collations are registered rarely and are not used as keys at scale, and a
/// content hash would have to reproduce SQLite's case folding exactly.
///

use std::cmp::Ordering;
use std::ffi::{c_int, c_void, CString};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rusqlite::ffi;

use crate::error::{DatabaseError, ExtensionError};
use crate::function::extension_name;
use crate::registry::{release_handle, Extension, ExtensionRegistry};
use crate::value::raw_bytes;

pub(crate) type CompareCallback = dyn Fn(&str, &str) -> Ordering + Send + Sync;

#[derive(Clone)]
pub struct DatabaseCollation {
    name: String,
    compare: Arc<CompareCallback>,
}

impl DatabaseCollation {
    pub fn new<F>(name: impl Into<String>, compare: F) -> Self
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            compare: Arc::new(compare),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compare(&self, left: &str, right: &str) -> Ordering {
        (self.compare)(left, right)
    }

    pub(crate) fn register(
        &self,
        db: *mut ffi::sqlite3,
        registry: &ExtensionRegistry,
    ) -> Result<(), ExtensionError> {
        let name = extension_name(&self.name)?;
        let user_data = registry.retain(Extension::Collation(self.compare.clone()));
        let code = unsafe {
            ffi::sqlite3_create_collation_v2(
                db,
                name.as_ptr(),
                ffi::SQLITE_UTF8,
                user_data,
                Some(compare_strings),
                Some(release_handle),
            )
        };
        if code != ffi::SQLITE_OK {
            // unlike functions, a failed collation registration does not
            // call the delete callback
            let _ = unsafe { ExtensionRegistry::release(user_data) };
            return Err(ExtensionError::Rejected {
                name: self.name.clone(),
                source: unsafe { DatabaseError::last_error(db, code) },
            });
        }
        tracing::debug!("registered collation {}", self.name);
        Ok(())
    }

    pub(crate) fn unregister(&self, db: *mut ffi::sqlite3) -> Result<(), ExtensionError> {
        let name = extension_name(&self.name)?;
        let code = unsafe {
            ffi::sqlite3_create_collation_v2(
                db,
                name.as_ptr(),
                ffi::SQLITE_UTF8,
                std::ptr::null_mut(),
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
        tracing::debug!("unregistered collation {}", self.name);
        Ok(())
    }
}

impl fmt::Debug for DatabaseCollation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCollation")
            .field("name", &self.name)
            .finish()
    }
}

impl PartialEq for DatabaseCollation {
    fn eq(&self, other: &Self) -> bool {
        match (CString::new(self.name.as_str()), CString::new(other.name.as_str())) {
            (Ok(left), Ok(right)) => unsafe {
                ffi::sqlite3_stricmp(left.as_ptr(), right.as_ptr()) == 0
            },
            _ => self.name.eq_ignore_ascii_case(&other.name),
        }
    }
}

impl Eq for DatabaseCollation {}

impl Hash for DatabaseCollation {
    fn hash<H: Hasher>(&self, _state: &mut H) {}
}

unsafe extern "C" fn compare_strings(
    user_data: *mut c_void,
    len1: c_int,
    buf1: *const c_void,
    len2: c_int,
    buf2: *const c_void,
) -> c_int {
    let slot = unsafe { ExtensionRegistry::slot(user_data) };
    let compare = match slot.extension() {
        Extension::Collation(compare) => compare,
        other => panic!("handle {} is a {}, expected a collation", slot.id(), other.kind()),
    };
    let left = String::from_utf8_lossy(unsafe { raw_bytes(buf1 as *const u8, len1) });
    let right = String::from_utf8_lossy(unsafe { raw_bytes(buf2 as *const u8, len2) });
    match compare(&left, &right) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn binary(name: &str) -> DatabaseCollation {
        DatabaseCollation::new(name, |a, b| a.cmp(b))
    }

    #[test]
    fn test_equality_ignores_case() {
        assert_eq!(binary("localized"), binary("LOCALIZED"));
        assert_eq!(binary("Straße"), binary("Straße"));
        assert_ne!(binary("a"), binary("b"));
    }

    #[test]
    fn test_constant_hash_keeps_set_consistent() {
        let mut set = HashSet::new();
        set.insert(binary("nocase2"));
        set.insert(binary("NOCASE2"));
        set.insert(binary("other"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_compare_strings_uses_exact_lengths() {
        let registry = ExtensionRegistry::new();
        let user_data = registry.retain(Extension::Collation(binary("b").compare.clone()));

        // "abcXXX" bounded to 3 bytes is "abc"
        let left = b"abcXXX";
        let right = b"abd";
        let result = unsafe {
            compare_strings(
                user_data,
                3,
                left.as_ptr() as *const c_void,
                3,
                right.as_ptr() as *const c_void,
            )
        };
        assert_eq!(result, -1);

        let result = unsafe {
            compare_strings(
                user_data,
                0,
                std::ptr::null(),
                0,
                std::ptr::null(),
            )
        };
        assert_eq!(result, 0);

        let _ = unsafe { ExtensionRegistry::release(user_data) };
        assert_eq!(registry.len(), 0);
    }
}
