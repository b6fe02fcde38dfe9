///
/// FTS5 Tokenizers
///
/// FTS5 splits text into tokens through pluggable tokenizers. This module
/// both registers native tokenizers with FTS5 and instantiates tokenizers
/// FTS5 already knows (built-in or custom) so native code can run them.
///
/// Layout:
/// - `Fts5Api` / `Fts5TokenizerMethods`: `#[repr(C)]` mirrors of the
///   `fts5_api` and `fts5_tokenizer` structs from sqlite3.h
/// - `custom`: the `Tokenizer` trait, factory registration, and the
///   create/delete/tokenize trampolines
/// - `lookup`: `Fts5Tokenizer`, an instance of a registered tokenizer found
///   with `xFindTokenizer`
///
/// The `fts5_api` pointer of a connection is obtained by binding a pointer
/// of type "fts5_api_ptr" to `SELECT fts5(?1)`.
///

mod custom;
mod lookup;

use std::ffi::{c_char, c_int, c_void};
use std::ops::Range;
use std::ptr::NonNull;

use rusqlite::ffi;

use crate::error::{DatabaseError, ExtensionError};

pub use custom::{CustomTokenizer, TokenSink, Tokenizer, TokenizerHost};
pub use lookup::Fts5Tokenizer;

pub(crate) use lookup::find_tokenizer;
pub(crate) use custom::{register_tokenizer, TokenizerFactory, TokenizerFactoryHandle};

/// Opaque `Fts5Tokenizer` instance pointer.
#[repr(C)]
pub(crate) struct Fts5TokenizerHandle {
    _private: [u8; 0],
}

pub(crate) type TokenCallback = unsafe extern "C" fn(
    context: *mut c_void,
    flags: c_int,
    token: *const c_char,
    token_len: c_int,
    start: c_int,
    end: c_int,
) -> c_int;

/// `struct fts5_tokenizer`. FTS5 copies it on registration.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct Fts5TokenizerMethods {
    pub(crate) x_create: Option<
        unsafe extern "C" fn(
            user_data: *mut c_void,
            args: *mut *const c_char,
            arg_count: c_int,
            out: *mut *mut Fts5TokenizerHandle,
        ) -> c_int,
    >,
    pub(crate) x_delete: Option<unsafe extern "C" fn(tokenizer: *mut Fts5TokenizerHandle)>,
    pub(crate) x_tokenize: Option<
        unsafe extern "C" fn(
            tokenizer: *mut Fts5TokenizerHandle,
            context: *mut c_void,
            flags: c_int,
            text: *const c_char,
            text_len: c_int,
            token_callback: Option<TokenCallback>,
        ) -> c_int,
    >,
}

impl Fts5TokenizerMethods {
    pub(crate) fn empty() -> Self {
        Self {
            x_create: None,
            x_delete: None,
            x_tokenize: None,
        }
    }
}

/// Leading fields of `struct fts5_api`; later versions only append.
#[repr(C)]
pub(crate) struct Fts5Api {
    pub(crate) version: c_int,
    pub(crate) x_create_tokenizer: Option<
        unsafe extern "C" fn(
            api: *mut Fts5Api,
            name: *const c_char,
            user_data: *mut c_void,
            tokenizer: *mut Fts5TokenizerMethods,
            destroy: Option<unsafe extern "C" fn(*mut c_void)>,
        ) -> c_int,
    >,
    pub(crate) x_find_tokenizer: Option<
        unsafe extern "C" fn(
            api: *mut Fts5Api,
            name: *const c_char,
            user_data: *mut *mut c_void,
            tokenizer: *mut Fts5TokenizerMethods,
        ) -> c_int,
    >,
}

/// The `fts5_api` of one connection. Valid until that connection closes.
#[derive(Clone, Copy)]
pub(crate) struct Fts5ApiPtr(NonNull<Fts5Api>);

// FTS5 does not tie its API object to a thread; access is serialized by the
// owning connection.
unsafe impl Send for Fts5ApiPtr {}
unsafe impl Sync for Fts5ApiPtr {}

impl Fts5ApiPtr {
    pub(crate) fn as_ptr(self) -> *mut Fts5Api {
        self.0.as_ptr()
    }

    pub(crate) fn api(&self) -> &Fts5Api {
        unsafe { self.0.as_ref() }
    }

    /// Looks up the FTS5 API of a connection.
    ///
    /// # Safety
    ///
    /// `db` must be an open connection.
    pub(crate) unsafe fn lookup(db: *mut ffi::sqlite3) -> Result<Self, ExtensionError> {
        let mut stmt: *mut ffi::sqlite3_stmt = std::ptr::null_mut();
        let code = unsafe {
            ffi::sqlite3_prepare_v2(db, c"SELECT fts5(?1)".as_ptr(), -1, &mut stmt, std::ptr::null_mut())
        };
        if code != ffi::SQLITE_OK {
            return Err(ExtensionError::Fts5Unavailable(unsafe {
                DatabaseError::last_error(db, code)
            }));
        }

        let mut api: *mut Fts5Api = std::ptr::null_mut();
        let (bind, step) = unsafe {
            let bind = ffi::sqlite3_bind_pointer(
                stmt,
                1,
                &mut api as *mut *mut Fts5Api as *mut c_void,
                c"fts5_api_ptr".as_ptr(),
                None,
            );
            let step = if bind == ffi::SQLITE_OK { ffi::sqlite3_step(stmt) } else { bind };
            ffi::sqlite3_finalize(stmt);
            (bind, step)
        };
        if bind != ffi::SQLITE_OK || (step != ffi::SQLITE_ROW && step != ffi::SQLITE_DONE) {
            return Err(ExtensionError::Fts5Unavailable(unsafe {
                DatabaseError::last_error(db, step)
            }));
        }
        match NonNull::new(api) {
            Some(api) => Ok(Fts5ApiPtr(api)),
            None => Err(ExtensionError::Fts5Unavailable(
                DatabaseError::new(crate::error::ResultCode::ERROR)
                    .with_message("fts5() returned no API pointer"),
            )),
        }
    }
}

/// Why FTS5 is tokenizing: the low bits of the `flags` argument of xTokenize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenizeFlags(i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenizeReason {
    /// A document is being inserted into or removed from the index.
    Document,
    /// A MATCH query is being parsed. `prefix` is set for `token*` queries.
    Query { prefix: bool },
    /// The `fts5_api.xTokenize()` auxiliary-function API.
    Aux,
}

impl TokenizeFlags {
    pub const QUERY: TokenizeFlags = TokenizeFlags(0x0001);
    pub const PREFIX: TokenizeFlags = TokenizeFlags(0x0002);
    pub const DOCUMENT: TokenizeFlags = TokenizeFlags(0x0004);
    pub const AUX: TokenizeFlags = TokenizeFlags(0x0008);

    pub const fn from_raw(raw: i32) -> Self {
        TokenizeFlags(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn contains(self, other: TokenizeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn reason(self) -> TokenizeReason {
        if self.contains(TokenizeFlags::QUERY) {
            TokenizeReason::Query {
                prefix: self.contains(TokenizeFlags::PREFIX),
            }
        } else if self.contains(TokenizeFlags::AUX) {
            TokenizeReason::Aux
        } else {
            TokenizeReason::Document
        }
    }
}

impl std::ops::BitOr for TokenizeFlags {
    type Output = TokenizeFlags;

    fn bitor(self, rhs: TokenizeFlags) -> TokenizeFlags {
        TokenizeFlags(self.0 | rhs.0)
    }
}

/// Properties of one emitted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TokenFlags(i32);

impl TokenFlags {
    pub const NONE: TokenFlags = TokenFlags(0);
    /// The token is a synonym at the same position as the previous one.
    pub const COLOCATED: TokenFlags = TokenFlags(0x0001);

    pub const fn from_raw(raw: i32) -> Self {
        TokenFlags(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_colocated(self) -> bool {
        self.0 & TokenFlags::COLOCATED.0 != 0
    }
}

/// A token with its byte range in the tokenized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub range: Range<usize>,
    pub flags: TokenFlags,
}

/// A tokenizer name and its arguments, as written in
/// `tokenize = 'porter unicode61 remove_diacritics 2'`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenizerDescriptor {
    pub name: String,
    pub arguments: Vec<String>,
}

impl TokenizerDescriptor {
    pub fn new<I, S>(name: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits a whitespace-separated descriptor. Quoted components keep
    /// their inner spaces; quotes are doubled to escape them.
    pub fn parse(text: &str) -> Option<Self> {
        let mut components = split_components(text).into_iter();
        let name = components.next()?;
        Some(Self {
            name,
            arguments: components.collect(),
        })
    }

    pub fn components(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.arguments.iter().cloned())
            .collect()
    }
}

fn split_components(text: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut component = String::new();
        if matches!(c, '\'' | '"' | '`') {
            let quote = c;
            chars.next();
            while let Some(c) = chars.next() {
                if c == quote {
                    if chars.peek() == Some(&quote) {
                        chars.next();
                        component.push(quote);
                    } else {
                        break;
                    }
                } else {
                    component.push(c);
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                component.push(c);
                chars.next();
            }
        }
        components.push(component);
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_reason() {
        assert_eq!(TokenizeFlags::DOCUMENT.reason(), TokenizeReason::Document);
        assert_eq!(
            TokenizeFlags::QUERY.reason(),
            TokenizeReason::Query { prefix: false }
        );
        assert_eq!(
            (TokenizeFlags::QUERY | TokenizeFlags::PREFIX).reason(),
            TokenizeReason::Query { prefix: true }
        );
        assert_eq!(TokenizeFlags::AUX.reason(), TokenizeReason::Aux);
        assert_eq!(TokenizeFlags::from_raw(0).reason(), TokenizeReason::Document);
    }

    #[test]
    fn test_token_flags() {
        assert!(TokenFlags::COLOCATED.is_colocated());
        assert!(!TokenFlags::NONE.is_colocated());
        assert_eq!(TokenFlags::default(), TokenFlags::NONE);
    }

    #[test]
    fn test_descriptor_parse() {
        let descriptor = TokenizerDescriptor::parse("porter  unicode61 remove_diacritics 2").unwrap();
        assert_eq!(descriptor.name, "porter");
        assert_eq!(descriptor.arguments, vec!["unicode61", "remove_diacritics", "2"]);
        assert_eq!(descriptor.components().len(), 4);

        let descriptor = TokenizerDescriptor::parse("unicode61 tokenchars '-_ '").unwrap();
        assert_eq!(descriptor.arguments, vec!["tokenchars", "-_ "]);

        let descriptor = TokenizerDescriptor::parse("ascii separators 'it''s'").unwrap();
        assert_eq!(descriptor.arguments, vec!["separators", "it's"]);

        assert!(TokenizerDescriptor::parse("   ").is_none());
    }

    #[test]
    fn test_descriptor_new() {
        let descriptor = TokenizerDescriptor::new("trigram", ["case_sensitive", "1"]);
        assert_eq!(descriptor.components(), vec!["trigram", "case_sensitive", "1"]);
    }
}
