///
/// Instances of registered FTS5 tokenizers.
///
/// `find_tokenizer` resolves a `TokenizerDescriptor` with xFindTokenizer and
/// creates an instance through the tokenizer's xCreate. The resulting
/// `Fts5Tokenizer` runs xTokenize on demand, streaming tokens to a Rust
/// callback, and calls xDelete when dropped.
///

use std::ffi::{c_char, c_int, c_void, CString};
use std::marker::PhantomData;
use std::ops::Range;
use std::ptr::NonNull;

use rusqlite::ffi;

use crate::error::{DatabaseError, ExtensionError, ResultCode};
use crate::value::raw_bytes;

use super::{Fts5ApiPtr, Fts5TokenizerHandle, Fts5TokenizerMethods, Token, TokenFlags, TokenizeFlags, TokenizerDescriptor};

/// An instance of a tokenizer registered with FTS5, built-in or custom.
///
/// The instance borrows the connection it was made on. It is deleted through
/// the tokenizer's own xDelete when dropped.
pub struct Fts5Tokenizer<'conn> {
    methods: Fts5TokenizerMethods,
    handle: NonNull<Fts5TokenizerHandle>,
    name: String,
    _conn: PhantomData<&'conn ()>,
}

// Tokenizer instances carry no thread affinity; FTS5 itself moves them
// between the statements of a connection.
unsafe impl Send for Fts5Tokenizer<'_> {}

struct Collector<'f> {
    on_token: &'f mut dyn FnMut(&str, Range<usize>, TokenFlags) -> Result<(), DatabaseError>,
    error: Option<DatabaseError>,
}

unsafe extern "C" fn collect_token(
    context: *mut c_void,
    flags: c_int,
    token: *const c_char,
    token_len: c_int,
    start: c_int,
    end: c_int,
) -> c_int {
    let collector = unsafe { &mut *(context as *mut Collector<'_>) };
    let (Ok(start), Ok(end)) = (usize::try_from(start), usize::try_from(end)) else {
        collector.error = Some(
            DatabaseError::new(ResultCode::RANGE).with_message("negative token offset"),
        );
        return ffi::SQLITE_RANGE;
    };
    let bytes = unsafe { raw_bytes(token as *const u8, token_len) };
    let text = String::from_utf8_lossy(bytes);
    match (collector.on_token)(&text, start..end, TokenFlags::from_raw(flags)) {
        Ok(()) => ffi::SQLITE_OK,
        Err(mut error) => {
            if error.result_code == ResultCode::OK {
                error.result_code = ResultCode::ERROR;
            }
            let code = error.result_code.raw();
            collector.error = Some(error);
            code
        }
    }
}

impl<'conn> Fts5Tokenizer<'conn> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tokenizes `text` and collects every token.
    pub fn tokenize(&mut self, text: &str, flags: TokenizeFlags) -> Result<Vec<Token>, DatabaseError> {
        let mut tokens = Vec::new();
        self.tokenize_with(text, flags, |token, range, flags| {
            tokens.push(Token {
                text: token.to_string(),
                range,
                flags,
            });
            Ok(())
        })?;
        Ok(tokens)
    }

    /// Tokenizes `text`, handing each token to `on_token` as it is produced.
    /// An error from `on_token` stops tokenization and is returned as is.
    pub fn tokenize_with<F>(
        &mut self,
        text: &str,
        flags: TokenizeFlags,
        mut on_token: F,
    ) -> Result<(), DatabaseError>
    where
        F: FnMut(&str, Range<usize>, TokenFlags) -> Result<(), DatabaseError>,
    {
        let Some(x_tokenize) = self.methods.x_tokenize else {
            return Err(DatabaseError::new(ResultCode::MISUSE)
                .with_message(format!("tokenizer {} has no xTokenize", self.name)));
        };
        let Ok(text_len) = c_int::try_from(text.len()) else {
            return Err(DatabaseError::new(ResultCode::TOOBIG));
        };

        let mut collector = Collector {
            on_token: &mut on_token,
            error: None,
        };
        let code = unsafe {
            x_tokenize(
                self.handle.as_ptr(),
                &mut collector as *mut Collector<'_> as *mut c_void,
                flags.raw(),
                text.as_ptr() as *const c_char,
                text_len,
                Some(collect_token),
            )
        };
        if let Some(error) = collector.error {
            return Err(error);
        }
        if code != ffi::SQLITE_OK {
            return Err(DatabaseError::new(ResultCode::new(code))
                .with_message(format!("tokenizer {} failed", self.name)));
        }
        Ok(())
    }
}

impl Drop for Fts5Tokenizer<'_> {
    fn drop(&mut self) {
        if let Some(x_delete) = self.methods.x_delete {
            unsafe { x_delete(self.handle.as_ptr()) };
        }
    }
}

impl std::fmt::Debug for Fts5Tokenizer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fts5Tokenizer").field("name", &self.name).finish()
    }
}

/// Finds a registered tokenizer and creates an instance of it.
///
/// # Safety
///
/// `api` must belong to a connection that outlives `'c`.
pub(crate) unsafe fn find_tokenizer<'c>(
    api: Fts5ApiPtr,
    descriptor: &TokenizerDescriptor,
) -> Result<Fts5Tokenizer<'c>, ExtensionError> {
    let Some(find) = api.api().x_find_tokenizer else {
        return Err(ExtensionError::Fts5Unavailable(
            DatabaseError::new(ResultCode::ERROR).with_message("fts5_api has no xFindTokenizer"),
        ));
    };
    let name = CString::new(descriptor.name.as_str())
        .map_err(|_| ExtensionError::TokenizerNotFound(descriptor.name.clone()))?;

    let mut user_data: *mut c_void = std::ptr::null_mut();
    let mut methods = Fts5TokenizerMethods::empty();
    let code = unsafe { find(api.as_ptr(), name.as_ptr(), &mut user_data, &mut methods) };
    if code != ffi::SQLITE_OK {
        return Err(ExtensionError::TokenizerNotFound(descriptor.name.clone()));
    }
    let Some(create) = methods.x_create else {
        return Err(ExtensionError::TokenizerNotFound(descriptor.name.clone()));
    };

    let arguments = descriptor
        .arguments
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ExtensionError::TokenizerCreation {
            name: descriptor.name.clone(),
            source: DatabaseError::new(ResultCode::MISUSE)
                .with_message("tokenizer argument contains a NUL byte"),
        })?;
    let mut argv: Vec<*const c_char> = arguments.iter().map(|arg| arg.as_ptr()).collect();

    let mut handle: *mut Fts5TokenizerHandle = std::ptr::null_mut();
    let code = unsafe {
        create(
            user_data,
            argv.as_mut_ptr(),
            argv.len() as c_int,
            &mut handle,
        )
    };
    if code != ffi::SQLITE_OK {
        return Err(ExtensionError::TokenizerCreation {
            name: descriptor.name.clone(),
            source: DatabaseError::new(ResultCode::new(code)),
        });
    }
    let Some(handle) = NonNull::new(handle) else {
        return Err(ExtensionError::TokenizerCreation {
            name: descriptor.name.clone(),
            source: DatabaseError::new(ResultCode::ERROR)
                .with_message("xCreate returned no tokenizer"),
        });
    };
    tracing::trace!("created {} tokenizer with {:?}", descriptor.name, descriptor.arguments);

    Ok(Fts5Tokenizer {
        methods,
        handle,
        name: descriptor.name.clone(),
        _conn: PhantomData,
    })
}
