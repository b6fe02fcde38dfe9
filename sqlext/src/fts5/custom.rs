///
/// Native FTS5 tokenizers.
///
/// Registering a tokenizer type retains a factory handle in the connection's
/// handle table; FTS5 owns it until the connection closes. Each
/// `tokenize='name arg1 arg2'` table then asks the factory for an instance,
/// which gets its own handle. FTS5 calls the delete callback of every
/// instance exactly once, before it destroys the factory.
///
/// A factory error creates no instance and retains nothing; FTS5 only sees
/// the result code.
///

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::ffi;

use crate::error::{translate_error, BoxError, DatabaseError, ExtensionError, ResultCode};
use crate::function::extension_name;
use crate::registry::{release_handle, Extension, ExtensionRegistry};
use crate::value::raw_bytes;

use super::lookup::{find_tokenizer, Fts5Tokenizer};
use super::{
    Fts5ApiPtr, Fts5TokenizerHandle, Fts5TokenizerMethods, TokenCallback, TokenFlags,
    TokenizeFlags, TokenizerDescriptor,
};

/// A tokenizer instance, created for one FTS5 table.
pub trait Tokenizer: Send {
    /// Emits the tokens of `text` in order. Offsets given to the sink are
    /// byte offsets into `text`. An error from the sink must end
    /// tokenization; it is reported to FTS5 whatever this method returns.
    fn tokenize(
        &mut self,
        text: &str,
        flags: TokenizeFlags,
        tokens: &mut TokenSink,
    ) -> Result<(), BoxError>;
}

/// A tokenizer type with a fixed name, built from its `tokenize=` arguments.
pub trait CustomTokenizer: Tokenizer + Sized + 'static {
    const NAME: &'static str;

    fn new(host: &TokenizerHost, arguments: &[String]) -> Result<Self, BoxError>;
}

pub(crate) type TokenizerFactory =
    dyn Fn(&TokenizerHost, &[String]) -> Result<Box<dyn Tokenizer>, BoxError> + Send + Sync;

pub(crate) struct TokenizerFactoryHandle {
    api: Fts5ApiPtr,
    name: String,
    factory: Box<TokenizerFactory>,
}

/// Passed to tokenizer factories: access to the other tokenizers of the
/// connection, so that a tokenizer can wrap another one.
pub struct TokenizerHost {
    api: Fts5ApiPtr,
}

impl TokenizerHost {
    /// Instantiates a registered tokenizer, built-in or custom, so the
    /// tokenizer being built can delegate to it.
    ///
    /// # Safety
    ///
    /// The returned instance is tied to the connection, not to `'static`.
    /// It must be owned by the tokenizer this factory returns and dropped
    /// with it: FTS5 deletes that tokenizer before the connection closes,
    /// which releases the inner instance too. Moving it anywhere else (a
    /// shared collection, a channel, a global) leaves a live handle behind
    /// after close.
    pub unsafe fn make_tokenizer(
        &self,
        descriptor: &TokenizerDescriptor,
    ) -> Result<Fts5Tokenizer<'static>, ExtensionError> {
        unsafe { find_tokenizer(self.api, descriptor) }
    }
}

/// Receives the tokens of one tokenize call and forwards them to FTS5.
pub struct TokenSink {
    context: *mut c_void,
    callback: TokenCallback,
    failure: Option<c_int>,
}

impl TokenSink {
    fn new(context: *mut c_void, callback: TokenCallback) -> Self {
        Self {
            context,
            callback,
            failure: None,
        }
    }

    /// Emits one token. Once FTS5 rejects a token, every later call fails
    /// with the same code.
    pub fn emit(
        &mut self,
        token: &str,
        range: Range<usize>,
        flags: TokenFlags,
    ) -> Result<(), DatabaseError> {
        if let Some(code) = self.failure {
            return Err(DatabaseError::new(ResultCode::new(code)));
        }
        let (Ok(len), Ok(start), Ok(end)) = (
            c_int::try_from(token.len()),
            c_int::try_from(range.start),
            c_int::try_from(range.end),
        ) else {
            self.failure = Some(ffi::SQLITE_TOOBIG);
            return Err(DatabaseError::new(ResultCode::TOOBIG));
        };
        let code = unsafe {
            (self.callback)(
                self.context,
                flags.raw(),
                token.as_ptr() as *const c_char,
                len,
                start,
                end,
            )
        };
        if code != ffi::SQLITE_OK {
            self.failure = Some(code);
            return Err(DatabaseError::new(ResultCode::new(code)));
        }
        Ok(())
    }

    pub fn failure(&self) -> Option<ResultCode> {
        self.failure.map(ResultCode::new)
    }
}

pub(crate) fn register_tokenizer(
    api: Fts5ApiPtr,
    registry: &ExtensionRegistry,
    name: &str,
    factory: Box<TokenizerFactory>,
) -> Result<(), ExtensionError> {
    let c_name = extension_name(name)?;
    let Some(create_tokenizer) = api.api().x_create_tokenizer else {
        return Err(ExtensionError::Fts5Unavailable(
            DatabaseError::new(ResultCode::ERROR).with_message("fts5_api has no xCreateTokenizer"),
        ));
    };

    let handle = Arc::new(TokenizerFactoryHandle {
        api,
        name: name.to_string(),
        factory,
    });
    let user_data = registry.retain(Extension::TokenizerFactory(handle));
    let mut methods = Fts5TokenizerMethods {
        x_create: Some(create_instance),
        x_delete: Some(delete_instance),
        x_tokenize: Some(tokenize_text),
    };
    let code = unsafe {
        create_tokenizer(
            api.as_ptr(),
            c_name.as_ptr(),
            user_data,
            &mut methods,
            Some(release_handle),
        )
    };
    if code != ffi::SQLITE_OK {
        // FTS5 does not call the destroy callback of a rejected tokenizer
        let _ = unsafe { ExtensionRegistry::release(user_data) };
        return Err(ExtensionError::Rejected {
            name: name.to_string(),
            source: DatabaseError::new(ResultCode::new(code)),
        });
    }
    tracing::debug!("registered tokenizer {}", name);
    Ok(())
}

unsafe fn read_arguments(args: *mut *const c_char, count: c_int) -> Vec<String> {
    if args.is_null() || count <= 0 {
        return Vec::new();
    }
    let raw = unsafe { std::slice::from_raw_parts(args, count as usize) };
    raw.iter()
        .filter(|arg| !arg.is_null())
        .map(|arg| unsafe { CStr::from_ptr(*arg) }.to_string_lossy().into_owned())
        .collect()
}

unsafe extern "C" fn create_instance(
    user_data: *mut c_void,
    args: *mut *const c_char,
    arg_count: c_int,
    out: *mut *mut Fts5TokenizerHandle,
) -> c_int {
    let slot = unsafe { ExtensionRegistry::slot(user_data) };
    let handle = match slot.extension() {
        Extension::TokenizerFactory(handle) => handle,
        other => panic!("handle {} is a {}, expected a tokenizer factory", slot.id(), other.kind()),
    };
    let arguments = unsafe { read_arguments(args, arg_count) };
    let host = TokenizerHost { api: handle.api };

    match (handle.factory)(&host, &arguments) {
        Ok(tokenizer) => {
            let instance = Extension::TokenizerInstance(Arc::new(Mutex::new(tokenizer)));
            let instance = slot.registry().retain(instance);
            unsafe { *out = instance as *mut Fts5TokenizerHandle };
            tracing::trace!("created {} tokenizer with {:?}", handle.name, arguments);
            ffi::SQLITE_OK
        }
        Err(error) => {
            let (code, message) = translate_error(error.as_ref());
            tracing::warn!(
                "{} tokenizer constructor failed with {:?}: {}",
                handle.name,
                arguments,
                message.unwrap_or_default()
            );
            code.raw()
        }
    }
}

unsafe extern "C" fn delete_instance(tokenizer: *mut Fts5TokenizerHandle) {
    let _ = unsafe { ExtensionRegistry::release(tokenizer as *mut c_void) };
    tracing::trace!("deleted tokenizer instance");
}

unsafe extern "C" fn tokenize_text(
    tokenizer: *mut Fts5TokenizerHandle,
    context: *mut c_void,
    flags: c_int,
    text: *const c_char,
    text_len: c_int,
    token_callback: Option<TokenCallback>,
) -> c_int {
    let slot = unsafe { ExtensionRegistry::slot(tokenizer as *mut c_void) };
    let instance = match slot.extension() {
        Extension::TokenizerInstance(instance) => instance,
        other => panic!("handle {} is a {}, expected a tokenizer instance", slot.id(), other.kind()),
    };
    let Some(token_callback) = token_callback else {
        return ffi::SQLITE_MISUSE;
    };
    let bytes = unsafe { raw_bytes(text as *const u8, text_len) };
    let Ok(text) = std::str::from_utf8(bytes) else {
        tracing::warn!("tokenizer input is not valid UTF-8");
        return ffi::SQLITE_ERROR;
    };

    let mut sink = TokenSink::new(context, token_callback);
    let result = instance
        .lock()
        .tokenize(text, TokenizeFlags::from_raw(flags), &mut sink);
    if let Some(code) = sink.failure {
        return code;
    }
    match result {
        Ok(()) => ffi::SQLITE_OK,
        Err(error) => translate_error(error.as_ref()).0.raw(),
    }
}
