///
/// Extension Handle Table
///
/// SQLite keeps native extensions as opaque `void*` user data and calls a
/// delete callback when it no longer needs them. Instead of leaking boxed
/// closures across the boundary, every native object lives in a
/// per-connection table keyed by a generated id:
///
/// - `retain` stores an extension and returns the opaque pointer handed to
///   SQLite (a `HandleSlot` naming the table and the id)
/// - `slot` recovers the slot inside a trampoline
/// - `release` is called from delete callbacks only, and removes the entry
///
/// Ids start at 1 so that a zeroed aggregate context means "no instance yet".
/// A missing id on lookup or removal means a handle was used after release or
/// released twice. Both are bugs in this crate, so they panic; inside an
/// `extern "C"` trampoline that aborts the process.
///

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::aggregate::{Aggregate, AggregateFactory};
use crate::collation::CompareCallback;
use crate::fts5::{Tokenizer, TokenizerFactoryHandle};
use crate::function::ScalarCallback;

pub(crate) type HandleId = u64;

#[derive(Clone)]
pub(crate) enum Extension {
    ScalarFunction(Arc<ScalarCallback>),
    AggregateFunction(Arc<AggregateFactory>),
    AggregateInstance(Arc<Mutex<Box<dyn Aggregate>>>),
    Collation(Arc<CompareCallback>),
    TokenizerFactory(Arc<TokenizerFactoryHandle>),
    TokenizerInstance(Arc<Mutex<Box<dyn Tokenizer>>>),
}

impl Extension {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Extension::ScalarFunction(_) => "scalar function",
            Extension::AggregateFunction(_) => "aggregate function",
            Extension::AggregateInstance(_) => "aggregate instance",
            Extension::Collation(_) => "collation",
            Extension::TokenizerFactory(_) => "tokenizer factory",
            Extension::TokenizerInstance(_) => "tokenizer instance",
        }
    }
}

struct HandleTable {
    entries: HashMap<HandleId, Extension>,
    next_id: HandleId,
}

impl HandleTable {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, extension: Extension) -> HandleId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, extension);
        id
    }
}

/// The extension table of one connection.
#[derive(Clone)]
pub(crate) struct ExtensionRegistry {
    table: Arc<Mutex<HandleTable>>,
}

/// What SQLite holds as user data: the owning table and an id in it.
pub(crate) struct HandleSlot {
    registry: ExtensionRegistry,
    id: HandleId,
}

impl HandleSlot {
    pub(crate) fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub(crate) fn id(&self) -> HandleId {
        self.id
    }

    pub(crate) fn extension(&self) -> Extension {
        self.registry.get(self.id)
    }
}

impl ExtensionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(HandleTable::new())),
        }
    }

    pub(crate) fn insert(&self, extension: Extension) -> HandleId {
        let kind = extension.kind();
        let id = self.table.lock().insert(extension);
        tracing::trace!("retained {} handle {}", kind, id);
        id
    }

    pub(crate) fn get(&self, id: HandleId) -> Extension {
        match self.table.lock().entries.get(&id) {
            Some(extension) => extension.clone(),
            None => panic!("extension handle {} used after release", id),
        }
    }

    pub(crate) fn remove(&self, id: HandleId) -> Extension {
        let removed = self.table.lock().entries.remove(&id);
        match removed {
            Some(extension) => {
                tracing::trace!("released {} handle {}", extension.kind(), id);
                extension
            }
            None => panic!("extension handle {} released twice", id),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Stores `extension` and returns the user data pointer for SQLite. The
    /// pointer must reach `release` exactly once.
    pub(crate) fn retain(&self, extension: Extension) -> *mut c_void {
        let id = self.insert(extension);
        let slot = Box::new(HandleSlot {
            registry: self.clone(),
            id,
        });
        Box::into_raw(slot) as *mut c_void
    }

    /// # Safety
    ///
    /// `ptr` must come from `retain` and not have been released.
    pub(crate) unsafe fn slot<'a>(ptr: *mut c_void) -> &'a HandleSlot {
        assert!(!ptr.is_null(), "null extension handle");
        unsafe { &*(ptr as *const HandleSlot) }
    }

    /// Drops the entry behind a pointer from `retain`.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `retain` and is invalid afterwards.
    pub(crate) unsafe fn release(ptr: *mut c_void) -> Extension {
        assert!(!ptr.is_null(), "null extension handle");
        let slot = unsafe { Box::from_raw(ptr as *mut HandleSlot) };
        slot.registry.remove(slot.id)
    }
}

/// Delete callback shared by every registration kind.
pub(crate) unsafe extern "C" fn release_handle(ptr: *mut c_void) {
    let _ = unsafe { ExtensionRegistry::release(ptr) };
}
