///
/// Aggregate Functions
///
/// An aggregate function gets one `Aggregate` accumulator per group. The
/// accumulator lives in the connection's handle table; its id is stored in
/// the SQLite aggregate context of the group. A zeroed context means no row
/// has been stepped yet. The finalize callback removes the accumulator from
/// the table, so each one is released exactly once.
///

use std::ffi::c_int;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::ffi;

use crate::error::BoxError;
use crate::function::report_error;
use crate::registry::{Extension, ExtensionRegistry, HandleId, HandleSlot};
use crate::value::DatabaseValue;

/// Accumulator for one group of an aggregate function.
pub trait Aggregate: Send {
    fn step(&mut self, args: &[DatabaseValue]) -> Result<(), BoxError>;

    fn finalize(&mut self) -> Result<DatabaseValue, BoxError>;
}

pub(crate) type AggregateFactory = dyn Fn() -> Box<dyn Aggregate> + Send + Sync;

fn factory_of(slot: &HandleSlot) -> Arc<AggregateFactory> {
    match slot.extension() {
        Extension::AggregateFunction(factory) => factory,
        other => panic!(
            "handle {} is a {}, expected an aggregate function",
            slot.id(),
            other.kind()
        ),
    }
}

fn instance_of(registry: &ExtensionRegistry, id: HandleId) -> Arc<Mutex<Box<dyn Aggregate>>> {
    match registry.get(id) {
        Extension::AggregateInstance(instance) => instance,
        other => panic!("handle {} is a {}, expected an aggregate instance", id, other.kind()),
    }
}

pub(crate) unsafe extern "C" fn step_aggregate(
    context: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    let slot = unsafe { ExtensionRegistry::slot(ffi::sqlite3_user_data(context)) };
    let cell = unsafe {
        ffi::sqlite3_aggregate_context(context, std::mem::size_of::<HandleId>() as c_int)
            as *mut HandleId
    };
    if cell.is_null() {
        unsafe { ffi::sqlite3_result_error_nomem(context) };
        return;
    }

    let id = unsafe { *cell };
    let instance = if id == 0 {
        let factory = factory_of(slot);
        let instance = Arc::new(Mutex::new(factory()));
        let id = slot
            .registry()
            .insert(Extension::AggregateInstance(instance.clone()));
        unsafe { *cell = id };
        instance
    } else {
        instance_of(slot.registry(), id)
    };

    let args = unsafe { DatabaseValue::from_raw_args(argc, argv) };
    let result = instance.lock().step(&args);
    if let Err(error) = result {
        unsafe { report_error(context, error.as_ref()) };
    }
}

pub(crate) unsafe extern "C" fn finalize_aggregate(context: *mut ffi::sqlite3_context) {
    let slot = unsafe { ExtensionRegistry::slot(ffi::sqlite3_user_data(context)) };
    let cell = unsafe { ffi::sqlite3_aggregate_context(context, 0) as *mut HandleId };
    let id = if cell.is_null() { 0 } else { unsafe { *cell } };

    let result = if id == 0 {
        // no rows: finalize a fresh accumulator
        let factory = factory_of(slot);
        factory().finalize()
    } else {
        let instance = match slot.registry().remove(id) {
            Extension::AggregateInstance(instance) => instance,
            other => panic!("handle {} is a {}, expected an aggregate instance", id, other.kind()),
        };
        unsafe { *cell = 0 };
        let mut instance = instance.lock();
        instance.finalize()
    };

    match result {
        Ok(value) => unsafe { value.set_result(context) },
        Err(error) => unsafe { report_error(context, error.as_ref()) },
    }
}
