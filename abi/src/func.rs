use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};

use anyhow::{anyhow, Result};
use log::{debug, trace};
use wasmtime::{Caller, Func, FuncType, Store, Val};

use crate::val::{from_valtype, into_valtype};
use crate::{
    delete, handle_result, slice_from_raw_parts, slice_from_raw_parts_mut, str_from_raw_parts,
    wb_error_t, wb_instance_t, wb_store_t, wb_val_t, wb_valkind_t, wb_valkind_vec_t, ForeignData,
    StoreData,
};

pub struct wb_func_t {
    pub(crate) func: Func,
}

/// The calling context handed to a host callback.
pub struct wb_caller_t<'a> {
    pub(crate) caller: Caller<'a, StoreData>,
}

/// Host callback invoked when guest (or host) code calls a function created
/// by [`wb_func_new`]. Returning a non-null error raises a trap carrying it.
pub type wb_func_callback_t = extern "C" fn(
    env: *mut c_void,
    caller: *mut wb_caller_t<'_>,
    args: *const wb_val_t,
    nargs: usize,
    results: *mut wb_val_t,
    nresults: usize,
) -> *mut wb_error_t;

/// Create a host function in `store` with the given parameter and result
/// kinds.
///
/// `env` is passed to every invocation of `callback` and handed to
/// `finalizer` when the store is deleted. If this call fails the finalizer
/// has already run.
#[no_mangle]
pub unsafe extern "C" fn wb_func_new(
    store: *mut wb_store_t,
    params: *const wb_valkind_t,
    nparams: usize,
    results: *const wb_valkind_t,
    nresults: usize,
    callback: wb_func_callback_t,
    env: *mut c_void,
    finalizer: Option<extern "C" fn(*mut c_void)>,
    out: *mut *mut wb_func_t,
) -> *mut wb_error_t {
    let env = ForeignData {
        data: env,
        finalizer,
    };
    let store = &mut (*store).store;
    let params = slice_from_raw_parts(params, nparams);
    let results = slice_from_raw_parts(results, nresults);

    let ty = params
        .iter()
        .map(|k| into_valtype(*k))
        .collect::<Result<Vec<_>>>()
        .and_then(|params| {
            let results = results
                .iter()
                .map(|k| into_valtype(*k))
                .collect::<Result<Vec<_>>>()?;
            Ok(FuncType::new(store.engine(), params, results))
        });
    let ty = match ty {
        Ok(ty) => ty,
        Err(err) => return wb_error_t::into_raw(err),
    };
    debug!("wb_func_new: {:?}", ty);

    let func = Func::new(&mut *store, ty, move |caller, params, results| {
        // Move the whole `ForeignData` in so the finalizer runs with the store.
        let _ = &env;
        let args = params
            .iter()
            .map(wb_val_t::from_val)
            .collect::<Result<Vec<_>>>()?;
        let mut out = vec![wb_val_t::default(); results.len()];
        let mut caller = wb_caller_t { caller };
        let trap = callback(
            env.data,
            &mut caller,
            args.as_ptr(),
            args.len(),
            out.as_mut_ptr(),
            out.len(),
        );
        if !trap.is_null() {
            let trap = unsafe { Box::from_raw(trap) };
            return Err(trap.error);
        }
        for (slot, val) in results.iter_mut().zip(out.iter()) {
            *slot = val.to_val()?;
        }
        Ok(())
    });

    *out = Box::into_raw(Box::new(wb_func_t { func }));
    std::ptr::null_mut()
}

/// Call `func` with `args`, writing `nresults` values to `results`.
///
/// `instance`, when non-null, is made available to host callbacks that run
/// as a direct result of this call. Traps and panics are reported as errors.
#[no_mangle]
pub unsafe extern "C" fn wb_func_call(
    func: *const wb_func_t,
    instance: *const wb_instance_t,
    store: *mut wb_store_t,
    args: *const wb_val_t,
    nargs: usize,
    results: *mut wb_val_t,
    nresults: usize,
) -> *mut wb_error_t {
    let func = (*func).func;
    let store = &mut (*store).store;
    let instance = instance.as_ref().map(|i| i.instance);
    let args = slice_from_raw_parts(args, nargs);
    let results = slice_from_raw_parts_mut(results, nresults);
    trace!("wb_func_call: {} args, {} results", nargs, nresults);

    let previous = std::mem::replace(&mut store.data_mut().instance, instance);
    let result = panic::catch_unwind(AssertUnwindSafe(|| call(func, store, args, results)));
    store.data_mut().instance = previous;

    let result = match result {
        Ok(result) => result,
        Err(panic) => {
            let msg = if let Some(msg) = panic.downcast_ref::<String>() {
                msg.clone()
            } else if let Some(msg) = panic.downcast_ref::<&'static str>() {
                msg.to_string()
            } else {
                "rust panic happened".to_string()
            };
            Err(anyhow!(msg))
        }
    };
    handle_result(result, |()| {})
}

fn call(
    func: Func,
    store: &mut Store<StoreData>,
    args: &[wb_val_t],
    results: &mut [wb_val_t],
) -> Result<()> {
    let params = args.iter().map(wb_val_t::to_val).collect::<Result<Vec<_>>>()?;
    let mut out = vec![Val::I32(0); results.len()];
    func.call(&mut *store, &params, &mut out)?;
    for (slot, val) in results.iter_mut().zip(out.iter()) {
        *slot = wb_val_t::from_val(val)?;
    }
    Ok(())
}

/// Write the parameter kinds of `func` into `out`.
#[no_mangle]
pub unsafe extern "C" fn wb_func_params(
    func: *const wb_func_t,
    store: *const wb_store_t,
    out: *mut wb_valkind_vec_t,
) {
    let ty = (*func).func.ty(&(*store).store);
    let kinds = ty.params().map(|t| from_valtype(&t)).collect::<Vec<_>>();
    std::ptr::write(out, wb_valkind_vec_t::from(kinds));
}

/// Write the result kinds of `func` into `out`.
#[no_mangle]
pub unsafe extern "C" fn wb_func_results(
    func: *const wb_func_t,
    store: *const wb_store_t,
    out: *mut wb_valkind_vec_t,
) {
    let ty = (*func).func.ty(&(*store).store);
    let kinds = ty.results().map(|t| from_valtype(&t)).collect::<Vec<_>>();
    std::ptr::write(out, wb_valkind_vec_t::from(kinds));
}

#[no_mangle]
pub unsafe extern "C" fn wb_func_delete(func: *mut wb_func_t) {
    delete(func);
}

/// Locate the memory export `name` visible to the current call: the calling
/// guest instance's export, else the instance supplied to [`wb_func_call`].
///
/// Writes the base address and byte size and returns true when found.
#[no_mangle]
pub unsafe extern "C" fn wb_caller_memory(
    caller: *mut wb_caller_t<'_>,
    name: *const u8,
    name_len: usize,
    data: *mut *mut u8,
    size: *mut usize,
) -> bool {
    let caller = &mut (*caller).caller;
    let Ok(name) = str_from_raw_parts(name, name_len) else {
        return false;
    };
    let memory = match caller.get_export(name) {
        Some(export) => export.into_memory(),
        None => {
            let instance = caller.data().instance;
            instance.and_then(|instance| instance.get_memory(&mut *caller, name))
        }
    };
    match memory {
        Some(memory) => {
            *data = memory.data_ptr(&*caller);
            *size = memory.data_size(&*caller);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{wb_engine_delete, wb_engine_new, wb_error_message, wb_store_delete, wb_store_new};
    use crate::{wb_byte_vec_t, wb_error_delete, WB_I32};
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    extern "C" fn add(
        _env: *mut c_void,
        _caller: *mut wb_caller_t<'_>,
        args: *const wb_val_t,
        nargs: usize,
        results: *mut wb_val_t,
        _nresults: usize,
    ) -> *mut wb_error_t {
        let args = unsafe { std::slice::from_raw_parts(args, nargs) };
        let sum = unsafe { args[0].of.i32 + args[1].of.i32 };
        unsafe { *results = wb_val_t::from_val(&Val::I32(sum)).unwrap() };
        ptr::null_mut()
    }

    extern "C" fn fail(
        _env: *mut c_void,
        _caller: *mut wb_caller_t<'_>,
        _args: *const wb_val_t,
        _nargs: usize,
        _results: *mut wb_val_t,
        _nresults: usize,
    ) -> *mut wb_error_t {
        let msg = b"host refused";
        unsafe { crate::wb_error_new(msg.as_ptr(), msg.len()) }
    }

    unsafe fn new_func(store: *mut wb_store_t, callback: wb_func_callback_t) -> *mut wb_func_t {
        let kinds = [WB_I32, WB_I32];
        let mut func = ptr::null_mut();
        let err = wb_func_new(
            store,
            kinds.as_ptr(),
            2,
            kinds.as_ptr(),
            1,
            callback,
            ptr::null_mut(),
            None,
            &mut func,
        );
        assert!(err.is_null());
        func
    }

    #[test]
    fn test_host_callback_round_trip() {
        unsafe {
            let mut engine = ptr::null_mut();
            assert!(wb_engine_new(ptr::null(), &mut engine).is_null());
            let store = wb_store_new(engine);
            let func = new_func(store, add);

            let args = [
                wb_val_t::from_val(&Val::I32(3)).unwrap(),
                wb_val_t::from_val(&Val::I32(2)).unwrap(),
            ];
            let mut results = [wb_val_t::default()];
            let err = wb_func_call(func, ptr::null(), store, args.as_ptr(), 2, results.as_mut_ptr(), 1);
            assert!(err.is_null());
            assert_eq!(results[0].of.i32, 5);

            let mut params = wb_valkind_vec_t::empty();
            wb_func_params(func, store, &mut params);
            assert_eq!(params.as_slice(), &[WB_I32, WB_I32]);

            wb_func_delete(func);
            wb_store_delete(store);
            wb_engine_delete(engine);
        }
    }

    #[test]
    fn test_callback_error_becomes_trap() {
        unsafe {
            let mut engine = ptr::null_mut();
            assert!(wb_engine_new(ptr::null(), &mut engine).is_null());
            let store = wb_store_new(engine);
            let func = new_func(store, fail);

            let args = [wb_val_t::default(), wb_val_t::default()];
            let mut results = [wb_val_t::default()];
            let err = wb_func_call(func, ptr::null(), store, args.as_ptr(), 2, results.as_mut_ptr(), 1);
            assert!(!err.is_null());

            let mut message = wb_byte_vec_t::empty();
            wb_error_message(err, &mut message);
            let text = String::from_utf8_lossy(message.as_slice()).into_owned();
            assert!(text.contains("host refused"), "{}", text);
            wb_error_delete(err);

            wb_func_delete(func);
            wb_store_delete(store);
            wb_engine_delete(engine);
        }
    }

    extern "C" fn count_finalize(env: *mut c_void) {
        let count = unsafe { &*(env as *const AtomicUsize) };
        count.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_env_finalized_with_store() {
        let finalized = AtomicUsize::new(0);
        unsafe {
            let mut engine = ptr::null_mut();
            assert!(wb_engine_new(ptr::null(), &mut engine).is_null());
            let store = wb_store_new(engine);
            let kinds = [WB_I32, WB_I32];
            let mut func = ptr::null_mut();
            let err = wb_func_new(
                store,
                kinds.as_ptr(),
                2,
                kinds.as_ptr(),
                1,
                add,
                &finalized as *const AtomicUsize as *mut c_void,
                Some(count_finalize),
                &mut func,
            );
            assert!(err.is_null());
            assert_eq!(finalized.load(Ordering::SeqCst), 0);

            let args = [
                wb_val_t::from_val(&Val::I32(4)).unwrap(),
                wb_val_t::from_val(&Val::I32(5)).unwrap(),
            ];
            let mut results = [wb_val_t::default()];
            let err = wb_func_call(func, ptr::null(), store, args.as_ptr(), 2, results.as_mut_ptr(), 1);
            assert!(err.is_null());
            assert_eq!(results[0].of.i32, 9);

            wb_func_delete(func);
            assert_eq!(finalized.load(Ordering::SeqCst), 0);
            wb_store_delete(store);
            assert_eq!(finalized.load(Ordering::SeqCst), 1);
            wb_engine_delete(engine);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        unsafe {
            let mut engine = ptr::null_mut();
            assert!(wb_engine_new(ptr::null(), &mut engine).is_null());
            let store = wb_store_new(engine);
            let kinds = [crate::WB_OPAQUE];
            let mut func = ptr::null_mut();
            let err = wb_func_new(store, kinds.as_ptr(), 1, ptr::null(), 0, add, ptr::null_mut(), None, &mut func);
            assert!(!err.is_null());
            assert!(func.is_null());
            wb_error_delete(err);
            wb_store_delete(store);
            wb_engine_delete(engine);
        }
    }
}
