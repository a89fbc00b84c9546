//! Function marshaling in both directions.
//!
//! Export direction: [`Function::new`] and [`Function::wrap`] turn a host
//! closure into an engine function the guest can import. The engine calls
//! back through a trampoline that marshals arguments, runs the closure and
//! turns any error or panic into a trap.
//!
//! Import direction: [`Instance::get_function`] resolves a guest export, and
//! [`Function::call`] / [`Function::call_typed`] invoke it from the host.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use anyhow::{anyhow, bail};
use log::{trace, warn};
use wasmbridge_abi::{
    wb_caller_memory, wb_caller_t, wb_error_new, wb_error_t, wb_func_call, wb_func_delete,
    wb_func_new, wb_func_t, wb_val_t,
};

use crate::error::{check, BridgeError};
use crate::handle::Handle;
use crate::instance::Instance;
use crate::memory::MEMORY_EXPORT;
use crate::store::Store;
use crate::types::{
    describe, FuncType, HostReturn, Signature, Val, ValKind, WasmParams, WasmResult, WasmScalar,
};

/// Which side of the bridge implements the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// A host closure callable by the guest.
    Export,
    /// A guest export callable by the host.
    Import,
}

/// A bridged function, associated with the store it was created or resolved in.
#[derive(Debug)]
pub struct Function {
    handle: Handle<wb_func_t>,
    ty: FuncType,
    store_id: usize,
    direction: Direction,
}

type HostFn = dyn Fn(&mut HostContext<'_>, &[Val]) -> anyhow::Result<Option<Val>> + Send + Sync;

/// State behind each host function, owned by the engine store and freed by
/// [`finalize`].
struct HostEnv {
    ty: FuncType,
    method: Box<HostFn>,
}

/// What a host closure sees of the call in progress.
pub struct HostContext<'a> {
    caller: *mut wb_caller_t<'a>,
}

impl HostContext<'_> {
    /// The calling guest's `memory` export, viewed in place.
    pub fn memory(&mut self) -> Option<&mut [u8]> {
        self.memory_named(MEMORY_EXPORT)
    }

    /// The linear memory exported as `name` by the calling guest, or by the
    /// instance the host passed to [`Function::call`].
    pub fn memory_named(&mut self, name: &str) -> Option<&mut [u8]> {
        let mut data = ptr::null_mut();
        let mut size = 0;
        let found =
            unsafe { wb_caller_memory(self.caller, name.as_ptr(), name.len(), &mut data, &mut size) };
        if !found {
            return None;
        }
        if size == 0 {
            return Some(&mut []);
        }
        Some(unsafe { std::slice::from_raw_parts_mut(data, size) })
    }
}

impl Function {
    /// Bridge a host closure with the given signature descriptor.
    ///
    /// The signature is validated up front; a type outside the closed kind
    /// set fails with `UnsupportedType` naming its position.
    pub fn new<F>(store: &mut Store, signature: &Signature, method: F) -> Result<Self, BridgeError>
    where
        F: Fn(&mut HostContext<'_>, &[Val]) -> anyhow::Result<Option<Val>> + Send + Sync + 'static,
    {
        let ty = FuncType::from_signature(signature)?;
        Self::from_host(store, ty, Box::new(method))
    }

    /// Bridge a typed host closure; its signature comes from its parameter
    /// and return types.
    pub fn wrap<P, R>(store: &mut Store, func: impl IntoHostFunction<P, R>) -> Result<Self, BridgeError> {
        let (ty, method) = func.into_host_function();
        Self::from_host(store, ty, method)
    }

    fn from_host(store: &mut Store, ty: FuncType, method: Box<HostFn>) -> Result<Self, BridgeError> {
        let raw_store = store.raw()?;
        let params = ty.params().iter().map(|k| k.to_raw()).collect::<Vec<_>>();
        let results = ty.result().iter().map(|k| k.to_raw()).collect::<Vec<_>>();
        let env = Box::into_raw(Box::new(HostEnv {
            ty: ty.clone(),
            method,
        }));

        // From here the engine owns `env`, finalizing it on failure too.
        let mut raw = ptr::null_mut();
        unsafe {
            check(
                wb_func_new(
                    raw_store,
                    params.as_ptr(),
                    params.len(),
                    results.as_ptr(),
                    results.len(),
                    trampoline,
                    env.cast::<c_void>(),
                    Some(finalize),
                    &mut raw,
                ),
                BridgeError::LinkError,
            )?;
        }
        let handle = unsafe { Handle::acquire(raw, wb_func_delete, "function")? };
        Ok(Self::from_handle(handle, ty, store, Direction::Export))
    }

    pub(crate) fn from_handle(
        handle: Handle<wb_func_t>,
        ty: FuncType,
        store: &Store,
        direction: Direction,
    ) -> Self {
        Self {
            handle,
            ty,
            store_id: store.id(),
            direction,
        }
    }

    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn raw(&self) -> Result<*mut wb_func_t, BridgeError> {
        self.handle.access()
    }

    pub(crate) fn check_store(&self, store: &Store) -> Result<(), BridgeError> {
        if store.id() != self.store_id {
            return Err(BridgeError::StoreMismatch(format!(
                "function belongs to store {:#x}, used with store {:#x}",
                self.store_id,
                store.id()
            )));
        }
        Ok(())
    }

    /// Call with tagged arguments.
    ///
    /// `expected` must match the function's result kind, and the value the
    /// engine produces must match it too; otherwise `TypeMismatch`. A trap
    /// fails with `EngineTrap` and leaves the store usable.
    pub fn call(
        &self,
        instance: &Instance,
        store: &mut Store,
        expected: Option<ValKind>,
        args: &[Val],
    ) -> Result<Option<Val>, BridgeError> {
        instance.check_store(store)?;
        self.invoke(Some(instance), store, expected, args)
    }

    /// Call with a tuple of scalars, returning a scalar or `()`.
    pub fn call_typed<P, R>(&self, instance: &Instance, store: &mut Store, params: P) -> Result<R, BridgeError>
    where
        P: WasmParams,
        R: WasmResult,
    {
        let kinds = P::kinds();
        if kinds != self.ty.params() {
            return Err(BridgeError::TypeMismatch(format!(
                "function takes {:?}, called with {:?}",
                self.ty.params(),
                kinds
            )));
        }
        let out = self.call(instance, store, R::kind(), &params.into_vals())?;
        R::from_result(out).ok_or_else(|| {
            BridgeError::TypeMismatch(format!("result does not convert to {}", describe(R::kind())))
        })
    }

    /// Call without an instance. Host closures see no fallback memory.
    pub fn call_unbound(
        &self,
        store: &mut Store,
        expected: Option<ValKind>,
        args: &[Val],
    ) -> Result<Option<Val>, BridgeError> {
        self.invoke(None, store, expected, args)
    }

    fn invoke(
        &self,
        instance: Option<&Instance>,
        store: &mut Store,
        expected: Option<ValKind>,
        args: &[Val],
    ) -> Result<Option<Val>, BridgeError> {
        self.check_store(store)?;
        self.ty.check_result(expected)?;
        self.ty.check_args(args)?;

        let raw_args = args.iter().map(|v| v.to_raw()).collect::<Vec<_>>();
        let mut results = vec![wb_val_t::default(); self.ty.result().iter().count()];
        let raw_instance = match instance {
            Some(instance) => instance.raw()?.cast_const(),
            None => ptr::null(),
        };
        trace!("call {:?} {:?} with {:?}", self.direction, self.ty, args);

        unsafe {
            check(
                wb_func_call(
                    self.raw()?,
                    raw_instance,
                    store.raw()?,
                    raw_args.as_ptr(),
                    raw_args.len(),
                    results.as_mut_ptr(),
                    results.len(),
                ),
                BridgeError::EngineTrap,
            )?;
        }

        let out = results.first().map(Val::from_raw).transpose()?;
        let actual = out.as_ref().map(Val::kind);
        if actual != expected {
            return Err(BridgeError::TypeMismatch(format!(
                "call produced {}, expected {}",
                describe(actual),
                describe(expected)
            )));
        }
        Ok(out)
    }
}

extern "C" fn trampoline(
    env: *mut c_void,
    caller: *mut wb_caller_t<'_>,
    args: *const wb_val_t,
    nargs: usize,
    results: *mut wb_val_t,
    nresults: usize,
) -> *mut wb_error_t {
    let env = unsafe { &*env.cast::<HostEnv>() };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        run_host(env, caller, args, nargs, results, nresults)
    }));
    let message = match outcome {
        Ok(Ok(())) => return ptr::null_mut(),
        Ok(Err(e)) => format!("{:#}", e),
        Err(panic) => {
            let msg = if let Some(msg) = panic.downcast_ref::<String>() {
                msg.as_str()
            } else if let Some(msg) = panic.downcast_ref::<&'static str>() {
                msg
            } else {
                "host function panicked"
            };
            format!("host function panicked: {}", msg)
        }
    };
    warn!("host function failed, raising trap: {}", message);
    unsafe { wb_error_new(message.as_ptr(), message.len()) }
}

unsafe fn run_host(
    env: &HostEnv,
    caller: *mut wb_caller_t<'_>,
    args: *const wb_val_t,
    nargs: usize,
    results: *mut wb_val_t,
    nresults: usize,
) -> anyhow::Result<()> {
    let raw_args = if nargs == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(args, nargs)
    };
    let args = raw_args
        .iter()
        .map(Val::from_raw)
        .collect::<Result<Vec<_>, _>>()?;
    env.ty.check_args(&args)?;

    let mut ctx = HostContext { caller };
    let ret = (env.method)(&mut ctx, &args)?;

    match (ret, env.ty.result()) {
        (None, None) => Ok(()),
        (Some(val), Some(kind)) if val.kind() == kind && nresults == 1 => {
            *results = val.to_raw();
            Ok(())
        }
        (ret, kind) => bail!(BridgeError::TypeMismatch(format!(
            "host function returned {}, declared {}",
            describe(ret.map(|v| v.kind())),
            describe(kind)
        ))),
    }
}

extern "C" fn finalize(env: *mut c_void) {
    drop(unsafe { Box::from_raw(env.cast::<HostEnv>()) });
}

/// A typed host closure that can be bridged with [`Function::wrap`].
///
/// Implemented for `Fn(A1, .., An) -> R` where every `Ai` is a
/// [`WasmScalar`] and `R` is a [`HostReturn`].
pub trait IntoHostFunction<P, R>: Send + Sync + 'static {
    fn into_host_function(self) -> (FuncType, Box<HostFn>);
}

macro_rules! into_host_function {
    ($($arg:ident)*) => {
        impl<F, R, $($arg,)*> IntoHostFunction<($($arg,)*), R> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: HostReturn,
            $($arg: WasmScalar,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_host_function(self) -> (FuncType, Box<HostFn>) {
                let ty = FuncType::new(
                    vec![$($arg::KIND),*],
                    <R::Output as WasmResult>::kind(),
                );
                let method = move |_: &mut HostContext<'_>, args: &[Val]| -> anyhow::Result<Option<Val>> {
                    let mut args = args.iter();
                    $(
                        let $arg = args
                            .next()
                            .and_then($arg::from_val)
                            .ok_or_else(|| anyhow!("argument does not match {}", $arg::KIND))?;
                    )*
                    let out = self($($arg),*).into_host_result()?;
                    Ok(out.into_result())
                };
                (ty, Box::new(method))
            }
        }
    };
}

into_host_function!();
into_host_function!(A1);
into_host_function!(A1 A2);
into_host_function!(A1 A2 A3);
into_host_function!(A1 A2 A3 A4);
