//! Host-side implementations of guest import interfaces.
//!
//! An interface is a list of [`ImportMethod`]s. [`BindingTable::resolve`]
//! looks every method's symbol up in an instance once, eagerly, so a missing
//! export, an export whose signature disagrees with the method, or two
//! methods fighting over one symbol fail at construction. The
//! [`wasm_imports!`](crate::wasm_imports) macro generates a struct with one
//! typed method per interface entry, each dispatching through the table.
//!
//! ```ignore
//! wasm_imports! {
//!     pub struct Math {
//!         fn add_i32(a: i32, b: i32) -> i32;
//!         fn sum(a: i64, b: i64) -> i64 = "add_i64";
//!         fn reset();
//!     }
//! }
//!
//! let math = Math::bind(&instance, &mut store)?;
//! assert_eq!(math.add_i32(&mut store, 3, 2)?, 5);
//! ```

use std::collections::HashMap;

use log::debug;

use crate::error::BridgeError;
use crate::func::Function;
use crate::instance::Instance;
use crate::store::Store;
use crate::types::{describe, ValKind};

/// One interface method and the guest symbol that implements it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportMethod {
    name: &'static str,
    symbol: Option<&'static str>,
    kinds: Option<(&'static [ValKind], Option<ValKind>)>,
}

impl ImportMethod {
    /// A method bound to the export of the same name, with any signature.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            symbol: None,
            kinds: None,
        }
    }

    /// Bind to `symbol` instead of the method name.
    pub const fn with_symbol(self, symbol: &'static str) -> Self {
        Self {
            symbol: Some(symbol),
            ..self
        }
    }

    /// Require the export to take `params` and return `result`.
    pub const fn with_kinds(self, params: &'static [ValKind], result: Option<ValKind>) -> Self {
        Self {
            kinds: Some((params, result)),
            ..self
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn symbol(&self) -> &'static str {
        match self.symbol {
            Some(symbol) => symbol,
            None => self.name,
        }
    }

    /// Declared parameter kinds, when the method carries a signature.
    pub fn params(&self) -> Option<&'static [ValKind]> {
        self.kinds.map(|(params, _)| params)
    }

    /// Declared result kind, when the method carries a signature.
    pub fn result(&self) -> Option<Option<ValKind>> {
        self.kinds.map(|(_, result)| result)
    }

    fn check(&self, function: &Function) -> Result<(), BridgeError> {
        let Some((params, result)) = self.kinds else {
            return Ok(());
        };
        let ty = function.ty();
        if ty.params() != params || ty.result() != result {
            return Err(BridgeError::TypeMismatch(format!(
                "method `{}` is declared {:?} -> {}, but `{}` is {:?} -> {}",
                self.name,
                params,
                describe(result),
                self.symbol(),
                ty.params(),
                describe(ty.result())
            )));
        }
        Ok(())
    }
}

/// Method name to resolved guest function, fixed at construction.
#[derive(Debug)]
pub struct BindingTable {
    entries: HashMap<&'static str, Function>,
}

impl BindingTable {
    /// Resolve every method of an interface against `instance`.
    pub fn resolve(
        instance: &Instance,
        store: &mut Store,
        methods: &[ImportMethod],
    ) -> Result<Self, BridgeError> {
        let mut symbols: HashMap<&'static str, &'static str> = HashMap::new();
        for method in methods {
            if symbols.values().any(|name| *name == method.name()) {
                return Err(BridgeError::AmbiguousBinding(format!(
                    "method `{}` is declared twice",
                    method.name()
                )));
            }
            if let Some(other) = symbols.insert(method.symbol(), method.name()) {
                return Err(BridgeError::AmbiguousBinding(format!(
                    "methods `{}` and `{}` both bind `{}`",
                    other,
                    method.name(),
                    method.symbol()
                )));
            }
        }

        let mut entries = HashMap::with_capacity(methods.len());
        for method in methods {
            let function = instance
                .get_function(store, method.symbol())?
                .ok_or_else(|| BridgeError::UnresolvedImport(method.symbol().to_string()))?;
            method.check(&function)?;
            debug!(
                "bound {} -> {} {:?}",
                method.name(),
                method.symbol(),
                function.ty()
            );
            entries.insert(method.name(), function);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, method: &str) -> Result<&Function, BridgeError> {
        self.entries
            .get(method)
            .ok_or_else(|| BridgeError::UnresolvedImport(method.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A generated import interface bound to one instance.
pub trait WasmImports<'i>: Sized {
    const METHODS: &'static [ImportMethod];

    fn bind(instance: &'i Instance, store: &mut Store) -> Result<Self, BridgeError>;
}

/// Declare an import interface and generate its [`WasmImports`] binding.
///
/// Each method becomes `fn(&self, &mut Store, args..) -> Result<ret, BridgeError>`.
/// `= "symbol"` binds a method to an export with another name. Binding
/// fails with `TypeMismatch` when an export's kinds differ from the method's.
#[macro_export]
macro_rules! wasm_imports {
    (@ret) => { () };
    (@ret $ret:ty) => { $ret };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                fn $method:ident ( $($arg:ident : $argty:ty),* $(,)? ) $(-> $ret:ty)? $(= $symbol:literal)? ;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis struct $name<'i> {
            instance: &'i $crate::Instance,
            table: $crate::BindingTable,
        }

        impl<'i> $crate::WasmImports<'i> for $name<'i> {
            const METHODS: &'static [$crate::ImportMethod] = &[
                $({
                    const PARAMS: &[$crate::ValKind] = &[$(<$argty as $crate::WasmScalar>::KIND),*];
                    $crate::ImportMethod::new(stringify!($method))
                        $(.with_symbol($symbol))?
                        .with_kinds(
                            PARAMS,
                            <$crate::wasm_imports!(@ret $($ret)?) as $crate::WasmResult>::RESULT_KIND,
                        )
                },)*
            ];

            fn bind(
                instance: &'i $crate::Instance,
                store: &mut $crate::Store,
            ) -> ::std::result::Result<Self, $crate::BridgeError> {
                let table = $crate::BindingTable::resolve(instance, store, Self::METHODS)?;
                Ok(Self { instance, table })
            }
        }

        impl<'i> $name<'i> {
            $(
                #[allow(dead_code)]
                pub fn $method(
                    &self,
                    store: &mut $crate::Store,
                    $($arg: $argty),*
                ) -> ::std::result::Result<$crate::wasm_imports!(@ret $($ret)?), $crate::BridgeError> {
                    self.table
                        .get(stringify!($method))?
                        .call_typed(self.instance, store, ($($arg,)*))
                }
            )*
        }
    };
}
