//! `wasmbridge`: host-side ownership, thread confinement and function
//! marshaling over the `wasmbridge-abi` engine interface.
//!
//! Architecture:
//! - `handle`: single-owner wrapper around one engine pointer and its release
//! - `engine` / `store` / `module` / `linker` / `instance`: the resource graph
//! - `confinement`: per-thread store registry
//! - `types`: value kinds, tagged values, signature validation
//! - `func`: host closures as guest functions and guest exports as host calls
//! - `proxy`: eagerly bound import interfaces (`wasm_imports!`)
//! - `memory`: linear memory views and the guest allocator protocol
//!
//! ```ignore
//! let engine = Engine::new(BridgeConfig::default())?;
//! let mut store = engine.new_store()?;
//! let module = engine.compile(wat.as_bytes())?;
//! let mut linker = engine.new_linker()?;
//! let hello = Function::wrap(&mut store, || println!("hello"))?;
//! linker.define_function(&mut store, "hello", "world", &hello)?;
//! let instance = linker.instantiate(&mut store, &module)?;
//! ```

pub mod config;
pub mod confinement;
pub mod engine;
pub mod error;
pub mod func;
pub mod handle;
pub mod instance;
pub mod linker;
pub mod memory;
pub mod module;
pub mod proxy;
pub mod store;
pub mod types;

pub use config::BridgeConfig;
pub use confinement::ConfinementRegistry;
pub use engine::Engine;
pub use error::BridgeError;
pub use func::{Direction, Function, HostContext, IntoHostFunction};
pub use handle::Handle;
pub use instance::Instance;
pub use linker::{Exportable, FunctionDef, Linker};
pub use memory::{GuestAllocator, GuestSlice, Memory};
pub use module::Module;
pub use proxy::{BindingTable, ImportMethod, WasmImports};
pub use store::Store;
pub use types::{
    FuncType, HostReturn, HostType, Signature, Val, ValKind, WasmParams, WasmResult, WasmScalar,
};
