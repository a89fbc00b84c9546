//! Shared test helpers for integration tests.
//!
//! Provides the guest modules (in WebAssembly text, compiled by the engine)
//! and engine/store/instance factories used across all integration test files.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use wasmbridge::{BridgeConfig, Engine, Function, Instance, Store};

// ── Guest Modules ──

/// Imports `hello::world` and exports `hello`, which calls it once.
pub const HELLO_WAT: &str = r#"
(module
  (import "hello" "world" (func $world))
  (func (export "hello")
    call $world))
"#;

/// Pure arithmetic exports, one per value kind.
pub const MATH_WAT: &str = r#"
(module
  (func (export "add_i32") (param i32 i32) (result i32)
    local.get 0
    local.get 1
    i32.add)
  (func (export "add_i64") (param i64 i64) (result i64)
    local.get 0
    local.get 1
    i64.add)
  (func (export "mul_f32") (param f32 f32) (result f32)
    local.get 0
    local.get 1
    f32.mul)
  (func (export "add_f64") (param f64 f64) (result f64)
    local.get 0
    local.get 1
    f64.add)
  (func (export "xor_v128") (param v128 v128) (result v128)
    local.get 0
    local.get 1
    v128.xor)
  (func (export "nop")))
"#;

/// Exports `call_host`, which forwards its argument to the `host::check`
/// import and returns the result.
pub const TRAP_WAT: &str = r#"
(module
  (import "host" "check" (func $check (param i32) (result i32)))
  (func (export "call_host") (param i32) (result i32)
    local.get 0
    call $check))
"#;

/// A guest with the byte allocator protocol: a bump `__alloc_bytes`, a
/// no-op `__dealloc_bytes`, and `sum_bytes` over a `(ptr, len)` slice.
pub const ALLOC_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (global $next (mut i32) (i32.const 1024))
  (func (export "__alloc_bytes") (param $len i32) (result i32)
    (local $ptr i32)
    global.get $next
    local.set $ptr
    global.get $next
    local.get $len
    i32.add
    global.set $next
    local.get $ptr)
  (func (export "__dealloc_bytes") (param i32 i32))
  (func (export "sum_bytes") (param $ptr i32) (param $len i32) (result i32)
    (local $acc i32)
    (block $done
      (loop $step
        local.get $len
        i32.eqz
        br_if $done
        local.get $acc
        local.get $ptr
        i32.load8_u
        i32.add
        local.set $acc
        local.get $ptr
        i32.const 1
        i32.add
        local.set $ptr
        local.get $len
        i32.const 1
        i32.sub
        local.set $len
        br $step))
    local.get $acc))
"#;

/// Passes a `(ptr, len)` string from its data segment to `env::log`.
pub const LOG_WAT: &str = r#"
(module
  (import "env" "log" (func $log (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "hello from guest")
  (func (export "greet")
    i32.const 16
    i32.const 16
    call $log))
"#;

/// `spin` never returns; `answer` returns 42.
pub const SPIN_WAT: &str = r#"
(module
  (func (export "spin")
    (loop $forever
      br $forever))
  (func (export "answer") (result i32)
    i32.const 42))
"#;

// ── Factories ──

/// Engine with default configuration. Installs the test logger once.
pub fn engine() -> Engine {
    engine_with(BridgeConfig::default())
}

pub fn engine_with(config: BridgeConfig) -> Engine {
    let _ = env_logger::builder().is_test(true).try_init();
    Engine::new(config).unwrap()
}

/// Compile `wat` and instantiate it with no host imports.
pub fn instantiate(engine: &Engine, store: &mut Store, wat: &str) -> Instance {
    let module = engine.compile(wat.as_bytes()).unwrap();
    let mut linker = engine.new_linker().unwrap();
    linker.instantiate(store, &module).unwrap()
}

/// A `() -> ()` host function that counts its calls.
pub fn counting_function(store: &mut Store) -> (Function, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let function = Function::wrap(store, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    (function, calls)
}

pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
