use log::debug;
use wasmtime::{Config, Engine};

use crate::{delete, handle_result, wb_error_t};

/// Engine settings passed by value across the ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct wb_config_t {
    /// Enable instruction fuel metering on every store of this engine.
    pub consume_fuel: bool,
    /// Canonicalize NaN results of float operations.
    pub nan_canonicalization: bool,
    /// Maximum native stack in bytes a guest may consume; 0 keeps the default.
    pub max_wasm_stack: usize,
}

impl Default for wb_config_t {
    fn default() -> Self {
        Self {
            consume_fuel: false,
            nan_canonicalization: false,
            max_wasm_stack: 0,
        }
    }
}

pub struct wb_engine_t {
    pub(crate) engine: Engine,
}

fn create_engine(config: &wb_config_t) -> anyhow::Result<Engine> {
    let mut wasm_config = Config::new();
    wasm_config.consume_fuel(config.consume_fuel);
    wasm_config.cranelift_nan_canonicalization(config.nan_canonicalization);
    if config.max_wasm_stack > 0 {
        wasm_config.max_wasm_stack(config.max_wasm_stack);
    }
    Engine::new(&wasm_config)
}

/// Create an engine. A null `config` selects [`wb_config_t::default`].
#[no_mangle]
pub unsafe extern "C" fn wb_engine_new(
    config: *const wb_config_t,
    out: *mut *mut wb_engine_t,
) -> *mut wb_error_t {
    let config = config.as_ref().copied().unwrap_or_default();
    debug!("wb_engine_new: {:?}", config);
    handle_result(create_engine(&config), |engine| {
        *out = Box::into_raw(Box::new(wb_engine_t { engine }));
    })
}

#[no_mangle]
pub unsafe extern "C" fn wb_engine_delete(engine: *mut wb_engine_t) {
    delete(engine);
}
