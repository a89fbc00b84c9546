//! Bridge configuration.

use wasmbridge_abi::wb_config_t;

/// Configuration for an [`Engine`](crate::Engine) and the stores and linkers
/// it creates.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Enable instruction fuel metering.
    /// A guest that runs out of fuel traps.
    pub consume_fuel: bool,

    /// Fuel given to every new store when `consume_fuel` is set.
    /// Default: 100 million instructions.
    pub fuel_limit: u64,

    /// Maximum native stack a guest may use, in bytes.
    /// `None` keeps the engine default.
    pub max_wasm_stack: Option<usize>,

    /// Canonicalize NaN results so float outputs are deterministic.
    pub nan_canonicalization: bool,

    /// Let a later `define_function` replace an existing
    /// `(namespace, symbol)` binding instead of failing with
    /// `DuplicateBinding`.
    pub allow_shadowing: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            consume_fuel: false,
            fuel_limit: 100_000_000,
            max_wasm_stack: None,
            nan_canonicalization: false,
            allow_shadowing: false,
        }
    }
}

impl BridgeConfig {
    pub(crate) fn to_raw(&self) -> wb_config_t {
        wb_config_t {
            consume_fuel: self.consume_fuel,
            nan_canonicalization: self.nan_canonicalization,
            max_wasm_stack: self.max_wasm_stack.unwrap_or(0),
        }
    }
}
