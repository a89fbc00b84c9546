use anyhow::{bail, Result};
use wasmtime::{Val, ValType, V128};

/// Kind tag carried by every [`wb_val_t`].
pub type wb_valkind_t = u8;

pub const WB_I32: wb_valkind_t = 0;
pub const WB_I64: wb_valkind_t = 1;
pub const WB_F32: wb_valkind_t = 2;
pub const WB_F64: wb_valkind_t = 3;
pub const WB_V128: wb_valkind_t = 4;
/// Reported for engine types the ABI does not marshal (references).
pub const WB_OPAQUE: wb_valkind_t = 0xff;

/// Tagged scalar crossing the ABI. `v128` is stored little-endian.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct wb_val_t {
    pub kind: wb_valkind_t,
    pub of: wb_val_union,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union wb_val_union {
    pub i32: i32,
    pub i64: i64,
    pub f32: f32,
    pub f64: f64,
    pub v128: [u8; 16],
}

impl Default for wb_val_t {
    fn default() -> Self {
        wb_val_t {
            kind: WB_I32,
            of: wb_val_union { i32: 0 },
        }
    }
}

impl wb_val_t {
    pub fn from_val(val: &Val) -> Result<wb_val_t> {
        let val = match val {
            Val::I32(i) => wb_val_t {
                kind: WB_I32,
                of: wb_val_union { i32: *i },
            },
            Val::I64(i) => wb_val_t {
                kind: WB_I64,
                of: wb_val_union { i64: *i },
            },
            Val::F32(bits) => wb_val_t {
                kind: WB_F32,
                of: wb_val_union {
                    f32: f32::from_bits(*bits),
                },
            },
            Val::F64(bits) => wb_val_t {
                kind: WB_F64,
                of: wb_val_union {
                    f64: f64::from_bits(*bits),
                },
            },
            Val::V128(v) => wb_val_t {
                kind: WB_V128,
                of: wb_val_union {
                    v128: v.as_u128().to_le_bytes(),
                },
            },
            other => bail!("value of type {:?} cannot cross the bridge", other),
        };
        Ok(val)
    }

    pub fn to_val(&self) -> Result<Val> {
        let val = unsafe {
            match self.kind {
                WB_I32 => Val::I32(self.of.i32),
                WB_I64 => Val::I64(self.of.i64),
                WB_F32 => Val::F32(self.of.f32.to_bits()),
                WB_F64 => Val::F64(self.of.f64.to_bits()),
                WB_V128 => Val::V128(V128::from(u128::from_le_bytes(self.of.v128))),
                kind => bail!("unknown value kind tag: {}", kind),
            }
        };
        Ok(val)
    }
}

pub(crate) fn from_valtype(ty: &ValType) -> wb_valkind_t {
    match ty {
        ValType::I32 => WB_I32,
        ValType::I64 => WB_I64,
        ValType::F32 => WB_F32,
        ValType::F64 => WB_F64,
        ValType::V128 => WB_V128,
        ValType::Ref(_) => WB_OPAQUE,
    }
}

pub(crate) fn into_valtype(kind: wb_valkind_t) -> Result<ValType> {
    let ty = match kind {
        WB_I32 => ValType::I32,
        WB_I64 => ValType::I64,
        WB_F32 => ValType::F32,
        WB_F64 => ValType::F64,
        WB_V128 => ValType::V128,
        kind => bail!("unknown value kind tag: {}", kind),
    };
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversion_preserves_kind() {
        let cases = [
            Val::I32(-7),
            Val::I64(1 << 40),
            Val::F32(1.5f32.to_bits()),
            Val::F64(2.25f64.to_bits()),
        ];
        for val in cases {
            let raw = wb_val_t::from_val(&val).unwrap();
            let back = raw.to_val().unwrap();
            assert_eq!(format!("{:?}", val), format!("{:?}", back));
        }
    }

    #[test]
    fn test_v128_little_endian() {
        let wide = 0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10u128;
        let raw = wb_val_t::from_val(&Val::V128(V128::from(wide))).unwrap();
        assert_eq!(raw.kind, WB_V128);
        assert_eq!(unsafe { raw.of.v128 }[0], 0x10);
        match raw.to_val().unwrap() {
            Val::V128(v) => assert_eq!(v.as_u128(), wide),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let raw = wb_val_t {
            kind: 42,
            of: wb_val_union { i32: 0 },
        };
        assert!(raw.to_val().is_err());
        assert!(into_valtype(WB_OPAQUE).is_err());
    }
}
