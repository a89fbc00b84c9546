//! Value kinds and their marshaling to and from the engine's tagged values.

use std::any::{type_name, TypeId};
use std::fmt;

use wasmbridge_abi::{
    wb_val_t, wb_val_union, wb_valkind_t, WB_F32, WB_F64, WB_I32, WB_I64, WB_V128,
};

use crate::error::BridgeError;

/// The closed set of value kinds that cross the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValKind {
    I32,
    I64,
    F32,
    F64,
    /// 128-bit vector, carried as `u128` on the host.
    V128,
}

impl ValKind {
    pub(crate) fn to_raw(self) -> wb_valkind_t {
        match self {
            ValKind::I32 => WB_I32,
            ValKind::I64 => WB_I64,
            ValKind::F32 => WB_F32,
            ValKind::F64 => WB_F64,
            ValKind::V128 => WB_V128,
        }
    }

    pub(crate) fn from_raw(kind: wb_valkind_t) -> Result<Self, BridgeError> {
        match kind {
            WB_I32 => Ok(ValKind::I32),
            WB_I64 => Ok(ValKind::I64),
            WB_F32 => Ok(ValKind::F32),
            WB_F64 => Ok(ValKind::F64),
            WB_V128 => Ok(ValKind::V128),
            other => Err(BridgeError::UnsupportedType(format!(
                "engine value kind {:#x} has no host representation",
                other
            ))),
        }
    }
}

impl fmt::Display for ValKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValKind::I32 => "i32",
            ValKind::I64 => "i64",
            ValKind::F32 => "f32",
            ValKind::F64 => "f64",
            ValKind::V128 => "v128",
        };
        f.write_str(name)
    }
}

/// A tagged value. The accessors return `None` for any other kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Val {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    V128(u128),
}

impl Val {
    pub fn kind(&self) -> ValKind {
        match self {
            Val::I32(_) => ValKind::I32,
            Val::I64(_) => ValKind::I64,
            Val::F32(_) => ValKind::F32,
            Val::F64(_) => ValKind::F64,
            Val::V128(_) => ValKind::V128,
        }
    }

    pub fn i32(&self) -> Option<i32> {
        match self {
            Val::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn i64(&self) -> Option<i64> {
        match self {
            Val::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn f32(&self) -> Option<f32> {
        match self {
            Val::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn f64(&self) -> Option<f64> {
        match self {
            Val::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn v128(&self) -> Option<u128> {
        match self {
            Val::V128(v) => Some(*v),
            _ => None,
        }
    }

    pub(crate) fn to_raw(self) -> wb_val_t {
        let (kind, of) = match self {
            Val::I32(i32) => (WB_I32, wb_val_union { i32 }),
            Val::I64(i64) => (WB_I64, wb_val_union { i64 }),
            Val::F32(f32) => (WB_F32, wb_val_union { f32 }),
            Val::F64(f64) => (WB_F64, wb_val_union { f64 }),
            Val::V128(v) => (
                WB_V128,
                wb_val_union {
                    v128: v.to_le_bytes(),
                },
            ),
        };
        wb_val_t { kind, of }
    }

    pub(crate) fn from_raw(raw: &wb_val_t) -> Result<Self, BridgeError> {
        // The tag names the initialized union field.
        let val = unsafe {
            match ValKind::from_raw(raw.kind)? {
                ValKind::I32 => Val::I32(raw.of.i32),
                ValKind::I64 => Val::I64(raw.of.i64),
                ValKind::F32 => Val::F32(raw.of.f32),
                ValKind::F64 => Val::F64(raw.of.f64),
                ValKind::V128 => Val::V128(u128::from_le_bytes(raw.of.v128)),
            }
        };
        Ok(val)
    }
}

macro_rules! val_from {
    ($($ty:ty => $variant:ident),*) => {
        $(
            impl From<$ty> for Val {
                fn from(v: $ty) -> Val {
                    Val::$variant(v)
                }
            }
        )*
    };
}

val_from!(i32 => I32, i64 => I64, f32 => F32, f64 => F64, u128 => V128);

/// A host type named in a signature descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostType {
    id: TypeId,
    name: &'static str,
}

impl HostType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The value kind for this type, matched by exact type identity.
    pub fn kind(&self) -> Option<ValKind> {
        let id = self.id;
        if id == TypeId::of::<i32>() {
            Some(ValKind::I32)
        } else if id == TypeId::of::<i64>() {
            Some(ValKind::I64)
        } else if id == TypeId::of::<f32>() {
            Some(ValKind::F32)
        } else if id == TypeId::of::<f64>() {
            Some(ValKind::F64)
        } else if id == TypeId::of::<u128>() {
            Some(ValKind::V128)
        } else {
            None
        }
    }

    pub fn is_unit(&self) -> bool {
        self.id == TypeId::of::<()>()
    }
}

/// Ordered parameter types and return type of a host method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<HostType>,
    pub ret: HostType,
}

impl Signature {
    pub fn new(params: Vec<HostType>, ret: HostType) -> Self {
        Self { params, ret }
    }
}

/// Parameter kinds and optional result kind of a bridged function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncType {
    params: Vec<ValKind>,
    result: Option<ValKind>,
}

impl FuncType {
    pub fn new(params: Vec<ValKind>, result: Option<ValKind>) -> Self {
        Self { params, result }
    }

    /// Validate `signature` in declaration order, reporting the first type
    /// outside the closed kind set with its position.
    pub fn from_signature(signature: &Signature) -> Result<Self, BridgeError> {
        let params = signature
            .params
            .iter()
            .enumerate()
            .map(|(position, ty)| {
                ty.kind().ok_or_else(|| {
                    BridgeError::UnsupportedType(format!(
                        "parameter {} has type `{}`",
                        position,
                        ty.name()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let result = if signature.ret.is_unit() {
            None
        } else {
            let kind = signature.ret.kind().ok_or_else(|| {
                BridgeError::UnsupportedType(format!(
                    "return type `{}`",
                    signature.ret.name()
                ))
            })?;
            Some(kind)
        };
        Ok(Self { params, result })
    }

    pub fn params(&self) -> &[ValKind] {
        &self.params
    }

    pub fn result(&self) -> Option<ValKind> {
        self.result
    }

    pub(crate) fn check_args(&self, args: &[Val]) -> Result<(), BridgeError> {
        if args.len() != self.params.len() {
            return Err(BridgeError::TypeMismatch(format!(
                "expected {} arguments, got {}",
                self.params.len(),
                args.len()
            )));
        }
        for (position, (arg, kind)) in args.iter().zip(&self.params).enumerate() {
            if arg.kind() != *kind {
                return Err(BridgeError::TypeMismatch(format!(
                    "argument {} is {}, expected {}",
                    position,
                    arg.kind(),
                    kind
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn check_result(&self, expected: Option<ValKind>) -> Result<(), BridgeError> {
        if expected != self.result {
            return Err(BridgeError::TypeMismatch(format!(
                "function returns {}, caller expects {}",
                describe(self.result),
                describe(expected)
            )));
        }
        Ok(())
    }
}

pub(crate) fn describe(kind: Option<ValKind>) -> String {
    match kind {
        Some(kind) => kind.to_string(),
        None => "no value".to_string(),
    }
}

/// A host scalar with a one-to-one value kind.
pub trait WasmScalar: Copy + Send + Sync + 'static {
    const KIND: ValKind;
    fn into_val(self) -> Val;
    fn from_val(val: &Val) -> Option<Self>;
}

macro_rules! scalar {
    ($($ty:ty => $variant:ident, $accessor:ident;)*) => {
        $(
            impl WasmScalar for $ty {
                const KIND: ValKind = ValKind::$variant;

                fn into_val(self) -> Val {
                    Val::$variant(self)
                }

                fn from_val(val: &Val) -> Option<Self> {
                    val.$accessor()
                }
            }
        )*
    };
}

scalar! {
    i32 => I32, i32;
    i64 => I64, i64;
    f32 => F32, f32;
    f64 => F64, f64;
    u128 => V128, v128;
}

/// A tuple of scalars passed as positional arguments.
pub trait WasmParams {
    fn kinds() -> Vec<ValKind>;
    fn into_vals(self) -> Vec<Val>;
}

macro_rules! params {
    ($($name:ident)*) => {
        impl<$($name: WasmScalar),*> WasmParams for ($($name,)*) {
            fn kinds() -> Vec<ValKind> {
                vec![$($name::KIND),*]
            }

            #[allow(non_snake_case)]
            fn into_vals(self) -> Vec<Val> {
                let ($($name,)*) = self;
                vec![$($name.into_val()),*]
            }
        }
    };
}

params!();
params!(A1);
params!(A1 A2);
params!(A1 A2 A3);
params!(A1 A2 A3 A4);
params!(A1 A2 A3 A4 A5);
params!(A1 A2 A3 A4 A5 A6);

/// The return of a bridged call: a scalar or `()` for no value.
pub trait WasmResult: Sized {
    const RESULT_KIND: Option<ValKind>;

    fn kind() -> Option<ValKind> {
        Self::RESULT_KIND
    }

    fn from_result(val: Option<Val>) -> Option<Self>;
    fn into_result(self) -> Option<Val>;
}

impl WasmResult for () {
    const RESULT_KIND: Option<ValKind> = None;

    fn from_result(val: Option<Val>) -> Option<Self> {
        match val {
            None => Some(()),
            Some(_) => None,
        }
    }

    fn into_result(self) -> Option<Val> {
        None
    }
}

impl<T: WasmScalar> WasmResult for T {
    const RESULT_KIND: Option<ValKind> = Some(<T as WasmScalar>::KIND);

    fn from_result(val: Option<Val>) -> Option<Self> {
        val.as_ref().and_then(T::from_val)
    }

    fn into_result(self) -> Option<Val> {
        Some(self.into_val())
    }
}

/// What a typed host closure may return: a [`WasmResult`], or a `Result`
/// whose error becomes a trap.
pub trait HostReturn {
    type Output: WasmResult;
    fn into_host_result(self) -> anyhow::Result<Self::Output>;
}

macro_rules! host_return {
    ($($ty:ty),*) => {
        $(
            impl HostReturn for $ty {
                type Output = $ty;

                fn into_host_result(self) -> anyhow::Result<$ty> {
                    Ok(self)
                }
            }
        )*
    };
}

host_return!((), i32, i64, f32, f64, u128);

impl<T, E> HostReturn for Result<T, E>
where
    T: WasmResult,
    E: Into<anyhow::Error>,
{
    type Output = T;

    fn into_host_result(self) -> anyhow::Result<T> {
        self.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_follow_tag() {
        let v = Val::from(5i32);
        assert_eq!(v.kind(), ValKind::I32);
        assert_eq!(v.i32(), Some(5));
        assert_eq!(v.i64(), None);
        assert_eq!(v.f64(), None);

        let wide = Val::from(u128::MAX);
        assert_eq!(wide.kind(), ValKind::V128);
        assert_eq!(wide.v128(), Some(u128::MAX));
    }

    #[test]
    fn test_raw_value_keeps_payload() {
        let wide = 0x0011_2233_4455_6677_8899_aabb_ccdd_eeffu128;
        for val in [Val::I32(-1), Val::I64(i64::MIN), Val::F32(0.5), Val::F64(-2.5), Val::V128(wide)] {
            let raw = val.to_raw();
            assert_eq!(ValKind::from_raw(raw.kind).unwrap(), val.kind());
            assert_eq!(Val::from_raw(&raw).unwrap(), val);
        }
    }

    #[test]
    fn test_opaque_kind_unsupported() {
        assert!(matches!(
            ValKind::from_raw(wasmbridge_abi::WB_OPAQUE),
            Err(BridgeError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_signature_maps_by_exact_type() {
        let sig = Signature::new(
            vec![HostType::of::<i32>(), HostType::of::<f64>(), HostType::of::<u128>()],
            HostType::of::<i64>(),
        );
        let ty = FuncType::from_signature(&sig).unwrap();
        assert_eq!(ty.params(), &[ValKind::I32, ValKind::F64, ValKind::V128]);
        assert_eq!(ty.result(), Some(ValKind::I64));
    }

    #[test]
    fn test_unit_return_is_no_value() {
        let sig = Signature::new(vec![], HostType::of::<()>());
        let ty = FuncType::from_signature(&sig).unwrap();
        assert!(ty.params().is_empty());
        assert_eq!(ty.result(), None);
    }

    #[test]
    fn test_first_unsupported_param_reported() {
        let sig = Signature::new(
            vec![HostType::of::<i32>(), HostType::of::<bool>(), HostType::of::<String>()],
            HostType::of::<i32>(),
        );
        match FuncType::from_signature(&sig) {
            Err(BridgeError::UnsupportedType(msg)) => {
                assert!(msg.contains("parameter 1"), "{}", msg);
                assert!(msg.contains("bool"), "{}", msg);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unit_param_unsupported() {
        let sig = Signature::new(vec![HostType::of::<()>()], HostType::of::<()>());
        assert!(FuncType::from_signature(&sig).is_err());
    }

    #[test]
    fn test_unsupported_return() {
        let sig = Signature::new(vec![], HostType::of::<u8>());
        assert!(matches!(
            FuncType::from_signature(&sig),
            Err(BridgeError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_check_args() {
        let ty = FuncType::new(vec![ValKind::I32, ValKind::I32], Some(ValKind::I32));
        assert!(ty.check_args(&[Val::I32(1), Val::I32(2)]).is_ok());
        assert!(ty.check_args(&[Val::I32(1)]).is_err());
        assert!(ty.check_args(&[Val::I32(1), Val::I64(2)]).is_err());
        assert!(ty.check_result(Some(ValKind::I32)).is_ok());
        assert!(ty.check_result(None).is_err());
    }

    #[test]
    fn test_tuple_params() {
        assert_eq!(<(i32, i64)>::kinds(), vec![ValKind::I32, ValKind::I64]);
        assert_eq!((3i32, 2.0f64).into_vals(), vec![Val::I32(3), Val::F64(2.0)]);
        assert!(<()>::kinds().is_empty());
    }

    #[test]
    fn test_result_conversion() {
        assert_eq!(<i32 as WasmResult>::from_result(Some(Val::I32(4))), Some(4));
        assert_eq!(<i32 as WasmResult>::from_result(Some(Val::I64(4))), None);
        assert_eq!(<() as WasmResult>::from_result(None), Some(()));
        assert_eq!(<() as WasmResult>::kind(), None);
    }
}
