//! Typed access to packed arguments
//!
//! Operation bodies receive `Arguments` already converted to their declared
//! types. `FromArg` reads one of them back as a Rust value:
//!
//! ```ignore
//! let x: f64 = args.get(0)?;
//! let label: String = args.get(1)?;
//! ```

use crate::error::{BridgeError, BridgeResult};
use crate::types::Arg;
use crate::value::ObjectRef;

/// Extract a Rust value from a packed argument
pub trait FromArg: Sized {
    /// Convert, or fail with `TypeMismatch`
    fn from_arg(arg: &Arg) -> BridgeResult<Self>;
}

fn mismatch(expected: &str, arg: &Arg) -> BridgeError {
    BridgeError::TypeMismatch {
        expected: expected.to_string(),
        got: arg.type_name().to_string(),
    }
}

impl FromArg for bool {
    fn from_arg(arg: &Arg) -> BridgeResult<Self> {
        match arg {
            Arg::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromArg for i64 {
    fn from_arg(arg: &Arg) -> BridgeResult<Self> {
        match *arg {
            Arg::I8(v) => Ok(v as i64),
            Arg::I16(v) => Ok(v as i64),
            Arg::I32(v) => Ok(v as i64),
            Arg::I64(v) => Ok(v),
            Arg::U8(v) => Ok(v as i64),
            Arg::U16(v) => Ok(v as i64),
            Arg::U32(v) => Ok(v as i64),
            Arg::U64(v) => i64::try_from(v).map_err(|_| mismatch("i64", arg)),
            ref other => Err(mismatch("i64", other)),
        }
    }
}

impl FromArg for u64 {
    fn from_arg(arg: &Arg) -> BridgeResult<Self> {
        match *arg {
            Arg::U8(v) => Ok(v as u64),
            Arg::U16(v) => Ok(v as u64),
            Arg::U32(v) => Ok(v as u64),
            Arg::U64(v) => Ok(v),
            _ => i64::from_arg(arg)
                .ok()
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| mismatch("u64", arg)),
        }
    }
}

macro_rules! narrow_from_arg {
    ($($t:ty => $wide:ty),*) => {
        $(
            impl FromArg for $t {
                fn from_arg(arg: &Arg) -> BridgeResult<Self> {
                    let wide = <$wide>::from_arg(arg)?;
                    <$t>::try_from(wide).map_err(|_| mismatch(stringify!($t), arg))
                }
            }
        )*
    };
}

narrow_from_arg!(i8 => i64, i16 => i64, i32 => i64, u8 => u64, u16 => u64, u32 => u64, usize => u64);

impl FromArg for f64 {
    fn from_arg(arg: &Arg) -> BridgeResult<Self> {
        match *arg {
            Arg::F32(v) => Ok(v as f64),
            Arg::F64(v) => Ok(v),
            Arg::Bool(_) | Arg::String(_) | Arg::Object(_) => Err(mismatch("f64", arg)),
            _ => i64::from_arg(arg)
                .map(|v| v as f64)
                .or_else(|_| u64::from_arg(arg).map(|v| v as f64)),
        }
    }
}

impl FromArg for f32 {
    fn from_arg(arg: &Arg) -> BridgeResult<Self> {
        f64::from_arg(arg).map(|v| v as f32)
    }
}

impl FromArg for String {
    fn from_arg(arg: &Arg) -> BridgeResult<Self> {
        match arg {
            Arg::String(s) => Ok(s.clone()),
            other => Err(mismatch("string", other)),
        }
    }
}

impl FromArg for Option<ObjectRef> {
    fn from_arg(arg: &Arg) -> BridgeResult<Self> {
        match arg {
            Arg::Object(o) => Ok(o.clone()),
            other => Err(mismatch("object", other)),
        }
    }
}

impl FromArg for ObjectRef {
    fn from_arg(arg: &Arg) -> BridgeResult<Self> {
        match arg {
            Arg::Object(Some(o)) => Ok(o.clone()),
            Arg::Object(None) => Err(BridgeError::TypeMismatch {
                expected: "object".to_string(),
                got: "null".to_string(),
            }),
            other => Err(mismatch("object", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening() {
        assert_eq!(i64::from_arg(&Arg::I32(-5)).unwrap(), -5);
        assert_eq!(u64::from_arg(&Arg::U8(200)).unwrap(), 200);
        assert_eq!(f64::from_arg(&Arg::I16(3)).unwrap(), 3.0);
    }

    #[test]
    fn test_narrowing_checks_range() {
        assert_eq!(i8::from_arg(&Arg::I64(12)).unwrap(), 12);
        assert!(i8::from_arg(&Arg::I64(300)).is_err());
        assert!(u32::from_arg(&Arg::I32(-1)).is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let err = bool::from_arg(&Arg::F64(1.0)).unwrap_err();
        assert_eq!(
            err,
            BridgeError::TypeMismatch {
                expected: "bool".into(),
                got: "f64".into()
            }
        );
        assert!(String::from_arg(&Arg::Bool(true)).is_err());
        assert!(f64::from_arg(&Arg::String("1".into())).is_err());
    }

    #[test]
    fn test_object_args() {
        let obj = ObjectRef::new(5u8);
        let arg = Arg::Object(Some(obj.clone()));
        assert!(ObjectRef::from_arg(&arg).unwrap().ptr_eq(&obj));
        assert_eq!(Option::<ObjectRef>::from_arg(&Arg::Object(None)).unwrap(), None);
        assert!(ObjectRef::from_arg(&Arg::Object(None)).is_err());
    }
}
