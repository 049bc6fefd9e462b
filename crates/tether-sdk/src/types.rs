//! Declared signatures and packed arguments
//!
//! Every operation a class publishes carries a `Signature`: the ordered
//! parameter types and the return type. Building a call converts the
//! caller's `DynValue` list into `Arguments` against that signature, and the
//! handler's return value is classified into a `CallResult` the same way.

use std::fmt;

use crate::error::{BridgeError, BridgeResult};
use crate::value::{DynValue, Number, ObjectRef};

// ============================================================================
// Declared Types
// ============================================================================

/// Declared parameter / return type of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// No value (return type only)
    Void,
    /// Boolean
    Bool,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit unsigned integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// UTF-8 string
    String,
    /// Native object reference (nullable)
    Object,
    /// Raw pointer; has no dynamic mapping
    Pointer,
    /// By-value aggregate; has no dynamic mapping
    Struct(&'static str),
}

/// Tag category a return type produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCategory {
    /// `CallResult::Number`
    Number,
    /// `CallResult::Object`
    Object,
    /// `CallResult::Void`
    Void,
}

impl ValueType {
    /// Result tag for this type when used as a return type.
    ///
    /// Strings are returned as objects. `None` for types with no mapping.
    pub fn return_category(&self) -> Option<ReturnCategory> {
        match self {
            ValueType::Void => Some(ReturnCategory::Void),
            ValueType::String | ValueType::Object => Some(ReturnCategory::Object),
            ValueType::Pointer | ValueType::Struct(_) => None,
            _ => Some(ReturnCategory::Number),
        }
    }

    /// Whether the type can appear as a parameter
    pub fn is_parameter_type(&self) -> bool {
        !matches!(
            self,
            ValueType::Void | ValueType::Pointer | ValueType::Struct(_)
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Void => write!(f, "void"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::I8 => write!(f, "i8"),
            ValueType::I16 => write!(f, "i16"),
            ValueType::I32 => write!(f, "i32"),
            ValueType::I64 => write!(f, "i64"),
            ValueType::U8 => write!(f, "u8"),
            ValueType::U16 => write!(f, "u16"),
            ValueType::U32 => write!(f, "u32"),
            ValueType::U64 => write!(f, "u64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
            ValueType::String => write!(f, "string"),
            ValueType::Object => write!(f, "object"),
            ValueType::Pointer => write!(f, "pointer"),
            ValueType::Struct(name) => write!(f, "struct {}", name),
        }
    }
}

// ============================================================================
// Packed Arguments
// ============================================================================

/// A single argument converted to its declared type
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Boolean
    Bool(bool),
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 8-bit unsigned integer
    U8(u8),
    /// 16-bit unsigned integer
    U16(u16),
    /// 32-bit unsigned integer
    U32(u32),
    /// 64-bit unsigned integer
    U64(u64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// String
    String(String),
    /// Object reference or null
    Object(Option<ObjectRef>),
}

/// Integral value carried by a dynamic number, if it has one
fn integral(value: &DynValue) -> Option<i128> {
    match value {
        DynValue::Int(i) => Some(*i as i128),
        // i128 covers the full u64 and i64 range for the bounds check below
        DynValue::Float(f) if f.is_finite() && f.fract() == 0.0 => {
            if *f >= -(2f64.powi(64)) && *f <= 2f64.powi(64) {
                Some(*f as i128)
            } else {
                None
            }
        }
        _ => None,
    }
}

macro_rules! convert_int {
    ($value:expr, $variant:ident, $t:ty) => {{
        let n = integral($value).ok_or_else(|| {
            format!("expected integral number, got {}", describe($value))
        })?;
        let v = <$t>::try_from(n)
            .map_err(|_| format!("{} out of range for {}", n, stringify!($t)))?;
        Ok(Arg::$variant(v))
    }};
}

fn describe(value: &DynValue) -> String {
    match value {
        DynValue::Float(f) => format!("float {}", f),
        DynValue::Int(i) => format!("int {}", i),
        other => other.type_name().to_string(),
    }
}

impl Arg {
    /// Convert a dynamic value to the declared type.
    ///
    /// The error string describes the mismatch; callers wrap it with the
    /// operation name.
    pub fn convert(ty: ValueType, value: &DynValue) -> Result<Arg, String> {
        match ty {
            ValueType::Bool => match value {
                DynValue::Bool(b) => Ok(Arg::Bool(*b)),
                other => Err(format!("expected bool, got {}", describe(other))),
            },
            ValueType::I8 => convert_int!(value, I8, i8),
            ValueType::I16 => convert_int!(value, I16, i16),
            ValueType::I32 => convert_int!(value, I32, i32),
            ValueType::I64 => convert_int!(value, I64, i64),
            ValueType::U8 => convert_int!(value, U8, u8),
            ValueType::U16 => convert_int!(value, U16, u16),
            ValueType::U32 => convert_int!(value, U32, u32),
            ValueType::U64 => convert_int!(value, U64, u64),
            ValueType::F32 => {
                let f = value
                    .as_f64()
                    .ok_or_else(|| format!("expected number, got {}", describe(value)))?;
                if f.is_finite() && f.abs() > f32::MAX as f64 {
                    return Err(format!("{} out of range for f32", f));
                }
                Ok(Arg::F32(f as f32))
            }
            ValueType::F64 => value
                .as_f64()
                .map(Arg::F64)
                .ok_or_else(|| format!("expected number, got {}", describe(value))),
            ValueType::String => match value {
                DynValue::String(s) => Ok(Arg::String(s.clone())),
                other => Err(format!("expected string, got {}", describe(other))),
            },
            ValueType::Object => match value {
                DynValue::Object(o) => Ok(Arg::Object(Some(o.clone()))),
                DynValue::Null => Ok(Arg::Object(None)),
                other => Err(format!("expected object or null, got {}", describe(other))),
            },
            ValueType::Void | ValueType::Pointer | ValueType::Struct(_) => {
                Err(format!("type {} has no dynamic mapping", ty))
            }
        }
    }

    /// Short name of the packed type
    pub fn type_name(&self) -> &'static str {
        match self {
            Arg::Bool(_) => "bool",
            Arg::I8(_) => "i8",
            Arg::I16(_) => "i16",
            Arg::I32(_) => "i32",
            Arg::I64(_) => "i64",
            Arg::U8(_) => "u8",
            Arg::U16(_) => "u16",
            Arg::U32(_) => "u32",
            Arg::U64(_) => "u64",
            Arg::F32(_) => "f32",
            Arg::F64(_) => "f64",
            Arg::String(_) => "string",
            Arg::Object(_) => "object",
        }
    }
}

/// Argument list packed against a signature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<Arg>,
}

impl Arguments {
    /// Wrap already-converted values
    pub fn new(values: Vec<Arg>) -> Self {
        Arguments { values }
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check for an empty list
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate the packed values
    pub fn iter(&self) -> std::slice::Iter<'_, Arg> {
        self.values.iter()
    }

    /// Raw packed value at `index`
    pub fn arg(&self, index: usize) -> Option<&Arg> {
        self.values.get(index)
    }

    /// Read argument `index` as `T`
    pub fn get<T: crate::convert::FromArg>(&self, index: usize) -> BridgeResult<T> {
        let arg = self.values.get(index).ok_or_else(|| BridgeError::TypeMismatch {
            expected: format!("argument {}", index),
            got: "missing".to_string(),
        })?;
        T::from_arg(arg)
    }

    /// Read argument `index` as f64
    pub fn f64(&self, index: usize) -> BridgeResult<f64> {
        self.get(index)
    }

    /// Read argument `index` as i64
    pub fn i64(&self, index: usize) -> BridgeResult<i64> {
        self.get(index)
    }

    /// Read argument `index` as bool
    pub fn bool(&self, index: usize) -> BridgeResult<bool> {
        self.get(index)
    }

    /// Read argument `index` as a string
    pub fn string(&self, index: usize) -> BridgeResult<String> {
        self.get(index)
    }

    /// Read argument `index` as a nullable object reference
    pub fn object(&self, index: usize) -> BridgeResult<Option<ObjectRef>> {
        self.get(index)
    }
}

// ============================================================================
// Call Result
// ============================================================================

/// Tagged result of an executed call.
///
/// The tag is decided by the operation's declared return type, never by the
/// runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    /// Numeric (or boolean) return, by value
    Number(Number),
    /// Object return, by shared reference
    Object(Option<ObjectRef>),
    /// No return value
    Void,
}

impl CallResult {
    /// Category of this result
    pub fn category(&self) -> ReturnCategory {
        match self {
            CallResult::Number(_) => ReturnCategory::Number,
            CallResult::Object(_) => ReturnCategory::Object,
            CallResult::Void => ReturnCategory::Void,
        }
    }

    /// Numeric payload
    pub fn as_number(&self) -> Option<Number> {
        match self {
            CallResult::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Object payload (non-null only)
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            CallResult::Object(Some(o)) => Some(o),
            _ => None,
        }
    }

    /// Take the object payload
    pub fn into_object(self) -> Option<ObjectRef> {
        match self {
            CallResult::Object(o) => o,
            _ => None,
        }
    }

    /// Convert back to a dynamic value for the scripting layer.
    ///
    /// String returns are stored as `ObjectRef<String>` and come back as
    /// `DynValue::String`.
    pub fn into_dyn(self) -> DynValue {
        match self {
            CallResult::Number(n) => n.into(),
            CallResult::Object(Some(o)) => match o.downcast_ref::<String>() {
                Some(s) => DynValue::String(s.clone()),
                None => DynValue::Object(o),
            },
            CallResult::Object(None) | CallResult::Void => DynValue::Null,
        }
    }
}

// ============================================================================
// Signature
// ============================================================================

/// Declared parameter and return types of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<ValueType>,
    returns: ValueType,
}

impl Signature {
    /// Create a signature
    pub fn new(params: impl Into<Vec<ValueType>>, returns: ValueType) -> Self {
        Signature {
            params: params.into(),
            returns,
        }
    }

    /// Declared parameter types
    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Declared return type
    pub fn returns(&self) -> ValueType {
        self.returns
    }

    /// Check that every declared type has a dynamic mapping
    pub fn validate(&self, operation: &str) -> BridgeResult<()> {
        if let Some(ty) = self.params.iter().find(|t| !t.is_parameter_type()) {
            return Err(BridgeError::UnsupportedType {
                operation: operation.to_string(),
                ty: ty.to_string(),
            });
        }
        if self.returns.return_category().is_none() {
            return Err(BridgeError::UnsupportedType {
                operation: operation.to_string(),
                ty: self.returns.to_string(),
            });
        }
        Ok(())
    }

    /// Convert a dynamic argument list to packed arguments
    pub fn pack(&self, operation: &str, values: Vec<DynValue>) -> BridgeResult<Arguments> {
        self.validate(operation)?;
        if values.len() != self.params.len() {
            return Err(BridgeError::ArgumentMismatch {
                operation: operation.to_string(),
                reason: format!(
                    "expected {} argument(s), got {}",
                    self.params.len(),
                    values.len()
                ),
            });
        }

        let mut packed = Vec::with_capacity(values.len());
        for (index, (ty, value)) in self.params.iter().zip(values.iter()).enumerate() {
            let arg = Arg::convert(*ty, value).map_err(|reason| BridgeError::ArgumentMismatch {
                operation: operation.to_string(),
                reason: format!("argument {}: {}", index, reason),
            })?;
            packed.push(arg);
        }
        Ok(Arguments::new(packed))
    }

    /// Tag a handler's return value according to the declared return type
    pub fn classify(&self, operation: &str, value: DynValue) -> BridgeResult<CallResult> {
        let mismatch = |got: &DynValue| BridgeError::ReturnMismatch {
            operation: operation.to_string(),
            declared: self.returns.to_string(),
            got: got.type_name().to_string(),
        };

        let number = |arg: Arg| match arg {
            Arg::Bool(b) => Some(Number::Bool(b)),
            Arg::I8(v) => Some(Number::Int(v as i64)),
            Arg::I16(v) => Some(Number::Int(v as i64)),
            Arg::I32(v) => Some(Number::Int(v as i64)),
            Arg::I64(v) => Some(Number::Int(v)),
            Arg::U8(v) => Some(Number::UInt(v as u64)),
            Arg::U16(v) => Some(Number::UInt(v as u64)),
            Arg::U32(v) => Some(Number::UInt(v as u64)),
            Arg::U64(v) => Some(Number::UInt(v)),
            Arg::F32(v) => Some(Number::Float(v as f64)),
            Arg::F64(v) => Some(Number::Float(v)),
            Arg::String(_) | Arg::Object(_) => None,
        };

        match self.returns {
            ValueType::Void => Ok(CallResult::Void),
            ValueType::String => match value {
                DynValue::String(s) => Ok(CallResult::Object(Some(ObjectRef::new(s)))),
                DynValue::Null => Ok(CallResult::Object(None)),
                other => Err(mismatch(&other)),
            },
            ValueType::Object => match value {
                DynValue::Object(o) => Ok(CallResult::Object(Some(o))),
                DynValue::Null => Ok(CallResult::Object(None)),
                other => Err(mismatch(&other)),
            },
            ValueType::Pointer | ValueType::Struct(_) => Err(BridgeError::UnsupportedType {
                operation: operation.to_string(),
                ty: self.returns.to_string(),
            }),
            ty => Arg::convert(ty, &value)
                .ok()
                .and_then(number)
                .map(CallResult::Number)
                .ok_or_else(|| mismatch(&value)),
        }
    }
}
