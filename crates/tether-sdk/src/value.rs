//! Dynamic values exchanged with the scripting layer
//!
//! `DynValue` is what the scripting side hands in: numbers, strings, booleans,
//! object references and null. `ObjectRef` is a shared, type-erased handle to a
//! native object; `Number` is the numeric payload of a tagged call result.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// ObjectRef
// ============================================================================

/// Shared reference to a native object.
///
/// The object is owned by its own allocation; an `ObjectRef` only keeps it
/// alive. Cloning is cheap (reference count bump). Objects are `Send + Sync`
/// so that references can travel between execution contexts; any mutation
/// goes through the object's own interior synchronization.
#[derive(Clone)]
pub struct ObjectRef {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ObjectRef {
    /// Allocate `value` and return a reference to it
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an existing shared allocation
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        ObjectRef {
            inner: value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// `TypeId` of the concrete object type
    pub fn concrete_type_id(&self) -> TypeId {
        (*self.inner).type_id()
    }

    /// Rust type name of the concrete object type (for diagnostics)
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the object as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Get a typed shared handle to the object
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    /// Check whether the object is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Type-erased view used by method dispatch
    pub fn as_any(&self) -> &(dyn Any + Send + Sync) {
        &*self.inner
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    /// Number of live references to the object
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ObjectRef({} @ {:p})",
            self.type_name,
            Arc::as_ptr(&self.inner) as *const ()
        )
    }
}

// ============================================================================
// Number
// ============================================================================

/// Numeric payload of a tagged call result.
///
/// The variant follows the declared return type of the operation: booleans
/// stay booleans, signed and unsigned integers keep their signedness, and
/// both float widths come back as `Float`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Declared `Bool`
    Bool(bool),
    /// Declared signed integer
    Int(i64),
    /// Declared unsigned integer
    UInt(u64),
    /// Declared float
    Float(f64),
}

impl Number {
    /// Value as f64 (booleans map to 0/1)
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Bool(b) => b as u8 as f64,
            Number::Int(i) => i as f64,
            Number::UInt(u) => u as f64,
            Number::Float(f) => f,
        }
    }

    /// Value as i64 if it is an integer that fits
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Number::Int(i) => Some(i),
            Number::UInt(u) => i64::try_from(u).ok(),
            _ => None,
        }
    }

    /// Value as u64 if it is a non-negative integer
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Number::Int(i) => u64::try_from(i).ok(),
            Number::UInt(u) => Some(u),
            _ => None,
        }
    }

    /// Value as bool if it was declared boolean
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Number::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl From<Number> for DynValue {
    fn from(n: Number) -> Self {
        match n {
            Number::Bool(b) => DynValue::Bool(b),
            Number::Int(i) => DynValue::Int(i),
            Number::UInt(u) => DynValue::from(u),
            Number::Float(f) => DynValue::Float(f),
        }
    }
}

// ============================================================================
// DynValue
// ============================================================================

/// Dynamically-typed value supplied by the scripting layer.
#[derive(Debug, Clone, Default)]
pub enum DynValue {
    /// Opaque null
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integral number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    String(String),
    /// Reference to a native object
    Object(ObjectRef),
}

impl DynValue {
    /// Short name of the dynamic shape, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            DynValue::Null => "null",
            DynValue::Bool(_) => "bool",
            DynValue::Int(_) => "int",
            DynValue::Float(_) => "float",
            DynValue::String(_) => "string",
            DynValue::Object(_) => "object",
        }
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, DynValue::Null)
    }

    /// Check for a number (int or float)
    pub fn is_number(&self) -> bool {
        matches!(self, DynValue::Int(_) | DynValue::Float(_))
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get a number as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynValue::Int(i) => Some(*i as f64),
            DynValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as i64 (ints only)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DynValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as object reference
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            DynValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl PartialEq for DynValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DynValue::Null, DynValue::Null) => true,
            (DynValue::Bool(a), DynValue::Bool(b)) => a == b,
            (DynValue::Int(a), DynValue::Int(b)) => a == b,
            (DynValue::Float(a), DynValue::Float(b)) => a == b,
            (DynValue::String(a), DynValue::String(b)) => a == b,
            (DynValue::Object(a), DynValue::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for DynValue {
                fn from(v: $t) -> Self {
                    DynValue::Int(v as i64)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for DynValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => DynValue::Int(i),
            Err(_) => DynValue::Float(v as f64),
        }
    }
}

impl From<usize> for DynValue {
    fn from(v: usize) -> Self {
        DynValue::from(v as u64)
    }
}

impl From<f32> for DynValue {
    fn from(v: f32) -> Self {
        DynValue::Float(v as f64)
    }
}

impl From<f64> for DynValue {
    fn from(v: f64) -> Self {
        DynValue::Float(v)
    }
}

impl From<bool> for DynValue {
    fn from(v: bool) -> Self {
        DynValue::Bool(v)
    }
}

impl From<String> for DynValue {
    fn from(v: String) -> Self {
        DynValue::String(v)
    }
}

impl From<&str> for DynValue {
    fn from(v: &str) -> Self {
        DynValue::String(v.to_string())
    }
}

impl From<ObjectRef> for DynValue {
    fn from(v: ObjectRef) -> Self {
        DynValue::Object(v)
    }
}

impl From<Option<ObjectRef>> for DynValue {
    fn from(v: Option<ObjectRef>) -> Self {
        v.map(DynValue::Object).unwrap_or(DynValue::Null)
    }
}

impl From<()> for DynValue {
    fn from(_: ()) -> Self {
        DynValue::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe(u32);

    #[test]
    fn test_object_ref_downcast() {
        let obj = ObjectRef::new(Probe(7));
        assert!(obj.is::<Probe>());
        assert_eq!(obj.downcast_ref::<Probe>().map(|p| p.0), Some(7));
        assert!(obj.downcast_ref::<String>().is_none());
        assert_eq!(obj.concrete_type_id(), TypeId::of::<Probe>());
    }

    #[test]
    fn test_object_ref_identity() {
        let a = ObjectRef::new(Probe(1));
        let b = a.clone();
        let c = ObjectRef::new(Probe(1));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.strong_count(), 2);
    }

    #[test]
    fn test_downcast_arc_shares_allocation() {
        let obj = ObjectRef::new(Probe(3));
        let arc = obj.downcast::<Probe>().unwrap();
        assert_eq!(arc.0, 3);
        assert_eq!(obj.strong_count(), 2);
    }

    #[test]
    fn test_dyn_value_from_primitives() {
        assert_eq!(DynValue::from(3i32), DynValue::Int(3));
        assert_eq!(DynValue::from(2.5f64), DynValue::Float(2.5));
        assert_eq!(DynValue::from(true), DynValue::Bool(true));
        assert_eq!(DynValue::from("abc"), DynValue::String("abc".into()));
        assert_eq!(DynValue::from(None::<ObjectRef>), DynValue::Null);
        assert_eq!(DynValue::from(u64::MAX), DynValue::Float(u64::MAX as f64));
    }

    #[test]
    fn test_number_accessors() {
        assert_eq!(Number::Int(-4).as_i64(), Some(-4));
        assert_eq!(Number::Int(-4).as_u64(), None);
        assert_eq!(Number::UInt(9).as_i64(), Some(9));
        assert_eq!(Number::Bool(true).as_f64(), 1.0);
        assert_eq!(Number::Float(1.5).as_i64(), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(DynValue::Null.type_name(), "null");
        assert_eq!(DynValue::Float(0.0).type_name(), "float");
        assert_eq!(DynValue::Object(ObjectRef::new(Probe(0))).type_name(), "object");
    }
}
