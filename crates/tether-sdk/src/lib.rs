//! Tether SDK - value model and class registry for the invocation bridge
//!
//! This crate holds everything needed to describe native types to Tether
//! without depending on the dispatcher: dynamic values, declared signatures,
//! class definitions and the registry that resolves them.
//!
//! # Example
//!
//! ```ignore
//! use tether_sdk::{ClassDef, ClassRegistry, ValueType};
//!
//! struct Point { x: f64, y: f64 }
//!
//! let mut registry = ClassRegistry::new();
//! registry.register(
//!     ClassDef::<Point>::new("Point")
//!         .initializer("initWithX:Y:", &[ValueType::F64, ValueType::F64], |args| {
//!             Ok(Point { x: args.f64(0)?, y: args.f64(1)? })
//!         })
//!         .readonly_property("x", ValueType::F64, |p| Ok(p.x))
//!         .readonly_property("y", ValueType::F64, |p| Ok(p.y)),
//! );
//! ```

#![warn(missing_docs)]

pub mod class;
pub mod convert;
pub mod error;
pub mod registry;
pub mod types;
pub mod value;

pub use class::{
    default_setter_name, ClassDef, ClassInfo, ClassRef, Operation, OperationKind, Property,
    Target,
};
pub use convert::FromArg;
pub use error::{BridgeError, BridgeResult};
pub use registry::ClassRegistry;
pub use types::{Arg, Arguments, CallResult, ReturnCategory, Signature, ValueType};
pub use value::{DynValue, Number, ObjectRef};

/// Build a `Vec<DynValue>` argument list.
///
/// ```ignore
/// let args = dyn_args![3, 4.5, "label", true];
/// let none = dyn_args![];
/// ```
#[macro_export]
macro_rules! dyn_args {
    () => {
        ::std::vec::Vec::<$crate::DynValue>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::DynValue::from($arg)),+]
    };
}
