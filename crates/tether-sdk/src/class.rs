//! Class definitions
//!
//! A native type is exposed by describing it with a `ClassDef`: its
//! initializers, instance methods, class methods and properties, each with a
//! declared `Signature`. Registering the definition produces a `ClassInfo`
//! that the call builder resolves operation names against.
//!
//! # Example
//!
//! ```ignore
//! use tether_sdk::{ClassDef, ValueType};
//!
//! struct Point { x: f64, y: f64 }
//!
//! let def = ClassDef::<Point>::new("Point")
//!     .initializer("initWithX:Y:", &[ValueType::F64, ValueType::F64], |args| {
//!         Ok(Point { x: args.f64(0)?, y: args.f64(1)? })
//!     })
//!     .readonly_property("x", ValueType::F64, |p| Ok(p.x))
//!     .readonly_property("y", ValueType::F64, |p| Ok(p.y));
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::types::{Arguments, CallResult, Signature, ValueType};
use crate::value::{DynValue, ObjectRef};

/// Shared handle to a registered class
pub type ClassRef = Arc<ClassInfo>;

type Body = Box<dyn Fn(&Target, &Arguments) -> BridgeResult<DynValue> + Send + Sync>;

// ============================================================================
// Target
// ============================================================================

/// What an operation runs against
#[derive(Debug, Clone)]
pub enum Target {
    /// An existing instance
    Instance(ObjectRef),
    /// The class itself (construction and class methods)
    Class(ClassRef),
}

impl Target {
    /// Instance reference, if this is an instance target
    pub fn instance(&self) -> Option<&ObjectRef> {
        match self {
            Target::Instance(obj) => Some(obj),
            Target::Class(_) => None,
        }
    }
}

// ============================================================================
// Operation
// ============================================================================

/// Kind of a declared operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Creates a new instance; runs against the class
    Initializer,
    /// Runs against an instance
    Method,
    /// Runs against the class
    ClassMethod,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Initializer => write!(f, "initializer"),
            OperationKind::Method => write!(f, "method"),
            OperationKind::ClassMethod => write!(f, "class method"),
        }
    }
}

/// A declared operation: name, kind, signature and body
pub struct Operation {
    name: String,
    class: String,
    kind: OperationKind,
    signature: Signature,
    body: Body,
}

impl Operation {
    /// Operation identifier
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the declaring class
    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Operation kind
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Declared signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Run the body and tag its value by the declared return type.
    ///
    /// Initializer failures surface as `ConstructionFailure`.
    pub fn invoke(&self, target: &Target, args: &Arguments) -> BridgeResult<CallResult> {
        let value = (self.body)(target, args).map_err(|err| match (self.kind, err) {
            (OperationKind::Initializer, err @ BridgeError::ConstructionFailure { .. })
            | (OperationKind::Initializer, err @ BridgeError::Panicked { .. }) => err,
            (OperationKind::Initializer, err) => BridgeError::ConstructionFailure {
                class: self.class.clone(),
                reason: err.to_string(),
            },
            (_, err) => err,
        })?;
        self.signature.classify(&self.name, value)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("kind", &self.kind)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Property
// ============================================================================

/// A named property and the methods that access it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    name: String,
    getter: String,
    setter: Option<String>,
}

impl Property {
    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Getter method name
    pub fn getter(&self) -> &str {
        &self.getter
    }

    /// Setter method name, `None` when read-only
    pub fn setter(&self) -> Option<&str> {
        self.setter.as_deref()
    }

    /// Check for a read-only property
    pub fn is_readonly(&self) -> bool {
        self.setter.is_none()
    }
}

/// Default setter name for a property: `x` becomes `setX:`
pub fn default_setter_name(property: &str) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("set{}{}:", first.to_uppercase(), chars.as_str()),
        None => "set:".to_string(),
    }
}

// ============================================================================
// ClassInfo
// ============================================================================

/// A registered class and its operation tables
pub struct ClassInfo {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    initializers: HashMap<String, Arc<Operation>>,
    methods: HashMap<String, Arc<Operation>>,
    class_methods: HashMap<String, Arc<Operation>>,
    properties: HashMap<String, Property>,
}

impl ClassInfo {
    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `TypeId` of the instances this class describes
    pub fn instance_type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name of the instances
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Look up an initializer
    pub fn initializer(&self, name: &str) -> Option<&Arc<Operation>> {
        self.initializers.get(name)
    }

    /// Look up an instance method
    pub fn method(&self, name: &str) -> Option<&Arc<Operation>> {
        self.methods.get(name)
    }

    /// Look up a class method
    pub fn class_method(&self, name: &str) -> Option<&Arc<Operation>> {
        self.class_methods.get(name)
    }

    /// Look up a property
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Resolve an operation of the given kind or fail with `UnresolvedOperation`
    pub fn resolve(&self, kind: OperationKind, name: &str) -> BridgeResult<Arc<Operation>> {
        let table = match kind {
            OperationKind::Initializer => &self.initializers,
            OperationKind::Method => &self.methods,
            OperationKind::ClassMethod => &self.class_methods,
        };
        table
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::UnresolvedOperation {
                class: self.name.clone(),
                operation: name.to_string(),
            })
    }

    /// Names of all declared operations of a kind, sorted
    pub fn operation_names(&self, kind: OperationKind) -> Vec<&str> {
        let table = match kind {
            OperationKind::Initializer => &self.initializers,
            OperationKind::Method => &self.methods,
            OperationKind::ClassMethod => &self.class_methods,
        };
        let mut names: Vec<&str> = table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("initializers", &self.operation_names(OperationKind::Initializer))
            .field("methods", &self.operation_names(OperationKind::Method))
            .field("class_methods", &self.operation_names(OperationKind::ClassMethod))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ClassDef
// ============================================================================

/// Builder describing a native type `T` as a class
pub struct ClassDef<T> {
    name: String,
    initializers: Vec<Operation>,
    methods: Vec<Operation>,
    class_methods: Vec<Operation>,
    properties: Vec<Property>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ClassDef<T> {
    /// Start a definition for class `name`
    pub fn new(name: impl Into<String>) -> Self {
        ClassDef {
            name: name.into(),
            initializers: Vec::new(),
            methods: Vec::new(),
            class_methods: Vec::new(),
            properties: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn operation(
        &self,
        name: &str,
        kind: OperationKind,
        params: &[ValueType],
        returns: ValueType,
        body: Body,
    ) -> Operation {
        Operation {
            name: name.to_string(),
            class: self.name.clone(),
            kind,
            signature: Signature::new(params.to_vec(), returns),
            body,
        }
    }

    /// Declare an initializer. The new instance is returned as an object.
    pub fn initializer<F>(mut self, name: &str, params: &[ValueType], init: F) -> Self
    where
        F: Fn(&Arguments) -> BridgeResult<T> + Send + Sync + 'static,
    {
        let body: Body = Box::new(move |_, args| init(args).map(|v| ObjectRef::new(v).into()));
        let op = self.operation(name, OperationKind::Initializer, params, ValueType::Object, body);
        self.initializers.push(op);
        self
    }

    /// Declare an instance method
    pub fn method<F, R>(
        mut self,
        name: &str,
        params: &[ValueType],
        returns: ValueType,
        f: F,
    ) -> Self
    where
        F: Fn(&T, &Arguments) -> BridgeResult<R> + Send + Sync + 'static,
        R: Into<DynValue>,
    {
        let op_name = name.to_string();
        let body: Body = Box::new(move |target, args| {
            let receiver = receiver::<T>(target, &op_name)?;
            f(receiver, args).map(Into::into)
        });
        let op = self.operation(name, OperationKind::Method, params, returns, body);
        self.methods.push(op);
        self
    }

    /// Declare a class method
    pub fn class_method<F, R>(
        mut self,
        name: &str,
        params: &[ValueType],
        returns: ValueType,
        f: F,
    ) -> Self
    where
        F: Fn(&Arguments) -> BridgeResult<R> + Send + Sync + 'static,
        R: Into<DynValue>,
    {
        let body: Body = Box::new(move |_, args| f(args).map(Into::into));
        let op = self.operation(name, OperationKind::ClassMethod, params, returns, body);
        self.class_methods.push(op);
        self
    }

    /// Declare a read-write property backed by a getter named after the
    /// property and a `set<Name>:` setter.
    pub fn property<G, S, R>(self, name: &str, ty: ValueType, get: G, set: S) -> Self
    where
        G: Fn(&T) -> BridgeResult<R> + Send + Sync + 'static,
        S: Fn(&T, &Arguments) -> BridgeResult<()> + Send + Sync + 'static,
        R: Into<DynValue>,
    {
        let setter = default_setter_name(name);
        self.method(name, &[], ty, move |obj, _| get(obj))
            .method(&setter, &[ty], ValueType::Void, set)
            .property_accessors(name, name, Some(&setter))
    }

    /// Declare a read-only property backed by a getter named after it
    pub fn readonly_property<G, R>(self, name: &str, ty: ValueType, get: G) -> Self
    where
        G: Fn(&T) -> BridgeResult<R> + Send + Sync + 'static,
        R: Into<DynValue>,
    {
        self.method(name, &[], ty, move |obj, _| get(obj))
            .property_accessors(name, name, None)
    }

    /// Declare a property whose accessors are existing methods with custom
    /// names. `setter: None` makes it read-only.
    pub fn property_accessors(mut self, name: &str, getter: &str, setter: Option<&str>) -> Self {
        self.properties.retain(|p| p.name != name);
        self.properties.push(Property {
            name: name.to_string(),
            getter: getter.to_string(),
            setter: setter.map(str::to_string),
        });
        self
    }

    /// Finish the definition
    pub fn build(self) -> ClassInfo {
        fn table(ops: Vec<Operation>) -> HashMap<String, Arc<Operation>> {
            // Later declarations replace earlier ones with the same name
            ops.into_iter().map(|op| (op.name.clone(), Arc::new(op))).collect()
        }

        ClassInfo {
            name: self.name,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            initializers: table(self.initializers),
            methods: table(self.methods),
            class_methods: table(self.class_methods),
            properties: self
                .properties
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
        }
    }
}

fn receiver<'a, T: Any>(target: &'a Target, operation: &str) -> BridgeResult<&'a T> {
    let obj = target.instance().ok_or_else(|| BridgeError::TypeMismatch {
        expected: format!("instance receiver for {}", operation),
        got: "class".to_string(),
    })?;
    obj.downcast_ref::<T>().ok_or_else(|| BridgeError::TypeMismatch {
        expected: std::any::type_name::<T>().to_string(),
        got: obj.type_name().to_string(),
    })
}
