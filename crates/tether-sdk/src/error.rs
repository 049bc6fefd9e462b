//! Error types for the invocation bridge

use std::time::Duration;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// No class is registered under this name or for this concrete type
    #[error("Unresolved class: {0}")]
    UnresolvedClass(String),

    /// The operation is not declared on the resolved class
    #[error("Unresolved operation: {class}.{operation}")]
    UnresolvedOperation {
        /// Class the operation was resolved against
        class: String,
        /// Operation identifier
        operation: String,
    },

    /// Argument count or type cannot be converted to the declared parameters
    #[error("Argument mismatch for {operation}: {reason}")]
    ArgumentMismatch {
        /// Operation identifier
        operation: String,
        /// What did not convert
        reason: String,
    },

    /// A declared parameter or return type has no dynamic-value mapping
    #[error("Unsupported type '{ty}' in signature of {operation}")]
    UnsupportedType {
        /// Operation identifier
        operation: String,
        /// Declared type name
        ty: String,
    },

    /// The initializer rejected its arguments
    #[error("Construction of {class} failed: {reason}")]
    ConstructionFailure {
        /// Class being constructed
        class: String,
        /// Reason reported by the initializer
        reason: String,
    },

    /// An operation produced a value outside its declared return type
    #[error("Return mismatch for {operation}: declared {declared}, got {got}")]
    ReturnMismatch {
        /// Operation identifier
        operation: String,
        /// Declared return type
        declared: String,
        /// Dynamic type actually produced
        got: String,
    },

    /// Type mismatch while reading a packed argument inside an operation
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Attempt to set a property that has no setter
    #[error("Property {class}.{property} is read-only")]
    ReadOnlyProperty {
        /// Class declaring the property
        class: String,
        /// Property name
        property: String,
    },

    /// The target context did not run a synchronous call in time
    #[error("Context '{context}' did not service the call within {timeout:?}")]
    DeadlockRisk {
        /// Target context name
        context: String,
        /// How long the caller waited
        timeout: Duration,
    },

    /// The target context's run loop no longer exists
    #[error("Context '{0}' is closed")]
    ContextClosed(String),

    /// A context thread could not be started
    #[error("Failed to start context '{context}': {reason}")]
    ContextSpawn {
        /// Context name
        context: String,
        /// OS error text
        reason: String,
    },

    /// The operation panicked while running on another context
    #[error("Operation {operation} panicked: {message}")]
    Panicked {
        /// Operation identifier
        operation: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// Error raised by the invoked operation itself
    #[error("{0}")]
    Operation(String),
}

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::Operation(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::Operation(s.to_string())
    }
}
