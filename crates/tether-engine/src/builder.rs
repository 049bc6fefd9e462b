//! Call descriptors and the builder that produces them
//!
//! The builder resolves an operation name against the target's registered
//! class, validates the declared signature and packs the dynamic argument
//! list. Every failure is reported here, before anything is dispatched.

use std::sync::Arc;

use tether_sdk::{
    Arguments, BridgeResult, ClassRef, ClassRegistry, DynValue, ObjectRef, Operation,
    OperationKind, Target,
};

use crate::context::ContextHandle;

/// Where a descriptor must run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExecutionConstraint {
    /// Wherever the dispatcher is called from
    #[default]
    Unconstrained,
    /// On a specific context
    On(ContextHandle),
}

/// A signature-checked deferred call.
///
/// Immutable once built. Dispatching consumes it.
#[derive(Debug)]
pub struct CallDescriptor {
    target: Target,
    operation: Arc<Operation>,
    args: Arguments,
    constraint: ExecutionConstraint,
}

impl CallDescriptor {
    /// Target the operation runs against
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Resolved operation
    pub fn operation(&self) -> &Arc<Operation> {
        &self.operation
    }

    /// Packed arguments
    pub fn args(&self) -> &Arguments {
        &self.args
    }

    /// Execution-context constraint
    pub fn constraint(&self) -> &ExecutionConstraint {
        &self.constraint
    }

    /// Pin the call to `context`
    pub fn on(self, context: ContextHandle) -> Self {
        CallDescriptor {
            constraint: ExecutionConstraint::On(context),
            ..self
        }
    }

    /// `Class.operation`, for logging
    pub fn describe(&self) -> String {
        format!("{}.{}", self.operation.class_name(), self.operation.name())
    }
}

/// Builds call descriptors against a class registry
#[derive(Debug, Clone, Copy)]
pub struct CallBuilder<'a> {
    registry: &'a ClassRegistry,
}

impl<'a> CallBuilder<'a> {
    /// Create a builder over `registry`
    pub fn new(registry: &'a ClassRegistry) -> Self {
        CallBuilder { registry }
    }

    /// Registry this builder resolves against
    pub fn registry(&self) -> &'a ClassRegistry {
        self.registry
    }

    /// Descriptor creating a new instance of `class` via `initializer`
    pub fn build_construction(
        &self,
        class: &ClassRef,
        initializer: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<CallDescriptor> {
        let operation = class.resolve(OperationKind::Initializer, initializer)?;
        Self::pack(Target::Class(class.clone()), operation, args)
    }

    /// Descriptor calling `operation` on an existing instance.
    ///
    /// The operation is resolved against the instance's registered class.
    pub fn build_call(
        &self,
        target: &ObjectRef,
        operation: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<CallDescriptor> {
        let class = self.registry.class_for(target)?;
        let operation = class.resolve(OperationKind::Method, operation)?;
        Self::pack(Target::Instance(target.clone()), operation, args)
    }

    /// Descriptor calling a class method of `class`
    pub fn build_class_call(
        &self,
        class: &ClassRef,
        operation: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<CallDescriptor> {
        let operation = class.resolve(OperationKind::ClassMethod, operation)?;
        Self::pack(Target::Class(class.clone()), operation, args)
    }

    fn pack(
        target: Target,
        operation: Arc<Operation>,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<CallDescriptor> {
        let args = operation
            .signature()
            .pack(operation.name(), args.into_iter().collect())?;
        tracing::trace!(
            class = operation.class_name(),
            operation = operation.name(),
            args = args.len(),
            "call built"
        );
        Ok(CallDescriptor {
            target,
            operation,
            args,
            constraint: ExecutionConstraint::Unconstrained,
        })
    }
}
