//! Invocation objects
//!
//! An `Invocation` binds a target instance to an optional context. Calls
//! made through it are routed to that context; with no context they run on
//! the caller's thread. Properties are read and written through their
//! declared getter and setter methods.

use tether_sdk::{BridgeError, BridgeResult, CallResult, DynValue, ObjectRef, Property};

use crate::bridge::Bridge;
use crate::builder::CallDescriptor;
use crate::context::ContextHandle;

/// A target bound to an optional execution context
#[derive(Debug, Clone)]
pub struct Invocation {
    bridge: Bridge,
    target: ObjectRef,
    context: Option<ContextHandle>,
}

impl Invocation {
    /// Bind `target` to `context`
    pub fn new(bridge: Bridge, target: ObjectRef, context: Option<ContextHandle>) -> Self {
        Invocation {
            bridge,
            target,
            context,
        }
    }

    /// Target instance
    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    /// Bound context
    pub fn context(&self) -> Option<&ContextHandle> {
        self.context.as_ref()
    }

    /// Call `operation` and wait for the result
    pub fn call(
        &self,
        operation: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<CallResult> {
        let call = self.build(operation, args)?;
        let dispatcher = self.bridge.dispatcher();
        match &self.context {
            Some(context) => dispatcher.execute_sync_on(context, call),
            None => dispatcher.execute_sync(call),
        }
    }

    /// Call `operation` without waiting
    pub fn async_call(
        &self,
        operation: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<()> {
        let call = self.build(operation, args)?;
        let dispatcher = self.bridge.dispatcher();
        match &self.context {
            Some(context) => dispatcher.execute_async_on(context, call),
            None => dispatcher.execute_async(call),
        }
    }

    /// Read a property through its getter
    pub fn value_of(&self, property: &str) -> BridgeResult<CallResult> {
        let property = self.property(property)?;
        self.call(property.getter(), Vec::new())
    }

    /// Write a property through its setter
    pub fn set_value(&self, property: &str, value: impl Into<DynValue>) -> BridgeResult<()> {
        let property = self.property(property)?;
        let class = self.bridge.registry().class_for(&self.target)?;
        let setter = property
            .setter()
            .ok_or_else(|| BridgeError::ReadOnlyProperty {
                class: class.name().to_string(),
                property: property.name().to_string(),
            })?;
        self.call(setter, vec![value.into()]).map(|_| ())
    }

    fn property(&self, name: &str) -> BridgeResult<Property> {
        let class = self.bridge.registry().class_for(&self.target)?;
        class
            .property(name)
            .cloned()
            .ok_or_else(|| BridgeError::UnresolvedOperation {
                class: class.name().to_string(),
                operation: name.to_string(),
            })
    }

    fn build(
        &self,
        operation: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<CallDescriptor> {
        let call = self.bridge.builder().build_call(&self.target, operation, args)?;
        Ok(match &self.context {
            Some(context) => call.on(context.clone()),
            None => call,
        })
    }
}
