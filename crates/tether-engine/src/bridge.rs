//! Bridge facade
//!
//! Bundles a class registry with a dispatcher and exposes the entry points the
//! scripting layer uses: construct, call and async call, each optionally
//! pinned to a context.

use std::sync::Arc;

use tether_sdk::{BridgeError, BridgeResult, CallResult, ClassRegistry, DynValue, ObjectRef};

use crate::builder::CallBuilder;
use crate::config::BridgeConfig;
use crate::context::{ContextHandle, ContextThread};
use crate::dispatch::Dispatcher;
use crate::invocation::Invocation;

/// Registry plus dispatcher; cheap to clone
#[derive(Debug, Clone)]
pub struct Bridge {
    registry: Arc<ClassRegistry>,
    dispatcher: Arc<Dispatcher>,
    background: Option<Arc<ContextThread>>,
}

impl Bridge {
    /// Create a bridge over `registry` with the timeout from `config`.
    ///
    /// `config.default_context` is not started; see [`Bridge::from_config`].
    pub fn new(registry: ClassRegistry, config: &BridgeConfig) -> Self {
        Self::with_dispatcher(registry, Dispatcher::new(config))
    }

    /// Create a bridge from `config`, starting its default context.
    ///
    /// When `default_context` is set, a `ContextThread` of that name is
    /// spawned and receives async calls made from threads without a run
    /// loop. The thread stops when the last clone of the bridge is dropped.
    pub fn from_config(registry: ClassRegistry, config: &BridgeConfig) -> BridgeResult<Self> {
        let dispatcher = Dispatcher::new(config);
        let background = match &config.default_context {
            Some(name) => {
                let thread = ContextThread::spawn(name.as_str())?;
                dispatcher.set_default_context(Some(thread.handle()));
                Some(Arc::new(thread))
            }
            None => None,
        };
        tracing::debug!(
            classes = registry.len(),
            default_context = config.default_context.as_deref().unwrap_or("-"),
            "bridge ready"
        );
        Ok(Bridge {
            registry: Arc::new(registry),
            dispatcher: Arc::new(dispatcher),
            background,
        })
    }

    /// Create a bridge with a preconfigured dispatcher
    pub fn with_dispatcher(registry: ClassRegistry, dispatcher: Dispatcher) -> Self {
        Bridge {
            registry: Arc::new(registry),
            dispatcher: Arc::new(dispatcher),
            background: None,
        }
    }

    /// Background context started by [`Bridge::from_config`]
    pub fn background_context(&self) -> Option<ContextHandle> {
        self.background.as_ref().map(|thread| thread.handle())
    }

    /// Class registry
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Dispatcher
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Call builder over the registry
    pub fn builder(&self) -> CallBuilder<'_> {
        CallBuilder::new(&self.registry)
    }

    /// Construct an instance of `class` on the calling thread
    pub fn construct(
        &self,
        class: &str,
        initializer: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<ObjectRef> {
        let class_ref = self.registry.class_named(class)?;
        let call = self.builder().build_construction(&class_ref, initializer, args)?;
        expect_instance(class, self.dispatcher.execute_sync(call)?)
    }

    /// Construct an instance of `class` on `context`
    pub fn construct_on(
        &self,
        context: &ContextHandle,
        class: &str,
        initializer: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<ObjectRef> {
        let class_ref = self.registry.class_named(class)?;
        let call = self.builder().build_construction(&class_ref, initializer, args)?;
        expect_instance(class, self.dispatcher.execute_sync_on(context, call)?)
    }

    /// Call `operation` on `target` and wait for the result
    pub fn call(
        &self,
        target: &ObjectRef,
        operation: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<CallResult> {
        let call = self.builder().build_call(target, operation, args)?;
        self.dispatcher.execute_sync(call)
    }

    /// Call `operation` on `target` on `context` and wait for the result
    pub fn call_on(
        &self,
        context: &ContextHandle,
        target: &ObjectRef,
        operation: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<CallResult> {
        let call = self.builder().build_call(target, operation, args)?;
        self.dispatcher.execute_sync_on(context, call)
    }

    /// Call a class method and wait for the result
    pub fn call_class(
        &self,
        class: &str,
        operation: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<CallResult> {
        let class_ref = self.registry.class_named(class)?;
        let call = self.builder().build_class_call(&class_ref, operation, args)?;
        self.dispatcher.execute_sync(call)
    }

    /// Fire-and-forget call of `operation` on `target`
    pub fn async_call(
        &self,
        target: &ObjectRef,
        operation: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<()> {
        let call = self.builder().build_call(target, operation, args)?;
        self.dispatcher.execute_async(call)
    }

    /// Fire-and-forget call of `operation` on `target`, queued on `context`
    pub fn async_call_on(
        &self,
        context: &ContextHandle,
        target: &ObjectRef,
        operation: &str,
        args: impl IntoIterator<Item = DynValue>,
    ) -> BridgeResult<()> {
        let call = self.builder().build_call(target, operation, args)?;
        self.dispatcher.execute_async_on(context, call)
    }

    /// Bind `target` to an optional context
    pub fn invocation(&self, target: ObjectRef, context: Option<ContextHandle>) -> Invocation {
        Invocation::new(self.clone(), target, context)
    }
}

fn expect_instance(class: &str, result: CallResult) -> BridgeResult<ObjectRef> {
    result
        .into_object()
        .ok_or_else(|| BridgeError::ConstructionFailure {
            class: class.to_string(),
            reason: "initializer returned no instance".to_string(),
        })
}
