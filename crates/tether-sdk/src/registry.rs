//! Class registry
//!
//! Maps class names and concrete Rust types to their registered `ClassInfo`.
//! Instances are resolved to their class through the `TypeId` of the object
//! behind an `ObjectRef`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::class::{ClassDef, ClassRef};
use crate::error::{BridgeError, BridgeResult};
use crate::value::ObjectRef;

/// Registry of exposed classes
#[derive(Debug, Default)]
pub struct ClassRegistry {
    by_name: HashMap<String, ClassRef>,
    by_type: HashMap<TypeId, ClassRef>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class definition.
    ///
    /// Registering a name or type again replaces the previous class.
    pub fn register<T: Any + Send + Sync>(&mut self, def: ClassDef<T>) -> ClassRef {
        let class = Arc::new(def.build());
        if let Some(old) = self.by_name.remove(class.name()) {
            self.by_type.remove(&old.instance_type_id());
        }
        if let Some(old) = self.by_type.remove(&class.instance_type_id()) {
            self.by_name.remove(old.name());
        }
        self.by_name.insert(class.name().to_string(), class.clone());
        self.by_type.insert(class.instance_type_id(), class.clone());
        class
    }

    /// Look up a class by name
    pub fn class_named(&self, name: &str) -> BridgeResult<ClassRef> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::UnresolvedClass(name.to_string()))
    }

    /// Look up the class registered for `T`
    pub fn class_of<T: Any>(&self) -> BridgeResult<ClassRef> {
        self.by_type
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| BridgeError::UnresolvedClass(std::any::type_name::<T>().to_string()))
    }

    /// Resolve the dynamic class of an instance
    pub fn class_for(&self, obj: &ObjectRef) -> BridgeResult<ClassRef> {
        self.by_type
            .get(&obj.concrete_type_id())
            .cloned()
            .ok_or_else(|| BridgeError::UnresolvedClass(obj.type_name().to_string()))
    }

    /// Check whether a class name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Check for an empty registry
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Registered class names, sorted
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;

    struct Alpha;
    struct Beta;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ClassRegistry::new();
        let alpha = registry.register(ClassDef::<Alpha>::new("Alpha"));
        registry.register(
            ClassDef::<Beta>::new("Beta").method("ping", &[], ValueType::Bool, |_, _| Ok(true)),
        );

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.class_names(), vec!["Alpha", "Beta"]);
        assert!(Arc::ptr_eq(&registry.class_named("Alpha").unwrap(), &alpha));
        assert!(Arc::ptr_eq(&registry.class_of::<Alpha>().unwrap(), &alpha));

        let obj = ObjectRef::new(Beta);
        assert_eq!(registry.class_for(&obj).unwrap().name(), "Beta");
    }

    #[test]
    fn test_instances_resolve_to_their_own_class() {
        let mut registry = ClassRegistry::new();
        let alpha = registry.register(ClassDef::<Alpha>::new("Alpha"));
        let beta = registry.register(ClassDef::<Beta>::new("Beta"));
        assert_ne!(alpha.instance_type_id(), beta.instance_type_id());

        let a = registry.class_for(&ObjectRef::new(Alpha)).unwrap();
        let b = registry.class_for(&ObjectRef::new(Beta)).unwrap();
        assert!(Arc::ptr_eq(&a, &alpha));
        assert!(Arc::ptr_eq(&b, &beta));
        assert!(registry.contains("Alpha") && registry.contains("Beta"));
    }

    #[test]
    fn test_unregistered_type() {
        let registry = ClassRegistry::new();
        let obj = ObjectRef::new(42u32);
        assert_eq!(
            registry.class_for(&obj).unwrap_err(),
            BridgeError::UnresolvedClass("u32".into())
        );
        assert!(matches!(
            registry.class_named("Nope"),
            Err(BridgeError::UnresolvedClass(_))
        ));
    }

    #[test]
    fn test_reregister_replaces() {
        let mut registry = ClassRegistry::new();
        registry.register(ClassDef::<Alpha>::new("First"));
        registry.register(ClassDef::<Alpha>::new("Second"));
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains("First"));
        assert_eq!(registry.class_of::<Alpha>().unwrap().name(), "Second");
    }
}
