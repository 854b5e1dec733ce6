use std::{any::type_name, collections::HashMap, sync::Arc};

use arbor_registry::{DynError, Injectable, Instance, ServiceReference, TypeInfo};

use crate::{
    errors::{ConversionError, DefinitionError},
    inject::{Expect, FromValue},
    value::Value,
};

type Constructor<T> = Box<dyn Fn(&mut Arguments) -> Result<T, DynError> + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> Result<(), ConversionError> + Send + Sync>;
type Method<T> = Box<dyn Fn(&T) -> Result<(), DynError> + Send + Sync>;
type ListenerMethod<T> = Box<dyn Fn(&T, &ServiceReference) -> Result<(), DynError> + Send + Sync>;

/// Describes how beans of type `T` are constructed and wired
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use arbor_di::BeanClass;
///
/// #[derive(Default)]
/// struct Cache {
///     capacity: usize,
/// }
///
/// let class = BeanClass::<Cache>::with_default("Cache")
///     .property("capacity", |cache: &mut Cache, capacity: usize| cache.capacity = capacity)
///     .method("clear", |_cache| Ok(()));
/// ```
pub struct BeanClass<T: Injectable> {
    name: String,
    constructor: Constructor<T>,
    properties: HashMap<String, (Expect, Setter<T>)>,
    methods: HashMap<String, Method<T>>,
    listener_methods: HashMap<String, ListenerMethod<T>>,
}

impl<T: Injectable> BeanClass<T> {
    pub fn new(
        name: impl Into<String>,
        constructor: impl Fn(&mut Arguments) -> Result<T, DynError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            constructor: Box::new(constructor),
            properties: HashMap::new(),
            methods: HashMap::new(),
            listener_methods: HashMap::new(),
        }
    }

    /// Constructed through `Default`, taking no arguments
    pub fn with_default(name: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self::new(name, |_| Ok(T::default()))
    }

    /// A settable property, the accepted value kind follows from `V`
    pub fn property<V: FromValue + 'static>(
        mut self,
        name: impl Into<String>,
        setter: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        let setter = move |target: &mut T, value: Value| -> Result<(), ConversionError> {
            setter(target, V::from_value(value)?);
            Ok(())
        };
        self.properties
            .insert(name.into(), (V::expects(), Box::new(setter)));
        self
    }

    /// A method usable as init or destroy method
    pub fn method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&T) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Box::new(method));
        self
    }

    /// A callback of a reference listener or a registration listener
    pub fn listener(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&T, &ServiceReference) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        self.listener_methods.insert(name.into(), Box::new(method));
        self
    }

    fn downcast(instance: &Instance) -> Result<Arc<T>, DynError> {
        instance.downcast::<T>().map_err(|actual_type| {
            ConversionError::DowncastFailed {
                required_type: type_name::<T>(),
                actual_type,
            }
            .into()
        })
    }
}

/// Errors while constructing through a [DynBeanClass]
#[derive(Debug)]
pub enum ConstructError {
    Constructor(DynError),
    Property {
        property: String,
        error: ConversionError,
    },
    UnknownProperty(String),
}

/// Type-erased bean class
pub trait DynBeanClass: Send + Sync {
    fn name(&self) -> &str;

    fn provides(&self) -> TypeInfo;

    /// None if there is no such property
    fn property_expect(&self, property: &str) -> Option<Expect>;

    fn has_method(&self, method: &str) -> bool;

    fn has_listener(&self, method: &str) -> bool;

    /// Runs the constructor, then sets the properties in order
    fn construct(
        &self,
        arguments: Vec<Value>,
        properties: Vec<(String, Value)>,
    ) -> Result<Instance, ConstructError>;

    fn invoke(&self, method: &str, instance: &Instance) -> Result<(), DynError>;

    fn invoke_listener(
        &self,
        method: &str,
        instance: &Instance,
        reference: &ServiceReference,
    ) -> Result<(), DynError>;
}

impl<T: Injectable> DynBeanClass for BeanClass<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn provides(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn property_expect(&self, property: &str) -> Option<Expect> {
        self.properties.get(property).map(|(expect, _)| *expect)
    }

    fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    fn has_listener(&self, method: &str) -> bool {
        self.listener_methods.contains_key(method)
    }

    fn construct(
        &self,
        arguments: Vec<Value>,
        properties: Vec<(String, Value)>,
    ) -> Result<Instance, ConstructError> {
        let mut arguments = Arguments::new(arguments);
        let mut bean = (self.constructor)(&mut arguments).map_err(ConstructError::Constructor)?;

        for (property, value) in properties {
            let Some((_, setter)) = self.properties.get(&property) else {
                return Err(ConstructError::UnknownProperty(property));
            };
            setter(&mut bean, value).map_err(|error| ConstructError::Property { property, error })?;
        }

        Ok(Instance::new(bean))
    }

    fn invoke(&self, method: &str, instance: &Instance) -> Result<(), DynError> {
        let target = Self::downcast(instance)?;
        match self.methods.get(method) {
            Some(method) => method(&target),
            None => Err(format!("Class '{}' has no method '{method}'", self.name).into()),
        }
    }

    fn invoke_listener(
        &self,
        method: &str,
        instance: &Instance,
        reference: &ServiceReference,
    ) -> Result<(), DynError> {
        let target = Self::downcast(instance)?;
        match self.listener_methods.get(method) {
            Some(method) => method(&target, reference),
            None => Err(format!("Class '{}' has no listener '{method}'", self.name).into()),
        }
    }
}

/// Positional constructor arguments
pub struct Arguments {
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Arguments {
    pub(crate) fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Converts the next argument
    pub fn take<V: FromValue>(&mut self) -> Result<V, ConversionError> {
        self.position += 1;
        let value = self
            .values
            .next()
            .ok_or(ConversionError::MissingArgument(self.position))?;
        V::from_value(value)
    }

    /// Converts the next argument if there is one
    pub fn take_optional<V: FromValue>(&mut self) -> Result<Option<V>, ConversionError> {
        match self.values.len() {
            0 => Ok(None),
            _ => self.take().map(Some),
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

/// All bean classes a container can instantiate, by name
#[derive(Default, Clone)]
pub struct ClassRegistry {
    classes: HashMap<String, Arc<dyn DynBeanClass>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class, names must be unique
    pub fn register<T: Injectable>(
        &mut self,
        class: BeanClass<T>,
    ) -> Result<&mut Self, DefinitionError> {
        if self.classes.contains_key(class.name()) {
            return Err(DefinitionError::DuplicateClass(class.name));
        }
        self.classes.insert(class.name.clone(), Arc::new(class));
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn DynBeanClass>> {
        self.classes.get(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
