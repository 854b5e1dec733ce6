use std::{sync::Arc, time::Duration};

use arbor_registry::{DynError, Instance};

use crate::{
    class::DynBeanClass,
    errors::{ConversionError, RecipeError},
    inject::FromValue,
    metadata::{Availability, Scope},
    proxy::ProxyFactory,
    recipe::{Dependency, Recipe, RecipeId, RecipeKind},
    tracker::{BoundListener, ReferenceBinding},
    value::Value,
};

/// Class and callbacks of one reference listener, the instance is a dependency
#[derive(Clone)]
pub(crate) struct ListenerCallbacks {
    pub(crate) class: Arc<dyn DynBeanClass>,
    pub(crate) bind: Option<String>,
    pub(crate) unbind: Option<String>,
}

/// Pairs the listener values with their callbacks and attaches them to the binding
fn attach_listeners(
    recipe: &RecipeId,
    binding: &ReferenceBinding,
    callbacks: &[ListenerCallbacks],
    values: impl Iterator<Item = Value>,
) -> Result<(), RecipeError> {
    let mut listeners = Vec::with_capacity(callbacks.len());
    for (callback, value) in callbacks.iter().zip(values) {
        let instance =
            Instance::from_value(value).map_err(|error| RecipeError::Injection {
                recipe: recipe.clone(),
                target: "listener".to_string(),
                error,
            })?;
        listeners.push(BoundListener {
            instance,
            class: callback.class.clone(),
            bind: callback.bind.clone(),
            unbind: callback.unbind.clone(),
        });
    }

    if !listeners.is_empty() {
        binding.attach_listeners(listeners);
        binding.sync_listeners();
    }
    Ok(())
}

/// A single external service, produced as a [crate::proxy::ReferenceProxy]
///
/// Dependencies: the default bean if any, then the listeners, then `depends_on`.
pub struct ReferenceRecipe {
    id: RecipeId,
    binding: Arc<ReferenceBinding>,
    availability: Availability,
    timeout: Duration,
    has_default: bool,
    listeners: Vec<ListenerCallbacks>,
    dependencies: Vec<Dependency>,
}

impl ReferenceRecipe {
    pub(crate) fn new(
        id: RecipeId,
        binding: Arc<ReferenceBinding>,
        availability: Availability,
        timeout: Duration,
        has_default: bool,
        listeners: Vec<ListenerCallbacks>,
        dependencies: Vec<Dependency>,
    ) -> Self {
        Self {
            id,
            binding,
            availability,
            timeout,
            has_default,
            listeners,
            dependencies,
        }
    }
}

impl Recipe for ReferenceRecipe {
    fn id(&self) -> &RecipeId {
        &self.id
    }

    fn kind(&self) -> RecipeKind {
        RecipeKind::Reference
    }

    fn scope(&self) -> Scope {
        Scope::Singleton
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    fn create(&self, dependencies: Vec<Value>) -> Result<Value, RecipeError> {
        let mut values = dependencies.into_iter();
        let fallback = match self.has_default {
            true => {
                let value = values.next().ok_or_else(|| RecipeError::Injection {
                    recipe: self.id.clone(),
                    target: "default bean".to_string(),
                    error: ConversionError::MissingArgument(1),
                })?;
                Some(Instance::from_value(value).map_err(|error| {
                    RecipeError::Injection {
                        recipe: self.id.clone(),
                        target: "default bean".to_string(),
                        error,
                    }
                })?)
            }
            false => None,
        };

        attach_listeners(&self.id, &self.binding, &self.listeners, values)?;

        Ok(Value::Reference(ProxyFactory::reference(
            self.binding.clone(),
            self.availability,
            self.timeout,
            fallback,
        )))
    }

    fn destroy(&self, _value: &Value) -> Result<(), DynError> {
        self.binding.detach_listeners();
        Ok(())
    }

    fn binding(&self) -> Option<&Arc<ReferenceBinding>> {
        Some(&self.binding)
    }
}

/// All matching external services, produced as a [crate::proxy::ReferenceList]
///
/// Dependencies: the listeners, then `depends_on`.
pub struct ReferenceListRecipe {
    id: RecipeId,
    binding: Arc<ReferenceBinding>,
    listeners: Vec<ListenerCallbacks>,
    dependencies: Vec<Dependency>,
}

impl ReferenceListRecipe {
    pub(crate) fn new(
        id: RecipeId,
        binding: Arc<ReferenceBinding>,
        listeners: Vec<ListenerCallbacks>,
        dependencies: Vec<Dependency>,
    ) -> Self {
        Self {
            id,
            binding,
            listeners,
            dependencies,
        }
    }
}

impl Recipe for ReferenceListRecipe {
    fn id(&self) -> &RecipeId {
        &self.id
    }

    fn kind(&self) -> RecipeKind {
        RecipeKind::ReferenceList
    }

    fn scope(&self) -> Scope {
        Scope::Singleton
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    fn create(&self, dependencies: Vec<Value>) -> Result<Value, RecipeError> {
        attach_listeners(&self.id, &self.binding, &self.listeners, dependencies.into_iter())?;
        Ok(Value::ReferenceList(ProxyFactory::reference_list(
            self.binding.clone(),
        )))
    }

    fn destroy(&self, _value: &Value) -> Result<(), DynError> {
        self.binding.detach_listeners();
        Ok(())
    }

    fn binding(&self) -> Option<&Arc<ReferenceBinding>> {
        Some(&self.binding)
    }
}
