use std::sync::Arc;

use arbor_registry::DynError;

use crate::{
    class::{ConstructError, DynBeanClass},
    errors::RecipeError,
    metadata::Scope,
    recipe::{Dependency, Recipe, RecipeId, RecipeKind},
    value::Value,
};

/// An object built through a registered bean class
///
/// Dependencies are laid out as constructor arguments, then properties, then `depends_on`.
pub struct BeanRecipe {
    id: RecipeId,
    class: Arc<dyn DynBeanClass>,
    scope: Scope,
    arguments: usize,
    properties: Vec<String>,
    init_method: Option<String>,
    destroy_method: Option<String>,
    dependencies: Vec<Dependency>,
}

impl BeanRecipe {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: RecipeId,
        class: Arc<dyn DynBeanClass>,
        scope: Scope,
        arguments: usize,
        properties: Vec<String>,
        init_method: Option<String>,
        destroy_method: Option<String>,
        dependencies: Vec<Dependency>,
    ) -> Self {
        Self {
            id,
            class,
            scope,
            arguments,
            properties,
            init_method,
            destroy_method,
            dependencies,
        }
    }

    pub fn class(&self) -> &Arc<dyn DynBeanClass> {
        &self.class
    }

    fn failed(&self, error: DynError) -> RecipeError {
        RecipeError::ConstructionFailed {
            recipe: self.id.clone(),
            error: Arc::new(error),
        }
    }
}

impl Recipe for BeanRecipe {
    fn id(&self) -> &RecipeId {
        &self.id
    }

    fn kind(&self) -> RecipeKind {
        RecipeKind::Bean
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    fn create(&self, dependencies: Vec<Value>) -> Result<Value, RecipeError> {
        let mut values = dependencies.into_iter();
        let arguments: Vec<Value> = values.by_ref().take(self.arguments).collect();
        let properties: Vec<(String, Value)> = self.properties.iter().cloned().zip(values).collect();

        let instance = self
            .class
            .construct(arguments, properties)
            .map_err(|error| match error {
                ConstructError::Constructor(error) => self.failed(error),
                ConstructError::Property { property, error } => RecipeError::Injection {
                    recipe: self.id.clone(),
                    target: format!("property '{property}'"),
                    error,
                },
                ConstructError::UnknownProperty(property) => self.failed(
                    format!("Class '{}' has no property '{property}'", self.class.name()).into(),
                ),
            })?;

        if let Some(init) = &self.init_method {
            tracing::trace!("Calling init method '{init}' of '{}'", self.id);
            self.class
                .invoke(init, &instance)
                .map_err(|error| self.failed(error))?;
        }

        tracing::debug!("Constructed '{}' as {}", self.id, instance.info());
        Ok(Value::Object(instance))
    }

    fn destroy(&self, value: &Value) -> Result<(), DynError> {
        match (&self.destroy_method, value.as_instance()) {
            (Some(destroy), Some(instance)) => {
                tracing::trace!("Calling destroy method '{destroy}' of '{}'", self.id);
                self.class.invoke(destroy, instance)
            }
            _ => Ok(()),
        }
    }
}
