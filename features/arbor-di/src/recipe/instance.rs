use arbor_registry::Instance;

use crate::{
    errors::RecipeError,
    metadata::Scope,
    recipe::{Dependency, Recipe, RecipeId, RecipeKind},
    value::Value,
};

/// An object handed to the container ready-made
pub struct InstanceRecipe {
    id: RecipeId,
    instance: Instance,
}

impl InstanceRecipe {
    pub fn new(id: RecipeId, instance: Instance) -> Self {
        Self { id, instance }
    }
}

impl Recipe for InstanceRecipe {
    fn id(&self) -> &RecipeId {
        &self.id
    }

    fn kind(&self) -> RecipeKind {
        RecipeKind::Instance
    }

    fn scope(&self) -> Scope {
        Scope::Singleton
    }

    fn dependencies(&self) -> &[Dependency] {
        &[]
    }

    fn create(&self, _dependencies: Vec<Value>) -> Result<Value, RecipeError> {
        Ok(Value::Object(self.instance.clone()))
    }
}
