use crate::{
    errors::RecipeError,
    metadata::Scope,
    recipe::{Dependency, Recipe, RecipeId, RecipeKind},
    value::Value,
};

/// A literal or null, converted by whoever receives it
pub struct ValueRecipe {
    id: RecipeId,
    literal: Option<String>,
}

impl ValueRecipe {
    pub fn new(id: RecipeId, literal: Option<String>) -> Self {
        Self { id, literal }
    }
}

impl Recipe for ValueRecipe {
    fn id(&self) -> &RecipeId {
        &self.id
    }

    fn kind(&self) -> RecipeKind {
        RecipeKind::Value
    }

    fn scope(&self) -> Scope {
        Scope::Prototype
    }

    fn dependencies(&self) -> &[Dependency] {
        &[]
    }

    fn create(&self, _dependencies: Vec<Value>) -> Result<Value, RecipeError> {
        Ok(match &self.literal {
            Some(literal) => Value::Literal(literal.clone()),
            None => Value::Null,
        })
    }
}
