use crate::{
    errors::RecipeError,
    metadata::{CollectionKind, Scope},
    recipe::{Dependency, Recipe, RecipeId, RecipeKind},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionShape {
    Items(CollectionKind),
    /// Dependencies alternate between key and value
    Map,
}

/// A list, set, array or map of nested recipes
pub struct CollectionRecipe {
    id: RecipeId,
    shape: CollectionShape,
    dependencies: Vec<Dependency>,
}

impl CollectionRecipe {
    pub fn new(id: RecipeId, shape: CollectionShape, dependencies: Vec<Dependency>) -> Self {
        Self {
            id,
            shape,
            dependencies,
        }
    }
}

impl Recipe for CollectionRecipe {
    fn id(&self) -> &RecipeId {
        &self.id
    }

    fn kind(&self) -> RecipeKind {
        RecipeKind::Collection
    }

    fn scope(&self) -> Scope {
        Scope::Prototype
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    fn create(&self, dependencies: Vec<Value>) -> Result<Value, RecipeError> {
        Ok(match self.shape {
            CollectionShape::Items(CollectionKind::Set) => {
                let mut items: Vec<Value> = Vec::with_capacity(dependencies.len());
                for value in dependencies {
                    if !items.iter().any(|existing| existing.same(&value)) {
                        items.push(value);
                    }
                }
                Value::List(items)
            }
            CollectionShape::Items(_) => Value::List(dependencies),
            CollectionShape::Map => {
                let mut entries = Vec::with_capacity(dependencies.len() / 2);
                let mut values = dependencies.into_iter();
                while let (Some(key), Some(value)) = (values.next(), values.next()) {
                    entries.push((key, value));
                }
                Value::Map(entries)
            }
        })
    }
}
