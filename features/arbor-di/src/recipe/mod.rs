//! Recipes are the nodes of the object graph, each knows how to produce one value.

use std::{borrow::Borrow, fmt::Display, ops::Deref, sync::Arc};

use arbor_registry::DynError;

use crate::{errors::RecipeError, metadata::Scope, tracker::ReferenceBinding, value::Value};

pub mod bean;
pub mod collection;
pub mod instance;
pub mod reference;
pub mod value;

pub use bean::BeanRecipe;
pub use collection::CollectionRecipe;
pub use instance::InstanceRecipe;
pub use reference::{ReferenceListRecipe, ReferenceRecipe};
pub use value::ValueRecipe;

/// Component ids name top level recipes, inner recipes get `<owner>#<n>`
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecipeId(Arc<str>);

impl RecipeId {
    pub fn new(id: impl AsRef<str>) -> Self {
        RecipeId(Arc::from(id.as_ref()))
    }

    pub(crate) fn inner(owner: &RecipeId, index: usize) -> Self {
        RecipeId::new(format!("{owner}#{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for recipes created for inline metadata
    pub fn is_inner(&self) -> bool {
        self.0.contains('#')
    }
}
impl Display for RecipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
impl Borrow<str> for RecipeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
impl Deref for RecipeId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}
impl From<&str> for RecipeId {
    fn from(id: &str) -> Self {
        RecipeId::new(id)
    }
}

/// An edge to a recipe whose value is needed first
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub id: RecipeId,
    /// May be satisfied by a proxy while the target is still under construction
    pub deferred: bool,
}
impl Dependency {
    pub fn direct(id: RecipeId) -> Self {
        Self {
            id,
            deferred: false,
        }
    }

    pub fn deferred(id: RecipeId) -> Self {
        Self { id, deferred: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipeKind {
    Value,
    Bean,
    Collection,
    Reference,
    ReferenceList,
    Instance,
}

/// Produces one runtime value from the values of its dependencies
pub trait Recipe: Send + Sync {
    fn id(&self) -> &RecipeId;

    fn kind(&self) -> RecipeKind;

    /// Singletons are created once and cached, everything else on every request
    fn scope(&self) -> Scope;

    fn dependencies(&self) -> &[Dependency];

    /// Receives one value per dependency, in order
    fn create(&self, dependencies: Vec<Value>) -> Result<Value, RecipeError>;

    /// Releases a value previously returned by `create`
    fn destroy(&self, _value: &Value) -> Result<(), DynError> {
        Ok(())
    }

    /// The tracked binding of reference recipes
    fn binding(&self) -> Option<&Arc<ReferenceBinding>> {
        None
    }
}
