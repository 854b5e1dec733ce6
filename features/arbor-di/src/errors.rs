use std::{sync::Arc, time::Duration};

use arbor_registry::{DynError, FilterError, RegistryError};
use thiserror::Error;

use crate::{
    component::ComponentState,
    config::PlaceholderError,
    inject::{Expect, Shape},
    metadata::ComponentId,
    recipe::RecipeId,
};

/// A problem in the container metadata, found before anything is instantiated
#[derive(Error, Debug, Clone)]
pub enum DefinitionError {
    #[error("A component id has been declared twice: '{0}'")]
    Duplicate(ComponentId),
    #[error("'{required_by}' needs '{dependency}' but it is missing")]
    MissingDependency {
        dependency: ComponentId,
        required_by: ComponentId,
    },
    #[error("A class name has been registered twice: '{0}'")]
    DuplicateClass(String),
    #[error("'{component}' uses the unknown class '{class}'")]
    UnknownClass { component: ComponentId, class: String },
    #[error("Class '{class}' of '{component}' has no property '{property}'")]
    UnknownProperty {
        component: ComponentId,
        class: String,
        property: String,
    },
    #[error("Class '{class}' of '{component}' has no method '{method}'")]
    UnknownMethod {
        component: ComponentId,
        class: String,
        method: String,
    },
    #[error("Property '{property}' of '{component}' expects {expected} but is given {found}")]
    TypeMismatch {
        component: ComponentId,
        property: String,
        expected: Expect,
        found: Shape,
    },
    #[error("Reference '{component}' has an invalid filter: {error}")]
    InvalidFilter {
        component: ComponentId,
        error: FilterError,
    },
    #[error("Listeners of '{0}' must be beans")]
    InvalidListener(ComponentId),
    #[error("Reference '{0}' names no interface, filter or component")]
    Unconstrained(ComponentId),
    #[error("Mandatory reference '{0}' cannot have a default bean or require no providers")]
    MandatoryWithoutProvider(ComponentId),
    #[error("Literal of '{component}' could not be resolved: {error}")]
    Placeholder {
        component: ComponentId,
        error: PlaceholderError,
    },
    #[error("'{required_by}' defers '{dependency}' but only singleton beans can be deferred")]
    InvalidDeferred {
        dependency: ComponentId,
        required_by: ComponentId,
    },
    #[error("A Circular Dependency exists between '{from}' and '{to}' through {chain:?} - Consider deferring one of the edges")]
    CircularDependency {
        from: ComponentId,
        to: ComponentId,
        chain: Vec<ComponentId>,
    },
    #[error("The cycle {chain:?} passes through '{component}' which cannot be replaced by a proxy")]
    UnproxyableCycle {
        component: ComponentId,
        chain: Vec<ComponentId>,
    },
}

#[derive(Error, Debug, Clone)]
pub struct DefinitionErrors {
    pub errors: Vec<DefinitionError>,
}
impl std::fmt::Display for DefinitionErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The container definition had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

/// Errors while instantiating a recipe
#[derive(Error, Debug, Clone)]
pub enum RecipeError {
    #[error("There is no recipe '{0}'")]
    Missing(RecipeId),
    /// The constructor, a setter or the init method failed
    #[error("Constructing '{recipe}' failed - error: {error:?}")]
    ConstructionFailed {
        recipe: RecipeId,
        error: Arc<DynError>,
    },
    #[error("Could not inject {target} of '{recipe}'")]
    Injection {
        recipe: RecipeId,
        target: String,
        #[source]
        error: ConversionError,
    },
    #[error("'{recipe}' depends on '{dependency}' which failed")]
    DependencyFailed {
        recipe: RecipeId,
        dependency: RecipeId,
        #[source]
        cause: Arc<RecipeError>,
    },
    #[error("A Circular Dependency was hit at runtime through {0:?}")]
    CircularDependency(Vec<RecipeId>),
}

/// Errors when converting an injected value into the type a bean wants
#[derive(Error, Debug, Clone)]
pub enum ConversionError {
    #[error("Expected {expected} but found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Cannot parse '{value}' as {target}")]
    Parse { value: String, target: &'static str },
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
    #[error("Missing argument #{0}")]
    MissingArgument(usize),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Errors when calling through a proxy
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    #[error("No service matching {filter} is available")]
    ServiceUnavailable { filter: String },
    #[error("The reference {filter} has been closed")]
    Closed { filter: String },
    #[error("'{target}' is still being constructed by this thread")]
    InConstruction { target: String },
    #[error("'{target}' failed to construct")]
    ConstructionFailed {
        target: String,
        #[source]
        cause: Arc<RecipeError>,
    },
    #[error("Timed out waiting for '{target}'")]
    Timeout { target: String },
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
}

/// Errors of a running container
#[derive(Error, Debug, Clone)]
pub enum ContainerError {
    #[error(transparent)]
    Definition(#[from] DefinitionErrors),
    #[error(transparent)]
    Instantiation(#[from] RecipeError),
    #[error("'{component}' waited {grace_period:?} for {missing:?}")]
    ReferenceTimeout {
        component: ComponentId,
        grace_period: Duration,
        missing: Vec<String>,
    },
    #[error("'{component}' depends on '{dependency}' which failed")]
    DependencyFailed {
        component: ComponentId,
        dependency: ComponentId,
    },
    #[error("There is no component '{0}'")]
    NoSuchComponent(ComponentId),
    #[error("'{component}' is not available yet, it is {state:?}")]
    NotYetAvailable {
        component: ComponentId,
        state: ComponentState,
    },
    #[error("Could not convert '{component}'")]
    Conversion {
        component: ComponentId,
        #[source]
        error: ConversionError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("The container has been stopped")]
    Stopped,
    #[error("Could not start the container thread - error: {0}")]
    Spawn(Arc<std::io::Error>),
}

/// A destroy method that failed, recorded and otherwise ignored
#[derive(Error, Debug, Clone)]
#[error("Destroying '{recipe}' failed - error: {error:?}")]
pub struct DestroyFailure {
    pub recipe: RecipeId,
    pub error: Arc<DynError>,
}
