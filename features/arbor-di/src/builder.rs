use std::{sync::Arc, thread};

use arbor_registry::{InMemoryRegistry, Injectable, Instance, ServiceRegistry};
use futures_channel::mpsc;

use crate::{
    class::{BeanClass, ClassRegistry},
    component::ComponentTable,
    config::{ContainerConfig, PropertySource},
    container::{Container, ContainerInner},
    coordinator::Coordinator,
    errors::{ContainerError, DefinitionError, DefinitionErrors},
    graph::RecipeGraphBuilder,
    metadata::{ComponentId, ComponentMetadata, ContainerMetadata},
    repository::Repository,
    tracker::ReferenceTracker,
};

/// Collects metadata, classes and instances, then starts a [Container]
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use arbor_di::{BeanClass, BeanMetadata, ContainerBuilder, ContainerState};
///
/// #[derive(Default)]
/// struct Greeter;
///
/// let container = ContainerBuilder::new("greeting")
///     .add_class(BeanClass::<Greeter>::with_default("Greeter"))
///     .add_component(BeanMetadata::new("greeter", "Greeter"))
///     .start()
///     .unwrap();
///
/// assert_eq!(container.wait_until_settled(Duration::from_secs(1)), ContainerState::Active);
/// ```
pub struct ContainerBuilder {
    config: ContainerConfig,
    metadata: ContainerMetadata,
    classes: ClassRegistry,
    instances: Vec<(ComponentId, Instance)>,
    registry: Option<Arc<dyn ServiceRegistry>>,
    properties: Option<Arc<dyn PropertySource>>,
    /// Reported on start with every other definition problem
    errors: Vec<DefinitionError>,
}

impl ContainerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: ContainerConfig::new(name),
            metadata: ContainerMetadata::new(),
            classes: ClassRegistry::new(),
            instances: Vec::new(),
            registry: None,
            properties: None,
            errors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Replaces the whole configuration, including the name
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends all components of `metadata`
    pub fn with_metadata(mut self, metadata: ContainerMetadata) -> Self {
        for component in metadata.components() {
            self.metadata.push(component.clone());
        }
        self
    }

    pub fn add_component(mut self, component: impl Into<ComponentMetadata>) -> Self {
        self.metadata.push(component);
        self
    }

    pub fn add_class<T: Injectable>(mut self, class: BeanClass<T>) -> Self {
        if let Err(error) = self.classes.register(class) {
            self.errors.push(error);
        }
        self
    }

    /// An existing object, injectable and retrievable under `id`
    pub fn add_instance<T: Injectable>(mut self, id: impl Into<ComponentId>, instance: T) -> Self {
        self.instances.push((id.into(), Instance::new(instance)));
        self
    }

    pub fn add_shared_instance<T: Injectable>(
        mut self,
        id: impl Into<ComponentId>,
        instance: Arc<T>,
    ) -> Self {
        self.instances.push((id.into(), Instance::from_arc(instance)));
        self
    }

    /// The registry components are published to and references are tracked in
    ///
    /// Defaults to a private [InMemoryRegistry].
    pub fn with_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Source for `${...}` placeholders in literals
    pub fn with_properties(mut self, properties: Arc<dyn PropertySource>) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Validates the metadata and starts the coordinator
    ///
    /// Returns once the coordinator runs, use [Container::wait_until_settled] or
    /// [Container::subscribe] to follow the start.
    pub fn start(self) -> Result<Container, ContainerError> {
        let ContainerBuilder {
            config,
            metadata,
            classes,
            instances,
            registry,
            properties,
            mut errors,
        } = self;

        let mut graph_builder = RecipeGraphBuilder::new(&classes);
        if let Some(properties) = &properties {
            graph_builder = graph_builder.with_properties(properties.as_ref());
        }
        let graph = match graph_builder.build(&metadata, &instances) {
            Ok(graph) if errors.is_empty() => graph,
            Ok(_) => return Err(DefinitionErrors { errors }.into()),
            Err(mut definition) => {
                errors.append(&mut definition.errors);
                return Err(DefinitionErrors { errors }.into());
            }
        };

        tracing::info!(
            "Starting container '{}' - {} component(s), {} recipe(s)",
            config.name,
            graph.components().len(),
            graph.recipes().len()
        );

        let registry = registry.unwrap_or_else(|| Arc::new(InMemoryRegistry::new()));
        let (recipes, plans, bindings) = graph.into_parts();
        let table = ComponentTable::new(plans, &bindings);
        let name = config.name.clone();
        let inner = Arc::new(ContainerInner::new(
            config,
            registry.clone(),
            Repository::new(recipes),
            table,
        ));

        let (messages, receiver) = mpsc::unbounded();
        let tracker = ReferenceTracker::new(registry, messages.clone());
        let coordinator = Coordinator::new(inner.clone(), tracker, bindings, receiver);

        let thread = thread::Builder::new()
            .name(format!("arbor-{name}"))
            .spawn(move || futures::executor::block_on(coordinator.run()))
            .map_err(|error| ContainerError::Spawn(Arc::new(error)))?;

        Ok(Container::new(inner, messages, thread))
    }
}
