//! Declarative description of the components a container manages.
//!
//! Metadata is plain data: it names classes and component ids but holds no live objects.
//! The graph builder turns it into recipes.

use std::time::Duration;

use arbor_registry::Attributes;

pub type ComponentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One shared instance per container
    Singleton,
    /// A fresh instance for every request
    Prototype,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Activation {
    /// Instantiated as soon as the component is satisfied
    #[default]
    Eager,
    /// Instantiated on first request
    Lazy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Availability {
    #[default]
    Mandatory,
    Optional,
}

/// Whether a better ranked provider replaces the one currently bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Damping {
    /// Always bind the best ranked provider
    #[default]
    Greedy,
    /// Keep the bound provider until it goes away
    Reluctant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    List,
    /// Equal literals and identical objects are kept once
    Set,
    Array,
}

/// All components of one container, in declaration order
#[derive(Debug, Clone, Default)]
pub struct ContainerMetadata {
    components: Vec<ComponentMetadata>,
}
impl ContainerMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: impl Into<ComponentMetadata>) -> Self {
        self.components.push(component.into());
        self
    }

    pub fn push(&mut self, component: impl Into<ComponentMetadata>) {
        self.components.push(component.into());
    }

    pub fn components(&self) -> &[ComponentMetadata] {
        &self.components
    }
}

#[derive(Debug, Clone)]
pub enum ComponentMetadata {
    Bean(BeanMetadata),
    Reference(ReferenceMetadata),
    ReferenceList(ReferenceListMetadata),
}
impl ComponentMetadata {
    pub fn id(&self) -> Option<&str> {
        match self {
            ComponentMetadata::Bean(bean) => bean.id.as_deref(),
            ComponentMetadata::Reference(reference) => reference.id.as_deref(),
            ComponentMetadata::ReferenceList(list) => list.id.as_deref(),
        }
    }
}
impl From<BeanMetadata> for ComponentMetadata {
    fn from(bean: BeanMetadata) -> Self {
        ComponentMetadata::Bean(bean)
    }
}
impl From<ReferenceMetadata> for ComponentMetadata {
    fn from(reference: ReferenceMetadata) -> Self {
        ComponentMetadata::Reference(reference)
    }
}
impl From<ReferenceListMetadata> for ComponentMetadata {
    fn from(list: ReferenceListMetadata) -> Self {
        ComponentMetadata::ReferenceList(list)
    }
}

/// An object built from a registered bean class
#[derive(Debug, Clone)]
pub struct BeanMetadata {
    /// None for inline beans
    pub id: Option<ComponentId>,
    pub class: String,
    /// Defaults to singleton for top level beans and prototype for inline ones
    pub scope: Option<Scope>,
    pub activation: Activation,
    pub arguments: Vec<ValueMetadata>,
    pub properties: Vec<PropertyMetadata>,
    pub init_method: Option<String>,
    pub destroy_method: Option<String>,
    pub depends_on: Vec<ComponentId>,
    pub publish: Option<PublishMetadata>,
}

impl BeanMetadata {
    pub fn new(id: impl Into<ComponentId>, class: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::inline(class)
        }
    }

    pub fn inline(class: impl Into<String>) -> Self {
        Self {
            id: None,
            class: class.into(),
            scope: None,
            activation: Activation::Eager,
            arguments: Vec::new(),
            properties: Vec::new(),
            init_method: None,
            destroy_method: None,
            depends_on: Vec::new(),
            publish: None,
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn prototype(self) -> Self {
        self.scope(Scope::Prototype)
    }

    pub fn lazy(mut self) -> Self {
        self.activation = Activation::Lazy;
        self
    }

    pub fn argument(mut self, value: impl Into<ValueMetadata>) -> Self {
        self.arguments.push(value.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<ValueMetadata>) -> Self {
        self.properties.push(PropertyMetadata {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn init_method(mut self, method: impl Into<String>) -> Self {
        self.init_method = Some(method.into());
        self
    }

    pub fn destroy_method(mut self, method: impl Into<String>) -> Self {
        self.destroy_method = Some(method.into());
        self
    }

    pub fn depends_on(mut self, id: impl Into<ComponentId>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn publish(mut self, publish: PublishMetadata) -> Self {
        self.publish = Some(publish);
        self
    }
}

#[derive(Debug, Clone)]
pub struct PropertyMetadata {
    pub name: String,
    pub value: ValueMetadata,
}

/// How a bean is published to the service registry once active
#[derive(Debug, Clone, Default)]
pub struct PublishMetadata {
    pub interfaces: Vec<String>,
    pub ranking: i64,
    pub attributes: Attributes,
    pub listeners: Vec<RegistrationListenerMetadata>,
}
impl PublishMetadata {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interfaces: vec![interface.into()],
            ..Default::default()
        }
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn ranking(mut self, ranking: i64) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<arbor_registry::AttrValue>) -> Self {
        self.attributes.insert(key, value);
        self
    }

    pub fn listener(mut self, listener: RegistrationListenerMetadata) -> Self {
        self.listeners.push(listener);
        self
    }
}

/// A bean told when the published service is registered and before it is withdrawn
#[derive(Debug, Clone)]
pub struct RegistrationListenerMetadata {
    pub listener: ValueMetadata,
    pub registration_method: Option<String>,
    pub unregistration_method: Option<String>,
}

impl RegistrationListenerMetadata {
    pub fn new(listener: impl Into<ValueMetadata>) -> Self {
        Self {
            listener: listener.into(),
            registration_method: None,
            unregistration_method: None,
        }
    }

    pub fn registration(mut self, method: impl Into<String>) -> Self {
        self.registration_method = Some(method.into());
        self
    }

    pub fn unregistration(mut self, method: impl Into<String>) -> Self {
        self.unregistration_method = Some(method.into());
        self
    }
}

/// A single external service, accessed through a rebinding proxy
#[derive(Debug, Clone)]
pub struct ReferenceMetadata {
    pub id: Option<ComponentId>,
    pub interface: Option<String>,
    pub filter: Option<String>,
    pub component_name: Option<String>,
    pub availability: Availability,
    pub damping: Damping,
    /// How long a call through the proxy waits for a provider
    pub timeout: Duration,
    /// Used while no provider is bound, optional references only
    pub default_bean: Option<ComponentId>,
    pub listeners: Vec<ListenerMetadata>,
    pub depends_on: Vec<ComponentId>,
}

impl ReferenceMetadata {
    pub fn new(id: impl Into<ComponentId>, interface: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::inline(interface)
        }
    }

    pub fn inline(interface: impl Into<String>) -> Self {
        Self {
            id: None,
            interface: Some(interface.into()),
            filter: None,
            component_name: None,
            availability: Availability::Mandatory,
            damping: Damping::Greedy,
            timeout: Duration::ZERO,
            default_bean: None,
            listeners: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn component_name(mut self, name: impl Into<String>) -> Self {
        self.component_name = Some(name.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.availability = Availability::Optional;
        self
    }

    pub fn reluctant(mut self) -> Self {
        self.damping = Damping::Reluctant;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn default_bean(mut self, id: impl Into<ComponentId>) -> Self {
        self.default_bean = Some(id.into());
        self
    }

    pub fn listener(mut self, listener: ListenerMetadata) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn depends_on(mut self, id: impl Into<ComponentId>) -> Self {
        self.depends_on.push(id.into());
        self
    }
}

/// All external services matching a filter, accessed through a live list
#[derive(Debug, Clone)]
pub struct ReferenceListMetadata {
    pub id: Option<ComponentId>,
    pub interface: Option<String>,
    pub filter: Option<String>,
    pub component_name: Option<String>,
    pub availability: Availability,
    /// Providers required for a mandatory list to be satisfied
    pub min_providers: usize,
    pub listeners: Vec<ListenerMetadata>,
    pub depends_on: Vec<ComponentId>,
}

impl ReferenceListMetadata {
    pub fn new(id: impl Into<ComponentId>, interface: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::inline(interface)
        }
    }

    pub fn inline(interface: impl Into<String>) -> Self {
        Self {
            id: None,
            interface: Some(interface.into()),
            filter: None,
            component_name: None,
            availability: Availability::Mandatory,
            min_providers: 1,
            listeners: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.availability = Availability::Optional;
        self
    }

    pub fn min_providers(mut self, min: usize) -> Self {
        self.min_providers = min;
        self
    }

    pub fn listener(mut self, listener: ListenerMetadata) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn depends_on(mut self, id: impl Into<ComponentId>) -> Self {
        self.depends_on.push(id.into());
        self
    }
}

/// A bean notified when providers are bound to or unbound from a reference
#[derive(Debug, Clone)]
pub struct ListenerMetadata {
    pub listener: ValueMetadata,
    pub bind_method: Option<String>,
    pub unbind_method: Option<String>,
}
impl ListenerMetadata {
    pub fn new(listener: impl Into<ValueMetadata>) -> Self {
        Self {
            listener: listener.into(),
            bind_method: None,
            unbind_method: None,
        }
    }

    pub fn bind(mut self, method: impl Into<String>) -> Self {
        self.bind_method = Some(method.into());
        self
    }

    pub fn unbind(mut self, method: impl Into<String>) -> Self {
        self.unbind_method = Some(method.into());
        self
    }
}

/// A value injected into an argument or property
#[derive(Debug, Clone)]
pub enum ValueMetadata {
    Null,
    /// Converted by the receiving property, may contain `${...}` placeholders
    Literal(String),
    /// Another component, constructed before the dependent
    Ref(ComponentId),
    /// Another component which may still be under construction, injected through a proxy
    Deferred(ComponentId),
    Bean(Box<BeanMetadata>),
    Reference(Box<ReferenceMetadata>),
    ReferenceList(Box<ReferenceListMetadata>),
    Collection(CollectionKind, Vec<ValueMetadata>),
    Map(Vec<(ValueMetadata, ValueMetadata)>),
}

impl ValueMetadata {
    pub fn literal(value: impl Into<String>) -> Self {
        ValueMetadata::Literal(value.into())
    }

    pub fn component(id: impl Into<ComponentId>) -> Self {
        ValueMetadata::Ref(id.into())
    }

    pub fn deferred(id: impl Into<ComponentId>) -> Self {
        ValueMetadata::Deferred(id.into())
    }

    pub fn list(items: impl IntoIterator<Item = ValueMetadata>) -> Self {
        ValueMetadata::Collection(CollectionKind::List, items.into_iter().collect())
    }

    pub fn set(items: impl IntoIterator<Item = ValueMetadata>) -> Self {
        ValueMetadata::Collection(CollectionKind::Set, items.into_iter().collect())
    }

    pub fn map(entries: impl IntoIterator<Item = (ValueMetadata, ValueMetadata)>) -> Self {
        ValueMetadata::Map(entries.into_iter().collect())
    }
}
impl From<BeanMetadata> for ValueMetadata {
    fn from(bean: BeanMetadata) -> Self {
        ValueMetadata::Bean(Box::new(bean))
    }
}
impl From<ReferenceMetadata> for ValueMetadata {
    fn from(reference: ReferenceMetadata) -> Self {
        ValueMetadata::Reference(Box::new(reference))
    }
}
impl From<ReferenceListMetadata> for ValueMetadata {
    fn from(list: ReferenceListMetadata) -> Self {
        ValueMetadata::ReferenceList(Box::new(list))
    }
}
impl From<&str> for ValueMetadata {
    fn from(literal: &str) -> Self {
        ValueMetadata::Literal(literal.to_string())
    }
}
impl From<String> for ValueMetadata {
    fn from(literal: String) -> Self {
        ValueMetadata::Literal(literal)
    }
}
