//! Arbor DI is a component container which wires beans from declarative metadata
//! and keeps them in step with the services of a registry.
//!
//! It consists of:
//!
//! 1. Metadata - the declared beans, references and reference lists
//! 2. Graph - validates the metadata and translates it into recipes
//! 3. Repository - instantiates recipes, deferred edges are satisfied by proxies
//! 4. Tracker - follows the registry services each reference is bound to
//! 5. Coordinator - the actor which drives every component through its lifecycle
//!
//! # Examples
//!
//! ```rust
//! use std::{sync::Arc, time::Duration};
//! use arbor_di::{BeanClass, BeanMetadata, ContainerBuilder, ContainerState, PublishMetadata};
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! let container = ContainerBuilder::new("greeting")
//!     .add_class(BeanClass::new("Greeter", |arguments| {
//!         Ok(Greeter { greeting: arguments.take()? })
//!     }))
//!     .add_component(
//!         BeanMetadata::new("greeter", "Greeter")
//!             .argument("hello")
//!             .publish(PublishMetadata::new("Greeter")),
//!     )
//!     .start()
//!     .unwrap();
//!
//! assert_eq!(container.wait_until_settled(Duration::from_secs(1)), ContainerState::Active);
//! let greeter = container.get::<Arc<Greeter>>("greeter").unwrap();
//! assert_eq!(greeter.greeting, "hello");
//! container.stop();
//! ```

pub mod builder;
pub mod class;
pub mod component;
pub mod config;
pub mod container;
mod coordinator;
pub mod errors;
pub mod events;
pub mod graph;
pub mod inject;
pub mod metadata;
pub mod proxy;
pub mod recipe;
pub mod repository;
pub mod tracker;
pub mod value;

pub use builder::ContainerBuilder;
pub use class::{Arguments, BeanClass, ClassRegistry, DynBeanClass};
pub use component::{ComponentInfo, ComponentState};
pub use config::{ContainerConfig, PropertySource};
pub use container::{Container, StopReport};
pub use errors::{
    ContainerError, ConversionError, DefinitionError, DefinitionErrors, DestroyFailure,
    ProxyError, RecipeError,
};
pub use events::{ComponentFailure, ContainerEvent, ContainerEvents, ContainerState};
pub use inject::{deferred::Deferred, service::ServiceList, service::ServiceRef, FromValue};
pub use metadata::{
    Activation, Availability, BeanMetadata, CollectionKind, ComponentId, ComponentMetadata,
    ContainerMetadata, Damping, ListenerMetadata, PropertyMetadata, PublishMetadata,
    ReferenceListMetadata, ReferenceMetadata, RegistrationListenerMetadata, Scope, ValueMetadata,
};
pub use value::Value;

pub use arbor_registry::{DynError, Injectable, Instance, ServiceReference};
