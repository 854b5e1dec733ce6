//! Arbor Registry is the service registry components are published to and looked up from.
//!
//! It consists of:
//!
//! 1. Types - the type-erased [Instance] every service and component is stored as
//! 2. Attributes - the properties a service is registered with
//! 3. Filter - LDAP style expressions selecting services by their attributes
//! 4. Registry - the [ServiceRegistry] boundary and an [InMemoryRegistry] implementation
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use arbor_registry::{Attributes, Filter, InMemoryRegistry, ServiceEvent, ServiceRegistry};
//!
//! let registry = InMemoryRegistry::new();
//! registry.subscribe(
//!     Filter::parse("(objectClass=Greeter)").unwrap(),
//!     Arc::new(|event: ServiceEvent| println!("{event:?}")),
//! );
//!
//! let id = registry
//!     .register_as("Greeter", String::from("hello"), Attributes::new())
//!     .unwrap();
//! registry.unregister(id).unwrap();
//! ```

pub mod attributes;
pub mod errors;
pub mod filter;
pub mod memory;
pub mod registry;
pub mod types;

pub use attributes::{AttrValue, Attributes, COMPONENT_NAME, OBJECT_CLASS, SERVICE_ID, SERVICE_RANKING};
pub use errors::{FilterError, RegistryError};
pub use filter::Filter;
pub use memory::InMemoryRegistry;
pub use registry::{
    ListenerId, ServiceEvent, ServiceId, ServiceListener, ServiceReference, ServiceRegistry,
};
pub use types::{DynError, Injectable, Instance, TypeInfo};
