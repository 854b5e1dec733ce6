use std::{cmp::Ordering, fmt::Display, sync::Arc};

use crate::{
    attributes::{Attributes, SERVICE_RANKING},
    errors::RegistryError,
    filter::Filter,
    types::Instance,
};

/// Registry assigned id of a registered service
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServiceId(pub u64);
impl Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Id of a registry subscription
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Snapshot of one registered service
///
/// A new snapshot is handed out whenever the service's attributes change,
/// the service object itself stays the same.
#[derive(Clone)]
pub struct ServiceReference {
    id: ServiceId,
    ranking: i64,
    attributes: Arc<Attributes>,
    service: Instance,
}
impl std::fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceReference")
            .field("id", &self.id)
            .field("ranking", &self.ranking)
            .field("service", &self.service.info().type_name)
            .finish()
    }
}

impl ServiceReference {
    pub fn new(id: ServiceId, attributes: Attributes, service: Instance) -> Self {
        let ranking = attributes.get_int(SERVICE_RANKING).unwrap_or(0);
        Self {
            id,
            ranking,
            attributes: Arc::new(attributes),
            service,
        }
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn ranking(&self) -> i64 {
        self.ranking
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn service(&self) -> &Instance {
        &self.service
    }

    /// Provider preference: higher ranking first, then the older (lower id) service
    pub fn cmp_preference(&self, other: &ServiceReference) -> Ordering {
        other
            .ranking
            .cmp(&self.ranking)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Change notifications delivered to subscribers
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    Registered(ServiceReference),
    /// Attributes changed, carries the new snapshot
    Modified(ServiceReference),
    /// Delivered before the service disappears
    Unregistering(ServiceReference),
}
impl ServiceEvent {
    pub fn reference(&self) -> &ServiceReference {
        match self {
            ServiceEvent::Registered(reference)
            | ServiceEvent::Modified(reference)
            | ServiceEvent::Unregistering(reference) => reference,
        }
    }
}

/// Receives service events of a subscription
///
/// Called on whichever thread changed the registry, so implementations must not block.
pub trait ServiceListener: Send + Sync {
    fn service_changed(&self, event: ServiceEvent);
}
impl<F: Fn(ServiceEvent) + Send + Sync> ServiceListener for F {
    fn service_changed(&self, event: ServiceEvent) {
        self(event)
    }
}

/// The shared service registry components are published to and looked up from
pub trait ServiceRegistry: Send + Sync {
    /// Registers a service and notifies matching subscribers
    fn register(&self, service: Instance, attributes: Attributes)
        -> Result<ServiceId, RegistryError>;

    /// Replaces the attributes of a registered service
    fn set_attributes(&self, id: ServiceId, attributes: Attributes) -> Result<(), RegistryError>;

    /// Removes a service, subscribers are notified before it is gone
    fn unregister(&self, id: ServiceId) -> Result<(), RegistryError>;

    /// Synchronous snapshot of all matching services, most preferred first
    fn find_providers(&self, filter: &Filter) -> Vec<ServiceReference>;

    /// Subscribes to changes of services matching the filter
    ///
    /// All currently matching services are replayed to the listener as
    /// [ServiceEvent::Registered] before this returns, no event can slip in between.
    /// `Modified` events are delivered if either the old or the new attributes match,
    /// the listener has to re-evaluate the filter itself.
    fn subscribe(&self, filter: Filter, listener: Arc<dyn ServiceListener>) -> ListenerId;

    /// Returns false if the subscription was unknown
    fn unsubscribe(&self, id: ListenerId) -> bool;
}
