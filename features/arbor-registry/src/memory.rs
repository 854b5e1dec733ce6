use std::{collections::BTreeMap, sync::Arc};

use parking_lot::{Mutex, ReentrantMutex};

use crate::{
    attributes::{Attributes, OBJECT_CLASS, SERVICE_ID},
    errors::RegistryError,
    filter::Filter,
    registry::{
        ListenerId, ServiceEvent, ServiceId, ServiceListener, ServiceReference, ServiceRegistry,
    },
    types::Instance,
};

/// In-process service registry
///
/// Events are delivered synchronously on the thread that changed the registry.
/// Delivery is serialized, so every listener observes changes in the order they happened.
/// Listeners may call back into the registry.
#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<RegistryState>,
    dispatch: ReentrantMutex<()>,
}

#[derive(Default)]
struct RegistryState {
    next_service: u64,
    next_listener: u64,
    services: BTreeMap<ServiceId, ServiceReference>,
    listeners: BTreeMap<ListenerId, Subscription>,
}

#[derive(Clone)]
struct Subscription {
    filter: Filter,
    listener: Arc<dyn ServiceListener>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a service under a single interface name
    pub fn register_as<T: crate::Injectable>(
        &self,
        interface: &str,
        service: T,
        attributes: Attributes,
    ) -> Result<ServiceId, RegistryError> {
        self.register(Instance::new(service), attributes.with(OBJECT_CLASS, interface))
    }

    fn subscribers(&self) -> Vec<Subscription> {
        self.state.lock().listeners.values().cloned().collect()
    }
}

impl ServiceRegistry for InMemoryRegistry {
    fn register(
        &self,
        service: Instance,
        mut attributes: Attributes,
    ) -> Result<ServiceId, RegistryError> {
        let _dispatch = self.dispatch.lock();

        let reference = {
            let mut state = self.state.lock();
            state.next_service += 1;
            let id = ServiceId(state.next_service);
            attributes.insert(SERVICE_ID, id.0 as i64);

            let reference = ServiceReference::new(id, attributes, service);
            state.services.insert(id, reference.clone());
            reference
        };

        tracing::debug!(
            "Registered service {} ({})",
            reference.id(),
            reference.service().info()
        );

        for subscription in self.subscribers() {
            if subscription.filter.matches(reference.attributes()) {
                subscription
                    .listener
                    .service_changed(ServiceEvent::Registered(reference.clone()));
            }
        }

        Ok(reference.id())
    }

    fn set_attributes(
        &self,
        id: ServiceId,
        mut attributes: Attributes,
    ) -> Result<(), RegistryError> {
        let _dispatch = self.dispatch.lock();

        let (previous, reference) = {
            let mut state = self.state.lock();
            let previous = state
                .services
                .get(&id)
                .cloned()
                .ok_or(RegistryError::UnknownService(id))?;
            attributes.insert(SERVICE_ID, id.0 as i64);

            let reference = ServiceReference::new(id, attributes, previous.service().clone());
            state.services.insert(id, reference.clone());
            (previous, reference)
        };

        tracing::debug!("Modified service {id}");

        for subscription in self.subscribers() {
            if subscription.filter.matches(previous.attributes())
                || subscription.filter.matches(reference.attributes())
            {
                subscription
                    .listener
                    .service_changed(ServiceEvent::Modified(reference.clone()));
            }
        }

        Ok(())
    }

    fn unregister(&self, id: ServiceId) -> Result<(), RegistryError> {
        let _dispatch = self.dispatch.lock();

        let reference = self
            .state
            .lock()
            .services
            .get(&id)
            .cloned()
            .ok_or(RegistryError::UnknownService(id))?;

        for subscription in self.subscribers() {
            if subscription.filter.matches(reference.attributes()) {
                subscription
                    .listener
                    .service_changed(ServiceEvent::Unregistering(reference.clone()));
            }
        }

        self.state.lock().services.remove(&id);
        tracing::debug!("Unregistered service {id}");
        Ok(())
    }

    fn find_providers(&self, filter: &Filter) -> Vec<ServiceReference> {
        let mut providers: Vec<ServiceReference> = self
            .state
            .lock()
            .services
            .values()
            .filter(|reference| filter.matches(reference.attributes()))
            .cloned()
            .collect();
        providers.sort_by(ServiceReference::cmp_preference);
        providers
    }

    fn subscribe(&self, filter: Filter, listener: Arc<dyn ServiceListener>) -> ListenerId {
        // Holding the dispatch lock keeps changes out until the replay is done
        let _dispatch = self.dispatch.lock();

        let (id, existing) = {
            let mut state = self.state.lock();
            state.next_listener += 1;
            let id = ListenerId(state.next_listener);
            state.listeners.insert(
                id,
                Subscription {
                    filter: filter.clone(),
                    listener: listener.clone(),
                },
            );

            let existing: Vec<ServiceReference> = state
                .services
                .values()
                .filter(|reference| filter.matches(reference.attributes()))
                .cloned()
                .collect();
            (id, existing)
        };

        tracing::trace!("Subscribed {filter} with {} matching services", existing.len());

        for reference in existing {
            listener.service_changed(ServiceEvent::Registered(reference));
        }

        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        let _dispatch = self.dispatch.lock();
        self.state.lock().listeners.remove(&id).is_some()
    }
}
