//! The container actor.
//!
//! One coordinator per container runs on its own thread and is the only place component
//! state changes. Registry threads and consumers talk to it through [ContainerMessage]s.

use std::{collections::BTreeSet, sync::Arc, thread, time::Duration};

use arbor_registry::{
    AttrValue, Instance, ServiceReference, COMPONENT_NAME, OBJECT_CLASS, SERVICE_ID,
    SERVICE_RANKING,
};
use futures::StreamExt;
use futures_channel::{mpsc, oneshot};
use parking_lot::{Condvar, Mutex};

use crate::{
    component::{ComponentState, Registration},
    container::{ContainerInner, StopReport},
    errors::ContainerError,
    events::{ComponentFailure, ContainerEvent, ContainerState},
    inject::FromValue,
    metadata::{Activation, PublishMetadata, Scope},
    recipe::RecipeId,
    tracker::{BindingId, BoundListener, ReferenceBinding, ReferenceTracker},
    value::Value,
};

pub(crate) type ActivateReply = oneshot::Sender<Result<Value, ContainerError>>;

/// Requests handled by the coordinator
pub(crate) enum ContainerMessage {
    /// The providers of a binding changed
    BindingChanged(BindingId),
    /// A lazy singleton or a prototype was requested by a consumer
    Activate {
        component: RecipeId,
        reply: ActivateReply,
    },
    Stop {
        reply: Option<oneshot::Sender<StopReport>>,
    },
}

pub(crate) struct Coordinator {
    inner: Arc<ContainerInner>,
    tracker: ReferenceTracker,
    bindings: Vec<Arc<ReferenceBinding>>,
    messages: mpsc::UnboundedReceiver<ContainerMessage>,
    /// Last missing dependencies announced during the grace period
    announced: Vec<String>,
    grace: Arc<GraceTimer>,
}

/// Lets the grace period thread finish early once start has settled or the container stops
#[derive(Default)]
struct GraceTimer {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl GraceTimer {
    /// Blocks for `grace_period`, false if cancelled before
    fn expired_after(&self, grace_period: Duration) -> bool {
        let mut cancelled = self.cancelled.lock();
        self.wake
            .wait_while_for(&mut cancelled, |cancelled| !*cancelled, grace_period);
        !*cancelled
    }

    fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.wake.notify_all();
    }
}

impl Coordinator {
    pub(crate) fn new(
        inner: Arc<ContainerInner>,
        tracker: ReferenceTracker,
        bindings: Vec<Arc<ReferenceBinding>>,
        messages: mpsc::UnboundedReceiver<ContainerMessage>,
    ) -> Self {
        Self {
            inner,
            tracker,
            bindings,
            messages,
            announced: Vec::new(),
            grace: Arc::new(GraceTimer::default()),
        }
    }

    /// Runs until the container is stopped
    pub async fn run(mut self) {
        self.start();

        // If we are waiting for dependencies - spawn a thread to signal the end of the grace period
        let (grace_tx, mut grace_rx) = oneshot::channel::<()>();
        if *self.inner.state.lock() == ContainerState::GracePeriod {
            let grace_period = self.inner.config.grace_period;
            let timer = self.grace.clone();
            let spawned = thread::Builder::new()
                .name(format!("arbor-{}-grace", self.inner.config.name))
                .spawn(move || {
                    if timer.expired_after(grace_period) {
                        let _ = grace_tx.send(());
                    }
                });
            if let Err(error) = spawned {
                tracing::error!("Could not start the grace period timer - error: {error}");
            }
        }

        loop {
            futures::select! {
                message = self.messages.select_next_some() => {
                    let mut batch = vec![message];
                    while let Ok(Some(message)) = self.messages.try_next() {
                        batch.push(message);
                    }
                    if self.handle(batch) {
                        break;
                    }
                }
                expired = grace_rx => {
                    if expired.is_ok() {
                        self.grace_period_expired();
                    }
                }
            }
        }

        tracing::debug!("Coordinator of '{}' finished", self.inner.config.name);
    }

    fn start(&mut self) {
        *self.inner.coordinator.lock() = Some(thread::current().id());
        tracing::debug!(
            "Starting container '{}' with {} component(s) and {} binding(s)",
            self.inner.config.name,
            self.inner.table.lock().ids().len(),
            self.bindings.len()
        );

        self.inner.set_state(ContainerState::Creating);
        self.inner.events.dispatch(ContainerEvent::Creating);

        for binding in &self.bindings {
            self.tracker.track(binding.clone());
        }

        let ids = self.inner.table.lock().ids();
        for id in &ids {
            self.transition(id, ComponentState::WaitingForDependencies);
        }

        self.evaluate();
    }

    /// Handles a batch of queued messages, returns true once stopped
    ///
    /// Bindings are read in their current state, so a batch sees the net effect
    /// of all registry changes it contains.
    fn handle(&mut self, batch: Vec<ContainerMessage>) -> bool {
        let mut changed = BTreeSet::new();
        let mut activations = Vec::new();
        let mut stops = Vec::new();
        for message in batch {
            match message {
                ContainerMessage::BindingChanged(id) => {
                    changed.insert(id);
                }
                ContainerMessage::Activate { component, reply } => {
                    activations.push((component, reply))
                }
                ContainerMessage::Stop { reply } => stops.push(reply),
            }
        }

        for id in changed {
            if let Some(binding) = self.bindings.iter().find(|binding| binding.id() == id) {
                binding.sync_listeners();
            }
        }

        if !stops.is_empty() {
            let report = self.stop();
            for reply in stops.into_iter().flatten() {
                let _ = reply.send(report.clone());
            }
            return true;
        }

        self.evaluate();

        for (component, reply) in activations {
            let _ = reply.send(self.activate_on_request(&component));
        }
        false
    }

    /// Moves every component as far as its dependencies allow
    fn evaluate(&mut self) {
        loop {
            let mut progressed = false;
            let ids = self.inner.table.lock().ids();

            for id in &ids {
                let Some((state, activation, scope)) =
                    self.inner.table.lock().get(id).map(|record| {
                        (record.state, record.plan.activation, record.plan.scope)
                    })
                else {
                    continue;
                };

                if matches!(
                    state,
                    ComponentState::WaitingForDependencies | ComponentState::Satisfied
                ) {
                    if let Some(dependency) = self.failed_dependency(id) {
                        self.fail(
                            id,
                            ContainerError::DependencyFailed {
                                component: id.to_string(),
                                dependency: dependency.to_string(),
                            },
                        );
                        progressed = true;
                        continue;
                    }
                }

                let satisfied = self.is_satisfied(id);
                match state {
                    ComponentState::WaitingForDependencies if satisfied => {
                        self.transition(id, ComponentState::Satisfied);
                        progressed = true;
                    }
                    ComponentState::Satisfied if !satisfied => {
                        self.transition(id, ComponentState::WaitingForDependencies);
                        progressed = true;
                    }
                    ComponentState::Satisfied
                        if activation == Activation::Eager
                            || scope == Scope::Prototype
                            || self.inner.repository.instance(id.as_str()).is_some() =>
                    {
                        self.activate(id);
                        progressed = true;
                    }
                    ComponentState::Active if !satisfied => {
                        self.demote(id);
                        progressed = true;
                    }
                    _ => {}
                }
            }

            if !progressed {
                break;
            }
        }

        self.update_container_state();
    }

    fn is_satisfied(&self, id: &RecipeId) -> bool {
        if !self.inner.config.wait_for_dependencies {
            return true;
        }
        let table = self.inner.table.lock();
        table.get(id).is_some_and(|record| {
            record
                .bindings
                .iter()
                .all(|binding| !binding.is_mandatory() || binding.is_satisfied())
        })
    }

    fn failed_dependency(&self, id: &RecipeId) -> Option<RecipeId> {
        let table = self.inner.table.lock();
        let record = table.get(id)?;
        record
            .plan
            .depends_on
            .iter()
            .find(|dependency| {
                table
                    .get(dependency)
                    .is_some_and(|dependency| dependency.state == ComponentState::Failed)
            })
            .cloned()
    }

    /// Instantiates and publishes a satisfied component
    fn activate(&mut self, id: &RecipeId) {
        let Some((scope, publish)) = self
            .inner
            .table
            .lock()
            .get(id)
            .map(|record| (record.plan.scope, record.plan.publish.clone()))
        else {
            return;
        };

        // Prototypes are created per request
        if scope == Scope::Prototype {
            self.transition(id, ComponentState::Active);
            return;
        }

        // No locks are held while user code runs
        match self.inner.repository.create(id) {
            Ok(value) => {
                let registration = publish.and_then(|publish| self.publish(id, &publish, &value));
                if let Some(record) = self.inner.table.lock().get_mut(id) {
                    record.instance = Some(value);
                    record.registration = registration;
                }
                self.transition(id, ComponentState::Active);
            }
            Err(error) => self.fail(id, ContainerError::Instantiation(error)),
        }
    }

    fn publish(
        &self,
        id: &RecipeId,
        publish: &PublishMetadata,
        value: &Value,
    ) -> Option<Registration> {
        let Some(instance) = value.as_instance() else {
            tracing::warn!("'{id}' produced {} and cannot be published", value.kind());
            return None;
        };

        let mut attributes = publish.attributes.clone();
        attributes.insert(OBJECT_CLASS, AttrValue::from(publish.interfaces.clone()));
        attributes.insert(COMPONENT_NAME, id.as_str());
        if publish.ranking != 0 {
            attributes.insert(SERVICE_RANKING, publish.ranking);
        }

        let service = match self.inner.registry.register(instance.clone(), attributes.clone()) {
            Ok(service) => service,
            Err(error) => {
                tracing::warn!("Could not publish '{id}' - error: {error}");
                return None;
            }
        };
        tracing::debug!("Published '{id}' as {service} {:?}", publish.interfaces);

        attributes.insert(SERVICE_ID, service.0 as i64);
        let service = ServiceReference::new(service, attributes, instance.clone());
        let listeners = self.registration_listeners(id);
        for listener in &listeners {
            if let Some(method) = &listener.bind {
                notify(id, listener, method, &service);
            }
        }
        Some(Registration { service, listeners })
    }

    /// Creates the registration listeners of a component, broken ones are skipped
    fn registration_listeners(&self, id: &RecipeId) -> Vec<BoundListener> {
        let listeners = self
            .inner
            .table
            .lock()
            .get(id)
            .map(|record| record.plan.registration_listeners.clone())
            .unwrap_or_default();

        listeners
            .into_iter()
            .filter_map(|listener| {
                let instance = self
                    .inner
                    .repository
                    .create(&listener.value)
                    .map_err(|error| error.to_string())
                    .and_then(|value| Instance::from_value(value).map_err(|error| error.to_string()));
                match instance {
                    Ok(instance) => Some(BoundListener {
                        instance,
                        class: listener.callbacks.class,
                        bind: listener.callbacks.bind,
                        unbind: listener.callbacks.unbind,
                    }),
                    Err(error) => {
                        tracing::warn!(
                            "Registration listener '{}' of '{id}' is unavailable - error: {error}",
                            listener.value
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Tells the registration listeners, then removes the service
    fn unpublish(&self, id: &RecipeId, registration: Registration) {
        for listener in &registration.listeners {
            if let Some(method) = &listener.unbind {
                notify(id, listener, method, &registration.service);
            }
        }
        if let Err(error) = self.inner.registry.unregister(registration.service.id()) {
            tracing::warn!("Could not unpublish '{id}' - error: {error}");
        }
    }

    /// Unpublishes the component and destroys its instance
    fn retire(&self, id: &RecipeId) {
        let Some((registration, owned)) = self.inner.table.lock().get_mut(id).map(|record| {
            record.instance = None;
            (record.registration.take(), record.plan.owned.clone())
        }) else {
            return;
        };

        if let Some(registration) = registration {
            self.unpublish(id, registration);
        }
        // Failures are logged by the repository
        self.inner.repository.retire(&owned);
    }

    /// Takes an active component back to waiting, its direct dependents first
    fn demote(&mut self, id: &RecipeId) {
        let dependents = self.inner.table.lock().dependents(id);
        for dependent in &dependents {
            let state = self.inner.table.lock().get(dependent).map(|record| record.state);
            match state {
                Some(ComponentState::Active) => self.demote(dependent),
                Some(ComponentState::Satisfied) => {
                    self.transition(dependent, ComponentState::WaitingForDependencies);
                }
                _ => {}
            }
        }

        tracing::debug!("Demoting '{id}', a mandatory reference went away");
        self.retire(id);
        self.transition(id, ComponentState::WaitingForDependencies);
    }

    /// Fails the component and everything injected with it directly
    fn fail(&mut self, id: &RecipeId, error: ContainerError) {
        let previous = self.inner.table.lock().get(id).map(|record| record.state);
        if previous == Some(ComponentState::Active) {
            self.retire(id);
        }
        if !self.transition(id, ComponentState::Failed) {
            return;
        }

        tracing::warn!("Component '{id}' failed - error: {error}");
        if let Some(record) = self.inner.table.lock().get_mut(id) {
            record.failure = Some(error);
        }

        let dependents = self.inner.table.lock().dependents(id);
        for dependent in dependents {
            self.fail(
                &dependent,
                ContainerError::DependencyFailed {
                    component: dependent.to_string(),
                    dependency: id.to_string(),
                },
            );
        }
    }

    /// Fails eager components that never got their references
    fn grace_period_expired(&mut self) {
        if *self.inner.state.lock() != ContainerState::GracePeriod {
            return;
        }

        let waiting: Vec<(RecipeId, Vec<String>)> = self
            .inner
            .table
            .lock()
            .records()
            .filter(|record| {
                record.plan.activation == Activation::Eager
                    && record.state == ComponentState::WaitingForDependencies
                    && !record.was_active
            })
            .map(|record| (record.id().clone(), record.missing()))
            .collect();

        tracing::warn!(
            "Grace period of '{}' expired with {} component(s) waiting",
            self.inner.config.name,
            waiting.len()
        );
        for (id, missing) in waiting {
            self.fail(
                &id,
                ContainerError::ReferenceTimeout {
                    component: id.to_string(),
                    grace_period: self.inner.config.grace_period,
                    missing,
                },
            );
        }
        self.update_container_state();
    }

    fn update_container_state(&mut self) {
        let current = *self.inner.state.lock();
        if !matches!(
            current,
            ContainerState::Creating | ContainerState::GracePeriod
        ) {
            return;
        }

        let (settled, missing, failures) = {
            let table = self.inner.table.lock();
            let eager: Vec<_> = table
                .records()
                .filter(|record| record.plan.activation == Activation::Eager)
                .collect();
            let settled = eager.iter().all(|record| {
                matches!(
                    record.state,
                    ComponentState::Active | ComponentState::Failed
                )
            });
            let mut missing: Vec<String> = eager
                .iter()
                .filter(|record| record.state == ComponentState::WaitingForDependencies)
                .flat_map(|record| record.missing())
                .collect();
            missing.sort();
            missing.dedup();
            let failures: Vec<ComponentFailure> = table
                .records()
                .filter_map(|record| {
                    record.failure.clone().map(|error| ComponentFailure {
                        component: record.id().to_string(),
                        error,
                    })
                })
                .collect();
            (settled, missing, failures)
        };

        if settled {
            self.grace.cancel();
            match failures.is_empty() {
                true => {
                    tracing::info!("Container '{}' is active", self.inner.config.name);
                    self.inner.set_state(ContainerState::Active);
                    self.inner.events.dispatch(ContainerEvent::Created);
                }
                false => {
                    tracing::warn!(
                        "Container '{}' failed with {} failed component(s)",
                        self.inner.config.name,
                        failures.len()
                    );
                    self.inner.set_state(ContainerState::Failed);
                    self.inner
                        .events
                        .dispatch(ContainerEvent::Failure { failures });
                }
            }
            return;
        }

        if current == ContainerState::Creating || missing != self.announced {
            tracing::info!(
                "Container '{}' is waiting for {:?}",
                self.inner.config.name,
                missing
            );
            self.inner.set_state(ContainerState::GracePeriod);
            self.inner.events.dispatch(ContainerEvent::GracePeriod {
                missing: missing.clone(),
            });
            self.announced = missing;
        }
    }

    /// A lazy singleton or a prototype requested by a consumer
    fn activate_on_request(&mut self, id: &RecipeId) -> Result<Value, ContainerError> {
        let (state, scope) = self
            .inner
            .table
            .lock()
            .get(id)
            .map(|record| (record.state, record.plan.scope))
            .ok_or_else(|| ContainerError::NoSuchComponent(id.to_string()))?;

        if state == ComponentState::Satisfied {
            self.activate(id);
        }

        let active = self.inner.table.lock().get(id).map(|record| record.state)
            == Some(ComponentState::Active);
        let result = match scope {
            Scope::Prototype if active => self
                .inner
                .repository
                .create(id)
                .map_err(ContainerError::Instantiation),
            _ => self.inner.instance_of(id),
        };

        // Singletons created along the way are activated and published
        self.evaluate();
        result
    }

    /// Unpublishes and destroys everything, then closes all references
    fn stop(&mut self) -> StopReport {
        tracing::info!("Stopping container '{}'", self.inner.config.name);
        self.grace.cancel();
        self.inner.set_state(ContainerState::Stopping);
        self.inner.events.dispatch(ContainerEvent::Destroying);

        let ids = self.inner.table.lock().ids();
        for id in ids.iter().rev() {
            let registration = self
                .inner
                .table
                .lock()
                .get_mut(id)
                .and_then(|record| record.registration.take());
            if let Some(registration) = registration {
                self.unpublish(id, registration);
            }
            self.transition(id, ComponentState::Deactivating);
        }

        let destroy_failures = self.inner.repository.destroy_all();
        self.tracker.untrack_all();

        for id in ids.iter().rev() {
            if let Some(record) = self.inner.table.lock().get_mut(id) {
                record.instance = None;
            }
            self.transition(id, ComponentState::Destroyed);
        }

        self.inner.set_state(ContainerState::Stopped);
        self.inner.events.dispatch(ContainerEvent::Destroyed);
        self.inner.events.close();
        tracing::info!(
            "Container '{}' stopped, {} destroy failure(s)",
            self.inner.config.name,
            destroy_failures.len()
        );

        StopReport { destroy_failures }
    }

    /// Applies a transition and announces it, false if it was not allowed
    fn transition(&self, id: &RecipeId, next: ComponentState) -> bool {
        let previous = self.inner.table.lock().transition(id.as_str(), next);
        match previous {
            Some(previous) => {
                self.inner
                    .events
                    .dispatch(ContainerEvent::ComponentStateChanged {
                        component: id.to_string(),
                        from: previous,
                        to: next,
                    });
                true
            }
            None => false,
        }
    }
}

/// User code failing in a registration listener never affects the component
fn notify(id: &RecipeId, listener: &BoundListener, method: &str, service: &ServiceReference) {
    if let Err(error) = listener
        .class
        .invoke_listener(method, &listener.instance, service)
    {
        tracing::warn!(
            "Registration listener '{method}' of '{id}' failed for service {}: {error}",
            service.id()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn grace_timer_expires_without_cancel() {
        let timer = GraceTimer::default();
        assert!(timer.expired_after(Duration::from_millis(10)));
    }

    #[test]
    fn cancelled_grace_timer_returns_early() {
        let timer = Arc::new(GraceTimer::default());
        let canceller = {
            let timer = timer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                timer.cancel();
            })
        };

        let started = Instant::now();
        assert!(!timer.expired_after(Duration::from_secs(60)));
        assert!(started.elapsed() < Duration::from_secs(10));
        canceller.join().unwrap();
    }

    #[test]
    fn cancel_before_waiting_does_not_block() {
        let timer = GraceTimer::default();
        timer.cancel();
        assert!(!timer.expired_after(Duration::from_secs(60)));
    }
}
