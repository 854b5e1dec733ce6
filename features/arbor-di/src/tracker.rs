//! Keeps reference bindings in sync with the service registry.
//!
//! Registry events arrive on whichever thread changed the registry. The tracker only
//! updates the affected [ReferenceBinding] and enqueues a notification for the coordinator,
//! it never touches component state itself.

use std::{
    fmt::Display,
    sync::Arc,
    time::{Duration, Instant},
};

use arbor_registry::{
    Filter, Instance, ListenerId, ServiceEvent, ServiceId, ServiceListener, ServiceReference,
    ServiceRegistry,
};
use futures_channel::mpsc;
use parking_lot::{Condvar, Mutex};

use crate::{class::DynBeanClass, coordinator::ContainerMessage, metadata::Damping, recipe::RecipeId};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BindingId(pub(crate) usize);
impl Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "binding-{}", self.0)
    }
}

/// Result of looking up the active provider
pub(crate) enum Delegate {
    Bound(ServiceReference),
    Unbound,
    Closed,
}

/// Providers currently matching one reference or reference list
///
/// Only the tracker changes the provider set. Proxies read the active delegate,
/// the coordinator reads whether the binding is satisfied.
pub struct ReferenceBinding {
    id: BindingId,
    recipe: RecipeId,
    filter: Filter,
    min_providers: usize,
    multiple: bool,
    damping: Damping,
    state: Mutex<BindingState>,
    changed: Condvar,
    listeners: Mutex<ListenerSet>,
}

#[derive(Default)]
struct BindingState {
    closed: bool,
    /// Ordered by preference
    providers: Vec<ServiceReference>,
    active: Option<ServiceReference>,
}

#[derive(Default)]
struct ListenerSet {
    listeners: Vec<BoundListener>,
    /// What the listeners have been told is bound
    notified: Vec<ServiceReference>,
}

/// A listener bean attached to a reference
pub(crate) struct BoundListener {
    pub(crate) instance: Instance,
    pub(crate) class: Arc<dyn DynBeanClass>,
    pub(crate) bind: Option<String>,
    pub(crate) unbind: Option<String>,
}

enum ListenerCall {
    Bind(ServiceReference),
    Unbind(ServiceReference),
}

impl ReferenceBinding {
    pub(crate) fn new(
        id: BindingId,
        recipe: RecipeId,
        filter: Filter,
        min_providers: usize,
        multiple: bool,
        damping: Damping,
    ) -> Self {
        Self {
            id,
            recipe,
            filter,
            min_providers,
            multiple,
            damping,
            state: Mutex::new(BindingState::default()),
            changed: Condvar::new(),
            listeners: Mutex::new(ListenerSet::default()),
        }
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    /// The reference recipe this binding belongs to
    pub fn recipe(&self) -> &RecipeId {
        &self.recipe
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn is_mandatory(&self) -> bool {
        self.min_providers > 0
    }

    pub fn is_satisfied(&self) -> bool {
        self.state.lock().providers.len() >= self.min_providers
    }

    pub fn active(&self) -> Option<ServiceReference> {
        self.state.lock().active.clone()
    }

    pub fn providers(&self) -> Vec<ServiceReference> {
        self.state.lock().providers.clone()
    }

    /// Waits up to `timeout` for an active provider
    pub(crate) fn wait_active(&self, timeout: Duration) -> Delegate {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Delegate::Closed;
            }
            if let Some(active) = &state.active {
                return Delegate::Bound(active.clone());
            }
            if Instant::now() >= deadline {
                return Delegate::Unbound;
            }
            self.changed.wait_until(&mut state, deadline);
        }
    }

    /// Applies a registry event, returns true if the binding changed
    fn apply(&self, event: &ServiceEvent) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }

        let reference = event.reference();
        let changed = match event {
            ServiceEvent::Registered(_) | ServiceEvent::Modified(_)
                if self.filter.matches(reference.attributes()) =>
            {
                state.upsert(reference.clone());
                true
            }
            _ => state.remove(reference.id()),
        };

        if changed {
            state.select_active(self.damping);
            drop(state);
            self.changed.notify_all();
        }
        changed
    }

    /// Drops all providers, proxies fail from now on
    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.providers.clear();
        state.active = None;
        drop(state);
        self.changed.notify_all();
    }

    /// What listeners should currently consider bound
    fn bound(&self) -> Vec<ServiceReference> {
        let state = self.state.lock();
        match self.multiple {
            true => state.providers.clone(),
            false => state.active.iter().cloned().collect(),
        }
    }

    /// Attaches the listener beans of a freshly created reference recipe
    pub(crate) fn attach_listeners(&self, listeners: Vec<BoundListener>) {
        let mut set = self.listeners.lock();
        set.listeners = listeners;
        set.notified.clear();
    }

    /// Unbinds everything the listeners were told about and detaches them
    pub(crate) fn detach_listeners(&self) {
        let (listeners, calls) = {
            let mut set = self.listeners.lock();
            let calls: Vec<ListenerCall> = set
                .notified
                .drain(..)
                .map(ListenerCall::Unbind)
                .collect();
            (std::mem::take(&mut set.listeners), calls)
        };
        invoke_listeners(&self.recipe, &listeners, calls);
    }

    /// Brings the listeners up to date with the bound providers
    ///
    /// Listeners see the net change since their last notification.
    pub(crate) fn sync_listeners(&self) {
        let bound = self.bound();
        let mut set = self.listeners.lock();
        if set.listeners.is_empty() {
            return;
        }

        let mut calls = Vec::new();
        for previous in &set.notified {
            if !bound.iter().any(|current| current.id() == previous.id()) {
                calls.push(ListenerCall::Unbind(previous.clone()));
            }
        }
        for current in &bound {
            if !set.notified.iter().any(|previous| previous.id() == current.id()) {
                calls.push(ListenerCall::Bind(current.clone()));
            }
        }
        set.notified = bound;

        if calls.is_empty() {
            return;
        }
        // Still locked, so calls of concurrent syncs cannot interleave
        invoke_listeners(&self.recipe, &set.listeners, calls);
    }
}

fn invoke_listeners(recipe: &RecipeId, listeners: &[BoundListener], calls: Vec<ListenerCall>) {
    for call in calls {
        for listener in listeners {
            let (method, reference) = match &call {
                ListenerCall::Bind(reference) => (&listener.bind, reference),
                ListenerCall::Unbind(reference) => (&listener.unbind, reference),
            };
            let Some(method) = method else {
                continue;
            };

            if let Err(error) = listener
                .class
                .invoke_listener(method, &listener.instance, reference)
            {
                tracing::warn!(
                    "Listener '{method}' of '{recipe}' failed for service {}: {error}",
                    reference.id()
                );
            }
        }
    }
}

impl BindingState {
    fn upsert(&mut self, reference: ServiceReference) {
        self.providers.retain(|existing| existing.id() != reference.id());
        self.providers.push(reference);
        self.providers.sort_by(ServiceReference::cmp_preference);
    }

    fn remove(&mut self, id: ServiceId) -> bool {
        let before = self.providers.len();
        self.providers.retain(|existing| existing.id() != id);
        before != self.providers.len()
    }

    fn select_active(&mut self, damping: Damping) {
        let best = self.providers.first().cloned();
        self.active = match (self.active.take(), damping) {
            (Some(active), Damping::Reluctant) => {
                // Keep the bound provider as long as it is around, with its latest attributes
                match self
                    .providers
                    .iter()
                    .find(|provider| provider.id() == active.id())
                {
                    Some(refreshed) => Some(refreshed.clone()),
                    None => best,
                }
            }
            _ => best,
        };
    }
}

/// Subscribes reference bindings in the service registry
pub struct ReferenceTracker {
    registry: Arc<dyn ServiceRegistry>,
    notifier: mpsc::UnboundedSender<ContainerMessage>,
    subscriptions: Mutex<Vec<(Arc<ReferenceBinding>, ListenerId)>>,
}

impl ReferenceTracker {
    pub(crate) fn new(
        registry: Arc<dyn ServiceRegistry>,
        notifier: mpsc::UnboundedSender<ContainerMessage>,
    ) -> Self {
        Self {
            registry,
            notifier,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Starts tracking, the binding holds all matching providers once this returns
    pub fn track(&self, binding: Arc<ReferenceBinding>) {
        let listener = BindingListener {
            binding: binding.clone(),
            notifier: self.notifier.clone(),
        };
        let id = self
            .registry
            .subscribe(binding.filter().clone(), Arc::new(listener));

        tracing::debug!(
            "Tracking {} for '{}' - {} provider(s), satisfied: {}",
            binding.filter(),
            binding.recipe(),
            binding.providers().len(),
            binding.is_satisfied()
        );
        self.subscriptions.lock().push((binding, id));
    }

    /// Unsubscribes every binding and closes it
    pub fn untrack_all(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for (binding, id) in subscriptions {
            self.registry.unsubscribe(id);
            binding.close();
        }
    }
}

struct BindingListener {
    binding: Arc<ReferenceBinding>,
    notifier: mpsc::UnboundedSender<ContainerMessage>,
}

impl ServiceListener for BindingListener {
    fn service_changed(&self, event: ServiceEvent) {
        if !self.binding.apply(&event) {
            return;
        }

        tracing::debug!(
            "{} of '{}' changed by {:?}, satisfied: {}",
            self.binding.id(),
            self.binding.recipe(),
            event,
            self.binding.is_satisfied()
        );

        // The coordinator may already be gone, nothing left to notify then
        let _ = self
            .notifier
            .unbounded_send(ContainerMessage::BindingChanged(self.binding.id()));
    }
}
