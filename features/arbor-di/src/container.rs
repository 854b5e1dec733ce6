use std::{
    fmt::Debug,
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use arbor_registry::ServiceRegistry;
use futures_channel::{mpsc, oneshot};
use parking_lot::{Condvar, Mutex};

use crate::{
    component::{ComponentInfo, ComponentState, ComponentTable},
    config::ContainerConfig,
    coordinator::ContainerMessage,
    errors::{ContainerError, DestroyFailure},
    events::{ComponentFailure, ContainerEvents, ContainerState, EventDispatcher},
    inject::FromValue,
    metadata::Scope,
    recipe::RecipeId,
    repository::Repository,
    value::Value,
};

/// What went wrong while stopping, destroy failures never stop the shutdown
#[derive(Debug, Clone, Default)]
pub struct StopReport {
    pub destroy_failures: Vec<DestroyFailure>,
}

/// State shared between the handles and the coordinator
pub(crate) struct ContainerInner {
    pub(crate) config: ContainerConfig,
    pub(crate) registry: Arc<dyn ServiceRegistry>,
    pub(crate) repository: Repository,
    pub(crate) table: Mutex<ComponentTable>,
    pub(crate) state: Mutex<ContainerState>,
    settled: Condvar,
    pub(crate) events: EventDispatcher,
    /// Set once the coordinator runs
    pub(crate) coordinator: Mutex<Option<ThreadId>>,
}

impl ContainerInner {
    pub(crate) fn new(
        config: ContainerConfig,
        registry: Arc<dyn ServiceRegistry>,
        repository: Repository,
        table: ComponentTable,
    ) -> Self {
        Self {
            config,
            registry,
            repository,
            table: Mutex::new(table),
            state: Mutex::new(ContainerState::Created),
            settled: Condvar::new(),
            events: EventDispatcher::default(),
            coordinator: Mutex::new(None),
        }
    }

    pub(crate) fn set_state(&self, next: ContainerState) {
        let mut state = self.state.lock();
        tracing::debug!("Container '{}': {} -> {next}", self.config.name, *state);
        *state = next;
        self.settled.notify_all();
    }

    fn on_coordinator(&self) -> bool {
        *self.coordinator.lock() == Some(thread::current().id())
    }

    /// The cached value of a component that is active or failed
    ///
    /// Prototypes have no cached value, the coordinator creates them per request.
    pub(crate) fn instance_of(&self, id: &str) -> Result<Value, ContainerError> {
        let (state, instance, failure) = {
            let table = self.table.lock();
            let record = table
                .get(id)
                .ok_or_else(|| ContainerError::NoSuchComponent(id.to_string()))?;
            (record.state, record.instance.clone(), record.failure.clone())
        };

        match state {
            ComponentState::Active => match instance {
                Some(instance) => Ok(instance),
                // Components without a published value, e.g. references
                None => self.repository.instance(id).ok_or_else(|| {
                    ContainerError::NotYetAvailable {
                        component: id.to_string(),
                        state,
                    }
                }),
            },
            ComponentState::Failed => Err(failure.unwrap_or(ContainerError::NotYetAvailable {
                component: id.to_string(),
                state,
            })),
            ComponentState::Deactivating | ComponentState::Destroyed => {
                Err(ContainerError::Stopped)
            }
            _ => Err(ContainerError::NotYetAvailable {
                component: id.to_string(),
                state,
            }),
        }
    }
}

/// Stops the container once the last handle is gone
struct Lifeline {
    messages: mpsc::UnboundedSender<ContainerMessage>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Lifeline {
    fn drop(&mut self) {
        let _ = self
            .messages
            .unbounded_send(ContainerMessage::Stop { reply: None });
        if let Some(thread) = self.thread.lock().take() {
            // Dropped by a component on the coordinator itself, it exits after this message
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

/// Handle to a running container
///
/// Cloning is cheap, the container is stopped when the last clone is dropped or on [Container::stop].
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
    lifeline: Arc<Lifeline>,
}

impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("Container");
        map.field("name", &self.inner.config.name);
        map.field("state", &self.state());
        for component in self.inner.table.lock().records() {
            map.field(component.id().as_str(), &component.state);
        }
        map.finish()
    }
}

impl Container {
    pub(crate) fn new(
        inner: Arc<ContainerInner>,
        messages: mpsc::UnboundedSender<ContainerMessage>,
        thread: JoinHandle<()>,
    ) -> Self {
        Self {
            inner,
            lifeline: Arc::new(Lifeline {
                messages,
                thread: Mutex::new(Some(thread)),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.inner.registry
    }

    pub fn state(&self) -> ContainerState {
        *self.inner.state.lock()
    }

    /// Blocks until start has finished or `timeout` elapsed, returns the state at that point
    pub fn wait_until_settled(&self, timeout: Duration) -> ContainerState {
        let mut state = self.inner.state.lock();
        self.inner
            .settled
            .wait_while_for(&mut state, |state| !state.is_settled(), timeout);
        *state
    }

    /// Events from now on, starting with the latest container level event
    pub fn subscribe(&self) -> ContainerEvents {
        self.inner.events.subscribe()
    }

    pub fn component_state(&self, id: &str) -> Option<ComponentState> {
        self.inner.table.lock().get(id).map(|record| record.state)
    }

    pub fn components(&self) -> Vec<ComponentInfo> {
        self.inner.table.lock().snapshot()
    }

    /// Components held back by unsatisfied mandatory references
    pub fn missing_dependencies(&self) -> Vec<ComponentInfo> {
        self.components()
            .into_iter()
            .filter(|info| {
                info.state == ComponentState::WaitingForDependencies && !info.missing.is_empty()
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<ComponentFailure> {
        self.inner
            .table
            .lock()
            .records()
            .filter_map(|record| {
                record.failure.clone().map(|error| ComponentFailure {
                    component: record.id().to_string(),
                    error,
                })
            })
            .collect()
    }

    /// The value of a component
    ///
    /// Active singletons are returned from the cache. Prototypes are created by the
    /// coordinator on every call, and a satisfied lazy singleton is activated first.
    /// Both block until the coordinator has answered.
    pub fn get_component_instance(&self, id: &str) -> Result<Value, ContainerError> {
        if matches!(
            self.state(),
            ContainerState::Stopping | ContainerState::Stopped
        ) {
            return Err(ContainerError::Stopped);
        }

        let (state, scope) = self
            .inner
            .table
            .lock()
            .get(id)
            .map(|record| (record.state, record.plan.scope))
            .ok_or_else(|| ContainerError::NoSuchComponent(id.to_string()))?;

        match state {
            ComponentState::Satisfied => self.request_activation(id),
            ComponentState::Active if scope == Scope::Prototype => self.request_activation(id),
            _ => self.inner.instance_of(id),
        }
    }

    /// Converts the component into `V`, e.g. `Arc<T>` or `ServiceRef<T>`
    pub fn get<V: FromValue>(&self, id: &str) -> Result<V, ContainerError> {
        let value = self.get_component_instance(id)?;
        V::from_value(value).map_err(|error| ContainerError::Conversion {
            component: id.to_string(),
            error,
        })
    }

    fn request_activation(&self, id: &str) -> Result<Value, ContainerError> {
        let component = RecipeId::new(id);

        if self.inner.on_coordinator() {
            // Asked from a constructor or listener, the running evaluation activates what it created
            return Ok(self.inner.repository.create(&component)?);
        }

        let (reply, response) = oneshot::channel();
        self.lifeline
            .messages
            .unbounded_send(ContainerMessage::Activate { component, reply })
            .map_err(|_| ContainerError::Stopped)?;

        match futures::executor::block_on(response) {
            Ok(result) => result,
            Err(_) => Err(ContainerError::Stopped),
        }
    }

    /// Stops the container and waits for it
    ///
    /// Further calls return an empty report.
    pub fn stop(&self) -> StopReport {
        let (reply, response) = oneshot::channel();
        if self
            .lifeline
            .messages
            .unbounded_send(ContainerMessage::Stop { reply: Some(reply) })
            .is_err()
        {
            return StopReport::default();
        }

        if self.inner.on_coordinator() {
            tracing::debug!("Stop of '{}' requested by a component", self.name());
            return StopReport::default();
        }

        let report = futures::executor::block_on(response).unwrap_or_default();
        if let Some(thread) = self.lifeline.thread.lock().take() {
            let _ = thread.join();
        }
        report
    }
}

