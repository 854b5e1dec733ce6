//! Instantiates recipes depth first and caches singletons.
//!
//! Every singleton has a slot. While a slot is `Creating` other threads asking for it
//! wait for the owner to finish, deferred edges get a pending proxy instead.
//! A singleton first reached through a deferred edge is created after the call
//! that reached it has finished everything else.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    thread::{self, ThreadId},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    errors::{DestroyFailure, RecipeError},
    metadata::Scope,
    proxy::{DeferredProxy, ProxyFactory},
    recipe::{Recipe, RecipeId},
    value::Value,
};

enum Slot {
    /// Only reached through deferred edges so far
    Pending { proxies: Vec<DeferredProxy> },
    Creating {
        owner: ThreadId,
        proxies: Vec<DeferredProxy>,
    },
    Ready(Value),
    /// Sticky until the slot is reset
    Failed(Arc<RecipeError>),
}

#[derive(Default)]
struct RepositoryState {
    slots: HashMap<RecipeId, Slot>,
    /// Singletons in the order they finished constructing
    order: Vec<RecipeId>,
}

/// Singletons created during one top level call, discarded if the call fails
#[derive(Default)]
struct Session {
    created: Vec<RecipeId>,
    pending: Vec<RecipeId>,
}

pub struct Repository {
    recipes: BTreeMap<RecipeId, Arc<dyn Recipe>>,
    state: Mutex<RepositoryState>,
    changed: Condvar,
}

impl Repository {
    pub fn new(recipes: BTreeMap<RecipeId, Arc<dyn Recipe>>) -> Self {
        Self {
            recipes,
            state: Mutex::new(RepositoryState::default()),
            changed: Condvar::new(),
        }
    }

    pub fn recipe(&self, id: &str) -> Option<&Arc<dyn Recipe>> {
        self.recipes.get(id)
    }

    /// Produces the value of a recipe, instantiating its dependencies first
    ///
    /// On failure every singleton created by this call is destroyed again.
    pub fn create(&self, id: &RecipeId) -> Result<Value, RecipeError> {
        let mut session = Session::default();
        let result = self
            .resolve(id, false, &mut session)
            .and_then(|value| self.settle(id, &mut session).map(|_| value));
        if let Err(error) = &result {
            self.discard(session, error);
        }
        result
    }

    /// Produces the values of all `ids`, all or nothing
    pub fn create_all(&self, ids: &[RecipeId]) -> Result<BTreeMap<RecipeId, Value>, RecipeError> {
        let mut session = Session::default();
        let mut values = BTreeMap::new();
        for id in ids {
            let result = self
                .resolve(id, false, &mut session)
                .and_then(|value| self.settle(id, &mut session).map(|_| value));
            match result {
                Ok(value) => {
                    values.insert(id.clone(), value);
                }
                Err(error) => {
                    self.discard(session, &error);
                    return Err(error);
                }
            }
        }
        Ok(values)
    }

    /// The cached value of a singleton, never creates anything
    pub fn instance(&self, id: &str) -> Option<Value> {
        match self.state.lock().slots.get(id) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Destroys the cached singletons among `ids`, newest first
    pub fn retire(&self, ids: &[RecipeId]) -> Vec<DestroyFailure> {
        let retired: Vec<(RecipeId, Value)> = {
            let mut state = self.state.lock();
            let RepositoryState { slots, order } = &mut *state;
            let mut retired = Vec::new();
            order.retain(|id| {
                if !ids.contains(id) {
                    return true;
                }
                if let Some(Slot::Ready(value)) = slots.remove(id) {
                    retired.push((id.clone(), value));
                }
                false
            });
            retired
        };
        self.destroy(retired.into_iter().rev())
    }

    /// Forgets failures of `ids`, so they are constructed again on the next request
    pub fn reset(&self, ids: &[RecipeId]) {
        let mut state = self.state.lock();
        for id in ids {
            if let Some(Slot::Failed(_)) = state.slots.get(id) {
                state.slots.remove(id);
            }
        }
    }

    /// Destroys every cached singleton in reverse creation order
    pub fn destroy_all(&self) -> Vec<DestroyFailure> {
        let retired: Vec<(RecipeId, Value)> = {
            let mut state = self.state.lock();
            let order = std::mem::take(&mut state.order);
            let mut slots = std::mem::take(&mut state.slots);
            order
                .into_iter()
                .filter_map(|id| match slots.remove(&id) {
                    Some(Slot::Ready(value)) => Some((id, value)),
                    _ => None,
                })
                .collect()
        };
        self.destroy(retired.into_iter().rev())
    }

    fn destroy(&self, values: impl Iterator<Item = (RecipeId, Value)>) -> Vec<DestroyFailure> {
        let mut failures = Vec::new();
        for (id, value) in values {
            let Some(recipe) = self.recipes.get(&id) else {
                continue;
            };
            tracing::trace!("Destroying '{id}'");
            if let Err(error) = recipe.destroy(&value) {
                let failure = DestroyFailure {
                    recipe: id,
                    error: Arc::new(error),
                };
                tracing::warn!("{failure}");
                failures.push(failure);
            }
        }
        failures
    }

    /// Creates the singletons the call only reached through deferred edges
    fn settle(&self, id: &RecipeId, session: &mut Session) -> Result<(), RecipeError> {
        while let Some(pending) = session.pending.pop() {
            self.resolve(&pending, false, session)
                .map_err(|cause| RecipeError::DependencyFailed {
                    recipe: id.clone(),
                    dependency: pending,
                    cause: Arc::new(cause),
                })?;
        }
        Ok(())
    }

    /// Removes what a failed call created, best effort
    fn discard(&self, session: Session, error: &RecipeError) {
        let abandoned: Vec<DeferredProxy> = {
            let mut state = self.state.lock();
            let mut abandoned = Vec::new();
            for id in &session.pending {
                if let Some(Slot::Pending { .. }) = state.slots.get(id) {
                    if let Some(Slot::Pending { proxies }) = state.slots.remove(id) {
                        abandoned.extend(proxies);
                    }
                }
            }
            abandoned
        };
        let cause = Arc::new(error.clone());
        for proxy in abandoned {
            proxy.fail(cause.clone());
        }

        if session.created.is_empty() {
            return;
        }
        tracing::debug!(
            "Discarding {} instance(s) of a failed resolution",
            session.created.len()
        );
        self.retire(&session.created);
    }

    fn resolve(
        &self,
        id: &RecipeId,
        deferred: bool,
        session: &mut Session,
    ) -> Result<Value, RecipeError> {
        let recipe = self
            .recipes
            .get(id)
            .cloned()
            .ok_or_else(|| RecipeError::Missing(id.clone()))?;

        if recipe.scope() == Scope::Prototype {
            return self.instantiate(recipe.as_ref(), session);
        }

        let current = thread::current().id();
        {
            let mut state = self.state.lock();
            loop {
                match state.slots.get_mut(id) {
                    None if deferred => {
                        let proxy = ProxyFactory::deferred(id, current);
                        state.slots.insert(
                            id.clone(),
                            Slot::Pending {
                                proxies: vec![proxy.clone()],
                            },
                        );
                        session.pending.push(id.clone());
                        return Ok(Value::Deferred(proxy));
                    }
                    None => {
                        state.slots.insert(
                            id.clone(),
                            Slot::Creating {
                                owner: current,
                                proxies: Vec::new(),
                            },
                        );
                        break;
                    }
                    Some(Slot::Ready(value)) => return Ok(value.clone()),
                    Some(Slot::Failed(cause)) if deferred => {
                        return Ok(Value::Deferred(DeferredProxy::failed(
                            id.to_string(),
                            cause.clone(),
                        )))
                    }
                    Some(Slot::Failed(cause)) => return Err((**cause).clone()),
                    Some(Slot::Pending { proxies }) if deferred => {
                        let proxy = ProxyFactory::deferred(id, current);
                        proxies.push(proxy.clone());
                        return Ok(Value::Deferred(proxy));
                    }
                    Some(Slot::Pending { proxies }) => {
                        let proxies = std::mem::take(proxies);
                        for proxy in &proxies {
                            proxy.reown(current);
                        }
                        state.slots.insert(
                            id.clone(),
                            Slot::Creating {
                                owner: current,
                                proxies,
                            },
                        );
                        break;
                    }
                    Some(Slot::Creating { owner, proxies }) => {
                        if deferred {
                            // Never wait on a deferred edge, the owner may be waiting for us
                            let proxy = ProxyFactory::deferred(id, *owner);
                            proxies.push(proxy.clone());
                            return Ok(Value::Deferred(proxy));
                        }
                        if *owner == current {
                            return Err(RecipeError::CircularDependency(vec![id.clone()]));
                        }
                        self.changed.wait(&mut state);
                    }
                }
            }
        }

        let result = self.instantiate(recipe.as_ref(), session);

        let proxies = {
            let mut state = self.state.lock();
            let proxies = match state.slots.remove(id) {
                Some(Slot::Creating { proxies, .. }) => proxies,
                _ => Vec::new(),
            };
            match &result {
                Ok(value) => {
                    state.slots.insert(id.clone(), Slot::Ready(value.clone()));
                    state.order.push(id.clone());
                    session.created.push(id.clone());
                }
                Err(error) => {
                    state
                        .slots
                        .insert(id.clone(), Slot::Failed(Arc::new(error.clone())));
                }
            }
            proxies
        };
        self.changed.notify_all();

        for proxy in proxies {
            match &result {
                Ok(Value::Object(instance)) => proxy.fix(instance.clone()),
                Ok(other) => proxy.fail(Arc::new(RecipeError::ConstructionFailed {
                    recipe: id.clone(),
                    error: Arc::new(format!("'{id}' produced {} instead of an object", other.kind()).into()),
                })),
                Err(error) => proxy.fail(Arc::new(error.clone())),
            }
        }
        result
    }

    fn instantiate(&self, recipe: &dyn Recipe, session: &mut Session) -> Result<Value, RecipeError> {
        let mut values = Vec::with_capacity(recipe.dependencies().len());
        for dependency in recipe.dependencies() {
            let value = self
                .resolve(&dependency.id, dependency.deferred, session)
                .map_err(|cause| RecipeError::DependencyFailed {
                    recipe: recipe.id().clone(),
                    dependency: dependency.id.clone(),
                    cause: Arc::new(cause),
                })?;
            values.push(value);
        }

        tracing::trace!("Creating '{}'", recipe.id());
        recipe.create(values)
    }
}
