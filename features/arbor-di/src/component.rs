//! Lifecycle state of the components of one container.

use std::{collections::BTreeMap, fmt::Display, sync::Arc};

use arbor_registry::ServiceReference;

use crate::{
    errors::ContainerError,
    graph::ComponentPlan,
    metadata::ComponentId,
    recipe::{RecipeId, RecipeKind},
    tracker::{BoundListener, ReferenceBinding},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    Created,
    WaitingForDependencies,
    Satisfied,
    Active,
    Deactivating,
    Destroyed,
    /// A failed component is never retried, it only leaves on stop
    Failed,
}

impl ComponentState {
    pub fn can_transition_to(self, next: ComponentState) -> bool {
        use ComponentState::*;
        matches!(
            (self, next),
            (Created, WaitingForDependencies | Deactivating)
                | (WaitingForDependencies, Satisfied | Failed | Deactivating)
                | (Satisfied, Active | WaitingForDependencies | Failed | Deactivating)
                | (Active, WaitingForDependencies | Failed | Deactivating)
                | (Failed, Deactivating)
                | (Deactivating, Destroyed)
        )
    }

    /// No further transitions are possible
    pub fn is_terminal(self) -> bool {
        self == ComponentState::Destroyed
    }
}

impl Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ComponentState::Created => "CREATED",
            ComponentState::WaitingForDependencies => "WAITING_FOR_DEPENDENCIES",
            ComponentState::Satisfied => "SATISFIED",
            ComponentState::Active => "ACTIVE",
            ComponentState::Deactivating => "DEACTIVATING",
            ComponentState::Destroyed => "DESTROYED",
            ComponentState::Failed => "FAILED",
        })
    }
}

/// A published component and the listeners told about it
pub(crate) struct Registration {
    pub(crate) service: ServiceReference,
    pub(crate) listeners: Vec<BoundListener>,
}

/// One managed component, mutated only by the coordinator
pub(crate) struct ComponentRecord {
    pub(crate) plan: ComponentPlan,
    pub(crate) state: ComponentState,
    /// Every binding reachable through direct edges
    pub(crate) bindings: Vec<Arc<ReferenceBinding>>,
    pub(crate) registration: Option<Registration>,
    /// Singletons only, once active
    pub(crate) instance: Option<Value>,
    pub(crate) failure: Option<ContainerError>,
    pub(crate) was_active: bool,
}

impl ComponentRecord {
    pub(crate) fn id(&self) -> &RecipeId {
        &self.plan.id
    }

    /// Filters of the mandatory bindings that are not satisfied
    pub(crate) fn missing(&self) -> Vec<String> {
        self.bindings
            .iter()
            .filter(|binding| binding.is_mandatory() && !binding.is_satisfied())
            .map(|binding| binding.filter().to_string())
            .collect()
    }

    pub(crate) fn info(&self) -> ComponentInfo {
        ComponentInfo {
            id: self.plan.id.to_string(),
            kind: self.plan.kind,
            state: self.state,
            missing: self.missing(),
        }
    }
}

/// Snapshot of one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    pub id: ComponentId,
    pub kind: RecipeKind,
    pub state: ComponentState,
    /// Filters of unsatisfied mandatory references
    pub missing: Vec<String>,
}

/// All components of a container in declaration order
pub(crate) struct ComponentTable {
    records: BTreeMap<RecipeId, ComponentRecord>,
    order: Vec<RecipeId>,
}

impl ComponentTable {
    pub(crate) fn new(plans: Vec<ComponentPlan>, bindings: &[Arc<ReferenceBinding>]) -> Self {
        let mut records = BTreeMap::new();
        let mut order = Vec::with_capacity(plans.len());
        for plan in plans {
            let component_bindings = plan
                .bindings
                .iter()
                .filter_map(|id| bindings.iter().find(|binding| binding.id() == *id).cloned())
                .collect();
            order.push(plan.id.clone());
            records.insert(
                plan.id.clone(),
                ComponentRecord {
                    plan,
                    state: ComponentState::Created,
                    bindings: component_bindings,
                    registration: None,
                    instance: None,
                    failure: None,
                    was_active: false,
                },
            );
        }
        Self { records, order }
    }

    pub(crate) fn get(&self, id: &str) -> Option<&ComponentRecord> {
        self.records.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ComponentRecord> {
        self.records.get_mut(id)
    }

    /// Component ids in declaration order
    pub(crate) fn ids(&self) -> Vec<RecipeId> {
        self.order.clone()
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Components injected directly with `id`
    pub(crate) fn dependents(&self, id: &RecipeId) -> Vec<RecipeId> {
        self.records()
            .filter(|record| record.plan.depends_on.contains(id))
            .map(|record| record.id().clone())
            .collect()
    }

    /// Moves a component to `next`, returns the previous state if the move is valid
    pub(crate) fn transition(&mut self, id: &str, next: ComponentState) -> Option<ComponentState> {
        let record = self.records.get_mut(id)?;
        let previous = record.state;
        if !previous.can_transition_to(next) {
            tracing::trace!("Ignoring transition of '{id}' from {previous} to {next}");
            return None;
        }
        record.state = next;
        if next == ComponentState::Active {
            record.was_active = true;
        }
        tracing::debug!("Component '{id}': {previous} -> {next}");
        Some(previous)
    }

    pub(crate) fn snapshot(&self) -> Vec<ComponentInfo> {
        self.records().map(ComponentRecord::info).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Activation, Scope};

    fn plan(id: &str, depends_on: &[&str]) -> ComponentPlan {
        ComponentPlan {
            id: RecipeId::new(id),
            kind: RecipeKind::Bean,
            scope: Scope::Singleton,
            activation: Activation::Eager,
            publish: None,
            owned: vec![RecipeId::new(id)],
            bindings: vec![],
            depends_on: depends_on.iter().map(|id| RecipeId::new(*id)).collect(),
            registration_listeners: Vec::new(),
        }
    }

    #[test]
    fn failed_is_left_only_on_stop() {
        for next in [
            ComponentState::WaitingForDependencies,
            ComponentState::Satisfied,
            ComponentState::Active,
            ComponentState::Destroyed,
        ] {
            assert!(!ComponentState::Failed.can_transition_to(next));
        }
        assert!(ComponentState::Failed.can_transition_to(ComponentState::Deactivating));
        assert!(!ComponentState::Failed.is_terminal());
        assert!(ComponentState::Destroyed.is_terminal());
    }

    #[test]
    fn active_components_can_be_demoted() {
        assert!(ComponentState::Active.can_transition_to(ComponentState::WaitingForDependencies));
        assert!(!ComponentState::WaitingForDependencies.can_transition_to(ComponentState::Active));
    }

    #[test]
    fn table_tracks_dependents_and_transitions() {
        let mut table = ComponentTable::new(
            vec![plan("cache", &[]), plan("service", &["cache"])],
            &[],
        );
        assert_eq!(table.dependents(&RecipeId::new("cache")), vec![RecipeId::new("service")]);

        assert_eq!(
            table.transition("cache", ComponentState::WaitingForDependencies),
            Some(ComponentState::Created)
        );
        assert_eq!(table.transition("cache", ComponentState::Active), None);
        assert_eq!(table.get("cache").unwrap().state, ComponentState::WaitingForDependencies);
        assert_eq!(table.snapshot().len(), 2);
    }
}
