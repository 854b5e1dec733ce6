//! Translates container metadata into recipes and validates the result.
//!
//! Validation is all-or-nothing: every problem found is collected into one
//! [DefinitionErrors] report and no recipe graph is produced.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt::Debug,
    sync::Arc,
};

use arbor_registry::{Filter, Instance, COMPONENT_NAME, OBJECT_CLASS};

use crate::{
    class::{ClassRegistry, DynBeanClass},
    config::{substitute, PropertySource},
    errors::{DefinitionError, DefinitionErrors},
    inject::Shape,
    metadata::{
        Activation, Availability, BeanMetadata, ComponentId, ComponentMetadata, ContainerMetadata,
        Damping, ListenerMetadata, PublishMetadata, ReferenceListMetadata, ReferenceMetadata,
        RegistrationListenerMetadata, Scope, ValueMetadata,
    },
    recipe::{
        collection::CollectionShape, reference::ListenerCallbacks, BeanRecipe, CollectionRecipe,
        Dependency, InstanceRecipe, Recipe, RecipeId, RecipeKind, ReferenceListRecipe,
        ReferenceRecipe, ValueRecipe,
    },
    tracker::{BindingId, ReferenceBinding},
};

/// The validated recipes of one container
pub struct RecipeGraph {
    recipes: BTreeMap<RecipeId, Arc<dyn Recipe>>,
    components: Vec<ComponentPlan>,
    bindings: Vec<Arc<ReferenceBinding>>,
}

impl RecipeGraph {
    pub fn recipes(&self) -> &BTreeMap<RecipeId, Arc<dyn Recipe>> {
        &self.recipes
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Recipe>> {
        self.recipes.get(id)
    }

    /// Top level components in declaration order, pass-through instances first
    pub fn components(&self) -> &[ComponentPlan] {
        &self.components
    }

    pub fn bindings(&self) -> &[Arc<ReferenceBinding>] {
        &self.bindings
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BTreeMap<RecipeId, Arc<dyn Recipe>>,
        Vec<ComponentPlan>,
        Vec<Arc<ReferenceBinding>>,
    ) {
        (self.recipes, self.components, self.bindings)
    }
}

/// What the coordinator needs to know about one top level component
#[derive(Debug, Clone)]
pub struct ComponentPlan {
    pub id: RecipeId,
    pub kind: RecipeKind,
    pub scope: Scope,
    pub activation: Activation,
    pub publish: Option<PublishMetadata>,
    /// The component's own recipe followed by its inner recipes
    pub owned: Vec<RecipeId>,
    /// Bindings reachable without passing through a deferred edge
    pub bindings: Vec<BindingId>,
    /// Other components injected directly into this one
    pub depends_on: Vec<RecipeId>,
    pub(crate) registration_listeners: Vec<RegistrationListener>,
}

/// A bean told about the registrations of a published component
#[derive(Clone)]
pub(crate) struct RegistrationListener {
    /// Recipe producing the listener bean
    pub(crate) value: RecipeId,
    pub(crate) callbacks: ListenerCallbacks,
}

impl Debug for RegistrationListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationListener")
            .field("value", &self.value)
            .field("registration", &self.callbacks.bind)
            .field("unregistration", &self.callbacks.unbind)
            .finish()
    }
}

/// Builds a [RecipeGraph] from [ContainerMetadata]
pub struct RecipeGraphBuilder<'a> {
    classes: &'a ClassRegistry,
    properties: Option<&'a dyn PropertySource>,
}

impl<'a> RecipeGraphBuilder<'a> {
    pub fn new(classes: &'a ClassRegistry) -> Self {
        Self {
            classes,
            properties: None,
        }
    }

    /// Substitutes `${...}` placeholders in literals and filters from `properties`
    pub fn with_properties(mut self, properties: &'a dyn PropertySource) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn build(
        &self,
        metadata: &ContainerMetadata,
        instances: &[(ComponentId, Instance)],
    ) -> Result<RecipeGraph, DefinitionErrors> {
        let mut translator = Translator {
            classes: self.classes,
            properties: self.properties,
            declared: BTreeMap::new(),
            recipes: BTreeMap::new(),
            bindings: Vec::new(),
            errors: Vec::new(),
        };

        // Declare every id first, references may point forward
        let mut ids = Vec::new();
        for (id, _) in instances {
            ids.push(translator.declare(id.clone(), Declared::Instance));
        }
        for (index, component) in metadata.components().iter().enumerate() {
            let id = match component.id() {
                Some(id) => id.to_string(),
                None => format!("#component-{index}"),
            };
            let declared = match component {
                ComponentMetadata::Bean(bean) => Declared::Bean {
                    scope: bean.scope.unwrap_or(Scope::Singleton),
                    class: bean.class.clone(),
                },
                ComponentMetadata::Reference(_) => Declared::Reference,
                ComponentMetadata::ReferenceList(_) => Declared::ReferenceList,
            };
            ids.push(translator.declare(id, declared));
        }

        let mut components = Vec::new();
        let mut instance_ids = ids.iter();
        for ((_, instance), id) in instances.iter().zip(instance_ids.by_ref()) {
            translator.insert(InstanceRecipe::new(id.clone(), instance.clone()));
            components.push(PendingPlan {
                owner: Owner::new(id.clone()),
                scope: Scope::Singleton,
                activation: Activation::Eager,
                publish: None,
                registration_listeners: Vec::new(),
            });
        }

        for (component, id) in metadata.components().iter().zip(instance_ids) {
            let mut owner = Owner::new(id.clone());
            let (scope, activation, publish, registration_listeners) = match component {
                ComponentMetadata::Bean(bean) => {
                    translator.bean(id.clone(), &mut owner, bean, Scope::Singleton);
                    let registration_listeners = match &bean.publish {
                        Some(publish) => {
                            translator.registration_listeners(&mut owner, &publish.listeners)
                        }
                        None => Vec::new(),
                    };
                    (
                        bean.scope.unwrap_or(Scope::Singleton),
                        bean.activation,
                        bean.publish.clone(),
                        registration_listeners,
                    )
                }
                ComponentMetadata::Reference(reference) => {
                    translator.reference(id.clone(), &mut owner, reference);
                    (Scope::Singleton, Activation::Eager, None, Vec::new())
                }
                ComponentMetadata::ReferenceList(list) => {
                    translator.reference_list(id.clone(), &mut owner, list);
                    (Scope::Singleton, Activation::Eager, None, Vec::new())
                }
            };
            components.push(PendingPlan {
                owner,
                scope,
                activation,
                publish,
                registration_listeners,
            });
        }

        let Translator {
            recipes,
            bindings,
            mut errors,
            ..
        } = translator;

        check_cycles(&recipes, &mut errors);
        check_deferred_cycles(&recipes, &mut errors);

        if !errors.is_empty() {
            return Err(DefinitionErrors { errors });
        }

        let top_level: HashSet<RecipeId> = components
            .iter()
            .map(|plan| plan.owner.component.clone())
            .collect();
        let components = components
            .into_iter()
            .filter_map(|pending| pending.finish(&recipes, &top_level))
            .collect();

        tracing::debug!(
            "Built recipe graph with {} recipes and {} bindings",
            recipes.len(),
            bindings.len()
        );

        Ok(RecipeGraph {
            recipes,
            components,
            bindings,
        })
    }
}

/// What is known about a component id before any recipe exists
enum Declared {
    Bean { scope: Scope, class: String },
    Reference,
    ReferenceList,
    Instance,
}

/// A component and the inner recipes created for its inline metadata
struct Owner {
    component: RecipeId,
    inner: Vec<RecipeId>,
}

impl Owner {
    fn new(component: RecipeId) -> Self {
        Self {
            component,
            inner: Vec::new(),
        }
    }

    fn next_id(&mut self) -> RecipeId {
        let id = RecipeId::inner(&self.component, self.inner.len());
        self.inner.push(id.clone());
        id
    }

    fn name(&self) -> ComponentId {
        self.component.to_string()
    }
}

struct PendingPlan {
    owner: Owner,
    scope: Scope,
    activation: Activation,
    publish: Option<PublishMetadata>,
    registration_listeners: Vec<RegistrationListener>,
}

impl PendingPlan {
    fn finish(
        self,
        recipes: &BTreeMap<RecipeId, Arc<dyn Recipe>>,
        top_level: &HashSet<RecipeId>,
    ) -> Option<ComponentPlan> {
        let root = self.owner.component;
        let kind = recipes.get(&root)?.kind();

        let mut bindings = Vec::new();
        let mut depends_on = Vec::new();
        let mut seen = HashSet::new();
        // The flag is false once the walk entered another component
        let mut stack = vec![(root.clone(), true)];
        while let Some((id, direct)) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(recipe) = recipes.get(&id) else {
                continue;
            };
            if let Some(binding) = recipe.binding() {
                bindings.push(binding.id());
            }
            for dependency in recipe.dependencies() {
                if dependency.deferred {
                    continue;
                }
                let enters_component = dependency.id != root && top_level.contains(&dependency.id);
                if direct && enters_component && !depends_on.contains(&dependency.id) {
                    depends_on.push(dependency.id.clone());
                }
                stack.push((dependency.id.clone(), direct && !enters_component));
            }
        }
        bindings.sort();

        let mut owned = vec![root.clone()];
        owned.extend(self.owner.inner);

        Some(ComponentPlan {
            id: root,
            kind,
            scope: self.scope,
            activation: self.activation,
            publish: self.publish,
            owned,
            bindings,
            depends_on,
            registration_listeners: self.registration_listeners,
        })
    }
}

struct Translator<'a> {
    classes: &'a ClassRegistry,
    properties: Option<&'a dyn PropertySource>,
    declared: BTreeMap<ComponentId, Declared>,
    recipes: BTreeMap<RecipeId, Arc<dyn Recipe>>,
    bindings: Vec<Arc<ReferenceBinding>>,
    errors: Vec<DefinitionError>,
}

impl Translator<'_> {
    fn declare(&mut self, id: ComponentId, declared: Declared) -> RecipeId {
        if self.declared.contains_key(&id) {
            self.errors.push(DefinitionError::Duplicate(id.clone()));
        } else {
            self.declared.insert(id.clone(), declared);
        }
        RecipeId::new(id)
    }

    fn insert(&mut self, recipe: impl Recipe + 'static) {
        self.recipes.insert(recipe.id().clone(), Arc::new(recipe));
    }

    fn literal(&mut self, component: &Owner, text: &str) -> String {
        let Some(properties) = self.properties else {
            return text.to_string();
        };
        match substitute(text, properties) {
            Ok(text) => text,
            Err(error) => {
                self.errors.push(DefinitionError::Placeholder {
                    component: component.name(),
                    error,
                });
                text.to_string()
            }
        }
    }

    fn shape_of(&self, id: &str) -> Shape {
        match self.declared.get(id) {
            Some(Declared::Bean { .. } | Declared::Instance) => Shape::Object,
            Some(Declared::Reference) => Shape::Reference,
            Some(Declared::ReferenceList) => Shape::ReferenceList,
            None => Shape::Null,
        }
    }

    /// A direct edge to another component
    fn component_ref(&mut self, owner: &Owner, id: &ComponentId) -> Dependency {
        if !self.declared.contains_key(id) {
            self.errors.push(DefinitionError::MissingDependency {
                dependency: id.clone(),
                required_by: owner.name(),
            });
        }
        Dependency::direct(RecipeId::new(id))
    }

    fn value(&mut self, owner: &mut Owner, value: &ValueMetadata) -> (Dependency, Shape) {
        match value {
            ValueMetadata::Null => {
                let id = owner.next_id();
                self.insert(ValueRecipe::new(id.clone(), None));
                (Dependency::direct(id), Shape::Null)
            }
            ValueMetadata::Literal(text) => {
                let text = self.literal(owner, text);
                let id = owner.next_id();
                self.insert(ValueRecipe::new(id.clone(), Some(text)));
                (Dependency::direct(id), Shape::Scalar)
            }
            ValueMetadata::Ref(id) => (self.component_ref(owner, id), self.shape_of(id)),
            ValueMetadata::Deferred(id) => {
                match self.declared.get(id) {
                    Some(Declared::Bean {
                        scope: Scope::Singleton,
                        ..
                    }) => {}
                    Some(_) => self.errors.push(DefinitionError::InvalidDeferred {
                        dependency: id.clone(),
                        required_by: owner.name(),
                    }),
                    None => self.errors.push(DefinitionError::MissingDependency {
                        dependency: id.clone(),
                        required_by: owner.name(),
                    }),
                }
                (Dependency::deferred(RecipeId::new(id)), Shape::Deferred)
            }
            ValueMetadata::Bean(bean) => {
                let id = owner.next_id();
                self.bean(id.clone(), owner, bean, Scope::Prototype);
                (Dependency::direct(id), Shape::Object)
            }
            ValueMetadata::Reference(reference) => {
                let id = owner.next_id();
                self.reference(id.clone(), owner, reference);
                (Dependency::direct(id), Shape::Reference)
            }
            ValueMetadata::ReferenceList(list) => {
                let id = owner.next_id();
                self.reference_list(id.clone(), owner, list);
                (Dependency::direct(id), Shape::ReferenceList)
            }
            ValueMetadata::Collection(kind, items) => {
                let id = owner.next_id();
                let mut dependencies = Vec::with_capacity(items.len());
                for item in items {
                    dependencies.push(self.value(owner, item).0);
                }
                self.insert(CollectionRecipe::new(
                    id.clone(),
                    CollectionShape::Items(*kind),
                    dependencies,
                ));
                (Dependency::direct(id), Shape::Collection)
            }
            ValueMetadata::Map(entries) => {
                let id = owner.next_id();
                let mut dependencies = Vec::with_capacity(entries.len() * 2);
                for (key, value) in entries {
                    dependencies.push(self.value(owner, key).0);
                    dependencies.push(self.value(owner, value).0);
                }
                self.insert(CollectionRecipe::new(
                    id.clone(),
                    CollectionShape::Map,
                    dependencies,
                ));
                (Dependency::direct(id), Shape::Map)
            }
        }
    }

    fn bean(&mut self, id: RecipeId, owner: &mut Owner, bean: &BeanMetadata, default: Scope) {
        let class = self.classes.get(&bean.class).cloned();
        if class.is_none() {
            self.errors.push(DefinitionError::UnknownClass {
                component: owner.name(),
                class: bean.class.clone(),
            });
        }

        let mut dependencies = Vec::new();
        for argument in &bean.arguments {
            dependencies.push(self.value(owner, argument).0);
        }

        let mut properties = Vec::with_capacity(bean.properties.len());
        for property in &bean.properties {
            let (dependency, shape) = self.value(owner, &property.value);
            if let Some(class) = &class {
                match class.property_expect(&property.name) {
                    None => self.errors.push(DefinitionError::UnknownProperty {
                        component: owner.name(),
                        class: bean.class.clone(),
                        property: property.name.clone(),
                    }),
                    Some(expected) if !expected.accepts(shape) => {
                        self.errors.push(DefinitionError::TypeMismatch {
                            component: owner.name(),
                            property: property.name.clone(),
                            expected,
                            found: shape,
                        })
                    }
                    Some(_) => {}
                }
            }
            properties.push(property.name.clone());
            dependencies.push(dependency);
        }

        if let Some(class) = &class {
            for method in [&bean.init_method, &bean.destroy_method].into_iter().flatten() {
                if !class.has_method(method) {
                    self.errors.push(DefinitionError::UnknownMethod {
                        component: owner.name(),
                        class: bean.class.clone(),
                        method: method.clone(),
                    });
                }
            }
        }

        for depends_on in &bean.depends_on {
            dependencies.push(self.component_ref(owner, depends_on));
        }

        let Some(class) = class else {
            return;
        };
        self.insert(BeanRecipe::new(
            id,
            class,
            bean.scope.unwrap_or(default),
            bean.arguments.len(),
            properties,
            bean.init_method.clone(),
            bean.destroy_method.clone(),
            dependencies,
        ));
    }

    fn reference(&mut self, id: RecipeId, owner: &mut Owner, reference: &ReferenceMetadata) {
        let filter = self.filter(
            owner,
            reference.interface.as_deref(),
            reference.filter.as_deref(),
            reference.component_name.as_deref(),
        );

        let mut dependencies = Vec::new();
        let has_default = match (&reference.default_bean, reference.availability) {
            (Some(_), Availability::Mandatory) => {
                self.errors
                    .push(DefinitionError::MandatoryWithoutProvider(owner.name()));
                false
            }
            (Some(default), Availability::Optional) => {
                dependencies.push(self.component_ref(owner, default));
                true
            }
            (None, _) => false,
        };
        let listeners = self.listeners(owner, &reference.listeners, &mut dependencies);
        for depends_on in &reference.depends_on {
            dependencies.push(self.component_ref(owner, depends_on));
        }

        let Some(filter) = filter else {
            return;
        };
        let min_providers = match reference.availability {
            Availability::Mandatory => 1,
            Availability::Optional => 0,
        };
        let binding = self.binding(&id, filter, min_providers, false, reference.damping);
        self.insert(ReferenceRecipe::new(
            id,
            binding,
            reference.availability,
            reference.timeout,
            has_default,
            listeners,
            dependencies,
        ));
    }

    fn reference_list(&mut self, id: RecipeId, owner: &mut Owner, list: &ReferenceListMetadata) {
        let filter = self.filter(
            owner,
            list.interface.as_deref(),
            list.filter.as_deref(),
            list.component_name.as_deref(),
        );

        let min_providers = match list.availability {
            Availability::Mandatory if list.min_providers == 0 => {
                self.errors
                    .push(DefinitionError::MandatoryWithoutProvider(owner.name()));
                0
            }
            Availability::Mandatory => list.min_providers,
            Availability::Optional => 0,
        };

        let mut dependencies = Vec::new();
        let listeners = self.listeners(owner, &list.listeners, &mut dependencies);
        for depends_on in &list.depends_on {
            dependencies.push(self.component_ref(owner, depends_on));
        }

        let Some(filter) = filter else {
            return;
        };
        let binding = self.binding(&id, filter, min_providers, true, Damping::Greedy);
        self.insert(ReferenceListRecipe::new(
            id,
            binding,
            listeners,
            dependencies,
        ));
    }

    fn binding(
        &mut self,
        id: &RecipeId,
        filter: Filter,
        min_providers: usize,
        multiple: bool,
        damping: Damping,
    ) -> Arc<ReferenceBinding> {
        let binding = Arc::new(ReferenceBinding::new(
            BindingId(self.bindings.len()),
            id.clone(),
            filter,
            min_providers,
            multiple,
            damping,
        ));
        self.bindings.push(binding.clone());
        binding
    }

    /// Composes `(&(filter)(objectClass=..)(component.name=..))` from the present parts
    fn filter(
        &mut self,
        owner: &Owner,
        interface: Option<&str>,
        filter: Option<&str>,
        component_name: Option<&str>,
    ) -> Option<Filter> {
        let mut parts = Vec::new();

        if let Some(filter) = filter {
            let filter = self.literal(owner, filter);
            let filter = match filter.trim_start().starts_with('(') {
                true => filter,
                false => format!("({filter})"),
            };
            match Filter::parse(&filter) {
                Ok(filter) => parts.push(filter),
                Err(error) => {
                    self.errors.push(DefinitionError::InvalidFilter {
                        component: owner.name(),
                        error,
                    });
                    return None;
                }
            }
        }
        if let Some(interface) = interface {
            parts.push(Filter::equal(OBJECT_CLASS, interface));
        }
        if let Some(name) = component_name {
            parts.push(Filter::equal(COMPONENT_NAME, name));
        }

        if parts.is_empty() {
            self.errors
                .push(DefinitionError::Unconstrained(owner.name()));
            return None;
        }
        Some(Filter::all(parts))
    }

    /// Listener beans become dependencies of the reference recipe
    fn listeners(
        &mut self,
        owner: &mut Owner,
        listeners: &[ListenerMetadata],
        dependencies: &mut Vec<Dependency>,
    ) -> Vec<ListenerCallbacks> {
        let mut callbacks = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let methods = [&listener.bind_method, &listener.unbind_method];
            let Some((dependency, class)) = self.listener_class(owner, &listener.listener, methods)
            else {
                continue;
            };
            dependencies.push(dependency);
            callbacks.push(ListenerCallbacks {
                class,
                bind: listener.bind_method.clone(),
                unbind: listener.unbind_method.clone(),
            });
        }
        callbacks
    }

    /// Registration listeners are created by the coordinator when the component is published
    fn registration_listeners(
        &mut self,
        owner: &mut Owner,
        listeners: &[RegistrationListenerMetadata],
    ) -> Vec<RegistrationListener> {
        let mut registration_listeners = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let methods = [
                &listener.registration_method,
                &listener.unregistration_method,
            ];
            let Some((dependency, class)) = self.listener_class(owner, &listener.listener, methods)
            else {
                continue;
            };
            registration_listeners.push(RegistrationListener {
                value: dependency.id,
                callbacks: ListenerCallbacks {
                    class,
                    bind: listener.registration_method.clone(),
                    unbind: listener.unregistration_method.clone(),
                },
            });
        }
        registration_listeners
    }

    /// The recipe and class of a listener bean, its callbacks must be listener methods
    fn listener_class(
        &mut self,
        owner: &mut Owner,
        listener: &ValueMetadata,
        methods: [&Option<String>; 2],
    ) -> Option<(Dependency, Arc<dyn DynBeanClass>)> {
        let class_name = match listener {
            ValueMetadata::Ref(id) => match self.declared.get(id) {
                Some(Declared::Bean { class, .. }) => Some(class.clone()),
                Some(_) => {
                    self.errors
                        .push(DefinitionError::InvalidListener(owner.name()));
                    return None;
                }
                None => None,
            },
            ValueMetadata::Bean(bean) => Some(bean.class.clone()),
            _ => {
                self.errors
                    .push(DefinitionError::InvalidListener(owner.name()));
                return None;
            }
        };

        let (dependency, _) = self.value(owner, listener);
        // Unknown classes and ids have been reported already
        let (class_name, class) = class_name
            .and_then(|name| self.classes.get(&name).cloned().map(|class| (name, class)))?;

        for method in methods.into_iter().flatten() {
            if !class.has_listener(method) {
                self.errors.push(DefinitionError::UnknownMethod {
                    component: owner.name(),
                    class: class_name.clone(),
                    method: method.clone(),
                });
            }
        }
        Some((dependency, class))
    }
}

/// Reports every cycle made of direct edges only
fn check_cycles(recipes: &BTreeMap<RecipeId, Arc<dyn Recipe>>, errors: &mut Vec<DefinitionError>) {
    let mut checked = HashSet::new();
    for id in recipes.keys() {
        let mut dependency_chain = Vec::new();
        check_recurse(recipes, &mut checked, errors, &mut dependency_chain, id);
    }

    fn check_recurse(
        recipes: &BTreeMap<RecipeId, Arc<dyn Recipe>>,
        checked: &mut HashSet<RecipeId>,
        errors: &mut Vec<DefinitionError>,
        dependency_chain: &mut Vec<RecipeId>,
        id: &RecipeId,
    ) {
        // Circular Dependency Check
        if let Some(start) = dependency_chain.iter().position(|entry| entry == id) {
            let mut chain: Vec<ComponentId> = dependency_chain[start..]
                .iter()
                .map(RecipeId::to_string)
                .collect();
            let to = chain.last().cloned().unwrap_or_else(|| id.to_string());
            chain.push(id.to_string());

            errors.push(DefinitionError::CircularDependency {
                from: id.to_string(),
                to,
                chain,
            });
            return;
        }

        // Skip other checks if already checked
        if !checked.insert(id.clone()) {
            return;
        }
        let Some(recipe) = recipes.get(id) else {
            return;
        };

        dependency_chain.push(id.clone());
        for dependency in recipe.dependencies() {
            if dependency.deferred {
                // Don't recurse, this edge is broken by a proxy
                continue;
            }
            check_recurse(recipes, checked, errors, dependency_chain, &dependency.id);
        }
        dependency_chain.pop();
    }
}

/// Cycles closed by a deferred edge may only pass through singleton beans
///
/// Values and collections are copied into their holder and do not count.
fn check_deferred_cycles(
    recipes: &BTreeMap<RecipeId, Arc<dyn Recipe>>,
    errors: &mut Vec<DefinitionError>,
) {
    for (holder, recipe) in recipes {
        for dependency in recipe.dependencies().iter().filter(|edge| edge.deferred) {
            let Some(cycle) = find_path(recipes, &dependency.id, holder) else {
                continue;
            };

            let unproxyable = cycle.iter().find(|id| {
                recipes.get(*id).is_some_and(|recipe| match recipe.kind() {
                    RecipeKind::Bean => recipe.scope() == Scope::Prototype,
                    RecipeKind::Reference | RecipeKind::ReferenceList => true,
                    RecipeKind::Value | RecipeKind::Collection | RecipeKind::Instance => false,
                })
            });
            if let Some(component) = unproxyable {
                let error = DefinitionError::UnproxyableCycle {
                    component: component.to_string(),
                    chain: cycle.iter().map(RecipeId::to_string).collect(),
                };
                tracing::trace!("{error}");
                errors.push(error);
            }
        }
    }
}

/// Shortest path from `from` to `to` over all edges, both ends included
fn find_path(
    recipes: &BTreeMap<RecipeId, Arc<dyn Recipe>>,
    from: &RecipeId,
    to: &RecipeId,
) -> Option<Vec<RecipeId>> {
    let mut parents: HashMap<RecipeId, Option<RecipeId>> = HashMap::new();
    let mut queue = VecDeque::new();
    parents.insert(from.clone(), None);
    queue.push_back(from.clone());

    while let Some(id) = queue.pop_front() {
        if id == *to {
            let mut path = vec![id.clone()];
            let mut current = parents.get(&id).cloned().flatten();
            while let Some(parent) = current {
                current = parents.get(&parent).cloned().flatten();
                path.push(parent);
            }
            path.reverse();
            return Some(path);
        }

        let Some(recipe) = recipes.get(&id) else {
            continue;
        };
        for dependency in recipe.dependencies() {
            if !parents.contains_key(&dependency.id) {
                parents.insert(dependency.id.clone(), Some(id.clone()));
                queue.push_back(dependency.id.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{class::BeanClass, inject::Expect};

    #[derive(Default)]
    struct Node {
        _name: String,
    }

    fn classes() -> ClassRegistry {
        let mut classes = ClassRegistry::new();
        classes
            .register(
                BeanClass::<Node>::with_default("Node")
                    .property("name", |node: &mut Node, name: String| node._name = name)
                    .property("peer", |_: &mut Node, _: Arc<Node>| {})
                    .property("lazy_peer", |_: &mut Node, _: crate::Deferred<Node>| {})
                    .listener("bound", |_, _| Ok(()))
                    .method("start", |_| Ok(())),
            )
            .unwrap();
        classes
    }

    fn build(metadata: ContainerMetadata) -> Result<RecipeGraph, DefinitionErrors> {
        RecipeGraphBuilder::new(&classes()).build(&metadata, &[])
    }

    #[test]
    fn translates_inline_metadata_into_inner_recipes() {
        let graph = build(
            ContainerMetadata::new().with(
                BeanMetadata::new("a", "Node")
                    .property("name", "alpha")
                    .property("peer", BeanMetadata::inline("Node")),
            ),
        )
        .unwrap();

        let plan = &graph.components()[0];
        assert_eq!(plan.id.as_str(), "a");
        assert_eq!(plan.owned.len(), 3);
        assert!(plan.owned[1..].iter().all(RecipeId::is_inner));
        assert_eq!(graph.get("a#1").unwrap().scope(), Scope::Prototype);
    }

    #[test]
    fn collects_every_problem() {
        let errors = build(
            ContainerMetadata::new()
                .with(BeanMetadata::new("a", "Node").property("colour", "red"))
                .with(BeanMetadata::new("a", "Missing"))
                .with(BeanMetadata::new("b", "Node").property("peer", ValueMetadata::component("c")))
                .with(BeanMetadata::new("d", "Node").init_method("stop")),
        )
        .err()
        .unwrap()
        .errors;

        assert!(errors.iter().any(|e| matches!(e, DefinitionError::UnknownProperty { property, .. } if property == "colour")));
        assert!(errors.iter().any(|e| matches!(e, DefinitionError::Duplicate(id) if id == "a")));
        assert!(errors.iter().any(|e| matches!(e, DefinitionError::UnknownClass { .. })));
        assert!(errors.iter().any(|e| matches!(e, DefinitionError::MissingDependency { dependency, .. } if dependency == "c")));
        assert!(errors.iter().any(|e| matches!(e, DefinitionError::UnknownMethod { method, .. } if method == "stop")));
    }

    #[test]
    fn rejects_mismatched_values() {
        let errors = build(
            ContainerMetadata::new()
                .with(BeanMetadata::new("a", "Node").property("name", ValueMetadata::list([])))
                .with(BeanMetadata::new("b", "Node").property("peer", ValueMetadata::deferred("a"))),
        )
        .err()
        .unwrap()
        .errors;

        assert!(errors.iter().any(|e| matches!(
            e,
            DefinitionError::TypeMismatch { expected: Expect::Scalar, found: Shape::Collection, .. }
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            DefinitionError::TypeMismatch { expected: Expect::Object, found: Shape::Deferred, .. }
        )));
    }

    #[test]
    fn direct_cycles_are_rejected() {
        let errors = build(
            ContainerMetadata::new()
                .with(BeanMetadata::new("a", "Node").property("peer", ValueMetadata::component("b")))
                .with(BeanMetadata::new("b", "Node").property("peer", ValueMetadata::component("a"))),
        )
        .err()
        .unwrap()
        .errors;
        assert!(matches!(
            &errors[..],
            [DefinitionError::CircularDependency { chain, .. }] if chain.len() == 3
        ));
    }

    #[test]
    fn deferred_edges_break_cycles_between_singletons() {
        let graph = build(
            ContainerMetadata::new()
                .with(BeanMetadata::new("a", "Node").property("peer", ValueMetadata::component("b")))
                .with(
                    BeanMetadata::new("b", "Node")
                        .property("lazy_peer", ValueMetadata::deferred("a")),
                ),
        );
        assert!(graph.is_ok());
    }

    #[test]
    fn deferred_cycles_through_prototypes_are_rejected() {
        let errors = build(
            ContainerMetadata::new()
                .with(
                    BeanMetadata::new("a", "Node")
                        .prototype()
                        .property("peer", ValueMetadata::component("b")),
                )
                .with(
                    BeanMetadata::new("b", "Node")
                        .property("lazy_peer", ValueMetadata::deferred("c")),
                )
                .with(BeanMetadata::new("c", "Node").property("peer", ValueMetadata::component("a"))),
        )
        .err()
        .unwrap()
        .errors;
        assert!(errors.iter().any(|e| matches!(
            e,
            DefinitionError::UnproxyableCycle { component, .. } if component == "a"
        )));
    }

    #[test]
    fn deferred_edges_must_target_singleton_beans() {
        let errors = build(
            ContainerMetadata::new()
                .with(ReferenceMetadata::new("x", "X"))
                .with(BeanMetadata::new("a", "Node").property("lazy_peer", ValueMetadata::deferred("x"))),
        )
        .err()
        .unwrap()
        .errors;
        assert!(matches!(&errors[..], [DefinitionError::InvalidDeferred { .. }]));
    }

    #[test]
    fn composes_reference_filters() {
        let graph = build(
            ContainerMetadata::new()
                .with(
                    ReferenceMetadata::new("x", "Greeter")
                        .filter("lang=en")
                        .component_name("english"),
                )
                .with(ReferenceListMetadata::new("all", "Greeter")),
        )
        .unwrap();

        assert_eq!(
            graph.bindings()[0].filter().to_string(),
            "(&(lang=en)(objectClass=Greeter)(component.name=english))"
        );
        assert_eq!(
            graph.bindings()[1].filter().to_string(),
            "(objectClass=Greeter)"
        );
    }

    #[test]
    fn validates_references() {
        let mut unconstrained = ReferenceMetadata::new("y", "Y");
        unconstrained.interface = None;

        let errors = build(
            ContainerMetadata::new()
                .with(ReferenceMetadata::new("x", "X").filter("(broken"))
                .with(unconstrained)
                .with(BeanMetadata::new("fallback", "Node"))
                .with(ReferenceMetadata::new("z", "Z").default_bean("fallback"))
                .with(ReferenceListMetadata::new("list", "X").min_providers(0))
                .with(
                    ReferenceMetadata::new("w", "W")
                        .listener(ListenerMetadata::new(ValueMetadata::component("fallback")).bind("missing")),
                ),
        )
        .err()
        .unwrap()
        .errors;

        assert!(errors.iter().any(|e| matches!(e, DefinitionError::InvalidFilter { component, .. } if component == "x")));
        assert!(errors.iter().any(|e| matches!(e, DefinitionError::Unconstrained(id) if id == "y")));
        assert!(errors.iter().any(|e| matches!(e, DefinitionError::MandatoryWithoutProvider(id) if id == "z")));
        assert!(errors.iter().any(|e| matches!(e, DefinitionError::MandatoryWithoutProvider(id) if id == "list")));
        assert!(errors.iter().any(|e| matches!(e, DefinitionError::UnknownMethod { method, .. } if method == "missing")));
    }

    #[test]
    fn plans_registration_listeners_of_published_beans() {
        let graph = build(
            ContainerMetadata::new()
                .with(BeanMetadata::new("audit", "Node"))
                .with(
                    BeanMetadata::new("a", "Node").publish(
                        PublishMetadata::new("Node")
                            .listener(
                                RegistrationListenerMetadata::new(ValueMetadata::component("audit"))
                                    .registration("bound"),
                            )
                            .listener(RegistrationListenerMetadata::new(BeanMetadata::inline("Node"))),
                    ),
                ),
        )
        .unwrap();

        let plan = graph.components().iter().find(|plan| plan.id.as_str() == "a").unwrap();
        assert_eq!(plan.registration_listeners.len(), 2);
        assert_eq!(plan.registration_listeners[0].value.as_str(), "audit");
        assert_eq!(plan.registration_listeners[0].callbacks.bind.as_deref(), Some("bound"));
        // Inline listeners belong to the published component
        assert!(plan.owned.contains(&plan.registration_listeners[1].value));
    }

    #[test]
    fn validates_registration_listeners() {
        let errors = build(
            ContainerMetadata::new()
                .with(BeanMetadata::new("audit", "Node"))
                .with(ReferenceMetadata::new("x", "X"))
                .with(
                    BeanMetadata::new("a", "Node").publish(
                        PublishMetadata::new("Node").listener(
                            RegistrationListenerMetadata::new(ValueMetadata::component("audit"))
                                .unregistration("start"),
                        ),
                    ),
                )
                .with(
                    BeanMetadata::new("b", "Node").publish(
                        PublishMetadata::new("Node")
                            .listener(RegistrationListenerMetadata::new(ValueMetadata::component("x"))),
                    ),
                ),
        )
        .err()
        .unwrap()
        .errors;

        assert!(errors.iter().any(|e| matches!(e, DefinitionError::UnknownMethod { component, method, .. } if component == "a" && method == "start")));
        assert!(errors.iter().any(|e| matches!(e, DefinitionError::InvalidListener(id) if id == "b")));
    }

    #[test]
    fn substitutes_placeholders() {
        let properties = HashMap::from([("lang".to_string(), "de".to_string())]);
        let classes = classes();
        let graph = RecipeGraphBuilder::new(&classes)
            .with_properties(&properties)
            .build(
                &ContainerMetadata::new()
                    .with(ReferenceMetadata::new("x", "Greeter").filter("(lang=${lang})")),
                &[],
            )
            .unwrap();
        assert_eq!(
            graph.bindings()[0].filter().to_string(),
            "(&(lang=de)(objectClass=Greeter))"
        );

        let errors = RecipeGraphBuilder::new(&classes)
            .with_properties(&properties)
            .build(
                &ContainerMetadata::new().with(BeanMetadata::new("a", "Node").property("name", "${user}")),
                &[],
            )
            .err()
            .unwrap()
            .errors;
        assert!(matches!(&errors[..], [DefinitionError::Placeholder { .. }]));
    }

    #[test]
    fn plans_track_bindings_and_direct_dependencies() {
        let graph = build(
            ContainerMetadata::new()
                .with(ReferenceMetadata::new("x", "X"))
                .with(BeanMetadata::new("cache", "Node"))
                .with(
                    BeanMetadata::new("service", "Node")
                        .property("peer", ValueMetadata::component("cache"))
                        .property("name", "service")
                        .depends_on("x"),
                ),
        )
        .unwrap();

        let service = &graph.components()[2];
        assert_eq!(service.id.as_str(), "service");
        assert_eq!(service.bindings, vec![BindingId(0)]);
        assert_eq!(
            service.depends_on,
            vec![RecipeId::new("cache"), RecipeId::new("x")]
        );
        assert!(graph.components()[1].bindings.is_empty());
    }

    #[test]
    fn pass_through_instances_are_components() {
        let graph = RecipeGraphBuilder::new(&classes())
            .build(
                &ContainerMetadata::new(),
                &[("config".to_string(), Instance::new(5_u32))],
            )
            .unwrap();
        assert_eq!(graph.components()[0].kind, RecipeKind::Instance);

        let duplicate = RecipeGraphBuilder::new(&classes()).build(
            &ContainerMetadata::new().with(BeanMetadata::new("config", "Node")),
            &[("config".to_string(), Instance::new(5_u32))],
        );
        assert!(duplicate.is_err());
    }
}
