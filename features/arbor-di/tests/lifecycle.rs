mod common;

use std::{sync::Arc, thread, time::Duration};

use arbor_di::{
    BeanClass, BeanMetadata, ComponentState, Container, ContainerBuilder, ContainerConfig,
    ContainerError, ContainerEvent, ContainerState, PublishMetadata, ReferenceMetadata,
    RegistrationListenerMetadata, ServiceRef, ValueMetadata,
};
use arbor_registry::{Attributes, InMemoryRegistry, ServiceRegistry, COMPONENT_NAME};
use common::{eventually, init_tracing, providers, Counter, SETTLE};
use futures::StreamExt;
use parking_lot::Mutex;

struct Greeter;

struct Consumer {
    greeter: ServiceRef<Greeter>,
}

#[derive(Clone, Default)]
struct Counters {
    created: Counter,
    destroyed: Counter,
}

fn consumer_class(counters: &Counters) -> BeanClass<Consumer> {
    let created = counters.created.clone();
    let destroyed = counters.destroyed.clone();
    BeanClass::new("Consumer", move |arguments| {
        created.hit();
        Ok(Consumer {
            greeter: arguments.take()?,
        })
    })
    .method("close", move |_| {
        destroyed.hit();
        Ok(())
    })
}

fn consumer_container(
    registry: &Arc<InMemoryRegistry>,
    counters: &Counters,
    grace_period: Duration,
) -> Container {
    ContainerBuilder::new("consumers")
        .with_config(ContainerConfig::new("consumers").with_grace_period(grace_period))
        .with_registry(registry.clone())
        .add_class(consumer_class(counters))
        .add_component(
            BeanMetadata::new("consumer", "Consumer")
                .argument(ReferenceMetadata::inline("Greeter"))
                .destroy_method("close")
                .publish(PublishMetadata::new("Consumer").ranking(3)),
        )
        .start()
        .unwrap()
}

#[test]
fn waits_for_mandatory_references_then_activates() {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let counters = Counters::default();
    let container = consumer_container(&registry, &counters, Duration::from_secs(30));

    assert_eq!(
        container.wait_until_settled(Duration::from_millis(200)),
        ContainerState::GracePeriod
    );
    assert_eq!(
        container.component_state("consumer"),
        Some(ComponentState::WaitingForDependencies)
    );
    assert_eq!(counters.created.get(), 0);

    let missing = container.missing_dependencies();
    assert_eq!(missing.len(), 1);
    assert!(missing[0].missing[0].contains("objectClass=Greeter"));
    assert!(matches!(
        container.get_component_instance("consumer"),
        Err(ContainerError::NotYetAvailable { .. })
    ));

    registry
        .register_as("Greeter", Greeter, Attributes::new())
        .unwrap();

    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    assert_eq!(
        container.component_state("consumer"),
        Some(ComponentState::Active)
    );
    assert_eq!(counters.created.get(), 1);

    let published = providers(registry.as_ref(), "(objectClass=Consumer)");
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].ranking(), 3);
    assert_eq!(
        published[0].attributes().get_str(COMPONENT_NAME),
        Some("consumer")
    );

    let consumer = container.get::<Arc<Consumer>>("consumer").unwrap();
    assert!(consumer.greeter.is_available());

    container.stop();
    assert!(providers(registry.as_ref(), "(objectClass=Consumer)").is_empty());
    assert_eq!(counters.destroyed.get(), 1);
}

#[test]
fn demotes_when_the_provider_leaves_and_recovers() {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let greeter = registry
        .register_as("Greeter", Greeter, Attributes::new())
        .unwrap();
    let counters = Counters::default();
    let container = consumer_container(&registry, &counters, Duration::from_secs(30));
    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);

    let first = container.get::<Arc<Consumer>>("consumer").unwrap();

    registry.unregister(greeter).unwrap();
    assert!(eventually(|| container.component_state("consumer")
        == Some(ComponentState::WaitingForDependencies)));
    assert_eq!(counters.destroyed.get(), 1);
    assert!(providers(registry.as_ref(), "(objectClass=Consumer)").is_empty());
    assert!(!first.greeter.is_available());
    // Start has finished, the container stays active
    assert_eq!(container.state(), ContainerState::Active);

    registry
        .register_as("Greeter", Greeter, Attributes::new())
        .unwrap();
    assert!(eventually(
        || container.component_state("consumer") == Some(ComponentState::Active)
    ));

    let second = container.get::<Arc<Consumer>>("consumer").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(counters.created.get(), 2);
    assert_eq!(providers(registry.as_ref(), "(objectClass=Consumer)").len(), 1);
}

#[test]
fn expired_grace_period_fails_the_container() {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let counters = Counters::default();
    let container = consumer_container(&registry, &counters, Duration::from_millis(100));

    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Failed);
    assert_eq!(
        container.component_state("consumer"),
        Some(ComponentState::Failed)
    );

    let failures = container.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].component, "consumer");
    assert!(matches!(
        failures[0].error,
        ContainerError::ReferenceTimeout { ref missing, .. } if missing.len() == 1
    ));
    assert!(matches!(
        container.get_component_instance("consumer"),
        Err(ContainerError::ReferenceTimeout { .. })
    ));

    // Failed is final
    registry
        .register_as("Greeter", Greeter, Attributes::new())
        .unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(
        container.component_state("consumer"),
        Some(ComponentState::Failed)
    );
    assert_eq!(counters.created.get(), 0);
}

#[test]
fn failures_cascade_to_dependents() {
    init_tracing();
    let container = ContainerBuilder::new("cascade")
        .add_class(BeanClass::<Greeter>::new("Broken", |_| {
            Err("no greeting today".into())
        }))
        .add_class(BeanClass::new("Wrapper", |arguments| {
            let _inner: Arc<Greeter> = arguments.take()?;
            Ok(Greeter)
        }))
        .add_class(BeanClass::<Greeter>::new("Standalone", |_| Ok(Greeter)))
        .add_component(BeanMetadata::new("broken", "Broken"))
        .add_component(BeanMetadata::new("wrapper", "Wrapper").argument(
            arbor_di::ValueMetadata::component("broken"),
        ))
        .add_component(BeanMetadata::new("standalone", "Standalone"))
        .start()
        .unwrap();

    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Failed);
    assert_eq!(
        container.component_state("broken"),
        Some(ComponentState::Failed)
    );
    assert_eq!(
        container.component_state("wrapper"),
        Some(ComponentState::Failed)
    );
    assert_eq!(
        container.component_state("standalone"),
        Some(ComponentState::Active)
    );
    assert_eq!(container.failures().len(), 2);
}

#[test]
fn lazy_singletons_are_created_on_first_request() {
    init_tracing();
    let created = Counter::default();
    let counter = created.clone();
    let container = ContainerBuilder::new("lazy")
        .add_class(BeanClass::<Greeter>::new("Greeter", move |_| {
            counter.hit();
            Ok(Greeter)
        }))
        .add_component(BeanMetadata::new("greeter", "Greeter").lazy())
        .start()
        .unwrap();

    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    assert_eq!(
        container.component_state("greeter"),
        Some(ComponentState::Satisfied)
    );
    assert_eq!(created.get(), 0);

    let first = container.get::<Arc<Greeter>>("greeter").unwrap();
    let second = container.get::<Arc<Greeter>>("greeter").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(created.get(), 1);
    assert_eq!(
        container.component_state("greeter"),
        Some(ComponentState::Active)
    );
}

#[test]
fn prototypes_are_created_per_request() {
    init_tracing();
    let container = ContainerBuilder::new("prototypes")
        .add_class(BeanClass::<Greeter>::new("Greeter", |_| Ok(Greeter)))
        .add_component(BeanMetadata::new("greeter", "Greeter").prototype())
        .start()
        .unwrap();

    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    let first = container.get::<Arc<Greeter>>("greeter").unwrap();
    let second = container.get::<Arc<Greeter>>("greeter").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn stop_destroys_in_reverse_order_and_reports_failures() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (first_log, second_log) = (log.clone(), log.clone());

    let container = ContainerBuilder::new("shutdown")
        .add_class(
            BeanClass::<Greeter>::new("Base", |_| Ok(Greeter)).method("close", move |_| {
                first_log.lock().push("base");
                Ok(())
            }),
        )
        .add_class(
            BeanClass::new("Top", |arguments| {
                let _base: Arc<Greeter> = arguments.take()?;
                Ok(Consumerless)
            })
            .method("close", move |_| {
                second_log.lock().push("top");
                Err("refusing to close".into())
            }),
        )
        .add_component(BeanMetadata::new("base", "Base").destroy_method("close"))
        .add_component(
            BeanMetadata::new("top", "Top")
                .argument(arbor_di::ValueMetadata::component("base"))
                .destroy_method("close"),
        )
        .start()
        .unwrap();
    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);

    let report = container.stop();
    assert_eq!(*log.lock(), vec!["top", "base"]);
    assert_eq!(report.destroy_failures.len(), 1);
    assert_eq!(report.destroy_failures[0].recipe.as_str(), "top");

    assert_eq!(container.state(), ContainerState::Stopped);
    assert_eq!(
        container.component_state("top"),
        Some(ComponentState::Destroyed)
    );
    assert!(matches!(
        container.get_component_instance("base"),
        Err(ContainerError::Stopped)
    ));
    // A second stop has nothing left to do
    assert!(container.stop().destroy_failures.is_empty());
}

struct Consumerless;

#[test]
fn events_follow_the_container_lifecycle() {
    init_tracing();
    let container = ContainerBuilder::new("events")
        .add_class(BeanClass::<Greeter>::new("Greeter", |_| Ok(Greeter)))
        .add_component(BeanMetadata::new("greeter", "Greeter"))
        .start()
        .unwrap();
    let events = container.subscribe();
    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    container.stop();

    let events: Vec<ContainerEvent> = futures::executor::block_on(events.collect());
    assert!(events
        .iter()
        .any(|event| matches!(event, ContainerEvent::Created)));
    assert!(events.iter().any(|event| matches!(
        event,
        ContainerEvent::ComponentStateChanged { component, to: ComponentState::Destroyed, .. }
            if component == "greeter"
    )));
    assert!(events
        .iter()
        .any(|event| matches!(event, ContainerEvent::Destroying)));
    assert!(matches!(events.last(), Some(ContainerEvent::Destroyed)));
}

struct Cache;

struct Service {
    cache: Arc<Cache>,
    _external: ServiceRef<Greeter>,
}

#[test]
fn demotion_leaves_direct_dependencies_alone() {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let container = ContainerBuilder::new("example")
        .with_registry(registry.clone())
        .add_class(BeanClass::<Cache>::new("Cache", |_| Ok(Cache)))
        .add_class(BeanClass::new("Service", |arguments| {
            Ok(Service {
                cache: arguments.take()?,
                _external: arguments.take()?,
            })
        }))
        .add_component(BeanMetadata::new("cache", "Cache"))
        .add_component(
            BeanMetadata::new("service", "Service")
                .argument(arbor_di::ValueMetadata::component("cache"))
                .argument(ReferenceMetadata::inline("Greeter")),
        )
        .start()
        .unwrap();

    assert!(eventually(
        || container.component_state("cache") == Some(ComponentState::Active)
    ));
    assert_eq!(
        container.component_state("service"),
        Some(ComponentState::WaitingForDependencies)
    );
    let cache = container.get::<Arc<Cache>>("cache").unwrap();

    let external = registry
        .register_as("Greeter", Greeter, Attributes::new())
        .unwrap();
    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    let service = container.get::<Arc<Service>>("service").unwrap();
    assert!(Arc::ptr_eq(&service.cache, &cache));

    registry.unregister(external).unwrap();
    assert!(eventually(|| container.component_state("service")
        == Some(ComponentState::WaitingForDependencies)));
    assert_eq!(
        container.component_state("cache"),
        Some(ComponentState::Active)
    );
    assert!(Arc::ptr_eq(
        &container.get::<Arc<Cache>>("cache").unwrap(),
        &cache
    ));
}

#[test]
fn failures_behind_references_are_absorbed() {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let provider = ContainerBuilder::new("provider")
        .with_registry(registry.clone())
        .add_class(BeanClass::<Greeter>::new("Broken", |_| {
            Err("no greeting today".into())
        }))
        .add_component(BeanMetadata::new("greeter", "Broken").publish(PublishMetadata::new("Greeter")))
        .start()
        .unwrap();
    assert_eq!(provider.wait_until_settled(SETTLE), ContainerState::Failed);

    let counters = Counters::default();
    let consumers = consumer_container(&registry, &counters, Duration::from_secs(30));
    assert_eq!(
        consumers.wait_until_settled(Duration::from_millis(200)),
        ContainerState::GracePeriod
    );
    // Waiting, not failed
    assert_eq!(
        consumers.component_state("consumer"),
        Some(ComponentState::WaitingForDependencies)
    );
    assert!(consumers.failures().is_empty());
}

#[test]
fn prototypes_activate_the_lazy_singletons_they_create() {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let container = ContainerBuilder::new("prototype-deps")
        .with_registry(registry.clone())
        .add_class(BeanClass::<Greeter>::new("Greeter", |_| Ok(Greeter)))
        .add_class(BeanClass::new("Session", |arguments| {
            let _greeter: Arc<Greeter> = arguments.take()?;
            Ok(Consumerless)
        }))
        .add_component(
            BeanMetadata::new("greeter", "Greeter")
                .lazy()
                .publish(PublishMetadata::new("Greeter")),
        )
        .add_component(
            BeanMetadata::new("session", "Session")
                .prototype()
                .argument(ValueMetadata::component("greeter")),
        )
        .start()
        .unwrap();
    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    assert_eq!(
        container.component_state("greeter"),
        Some(ComponentState::Satisfied)
    );
    assert!(providers(registry.as_ref(), "(objectClass=Greeter)").is_empty());

    container.get::<Arc<Consumerless>>("session").unwrap();
    assert!(eventually(
        || container.component_state("greeter") == Some(ComponentState::Active)
    ));
    assert_eq!(providers(registry.as_ref(), "(objectClass=Greeter)").len(), 1);

    // The second session shares the now active singleton
    container.get::<Arc<Consumerless>>("session").unwrap();
    assert_eq!(providers(registry.as_ref(), "(objectClass=Greeter)").len(), 1);
}

#[test]
fn stop_destroys_failed_components() {
    init_tracing();
    let container = ContainerBuilder::new("failed-stop")
        .add_class(BeanClass::<Greeter>::new("Broken", |_| {
            Err("no greeting today".into())
        }))
        .add_class(BeanClass::<Greeter>::new("Greeter", |_| Ok(Greeter)))
        .add_component(BeanMetadata::new("broken", "Broken"))
        .add_component(BeanMetadata::new("greeter", "Greeter"))
        .start()
        .unwrap();
    let events = container.subscribe();
    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Failed);
    assert_eq!(
        container.component_state("broken"),
        Some(ComponentState::Failed)
    );

    container.stop();
    assert_eq!(container.state(), ContainerState::Stopped);
    for id in ["broken", "greeter"] {
        assert_eq!(
            container.component_state(id),
            Some(ComponentState::Destroyed)
        );
    }
    // The cause stays visible after stop
    assert_eq!(container.failures().len(), 1);
    assert_eq!(container.failures()[0].component, "broken");

    let events: Vec<ContainerEvent> = futures::executor::block_on(events.collect());
    assert!(events.iter().any(|event| matches!(
        event,
        ContainerEvent::ComponentStateChanged {
            component,
            from: ComponentState::Failed,
            to: ComponentState::Deactivating,
        } if component == "broken"
    )));
}

/// Records the registrations it is told about
struct Audit;

fn audit_class(log: &Arc<Mutex<Vec<String>>>) -> BeanClass<Audit> {
    let (registered, unregistered) = (log.clone(), log.clone());
    BeanClass::<Audit>::new("Audit", |_| Ok(Audit))
        .listener("registered", move |_, service| {
            registered.lock().push(format!("register {}", service.id().0));
            Ok(())
        })
        .listener("unregistered", move |_, service| {
            unregistered
                .lock()
                .push(format!("unregister {}", service.id().0));
            Ok(())
        })
}

#[test]
fn registration_listeners_follow_the_publication() {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = ContainerBuilder::new("audited")
        .with_registry(registry.clone())
        .add_class(audit_class(&log))
        .add_class(BeanClass::<Greeter>::new("Greeter", |_| Ok(Greeter)))
        .add_component(BeanMetadata::new("audit", "Audit").lazy())
        .add_component(
            BeanMetadata::new("greeter", "Greeter").publish(
                PublishMetadata::new("Greeter").listener(
                    RegistrationListenerMetadata::new(ValueMetadata::component("audit"))
                        .registration("registered")
                        .unregistration("unregistered"),
                ),
            ),
        )
        .start()
        .unwrap();
    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);

    let published = providers(registry.as_ref(), "(objectClass=Greeter)");
    assert_eq!(published.len(), 1);
    let service = published[0].id().0;
    assert_eq!(*log.lock(), vec![format!("register {service}")]);
    // Creating the listener activated it
    assert!(eventually(
        || container.component_state("audit") == Some(ComponentState::Active)
    ));

    container.stop();
    assert_eq!(
        *log.lock(),
        vec![format!("register {service}"), format!("unregister {service}")]
    );
    assert!(providers(registry.as_ref(), "(objectClass=Greeter)").is_empty());
}

#[test]
fn registration_listeners_see_demotion() {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let counters = Counters::default();
    let greeter = registry
        .register_as("Greeter", Greeter, Attributes::new())
        .unwrap();
    let container = ContainerBuilder::new("audited-consumer")
        .with_registry(registry.clone())
        .add_class(audit_class(&log))
        .add_class(consumer_class(&counters))
        .add_component(
            BeanMetadata::new("consumer", "Consumer")
                .argument(ReferenceMetadata::inline("Greeter"))
                .publish(
                    PublishMetadata::new("Consumer").listener(
                        RegistrationListenerMetadata::new(BeanMetadata::inline("Audit"))
                            .registration("registered")
                            .unregistration("unregistered"),
                    ),
                ),
        )
        .start()
        .unwrap();
    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    let first = providers(registry.as_ref(), "(objectClass=Consumer)")[0].id().0;

    registry.unregister(greeter).unwrap();
    assert!(eventually(|| container.component_state("consumer")
        == Some(ComponentState::WaitingForDependencies)));
    assert_eq!(
        *log.lock(),
        vec![format!("register {first}"), format!("unregister {first}")]
    );

    registry
        .register_as("Greeter", Greeter, Attributes::new())
        .unwrap();
    assert!(eventually(
        || container.component_state("consumer") == Some(ComponentState::Active)
    ));
    let second = providers(registry.as_ref(), "(objectClass=Consumer)")[0].id().0;
    assert_ne!(first, second);
    assert_eq!(log.lock().len(), 3);
    assert_eq!(log.lock()[2], format!("register {second}"));
}
