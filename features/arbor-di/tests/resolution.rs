mod common;

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use arbor_di::{
    BeanClass, BeanMetadata, ContainerBuilder, ContainerError, ContainerState, Deferred,
    DefinitionError, ValueMetadata,
};
use common::{init_tracing, SETTLE};

#[derive(Default)]
struct Server {
    host: String,
    port: u16,
    tags: Vec<String>,
    limits: BTreeMap<String, u32>,
    started: AtomicBool,
}

fn server_class() -> BeanClass<Server> {
    BeanClass::new("Server", |arguments| {
        Ok(Server {
            host: arguments.take()?,
            ..Default::default()
        })
    })
    .property("port", |server: &mut Server, port: u16| server.port = port)
    .property("tags", |server: &mut Server, tags: Vec<String>| server.tags = tags)
    .property("limits", |server: &mut Server, limits: BTreeMap<String, u32>| {
        server.limits = limits
    })
    .method("start", |server| {
        server.started.store(true, Ordering::SeqCst);
        Ok(())
    })
}

#[test]
fn wires_arguments_properties_and_collections() {
    init_tracing();
    let properties: HashMap<String, String> =
        HashMap::from([("server.port".to_string(), "8080".to_string())]);

    let container = ContainerBuilder::new("wiring")
        .with_properties(Arc::new(properties))
        .add_class(server_class())
        .add_component(
            BeanMetadata::new("server", "Server")
                .argument("${server.host:localhost}")
                .property("port", "${server.port}")
                .property(
                    "tags",
                    ValueMetadata::list([ValueMetadata::literal("a"), ValueMetadata::literal("b")]),
                )
                .property(
                    "limits",
                    ValueMetadata::map([(
                        ValueMetadata::literal("connections"),
                        ValueMetadata::literal("64"),
                    )]),
                )
                .init_method("start"),
        )
        .start()
        .unwrap();

    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    let server = container.get::<Arc<Server>>("server").unwrap();
    assert_eq!(server.host, "localhost");
    assert_eq!(server.port, 8080);
    assert_eq!(server.tags, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(server.limits.get("connections"), Some(&64));
    assert!(server.started.load(Ordering::SeqCst));
}

struct Node {
    peer: Option<Deferred<Node>>,
    upstream: Option<Arc<Node>>,
}

fn node_class() -> BeanClass<Node> {
    BeanClass::new("Node", |arguments| {
        Ok(Node {
            peer: None,
            upstream: arguments.take_optional()?,
        })
    })
    .property("peer", |node: &mut Node, peer: Deferred<Node>| {
        node.peer = Some(peer)
    })
}

#[test]
fn deferred_edges_break_cycles_between_singletons() {
    init_tracing();
    let container = ContainerBuilder::new("cycle")
        .add_class(node_class())
        .add_component(BeanMetadata::new("a", "Node").property("peer", ValueMetadata::deferred("b")))
        .add_component(BeanMetadata::new("b", "Node").argument(ValueMetadata::component("a")))
        .start()
        .unwrap();

    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    let a = container.get::<Arc<Node>>("a").unwrap();
    let b = container.get::<Arc<Node>>("b").unwrap();

    let peer = a.peer.as_ref().unwrap();
    assert!(peer.is_ready());
    assert!(Arc::ptr_eq(&peer.get().unwrap(), &b));
    assert!(Arc::ptr_eq(b.upstream.as_ref().unwrap(), &a));
}

#[test]
fn direct_cycles_are_rejected_on_start() {
    init_tracing();
    let result = ContainerBuilder::new("cycle")
        .add_class(node_class())
        .add_component(BeanMetadata::new("a", "Node").argument(ValueMetadata::component("b")))
        .add_component(BeanMetadata::new("b", "Node").argument(ValueMetadata::component("a")))
        .start();

    let Err(ContainerError::Definition(definition)) = result else {
        panic!("the cycle should be rejected");
    };
    assert!(definition
        .errors
        .iter()
        .any(|error| matches!(error, DefinitionError::CircularDependency { .. })));
}

#[test]
fn reports_every_definition_problem() {
    init_tracing();
    let result = ContainerBuilder::new("broken")
        .add_class(server_class())
        .add_class(server_class())
        .add_component(BeanMetadata::new("ghost", "Missing"))
        .add_component(
            BeanMetadata::new("needy", "Server").argument(ValueMetadata::component("nowhere")),
        )
        .start();

    let Err(ContainerError::Definition(definition)) = result else {
        panic!("start should fail");
    };
    assert_eq!(definition.errors.len(), 3);
    assert!(matches!(
        definition.errors[0],
        DefinitionError::DuplicateClass(ref class) if class == "Server"
    ));
    assert!(definition.errors.iter().any(|error| matches!(
        error,
        DefinitionError::UnknownClass { class, .. } if class == "Missing"
    )));
    assert!(definition.errors.iter().any(|error| matches!(
        error,
        DefinitionError::MissingDependency { dependency, .. } if dependency == "nowhere"
    )));
}

#[test]
fn mismatched_property_values_are_rejected() {
    init_tracing();
    let result = ContainerBuilder::new("mismatch")
        .add_class(server_class())
        .add_component(
            BeanMetadata::new("server", "Server")
                .argument("localhost")
                .property("tags", "not a list"),
        )
        .start();

    let Err(ContainerError::Definition(definition)) = result else {
        panic!("start should fail");
    };
    assert!(matches!(
        definition.errors[..],
        [DefinitionError::TypeMismatch { ref property, .. }] if property == "tags"
    ));
}

struct Settings {
    name: &'static str,
}

struct Service {
    settings: Arc<Settings>,
}

#[test]
fn existing_instances_are_components() {
    init_tracing();
    let container = ContainerBuilder::new("instances")
        .add_instance("settings", Settings { name: "production" })
        .add_class(BeanClass::new("Service", |arguments| {
            Ok(Service {
                settings: arguments.take()?,
            })
        }))
        .add_component(
            BeanMetadata::new("service", "Service").argument(ValueMetadata::component("settings")),
        )
        .start()
        .unwrap();

    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    let settings = container.get::<Arc<Settings>>("settings").unwrap();
    let service = container.get::<Arc<Service>>("service").unwrap();
    assert_eq!(service.settings.name, "production");
    assert!(Arc::ptr_eq(&service.settings, &settings));
}

#[test]
fn inner_beans_are_private_to_their_owner() {
    init_tracing();
    let container = ContainerBuilder::new("inner")
        .add_class(node_class())
        .add_component(
            BeanMetadata::new("outer", "Node").argument(BeanMetadata::inline("Node")),
        )
        .start()
        .unwrap();

    assert_eq!(container.wait_until_settled(SETTLE), ContainerState::Active);
    let outer = container.get::<Arc<Node>>("outer").unwrap();
    assert!(outer.upstream.is_some());
    assert!(matches!(
        container.get_component_instance("outer#0"),
        Err(ContainerError::NoSuchComponent(_))
    ));
    assert_eq!(container.components().len(), 1);
}
