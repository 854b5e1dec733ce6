use std::{collections::HashMap, sync::Arc, time::Duration};

use arbor_di::{
    BeanClass, BeanMetadata, ContainerBuilder, ContainerConfig, ListenerMetadata,
    PublishMetadata, ReferenceMetadata, ServiceRef, ValueMetadata,
};
use arbor_registry::{InMemoryRegistry, ServiceRegistry};
use parking_lot::Mutex;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let registry: Arc<dyn ServiceRegistry> = Arc::new(InMemoryRegistry::new());

    // The frontend starts first and waits for a cache to show up
    let frontend = ContainerBuilder::new("frontend")
        .with_config(ContainerConfig::new("frontend").with_grace_period(Duration::from_secs(5)))
        .with_registry(registry.clone())
        .add_class(
            BeanClass::new("Frontend", |arguments| {
                Ok(Frontend {
                    cache: arguments.take()?,
                })
            })
            .listener("cache_bound", |_, reference| {
                println!("Frontend bound to cache {}", reference.id());
                Ok(())
            }),
        )
        .add_component(ReferenceMetadata::new("cache", "Cache"))
        .add_component(
            BeanMetadata::new("frontend", "Frontend").argument(ValueMetadata::component("cache")),
        )
        .add_component(
            ReferenceMetadata::new("cache-watch", "Cache")
                .listener(ListenerMetadata::new(ValueMetadata::component("frontend")).bind("cache_bound")),
        )
        .start()
        .unwrap();

    println!("{:?}", frontend.wait_until_settled(Duration::from_millis(100)));

    let backend = ContainerBuilder::new("backend")
        .with_registry(registry)
        .add_class(
            BeanClass::<Cache>::with_default("Cache")
                .property("capacity", |cache: &mut Cache, capacity: usize| cache.capacity = capacity)
                .method("clear", |cache| {
                    cache.entries.lock().clear();
                    Ok(())
                }),
        )
        .add_component(
            BeanMetadata::new("cache", "Cache")
                .property("capacity", "16")
                .destroy_method("clear")
                .publish(PublishMetadata::new("Cache")),
        )
        .start()
        .unwrap();

    println!("{:?}", backend.wait_until_settled(Duration::from_secs(1)));
    println!("{:?}", frontend.wait_until_settled(Duration::from_secs(1)));

    let app = frontend.get::<Arc<Frontend>>("frontend").unwrap();
    app.remember("greeting", "hello");
    println!("{:?}", app.recall("greeting"));
    println!("{:?}", frontend);

    frontend.stop();
    backend.stop();
}

#[derive(Default)]
struct Cache {
    capacity: usize,
    entries: Mutex<HashMap<String, String>>,
}

struct Frontend {
    cache: ServiceRef<Cache>,
}

impl Frontend {
    fn remember(&self, key: &str, value: &str) {
        let Ok(cache) = self.cache.get() else {
            return;
        };
        let mut entries = cache.entries.lock();
        if entries.len() < cache.capacity {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    fn recall(&self, key: &str) -> Option<String> {
        self.cache.get().ok()?.entries.lock().get(key).cloned()
    }
}
