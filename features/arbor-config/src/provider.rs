use std::{
    any::{Any, TypeId},
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use arbor_di::{ContainerConfig, PropertySource};
use arbor_registry::TypeInfo;

use crate::errors::ConfigError;

/// Grace period of the container in milliseconds
pub const GRACE_PERIOD_PROPERTY: &str = "arbor.grace_period_ms";
/// Whether components wait for their mandatory references
pub const WAIT_FOR_DEPENDENCIES_PROPERTY: &str = "arbor.wait_for_dependencies";

/// A provider to register all configs.
///
/// Typed configs are registered and retrieved based on type. String properties
/// resolve the `${...}` placeholders of container metadata.
#[derive(Default)]
pub struct ConfigProvider {
    configs: HashMap<TypeId, (TypeInfo, Arc<dyn Any + Send + Sync + 'static>)>,
    properties: BTreeMap<String, String>,
}

impl ConfigProvider {
    /// Initializes an empty Config Provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a config with specified type.
    ///
    /// Returns `Ok(None)` if no config of this type has been added.
    pub fn get_config<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ConfigError> {
        self.configs
            .get(&TypeId::of::<T>())
            .map(|(info, entry)| entry.clone().downcast().map_err(|_| ConfigError::Downcast(*info)))
            .transpose()
    }

    /// Add a config to the registry.
    ///
    /// If the config type is already registered, it will return a
    /// [`ConfigError`] runtime error
    pub fn add_config<T: Send + Sync + 'static>(
        &mut self,
        config: T,
    ) -> Result<&mut Self, ConfigError> {
        let info = TypeInfo::of::<T>();
        if self.configs.contains_key(&info.type_id) {
            return Err(ConfigError::AlreadyRegistered(info));
        }

        tracing::debug!("Registered config {info}");
        self.configs.insert(info.type_id, (info, Arc::new(config)));
        Ok(self)
    }

    /// Can optionally add a config to the registry.
    ///
    /// If the config provided is `Some(T)`, it will be the same as calling [`ConfigProvider::add_config`]
    /// If the config provided is `None`, then the function just returns `Ok(self)` for chaining
    pub fn maybe_add_config<T: Send + Sync + 'static>(
        &mut self,
        config: Option<T>,
    ) -> Result<&mut Self, ConfigError> {
        match config {
            Some(c) => self.add_config(c),
            None => Ok(self),
        }
    }

    /// Sets a string property, replacing an earlier value
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets every `(key, value)` pair
    pub fn extend_properties<K: Into<String>, V: Into<String>>(
        &mut self,
        properties: impl IntoIterator<Item = (K, V)>,
    ) -> &mut Self {
        for (key, value) in properties {
            self.set_property(key, value);
        }
        self
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// The configuration of the container `name`
    ///
    /// Starts from a registered [ContainerConfig] if there is one, then applies
    /// [GRACE_PERIOD_PROPERTY] and [WAIT_FOR_DEPENDENCIES_PROPERTY].
    pub fn container_config(&self, name: &str) -> Result<ContainerConfig, ConfigError> {
        let mut config = match self.get_config::<ContainerConfig>()? {
            Some(registered) => ContainerConfig {
                name: name.to_string(),
                ..(*registered).clone()
            },
            None => ContainerConfig::new(name),
        };

        if let Some(value) = self.properties.get(GRACE_PERIOD_PROPERTY) {
            let millis = value
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid(GRACE_PERIOD_PROPERTY, value))?;
            config.grace_period = Duration::from_millis(millis);
        }
        if let Some(value) = self.properties.get(WAIT_FOR_DEPENDENCIES_PROPERTY) {
            config.wait_for_dependencies = value
                .trim()
                .parse()
                .map_err(|_| invalid(WAIT_FOR_DEPENDENCIES_PROPERTY, value))?;
        }
        Ok(config)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidProperty {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl PropertySource for ConfigProvider {
    fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct AppConfig {
        host: String,
        port: u16,
    }

    #[test]
    fn configs_are_registered_once_per_type() {
        let mut provider = ConfigProvider::new();
        provider
            .add_config(AppConfig {
                host: "localhost".to_string(),
                port: 8080,
            })
            .unwrap();

        let config = provider.get_config::<AppConfig>().unwrap().unwrap();
        assert_eq!(config.port, 8080);
        assert!(provider.get_config::<String>().unwrap().is_none());
        assert!(matches!(
            provider.add_config(AppConfig {
                host: "remote".to_string(),
                port: 1,
            }),
            Err(ConfigError::AlreadyRegistered(_))
        ));
        assert!(provider.maybe_add_config::<u32>(None).is_ok());
    }

    #[test]
    fn container_config_applies_properties() {
        let mut provider = ConfigProvider::new();
        provider
            .add_config(ContainerConfig::new("ignored").with_wait_for_dependencies(false))
            .unwrap();
        provider.set_property(GRACE_PERIOD_PROPERTY, "250");

        let config = provider.container_config("app").unwrap();
        assert_eq!(config.name, "app");
        assert_eq!(config.grace_period, Duration::from_millis(250));
        assert!(!config.wait_for_dependencies);

        provider.set_property(WAIT_FOR_DEPENDENCIES_PROPERTY, "maybe");
        assert!(matches!(
            provider.container_config("app"),
            Err(ConfigError::InvalidProperty { ref key, .. }) if key == WAIT_FOR_DEPENDENCIES_PROPERTY
        ));
    }

    #[test]
    fn properties_resolve_placeholders() {
        let mut provider = ConfigProvider::new();
        provider.extend_properties([("db.host", "db.internal"), ("db.port", "5432")]);

        assert_eq!(
            arbor_di::config::substitute("${db.host}:${db.port}", &provider).unwrap(),
            "db.internal:5432"
        );
        assert_eq!(provider.property("db.user"), None);
    }
}
