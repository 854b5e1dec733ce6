//! Arbor Config provides a registry of typed configs and string properties which
//! containers draw their settings, placeholders and injected configs from.
//!
//! It is split into two major parts:
//! 1. ConfigProvider: Used to create the registry of all configs and properties
//! 2. Config<T>: A wrapper type to inject a config into a bean
//!
//! # Examples
//!
//! ```rust
//! use std::{sync::Arc, time::Duration};
//! use arbor_config::{Config, ConfigProvider, ContainerBuilderExt, PROVIDER_COMPONENT};
//! use arbor_di::{BeanClass, BeanMetadata, ContainerBuilder, ContainerState, ValueMetadata};
//!
//! struct AppConfig {
//!     app_name: String,
//! }
//!
//! struct App {
//!     config: Config<AppConfig>,
//!     port: u16,
//! }
//!
//! let mut provider = ConfigProvider::new();
//! provider
//!     .add_config(AppConfig { app_name: "My Awesome App".to_string() })
//!     .unwrap()
//!     .set_property("app.port", "8080");
//!
//! let container = ContainerBuilder::new("app")
//!     .with_config_provider(Arc::new(provider))
//!     .unwrap()
//!     .add_class(BeanClass::new("App", |arguments| {
//!         Ok(App { config: arguments.take()?, port: arguments.take()? })
//!     }))
//!     .add_component(
//!         BeanMetadata::new("app", "App")
//!             .argument(ValueMetadata::component(PROVIDER_COMPONENT))
//!             .argument("${app.port}"),
//!     )
//!     .start()
//!     .unwrap();
//!
//! assert_eq!(container.wait_until_settled(Duration::from_secs(1)), ContainerState::Active);
//! let app = container.get::<Arc<App>>("app").unwrap();
//! assert_eq!(app.config.app_name, "My Awesome App");
//! assert_eq!(app.port, 8080);
//! container.stop();
//! ```

use std::sync::Arc;

use arbor_di::ContainerBuilder;

pub mod config;
pub mod errors;
pub mod provider;

pub use config::Config;
pub use errors::ConfigError;
pub use provider::{ConfigProvider, GRACE_PERIOD_PROPERTY, WAIT_FOR_DEPENDENCIES_PROPERTY};

/// Id of the provider component added by [ContainerBuilderExt::with_config_provider]
pub const PROVIDER_COMPONENT: &str = "arbor.config";

pub trait ContainerBuilderExt: Sized {
    /// Takes the container settings, placeholder values and injectable configs from `provider`
    fn with_config_provider(self, provider: Arc<ConfigProvider>) -> Result<Self, ConfigError>;
}

impl ContainerBuilderExt for ContainerBuilder {
    fn with_config_provider(self, provider: Arc<ConfigProvider>) -> Result<Self, ConfigError> {
        let config = provider.container_config(self.name())?;
        tracing::debug!(
            "Container '{}' configured with {} properties",
            config.name,
            provider.properties().len()
        );
        Ok(self
            .with_config(config)
            .with_properties(provider.clone())
            .add_shared_instance(PROVIDER_COMPONENT, provider))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arbor_di::{BeanClass, BeanMetadata, ContainerState, ValueMetadata};

    use super::*;

    struct Retry {
        attempts: u32,
    }

    struct Client {
        retry: Config<Retry>,
        endpoint: String,
    }

    #[test]
    fn containers_inject_configs_and_properties() {
        let mut provider = ConfigProvider::new();
        provider
            .add_config(Retry { attempts: 4 })
            .unwrap()
            .set_property("client.endpoint", "http://localhost")
            .set_property(GRACE_PERIOD_PROPERTY, "1500");

        let container = ContainerBuilder::new("client")
            .with_config_provider(Arc::new(provider))
            .unwrap()
            .add_class(BeanClass::new("Client", |arguments| {
                Ok(Client {
                    retry: arguments.take()?,
                    endpoint: arguments.take()?,
                })
            }))
            .add_component(
                BeanMetadata::new("client", "Client")
                    .argument(ValueMetadata::component(PROVIDER_COMPONENT))
                    .argument("${client.endpoint}/api"),
            )
            .start()
            .unwrap();

        assert_eq!(
            container.wait_until_settled(Duration::from_secs(2)),
            ContainerState::Active
        );
        let client = container.get::<Arc<Client>>("client").unwrap();
        assert_eq!(client.retry.attempts, 4);
        assert_eq!(client.endpoint, "http://localhost/api");
        container.stop();
    }

    #[test]
    fn invalid_settings_are_reported_before_start() {
        let mut provider = ConfigProvider::new();
        provider.set_property(GRACE_PERIOD_PROPERTY, "soon");

        assert!(matches!(
            ContainerBuilder::new("client").with_config_provider(Arc::new(provider)),
            Err(ConfigError::InvalidProperty { .. })
        ));
    }
}
