use std::{any::type_name, ops::Deref, sync::Arc};

use arbor_di::{
    errors::ConversionError,
    inject::{Expect, FromValue},
    Instance, Value,
};
use arbor_registry::Injectable;

use crate::provider::ConfigProvider;

/// A wrapper type to allow for config injections
///
/// The injected component is either the [ConfigProvider] itself, usually
/// [crate::PROVIDER_COMPONENT], or a component holding the config directly.
///
/// # Example
/// ```rust
/// use arbor_config::Config;
/// use arbor_di::BeanClass;
///
/// struct MyModuleConfig {
///     enabled: bool,
/// }
///
/// struct MyModule {
///     config: Config<MyModuleConfig>,
/// }
///
/// let class = BeanClass::new("MyModule", |arguments| {
///     Ok(MyModule { config: arguments.take()? })
/// });
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}

impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Injectable> FromValue for Config<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let instance = Instance::from_value(value)?;
        let missing = |actual_type| ConversionError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        };

        let inner = match instance.downcast::<ConfigProvider>() {
            Ok(provider) => provider
                .get_config::<T>()
                .ok()
                .flatten()
                .ok_or_else(|| missing(type_name::<ConfigProvider>()))?,
            Err(_) => instance.downcast::<T>().map_err(missing)?,
        };
        Ok(Config { inner })
    }

    fn expects() -> Expect {
        Expect::Object
    }
}
