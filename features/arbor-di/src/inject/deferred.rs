use std::{any::type_name, marker::PhantomData, sync::Arc, time::Duration};

use arbor_registry::{Injectable, Instance};

use crate::{
    errors::{ConversionError, ProxyError},
    inject::{mismatch, Expect, FromValue},
    proxy::DeferredProxy,
    value::Value,
};

/// A component that may still be under construction when it is injected
///
/// Use it on one side of a construction cycle, the other side can take a plain `Arc<T>`.
pub struct Deferred<T> {
    proxy: DeferredProxy,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Deferred").field(&self.proxy).finish()
    }
}

impl<T: Injectable> Deferred<T> {
    fn downcast(instance: Instance) -> Result<Arc<T>, ProxyError> {
        instance
            .downcast::<T>()
            .map_err(|actual_type| ProxyError::DowncastFailed {
                required_type: type_name::<T>(),
                actual_type,
            })
    }

    /// Blocks until the target is constructed
    pub fn get(&self) -> Result<Arc<T>, ProxyError> {
        Self::downcast(self.proxy.get()?)
    }

    pub fn get_timeout(&self, timeout: Duration) -> Result<Arc<T>, ProxyError> {
        Self::downcast(self.proxy.get_timeout(timeout)?)
    }

    /// None while the target is still under construction
    pub fn try_get(&self) -> Option<Result<Arc<T>, ProxyError>> {
        self.proxy
            .try_get()
            .map(|result| result.and_then(Self::downcast))
    }

    pub async fn wait(&self) -> Result<Arc<T>, ProxyError> {
        Self::downcast(self.proxy.wait().await?)
    }

    pub fn is_ready(&self) -> bool {
        self.proxy.is_ready()
    }

    pub fn target(&self) -> &str {
        self.proxy.target()
    }
}

impl<T: Injectable> FromValue for Deferred<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let proxy = match value {
            Value::Deferred(proxy) => proxy,
            Value::Object(instance) => DeferredProxy::resolved(instance),
            other => return Err(mismatch("a deferrable object", &other)),
        };
        Ok(Self {
            proxy,
            _type: PhantomData,
        })
    }

    fn expects() -> Expect {
        Expect::Deferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_objects_are_already_resolved() {
        let deferred =
            Deferred::<String>::from_value(Value::Object(Instance::new("db".to_string())))
                .unwrap();
        assert!(deferred.is_ready());
        assert_eq!(deferred.get().unwrap().as_str(), "db");
    }

    #[test]
    fn wrong_type_is_reported_on_access() {
        let deferred = Deferred::<u32>::from_value(Value::Object(Instance::new(1_u8))).unwrap();
        assert!(matches!(
            deferred.try_get(),
            Some(Err(ProxyError::DowncastFailed { .. }))
        ));
    }

    #[test]
    fn pending_proxy_resolves_later() {
        let proxy = DeferredProxy::pending("a".to_string());
        let deferred = Deferred::<u8>::from_value(Value::Deferred(proxy.clone())).unwrap();
        assert!(deferred.try_get().is_none());

        proxy.fix(Instance::new(3_u8));
        let value = futures::executor::block_on(deferred.wait()).unwrap();
        assert_eq!(*value, 3);
    }
}
