use std::{any::type_name, marker::PhantomData, sync::Arc};

use arbor_registry::{Injectable, Instance, ServiceReference};

use crate::{
    errors::{ConversionError, ProxyError},
    inject::{mismatch, Expect, FromValue},
    proxy::{ReferenceList, ReferenceProxy},
    value::Value,
};

fn downcast<T: Injectable>(instance: Instance) -> Result<Arc<T>, ProxyError> {
    instance
        .downcast::<T>()
        .map_err(|actual_type| ProxyError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        })
}

/// Typed handle to an external service that may come and go
///
/// Every call resolves the currently bound provider, keep the handle rather than the `Arc`.
pub struct ServiceRef<T> {
    proxy: ReferenceProxy,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for ServiceRef<T> {
    fn clone(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ServiceRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ServiceRef").field(&self.proxy).finish()
    }
}

impl<T: Injectable> ServiceRef<T> {
    /// The current provider, or the default bean while none is bound
    pub fn get(&self) -> Result<Arc<T>, ProxyError> {
        downcast(self.proxy.service()?)
    }

    pub fn is_available(&self) -> bool {
        self.proxy.is_bound()
    }

    pub fn reference(&self) -> Result<ServiceReference, ProxyError> {
        self.proxy.current()
    }
}

impl<T: Injectable> FromValue for ServiceRef<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Reference(proxy) => Ok(Self {
                proxy,
                _type: PhantomData,
            }),
            other => Err(mismatch("a service reference", &other)),
        }
    }

    fn expects() -> Expect {
        Expect::Reference
    }
}

/// Typed live view of all services bound to a reference list
pub struct ServiceList<T> {
    list: ReferenceList,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for ServiceList<T> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ServiceList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ServiceList").field(&self.list).finish()
    }
}

impl<T: Injectable> ServiceList<T> {
    /// The bound services right now, most preferred first
    ///
    /// Providers of another type are skipped.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.list
            .services()
            .into_iter()
            .filter_map(|service| service.downcast::<T>().ok())
            .collect()
    }

    pub fn references(&self) -> Vec<ServiceReference> {
        self.list.references()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl<T: Injectable> FromValue for ServiceList<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::ReferenceList(list) => Ok(Self {
                list,
                _type: PhantomData,
            }),
            other => Err(mismatch("a service reference list", &other)),
        }
    }

    fn expects() -> Expect {
        Expect::ReferenceList
    }
}
