use std::{fmt::Debug, sync::Arc, time::Duration};

use arbor_registry::{Filter, Instance, ServiceReference};

use crate::{
    errors::ProxyError,
    metadata::Availability,
    tracker::{Delegate, ReferenceBinding},
};

/// Proxy forwarding to the best service currently bound to a reference
///
/// The delegate is looked up on every call, so a replaced provider is picked up
/// by the next call without re-injecting anything.
#[derive(Clone)]
pub struct ReferenceProxy {
    binding: Arc<ReferenceBinding>,
    availability: Availability,
    timeout: Duration,
    fallback: Option<Instance>,
}
impl Debug for ReferenceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceProxy")
            .field("filter", &self.binding.filter().to_string())
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl ReferenceProxy {
    pub(crate) fn new(
        binding: Arc<ReferenceBinding>,
        availability: Availability,
        timeout: Duration,
        fallback: Option<Instance>,
    ) -> Self {
        Self {
            binding,
            availability,
            timeout,
            fallback,
        }
    }

    pub fn filter(&self) -> &Filter {
        self.binding.filter()
    }

    /// True if a provider is bound right now
    pub fn is_bound(&self) -> bool {
        self.binding.active().is_some()
    }

    /// The reference of the current delegate
    ///
    /// Mandatory references wait up to their timeout for a provider to appear.
    pub fn current(&self) -> Result<ServiceReference, ProxyError> {
        let timeout = match self.availability {
            Availability::Mandatory => self.timeout,
            Availability::Optional => Duration::ZERO,
        };

        match self.binding.wait_active(timeout) {
            Delegate::Bound(reference) => Ok(reference),
            Delegate::Unbound => Err(ProxyError::ServiceUnavailable {
                filter: self.binding.filter().to_string(),
            }),
            Delegate::Closed => Err(ProxyError::Closed {
                filter: self.binding.filter().to_string(),
            }),
        }
    }

    /// The current delegate, or the default bean while none is bound
    pub fn service(&self) -> Result<Instance, ProxyError> {
        match (self.current(), &self.fallback) {
            (Ok(reference), _) => Ok(reference.service().clone()),
            (Err(ProxyError::ServiceUnavailable { .. }), Some(fallback)) => Ok(fallback.clone()),
            (Err(error), _) => Err(error),
        }
    }
}

/// Live view of all services bound to a reference list, most preferred first
#[derive(Clone)]
pub struct ReferenceList {
    binding: Arc<ReferenceBinding>,
}
impl Debug for ReferenceList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceList")
            .field("filter", &self.binding.filter().to_string())
            .field("len", &self.len())
            .finish()
    }
}

impl ReferenceList {
    pub(crate) fn new(binding: Arc<ReferenceBinding>) -> Self {
        Self { binding }
    }

    pub fn filter(&self) -> &Filter {
        self.binding.filter()
    }

    /// Snapshot of the bound references
    pub fn references(&self) -> Vec<ServiceReference> {
        self.binding.providers()
    }

    /// Snapshot of the bound services
    pub fn services(&self) -> Vec<Instance> {
        self.binding
            .providers()
            .into_iter()
            .map(|reference| reference.service().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.binding.providers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
