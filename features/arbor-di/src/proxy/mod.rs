//! Indirections handed out by the resolver in place of real objects.
//!
//! Both flavours pick their delegate at call time and never cache it across calls:
//!
//! 1. [DeferredProxy] breaks construction cycles, it is fixed exactly once
//! 2. [ReferenceProxy] and [ReferenceList] follow a tracked service binding

use std::{sync::Arc, thread::ThreadId, time::Duration};

use arbor_registry::Instance;

use crate::{metadata::Availability, recipe::RecipeId, tracker::ReferenceBinding};

pub mod deferred;
pub mod reference;

pub use deferred::{DeferredFuture, DeferredProxy};
pub use reference::{ReferenceList, ReferenceProxy};

/// Creates the proxies the resolver hands out
pub struct ProxyFactory;

impl ProxyFactory {
    /// A proxy for a singleton `owner` is still constructing
    pub fn deferred(target: &RecipeId, owner: ThreadId) -> DeferredProxy {
        tracing::debug!("Handing out a deferred proxy for '{target}'");
        DeferredProxy::owned_by(target.to_string(), owner)
    }

    pub fn reference(
        binding: Arc<ReferenceBinding>,
        availability: Availability,
        timeout: Duration,
        fallback: Option<Instance>,
    ) -> ReferenceProxy {
        tracing::trace!("Creating a reference proxy for {}", binding.filter());
        ReferenceProxy::new(binding, availability, timeout, fallback)
    }

    pub fn reference_list(binding: Arc<ReferenceBinding>) -> ReferenceList {
        tracing::trace!("Creating a reference list for {}", binding.filter());
        ReferenceList::new(binding)
    }
}
