use std::{
    fmt::Debug,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use arbor_registry::Instance;
use parking_lot::{Condvar, Mutex};

use crate::errors::{ProxyError, RecipeError};

/// Proxy for an object that may still be under construction
///
/// Handed out when a construction cycle is closed through a deferred edge.
/// The delegate is set exactly once, when the target finishes constructing.
/// Until then [DeferredProxy::get] blocks, except on the constructing thread itself,
/// where waiting could never finish.
#[derive(Clone)]
pub struct DeferredProxy(Arc<DeferredCell>);

struct DeferredCell {
    target: String,
    /// Thread constructing the target, moves when another thread takes the construction over
    owner: Mutex<Option<ThreadId>>,
    state: Mutex<DeferredState>,
    settled: Condvar,
}

enum DeferredState {
    Pending(Vec<Waker>),
    Ready(Instance),
    Failed(ProxyError),
}

impl Debug for DeferredProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.0.state.lock() {
            DeferredState::Pending(_) => "pending",
            DeferredState::Ready(_) => "ready",
            DeferredState::Failed(_) => "failed",
        };
        f.debug_struct("DeferredProxy")
            .field("target", &self.0.target)
            .field("state", &state)
            .finish()
    }
}

impl DeferredProxy {
    fn with_state(target: String, owner: Option<ThreadId>, state: DeferredState) -> Self {
        DeferredProxy(Arc::new(DeferredCell {
            target,
            owner: Mutex::new(owner),
            state: Mutex::new(state),
            settled: Condvar::new(),
        }))
    }

    /// Pending proxy, owned by the calling thread
    #[cfg(test)]
    pub(crate) fn pending(target: String) -> Self {
        Self::owned_by(target, thread::current().id())
    }

    /// Pending proxy for a target constructed on `owner`
    pub(crate) fn owned_by(target: String, owner: ThreadId) -> Self {
        Self::with_state(target, Some(owner), DeferredState::Pending(Vec::new()))
    }

    /// Already resolved proxy
    pub fn resolved(instance: Instance) -> Self {
        let target = instance.info().type_name.to_string();
        Self::with_state(target, None, DeferredState::Ready(instance))
    }

    pub(crate) fn failed(target: String, cause: Arc<RecipeError>) -> Self {
        let error = ProxyError::ConstructionFailed {
            target: target.clone(),
            cause,
        };
        Self::with_state(target, None, DeferredState::Failed(error))
    }

    /// Hands the construction of the target to `owner`
    pub(crate) fn reown(&self, owner: ThreadId) {
        *self.0.owner.lock() = Some(owner);
    }

    /// Sets the delegate, a proxy can only be settled once
    pub(crate) fn fix(&self, instance: Instance) {
        self.settle(DeferredState::Ready(instance));
    }

    pub(crate) fn fail(&self, cause: Arc<RecipeError>) {
        let error = ProxyError::ConstructionFailed {
            target: self.0.target.clone(),
            cause,
        };
        self.settle(DeferredState::Failed(error));
    }

    fn settle(&self, settled: DeferredState) {
        let wakers = {
            let mut state = self.0.state.lock();
            let DeferredState::Pending(wakers) = &mut *state else {
                tracing::warn!("Deferred proxy for '{}' settled twice", self.0.target);
                return;
            };
            let wakers = std::mem::take(wakers);
            *state = settled;
            wakers
        };

        self.0.settled.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    /// Id of the proxied component
    pub fn target(&self) -> &str {
        &self.0.target
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.0.state.lock(), DeferredState::Ready(_))
    }

    /// Returns the delegate if the proxy is settled, never blocks
    pub fn try_get(&self) -> Option<Result<Instance, ProxyError>> {
        match &*self.0.state.lock() {
            DeferredState::Pending(_) => None,
            DeferredState::Ready(instance) => Some(Ok(instance.clone())),
            DeferredState::Failed(error) => Some(Err(error.clone())),
        }
    }

    /// Blocks until the delegate is set
    pub fn get(&self) -> Result<Instance, ProxyError> {
        self.wait_until(None)
    }

    /// Blocks until the delegate is set or the timeout elapsed
    pub fn get_timeout(&self, timeout: Duration) -> Result<Instance, ProxyError> {
        self.wait_until(Some(Instant::now() + timeout))
    }

    /// Resolves once the delegate is set
    pub fn wait(&self) -> DeferredFuture {
        DeferredFuture {
            proxy: self.clone(),
        }
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Result<Instance, ProxyError> {
        let mut state = self.0.state.lock();
        loop {
            match &*state {
                DeferredState::Ready(instance) => return Ok(instance.clone()),
                DeferredState::Failed(error) => return Err(error.clone()),
                DeferredState::Pending(_) => {}
            }

            if *self.0.owner.lock() == Some(thread::current().id()) {
                return Err(ProxyError::InConstruction {
                    target: self.0.target.clone(),
                });
            }

            match deadline {
                Some(deadline) => {
                    if self.0.settled.wait_until(&mut state, deadline).timed_out()
                        && matches!(&*state, DeferredState::Pending(_))
                    {
                        return Err(ProxyError::Timeout {
                            target: self.0.target.clone(),
                        });
                    }
                }
                None => self.0.settled.wait(&mut state),
            }
        }
    }
}

/// Future of [DeferredProxy::wait]
pub struct DeferredFuture {
    proxy: DeferredProxy,
}

impl Future for DeferredFuture {
    type Output = Result<Instance, ProxyError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.proxy.0.state.lock();
        match &mut *state {
            DeferredState::Ready(instance) => Poll::Ready(Ok(instance.clone())),
            DeferredState::Failed(error) => Poll::Ready(Err(error.clone())),
            DeferredState::Pending(wakers) => {
                if !wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
