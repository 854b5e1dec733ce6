//! Container level state and the events published to observers.

use std::fmt::Display;

use futures_channel::mpsc;
use parking_lot::Mutex;

use crate::{component::ComponentState, errors::ContainerError, metadata::ComponentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerState {
    Created,
    Creating,
    /// Eager components are waiting for mandatory references
    GracePeriod,
    Active,
    Failed,
    Stopping,
    Stopped,
}

impl ContainerState {
    /// Start has finished, one way or the other
    pub fn is_settled(self) -> bool {
        !matches!(
            self,
            ContainerState::Created | ContainerState::Creating | ContainerState::GracePeriod
        )
    }
}

impl Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// A component that failed, with the cause chain in `error`
#[derive(Debug, Clone)]
pub struct ComponentFailure {
    pub component: ComponentId,
    pub error: ContainerError,
}

#[derive(Debug, Clone)]
pub enum ContainerEvent {
    Creating,
    GracePeriod {
        missing: Vec<String>,
    },
    ComponentStateChanged {
        component: ComponentId,
        from: ComponentState,
        to: ComponentState,
    },
    /// Every eager component is active
    Created,
    Failure {
        failures: Vec<ComponentFailure>,
    },
    Destroying,
    Destroyed,
}

impl ContainerEvent {
    /// Container level events are replayed to late subscribers
    fn is_container_level(&self) -> bool {
        !matches!(self, ContainerEvent::ComponentStateChanged { .. })
    }
}

pub type ContainerEvents = mpsc::UnboundedReceiver<ContainerEvent>;

#[derive(Default)]
struct DispatcherState {
    subscribers: Vec<mpsc::UnboundedSender<ContainerEvent>>,
    last: Option<ContainerEvent>,
}

/// Fans container events out to every subscriber
#[derive(Default)]
pub(crate) struct EventDispatcher {
    state: Mutex<DispatcherState>,
}

impl EventDispatcher {
    pub(crate) fn subscribe(&self) -> ContainerEvents {
        let (tx, rx) = mpsc::unbounded();
        let mut state = self.state.lock();
        if let Some(last) = &state.last {
            let _ = tx.unbounded_send(last.clone());
        }
        state.subscribers.push(tx);
        rx
    }

    pub(crate) fn dispatch(&self, event: ContainerEvent) {
        tracing::trace!("Dispatching {event:?}");
        let mut state = self.state.lock();
        if event.is_container_level() {
            state.last = Some(event.clone());
        }
        // Dropped receivers are forgotten
        state
            .subscribers
            .retain(|subscriber| subscriber.unbounded_send(event.clone()).is_ok());
    }

    /// Ends every subscriber stream
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        for subscriber in state.subscribers.drain(..) {
            subscriber.close_channel();
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[test]
    fn late_subscribers_see_the_last_container_event() {
        let dispatcher = EventDispatcher::default();
        dispatcher.dispatch(ContainerEvent::Creating);
        dispatcher.dispatch(ContainerEvent::ComponentStateChanged {
            component: "a".to_string(),
            from: ComponentState::Created,
            to: ComponentState::WaitingForDependencies,
        });

        let events = dispatcher.subscribe();
        dispatcher.dispatch(ContainerEvent::Created);
        dispatcher.close();

        let received: Vec<ContainerEvent> = futures::executor::block_on(events.collect());
        assert!(matches!(
            &received[..],
            [ContainerEvent::Creating, ContainerEvent::Created]
        ));
    }

    #[test]
    fn settled_states() {
        assert!(!ContainerState::GracePeriod.is_settled());
        assert!(ContainerState::Failed.is_settled());
        assert!(ContainerState::Active.is_settled());
    }
}
