//! Event payloads carried by the runtime's queue.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::connection::{BindingId, SignalArgs};
use crate::object::ObjectId;
use crate::timer::TimerId;

/// An event delivered to an object, either synchronously (`send_event`) or
/// through the queue (`post_event`, timers, queued signals).
#[derive(Clone)]
pub enum Event {
    /// A timer owned by the target fired.
    Timer { id: TimerId },
    /// Deferred delivery of a signal to one binding's slot.
    QueuedSignal { binding: BindingId, args: SignalArgs },
    /// Deferred invocation of a reflective method on the target.
    InvokeMethod {
        method: &'static str,
        args: SignalArgs,
    },
    /// Application-defined payload; handlers downcast via
    /// [`custom_payload`](Event::custom_payload).
    Custom { payload: Rc<dyn Any> },
}

impl Event {
    /// Wrap an application-defined payload.
    pub fn custom<T: Any>(payload: T) -> Self {
        Self::Custom {
            payload: Rc::new(payload),
        }
    }

    /// Downcast a custom payload. `None` for other variants or a type
    /// mismatch.
    pub fn custom_payload<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Custom { payload } => payload.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timer { id } => f.debug_struct("Timer").field("id", id).finish(),
            Self::QueuedSignal { binding, .. } => f
                .debug_struct("QueuedSignal")
                .field("binding", binding)
                .finish_non_exhaustive(),
            Self::InvokeMethod { method, .. } => f
                .debug_struct("InvokeMethod")
                .field("method", method)
                .finish_non_exhaustive(),
            Self::Custom { .. } => f.debug_struct("Custom").finish_non_exhaustive(),
        }
    }
}

/// A queued event waiting for dispatch.
#[derive(Clone, Debug)]
pub(crate) struct PendingEvent {
    pub target: ObjectId,
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_payload_downcasts() {
        #[derive(Debug, PartialEq)]
        struct Ping(u8);

        let event = Event::custom(Ping(3));
        assert_eq!(event.custom_payload::<Ping>(), Some(&Ping(3)));
        assert!(event.custom_payload::<String>().is_none());

        let timer = Event::Timer { id: TimerId::default() };
        assert!(timer.custom_payload::<Ping>().is_none());
    }
}
