//! Signal/slot bindings.
//!
//! A binding joins `(emitter, signal name)` to a receiver-owned callback.
//! The table only does bookkeeping; emission order and delivery semantics
//! are driven by [`Runtime::emit`](crate::Runtime::emit).

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};

use crate::object::ObjectId;
use crate::runtime::Runtime;

new_key_type! {
    /// Handle to an individual signal/slot binding.
    pub struct BindingId;
}

/// How a slot is delivered when its signal fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionType {
    /// Invoke the slot synchronously, inside the emit call.
    #[default]
    Direct,
    /// Enqueue delivery; the slot runs from the event loop.
    Queued,
}

/// Type-erased signal payload, cheap to clone for queued fan-out.
#[derive(Clone, Default)]
pub struct SignalArgs {
    payload: Option<Rc<dyn Any>>,
}

impl SignalArgs {
    /// No payload.
    pub fn none() -> Self {
        Self { payload: None }
    }

    /// Wrap a payload value.
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            payload: Some(Rc::new(value)),
        }
    }

    /// Downcast the payload, if present and of type `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref::<T>()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }
}

/// A slot callback. Receives the runtime so it can emit, connect, destroy
/// or arm timers while running.
pub type Slot = Rc<dyn Fn(&mut Runtime, &SignalArgs)>;

pub(crate) struct Binding {
    pub emitter: ObjectId,
    pub signal: String,
    pub receiver: ObjectId,
    pub kind: ConnectionType,
    pub slot: Slot,
}

/// All live bindings, indexed by emitter for ordered emission.
#[derive(Default)]
pub(crate) struct ConnectionTable {
    bindings: SlotMap<BindingId, Binding>,
    /// Per-emitter binding ids in connection order.
    by_emitter: HashMap<ObjectId, Vec<BindingId>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, binding: Binding) -> BindingId {
        let emitter = binding.emitter;
        let id = self.bindings.insert(binding);
        self.by_emitter.entry(emitter).or_default().push(id);
        id
    }

    pub fn remove(&mut self, id: BindingId) -> bool {
        let Some(binding) = self.bindings.remove(id) else {
            return false;
        };
        if let Some(ids) = self.by_emitter.get_mut(&binding.emitter) {
            ids.retain(|&b| b != id);
            if ids.is_empty() {
                self.by_emitter.remove(&binding.emitter);
            }
        }
        true
    }

    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(id)
    }

    /// Binding ids for `(emitter, signal)` in connection order. A snapshot:
    /// the caller re-checks each id before delivery, because a slot run
    /// earlier in the same emission may have disconnected later ones.
    pub fn matching(&self, emitter: ObjectId, signal: &str) -> Vec<BindingId> {
        self.by_emitter
            .get(&emitter)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|&id| {
                        self.bindings
                            .get(id)
                            .is_some_and(|binding| binding.signal == signal)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every binding whose emitter or receiver is in `dead`.
    pub fn purge(&mut self, dead: &[ObjectId]) -> usize {
        let doomed: Vec<BindingId> = self
            .bindings
            .iter()
            .filter(|(_, binding)| {
                dead.contains(&binding.emitter) || dead.contains(&binding.receiver)
            })
            .map(|(id, _)| id)
            .collect();
        for &id in &doomed {
            self.remove(id);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRegistry;

    struct Node;
    impl crate::object::Object for Node {}

    fn ids(n: usize) -> Vec<ObjectId> {
        let mut registry = ObjectRegistry::new();
        (0..n)
            .map(|i| registry.spawn(format!("n{i}"), None, |_| Node).unwrap())
            .collect()
    }

    fn noop_slot() -> Slot {
        Rc::new(|_: &mut Runtime, _: &SignalArgs| {})
    }

    fn binding(emitter: ObjectId, signal: &str, receiver: ObjectId) -> Binding {
        Binding {
            emitter,
            signal: signal.to_string(),
            receiver,
            kind: ConnectionType::Direct,
            slot: noop_slot(),
        }
    }

    #[test]
    fn matching_preserves_connection_order_per_signal() {
        let objs = ids(2);
        let mut table = ConnectionTable::new();
        let first = table.insert(binding(objs[0], "finished", objs[1]));
        let other = table.insert(binding(objs[0], "changed", objs[1]));
        let second = table.insert(binding(objs[0], "finished", objs[1]));

        assert_eq!(table.matching(objs[0], "finished"), vec![first, second]);
        assert_eq!(table.matching(objs[0], "changed"), vec![other]);
        assert!(table.matching(objs[1], "finished").is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let objs = ids(2);
        let mut table = ConnectionTable::new();
        let id = table.insert(binding(objs[0], "finished", objs[1]));

        assert!(table.remove(id));
        assert!(!table.remove(id));
        assert!(table.matching(objs[0], "finished").is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn purge_drops_bindings_touching_dead_objects() {
        let objs = ids(3);
        let mut table = ConnectionTable::new();
        table.insert(binding(objs[0], "finished", objs[1]));
        table.insert(binding(objs[1], "finished", objs[2]));
        let survivor = table.insert(binding(objs[2], "finished", objs[2]));

        // objs[1] dies: both its emitter role and receiver role go away.
        assert_eq!(table.purge(&[objs[1]]), 2);
        assert_eq!(table.len(), 1);
        assert!(table.get(survivor).is_some());
    }

    #[test]
    fn signal_args_payload_round_trip() {
        let none = SignalArgs::none();
        assert!(none.is_empty());
        assert!(none.get::<u32>().is_none());

        let args = SignalArgs::new(42u32);
        assert_eq!(args.get::<u32>(), Some(&42));
        assert!(args.get::<String>().is_none());

        let cloned = args.clone();
        assert_eq!(cloned.get::<u32>(), Some(&42));
    }
}
