//! The single-threaded runtime: object tree, signal dispatch, timers and
//! the event loop, behind one `&mut` handle.
//!
//! Everything happens on the thread that owns the [`Runtime`]. Callbacks
//! (slots, event handlers, reflective methods) receive `&mut Runtime`, so
//! re-entrancy is explicit handle passing rather than interior mutability.
//! The only suspension point in [`run`](Runtime::run) is the sleep until
//! the next timer deadline.

use std::collections::VecDeque;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use static_assertions::assert_not_impl_any;

use crate::connection::{Binding, BindingId, ConnectionTable, ConnectionType, SignalArgs, Slot};
use crate::error::{Result, TimerError};
use crate::event::{Event, PendingEvent};
use crate::meta::{MetaError, MetaObject, MemberMeta, type_registry};
use crate::object::{Object, ObjectError, ObjectId, ObjectRegistry};
use crate::timer::{TimerId, TimerKind, TimerManager};

/// Lifecycle of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Not running.
    Idle,
    /// Inside [`Runtime::run`], dispatching events.
    Running,
    /// Quit requested; the loop exits at the next dispatch boundary.
    Quitting,
}

/// The object/event runtime. Not `Send`, not `Sync`.
pub struct Runtime {
    objects: ObjectRegistry,
    connections: ConnectionTable,
    timers: TimerManager,
    queue: VecDeque<PendingEvent>,
    state: LoopState,
}

assert_not_impl_any!(Runtime: Send, Sync);

enum EmitStep {
    Call(Slot),
    Queue(ObjectId),
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            objects: ObjectRegistry::new(),
            connections: ConnectionTable::new(),
            timers: TimerManager::new(),
            queue: VecDeque::new(),
            state: LoopState::Idle,
        }
    }

    // ------------------------------------------------------------------
    // Objects

    /// Create an object, optionally parented to a live object. The type's
    /// meta-object (if any) is registered with the global [`TypeRegistry`]
    /// on first use.
    ///
    /// [`TypeRegistry`]: crate::meta::TypeRegistry
    pub fn spawn<T, F>(
        &mut self,
        name: impl Into<String>,
        parent: Option<ObjectId>,
        build: F,
    ) -> Result<ObjectId>
    where
        T: Object,
        F: FnOnce(ObjectId) -> T,
    {
        let id = self.objects.spawn(name, parent, build)?;
        if let Some(meta) = self.objects.meta(id)? {
            type_registry().ensure(meta);
        }
        Ok(id)
    }

    /// Destroy an object and its subtree, children before parents, and purge
    /// every binding and timer that touches a destroyed id. Queued events
    /// addressed to destroyed targets are dropped at dispatch time.
    pub fn destroy(&mut self, id: ObjectId) -> Result<()> {
        let removed = self.objects.destroy(id)?;
        let bindings = self.connections.purge(&removed);
        let timers = self.timers.purge_owners(&removed);
        tracing::debug!(
            target: "arbor_core::object",
            ?id,
            destroyed = removed.len(),
            purged_bindings = bindings,
            purged_timers = timers,
            "destroyed object subtree"
        );
        Ok(())
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains(id)
    }

    /// Read-only access to the object tree for traversals and lookups.
    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    /// Owned copy of the object's name, convenient inside handlers.
    pub fn object_name(&self, id: ObjectId) -> Result<String> {
        Ok(self.objects.name(id)?.to_string())
    }

    pub fn parent(&self, id: ObjectId) -> Result<Option<ObjectId>> {
        Ok(self.objects.parent(id)?)
    }

    pub fn children(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        Ok(self.objects.children(id)?.to_vec())
    }

    /// Strict descendants of `id` in pre-order, snapshotted into a `Vec` so
    /// handlers can mutate the tree while iterating.
    pub fn descendants(&self, id: ObjectId) -> Vec<ObjectId> {
        self.objects.descendants(id).collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // ------------------------------------------------------------------
    // Reflection

    /// The object's static member table, or `None` if its type has none.
    pub fn meta_of(&self, id: ObjectId) -> Result<Option<&'static MetaObject>> {
        Ok(self.objects.meta(id)?)
    }

    /// Name-based member lookup on a live object's type.
    pub fn lookup_member(&self, id: ObjectId, name: &str) -> Result<Option<MemberMeta<'static>>> {
        let Some(meta) = self.objects.meta(id)? else {
            return Ok(None);
        };
        Ok(meta.member(name))
    }

    /// Invoke a reflective method by name.
    ///
    /// `Direct` runs the method before this call returns; `Queued` posts an
    /// [`Event::InvokeMethod`] and the method runs from the loop. If the
    /// target dies before a queued invocation is dispatched, the invocation
    /// is dropped silently.
    pub fn invoke_method(
        &mut self,
        target: ObjectId,
        name: &str,
        args: SignalArgs,
        kind: ConnectionType,
    ) -> Result<()> {
        let Some(meta) = self.objects.meta(target)? else {
            return Err(MetaError::NoMetaObject {
                type_name: self.objects.type_name(target)?,
            }
            .into());
        };
        let Some(method) = meta.method(name) else {
            return Err(MetaError::NoSuchMember {
                type_name: meta.type_name,
                member: name.to_string(),
            }
            .into());
        };
        match kind {
            ConnectionType::Direct => self.call_method(target, method.invoke, &args),
            ConnectionType::Queued => {
                self.enqueue(
                    target,
                    Event::InvokeMethod {
                        method: method.name,
                        args,
                    },
                );
                Ok(())
            }
        }
    }

    fn call_method(
        &mut self,
        target: ObjectId,
        invoke: fn(&mut dyn Object, &mut Runtime, ObjectId, &SignalArgs),
        args: &SignalArgs,
    ) -> Result<()> {
        let Some(mut instance) = self.objects.take_instance(target) else {
            return Err(ObjectError::InvalidObjectId.into());
        };
        invoke(&mut *instance, self, target, args);
        self.objects.put_instance(target, instance);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Signals

    /// Connect `(emitter, signal)` to a slot owned by `receiver`. The
    /// binding lives until disconnected or either endpoint is destroyed.
    /// Bindings fire in connection order.
    pub fn connect<F>(
        &mut self,
        emitter: ObjectId,
        signal: impl Into<String>,
        receiver: ObjectId,
        kind: ConnectionType,
        slot: F,
    ) -> Result<BindingId>
    where
        F: Fn(&mut Runtime, &SignalArgs) + 'static,
    {
        if !self.objects.contains(emitter) || !self.objects.contains(receiver) {
            return Err(ObjectError::InvalidObjectId.into());
        }
        let signal = signal.into();
        tracing::trace!(
            target: "arbor_core::signal",
            ?emitter,
            %signal,
            ?receiver,
            ?kind,
            "connected"
        );
        Ok(self.connections.insert(Binding {
            emitter,
            signal,
            receiver,
            kind,
            slot: Rc::new(slot),
        }))
    }

    /// Remove a binding. `false` if it was already gone.
    pub fn disconnect(&mut self, id: BindingId) -> bool {
        self.connections.remove(id)
    }

    pub fn binding_count(&self) -> usize {
        self.connections.len()
    }

    /// Emit a signal from `emitter`.
    ///
    /// Bindings are visited in connection order. `Direct` slots run inside
    /// this call; `Queued` slots are enqueued, one event per binding. The
    /// binding set is snapshotted up front and each binding is re-checked
    /// before delivery, so a slot may disconnect bindings or destroy
    /// objects mid-emission: affected deliveries are skipped, never
    /// revisited.
    ///
    /// Emitting from a destroyed or unknown emitter, or a signal nobody is
    /// connected to, delivers nothing.
    pub fn emit(&mut self, emitter: ObjectId, signal: &str, args: SignalArgs) {
        let snapshot = self.connections.matching(emitter, signal);
        tracing::trace!(
            target: "arbor_core::signal",
            ?emitter,
            signal,
            bindings = snapshot.len(),
            "emit"
        );
        for binding_id in snapshot {
            let step = {
                let Some(binding) = self.connections.get(binding_id) else {
                    continue;
                };
                if !self.objects.contains(binding.receiver) {
                    continue;
                }
                match binding.kind {
                    ConnectionType::Direct => EmitStep::Call(Rc::clone(&binding.slot)),
                    ConnectionType::Queued => EmitStep::Queue(binding.receiver),
                }
            };
            match step {
                EmitStep::Call(slot) => slot(self, &args),
                EmitStep::Queue(receiver) => self.enqueue(
                    receiver,
                    Event::QueuedSignal {
                        binding: binding_id,
                        args: args.clone(),
                    },
                ),
            }
        }
    }

    // ------------------------------------------------------------------
    // Events

    /// Deliver an event to `target` synchronously, bypassing the queue.
    /// Returns `false` if the target is destroyed (or currently handling
    /// another delivery); the event is dropped in that case.
    pub fn send_event(&mut self, target: ObjectId, event: &Event) -> bool {
        self.deliver(target, event)
    }

    /// Append an event to the queue for `target`. The queue is one global
    /// FIFO: events dispatch strictly in post order across all targets.
    /// Returns `false` (and drops the event) if the target is already
    /// destroyed; a target destroyed after posting drops the event at
    /// dispatch time instead.
    pub fn post_event(&mut self, target: ObjectId, event: Event) -> bool {
        if !self.objects.contains(target) {
            tracing::trace!(
                target: "arbor_core::event_loop",
                ?target,
                ?event,
                "dropped post to destroyed target"
            );
            return false;
        }
        self.enqueue(target, event);
        true
    }

    fn enqueue(&mut self, target: ObjectId, event: Event) {
        self.queue.push_back(PendingEvent { target, event });
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    fn deliver(&mut self, target: ObjectId, event: &Event) -> bool {
        let Some(mut instance) = self.objects.take_instance(target) else {
            tracing::trace!(
                target: "arbor_core::event_loop",
                ?target,
                ?event,
                "delivery dropped, target gone"
            );
            return false;
        };
        instance.event(self, target, event);
        self.objects.put_instance(target, instance);
        true
    }

    // ------------------------------------------------------------------
    // Timers

    /// Arm a timer owned by `owner`. Fire events are delivered to the owner
    /// through the queue, in deadline order (registration order for equal
    /// deadlines). Destroying the owner disarms the timer.
    pub fn start_timer(
        &mut self,
        owner: ObjectId,
        duration: Duration,
        kind: TimerKind,
    ) -> Result<TimerId> {
        if !self.objects.contains(owner) {
            return Err(TimerError::OwnerDestroyed.into());
        }
        Ok(self.timers.start(owner, duration, kind)?)
    }

    /// Disarm a timer. A cancel always wins: even if the fire event is
    /// already queued, it will be skipped at dispatch. Returns `false` if
    /// the timer was not armed.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    pub fn timer_active(&self, id: TimerId) -> bool {
        self.timers.is_active(id)
    }

    // ------------------------------------------------------------------
    // The loop

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Request loop exit. Cooperative: the currently running handler always
    /// completes, and the loop stops at the next dispatch boundary.
    /// A no-op when the loop is not running.
    pub fn quit(&mut self) {
        if self.state == LoopState::Running {
            tracing::debug!(target: "arbor_core::event_loop", "quit requested");
            self.state = LoopState::Quitting;
        }
    }

    /// Run the event loop until quit is requested or nothing remains to do
    /// (empty queue and no armed timers).
    ///
    /// Each turn moves due timers into the queue, then dispatches the front
    /// event. With an empty queue the loop sleeps until the next timer
    /// deadline.
    pub fn run(&mut self) {
        self.state = LoopState::Running;
        tracing::debug!(target: "arbor_core::event_loop", "event loop started");
        loop {
            if self.state == LoopState::Quitting {
                break;
            }
            self.pump_timers(Instant::now());
            if let Some(pending) = self.queue.pop_front() {
                self.dispatch(pending);
                continue;
            }
            match self.timers.time_until_next(Instant::now()) {
                Some(wait) if wait > Duration::ZERO => {
                    tracing::trace!(
                        target: "arbor_core::event_loop",
                        ?wait,
                        "sleeping until next timer"
                    );
                    thread::sleep(wait);
                }
                Some(_) => {} // Due now; the next turn pumps it.
                None => break,
            }
        }
        tracing::debug!(target: "arbor_core::event_loop", "event loop stopped");
        self.state = LoopState::Idle;
    }

    fn pump_timers(&mut self, now: Instant) {
        for (id, owner) in self.timers.pop_due(now) {
            self.enqueue(owner, Event::Timer { id });
        }
    }

    fn dispatch(&mut self, pending: PendingEvent) {
        let PendingEvent { target, event } = pending;
        match &event {
            Event::Timer { id } => {
                // Canceled or purged after the fire was queued: skip.
                if !self.timers.confirm_fire(*id) {
                    tracing::trace!(
                        target: "arbor_core::timer",
                        timer = ?id,
                        "skipping fire of canceled timer"
                    );
                    return;
                }
                self.deliver(target, &event);
            }
            Event::QueuedSignal { binding, args } => {
                let slot = {
                    let Some(b) = self.connections.get(*binding) else {
                        // Disconnected while queued.
                        return;
                    };
                    if !self.objects.contains(b.receiver) {
                        return;
                    }
                    Rc::clone(&b.slot)
                };
                slot(self, args);
            }
            Event::InvokeMethod { method, args } => {
                // Target destroyed after posting: dropped silently.
                let Some(meta) = self.objects.meta(target).ok().flatten() else {
                    return;
                };
                let Some(m) = meta.method(method) else { return };
                let _ = self.call_method(target, m.invoke, args);
            }
            Event::Custom { .. } => {
                self.deliver(target, &event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Node;
    impl Object for Node {}

    fn noop_meta_target(rt: &mut Runtime) -> ObjectId {
        rt.spawn("node", None, |_| Node).unwrap()
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn record(log: &Log, tag: &str) -> impl Fn(&mut Runtime, &SignalArgs) + 'static {
        let log = Rc::clone(log);
        let tag = tag.to_string();
        move |_, _| log.borrow_mut().push(tag.clone())
    }

    #[test]
    fn direct_emit_runs_slots_in_connection_order() {
        let mut rt = Runtime::new();
        let a = noop_meta_target(&mut rt);
        let b = noop_meta_target(&mut rt);
        let seen = log();

        rt.connect(a, "finished", b, ConnectionType::Direct, record(&seen, "first"))
            .unwrap();
        rt.connect(a, "finished", b, ConnectionType::Direct, record(&seen, "second"))
            .unwrap();
        rt.connect(a, "other", b, ConnectionType::Direct, record(&seen, "other"))
            .unwrap();

        rt.emit(a, "finished", SignalArgs::none());
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn queued_emit_defers_to_the_loop() {
        let mut rt = Runtime::new();
        let a = noop_meta_target(&mut rt);
        let seen = log();

        rt.connect(a, "finished", a, ConnectionType::Queued, record(&seen, "queued"))
            .unwrap();
        rt.emit(a, "finished", SignalArgs::new(5u32));
        assert!(seen.borrow().is_empty());
        assert_eq!(rt.pending_events(), 1);

        rt.run();
        assert_eq!(*seen.borrow(), vec!["queued"]);
        assert_eq!(rt.state(), LoopState::Idle);
    }

    #[test]
    fn emit_on_disconnected_or_destroyed_binding_is_silent() {
        let mut rt = Runtime::new();
        let a = noop_meta_target(&mut rt);
        let b = noop_meta_target(&mut rt);
        let seen = log();

        let binding = rt
            .connect(a, "finished", b, ConnectionType::Direct, record(&seen, "x"))
            .unwrap();
        assert!(rt.disconnect(binding));
        rt.emit(a, "finished", SignalArgs::none());

        rt.connect(a, "finished", b, ConnectionType::Direct, record(&seen, "y"))
            .unwrap();
        rt.destroy(b).unwrap();
        rt.emit(a, "finished", SignalArgs::none());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn slot_may_disconnect_a_later_binding_mid_emission() {
        let mut rt = Runtime::new();
        let a = noop_meta_target(&mut rt);
        let seen = log();

        // First slot disconnects the second; the snapshot skips it.
        let later: Rc<RefCell<Option<BindingId>>> = Rc::new(RefCell::new(None));
        let later_clone = Rc::clone(&later);
        rt.connect(a, "finished", a, ConnectionType::Direct, move |rt, _| {
            if let Some(id) = later_clone.borrow_mut().take() {
                rt.disconnect(id);
            }
        })
        .unwrap();
        let second = rt
            .connect(a, "finished", a, ConnectionType::Direct, record(&seen, "second"))
            .unwrap();
        *later.borrow_mut() = Some(second);

        rt.emit(a, "finished", SignalArgs::none());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn destroy_purges_bindings_and_timers() {
        let mut rt = Runtime::new();
        let root = noop_meta_target(&mut rt);
        let child = rt.spawn("child", Some(root), |_| Node).unwrap();
        let seen = log();

        rt.connect(child, "finished", root, ConnectionType::Direct, record(&seen, "x"))
            .unwrap();
        let timer = rt
            .start_timer(child, Duration::from_millis(1), TimerKind::OneShot)
            .unwrap();

        rt.destroy(root).unwrap();
        assert!(!rt.contains(child));
        assert_eq!(rt.binding_count(), 0);
        assert!(!rt.timer_active(timer));
        assert_eq!(
            rt.start_timer(child, Duration::ZERO, TimerKind::OneShot),
            Err(TimerError::OwnerDestroyed.into())
        );
    }

    #[test]
    fn post_events_dispatch_in_global_fifo_order() {
        struct Recorder {
            seen: Log,
        }
        impl Object for Recorder {
            fn event(&mut self, rt: &mut Runtime, self_id: ObjectId, event: &Event) -> bool {
                let _ = rt;
                if let Some(tag) = event.custom_payload::<&'static str>() {
                    self.seen.borrow_mut().push(format!("{self_id:?}:{tag}"));
                    return true;
                }
                false
            }
        }

        let mut rt = Runtime::new();
        let seen = log();
        let a = rt
            .spawn("a", None, |_| Recorder { seen: Rc::clone(&seen) })
            .unwrap();
        let b = rt
            .spawn("b", None, |_| Recorder { seen: Rc::clone(&seen) })
            .unwrap();

        assert!(rt.post_event(a, Event::custom("one")));
        assert!(rt.post_event(b, Event::custom("two")));
        assert!(rt.post_event(a, Event::custom("three")));
        rt.run();

        let expected = vec![
            format!("{a:?}:one"),
            format!("{b:?}:two"),
            format!("{a:?}:three"),
        ];
        assert_eq!(*seen.borrow(), expected);
    }

    #[test]
    fn send_and_post_to_destroyed_target_return_false() {
        let mut rt = Runtime::new();
        let a = noop_meta_target(&mut rt);
        rt.destroy(a).unwrap();

        assert!(!rt.send_event(a, &Event::custom(())));
        assert!(!rt.post_event(a, Event::custom(())));
        assert_eq!(rt.pending_events(), 0);
    }

    #[test]
    fn target_destroyed_after_posting_drops_the_event() {
        struct MustNotRun;
        impl Object for MustNotRun {
            fn event(&mut self, _: &mut Runtime, _: ObjectId, _: &Event) -> bool {
                panic!("delivered to a destroyed object");
            }
        }

        let mut rt = Runtime::new();
        let a = rt.spawn("a", None, |_| MustNotRun).unwrap();
        assert!(rt.post_event(a, Event::custom(())));
        rt.destroy(a).unwrap();
        rt.run();
    }

    #[test]
    fn quit_from_a_slot_stops_the_loop_with_events_pending() {
        let mut rt = Runtime::new();
        let a = noop_meta_target(&mut rt);

        rt.connect(a, "go", a, ConnectionType::Queued, |rt, _| rt.quit())
            .unwrap();
        rt.emit(a, "go", SignalArgs::none());
        rt.post_event(a, Event::custom(()));
        // Quit outside the loop is a no-op.
        rt.quit();
        assert_eq!(rt.state(), LoopState::Idle);

        rt.run();
        assert_eq!(rt.state(), LoopState::Idle);
        // The event behind the quit never dispatched.
        assert_eq!(rt.pending_events(), 1);
    }

    #[test]
    fn timer_fires_through_the_loop() {
        struct OnTimer {
            seen: Log,
        }
        impl Object for OnTimer {
            fn event(&mut self, rt: &mut Runtime, _: ObjectId, event: &Event) -> bool {
                let _ = rt;
                if let Event::Timer { id } = event {
                    self.seen.borrow_mut().push(format!("{id:?}"));
                    return true;
                }
                false
            }
        }

        let mut rt = Runtime::new();
        let seen = log();
        let a = rt
            .spawn("a", None, |_| OnTimer { seen: Rc::clone(&seen) })
            .unwrap();
        let timer = rt
            .start_timer(a, Duration::from_millis(2), TimerKind::OneShot)
            .unwrap();

        rt.run();
        assert_eq!(*seen.borrow(), vec![format!("{timer:?}")]);
        assert!(!rt.timer_active(timer));
    }

    #[test]
    fn invoke_method_reports_missing_members() {
        let mut rt = Runtime::new();
        let a = noop_meta_target(&mut rt);

        let err = rt
            .invoke_method(a, "start", SignalArgs::none(), ConnectionType::Direct)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ArborError::Meta(MetaError::NoMetaObject { .. })
        ));
        assert!(rt.lookup_member(a, "start").unwrap().is_none());
    }
}
