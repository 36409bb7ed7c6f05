//! Task objects: small, fully reflective building blocks that exercise the
//! whole runtime (meta tables, signals, timers, custom events, tree
//! traversal).
//!
//! Every variant exposes a `finished` signal; the startable ones expose a
//! `start` method invocable by name. Completion always logs the task's name
//! and emits `finished` exactly once per completed start.

use std::collections::HashSet;
use std::time::Duration;

use crate::connection::{ConnectionType, SignalArgs};
use crate::error::Result;
use crate::event::Event;
use crate::meta::{MetaObject, MethodMeta, SignalMeta, type_registry};
use crate::object::{Object, ObjectId, object_cast_mut};
use crate::runtime::Runtime;
use crate::timer::{TimerId, TimerKind};

/// Signal emitted when a task completes a start.
pub const SIGNAL_FINISHED: &str = "finished";
/// Reflective method that begins a task's work.
pub const METHOD_START: &str = "start";

/// Custom event asking a [`DelayedTask`] subtree to arm its start timers.
///
/// The task named `target_name` additionally wires its `finished` signal to
/// quit the loop, so "run until the named task completes" is one post plus
/// [`Runtime::run`].
#[derive(Debug, Clone)]
pub struct DeferredStart {
    pub target_name: String,
}

impl DeferredStart {
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
        }
    }
}

/// Custom event asking a [`TaskManager`] to start every descendant whose
/// name contains `needle`.
#[derive(Debug, Clone)]
pub struct StartFilter {
    pub needle: String,
}

impl StartFilter {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

/// Completion path shared by every task variant.
fn complete_start(rt: &mut Runtime, id: ObjectId) {
    let name = rt.object_name(id).unwrap_or_default();
    tracing::info!(target: "arbor_core::task", %name, "task finished");
    rt.emit(id, SIGNAL_FINISHED, SignalArgs::none());
}

// ----------------------------------------------------------------------
// Task

/// The simplest task: `start` completes immediately.
pub struct Task;

impl Task {
    pub fn spawn(rt: &mut Runtime, name: &str, parent: Option<ObjectId>) -> Result<ObjectId> {
        rt.spawn(name, parent, |_| Task)
    }

    pub fn start(&mut self, rt: &mut Runtime, id: ObjectId) {
        complete_start(rt, id);
    }
}

impl Object for Task {
    fn meta_object(&self) -> Option<&'static MetaObject> {
        Some(&TASK_META)
    }
}

fn invoke_task_start(object: &mut dyn Object, rt: &mut Runtime, id: ObjectId, _: &SignalArgs) {
    if let Some(task) = object_cast_mut::<Task>(object) {
        task.start(rt, id);
    }
}

static TASK_META: MetaObject = MetaObject {
    type_name: "Task",
    methods: &[MethodMeta {
        name: METHOD_START,
        invoke: invoke_task_start,
    }],
    signals: &[SignalMeta {
        name: SIGNAL_FINISHED,
    }],
};

// ----------------------------------------------------------------------
// DelayedTask

/// A task that completes a fixed delay after being asked to start.
///
/// Starting is driven by a [`DeferredStart`] custom event: the handler arms
/// a one-shot timer for its own delay, then re-sends the event to every
/// descendant. Each delayed descendant re-propagates to its own subtree, so
/// deeper nodes receive the event once per delayed ancestor and arm a timer
/// for each delivery; completions are deliberately not deduplicated.
pub struct DelayedTask {
    delay: Duration,
    /// Timers this task armed and has not yet seen fire.
    armed: HashSet<TimerId>,
}

impl DelayedTask {
    pub fn spawn(
        rt: &mut Runtime,
        name: &str,
        parent: Option<ObjectId>,
        delay: Duration,
    ) -> Result<ObjectId> {
        rt.spawn(name, parent, |_| Self {
            delay,
            armed: HashSet::new(),
        })
    }
}

impl Object for DelayedTask {
    fn meta_object(&self) -> Option<&'static MetaObject> {
        Some(&DELAYED_TASK_META)
    }

    fn event(&mut self, rt: &mut Runtime, self_id: ObjectId, event: &Event) -> bool {
        match event {
            Event::Timer { id } => {
                if self.armed.remove(id) {
                    complete_start(rt, self_id);
                    return true;
                }
                false
            }
            Event::Custom { .. } => {
                let Some(deferred) = event.custom_payload::<DeferredStart>() else {
                    return false;
                };
                let name = rt.object_name(self_id).unwrap_or_default();
                if deferred.target_name == name {
                    let _ = rt.connect(
                        self_id,
                        SIGNAL_FINISHED,
                        self_id,
                        ConnectionType::Direct,
                        |rt, _| rt.quit(),
                    );
                }
                match rt.start_timer(self_id, self.delay, TimerKind::OneShot) {
                    Ok(timer) => {
                        self.armed.insert(timer);
                    }
                    Err(err) => {
                        tracing::warn!(
                            target: "arbor_core::task",
                            %name,
                            error = %err,
                            "failed to arm delay timer"
                        );
                    }
                }
                for child in rt.descendants(self_id) {
                    rt.send_event(child, event);
                }
                true
            }
            _ => false,
        }
    }
}

fn invoke_delayed_task_start(
    object: &mut dyn Object,
    rt: &mut Runtime,
    id: ObjectId,
    _: &SignalArgs,
) {
    // Reflective start skips the delay, like a direct method call would.
    if object_cast_mut::<DelayedTask>(object).is_some() {
        complete_start(rt, id);
    }
}

static DELAYED_TASK_META: MetaObject = MetaObject {
    type_name: "DelayedTask",
    methods: &[MethodMeta {
        name: METHOD_START,
        invoke: invoke_delayed_task_start,
    }],
    signals: &[SignalMeta {
        name: SIGNAL_FINISHED,
    }],
};

// ----------------------------------------------------------------------
// DeadlineTask

/// A task whose `start` completes after a fixed deadline.
///
/// Every `start` call arms an independent one-shot timer; calling it twice
/// yields two completions.
pub struct DeadlineTask {
    deadline: Duration,
    armed: HashSet<TimerId>,
}

impl DeadlineTask {
    pub fn spawn(
        rt: &mut Runtime,
        name: &str,
        parent: Option<ObjectId>,
        deadline: Duration,
    ) -> Result<ObjectId> {
        rt.spawn(name, parent, |_| Self {
            deadline,
            armed: HashSet::new(),
        })
    }

    pub fn start(&mut self, rt: &mut Runtime, id: ObjectId) {
        match rt.start_timer(id, self.deadline, TimerKind::OneShot) {
            Ok(timer) => {
                self.armed.insert(timer);
            }
            Err(err) => {
                tracing::warn!(
                    target: "arbor_core::task",
                    object = ?id,
                    error = %err,
                    "failed to arm deadline timer"
                );
            }
        }
    }
}

impl Object for DeadlineTask {
    fn meta_object(&self) -> Option<&'static MetaObject> {
        Some(&DEADLINE_TASK_META)
    }

    fn event(&mut self, rt: &mut Runtime, self_id: ObjectId, event: &Event) -> bool {
        if let Event::Timer { id } = event
            && self.armed.remove(id)
        {
            complete_start(rt, self_id);
            return true;
        }
        false
    }
}

fn invoke_deadline_task_start(
    object: &mut dyn Object,
    rt: &mut Runtime,
    id: ObjectId,
    _: &SignalArgs,
) {
    if let Some(task) = object_cast_mut::<DeadlineTask>(object) {
        task.start(rt, id);
    }
}

static DEADLINE_TASK_META: MetaObject = MetaObject {
    type_name: "DeadlineTask",
    methods: &[MethodMeta {
        name: METHOD_START,
        invoke: invoke_deadline_task_start,
    }],
    signals: &[SignalMeta {
        name: SIGNAL_FINISHED,
    }],
};

// ----------------------------------------------------------------------
// TaskManager

/// Starts descendant tasks by name filter.
///
/// On a [`StartFilter`] custom event, walks its descendants in pre-order and
/// invokes `start` on every one whose name contains the needle. Descendants
/// without a `start` method are skipped.
pub struct TaskManager;

impl TaskManager {
    pub fn spawn(rt: &mut Runtime, name: &str, parent: Option<ObjectId>) -> Result<ObjectId> {
        rt.spawn(name, parent, |_| TaskManager)
    }
}

impl Object for TaskManager {
    fn meta_object(&self) -> Option<&'static MetaObject> {
        Some(&TASK_MANAGER_META)
    }

    fn event(&mut self, rt: &mut Runtime, self_id: ObjectId, event: &Event) -> bool {
        let Some(filter) = event.custom_payload::<StartFilter>() else {
            return false;
        };
        let matching: Vec<ObjectId> = rt
            .objects()
            .find_descendants(self_id, |_, name| name.contains(filter.needle.as_str()))
            .collect();
        tracing::debug!(
            target: "arbor_core::task",
            needle = %filter.needle,
            matched = matching.len(),
            "start filter received"
        );
        for task in matching {
            if let Err(err) =
                rt.invoke_method(task, METHOD_START, SignalArgs::none(), ConnectionType::Direct)
            {
                tracing::debug!(
                    target: "arbor_core::task",
                    object = ?task,
                    error = %err,
                    "descendant is not startable"
                );
            }
        }
        true
    }
}

static TASK_MANAGER_META: MetaObject = MetaObject {
    type_name: "TaskManager",
    methods: &[],
    signals: &[],
};

/// Register all task meta-objects up front. Idempotent; spawning also
/// registers each type lazily, so calling this is optional.
pub fn register_task_types() {
    let registry = type_registry();
    for meta in [
        &TASK_META,
        &DELAYED_TASK_META,
        &DEADLINE_TASK_META,
        &TASK_MANAGER_META,
    ] {
        registry.ensure(meta);
    }
}
