//! Generic object processing through reflection.

use crate::connection::{ConnectionType, SignalArgs};
use crate::error::Result;
use crate::object::ObjectId;
use crate::runtime::Runtime;
use crate::tasks::{METHOD_START, SIGNAL_FINISHED};

/// Process an object knowing nothing about its concrete type.
///
/// Probes the object's meta-object by member name: if it can emit
/// `finished`, a logging slot is connected; if it has a `start` method, the
/// method is invoked. `kind` selects immediate or queued handling for both.
/// Objects without a meta-object are logged and skipped.
pub fn process_object(rt: &mut Runtime, id: ObjectId, kind: ConnectionType) -> Result<()> {
    let Some(meta) = rt.meta_of(id)? else {
        tracing::info!(
            target: "arbor_core::meta",
            object = ?id,
            "object exposes no meta-object, nothing to do"
        );
        return Ok(());
    };
    tracing::info!(
        target: "arbor_core::meta",
        type_name = meta.type_name,
        object = ?id,
        "processing object"
    );

    if meta.signal(SIGNAL_FINISHED).is_some() {
        let type_name = meta.type_name;
        rt.connect(id, SIGNAL_FINISHED, id, kind, move |_, _| {
            tracing::info!(target: "arbor_core::meta", type_name, "processed object finished");
        })?;
    }
    if meta.method(METHOD_START).is_some() {
        rt.invoke_method(id, METHOD_START, SignalArgs::none(), kind)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::object::Object;
    use crate::tasks::Task;

    #[test]
    fn starts_and_observes_reflective_objects() {
        let mut rt = Runtime::new();
        let task = Task::spawn(&mut rt, "t", None).unwrap();

        let finished = Rc::new(RefCell::new(0u32));
        let observed = Rc::clone(&finished);
        rt.connect(task, SIGNAL_FINISHED, task, ConnectionType::Direct, move |_, _| {
            *observed.borrow_mut() += 1;
        })
        .unwrap();

        process_object(&mut rt, task, ConnectionType::Direct).unwrap();
        assert_eq!(*finished.borrow(), 1);
    }

    #[test]
    fn queued_processing_runs_from_the_loop() {
        let mut rt = Runtime::new();
        let task = Task::spawn(&mut rt, "t", None).unwrap();

        let finished = Rc::new(RefCell::new(0u32));
        let observed = Rc::clone(&finished);
        rt.connect(task, SIGNAL_FINISHED, task, ConnectionType::Direct, move |_, _| {
            *observed.borrow_mut() += 1;
        })
        .unwrap();

        process_object(&mut rt, task, ConnectionType::Queued).unwrap();
        assert_eq!(*finished.borrow(), 0);
        rt.run();
        assert_eq!(*finished.borrow(), 1);
    }

    #[test]
    fn objects_without_meta_are_skipped() {
        struct Plain;
        impl Object for Plain {}

        let mut rt = Runtime::new();
        let id = rt.spawn("plain", None, |_| Plain).unwrap();
        process_object(&mut rt, id, ConnectionType::Direct).unwrap();
        assert_eq!(rt.pending_events(), 0);
    }
}
