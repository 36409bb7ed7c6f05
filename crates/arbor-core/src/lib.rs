//! Arbor: a minimal object/event runtime.
//!
//! Arbor gives plain Rust types the object-model conveniences of a GUI
//! framework, without the GUI: named objects in parent-owned trees with
//! cascading destruction, name-based reflection over signals and methods,
//! signal/slot bindings with immediate or queued delivery, and a
//! single-threaded event loop with one-shot and repeating timers.
//!
//! Everything hangs off one [`Runtime`] value. Callbacks receive
//! `&mut Runtime`, so slots and event handlers can spawn, destroy, connect,
//! emit and arm timers while running.
//!
//! # Example
//!
//! ```
//! use arbor_core::{ConnectionType, Runtime, SignalArgs};
//! use arbor_core::tasks::{METHOD_START, SIGNAL_FINISHED, Task};
//!
//! let mut rt = Runtime::new();
//! let root = Task::spawn(&mut rt, "build", None).unwrap();
//! let child = Task::spawn(&mut rt, "link", Some(root)).unwrap();
//!
//! rt.connect(child, SIGNAL_FINISHED, root, ConnectionType::Direct, |_, _| {
//!     println!("link step done");
//! })
//! .unwrap();
//!
//! rt.invoke_method(child, METHOD_START, SignalArgs::none(), ConnectionType::Direct)
//!     .unwrap();
//!
//! // Destroying the root destroys the child and drops the binding.
//! rt.destroy(root).unwrap();
//! assert!(!rt.contains(child));
//! ```

mod connection;
mod error;
mod event;
pub mod logging;
pub mod meta;
pub mod object;
mod processor;
mod runtime;
pub mod tasks;
mod timer;

pub use connection::{BindingId, ConnectionType, SignalArgs, Slot};
pub use error::{ArborError, Result, TimerError};
pub use event::Event;
pub use logging::{ObjectTreeDebug, TreeFormatOptions, TreeStyle};
pub use meta::{
    MemberMeta, MetaError, MetaObject, MetaResult, MethodMeta, SignalMeta, TypeRegistry,
    type_registry,
};
pub use object::{
    Descendants, Object, ObjectError, ObjectId, ObjectRegistry, ObjectResult, object_cast,
    object_cast_mut,
};
pub use processor::process_object;
pub use runtime::{LoopState, Runtime};
pub use tasks::{
    DeadlineTask, DeferredStart, DelayedTask, StartFilter, Task, TaskManager, register_task_types,
};
pub use timer::{TimerId, TimerKind, TimerManager};
