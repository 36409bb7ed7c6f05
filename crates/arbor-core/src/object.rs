//! Object tree with parent-child ownership.
//!
//! Every object lives in an arena keyed by [`ObjectId`] and belongs to at most
//! one parent, fixed at creation. Destroying an object destroys its whole
//! subtree, children before parents, and invalidates every id in the subtree.

use std::any::Any;
use std::fmt;

use slotmap::{SlotMap, new_key_type};

use crate::event::Event;
use crate::meta::MetaObject;
use crate::runtime::Runtime;

new_key_type! {
    /// Unique identifier for an object in the tree.
    ///
    /// Ids are generational: once an object is destroyed its id is never
    /// valid again, even if the underlying slot is reused.
    pub struct ObjectId;
}

/// Errors from object tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// The object id does not refer to a live object. Returned for
    /// already-destroyed ids and for ids from another registry.
    InvalidObjectId,
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidObjectId => write!(f, "Invalid or destroyed object id"),
        }
    }
}

impl std::error::Error for ObjectError {}

/// A specialized Result type for object tree operations.
pub type ObjectResult<T> = std::result::Result<T, ObjectError>;

/// Behavior attached to a node in the object tree.
///
/// Implementations opt into reflection by returning a static member table
/// from [`meta_object`](Object::meta_object), and into event delivery by
/// overriding [`event`](Object::event). The default implementation describes
/// a plain tree node: no members, no event handling.
pub trait Object: Any {
    /// The static member table for this type, if it exposes one.
    fn meta_object(&self) -> Option<&'static MetaObject> {
        None
    }

    /// Handle an event delivered to this object.
    ///
    /// The object is detached from its registry slot for the duration of the
    /// call, so the handler may freely mutate the runtime (emit, connect,
    /// destroy, arm timers) through `rt`. Return `true` if the event was
    /// recognized and handled.
    fn event(&mut self, rt: &mut Runtime, self_id: ObjectId, event: &Event) -> bool {
        let _ = (rt, self_id, event);
        false
    }
}

/// Downcast a borrowed object to a concrete type.
pub fn object_cast<T: Object>(object: &dyn Object) -> Option<&T> {
    (object as &dyn Any).downcast_ref::<T>()
}

/// Downcast a mutably borrowed object to a concrete type.
pub fn object_cast_mut<T: Object>(object: &mut dyn Object) -> Option<&mut T> {
    (object as &mut dyn Any).downcast_mut::<T>()
}

struct ObjectEntry {
    name: String,
    type_name: &'static str,
    meta: Option<&'static MetaObject>,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    /// Taken out of the slot while the object handles an event or method
    /// invocation, so the handler can borrow the runtime mutably.
    instance: Option<Box<dyn Object>>,
}

/// Arena of live objects plus the parent-child edges between them.
///
/// The registry tracks structure and names; dispatch and lifetime policy
/// (purging bindings and timers on destroy) live in [`Runtime`].
#[derive(Default)]
pub struct ObjectRegistry {
    objects: SlotMap<ObjectId, ObjectEntry>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object, optionally attached to a live parent.
    ///
    /// `build` receives the new object's id so the instance can store it.
    /// Children are appended in creation order, which is the order every
    /// traversal visits them in.
    ///
    /// Returns [`ObjectError::InvalidObjectId`] if `parent` is given but
    /// not alive.
    pub fn spawn<T, F>(
        &mut self,
        name: impl Into<String>,
        parent: Option<ObjectId>,
        build: F,
    ) -> ObjectResult<ObjectId>
    where
        T: Object,
        F: FnOnce(ObjectId) -> T,
    {
        if let Some(p) = parent
            && !self.objects.contains_key(p)
        {
            return Err(ObjectError::InvalidObjectId);
        }
        let name = name.into();
        let id = self.objects.insert_with_key(|id| {
            let instance = build(id);
            let meta = instance.meta_object();
            ObjectEntry {
                name,
                type_name: std::any::type_name::<T>(),
                meta,
                parent,
                children: Vec::new(),
                instance: Some(Box::new(instance)),
            }
        });
        if let Some(p) = parent
            && let Some(entry) = self.objects.get_mut(p)
        {
            entry.children.push(id);
        }
        tracing::trace!(
            target: "arbor_core::object",
            ?id,
            ?parent,
            type_name = self.objects[id].type_name,
            "object created"
        );
        Ok(id)
    }

    /// Destroy an object and its entire subtree.
    ///
    /// Returns the destroyed ids in destruction order: post-order, children
    /// (in creation order) before their parent, the root last. Every
    /// returned id is invalid afterwards.
    pub fn destroy(&mut self, id: ObjectId) -> ObjectResult<Vec<ObjectId>> {
        let mut removed = Vec::new();
        self.collect_postorder(id, &mut removed)?;

        // Detach the root from its parent before dropping the subtree.
        if let Some(parent) = self.objects.get(id).and_then(|entry| entry.parent)
            && let Some(entry) = self.objects.get_mut(parent)
        {
            entry.children.retain(|&child| child != id);
        }

        for &doomed in &removed {
            self.objects.remove(doomed);
        }
        tracing::trace!(
            target: "arbor_core::object",
            ?id,
            destroyed = removed.len(),
            "object subtree destroyed"
        );
        Ok(removed)
    }

    fn collect_postorder(&self, id: ObjectId, out: &mut Vec<ObjectId>) -> ObjectResult<()> {
        let entry = self.objects.get(id).ok_or(ObjectError::InvalidObjectId)?;
        for &child in &entry.children {
            self.collect_postorder(child, out)?;
        }
        out.push(id);
        Ok(())
    }

    /// Whether `id` refers to a live object.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn name(&self, id: ObjectId) -> ObjectResult<&str> {
        self.entry(id).map(|entry| entry.name.as_str())
    }

    pub fn set_name(&mut self, id: ObjectId, name: impl Into<String>) -> ObjectResult<()> {
        let entry = self.objects.get_mut(id).ok_or(ObjectError::InvalidObjectId)?;
        entry.name = name.into();
        Ok(())
    }

    /// The concrete Rust type name the object was created with.
    pub fn type_name(&self, id: ObjectId) -> ObjectResult<&'static str> {
        self.entry(id).map(|entry| entry.type_name)
    }

    /// The static member table captured at creation, if the type has one.
    pub fn meta(&self, id: ObjectId) -> ObjectResult<Option<&'static MetaObject>> {
        self.entry(id).map(|entry| entry.meta)
    }

    pub fn parent(&self, id: ObjectId) -> ObjectResult<Option<ObjectId>> {
        self.entry(id).map(|entry| entry.parent)
    }

    /// Direct children in creation order.
    pub fn children(&self, id: ObjectId) -> ObjectResult<&[ObjectId]> {
        self.entry(id).map(|entry| entry.children.as_slice())
    }

    /// First direct child with the given name, in creation order.
    pub fn find_child_by_name(&self, id: ObjectId, name: &str) -> ObjectResult<Option<ObjectId>> {
        let entry = self.entry(id)?;
        Ok(entry
            .children
            .iter()
            .copied()
            .find(|&child| self.objects.get(child).is_some_and(|c| c.name == name)))
    }

    /// Objects with no parent.
    pub fn roots(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, entry)| entry.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// Lazy pre-order traversal of the strict descendants of `id` (the root
    /// itself is not yielded). The iterator borrows the registry, so it can
    /// be restarted cheaply by calling `descendants` again.
    pub fn descendants(&self, id: ObjectId) -> Descendants<'_> {
        let stack = self
            .objects
            .get(id)
            .map(|entry| entry.children.iter().rev().copied().collect())
            .unwrap_or_default();
        Descendants { registry: self, stack }
    }

    /// Descendants whose `(id, name)` satisfy the predicate, in pre-order.
    pub fn find_descendants<'a, P>(
        &'a self,
        id: ObjectId,
        predicate: P,
    ) -> impl Iterator<Item = ObjectId> + 'a
    where
        P: Fn(ObjectId, &str) -> bool + 'a,
    {
        self.descendants(id).filter(move |&d| {
            self.objects
                .get(d)
                .is_some_and(|entry| predicate(d, &entry.name))
        })
    }

    /// The subtree rooted at `id` in pre-order, root first.
    pub fn preorder(&self, id: ObjectId) -> ObjectResult<Vec<ObjectId>> {
        self.entry(id)?;
        let mut out = vec![id];
        out.extend(self.descendants(id));
        Ok(out)
    }

    /// The subtree rooted at `id` in post-order, root last. This is the
    /// order [`destroy`](Self::destroy) tears the subtree down in.
    pub fn postorder(&self, id: ObjectId) -> ObjectResult<Vec<ObjectId>> {
        let mut out = Vec::new();
        self.collect_postorder(id, &mut out)?;
        Ok(out)
    }

    /// Borrow the live instance, if it is in its slot.
    pub fn instance(&self, id: ObjectId) -> Option<&dyn Object> {
        self.objects.get(id)?.instance.as_deref()
    }

    pub(crate) fn take_instance(&mut self, id: ObjectId) -> Option<Box<dyn Object>> {
        self.objects.get_mut(id)?.instance.take()
    }

    pub(crate) fn put_instance(&mut self, id: ObjectId, instance: Box<dyn Object>) {
        // The slot may be gone if the handler destroyed its own subtree; the
        // instance is simply dropped in that case.
        if let Some(entry) = self.objects.get_mut(id) {
            entry.instance = Some(instance);
        }
    }

    fn entry(&self, id: ObjectId) -> ObjectResult<&ObjectEntry> {
        self.objects.get(id).ok_or(ObjectError::InvalidObjectId)
    }
}

/// Lazy pre-order iterator over strict descendants.
pub struct Descendants<'a> {
    registry: &'a ObjectRegistry,
    stack: Vec<ObjectId>,
}

impl Iterator for Descendants<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        let id = self.stack.pop()?;
        if let Some(entry) = self.registry.objects.get(id) {
            self.stack.extend(entry.children.iter().rev().copied());
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node;
    impl Object for Node {}

    fn node(registry: &mut ObjectRegistry, name: &str, parent: Option<ObjectId>) -> ObjectId {
        registry.spawn(name, parent, |_| Node).unwrap()
    }

    #[test]
    fn spawn_links_parent_and_children_in_creation_order() {
        let mut registry = ObjectRegistry::new();
        let root = node(&mut registry, "root", None);
        let a = node(&mut registry, "a", Some(root));
        let b = node(&mut registry, "b", Some(root));

        assert_eq!(registry.parent(root).unwrap(), None);
        assert_eq!(registry.parent(a).unwrap(), Some(root));
        assert_eq!(registry.children(root).unwrap(), &[a, b]);
        assert_eq!(registry.name(b).unwrap(), "b");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn spawn_with_destroyed_parent_fails() {
        let mut registry = ObjectRegistry::new();
        let root = node(&mut registry, "root", None);
        registry.destroy(root).unwrap();

        let result = registry.spawn("orphan", Some(root), |_| Node);
        assert_eq!(result.unwrap_err(), ObjectError::InvalidObjectId);
    }

    #[test]
    fn destroy_returns_postorder_and_invalidates_subtree() {
        let mut registry = ObjectRegistry::new();
        let root = node(&mut registry, "root", None);
        let a = node(&mut registry, "a", Some(root));
        let a1 = node(&mut registry, "a1", Some(a));
        let b = node(&mut registry, "b", Some(root));

        let removed = registry.destroy(root).unwrap();
        assert_eq!(removed, vec![a1, a, b, root]);
        for id in removed {
            assert!(!registry.contains(id));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn destroy_detaches_from_parent() {
        let mut registry = ObjectRegistry::new();
        let root = node(&mut registry, "root", None);
        let a = node(&mut registry, "a", Some(root));
        let b = node(&mut registry, "b", Some(root));

        registry.destroy(a).unwrap();
        assert_eq!(registry.children(root).unwrap(), &[b]);
        assert!(registry.contains(root));
    }

    #[test]
    fn double_destroy_is_an_error() {
        let mut registry = ObjectRegistry::new();
        let root = node(&mut registry, "root", None);
        registry.destroy(root).unwrap();
        assert_eq!(registry.destroy(root).unwrap_err(), ObjectError::InvalidObjectId);
        assert_eq!(registry.name(root).unwrap_err(), ObjectError::InvalidObjectId);
    }

    #[test]
    fn descendants_are_preorder_and_restartable() {
        let mut registry = ObjectRegistry::new();
        let root = node(&mut registry, "root", None);
        let a = node(&mut registry, "a", Some(root));
        let a1 = node(&mut registry, "a1", Some(a));
        let a2 = node(&mut registry, "a2", Some(a));
        let b = node(&mut registry, "b", Some(root));

        let first: Vec<_> = registry.descendants(root).collect();
        assert_eq!(first, vec![a, a1, a2, b]);
        // The iterator borrows the registry, restarting is a fresh call.
        let second: Vec<_> = registry.descendants(root).collect();
        assert_eq!(first, second);

        assert_eq!(registry.preorder(root).unwrap(), vec![root, a, a1, a2, b]);
        assert_eq!(registry.postorder(root).unwrap(), vec![a1, a2, a, b, root]);
    }

    #[test]
    fn find_child_and_descendants_by_name() {
        let mut registry = ObjectRegistry::new();
        let root = node(&mut registry, "root", None);
        let alpha = node(&mut registry, "alpha-task", Some(root));
        let beta = node(&mut registry, "beta", Some(root));
        let gamma = node(&mut registry, "gamma-task", Some(beta));

        assert_eq!(registry.find_child_by_name(root, "beta").unwrap(), Some(beta));
        assert_eq!(registry.find_child_by_name(root, "gamma-task").unwrap(), None);

        let tasks: Vec<_> = registry
            .find_descendants(root, |_, name| name.contains("task"))
            .collect();
        assert_eq!(tasks, vec![alpha, gamma]);
    }

    #[test]
    fn take_and_put_instance_round_trip() {
        let mut registry = ObjectRegistry::new();
        let root = node(&mut registry, "root", None);

        let instance = registry.take_instance(root).unwrap();
        assert!(registry.instance(root).is_none());
        assert!(registry.take_instance(root).is_none());
        registry.put_instance(root, instance);
        assert!(registry.instance(root).is_some());
    }

    #[test]
    fn object_cast_downcasts_concrete_types() {
        struct Special(u32);
        impl Object for Special {}

        let mut registry = ObjectRegistry::new();
        let id = registry.spawn("special", None, |_| Special(7)).unwrap();

        let instance = registry.instance(id).unwrap();
        assert_eq!(object_cast::<Special>(instance).unwrap().0, 7);
        assert!(object_cast::<Node>(instance).is_none());
    }
}
