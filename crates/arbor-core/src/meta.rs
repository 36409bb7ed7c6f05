//! Reflective member tables and the global type registry.
//!
//! Each reflective type exposes a static [`MetaObject`]: the names of the
//! signals it can emit and the methods that can be invoked on it by name.
//! Tables are plain `static` data built at compile time; the registry just
//! indexes them by type name so generic code (see `processor`) can probe
//! capabilities without knowing concrete types.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::connection::SignalArgs;
use crate::object::{Object, ObjectId};
use crate::runtime::Runtime;

/// Static member table for a reflective type.
#[derive(Debug, Clone, Copy)]
pub struct MetaObject {
    /// Stable type name used as the registry key.
    pub type_name: &'static str,
    /// Invocable methods, lookup by unique name.
    pub methods: &'static [MethodMeta],
    /// Signals the type may emit, lookup by unique name.
    pub signals: &'static [SignalMeta],
}

/// Descriptor for a method invocable by name.
#[derive(Debug, Clone, Copy)]
pub struct MethodMeta {
    pub name: &'static str,
    /// Trampoline that downcasts the object and calls the real method. The
    /// object is detached from its registry slot for the duration of the
    /// call, so the method can mutate the runtime freely.
    pub invoke: fn(&mut dyn Object, &mut Runtime, ObjectId, &SignalArgs),
}

/// Descriptor for a signal a type may emit.
#[derive(Debug, Clone, Copy)]
pub struct SignalMeta {
    pub name: &'static str,
}

/// A member found by unified name lookup.
#[derive(Debug, Clone, Copy)]
pub enum MemberMeta<'a> {
    Method(&'a MethodMeta),
    Signal(&'a SignalMeta),
}

impl MemberMeta<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Method(m) => m.name,
            Self::Signal(s) => s.name,
        }
    }
}

impl MetaObject {
    /// Look up an invocable method by name.
    pub fn method(&self, name: &str) -> Option<&MethodMeta> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Look up a signal by name.
    pub fn signal(&self, name: &str) -> Option<&SignalMeta> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// Unified member lookup; methods shadow signals of the same name.
    pub fn member(&self, name: &str) -> Option<MemberMeta<'_>> {
        if let Some(m) = self.method(name) {
            return Some(MemberMeta::Method(m));
        }
        self.signal(name).map(MemberMeta::Signal)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.iter().map(|m| m.name)
    }

    pub fn signal_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.signals.iter().map(|s| s.name)
    }
}

/// Errors from reflective lookup and registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaError {
    /// The type exposes no member with the requested name.
    NoSuchMember {
        type_name: &'static str,
        member: String,
    },
    /// The object's type exposes no meta-object at all.
    NoMetaObject { type_name: &'static str },
    /// A meta-object with the same type name is already registered.
    TypeAlreadyRegistered { type_name: &'static str },
}

impl fmt::Display for MetaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchMember { type_name, member } => {
                write!(f, "Type '{type_name}' has no member named '{member}'")
            }
            Self::NoMetaObject { type_name } => {
                write!(f, "Type '{type_name}' has no meta-object")
            }
            Self::TypeAlreadyRegistered { type_name } => {
                write!(f, "Type '{type_name}' is already registered")
            }
        }
    }
}

impl std::error::Error for MetaError {}

/// A specialized Result type for meta operations.
pub type MetaResult<T> = std::result::Result<T, MetaError>;

/// Process-wide index of meta-objects by type name.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<&'static str, &'static MetaObject>>,
}

impl TypeRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Register a meta-object, failing if the type name is taken.
    pub fn register(&self, meta: &'static MetaObject) -> MetaResult<()> {
        let mut types = self.types.write();
        if types.contains_key(meta.type_name) {
            return Err(MetaError::TypeAlreadyRegistered {
                type_name: meta.type_name,
            });
        }
        types.insert(meta.type_name, meta);
        tracing::trace!(target: "arbor_core::meta", type_name = meta.type_name, "type registered");
        Ok(())
    }

    /// Idempotent registration. The first table registered for a type name
    /// wins; later calls with the same name are no-ops.
    pub fn ensure(&self, meta: &'static MetaObject) {
        self.types.write().entry(meta.type_name).or_insert(meta);
    }

    pub fn lookup(&self, type_name: &str) -> Option<&'static MetaObject> {
        self.types.read().get(type_name).copied()
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.types.read().contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.types.read().keys().copied().collect()
    }
}

static TYPE_REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

/// The global type registry, created on first use.
pub fn type_registry() -> &'static TypeRegistry {
    TYPE_REGISTRY.get_or_init(TypeRegistry::new)
}
