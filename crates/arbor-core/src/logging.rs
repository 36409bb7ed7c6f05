//! Logging support: tracing target names and an object tree formatter.
//!
//! All tracing calls in this crate use targets under the `arbor_core`
//! prefix, so a filter like `arbor_core::event_loop=trace` scopes output to
//! one subsystem.

use std::fmt::Write as _;

use crate::object::{ObjectId, ObjectRegistry, ObjectResult};

/// Tracing target names used throughout the crate.
pub mod targets {
    /// Everything in the crate.
    pub const CORE: &str = "arbor_core";
    /// Object lifecycle: create, destroy, reparent-free tree edits.
    pub const OBJECT: &str = "arbor_core::object";
    /// Signal connections and emissions.
    pub const SIGNAL: &str = "arbor_core::signal";
    /// Timer arming, canceling and firing.
    pub const TIMER: &str = "arbor_core::timer";
    /// Event queue and loop lifecycle.
    pub const EVENT_LOOP: &str = "arbor_core::event_loop";
    /// Reflection: type registration and member lookup.
    pub const META: &str = "arbor_core::meta";
    /// Task objects.
    pub const TASK: &str = "arbor_core::task";
}

/// Branch drawing style for [`ObjectTreeDebug`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeStyle {
    /// Box-drawing characters.
    #[default]
    Unicode,
    /// Plain ASCII, for logs that must stay 7-bit.
    Ascii,
}

impl TreeStyle {
    fn branch(self) -> &'static str {
        match self {
            Self::Unicode => "├── ",
            Self::Ascii => "|-- ",
        }
    }

    fn last_branch(self) -> &'static str {
        match self {
            Self::Unicode => "└── ",
            Self::Ascii => "`-- ",
        }
    }

    fn pipe(self) -> &'static str {
        match self {
            Self::Unicode => "│   ",
            Self::Ascii => "|   ",
        }
    }
}

/// Options for [`ObjectTreeDebug`].
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    pub style: TreeStyle,
    /// Append the arena id to each node.
    pub show_ids: bool,
    /// Append the Rust type name to each node.
    pub show_types: bool,
    /// Stop descending below this depth; `None` means unlimited.
    pub max_depth: Option<usize>,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: false,
            show_types: true,
            max_depth: None,
        }
    }
}

/// Renders an object tree as indented text, for debug logs.
#[derive(Debug, Clone, Default)]
pub struct ObjectTreeDebug {
    options: TreeFormatOptions,
}

impl ObjectTreeDebug {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Render the subtree rooted at `root`.
    pub fn format_subtree(&self, objects: &ObjectRegistry, root: ObjectId) -> ObjectResult<String> {
        let mut out = String::new();
        out.push_str(&self.node_label(objects, root)?);
        out.push('\n');
        self.format_children(objects, root, "", 1, &mut out)?;
        Ok(out)
    }

    /// Render every root object and its subtree.
    pub fn format_all(&self, objects: &ObjectRegistry) -> String {
        let mut out = String::new();
        for root in objects.roots() {
            // Roots cannot vanish mid-walk; the registry is borrowed.
            if let Ok(tree) = self.format_subtree(objects, root) {
                out.push_str(&tree);
            }
        }
        out
    }

    fn format_children(
        &self,
        objects: &ObjectRegistry,
        id: ObjectId,
        prefix: &str,
        depth: usize,
        out: &mut String,
    ) -> ObjectResult<()> {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }
        let style = self.options.style;
        let children = objects.children(id)?;
        for (index, &child) in children.iter().enumerate() {
            let is_last = index + 1 == children.len();
            let branch = if is_last { style.last_branch() } else { style.branch() };
            let _ = write!(out, "{prefix}{branch}{}", self.node_label(objects, child)?);
            out.push('\n');
            let child_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}{}", style.pipe())
            };
            self.format_children(objects, child, &child_prefix, depth + 1, out)?;
        }
        Ok(())
    }

    fn node_label(&self, objects: &ObjectRegistry, id: ObjectId) -> ObjectResult<String> {
        let name = objects.name(id)?;
        let mut label = if name.is_empty() {
            "<unnamed>".to_string()
        } else {
            name.to_string()
        };
        if self.options.show_types {
            let _ = write!(label, " [{}]", short_type_name(objects.type_name(id)?));
        }
        if self.options.show_ids {
            let _ = write!(label, " ({id:?})");
        }
        Ok(label)
    }
}

/// Strip module paths from a type name: `arbor_core::tasks::Task` -> `Task`.
fn short_type_name(type_name: &str) -> &str {
    type_name.rsplit("::").next().unwrap_or(type_name)
}
