//! hierarchical variable bindings
//!
//! All contexts of a run live in one arena ([Contexts]) and are addressed by [ContextId].
//! Each node holds its own top-level bindings (`var`, `local`, `aws_instance`, `each`, ...)
//! and an optional parent. Lookups fall through to the parent when a path is not bound
//! locally.
//!
//! Bindings are never removed. A binding is replaced by setting the same path again.
use crate::value::{Object, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(usize);

#[derive(Debug)]
struct Node {
    parent: Option<ContextId>,
    variables: Object,
}

#[derive(Debug, Default)]
pub struct Contexts {
    nodes: Vec<Node>,
}

impl Contexts {
    pub fn new_root(&mut self) -> ContextId {
        self.push(None)
    }

    pub fn new_child(&mut self, parent: ContextId) -> ContextId {
        self.push(Some(parent))
    }

    fn push(&mut self, parent: Option<ContextId>) -> ContextId {
        let id = ContextId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            variables: Default::default(),
        });
        id
    }

    pub fn parent(&self, id: ContextId) -> Option<ContextId> {
        self.nodes[id.0].parent
    }

    /// Topmost ancestor
    pub fn root(&self, mut id: ContextId) -> ContextId {
        while let Some(parent) = self.parent(id) {
            id = parent;
        }
        id
    }

    /// Bindings of this node only, without anything inherited
    pub fn inner(&self, id: ContextId) -> &Object {
        &self.nodes[id.0].variables
    }

    /// Bind `value` at `path` (e.g. `["module", "network"]`)
    pub fn set<S: AsRef<str>>(&mut self, id: ContextId, path: &[S], value: Value) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };

        tracing::trace!(path=?path.iter().map(AsRef::as_ref).collect::<Vec<_>>(), "bind");
        self.nodes[id.0]
            .variables
            .entry(first.as_ref().to_string())
            .or_insert(Value::Null)
            .set(rest, value);
    }

    /// Bind `value` at a dotted path (e.g. `"each.key"`)
    pub fn set_by_dot(&mut self, id: ContextId, dotted: &str, value: Value) {
        let path: Vec<&str> = dotted.split('.').collect();
        self.set(id, &path, value);
    }

    /// Look up `path`, falling through to ancestors when it is not bound here
    pub fn get<S: AsRef<str>>(&self, id: ContextId, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let node = &self.nodes[id.0];

        if let Some(value) = node
            .variables
            .get(first.as_ref())
            .and_then(|value| value.get(rest))
        {
            return Some(value);
        }

        node.parent.and_then(|parent| self.get(parent, path))
    }

    pub fn get_by_dot(&self, id: ContextId, dotted: &str) -> Option<&Value> {
        let path: Vec<&str> = dotted.split('.').collect();
        self.get(id, &path)
    }

    /// All bindings visible from `id`
    ///
    /// Ancestor objects are merged with descendant objects, the descendant wins on conflict.
    pub fn visible(&self, id: ContextId) -> Object {
        let mut chain = vec![id];
        while let Some(parent) = self.parent(*chain.last().expect("chain is never empty")) {
            chain.push(parent);
        }

        let mut merged = Value::object();
        for id in chain.into_iter().rev() {
            merged.merge(&Value::Object(self.inner(id).clone()));
        }

        match merged {
            Value::Object(object) => object,
            _ => Default::default(),
        }
    }

    /// Build an [hcl::eval::Context] with every visible binding and the builtin functions
    pub fn eval_context(&self, id: ContextId) -> hcl::eval::Context<'static> {
        let mut context = hcl::eval::Context::new();
        crate::functions::declare(&mut context);

        for (name, value) in self.visible(id) {
            if let Some(value) = value.to_hcl() {
                context.declare_var(name, value);
            }
        }

        context
    }

    /// Copy the context `id` (which must descend from `template`) for a block cloned from `template`
    ///
    /// `template` itself maps to `clone`. Every other context between `id` and `template` is
    /// copied once and re-parented, recorded in `mapping`, so that a cloned subtree never shares
    /// a context with the template.
    pub fn clone_for(
        &mut self,
        id: ContextId,
        template: ContextId,
        clone: ContextId,
        mapping: &mut std::collections::HashMap<ContextId, ContextId>,
    ) -> ContextId {
        if id == template {
            return clone;
        }
        if let Some(mapped) = mapping.get(&id) {
            return *mapped;
        }

        let copy = match self.parent(id) {
            // not below the template, nothing to re-parent
            None => id,
            Some(parent) => {
                let parent = self.clone_for(parent, template, clone, mapping);
                let copy = self.new_child(parent);
                self.nodes[copy.0].variables = self.nodes[id.0].variables.clone();
                copy
            }
        };

        mapping.insert(id, copy);
        copy
    }
}
