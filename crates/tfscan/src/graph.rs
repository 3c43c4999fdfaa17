//! arena of blocks and their contexts
//!
//! Every block of a run, including all clones produced by expansion and all blocks of all
//! modules, lives in one [Graph] and is addressed by a stable [BlockId]. Nested blocks are
//! referenced by id, so splicing a block into a parent ([Graph::attach_child]) never aliases
//! a mutable tree.
use crate::block::{Block, BlockId, InstanceKey, ParsedBlock};
use crate::context::{ContextId, Contexts};
use crate::query::BlockRef;
use crate::value::{Object, Value};
use hcl::eval::Evaluate;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Graph {
    blocks: Vec<Block>,
    contexts: Contexts,
}

impl Graph {
    pub fn contexts(&self) -> &Contexts {
        &self.contexts
    }

    pub fn contexts_mut(&mut self) -> &mut Contexts {
        &mut self.contexts
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0]
    }

    /// Read-only view used by rule checks
    pub fn get(&self, id: BlockId) -> BlockRef<'_> {
        BlockRef::new(self, id)
    }

    /// Insert a parsed block (and all nested blocks) bound to `context`
    pub fn insert(
        &mut self,
        parsed: ParsedBlock,
        context: ContextId,
        module: Option<&str>,
    ) -> BlockId {
        let children = parsed
            .blocks
            .into_iter()
            .map(|nested| self.insert(nested, context, module))
            .collect();

        let id = BlockId(self.blocks.len());
        self.blocks.push(Block {
            block_type: parsed.block_type,
            labels: parsed.labels,
            attributes: parsed
                .attributes
                .into_iter()
                .map(|attribute| (attribute.name.clone(), attribute.into()))
                .collect(),
            children,
            range: parsed.range,
            context,
            expanded: false,
            instance: None,
            module: module.map(ToString::to_string),
        });
        id
    }

    /// Deep copy `id` into a new block with its own context
    ///
    /// The clone's context is a child of the template's context. The clone is marked as
    /// expanded and carries `instance` as its key.
    pub fn clone_block(&mut self, id: BlockId, instance: InstanceKey) -> BlockId {
        let template_context = self.blocks[id.0].context;
        let clone_context = self.contexts.new_child(template_context);

        let mut mapping = HashMap::new();
        let clone = self.deep_copy(id, template_context, clone_context, &mut mapping);

        let block = &mut self.blocks[clone.0];
        tracing::trace!(template=%block.reference(), %instance, "clone");
        block.instance = Some(instance);
        block.expanded = true;
        clone
    }

    fn deep_copy(
        &mut self,
        id: BlockId,
        template_context: ContextId,
        clone_context: ContextId,
        mapping: &mut HashMap<ContextId, ContextId>,
    ) -> BlockId {
        let mut copy = self.blocks[id.0].clone();
        copy.context =
            self.contexts
                .clone_for(copy.context, template_context, clone_context, mapping);

        let mut children = Vec::with_capacity(copy.children.len());
        for child in &copy.children {
            children.push(self.deep_copy(*child, template_context, clone_context, mapping));
        }
        copy.children = children;

        let id = BlockId(self.blocks.len());
        self.blocks.push(copy);
        id
    }

    /// Append `child` to `parent`'s nested blocks, re-typed as `block_type`
    ///
    /// Returns the parent.
    pub fn attach_child(&mut self, parent: BlockId, child: BlockId, block_type: &str) -> BlockId {
        let block = &mut self.blocks[child.0];
        block.block_type = block_type.to_string();
        block.labels.clear();

        self.blocks[parent.0].children.push(child);
        parent
    }

    /// First nested block of type `block_type`
    pub fn child_of_type(&self, id: BlockId, block_type: &str) -> Option<BlockId> {
        self.blocks[id.0]
            .children
            .iter()
            .copied()
            .find(|child| self.blocks[child.0].block_type == block_type)
    }

    /// Evaluate a single attribute in the block's context
    ///
    /// `None` when the block has no such attribute, [Value::Unknown] when it can't be resolved.
    pub fn attribute_value(&self, id: BlockId, name: &str) -> Option<Value> {
        let block = &self.blocks[id.0];
        let attribute = block.attributes.get(name)?;
        let context = self.contexts.eval_context(block.context);
        Some(evaluate(&context, &attribute.expr))
    }

    /// All attributes of a block, evaluated
    pub fn attribute_values(&self, id: BlockId) -> Object {
        let block = &self.blocks[id.0];
        let context = self.contexts.eval_context(block.context);

        block
            .attributes
            .iter()
            .map(|(name, attribute)| (name.clone(), evaluate(&context, &attribute.expr)))
            .collect()
    }

    /// Object of all attributes and nested blocks (as lists, grouped by type)
    pub fn values(&self, id: BlockId) -> Value {
        let mut values = self.attribute_values(id);

        for child in &self.blocks[id.0].children {
            let block_type = &self.blocks[child.0].block_type;
            if block_type == "dynamic" {
                continue;
            }
            let nested = self.values(*child);
            match values
                .entry(block_type.clone())
                .or_insert_with(|| Value::List(vec![]))
            {
                Value::List(list) => list.push(nested),
                // an attribute with the same name wins
                _ => {}
            }
        }

        Value::Object(values)
    }
}

pub(crate) fn evaluate(context: &hcl::eval::Context, expr: &hcl::Expression) -> Value {
    match expr.evaluate(context) {
        Ok(value) => value.into(),
        Err(errors) => {
            tracing::trace!(%errors, "unresolved expression");
            Value::Unknown
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::ParsedAttribute;
    use pretty_assertions::assert_eq;

    fn expr(source: &str) -> hcl::Expression {
        source
            .parse::<hcl_edit::expr::Expression>()
            .expect("valid expression")
            .into()
    }

    fn resource_with_nested() -> ParsedBlock {
        let mut block = ParsedBlock::new(
            "resource".to_string(),
            vec!["aws_security_group".to_string(), "sg".to_string()],
        );
        block
            .attributes
            .push(ParsedAttribute::new("name".to_string(), expr("var.name")));
        let mut ingress = ParsedBlock::new("ingress".to_string(), vec![]);
        ingress
            .attributes
            .push(ParsedAttribute::new("port".to_string(), expr("443")));
        block.blocks.push(ingress);
        block
    }

    #[test]
    fn values_include_nested_blocks() {
        let mut graph = Graph::default();
        let root = graph.contexts_mut().new_root();
        graph
            .contexts_mut()
            .set_by_dot(root, "var.name", "web".into());
        let id = graph.insert(resource_with_nested(), root, None);

        let values = graph.values(id);
        assert_eq!(values.get(&["name"]), Some(&Value::from("web")));
        assert_eq!(
            values.get(&["ingress"]),
            Some(&Value::List(vec![{
                let mut ingress = Value::object();
                ingress.set(&["port"], Value::from(443i64));
                ingress
            }]))
        );
    }

    #[test]
    fn missing_reference_is_unknown() {
        let mut graph = Graph::default();
        let root = graph.contexts_mut().new_root();
        let id = graph.insert(resource_with_nested(), root, None);

        assert_eq!(graph.attribute_value(id, "name"), Some(Value::Unknown));
        assert_eq!(graph.attribute_value(id, "missing"), None);
    }

    #[test]
    fn clones_get_their_own_contexts() {
        let mut graph = Graph::default();
        let root = graph.contexts_mut().new_root();
        let template_context = graph.contexts_mut().new_child(root);
        let template = graph.insert(resource_with_nested(), template_context, None);

        let clone = graph.clone_block(template, InstanceKey::Index(0));

        let clone_block = graph.block(clone);
        assert!(clone_block.expanded);
        assert_ne!(clone_block.context, template_context);
        assert_eq!(
            graph.contexts().parent(clone_block.context),
            Some(template_context)
        );
        let nested = clone_block.children[0];
        assert_ne!(nested, graph.block(template).children[0]);
        assert_eq!(graph.block(nested).context, clone_block.context);
        assert!(!graph.block(template).expanded);
    }

    #[test]
    fn attach_child_retypes() {
        let mut graph = Graph::default();
        let root = graph.contexts_mut().new_root();
        let parent = graph.insert(resource_with_nested(), root, None);
        let content = graph.insert(ParsedBlock::new("content".to_string(), vec![]), root, None);

        assert_eq!(graph.attach_child(parent, content, "egress"), parent);
        assert_eq!(graph.child_of_type(parent, "egress"), Some(content));
        assert_eq!(graph.block(content).block_type, "egress");
    }
}
