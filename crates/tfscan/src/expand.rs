//! count, for_each and dynamic block expansion
//!
//! The phases always run in this order:
//! 1. `count` settles how many instances of a resource or module exist
//! 2. `for_each` runs on whatever `count` left unexpanded
//! 3. `dynamic` blocks are expanded inside each resulting instance, so their content can
//!    refer to the instance's `each.*`/`count.*`
//!
//! Templates replaced by clones do not appear in the result. A clone is marked expanded and is
//! never expanded again.
use crate::block::{BlockId, InstanceKey};
use crate::graph::Graph;
use crate::value::Value;

/// Counts above this are treated as unresolved
pub const MAX_COUNT: usize = 10_000;

pub fn expand_blocks(graph: &mut Graph, blocks: &[BlockId]) -> Vec<BlockId> {
    let counted = expand_counts(graph, blocks);
    let blocks = expand_for_each(graph, &counted);
    for block in &blocks {
        expand_dynamic_block(graph, *block);
    }
    blocks
}

pub fn expand_counts(graph: &mut Graph, blocks: &[BlockId]) -> Vec<BlockId> {
    let mut count_filtered = vec![];

    for &id in blocks {
        let block = graph.block(id);
        let qualifies =
            !block.expanded && matches!(block.block_type.as_str(), "resource" | "module");

        let count = match qualifies.then(|| graph.attribute_value(id, "count")).flatten() {
            Some(Value::Number(count)) => count,
            _ => {
                count_filtered.push(id);
                continue;
            }
        };

        let count = count.as_f64().unwrap_or_default().floor().max(0.0);
        if count > MAX_COUNT as f64 {
            tracing::warn!(block=%graph.block(id).full_name(), count, "count too large, not expanded");
            count_filtered.push(id);
            continue;
        }

        for index in 0..count as usize {
            let clone = graph.clone_block(id, InstanceKey::Index(index));
            let context = graph.block(clone).context;
            graph
                .contexts_mut()
                .set_by_dot(context, "count.index", index.into());

            tracing::debug!(block=%graph.block(clone).full_name(), "added from count");
            count_filtered.push(clone);
        }
    }

    count_filtered
}

pub fn expand_for_each(graph: &mut Graph, blocks: &[BlockId]) -> Vec<BlockId> {
    let mut for_each_filtered = vec![];

    for &id in blocks {
        let block = graph.block(id);
        let qualifies = !block.expanded
            && matches!(
                block.block_type.as_str(),
                "resource" | "module" | "dynamic"
            );

        let Some(for_each) = qualifies.then(|| graph.attribute_value(id, "for_each")).flatten()
        else {
            for_each_filtered.push(id);
            continue;
        };

        if for_each.is_null() || !for_each.is_known() || !for_each.is_iterable() {
            tracing::debug!(block=%block.full_name(), "for_each yields no instances");
            continue;
        }

        let alias = iterator_name(graph, id);

        for (key, value) in for_each.pairs() {
            let clone = graph.clone_block(id, InstanceKey::Key(key.clone()));
            copy_variables(graph, id, clone);

            let context = graph.block(clone).context;
            let contexts = graph.contexts_mut();
            contexts.set_by_dot(context, "each.key", key.clone());
            contexts.set_by_dot(context, "each.value", value.clone());
            if let Some(alias) = &alias {
                contexts.set(context, &[alias.as_str(), "key"], key);
                contexts.set(context, &[alias.as_str(), "value"], value);
            }

            tracing::debug!(block=%graph.block(clone).full_name(), "added from for_each");
            for_each_filtered.push(clone);
        }
    }

    for_each_filtered
}

/// Name the instance's key and value are exposed under besides `each`
///
/// The type label, or for dynamic blocks an explicit `iterator = name`.
fn iterator_name(graph: &Graph, id: BlockId) -> Option<String> {
    let block = graph.block(id);
    if block.block_type == "dynamic" {
        if let Some(hcl::Expression::Variable(iterator)) =
            block.attributes.get("iterator").map(|attribute| &attribute.expr)
        {
            return Some(iterator.as_str().to_string());
        }
    }
    block.type_label().map(ToString::to_string)
}

/// Make the template's resolved value available under the clone's label as well
fn copy_variables(graph: &mut Graph, from: BlockId, to: BlockId) {
    let template = graph.block(from);
    let (base, from_label) = match template.block_type.as_str() {
        "resource" => match (template.type_label(), template.name_label()) {
            (Some(type_label), Some(name_label)) => (type_label, name_label),
            _ => return,
        },
        "module" => match template.type_label() {
            Some(name) => ("module", name),
            None => return,
        },
        _ => return,
    };
    let Some(to_label) = graph.block(to).instance_label() else {
        return;
    };

    let contexts = graph.contexts();
    let root = contexts.root(template.context);
    let Some(value) = contexts.get(root, &[base, from_label]).cloned() else {
        tracing::trace!(base, from_label, "nothing to copy for clone");
        return;
    };

    let base = base.to_string();
    graph
        .contexts_mut()
        .set(root, &[base.as_str(), to_label.as_str()], value);
}

/// Expand the dynamic blocks nested in `id`, innermost first
pub fn expand_dynamic_block(graph: &mut Graph, id: BlockId) {
    let children = graph.block(id).children.clone();
    for child in &children {
        expand_dynamic_block(graph, *child);
    }

    for &child in &children {
        let dynamic = graph.block(child);
        if dynamic.block_type != "dynamic" || dynamic.expanded {
            continue;
        }
        let Some(target) = dynamic.type_label().map(ToString::to_string) else {
            continue;
        };

        // unknown for now, maybe resolvable once an enclosing dynamic block is expanded
        match graph.attribute_value(child, "for_each") {
            Some(for_each) if for_each.is_known() => {}
            _ => continue,
        }

        let instances = expand_for_each(graph, &[child]);
        graph.block_mut(child).expanded = true;

        for instance in instances {
            let Some(content) = graph.child_of_type(instance, "content") else {
                continue;
            };
            expand_dynamic_block(graph, content);
            graph.attach_child(id, content, &target);
        }
    }
}
