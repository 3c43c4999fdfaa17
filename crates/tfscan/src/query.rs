//! read-only view of resolved blocks
//!
//! Rule checks only ever see [BlockRef] and [AttributeRef]; how values were resolved stays
//! hidden behind them.
use crate::block::{Attribute, BlockId, InstanceKey, SourceRange};
use crate::graph::{evaluate, Graph};
use crate::value::Value;
use crate::visit::{Visit, VisitTraversals};
use indexmap::IndexMap;

#[derive(Clone, Copy, derive_new::new)]
pub struct BlockRef<'g> {
    graph: &'g Graph,
    id: BlockId,
}

impl std::fmt::Debug for BlockRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BlockRef").field(&self.full_name()).finish()
    }
}

impl<'g> BlockRef<'g> {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn block_type(&self) -> &'g str {
        &self.graph.block(self.id).block_type
    }

    pub fn labels(&self) -> &'g [String] {
        &self.graph.block(self.id).labels
    }

    pub fn type_label(&self) -> &'g str {
        self.graph.block(self.id).type_label().unwrap_or_default()
    }

    pub fn name_label(&self) -> &'g str {
        self.graph.block(self.id).name_label().unwrap_or_default()
    }

    pub fn instance(&self) -> Option<&'g InstanceKey> {
        self.graph.block(self.id).instance.as_ref()
    }

    pub fn module_address(&self) -> Option<&'g str> {
        self.graph.block(self.id).module.as_deref()
    }

    pub fn reference(&self) -> String {
        self.graph.block(self.id).reference()
    }

    pub fn full_name(&self) -> String {
        self.graph.block(self.id).full_name()
    }

    pub fn range(&self) -> &'g SourceRange {
        &self.graph.block(self.id).range
    }

    pub fn attribute(&self, name: &str) -> Option<AttributeRef<'g>> {
        self.graph
            .block(self.id)
            .attributes
            .get(name)
            .map(|attribute| AttributeRef::new(self.graph, self.id, attribute))
    }

    pub fn attributes(&self) -> impl Iterator<Item = AttributeRef<'g>> + 'g {
        let graph = self.graph;
        let id = self.id;
        graph
            .block(id)
            .attributes
            .values()
            .map(move |attribute| AttributeRef::new(graph, id, attribute))
    }

    /// First nested block of the given type
    pub fn block(&self, block_type: &str) -> Option<BlockRef<'g>> {
        self.blocks(block_type).into_iter().next()
    }

    pub fn blocks(&self, block_type: &str) -> Vec<BlockRef<'g>> {
        self.all_blocks()
            .into_iter()
            .filter(|child| child.block_type() == block_type)
            .collect()
    }

    /// Nested block of the given type whose first label is `label`
    pub fn labelled_block(&self, block_type: &str, label: &str) -> Option<BlockRef<'g>> {
        self.blocks(block_type)
            .into_iter()
            .find(|child| child.type_label() == label)
    }

    pub fn all_blocks(&self) -> Vec<BlockRef<'g>> {
        self.graph
            .block(self.id)
            .children
            .iter()
            .map(|child| BlockRef::new(self.graph, *child))
            .collect()
    }

    pub fn values(&self) -> Value {
        self.graph.values(self.id)
    }

    /// Serializable snapshot of this block and everything nested in it
    pub fn resolved(&self) -> ResolvedBlock {
        ResolvedBlock {
            reference: self.full_name(),
            block_type: self.block_type().to_string(),
            labels: self.labels().to_vec(),
            range: self.range().clone(),
            attributes: self
                .graph
                .attribute_values(self.id)
                .into_iter()
                .collect(),
            blocks: self
                .all_blocks()
                .into_iter()
                .filter(|child| child.block_type() != "dynamic")
                .map(|child| child.resolved())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResolvedBlock {
    pub reference: String,
    #[serde(rename = "type")]
    pub block_type: String,
    pub labels: Vec<String>,
    pub range: SourceRange,
    pub attributes: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<ResolvedBlock>,
}

#[derive(Clone, Copy, derive_new::new)]
pub struct AttributeRef<'g> {
    graph: &'g Graph,
    block: BlockId,
    attribute: &'g Attribute,
}

impl<'g> AttributeRef<'g> {
    pub fn name(&self) -> &'g str {
        &self.attribute.name
    }

    pub fn expression(&self) -> &'g hcl::Expression {
        &self.attribute.expr
    }

    pub fn range(&self) -> &'g SourceRange {
        &self.attribute.range
    }

    /// Evaluate against the owning block's context
    pub fn value(&self) -> Value {
        let context = self
            .graph
            .contexts()
            .eval_context(self.graph.block(self.block).context);
        evaluate(&context, &self.attribute.expr)
    }

    pub fn is_string(&self) -> bool {
        matches!(self.value(), Value::String(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self.value(), Value::Number(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.value(), Value::Bool(_))
    }

    pub fn is_iterable(&self) -> bool {
        self.value().is_iterable()
    }

    pub fn is_known(&self) -> bool {
        self.value().is_known()
    }

    pub fn is_null(&self) -> bool {
        self.value().is_null()
    }

    pub fn is_true(&self) -> bool {
        match self.value() {
            Value::Bool(b) => b,
            Value::String(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn is_false(&self) -> bool {
        match self.value() {
            Value::Bool(b) => !b,
            Value::String(s) => s.eq_ignore_ascii_case("false"),
            _ => false,
        }
    }

    /// String comparison, numbers and bools compare by their string form
    pub fn equals(&self, expected: &str, ignore_case: bool) -> bool {
        let actual = match self.value() {
            Value::String(s) => s,
            Value::Number(num) => num.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return false,
        };

        if ignore_case {
            actual.eq_ignore_ascii_case(expected)
        } else {
            actual == expected
        }
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.value()
            .as_str()
            .is_some_and(|value| value.starts_with(prefix))
    }

    /// Substring for strings, element for lists, key for objects
    pub fn contains(&self, needle: &str) -> bool {
        match self.value() {
            Value::String(s) => s.contains(needle),
            Value::List(list) => list.iter().any(|value| value.as_str() == Some(needle)),
            Value::Object(object) => object.contains_key(needle),
            _ => false,
        }
    }

    /// Dotted paths of all traversals in the expression (`var.name`, `aws_kms_key.k.arn`)
    pub fn references(&self) -> Vec<String> {
        let mut references = vec![];
        let mut collect = |traversal: &hcl::Traversal| {
            if let Some(path) = traversal_path(traversal) {
                if !references.contains(&path) {
                    references.push(path);
                }
            }
        };
        self.attribute
            .expr
            .visit_traversals(&mut collect as &mut dyn Visit<hcl::Traversal>);
        references
    }

    /// Does this attribute reference `block` (or something below it)?
    pub fn references_block(&self, block: &BlockRef) -> bool {
        let target = block.reference();
        self.references().iter().any(|reference| {
            reference == &target
                || reference
                    .strip_prefix(target.as_str())
                    .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
        })
    }
}

fn traversal_path(traversal: &hcl::Traversal) -> Option<String> {
    use hcl::{Expression, TraversalOperator};

    let Expression::Variable(variable) = &traversal.expr else {
        return None;
    };

    let mut path = variable.as_str().to_string();
    for operator in &traversal.operators {
        match operator {
            TraversalOperator::GetAttr(ident) => {
                path.push('.');
                path.push_str(ident.as_str());
            }
            TraversalOperator::Index(Expression::Number(num)) => path.push_str(&format!("[{num}]")),
            TraversalOperator::Index(Expression::String(s)) => path.push_str(&format!("[{s:?}]")),
            TraversalOperator::LegacyIndex(index) => path.push_str(&format!("[{index}]")),
            _ => break,
        }
    }

    Some(path)
}

#[cfg(test)]
mod test {
    use crate::documents;
    use crate::evaluator::Evaluator;
    use crate::graph::Graph;
    use crate::module::MemoryModules;
    use pretty_assertions::assert_eq;

    #[test]
    fn attribute_helpers() {
        let documents = documents! {r#"
        variable "cidr" {
          default = "0.0.0.0/0"
        }

        resource "aws_kms_key" "key" {
          enable_key_rotation = true
        }

        resource "aws_security_group_rule" "rule" {
          type        = "INGRESS"
          cidr_blocks = [var.cidr]
          from_port   = 22
          kms_key     = aws_kms_key.key.enable_key_rotation
        }
        "#};

        let mut graph = Graph::default();
        let loader = MemoryModules::default();
        let evaluation = Evaluator::new(
            &mut graph,
            &loader,
            ".",
            documents.parsed_blocks(),
            Default::default(),
        )
        .evaluate_all();

        let blocks: Vec<_> = evaluation.blocks.iter().map(|id| graph.get(*id)).collect();
        let key = blocks
            .iter()
            .find(|block| block.reference() == "aws_kms_key.key")
            .expect("key exists");
        let rule = blocks
            .iter()
            .find(|block| block.type_label() == "aws_security_group_rule")
            .expect("rule exists");

        let kind = rule.attribute("type").expect("has type");
        assert!(kind.equals("ingress", true));
        assert!(!kind.equals("ingress", false));

        let cidr_blocks = rule.attribute("cidr_blocks").expect("has cidr_blocks");
        assert!(cidr_blocks.is_iterable());
        assert!(cidr_blocks.contains("0.0.0.0/0"));
        assert_eq!(cidr_blocks.references(), vec!["var.cidr".to_string()]);

        assert!(rule.attribute("from_port").expect("has port").equals("22", false));

        let kms_key = rule.attribute("kms_key").expect("has kms_key");
        assert!(kms_key.is_true());
        assert!(kms_key.references_block(key));
        assert_eq!(rule.name_label(), "rule");
        assert_eq!(rule.range().start_line, 10);
    }
}
