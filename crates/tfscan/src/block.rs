//! block model
//!
//! [ParsedBlock] is what a parser hands to the evaluator: type, labels, unevaluated attributes and
//! nested blocks, all with their source position. Once inserted into a [crate::graph::Graph] it
//! becomes a [Block] bound to a context.
use crate::context::ContextId;
use crate::value::Value;
use indexmap::IndexMap;
use std::path::PathBuf;

/// Position of a block or attribute in its source document
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SourceRange {
    pub filename: Option<PathBuf>,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(skip)]
    pub bytes: Option<std::ops::Range<usize>>,
}

impl std::fmt::Display for SourceRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.filename {
            Some(filename) => write!(f, "{}:", filename.display())?,
            None => f.write_str("<unknown>:")?,
        }
        if self.start_line == self.end_line {
            write!(f, "{}", self.start_line)
        } else {
            write!(f, "{}-{}", self.start_line, self.end_line)
        }
    }
}

#[derive(Debug, Clone, derive_new::new)]
pub struct ParsedAttribute {
    pub name: String,
    pub expr: hcl::Expression,
    #[new(default)]
    pub range: SourceRange,
}

#[derive(Debug, Clone, derive_new::new)]
pub struct ParsedBlock {
    pub block_type: String,
    pub labels: Vec<String>,
    #[new(default)]
    pub attributes: Vec<ParsedAttribute>,
    #[new(default)]
    pub blocks: Vec<ParsedBlock>,
    #[new(default)]
    pub range: SourceRange,
}

/// Distinguishes the clones produced from a single `count` or `for_each` template
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceKey {
    Index(usize),
    Key(Value),
}

impl InstanceKey {
    /// Key under which the instance is aggregated for its template name
    pub fn as_key(&self) -> String {
        match self {
            InstanceKey::Index(index) => index.to_string(),
            InstanceKey::Key(Value::String(key)) => key.clone(),
            InstanceKey::Key(other) => other.to_string(),
        }
    }
}

impl std::fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceKey::Index(index) => write!(f, "[{index}]"),
            InstanceKey::Key(key) => write!(f, "[{key}]"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub expr: hcl::Expression,
    pub range: SourceRange,
}

impl From<ParsedAttribute> for Attribute {
    fn from(value: ParsedAttribute) -> Self {
        Self {
            name: value.name,
            expr: value.expr,
            range: value.range,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct Block {
    pub block_type: String,
    pub labels: Vec<String>,
    pub attributes: IndexMap<String, Attribute>,
    pub children: Vec<BlockId>,
    pub range: SourceRange,
    pub context: ContextId,
    /// Set on clones; a block is expanded (count/for_each/dynamic) at most once
    pub expanded: bool,
    pub instance: Option<InstanceKey>,
    /// Address of the module this block was declared in (`module.a.module.b`)
    pub module: Option<String>,
}

impl Block {
    pub fn type_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    pub fn name_label(&self) -> Option<&str> {
        self.labels.get(1).map(String::as_str)
    }

    /// Last label including the instance key, e.g. `web[0]` or `web["a"]`
    pub fn instance_label(&self) -> Option<String> {
        let label = self.labels.last()?;
        Some(match &self.instance {
            Some(instance) => format!("{label}{instance}"),
            None => label.clone(),
        })
    }

    /// Terraform style address within its module
    pub fn reference(&self) -> String {
        let suffix = self
            .instance
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let labels = self.labels.join(".");

        match self.block_type.as_str() {
            "resource" => format!("{labels}{suffix}"),
            "variable" => format!("var.{labels}"),
            "locals" => "locals".to_string(),
            _ if labels.is_empty() => format!("{}{suffix}", self.block_type),
            block_type => format!("{block_type}.{labels}{suffix}"),
        }
    }

    /// Address including the module path
    pub fn full_name(&self) -> String {
        match &self.module {
            Some(module) => format!("{module}.{}", self.reference()),
            None => self.reference(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::Contexts;
    use pretty_assertions::assert_eq;

    fn block(block_type: &str, labels: &[&str]) -> Block {
        let mut contexts = Contexts::default();
        Block {
            block_type: block_type.to_string(),
            labels: labels.iter().map(ToString::to_string).collect(),
            attributes: Default::default(),
            children: vec![],
            range: Default::default(),
            context: contexts.new_root(),
            expanded: false,
            instance: None,
            module: None,
        }
    }

    #[test]
    fn references() {
        assert_eq!(
            block("resource", &["aws_s3_bucket", "logs"]).reference(),
            "aws_s3_bucket.logs"
        );
        assert_eq!(
            block("data", &["aws_iam_policy", "p"]).reference(),
            "data.aws_iam_policy.p"
        );
        assert_eq!(block("module", &["network"]).reference(), "module.network");
        assert_eq!(block("variable", &["region"]).reference(), "var.region");
        assert_eq!(block("output", &["arn"]).reference(), "output.arn");
        assert_eq!(block("locals", &[]).reference(), "locals");
    }

    #[test]
    fn instance_references() {
        let mut counted = block("resource", &["aws_instance", "web"]);
        counted.instance = Some(InstanceKey::Index(2));
        assert_eq!(counted.reference(), "aws_instance.web[2]");
        assert_eq!(counted.instance_label().as_deref(), Some("web[2]"));

        let mut keyed = block("module", &["bucket"]);
        keyed.instance = Some(InstanceKey::Key("logs".into()));
        keyed.module = Some("module.storage".to_string());
        assert_eq!(keyed.full_name(), r#"module.storage.module.bucket["logs"]"#);
    }
}
