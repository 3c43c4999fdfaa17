//! collection of terraform documents (parsed [hcl_edit::structure::Body] and its source)
//!
//! [Documents] tracks
//! - the source path and text (to turn byte spans into line numbers)
//! - the root blocks
//! and defines a numeric index for each. Once added those indices are stable (removal is not possible)
//!
//! Variable files (`.tfvars`) are not documents; [load_variables] evaluates them into plain
//! values.
use crate::block::{ParsedAttribute, ParsedBlock, SourceRange};
use crate::value::{Object, Value};
use hcl::eval::Evaluate;
use hcl_edit::structure::{Block, Structure};
use hcl_edit::Span;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Source {
    pub path: Option<PathBuf>,
    text: String,
}

impl Source {
    fn range(&self, span: Option<std::ops::Range<usize>>) -> SourceRange {
        let line_at = |offset: usize| {
            let offset = offset.min(self.text.len());
            self.text.as_bytes()[..offset]
                .iter()
                .filter(|byte| **byte == b'\n')
                .count()
                + 1
        };

        match span {
            Some(bytes) => SourceRange {
                filename: self.path.clone(),
                start_line: line_at(bytes.start),
                end_line: line_at(bytes.end.saturating_sub(1).max(bytes.start)),
                bytes: Some(bytes),
            },
            None => SourceRange {
                filename: self.path.clone(),
                ..Default::default()
            },
        }
    }
}

#[derive(Default, Debug)]
pub struct Documents {
    sources: Vec<Source>,
    root_blocks: Vec<(usize, Block)>,
}

impl Documents {
    /// Parses, inserts and indexes a document
    pub fn insert(
        &mut self,
        text: impl Into<String>,
        path: impl Into<Option<PathBuf>>,
    ) -> Result<(), LoadError> {
        let text = text.into();
        let document = hcl_edit::parser::parse_body(&text)?;

        let source_index = self.sources.len();
        self.sources.push(Source {
            path: path.into(),
            text,
        });

        for structure in document.into_iter() {
            match structure {
                Structure::Block(block) => self.root_blocks.push((source_index, block)),
                Structure::Attribute(attribute) => {
                    tracing::warn!(
                        attribute = attribute.key.value().as_str(),
                        path = ?self.sources[source_index].path,
                        "ignoring attribute outside of a block"
                    );
                }
            }
        }

        Ok(())
    }

    pub fn blocks(&self) -> impl Iterator<Item = SourceBlock> {
        self.root_blocks
            .iter()
            .enumerate()
            .map(|(index, (source_index, block))| (index, &self.sources[*source_index], block))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// All root blocks in the form the evaluator consumes
    pub fn parsed_blocks(&self) -> Vec<ParsedBlock> {
        self.blocks()
            .map(|(_index, source, block)| parse_block(source, block))
            .collect()
    }
}

fn parse_block(source: &Source, block: &Block) -> ParsedBlock {
    let mut parsed = ParsedBlock::new(
        block.ident.value().as_str().to_string(),
        block
            .labels
            .iter()
            .map(|label| label.as_str().to_string())
            .collect(),
    );
    parsed.range = source.range(block.span());

    for structure in block.body.iter() {
        match structure {
            Structure::Attribute(attribute) => {
                let mut parsed_attribute = ParsedAttribute::new(
                    attribute.key.value().as_str().to_string(),
                    attribute.value.clone().into(),
                );
                parsed_attribute.range = source.range(attribute.span());
                parsed.attributes.push(parsed_attribute);
            }
            Structure::Block(nested) => parsed.blocks.push(parse_block(source, nested)),
        }
    }

    parsed
}

impl Documents {
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path)?;
        self.insert(file_contents, Some(file_path))
    }

    /// Load every `*.tf` file of a directory (not recursive), in file name order
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let mut file_paths = vec![];

        let read_dir = std::fs::read_dir(dir_path)?;
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let is_tf_file = dir_entry.file_name().to_string_lossy().ends_with(".tf");
            if !is_tf_file {
                continue;
            }

            file_paths.push(dir_entry.path());
        }

        if file_paths.is_empty() {
            return Err(LoadError::NoFilesFound(dir_path.to_path_buf()));
        }

        file_paths.sort();
        for file_path in file_paths {
            self.load_file(&file_path)?;
        }

        Ok(())
    }
}

/// Evaluate a variables document (`name = value` per line)
pub fn parse_variables(text: &str) -> Result<Object, LoadError> {
    let body = hcl_edit::parser::parse_body(text)?;
    let context = hcl::eval::Context::new();

    let mut variables = Object::new();
    for structure in body.into_iter() {
        let Structure::Attribute(attribute) = structure else {
            continue;
        };

        let name = attribute.key.value().as_str().to_string();
        let expr: hcl::Expression = attribute.value.into();
        let value = expr
            .evaluate(&context)
            .map_err(|_| LoadError::InvalidVariable(name.clone()))?;
        variables.insert(name, Value::from(value));
    }

    Ok(variables)
}

pub fn load_variables(file_path: &Path) -> Result<Object, LoadError> {
    tracing::info!(path=%file_path.display(), "loading variables");
    parse_variables(&std::fs::read_to_string(file_path)?)
}

/// Variables terraform picks up on its own: `terraform.tfvars`, then `*.auto.tfvars` in name order
pub fn load_default_variables(dir_path: &Path) -> Result<Object, LoadError> {
    let mut variables = Object::new();

    let default_file = dir_path.join("terraform.tfvars");
    if default_file.is_file() {
        variables.extend(load_variables(&default_file)?);
    }

    let mut auto_files = vec![];
    for dir_entry in std::fs::read_dir(dir_path)? {
        let dir_entry = dir_entry?;
        if dir_entry
            .file_name()
            .to_string_lossy()
            .ends_with(".auto.tfvars")
        {
            auto_files.push(dir_entry.path());
        }
    }
    auto_files.sort();
    for auto_file in auto_files {
        variables.extend(load_variables(&auto_file)?);
    }

    Ok(variables)
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No terraform files found in {}", .0.display())]
    NoFilesFound(PathBuf),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse hcl file")]
    HclParseFailed(#[from] hcl_edit::parser::Error),
    #[error("Unable to evaluate variable {0}")]
    InvalidVariable(String),
}

/// Utility macro to create [Documents]
///
/// Create from a single document
/// ```
/// # use tfscan::documents;
/// documents!(r#"resource "aws_s3_bucket" "logs" {}"#);
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use tfscan::documents;
/// documents! {
///   "main.tf" => r#"variable "name" {}"#,
///   "bucket.tf" => r#"resource "aws_s3_bucket" "logs" {}"#
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use tfscan::documents;
/// documents!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! documents {
    // single document without source
    { $expr:expr } => {{
        let mut docs = $crate::documents::Documents::default();
        docs.insert($expr, None).expect("body must parse");
        docs
    }};
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::documents::Documents::default();
        $(
            docs.insert($expr, Some(std::path::PathBuf::from($source))).expect("body must parse");
        )+

        docs
    }};
}

pub type SourceBlock<'a> = (usize, &'a Source, &'a Block);

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn iterators() {
        let documents = documents! {r#"
        attr_1 = 1
        resource "one" "two" {}
        module "three" {
          source = "./three"
        }
        "#};

        assert_eq!(documents.blocks().count(), 2);
        assert_eq!(documents.source_count(), 1);
    }

    #[test]
    fn parsed_blocks_keep_structure_and_lines() {
        let documents = documents! {
            "main.tf" => "variable \"name\" {}\n",
            "sg.tf" => r#"resource "aws_security_group" "sg" {
  description = "web"

  ingress {
    from_port = 443
  }
}
"#
        };

        let blocks = documents.parsed_blocks();
        assert_eq!(blocks.len(), 2);

        let sg = &blocks[1];
        assert_eq!(sg.block_type, "resource");
        assert_eq!(sg.labels, vec!["aws_security_group", "sg"]);
        assert_eq!(sg.range.filename, Some(PathBuf::from("sg.tf")));
        assert_eq!((sg.range.start_line, sg.range.end_line), (1, 7));
        assert_eq!(sg.attributes[0].name, "description");
        assert_eq!(sg.attributes[0].range.start_line, 2);

        let ingress = &sg.blocks[0];
        assert_eq!(ingress.block_type, "ingress");
        assert_eq!((ingress.range.start_line, ingress.range.end_line), (4, 6));
    }

    #[test]
    fn variables() {
        let variables = parse_variables(
            r#"
            region = "eu-west-1"
            azs    = ["a", "b"]
            tags   = { env = "prod" }
            "#,
        )
        .expect("valid variables");

        assert_eq!(variables["region"], Value::from("eu-west-1"));
        assert_eq!(variables["azs"], Value::from(vec!["a", "b"]));
        assert_eq!(variables["tags"].get(&["env"]), Some(&Value::from("prod")));

        assert!(matches!(
            parse_variables("region = var.other"),
            Err(LoadError::InvalidVariable(name)) if name == "region"
        ));
    }
}
