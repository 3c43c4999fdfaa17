//! module sources and instantiation bookkeeping
//!
//! The evaluator never reads files itself. For every `module` block it asks a [ModuleLoader]
//! for the blocks behind the module's `source` and evaluates those as an independent
//! sub-tree.
use crate::block::ParsedBlock;
use crate::documents::{Documents, LoadError};
use indexmap::IndexMap;
use std::cell::Cell;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, derive_new::new)]
pub struct ModuleRequest<'a> {
    /// Label of the calling `module` block
    pub name: &'a str,
    /// Value of its `source` attribute
    pub source: &'a str,
    /// Directory of the module that contains the call
    pub caller: &'a Path,
}

#[derive(Debug, derive_new::new)]
pub struct LoadedModule {
    pub path: PathBuf,
    pub blocks: Vec<ParsedBlock>,
}

/// Resolves module sources to blocks
pub trait ModuleLoader {
    fn load(&self, request: &ModuleRequest) -> Result<LoadedModule, ModuleError>;
}

#[derive(thiserror::Error, Debug)]
pub enum ModuleError {
    #[error("Module has no static source")]
    MissingSource,
    #[error("Module source {0:?} not found")]
    NotFound(String),
    #[error("Unable to load module from {}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },
}

/// A module that could not be evaluated; the rest of the run is unaffected
#[derive(Debug, derive_new::new)]
pub struct ModuleDiagnostic {
    /// Full address of the calling block
    pub module: String,
    pub error: ModuleError,
}

impl std::fmt::Display for ModuleDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.module, self.error)
    }
}

/// Identity of one module instantiation
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_new::new)]
pub struct ModuleKey {
    pub name: String,
    pub path: PathBuf,
    /// Full address of the calling block
    pub reference: String,
}

/// Module instantiations already evaluated
///
/// Every evaluator owns its ledger. A module evaluator starts with a copy of its caller's
/// ledger and the caller merges the result back once the module is done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitedModules {
    keys: Vec<ModuleKey>,
}

impl VisitedModules {
    pub fn contains(&self, key: &ModuleKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the key was already recorded
    pub fn insert(&mut self, key: ModuleKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    pub fn merge(&mut self, other: VisitedModules) {
        for key in other.keys {
            self.insert(key);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleKey> {
        self.keys.iter()
    }
}

/// Modules kept in memory, keyed by their `source`
#[derive(Debug, Default)]
pub struct MemoryModules {
    modules: IndexMap<String, Vec<ParsedBlock>>,
    loads: Cell<usize>,
}

impl MemoryModules {
    pub fn insert(&mut self, source: impl Into<String>, blocks: Vec<ParsedBlock>) {
        self.modules.insert(source.into(), blocks);
    }

    pub fn with(mut self, source: impl Into<String>, documents: &Documents) -> Self {
        self.insert(source, documents.parsed_blocks());
        self
    }

    /// Number of successful loads so far
    pub fn load_count(&self) -> usize {
        self.loads.get()
    }
}

impl ModuleLoader for MemoryModules {
    fn load(&self, request: &ModuleRequest) -> Result<LoadedModule, ModuleError> {
        let blocks = self
            .modules
            .get(request.source)
            .ok_or_else(|| ModuleError::NotFound(request.source.to_string()))?;

        self.loads.set(self.loads.get() + 1);
        Ok(LoadedModule::new(
            PathBuf::from(request.source),
            blocks.clone(),
        ))
    }
}

/// Modules read from disk
///
/// Local sources (`./`, `../`) are resolved relative to the calling module. Anything else is
/// looked up in the `.terraform/modules/modules.json` written by `terraform init`.
#[derive(Debug)]
pub struct DirectoryModules {
    root: PathBuf,
    metadata: ModulesMetadata,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct ModulesMetadata {
    #[serde(rename = "Modules", default)]
    pub modules: Vec<ModuleMetadata>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ModuleMetadata {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Dir")]
    pub dir: PathBuf,
}

impl DirectoryModules {
    /// `root` is the directory of the root module
    ///
    /// A missing or unreadable `modules.json` only disables remote module lookup.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let metadata_path = root.join(".terraform").join("modules").join("modules.json");

        let metadata = std::fs::read_to_string(&metadata_path)
            .ok()
            .and_then(|contents| match serde_json::from_str(&contents) {
                Ok(metadata) => Some(metadata),
                Err(error) => {
                    tracing::warn!(path=%metadata_path.display(), %error, "ignoring module metadata");
                    None
                }
            })
            .unwrap_or_default();

        Self { root, metadata }
    }

    fn resolve(&self, request: &ModuleRequest) -> Option<PathBuf> {
        if request.source.starts_with("./") || request.source.starts_with("../") {
            return Some(request.caller.join(request.source));
        }

        self.metadata
            .modules
            .iter()
            .find(|module| module.source == request.source || module.key == request.name)
            .map(|module| self.root.join(&module.dir))
    }
}

impl ModuleLoader for DirectoryModules {
    fn load(&self, request: &ModuleRequest) -> Result<LoadedModule, ModuleError> {
        let path = self
            .resolve(request)
            .filter(|path| path.is_dir())
            .ok_or_else(|| ModuleError::NotFound(request.source.to_string()))?;

        let mut documents = Documents::default();
        documents
            .load_directory(&path)
            .map_err(|source| ModuleError::Load {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(source = request.source, path=%path.display(), "module loaded");
        Ok(LoadedModule::new(path, documents.parsed_blocks()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use pretty_assertions::assert_eq;

    #[test]
    fn visited_modules_merge_without_duplicates() {
        let key = |reference: &str| {
            ModuleKey::new("m".to_string(), PathBuf::from("./m"), reference.to_string())
        };

        let mut parent = VisitedModules::default();
        assert!(parent.insert(key("module.a")));
        assert!(!parent.insert(key("module.a")));

        let mut child = parent.clone();
        child.insert(key("module.a.module.b"));
        parent.merge(child);

        assert_eq!(parent.len(), 2);
        assert!(parent.contains(&key("module.a.module.b")));
    }

    #[test]
    fn memory_modules() {
        let loader = MemoryModules::default().with(
            "./bucket",
            &documents! {r#"resource "aws_s3_bucket" "b" {}"#},
        );
        let caller = PathBuf::from(".");

        let loaded = loader
            .load(&ModuleRequest::new("bucket", "./bucket", &caller))
            .expect("known source");
        assert_eq!(loaded.blocks.len(), 1);
        assert_eq!(loader.load_count(), 1);

        assert!(matches!(
            loader.load(&ModuleRequest::new("other", "./other", &caller)),
            Err(ModuleError::NotFound(source)) if source == "./other"
        ));
    }

    #[test]
    fn directory_modules() {
        let root = tempfile::tempdir().expect("temp dir");
        let local = root.path().join("modules").join("bucket");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(
            local.join("main.tf"),
            r#"resource "aws_s3_bucket" "b" {}"#,
        )
        .unwrap();

        let remote = root.path().join(".terraform").join("modules").join("vpc");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::write(remote.join("main.tf"), r#"resource "aws_vpc" "v" {}"#).unwrap();
        std::fs::write(
            root.path().join(".terraform/modules/modules.json"),
            r#"{"Modules":[{"Key":"vpc","Source":"terraform-aws-modules/vpc/aws","Dir":".terraform/modules/vpc"}]}"#,
        )
        .unwrap();

        let loader = DirectoryModules::new(root.path());

        let loaded = loader
            .load(&ModuleRequest::new("bucket", "./modules/bucket", root.path()))
            .expect("local module");
        assert_eq!(loaded.blocks[0].labels, vec!["aws_s3_bucket", "b"]);

        let loaded = loader
            .load(&ModuleRequest::new(
                "vpc",
                "terraform-aws-modules/vpc/aws",
                root.path(),
            ))
            .expect("remote module");
        assert_eq!(loaded.blocks[0].labels, vec!["aws_vpc", "v"]);

        let empty = root.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        assert!(matches!(
            loader.load(&ModuleRequest::new("empty", "./empty", root.path())),
            Err(ModuleError::Load { .. })
        ));
    }
}
